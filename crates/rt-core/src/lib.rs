//! Connection/session, dispatch, and event-distribution core for the
//! real-time hub: client sessions, rate limiting, keep-alive, channels,
//! methods, events, and the cluster broker adapter, wired together by
//! [`Hub`].

mod broker;
mod channel;
mod client;
mod dispatch;
mod error;
mod event;
mod hub;
mod keepalive;
mod method;
mod rate_limit;
mod schema;

pub use broker::{topic_for_event, BrokerError, BrokerMessage, ClusterBroker, InProcessBroker, TOPIC_PREFIX};
pub use channel::{Channel, DEFAULT_CHANNEL};
pub use client::{AuthContextError, ClientNode, SendError, Transport, TrackingInfo};
pub use dispatch::parse_error_envelope;
pub use error::DispatchError;
pub use event::{EventEntry, EventOptions, EventRegistry, ShouldSubscribe, SubscribeError};
pub use hub::{AuthFn, AuthOutcome, ChannelAuthorizationFn, Hub, HubConfig};
pub use keepalive::{KeepAliveAction, KeepAliveMonitor, KeepAliveState};
pub use method::{merge_params, FnHandler, FnMiddleware, Method, MethodHandler, MethodOptions, MethodRegistry, Middleware, RequestContext};
pub use rate_limit::RateLimiter;
pub use schema::{FieldKind, FieldSchema, Schema};
