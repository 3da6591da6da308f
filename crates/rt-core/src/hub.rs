use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use futures_util::future::BoxFuture;
use uuid::Uuid;
use wire::Value;

use crate::broker::{topic_for_event, BrokerMessage, ClusterBroker};
use crate::channel::{Channel, DEFAULT_CHANNEL};
use crate::client::{ClientNode, Transport, TrackingInfo};
use crate::dispatch;
use crate::error::DispatchError;
use crate::event::{EventRegistry, SubscribeError};
use crate::method::{FnHandler, MethodHandler, MethodOptions, MethodRegistry};

/// Outcome of the server-side authentication callback.
pub enum AuthOutcome {
    Rejected,
    Accepted(Value),
}

pub type AuthFn = Arc<dyn Fn(String) -> BoxFuture<'static, AuthOutcome> + Send + Sync>;
pub type ChannelAuthorizationFn = Arc<dyn Fn(&ClientNode, &str, &str) -> bool + Send + Sync>;

pub struct HubConfig {
    /// Subset of auth-context keys forwarded back to the client after
    /// `rpc:init` succeeds.
    pub allowed_context_keys: Option<Vec<String>>,
    /// Keep-alive interval `I` applied to every accepted `ClientNode`
    /// (spec §4.3). Defaults to 10 seconds.
    pub keepalive_interval: std::time::Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            allowed_context_keys: None,
            keepalive_interval: std::time::Duration::from_secs(10),
        }
    }
}

/// Owns the registries and connected clients; wires the codec, rate
/// limiter, keep-alive, channel, method, event, and broker components into
/// one server instance.
pub struct Hub {
    origin_id: String,
    methods: MethodRegistry,
    events: EventRegistry,
    channels: RwLock<HashMap<String, Arc<Channel>>>,
    clients: RwLock<HashMap<String, Arc<ClientNode>>>,
    broker: Option<Arc<dyn ClusterBroker>>,
    accept_connections: AtomicBool,
    auth_fn: RwLock<Option<AuthFn>>,
    channel_authorization: RwLock<Option<ChannelAuthorizationFn>>,
    allowed_context_keys: Option<Vec<String>>,
    keepalive_interval: std::time::Duration,
}

impl Hub {
    pub fn new(config: HubConfig, broker: Option<Arc<dyn ClusterBroker>>) -> Arc<Hub> {
        Arc::new_cyclic(|weak: &Weak<Hub>| {
            let methods = MethodRegistry::new();
            register_builtins(&methods, weak.clone());
            Hub {
                origin_id: Uuid::new_v4().to_string(),
                methods,
                events: EventRegistry::new(),
                channels: RwLock::new(HashMap::new()),
                clients: RwLock::new(HashMap::new()),
                broker,
                accept_connections: AtomicBool::new(true),
                auth_fn: RwLock::new(None),
                channel_authorization: RwLock::new(None),
                allowed_context_keys: config.allowed_context_keys,
                keepalive_interval: config.keepalive_interval,
            }
        })
    }

    pub fn keepalive_interval(&self) -> std::time::Duration {
        self.keepalive_interval
    }

    pub fn origin_id(&self) -> &str {
        &self.origin_id
    }

    pub fn methods(&self) -> &MethodRegistry {
        &self.methods
    }

    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    pub fn add_method(&self, name: impl Into<String>, handler: Arc<dyn MethodHandler>, options: MethodOptions) {
        self.methods.add(name, handler, options);
    }

    pub fn add_event(&self, name: impl Into<String>, options: crate::event::EventOptions) {
        self.events.add_event(name, options);
    }

    pub fn set_auth(&self, auth_fn: AuthFn) {
        *self.auth_fn.write().expect("auth fn lock poisoned") = Some(auth_fn);
    }

    pub fn set_channel_authorization(&self, hook: ChannelAuthorizationFn) {
        *self.channel_authorization.write().expect("channel auth lock poisoned") = Some(hook);
    }

    pub fn channel(&self, name: &str) -> Arc<Channel> {
        if let Some(existing) = self.channels.read().expect("channels lock poisoned").get(name) {
            return existing.clone();
        }
        let mut channels = self.channels.write().expect("channels lock poisoned");
        channels
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(Channel::new()))
            .clone()
    }

    fn prune_empty_channel(&self, name: &str) {
        let mut channels = self.channels.write().expect("channels lock poisoned");
        if channels.get(name).is_some_and(|c| c.is_empty()) {
            channels.remove(name);
        }
    }

    /// Whether the server currently accepts new connections.
    pub fn accepts_connections(&self) -> bool {
        self.accept_connections.load(Ordering::SeqCst)
    }

    /// Accept a new connection: instantiate and register a `ClientNode`.
    /// Closes any prior node sharing the same identity first.
    pub fn accept_connection(&self, id: impl Into<String>, transport: Transport, tracking: TrackingInfo) -> Option<Arc<ClientNode>> {
        if !self.accepts_connections() {
            return None;
        }
        let id = id.into();
        let node = Arc::new(ClientNode::with_keepalive_interval(
            id.clone(),
            transport,
            tracking,
            self.keepalive_interval,
        ));
        let previous = {
            let mut clients = self.clients.write().expect("clients lock poisoned");
            clients.insert(id, node.clone())
        };
        if let Some(previous) = previous {
            tracing::info!(client_id = %previous.id(), "duplicate identity closed prior node");
            self.disconnect(&previous);
        }
        Some(node)
    }

    pub fn client(&self, id: &str) -> Option<Arc<ClientNode>> {
        self.clients.read().expect("clients lock poisoned").get(id).cloned()
    }

    /// (Re)assign a connected node's identity on an explicit `setup` message,
    /// received on duplex transports only. Closes any prior node already
    /// registered under the new identity.
    pub fn reassign_identity(&self, node: &Arc<ClientNode>, new_id: String) {
        let old_id = node.id();
        let previous = {
            let mut clients = self.clients.write().expect("clients lock poisoned");
            clients.remove(&old_id);
            clients.insert(new_id.clone(), node.clone())
        };
        node.reassign_id(new_id);
        if let Some(previous) = previous {
            if !Arc::ptr_eq(&previous, node) {
                tracing::info!(client_id = %previous.id(), "duplicate identity closed prior node");
                self.disconnect(&previous);
            }
        }
    }

    /// Close a node and prune it from the client map and every channel's
    /// subscriber sets.
    pub fn disconnect(&self, node: &Arc<ClientNode>) {
        if !node.close() {
            return;
        }
        self.clients.write().expect("clients lock poisoned").remove(&node.id());
        let channel_names: Vec<String> = self
            .channels
            .read()
            .expect("channels lock poisoned")
            .keys()
            .cloned()
            .collect();
        for name in channel_names {
            if let Some(channel) = self.channels.read().expect("channels lock poisoned").get(&name) {
                channel.remove_node(node);
            }
            self.prune_empty_channel(&name);
        }
    }

    pub async fn dispatch_method(&self, node: Arc<ClientNode>, uuid: String, method: String, params: Option<Value>, void: bool) {
        dispatch::dispatch(&self.methods, node, uuid, method, params, void).await;
    }

    /// `subscribe(event, channel)` request handling.
    pub fn subscribe(&self, node: Arc<ClientNode>, event: &str, channel: Option<String>) -> Result<(), SubscribeError> {
        let channel_name = channel.as_deref().unwrap_or(DEFAULT_CHANNEL);
        self.events.authorize_subscribe(event, &node, Some(channel_name))?;
        if let Some(hook) = &*self.channel_authorization.read().expect("channel auth lock poisoned") {
            if !hook(&node, channel_name, event) {
                return Err(SubscribeError::Forbidden);
            }
        }
        self.channel(channel_name).subscribe(event, node);
        Ok(())
    }

    pub fn unsubscribe(&self, node: &ClientNode, event: &str, channel: Option<String>) {
        let channel_name = channel.as_deref().unwrap_or(DEFAULT_CHANNEL);
        self.channel(channel_name).unsubscribe(event, node);
        self.prune_empty_channel(channel_name);
    }

    /// Server-side emit. Cluster-flagged events publish to the
    /// broker and rely on loopback delivery for local fan-out; everything
    /// else propagates locally immediately.
    pub async fn emit(&self, event: &str, channel: Option<String>, params: Option<Value>) {
        let envelope = wire::Envelope::new_event(event, channel.clone(), params);
        let Ok(encoded) = envelope.encode() else {
            tracing::error!(event, "failed to encode outbound event payload");
            return;
        };

        if self.events.is_cluster(event) {
            if let Some(broker) = &self.broker {
                let message = BrokerMessage {
                    event: event.to_owned(),
                    channel,
                    payload: encoded,
                    origin_id: self.origin_id.clone(),
                };
                if let Err(err) = broker.publish(&topic_for_event(event), message).await {
                    tracing::error!(event, error = %err, "broker publish failed");
                }
                return;
            }
        }

        let channel_name = channel.as_deref().unwrap_or(DEFAULT_CHANNEL).to_owned();
        self.channel(&channel_name).propagate(event, &encoded);
    }

    /// Apply an inbound broker message to local subscribers.
    ///
    /// A cluster-flagged emit never locally propagates directly (see
    /// `emit`): the originating hub's own subscribers are reached only
    /// through this same callback, via the broker's echo of its own
    /// publish back to its own subscription. `origin_id` is carried on
    /// every message for observability and is available to brokers that
    /// may redeliver a message more than once to the same subscription,
    /// but it must not be used to discard same-origin messages
    /// unconditionally — doing so would make the originating server's own
    /// subscribers never observe events the server itself emits.
    pub fn handle_broker_message(&self, message: BrokerMessage) {
        let channel_name = message.channel.as_deref().unwrap_or(DEFAULT_CHANNEL).to_owned();
        self.channel(&channel_name).propagate(&message.event, &message.payload);
    }

    /// In-process method invocation with a synthetic server-side node
    ///.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, DispatchError> {
        let Some(handler) = self.methods.get(method) else {
            return Err(DispatchError::MethodNotFound(method.to_owned()));
        };
        let node = Arc::new(ClientNode::synthetic(format!("internal-{}", Uuid::new_v4())));
        handler.handler.call(node, params).await
    }

    /// Whether the cluster broker (if any) is ready; a hub with no broker
    /// reports ready since there's nothing to wait on.
    pub fn broker_ready(&self) -> bool {
        self.broker.as_ref().is_none_or(|b| b.is_ready())
    }

    /// Subscribe to every cluster-flagged event's broker topic and spawn a
    /// task that folds inbound broker messages into local fan-out. A no-op
    /// when no broker is configured. Takes `self: &Arc<Self>` since the
    /// forwarding task outlives the call and needs to keep the hub alive.
    pub async fn start_cluster_subscription(self: &Arc<Self>) {
        let Some(broker) = self.broker.clone() else {
            return;
        };
        let topics: Vec<String> = self
            .events
            .cluster_event_names()
            .iter()
            .map(|name| topic_for_event(name))
            .collect();
        if topics.is_empty() {
            return;
        }

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        if let Err(err) = broker.subscribe(&topics, tx).await {
            tracing::error!(error = %err, "cluster broker subscription failed");
            return;
        }

        let hub = self.clone();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                hub.handle_broker_message(message);
            }
        });
    }

    /// Stop accepting connections, close every node, and close the broker
    ///.
    pub async fn close(&self) {
        self.accept_connections.store(false, Ordering::SeqCst);
        let nodes: Vec<Arc<ClientNode>> = self.clients.read().expect("clients lock poisoned").values().cloned().collect();
        for node in nodes {
            self.disconnect(&node);
        }
        self.channels.write().expect("channels lock poisoned").clear();
    }

    async fn authenticate(&self, token: String) -> AuthOutcome {
        let auth_fn = self.auth_fn.read().expect("auth fn lock poisoned").clone();
        match auth_fn {
            Some(auth_fn) => auth_fn(token).await,
            None => AuthOutcome::Rejected,
        }
    }

    /// Run the configured auth function for `token` and, on acceptance, seed
    /// `node`'s auth context. Shared by the `rpc:init` method handler and by
    /// transports (the one-way push connect path) that receive the bearer
    /// token as a header instead of an explicit method call. Returns the
    /// context filtered to `allowed_context_keys`, mirroring what `rpc:init`
    /// hands back to the caller.
    pub async fn authenticate_node(&self, node: &Arc<ClientNode>, token: String) -> Result<Value, DispatchError> {
        match self.authenticate(token).await {
            AuthOutcome::Rejected => Err(DispatchError::Public("authentication rejected".to_owned())),
            AuthOutcome::Accepted(context) => {
                node.set_auth_context(context.clone())
                    .map_err(|e| DispatchError::Internal(e.to_string()))?;
                Ok(self.filter_context(&context))
            }
        }
    }

    fn filter_context(&self, context: &Value) -> Value {
        let Some(allowed) = &self.allowed_context_keys else {
            return context.clone();
        };
        let Some(object) = context.as_object() else {
            return context.clone();
        };
        Value::object(
            allowed
                .iter()
                .filter_map(|key| object.get(key).map(|v| (key.clone(), v.clone()))),
        )
    }
}

fn register_builtins(registry: &MethodRegistry, hub: Weak<Hub>) {
    let init_hub = hub.clone();
    registry.add(
        "rpc:init",
        Arc::new(FnHandler(move |node: Arc<ClientNode>, params: Option<Value>| {
            let hub = init_hub.clone();
            async move {
                let Some(hub) = hub.upgrade() else {
                    return Err(DispatchError::Internal("hub dropped".to_owned()));
                };
                let token = params
                    .as_ref()
                    .and_then(Value::as_object)
                    .and_then(|obj| obj.get("token"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                hub.authenticate_node(&node, token).await
            }
        })),
        MethodOptions::default(),
    );

    registry.add(
        "rpc:logout",
        Arc::new(FnHandler(|node: Arc<ClientNode>, _params: Option<Value>| async move {
            node.clear_auth_context();
            Ok::<Value, DispatchError>(Value::Null)
        })),
        MethodOptions::default(),
    );

    let on_hub = hub.clone();
    registry.add(
        "rpc:on",
        Arc::new(FnHandler(move |node: Arc<ClientNode>, params: Option<Value>| {
            let hub = on_hub.clone();
            async move {
                let Some(hub) = hub.upgrade() else {
                    return Err(DispatchError::Internal("hub dropped".to_owned()));
                };
                let (event, channel) = extract_event_and_channel(params.as_ref())?;
                hub.subscribe(node, &event, channel).map_err(|e| match e {
                    SubscribeError::NotFound => DispatchError::EventNotFound(event.clone()),
                    SubscribeError::Forbidden => DispatchError::EventForbidden(event.clone()),
                })?;
                Ok(Value::Null)
            }
        })),
        MethodOptions::default(),
    );

    let off_hub = hub.clone();
    registry.add(
        "rpc:off",
        Arc::new(FnHandler(move |node: Arc<ClientNode>, params: Option<Value>| {
            let hub = off_hub.clone();
            async move {
                let Some(hub) = hub.upgrade() else {
                    return Err(DispatchError::Internal("hub dropped".to_owned()));
                };
                let (event, channel) = extract_event_and_channel(params.as_ref())?;
                hub.unsubscribe(&node, &event, channel);
                Ok(Value::Null)
            }
        })),
        MethodOptions::default(),
    );

    let methods_hub = hub;
    registry.add(
        "rpc:methods",
        Arc::new(FnHandler(move |_node: Arc<ClientNode>, _params: Option<Value>| {
            let hub = methods_hub.clone();
            async move {
                let Some(hub) = hub.upgrade() else {
                    return Err(DispatchError::Internal("hub dropped".to_owned()));
                };
                let names = hub.methods.names().into_iter().map(Value::Str).collect();
                Ok(Value::Array(names))
            }
        })),
        MethodOptions::default(),
    );
}

fn extract_event_and_channel(params: Option<&Value>) -> Result<(String, Option<String>), DispatchError> {
    let object = params
        .and_then(Value::as_object)
        .ok_or_else(|| DispatchError::Public("params must be an object with an `event` field".to_owned()))?;
    let event = object
        .get("event")
        .and_then(Value::as_str)
        .ok_or_else(|| DispatchError::Public("missing `event` field".to_owned()))?
        .to_owned();
    let channel = object.get("channel").and_then(Value::as_str).map(str::to_owned);
    Ok((event, channel))
}
