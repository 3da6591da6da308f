use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use thiserror::Error;
use tokio::sync::mpsc;
use wire::{Envelope, Value};

use crate::keepalive::KeepAliveMonitor;
use crate::rate_limit::RateLimiter;

/// Outbound delivery mechanism for a [`ClientNode`].
///
/// A node owns exactly one of a duplex socket handle or a one-way push
/// handle at a time — never both. `None` is used for the
/// synthetic server-side node the orchestrator uses for in-process calls,
/// and transiently for a POST-only client that has not yet attached an SSE
/// stream.
pub enum Transport {
    /// Full-duplex transport (WebSocket-style): raw encoded envelope bytes.
    Duplex(mpsc::UnboundedSender<Vec<u8>>),
    /// One-way push transport (server-sent events): `(sequence, frame text)`.
    Push(mpsc::UnboundedSender<(u64, String)>),
    None,
}

/// Connection metadata captured once at accept time.
#[derive(Debug, Clone)]
pub struct TrackingInfo {
    pub remote_addr: String,
    pub user_agent: Option<String>,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum AuthContextError {
    #[error("auth context must include a user object with a non-empty identifier")]
    MissingUserId,
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("codec error: {0}")]
    Codec(#[from] wire::CodecError),
    #[error("client node has no attached transport")]
    NoTransport,
    #[error("transport channel closed")]
    Closed,
}

/// Per-connection session object: the central entity of the connection layer.
pub struct ClientNode {
    id: RwLock<String>,
    authenticated: AtomicBool,
    auth_context: RwLock<Option<Value>>,
    user_id: RwLock<Option<String>>,
    transport: RwLock<Transport>,
    tracking: TrackingInfo,
    meta: RwLock<Option<Value>>,
    pub rate_limiter: RateLimiter,
    pub keepalive: KeepAliveMonitor,
    seq: AtomicU64,
    closed: AtomicBool,
    /// Serializes callers that temporarily swap the node's transport (the
    /// POST-per-call path), so concurrent calls on the same node queue
    /// instead of racing on `transport`.
    call_lock: tokio::sync::Mutex<()>,
}

impl ClientNode {
    pub fn new(id: impl Into<String>, transport: Transport, tracking: TrackingInfo) -> Self {
        Self::with_keepalive_interval(id, transport, tracking, KeepAliveMonitor::default_interval().interval())
    }

    /// Like [`ClientNode::new`] but with a configurable keep-alive interval,
    /// used by `Hub` (via `HubConfig::keepalive_interval`) and by tests that
    /// need a short timeout window.
    pub fn with_keepalive_interval(
        id: impl Into<String>,
        transport: Transport,
        tracking: TrackingInfo,
        keepalive_interval: std::time::Duration,
    ) -> Self {
        Self {
            id: RwLock::new(id.into()),
            authenticated: AtomicBool::new(false),
            auth_context: RwLock::new(None),
            user_id: RwLock::new(None),
            transport: RwLock::new(transport),
            tracking,
            meta: RwLock::new(None),
            rate_limiter: RateLimiter::default_limit(),
            keepalive: KeepAliveMonitor::new(keepalive_interval),
            seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            call_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// A synthetic node with no transport, used by the orchestrator's
    /// in-process `call` API.
    pub fn synthetic(id: impl Into<String>) -> Self {
        Self::new(
            id,
            Transport::None,
            TrackingInfo {
                remote_addr: "internal".to_owned(),
                user_agent: None,
                headers: BTreeMap::new(),
            },
        )
    }

    pub fn id(&self) -> String {
        self.id.read().expect("client id lock poisoned").clone()
    }

    /// Reassign this node's identity.
    pub fn reassign_id(&self, new_id: impl Into<String>) {
        *self.id.write().expect("client id lock poisoned") = new_id.into();
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().expect("user id lock poisoned").clone()
    }

    pub fn auth_context(&self) -> Option<Value> {
        self.auth_context
            .read()
            .expect("auth context lock poisoned")
            .clone()
    }

    pub fn tracking(&self) -> &TrackingInfo {
        &self.tracking
    }

    pub fn meta(&self) -> Option<Value> {
        self.meta.read().expect("meta lock poisoned").clone()
    }

    pub fn set_meta(&self, meta: Value) {
        *self.meta.write().expect("meta lock poisoned") = Some(meta);
    }

    /// Set the auth context after a successful authentication. The context
    /// must include a `user` object with a non-empty `id`; absence is a
    /// fatal error for the call that set it.
    pub fn set_auth_context(&self, context: Value) -> Result<(), AuthContextError> {
        let user_id = context
            .as_object()
            .and_then(|obj| obj.get("user"))
            .and_then(Value::as_object)
            .and_then(|user| user.get("id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .ok_or(AuthContextError::MissingUserId)?;

        *self.user_id.write().expect("user id lock poisoned") = Some(user_id);
        *self.auth_context.write().expect("auth context lock poisoned") = Some(context);
        self.authenticated.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Clear the auth context (`rpc:logout`).
    pub fn clear_auth_context(&self) {
        *self.auth_context.write().expect("auth context lock poisoned") = None;
        *self.user_id.write().expect("user id lock poisoned") = None;
        self.authenticated.store(false, Ordering::SeqCst);
    }

    pub fn replace_transport(&self, transport: Transport) {
        *self.transport.write().expect("transport lock poisoned") = transport;
    }

    /// Swap out the current transport for [`Transport::None`], returning
    /// what was there. Used by the POST method-call path to capture a single
    /// reply on a throwaway transport without disturbing the node's
    /// established one-way push handle.
    pub fn take_transport(&self) -> Transport {
        std::mem::replace(
            &mut *self.transport.write().expect("transport lock poisoned"),
            Transport::None,
        )
    }

    /// Run `f` with `transport` installed in place of whatever this node
    /// currently holds, restoring the previous transport once `f` resolves.
    /// Holds a per-node async lock for the duration so overlapping callers
    /// (concurrent POST-per-call requests against the same client id) queue
    /// instead of racing on the shared transport field.
    pub async fn with_temporary_transport<F, Fut, T>(&self, transport: Transport, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let _guard = self.call_lock.lock().await;
        let previous = self.take_transport();
        self.replace_transport(transport);
        let result = f().await;
        self.replace_transport(previous);
        result
    }

    /// Send an envelope. Routes to the duplex socket if present, otherwise
    /// writes a server-sent-event frame to the one-way push handle,
    /// prefixing a monotonically increasing sequence id and escaping
    /// embedded newlines.
    pub fn send(&self, envelope: &Envelope) -> Result<(), SendError> {
        if self.closed.load(Ordering::SeqCst) {
            // Replies to a closed node are silently dropped.
            return Ok(());
        }
        let bytes = envelope.encode()?;
        self.send_encoded(&bytes)
    }

    /// Send pre-encoded envelope bytes. Used by channel fan-out, where the
    /// payload is encoded once for every subscriber rather than once per
    /// subscriber.
    pub fn send_encoded(&self, bytes: &[u8]) -> Result<(), SendError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let transport = self.transport.read().expect("transport lock poisoned");
        match &*transport {
            Transport::Duplex(tx) => tx.send(bytes.to_vec()).map_err(|_| SendError::Closed),
            Transport::Push(tx) => {
                let seq = self.seq.fetch_add(1, Ordering::SeqCst);
                let payload = String::from_utf8_lossy(bytes);
                let frame = format_sse_frame(seq, &payload);
                tx.send((seq, frame)).map_err(|_| SendError::Closed)
            }
            Transport::None => Err(SendError::NoTransport),
        }
    }

    pub fn send_event(&self, name: &str, channel: Option<String>, params: Option<Value>) -> Result<(), SendError> {
        self.send(&Envelope::new_event(name, channel, params))
    }

    pub fn result(&self, uuid: &str, method: &str, result: Value) -> Result<(), SendError> {
        self.send(&Envelope::new_result(uuid, method, result))
    }

    pub fn error(
        &self,
        uuid: Option<String>,
        code: Option<String>,
        message: impl Into<String>,
        method: Option<String>,
    ) -> Result<(), SendError> {
        self.send(&Envelope::new_error(uuid, code, message, method))
    }

    /// Idempotent close. Returns `true` if this call performed the
    /// transition (so the caller knows whether to run disconnect/pruning
    /// side effects exactly once).
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.keepalive.close();
        *self.transport.write().expect("transport lock poisoned") = Transport::None;
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn format_sse_frame(seq: u64, payload: &str) -> String {
    let escaped = payload.replace('\n', "\ndata: ");
    format!("id: {seq}\ndata: {escaped}\n\n")
}
