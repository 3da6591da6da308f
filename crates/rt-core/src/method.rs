use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use wire::Value;

use crate::client::ClientNode;
use crate::error::DispatchError;
use crate::schema::Schema;

tokio::task_local! {
    /// Ambient per-call store: `{ executionId, context }`, inspectable by
    /// any code a handler calls, distinct per in-flight call, never leaking
    /// between calls even under heavy interleaving.
    static REQUEST_CONTEXT: RequestContext;
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub execution_id: String,
    pub auth_context: Option<Value>,
}

impl RequestContext {
    /// Read the ambient context for the call currently executing on this
    /// task. Panics if called outside a dispatch's `scope` — that would be
    /// a programming error in a handler or middleware, not a runtime
    /// condition to recover from.
    pub fn current() -> RequestContext {
        REQUEST_CONTEXT.with(Clone::clone)
    }

    pub(crate) async fn scope<F: std::future::Future>(self, fut: F) -> F::Output {
        REQUEST_CONTEXT.scope(self, fut).await
    }
}

/// A handler invoked with the final, middleware-processed `params`. Takes
/// the shared node handle rather than a borrow since handlers commonly need
/// to hold onto it past the call (e.g. to `send_event` later).
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn call(&self, node: Arc<ClientNode>, params: Option<Value>) -> Result<Value, DispatchError>;
}

/// Adapts a plain async closure to [`MethodHandler`], for registering a
/// handler without a dedicated type.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> MethodHandler for FnHandler<F>
where
    F: Fn(Arc<ClientNode>, Option<Value>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, DispatchError>> + Send,
{
    async fn call(&self, node: Arc<ClientNode>, params: Option<Value>) -> Result<Value, DispatchError> {
        (self.0)(node, params).await
    }
}

/// Middleware receives the current `params` and returns a contribution:
/// an object is merged into `params`, any other value replaces it entirely
///.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn call(&self, node: Arc<ClientNode>, params: Option<Value>) -> Result<Value, DispatchError>;
}

/// Adapts a plain async closure to [`Middleware`], mirroring [`FnHandler`].
pub struct FnMiddleware<F>(pub F);

#[async_trait]
impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Arc<ClientNode>, Option<Value>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, DispatchError>> + Send,
{
    async fn call(&self, node: Arc<ClientNode>, params: Option<Value>) -> Result<Value, DispatchError> {
        (self.0)(node, params).await
    }
}

/// Apply one middleware's contribution to the running `params`.
pub fn merge_params(current: Option<Value>, contribution: Value) -> Value {
    match contribution {
        Value::Object(new_fields) => {
            let mut merged = match current {
                Some(Value::Object(existing)) => existing,
                _ => BTreeMap::new(),
            };
            for (k, v) in new_fields {
                merged.insert(k, v);
            }
            Value::Object(merged)
        }
        other => other,
    }
}

#[derive(Default)]
pub struct MethodOptions {
    pub protected: bool,
    pub middleware: Vec<Arc<dyn Middleware>>,
    pub schema: Option<Schema>,
}

pub struct Method {
    pub name: String,
    pub protected: bool,
    pub middleware: Vec<Arc<dyn Middleware>>,
    pub schema: Option<Schema>,
    pub handler: Arc<dyn MethodHandler>,
}

/// Registry of named methods.
///
/// Dotted names (`"users.create"`) are the canonical flat key; any
/// hierarchical registration sugar is a view over this same map.
#[derive(Default)]
pub struct MethodRegistry {
    methods: RwLock<HashMap<String, Arc<Method>>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, name: impl Into<String>, handler: Arc<dyn MethodHandler>, options: MethodOptions) {
        let name = name.into();
        let method = Arc::new(Method {
            name: name.clone(),
            protected: options.protected,
            middleware: options.middleware,
            schema: options.schema,
            handler,
        });
        self.methods.write().expect("method registry lock poisoned").insert(name, method);
    }

    pub fn get(&self, name: &str) -> Option<Arc<Method>> {
        self.methods.read().expect("method registry lock poisoned").get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .methods
            .read()
            .expect("method registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
