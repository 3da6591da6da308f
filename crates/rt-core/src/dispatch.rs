use std::sync::Arc;

use uuid::Uuid;
use wire::{Envelope, FieldError};

use crate::client::ClientNode;
use crate::error::DispatchError;
use crate::method::{merge_params, MethodRegistry, RequestContext};

fn error_envelope(
    uuid: Option<String>,
    code: Option<&'static str>,
    message: impl Into<String>,
    method: Option<String>,
    errors: Option<Vec<FieldError>>,
) -> Envelope {
    Envelope::Error {
        uuid,
        code: code.map(str::to_owned),
        message: message.into(),
        stack: None,
        method,
        errors,
    }
}

fn reply_error(node: &ClientNode, uuid: &str, method: &str, err: &DispatchError) {
    match err {
        DispatchError::Internal(stack) => {
            tracing::error!(method, uuid, stack = %stack, "method handler raised an internal error");
        }
        other => {
            tracing::info!(method, uuid, code = other.code(), "method dispatch failed");
        }
    }
    let envelope = error_envelope(
        Some(uuid.to_owned()),
        err.code(),
        err.client_message(),
        Some(method.to_owned()),
        err.field_errors(),
    );
    let _ = node.send(&envelope);
}

/// Run the seven-step dispatch algorithm for an inbound method call
/// on behalf of `node`.
pub async fn dispatch(
    registry: &MethodRegistry,
    node: Arc<ClientNode>,
    uuid: String,
    method_name: String,
    params: Option<wire::Value>,
    void: bool,
) {
    // Step 1: rate limit.
    if !node.rate_limiter.try_consume(1) {
        if !void {
            reply_error(&node, &uuid, &method_name, &DispatchError::RateLimitExceeded);
        }
        return;
    }

    // Step 2: lookup.
    let Some(method) = registry.get(&method_name) else {
        reply_error(
            &node,
            &uuid,
            &method_name,
            &DispatchError::MethodNotFound(method_name.clone()),
        );
        return;
    };

    // Step 3: protection gate.
    if method.protected && !node.is_authenticated() {
        reply_error(
            &node,
            &uuid,
            &method_name,
            &DispatchError::MethodForbidden(method_name.clone()),
        );
        return;
    }

    // Step 4: schema validation.
    if let Some(schema) = &method.schema {
        if let Err(errors) = schema.validate(params.as_ref()) {
            reply_error(&node, &uuid, &method_name, &DispatchError::SchemaValidation(errors));
            return;
        }
    }

    // Step 5: middleware pipeline, in registration order.
    let mut params = params;
    for middleware in &method.middleware {
        match middleware.call(node.clone(), params.clone()).await {
            Ok(contribution) => params = Some(merge_params(params, contribution)),
            Err(err) => {
                reply_error(&node, &uuid, &method_name, &err);
                return;
            }
        }
    }

    // Step 6: invoke the handler under the request-scoped ambient context.
    let context = RequestContext {
        execution_id: Uuid::new_v4().to_string(),
        auth_context: node.auth_context(),
    };
    let handler = method.handler.clone();
    let call_node = node.clone();
    let outcome = context.scope(async move { handler.call(call_node, params).await }).await;

    if void {
        if let Err(err) = outcome {
            match &err {
                DispatchError::Internal(stack) => {
                    tracing::error!(method = %method_name, uuid, stack = %stack, "void call handler raised an internal error");
                }
                other => {
                    tracing::info!(method = %method_name, uuid, code = other.code(), "method dispatch failed");
                }
            }
        }
        return;
    }

    // Step 7: translate the outcome into a reply.
    match outcome {
        Ok(value) => {
            let _ = node.result(&uuid, &method_name, value);
        }
        Err(err) => reply_error(&node, &uuid, &method_name, &err),
    }
}

/// Surface a malformed inbound envelope as a `parse` error with no
/// correlation id.
pub fn parse_error_envelope(message: impl Into<String>) -> Envelope {
    error_envelope(None, Some("parse"), message, None, None)
}
