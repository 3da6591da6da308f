use thiserror::Error;
use wire::FieldError;

/// The dispatcher's error taxonomy. Each variant maps to a fixed
/// `code` on the outbound error envelope except [`DispatchError::Public`],
/// which forwards the handler's message with no code, and
/// [`DispatchError::Internal`], whose message is never forwarded.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("method forbidden: {0}")]
    MethodForbidden(String),
    #[error("schema validation failed")]
    SchemaValidation(Vec<FieldError>),
    #[error("event not found: {0}")]
    EventNotFound(String),
    #[error("event subscription forbidden: {0}")]
    EventForbidden(String),
    #[error("{0}")]
    Public(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn code(&self) -> Option<&'static str> {
        match self {
            DispatchError::RateLimitExceeded => Some("rate-limit-exceeded"),
            DispatchError::MethodNotFound(_) => Some("method-not-found"),
            DispatchError::MethodForbidden(_) => Some("method-forbidden"),
            DispatchError::SchemaValidation(_) => Some("schema-validation"),
            DispatchError::EventNotFound(_) => Some("event-not-found"),
            DispatchError::EventForbidden(_) => Some("event-forbidden"),
            DispatchError::Public(_) => None,
            DispatchError::Internal(_) => Some("internal-error"),
        }
    }

    /// The message surfaced to the caller. Internal errors never forward
    /// their real message; the stack is logged server-side instead.
    pub fn client_message(&self) -> String {
        match self {
            DispatchError::Internal(_) => "internal server error".to_owned(),
            other => other.to_string(),
        }
    }

    pub fn field_errors(&self) -> Option<Vec<FieldError>> {
        match self {
            DispatchError::SchemaValidation(errors) => Some(errors.clone()),
            _ => None,
        }
    }
}
