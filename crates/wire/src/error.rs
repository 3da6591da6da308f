use thiserror::Error;

/// Failures from encoding or decoding a value or envelope.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("value graph too deep")]
    TooDeep,
    #[error("missing or invalid envelope `type` field")]
    UnknownEnvelopeType,
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::Parse(e.to_string())
    }
}
