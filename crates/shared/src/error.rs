use thiserror::Error;

/// Failures turning a host envelope into a typed request.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("message has no type")]
    MissingType,
    #[error("Unknown event type: {0}")]
    UnknownType(String),
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: String,
        source: serde_json::Error,
    },
}
