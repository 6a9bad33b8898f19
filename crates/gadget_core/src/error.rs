use std::time::Duration;

use shared::domain::BlockId;
use thiserror::Error;

/// Failures opening or running the peer websocket.
///
/// Every variant renders with the `WebSocket error:` prefix because the text is
/// forwarded verbatim to the host frame.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("WebSocket error: invalid server address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("WebSocket error: {0}")]
    Connect(String),
    #[error("WebSocket error: timed out connecting to {address} after {timeout:?}")]
    ConnectTimeout { address: String, timeout: Duration },
    #[error("WebSocket error: {0}")]
    Receive(String),
}

impl TransportError {
    /// The error text without the transport prefix, as recorded in session state.
    pub fn detail(&self) -> String {
        let rendered = self.to_string();
        rendered
            .strip_prefix("WebSocket error: ")
            .map(str::to_string)
            .unwrap_or(rendered)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("document has no blocks")]
    EmptyDocument,
    #[error("block {0} not found in document")]
    BlockNotFound(BlockId),
    #[error("anchor block has no id")]
    MissingBlockId,
}
