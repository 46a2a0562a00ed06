//! Error types for the channel and signaling collaborators

use thiserror::Error;

/// Errors reported by a raw channel or the signaling layer
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Channel closed")]
    Closed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Peer not found: {0}")]
    PeerNotFound(String),
}

/// Result type alias for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;
