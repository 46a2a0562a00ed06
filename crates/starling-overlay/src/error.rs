//! Error types for the overlay layer

use std::time::Duration;

use starling_core::ChannelError;
use thiserror::Error;

/// Top-level error type for overlay operations
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Ping timed out after {0:?}")]
    PingTimeout(Duration),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Cannot connect to yourself: {0}")]
    SelfConnection(String),
}

/// Result type alias for overlay operations
pub type Result<T> = std::result::Result<T, OverlayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err: OverlayError = ChannelError::Closed.into();
        assert!(format!("{}", err).contains("Channel error"));

        let err = OverlayError::PingTimeout(Duration::from_secs(10));
        assert!(format!("{}", err).contains("timed out"));

        let err = OverlayError::SelfConnection("peer-1".to_string());
        assert!(format!("{}", err).contains("peer-1"));

        assert!(format!("{}", OverlayError::ConnectionClosed).contains("closed"));
    }

    #[test]
    fn test_channel_error_conversion() {
        let err: OverlayError = ChannelError::PeerNotFound("peer-9".to_string()).into();
        assert!(matches!(err, OverlayError::Channel(_)));
    }
}
