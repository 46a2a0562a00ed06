//! Wire envelopes
//!
//! Every payload placed on a raw channel is one of these tagged messages.
//! The `var`/`data`/`ping`/`pong` envelopes are the connection layer's
//! traffic; `peerGreeting` and `error` form a reserved protocol channel
//! consumed by the overlay layer and never surfaced as application data.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tagged message exchanged over a raw channel.
///
/// Serializes to the wire format `{"type": "...", ...}`. Payload values
/// (`value`/`data`) are free-form JSON: strings, numbers, booleans, null,
/// sequences and string-keyed mappings, recursively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Envelope {
    /// Set a shared variable on the peer.
    Var {
        /// Variable name.
        name: String,
        /// New value.
        value: Value,
    },
    /// Opaque application payload, fire-and-forget.
    Data {
        /// The payload.
        data: Value,
    },
    /// Latency probe request.
    Ping {
        /// Probe start timestamp, milliseconds since the epoch.
        time: u64,
    },
    /// Latency probe response, echoing the request's timestamp.
    Pong {
        /// Echo of the matching ping's `time`.
        time: u64,
    },
    /// First protocol envelope on a new channel; admits or rejects it
    /// into the overlay.
    PeerGreeting {
        /// Protocol dialect tag; incompatible peers are rejected.
        #[serde(rename = "networkType")]
        network_type: String,
        /// Star topology role, present only for star greetings.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server: Option<bool>,
    },
    /// Explicit rejection cause sent to a peer before closing.
    Error {
        /// Human-readable cause.
        error: String,
    },
}

impl Envelope {
    /// Decode a raw channel payload.
    ///
    /// Returns `None` for malformed or unrecognized payloads; those must
    /// never fault the connection.
    pub fn decode(payload: &Value) -> Option<Self> {
        serde_json::from_value(payload.clone()).ok()
    }

    /// Encode for transmission over a raw channel.
    pub fn encode(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Whether this envelope belongs to the reserved overlay protocol
    /// channel rather than to application traffic.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::PeerGreeting { .. } | Self::Error { .. })
    }
}
