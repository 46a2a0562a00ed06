//! Application-facing events

use std::sync::Arc;

use serde_json::Value;
use starling_core::Envelope;

use crate::connection::Connection;

/// Events emitted by a [`Connection`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The underlying channel is ready for traffic.
    Open,
    /// The underlying channel closed; no further events follow.
    Close,
    /// The transport reported an error. Non-fatal: the connection stays up
    /// unless a `Close` follows.
    Error(String),
    /// An opaque application payload arrived from the peer.
    Data(Value),
    /// A shared variable changed.
    VarUpdate {
        /// Variable name.
        name: String,
        /// New value.
        value: Value,
        /// `true` when the write originated locally, `false` when it was
        /// received from the peer.
        local: bool,
    },
    /// A malformed or unrecognized payload arrived. Never fatal.
    UnknownData(Value),
    /// A reserved protocol envelope (greeting or error) arrived. Consumed
    /// by the overlay layer; applications normally ignore it.
    Protocol(Envelope),
}

/// Events emitted by an [`OverlayNetwork`].
///
/// [`OverlayNetwork`]: crate::network::OverlayNetwork
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// The local identity was assigned (or reassigned) by the signaling
    /// layer.
    Open(String),
    /// A peer passed the greeting handshake and joined the overlay. Any
    /// traffic that raced this event is waiting in the connection's
    /// buffered stream, see [`Connection::take_events`].
    Connection(Arc<Connection>),
    /// The link to the signaling layer was lost. Existing members are
    /// unaffected by this event alone.
    Disconnected,
    /// A peer sent an explicit error envelope, e.g. the cause of a
    /// handshake rejection.
    PeerError(String),
}
