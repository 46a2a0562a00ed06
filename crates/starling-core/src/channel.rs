//! Channel and signaling collaborator traits
//!
//! The overlay treats the underlying transport as opaque: a [`RawChannel`]
//! is any bidirectional message channel between two endpoints, and a
//! [`PeerEndpoint`] is the signaling-layer collaborator that assigns the
//! local peer id and opens channels to remote peers. Connection
//! negotiation, NAT traversal and channel lifecycle all live behind these
//! traits.
//!
//! ## Implementations
//!
//! - [`MockChannel`] / [`MockSignaling`]: in-memory pair for testing
//!   (in the [`mock`] module)
//!
//! [`MockChannel`]: crate::mock::MockChannel
//! [`MockSignaling`]: crate::mock::MockSignaling
//! [`mock`]: crate::mock

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::ChannelError;

/// Lifecycle and traffic events delivered by a raw channel to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The channel is ready for traffic.
    Open,
    /// The channel was closed by either side; no further events follow.
    Close,
    /// A payload arrived from the peer.
    Data(Value),
    /// The transport reported an error. Non-fatal: the channel stays up
    /// unless a `Close` follows.
    Error(String),
}

/// A raw bidirectional message channel between two endpoints.
///
/// Payloads are structured serializable values; delivery is FIFO per
/// channel with no guarantee across channels.
#[async_trait]
pub trait RawChannel: Send + Sync + fmt::Debug {
    /// Send a payload to the peer, fire-and-forget.
    async fn send(&self, payload: Value) -> Result<(), ChannelError>;

    /// Close the channel. Both sides observe [`ChannelEvent::Close`].
    async fn close(&self) -> Result<(), ChannelError>;
}

/// A raw channel together with the receiving end of its event stream.
///
/// Handed to exactly one owner; events are FIFO in the order the channel
/// delivered them.
#[derive(Debug)]
pub struct ChannelPair {
    /// The send/close half of the channel.
    pub channel: Arc<dyn RawChannel>,
    /// Lifecycle and traffic events, FIFO.
    pub events: mpsc::Receiver<ChannelEvent>,
}

impl ChannelPair {
    /// Bundle a channel with its event stream.
    pub fn new(channel: Arc<dyn RawChannel>, events: mpsc::Receiver<ChannelEvent>) -> Self {
        Self { channel, events }
    }
}

/// Events delivered by the signaling layer.
#[derive(Debug)]
pub enum PeerEvent {
    /// The local identity was assigned (or reassigned) by the signaling
    /// layer.
    Open(String),
    /// An inbound channel from a remote peer.
    Connection(ChannelPair),
    /// The link to the signaling layer was lost. Existing channels are
    /// unaffected by this event alone.
    Disconnected,
}

/// The signaling-layer collaborator for opening outbound channels.
#[async_trait]
pub trait PeerEndpoint: Send + Sync {
    /// Open a raw channel to the given peer.
    async fn connect(&self, peer_id: &str) -> Result<ChannelPair, ChannelError>;
}
