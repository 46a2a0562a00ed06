//! Mock transport implementation for testing
//!
//! Provides in-memory channels and a signaling registry for testing
//! connection and overlay logic without real network connections.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use starling_core::MockSignaling;
//!
//! let signaling = MockSignaling::new();
//! let (server, server_events) = signaling.endpoint(Some("server-1"));
//! let (client, _client_events) = signaling.endpoint(None);
//!
//! // The client opens a channel; the server observes PeerEvent::Connection
//! let pair = client.connect("server-1").await.unwrap();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::channel::{ChannelEvent, ChannelPair, PeerEndpoint, PeerEvent, RawChannel};
use crate::error::ChannelError;

/// One half of an in-memory channel pair.
///
/// Payloads sent on one half arrive as [`ChannelEvent::Data`] on the other.
/// Both halves observe [`ChannelEvent::Open`] on creation and
/// [`ChannelEvent::Close`] when either half is closed.
pub struct MockChannel {
    /// Events delivered to our own owner.
    local_tx: mpsc::Sender<ChannelEvent>,
    /// Events delivered to the peer's owner.
    remote_tx: mpsc::Sender<ChannelEvent>,
    /// Shared across both halves; set exactly once.
    closed: Arc<AtomicBool>,
}

impl MockChannel {
    /// Create a connected channel pair with the default buffer.
    pub fn pair() -> (
        (Arc<MockChannel>, mpsc::Receiver<ChannelEvent>),
        (Arc<MockChannel>, mpsc::Receiver<ChannelEvent>),
    ) {
        Self::pair_with_buffer(64)
    }

    /// Create a connected channel pair with a specific event buffer size.
    pub fn pair_with_buffer(
        buffer: usize,
    ) -> (
        (Arc<MockChannel>, mpsc::Receiver<ChannelEvent>),
        (Arc<MockChannel>, mpsc::Receiver<ChannelEvent>),
    ) {
        let buffer = buffer.max(1);
        let (a_tx, a_rx) = mpsc::channel(buffer);
        let (b_tx, b_rx) = mpsc::channel(buffer);
        let closed = Arc::new(AtomicBool::new(false));

        let a = Arc::new(MockChannel {
            local_tx: a_tx.clone(),
            remote_tx: b_tx.clone(),
            closed: closed.clone(),
        });
        let b = Arc::new(MockChannel {
            local_tx: b_tx.clone(),
            remote_tx: a_tx.clone(),
            closed,
        });

        // Both sides see the channel open immediately; buffer is >= 1 so
        // these cannot fail on a fresh channel.
        let _ = a_tx.try_send(ChannelEvent::Open);
        let _ = b_tx.try_send(ChannelEvent::Open);

        ((a, a_rx), (b, b_rx))
    }

    /// Create a connected pair already bundled as [`ChannelPair`]s.
    pub fn connected_pair() -> (ChannelPair, ChannelPair) {
        let ((a, a_rx), (b, b_rx)) = Self::pair();
        (ChannelPair::new(a, a_rx), ChannelPair::new(b, b_rx))
    }

    /// Deliver a transport error to this half's owner.
    pub async fn inject_error(&self, message: impl Into<String>) {
        let _ = self
            .local_tx
            .send(ChannelEvent::Error(message.into()))
            .await;
    }

    /// Whether either half has closed the channel.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RawChannel for MockChannel {
    async fn send(&self, payload: Value) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        self.remote_tx
            .send(ChannelEvent::Data(payload))
            .await
            .map_err(|_| ChannelError::SendFailed("peer inbox closed".into()))
    }

    async fn close(&self) -> Result<(), ChannelError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.local_tx.send(ChannelEvent::Close).await;
            let _ = self.remote_tx.send(ChannelEvent::Close).await;
        }
        Ok(())
    }
}

impl std::fmt::Debug for MockChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockChannel")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// In-memory signaling registry.
///
/// Hands out [`MockEndpoint`]s keyed by peer id and routes inbound
/// connections to the matching endpoint's event stream.
pub struct MockSignaling {
    peers: Arc<DashMap<String, mpsc::Sender<PeerEvent>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Default for MockSignaling {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSignaling {
    /// Create an empty registry with the default buffer size.
    pub fn new() -> Self {
        Self {
            peers: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: 64,
        }
    }

    /// Register a new endpoint.
    ///
    /// The requested id is honored if free; a taken or absent id is
    /// reassigned, mirroring a real signaling layer. The assigned id
    /// arrives as the endpoint's first event, [`PeerEvent::Open`].
    pub fn endpoint(
        &self,
        requested: Option<&str>,
    ) -> (Arc<MockEndpoint>, mpsc::Receiver<PeerEvent>) {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = match requested {
            Some(id) if !self.peers.contains_key(id) => id.to_string(),
            Some(id) => format!("{id}-{n}"),
            None => format!("peer-{n}"),
        };

        let (tx, rx) = mpsc::channel(self.buffer.max(1));
        let _ = tx.try_send(PeerEvent::Open(id.clone()));
        self.peers.insert(id.clone(), tx);

        let endpoint = Arc::new(MockEndpoint {
            id,
            peers: self.peers.clone(),
            buffer: self.buffer,
        });
        (endpoint, rx)
    }

    /// Drop an endpoint from the registry and notify it.
    ///
    /// Existing channels are unaffected; only new inbound connections stop
    /// reaching it. Returns `false` for an unknown id.
    pub fn disconnect(&self, id: &str) -> bool {
        match self.peers.remove(id) {
            Some((_, tx)) => {
                let _ = tx.try_send(PeerEvent::Disconnected);
                true
            }
            None => false,
        }
    }

    /// Number of registered endpoints.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

/// A registered peer endpoint backed by [`MockSignaling`].
pub struct MockEndpoint {
    id: String,
    peers: Arc<DashMap<String, mpsc::Sender<PeerEvent>>>,
    buffer: usize,
}

impl MockEndpoint {
    /// The id assigned by the registry.
    pub fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl PeerEndpoint for MockEndpoint {
    async fn connect(&self, peer_id: &str) -> Result<ChannelPair, ChannelError> {
        let remote = self
            .peers
            .get(peer_id)
            .ok_or_else(|| ChannelError::PeerNotFound(peer_id.to_string()))?
            .clone();

        let ((local, local_rx), (remote_half, remote_rx)) =
            MockChannel::pair_with_buffer(self.buffer);

        remote
            .send(PeerEvent::Connection(ChannelPair::new(
                remote_half,
                remote_rx,
            )))
            .await
            .map_err(|_| ChannelError::ConnectionFailed(format!("{peer_id} is gone")))?;

        Ok(ChannelPair::new(local, local_rx))
    }
}

impl std::fmt::Debug for MockEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEndpoint").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_channel_send_recv() {
        let ((a, _a_rx), (_b, mut b_rx)) = MockChannel::pair();

        assert_eq!(b_rx.recv().await, Some(ChannelEvent::Open));

        a.send(json!({"hello": "bob"})).await.unwrap();
        assert_eq!(
            b_rx.recv().await,
            Some(ChannelEvent::Data(json!({"hello": "bob"})))
        );
    }

    #[tokio::test]
    async fn test_mock_channel_bidirectional() {
        let ((a, mut a_rx), (b, mut b_rx)) = MockChannel::pair();
        assert_eq!(a_rx.recv().await, Some(ChannelEvent::Open));
        assert_eq!(b_rx.recv().await, Some(ChannelEvent::Open));

        a.send(json!(1)).await.unwrap();
        b.send(json!(2)).await.unwrap();

        assert_eq!(b_rx.recv().await, Some(ChannelEvent::Data(json!(1))));
        assert_eq!(a_rx.recv().await, Some(ChannelEvent::Data(json!(2))));
    }

    #[tokio::test]
    async fn test_mock_channel_close_notifies_both_sides() {
        let ((a, mut a_rx), (b, mut b_rx)) = MockChannel::pair();
        assert_eq!(a_rx.recv().await, Some(ChannelEvent::Open));
        assert_eq!(b_rx.recv().await, Some(ChannelEvent::Open));

        a.close().await.unwrap();

        assert_eq!(a_rx.recv().await, Some(ChannelEvent::Close));
        assert_eq!(b_rx.recv().await, Some(ChannelEvent::Close));
        assert!(b.is_closed());

        // Sending on a closed channel fails
        assert!(matches!(
            b.send(json!(1)).await,
            Err(ChannelError::Closed)
        ));

        // Double close is idempotent and queues no second Close
        a.close().await.unwrap();
        assert!(tokio::time::timeout(
            std::time::Duration::from_millis(20),
            a_rx.recv()
        )
        .await
        .is_err());
    }

    #[tokio::test]
    async fn test_mock_channel_error_injection() {
        let ((a, mut a_rx), _b) = MockChannel::pair();
        assert_eq!(a_rx.recv().await, Some(ChannelEvent::Open));

        a.inject_error("ice failure").await;
        assert_eq!(
            a_rx.recv().await,
            Some(ChannelEvent::Error("ice failure".to_string()))
        );
    }

    #[tokio::test]
    async fn test_signaling_assigns_ids() {
        let signaling = MockSignaling::new();

        let (server, mut server_events) = signaling.endpoint(Some("server-1"));
        assert_eq!(server.id(), "server-1");
        assert!(matches!(
            server_events.recv().await,
            Some(PeerEvent::Open(id)) if id == "server-1"
        ));

        // A taken id is reassigned
        let (other, _events) = signaling.endpoint(Some("server-1"));
        assert_ne!(other.id(), "server-1");
        assert!(other.id().starts_with("server-1"));

        // No request: generated id
        let (anon, _events) = signaling.endpoint(None);
        assert!(anon.id().starts_with("peer-"));

        assert_eq!(signaling.peer_count(), 3);
    }

    #[tokio::test]
    async fn test_signaling_connect_delivers_inbound_pair() {
        let signaling = MockSignaling::new();
        let (server, mut server_events) = signaling.endpoint(Some("server-1"));
        let (client, _client_events) = signaling.endpoint(None);
        assert!(matches!(server_events.recv().await, Some(PeerEvent::Open(_))));

        let mut outbound = client.connect("server-1").await.unwrap();

        let mut inbound = match server_events.recv().await {
            Some(PeerEvent::Connection(pair)) => pair,
            other => panic!("expected inbound connection, got {other:?}"),
        };

        assert_eq!(outbound.events.recv().await, Some(ChannelEvent::Open));
        assert_eq!(inbound.events.recv().await, Some(ChannelEvent::Open));

        outbound.channel.send(json!("hi")).await.unwrap();
        assert_eq!(
            inbound.events.recv().await,
            Some(ChannelEvent::Data(json!("hi")))
        );
    }

    #[tokio::test]
    async fn test_signaling_connect_unknown_peer() {
        let signaling = MockSignaling::new();
        let (client, _events) = signaling.endpoint(None);

        let result = client.connect("nobody").await;
        assert!(matches!(result, Err(ChannelError::PeerNotFound(_))));
    }

    #[tokio::test]
    async fn test_signaling_disconnect() {
        let signaling = MockSignaling::new();
        let (endpoint, mut events) = signaling.endpoint(Some("server-1"));
        assert!(matches!(events.recv().await, Some(PeerEvent::Open(_))));

        assert!(signaling.disconnect(endpoint.id()));
        assert!(matches!(events.recv().await, Some(PeerEvent::Disconnected)));
        assert!(!signaling.disconnect("server-1"));
    }
}
