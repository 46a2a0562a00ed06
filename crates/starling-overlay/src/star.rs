//! StarOverlayNetwork - single-server star topology.
//!
//! Nodes are tagged server or client at construction. A client may connect
//! to any number of servers and other clients; the only constraint is that
//! two self-declared servers may never link, which the server side rejects
//! with an explicit `error` envelope so the peer can report the cause.

use std::sync::Arc;

use starling_core::{EventHub, PeerEndpoint, PeerEvent};
use tokio::sync::mpsc;

use crate::config::NetworkConfig;
use crate::connection::Connection;
use crate::error::Result;
use crate::event::NetworkEvent;
use crate::greeting::GreetingPolicy;
use crate::network::OverlayNetwork;

/// An overlay network enforcing the star topology.
pub struct StarOverlayNetwork {
    inner: OverlayNetwork,
    server: bool,
}

impl StarOverlayNetwork {
    /// Create a star network with default configuration.
    ///
    /// The role is fixed for the lifetime of the instance.
    pub fn new(
        endpoint: Arc<dyn PeerEndpoint>,
        peer_events: mpsc::Receiver<PeerEvent>,
        server: bool,
    ) -> Self {
        Self::with_config(endpoint, peer_events, server, NetworkConfig::default())
    }

    /// Create a star network with the given configuration.
    pub fn with_config(
        endpoint: Arc<dyn PeerEndpoint>,
        peer_events: mpsc::Receiver<PeerEvent>,
        server: bool,
        config: NetworkConfig,
    ) -> Self {
        Self {
            inner: OverlayNetwork::with_config(
                endpoint,
                peer_events,
                GreetingPolicy::Star { server },
                config,
            ),
            server,
        }
    }

    /// Whether this node declared itself the server.
    pub fn is_server(&self) -> bool {
        self.server
    }

    /// The protocol dialect tag, always `"star"`.
    pub fn network_type(&self) -> &'static str {
        self.inner.network_type()
    }

    /// The identity assigned by the signaling layer, once known.
    pub fn local_id(&self) -> Option<String> {
        self.inner.local_id()
    }

    /// The network's event hub.
    pub fn events(&self) -> &EventHub<NetworkEvent> {
        self.inner.events()
    }

    /// Snapshot of the admitted member connections.
    pub fn members(&self) -> Vec<Arc<Connection>> {
        self.inner.members()
    }

    /// Number of admitted members.
    pub fn member_count(&self) -> usize {
        self.inner.member_count()
    }

    /// Connect to another peer; see [`OverlayNetwork::connect`].
    pub async fn connect(&self, peer_id: &str) -> Result<Arc<Connection>> {
        self.inner.connect(peer_id).await
    }

    /// Access the underlying overlay network.
    pub fn network(&self) -> &OverlayNetwork {
        &self.inner
    }
}

impl std::fmt::Debug for StarOverlayNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StarOverlayNetwork")
            .field("server", &self.server)
            .field("local_id", &self.local_id())
            .field("members", &self.member_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_role_and_type_are_fixed() {
        let signaling = starling_core::MockSignaling::new();
        let (endpoint, events) = signaling.endpoint(Some("hub"));
        let network = StarOverlayNetwork::new(endpoint, events, true);

        assert!(network.is_server());
        assert_eq!(network.network_type(), "star");
        assert_eq!(
            network.network().policy(),
            GreetingPolicy::Star { server: true }
        );
    }
}
