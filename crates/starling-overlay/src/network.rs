//! OverlayNetwork - membership over the greeting handshake.
//!
//! Every raw channel, inbound or outbound, is wrapped in a [`Connection`]
//! and run through the same pending flow: on open both sides send their
//! greeting, and a connection only becomes a member (and is only exposed
//! to the application) once the received greeting passes the network's
//! [`GreetingPolicy`]. Rejected connections are closed without ever
//! appearing as a `Connection` event.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use starling_core::{ChannelPair, Envelope, EventHub, PeerEndpoint, PeerEvent};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::NetworkConfig;
use crate::connection::{Connection, ConnectionId};
use crate::error::{OverlayError, Result};
use crate::event::{ConnectionEvent, NetworkEvent};
use crate::greeting::{GreetingPolicy, GreetingVerdict};

/// An overlay network over a signaling endpoint.
///
/// Owns its member connections: a member is removed when its channel
/// closes, and connections hold no reference back to the network.
pub struct OverlayNetwork {
    endpoint: Arc<dyn PeerEndpoint>,
    shared: Arc<Shared>,
}

struct Shared {
    policy: GreetingPolicy,
    local_id: RwLock<Option<String>>,
    members: DashMap<ConnectionId, Arc<Connection>>,
    hub: EventHub<NetworkEvent>,
    config: NetworkConfig,
}

impl OverlayNetwork {
    /// Create a network with default configuration.
    pub fn new(
        endpoint: Arc<dyn PeerEndpoint>,
        peer_events: mpsc::Receiver<PeerEvent>,
        policy: GreetingPolicy,
    ) -> Self {
        Self::with_config(endpoint, peer_events, policy, NetworkConfig::default())
    }

    /// Create a network with the given configuration.
    pub fn with_config(
        endpoint: Arc<dyn PeerEndpoint>,
        peer_events: mpsc::Receiver<PeerEvent>,
        policy: GreetingPolicy,
        config: NetworkConfig,
    ) -> Self {
        let shared = Arc::new(Shared {
            policy,
            local_id: RwLock::new(None),
            members: DashMap::new(),
            hub: EventHub::new(),
            config,
        });
        tokio::spawn(shared.clone().drive(peer_events));
        Self { endpoint, shared }
    }

    /// The protocol dialect tag this network greets with.
    pub fn network_type(&self) -> &'static str {
        self.shared.policy.network_type()
    }

    /// The handshake policy in force.
    pub fn policy(&self) -> GreetingPolicy {
        self.shared.policy
    }

    /// The identity assigned by the signaling layer, once known.
    pub fn local_id(&self) -> Option<String> {
        self.shared.local_id.read().clone()
    }

    /// The network's event hub.
    pub fn events(&self) -> &EventHub<NetworkEvent> {
        &self.shared.hub
    }

    /// Snapshot of the admitted member connections.
    pub fn members(&self) -> Vec<Arc<Connection>> {
        self.shared
            .members
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of admitted members.
    pub fn member_count(&self) -> usize {
        self.shared.members.len()
    }

    /// Connect to another peer.
    ///
    /// The returned connection is pending: it becomes a member, and the
    /// `Connection` event fires, only after the greeting exchange
    /// succeeds. Connecting to the local id is a precondition violation
    /// and sends no traffic.
    pub async fn connect(&self, peer_id: &str) -> Result<Arc<Connection>> {
        if self.shared.local_id.read().as_deref() == Some(peer_id) {
            return Err(OverlayError::SelfConnection(peer_id.to_string()));
        }

        let pair = self.endpoint.connect(peer_id).await?;
        debug!(peer_id, "outbound channel opened");
        Ok(self.shared.clone().adopt(pair))
    }
}

impl std::fmt::Debug for OverlayNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayNetwork")
            .field("network_type", &self.network_type())
            .field("local_id", &self.local_id())
            .field("members", &self.member_count())
            .finish()
    }
}

impl Shared {
    async fn drive(self: Arc<Self>, mut peer_events: mpsc::Receiver<PeerEvent>) {
        while let Some(event) = peer_events.recv().await {
            match event {
                PeerEvent::Open(id) => {
                    info!(%id, "signaling endpoint open");
                    *self.local_id.write() = Some(id.clone());
                    self.hub.emit(&NetworkEvent::Open(id));
                }
                PeerEvent::Connection(pair) => {
                    debug!("inbound channel");
                    self.clone().adopt(pair);
                }
                PeerEvent::Disconnected => {
                    warn!("lost link to the signaling layer");
                    self.hub.emit(&NetworkEvent::Disconnected);
                }
            }
        }
    }

    /// Wrap a raw channel and run it through the pending-greeting flow.
    fn adopt(self: Arc<Self>, pair: ChannelPair) -> Arc<Connection> {
        let connection = Arc::new(Connection::new(pair, self.config.connection.clone()));
        // Subscribe before starting dispatch so the Open event is never
        // missed
        let events = connection.events().subscribe_channel();
        tokio::spawn(self.watch(connection.clone(), events));
        connection.start();
        connection
    }

    async fn watch(
        self: Arc<Self>,
        connection: Arc<Connection>,
        mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
    ) {
        let mut admitted = false;
        while let Some(event) = events.recv().await {
            match event {
                ConnectionEvent::Open => {
                    if let Err(err) = connection.send_envelope(&self.policy.greeting()).await {
                        warn!(connection = %connection, %err, "failed to send greeting");
                    }
                }
                ConnectionEvent::Protocol(Envelope::PeerGreeting {
                    network_type,
                    server,
                }) => {
                    if admitted {
                        warn!(connection = %connection, "duplicate greeting ignored");
                        continue;
                    }
                    match self.policy.check(&network_type, server) {
                        GreetingVerdict::Admit => {
                            admitted = true;
                            self.members.insert(connection.id(), connection.clone());
                            debug!(connection = %connection, "peer admitted");
                            self.hub.emit(&NetworkEvent::Connection(connection.clone()));
                        }
                        GreetingVerdict::Reject { notify } => {
                            error!(
                                connection = %connection,
                                %network_type,
                                "connection error: greeting rejected"
                            );
                            if let Some(cause) = notify {
                                if let Err(err) = connection
                                    .send_envelope(&Envelope::Error { error: cause })
                                    .await
                                {
                                    warn!(
                                        connection = %connection,
                                        %err,
                                        "failed to send rejection notice"
                                    );
                                }
                            }
                            if let Err(err) = connection.close().await {
                                warn!(connection = %connection, %err, "failed to close rejected connection");
                            }
                        }
                    }
                }
                ConnectionEvent::Protocol(Envelope::Error { error }) => {
                    error!(connection = %connection, %error, "peer reported an error");
                    self.hub.emit(&NetworkEvent::PeerError(error));
                }
                ConnectionEvent::Protocol(other) => {
                    warn!(connection = %connection, ?other, "unknown protocol envelope ignored");
                }
                ConnectionEvent::UnknownData(payload) => {
                    warn!(connection = %connection, ?payload, "unknown data ignored");
                }
                ConnectionEvent::Close => {
                    // Idempotent: pending connections were never inserted
                    self.members.remove(&connection.id());
                    break;
                }
                // Application traffic is not the network's concern
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starling_core::MockSignaling;
    use std::time::Duration;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn network(
        signaling: &MockSignaling,
        id: &str,
        policy: GreetingPolicy,
    ) -> (OverlayNetwork, mpsc::UnboundedReceiver<NetworkEvent>) {
        let (endpoint, events) = signaling.endpoint(Some(id));
        let network = OverlayNetwork::new(endpoint, events, policy);
        let rx = network.events().subscribe_channel();
        (network, rx)
    }

    #[tokio::test]
    async fn test_local_id_assigned_on_open() {
        let signaling = MockSignaling::new();
        let (network, _rx) = network(&signaling, "alpha", GreetingPolicy::Default);

        settle().await;
        assert_eq!(network.local_id().as_deref(), Some("alpha"));
    }

    #[tokio::test]
    async fn test_default_networks_admit_each_other() {
        let signaling = MockSignaling::new();
        let (a, mut a_rx) = network(&signaling, "alpha", GreetingPolicy::Default);
        let (b, mut b_rx) = network(&signaling, "beta", GreetingPolicy::Default);
        settle().await;

        let pending = a.connect("beta").await.unwrap();

        let admitted_on_a = loop {
            match a_rx.recv().await {
                Some(NetworkEvent::Connection(connection)) => break connection,
                Some(_) => continue,
                None => panic!("event stream ended"),
            }
        };
        assert_eq!(admitted_on_a.id(), pending.id());

        loop {
            match b_rx.recv().await {
                Some(NetworkEvent::Connection(_)) => break,
                Some(_) => continue,
                None => panic!("event stream ended"),
            }
        }

        assert_eq!(a.member_count(), 1);
        assert_eq!(b.member_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_to_self_is_rejected_without_traffic() {
        let signaling = MockSignaling::new();
        let (network, _rx) = network(&signaling, "alpha", GreetingPolicy::Default);
        settle().await;

        let result = network.connect("alpha").await;
        assert!(matches!(result, Err(OverlayError::SelfConnection(_))));
        assert_eq!(network.member_count(), 0);
    }

    #[tokio::test]
    async fn test_member_removed_on_close() {
        let signaling = MockSignaling::new();
        let (a, mut a_rx) = network(&signaling, "alpha", GreetingPolicy::Default);
        let (b, _b_rx) = network(&signaling, "beta", GreetingPolicy::Default);
        settle().await;

        let connection = a.connect("beta").await.unwrap();
        loop {
            if let Some(NetworkEvent::Connection(_)) = a_rx.recv().await {
                break;
            }
        }
        assert_eq!(a.member_count(), 1);

        connection.close().await.unwrap();
        settle().await;

        assert_eq!(a.member_count(), 0);
        assert_eq!(b.member_count(), 0);
    }

    #[tokio::test]
    async fn test_signaling_loss_leaves_members_intact() {
        let signaling = MockSignaling::new();
        let (a, mut a_rx) = network(&signaling, "alpha", GreetingPolicy::Default);
        let (_b, _b_rx) = network(&signaling, "beta", GreetingPolicy::Default);
        settle().await;

        a.connect("beta").await.unwrap();
        loop {
            if let Some(NetworkEvent::Connection(_)) = a_rx.recv().await {
                break;
            }
        }

        signaling.disconnect("alpha");
        loop {
            match a_rx.recv().await {
                Some(NetworkEvent::Disconnected) => break,
                Some(_) => continue,
                None => panic!("event stream ended"),
            }
        }
        assert_eq!(a.member_count(), 1);
    }
}
