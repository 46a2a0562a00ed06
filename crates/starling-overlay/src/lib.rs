//! # Starling Overlay
//!
//! A small overlay network on top of arbitrary point-to-point data
//! channels.
//!
//! The overlay is built from three layers:
//!
//! - [`Connection`]: wraps one raw channel and adds the typed envelope
//!   protocol: shared variables, opaque data, latency probes
//! - [`OverlayNetwork`]: owns the local identity and the set of member
//!   connections, admitting each new channel through a greeting handshake
//! - [`StarOverlayNetwork`]: enforces the single-server star topology on
//!   top of the base handshake
//!
//! ## Example
//!
//! ```ignore
//! use starling_core::MockSignaling;
//! use starling_overlay::prelude::*;
//!
//! let signaling = MockSignaling::new();
//! let (endpoint, events) = signaling.endpoint(Some("server-1"));
//! let server = StarOverlayNetwork::new(endpoint, events, true);
//!
//! server.events().subscribe(|event| {
//!     if let NetworkEvent::Connection(connection) = event {
//!         println!("admitted {connection}");
//!     }
//! });
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod greeting;
pub mod network;
pub mod star;

pub use config::{ConnectionConfig, NetworkConfig};
pub use connection::{Connection, ConnectionId};
pub use error::{OverlayError, Result};
pub use event::{ConnectionEvent, NetworkEvent};
pub use greeting::{GreetingPolicy, GreetingVerdict};
pub use network::OverlayNetwork;
pub use star::StarOverlayNetwork;

/// Commonly used types, for glob import.
pub mod prelude {
    pub use crate::config::{ConnectionConfig, NetworkConfig};
    pub use crate::connection::Connection;
    pub use crate::error::{OverlayError, Result};
    pub use crate::event::{ConnectionEvent, NetworkEvent};
    pub use crate::network::OverlayNetwork;
    pub use crate::star::StarOverlayNetwork;
    pub use starling_core::{Envelope, EventHub, PeerEndpoint, PeerEvent};
}
