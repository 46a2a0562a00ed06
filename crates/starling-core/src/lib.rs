//! # Starling Core
//!
//! Foundational abstractions for the Starling overlay network.
//!
//! This crate defines the collaborators the overlay layer is built on,
//! without committing to any particular transport implementation:
//!
//! - [`RawChannel`]: an opaque bidirectional message channel between two
//!   endpoints, delivering its lifecycle as a [`ChannelEvent`] stream
//! - [`PeerEndpoint`]: the signaling-layer collaborator that assigns the
//!   local peer id and opens channels to remote peers
//! - [`Envelope`]: the tagged wire messages exchanged over a channel
//! - [`EventHub`]: ordered, synchronous event dispatch composed by the
//!   overlay types
//! - [`MockChannel`] / [`MockSignaling`]: in-memory implementations of the
//!   collaborators for testing

pub mod channel;
pub mod envelope;
pub mod error;
pub mod hub;
pub mod mock;

// Re-export main types
pub use channel::*;
pub use envelope::*;
pub use error::*;
pub use hub::*;
pub use mock::*;
