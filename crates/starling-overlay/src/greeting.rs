//! Greeting policy - pluggable handshake strategy.
//!
//! Each overlay topology is a [`GreetingPolicy`] variant supplying its
//! greeting payload and admission predicate. The base network-type check
//! always runs first and short-circuits; topology-specific rules only see
//! greetings that already passed it.

use starling_core::Envelope;

/// Handshake strategy for an overlay network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreetingPolicy {
    /// Admit any peer on the same network type.
    Default,
    /// Star topology: nodes are tagged server/client and two self-declared
    /// servers may not link to each other.
    Star {
        /// The local node's role, fixed for the network's lifetime.
        server: bool,
    },
}

/// Outcome of checking a received greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GreetingVerdict {
    /// Admit the connection into the overlay.
    Admit,
    /// Close the connection without admitting it.
    Reject {
        /// When present, sent to the peer as an `error` envelope before
        /// closing, so it can report the specific cause.
        notify: Option<String>,
    },
}

impl GreetingPolicy {
    /// The protocol dialect tag carried in this policy's greetings.
    pub fn network_type(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Star { .. } => "star",
        }
    }

    /// Build the greeting sent on every newly opened connection.
    pub fn greeting(&self) -> Envelope {
        Envelope::PeerGreeting {
            network_type: self.network_type().to_string(),
            server: match self {
                Self::Default => None,
                Self::Star { server } => Some(*server),
            },
        }
    }

    /// Check a received greeting.
    pub fn check(&self, network_type: &str, server: Option<bool>) -> GreetingVerdict {
        if network_type != self.network_type() {
            return GreetingVerdict::Reject { notify: None };
        }

        if let Self::Star { server: true } = self {
            if server == Some(true) {
                return GreetingVerdict::Reject {
                    notify: Some("Two servers cannot connect to each other!".to_string()),
                };
            }
        }

        GreetingVerdict::Admit
    }
}
