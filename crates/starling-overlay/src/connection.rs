//! Connection - the envelope protocol over one raw channel.
//!
//! A `Connection` exclusively owns its raw channel and adds the typed
//! envelope protocol on top: shared key/value variables (last-write-wins
//! between the two endpoints), opaque application payloads, and a
//! round-trip latency probe. Reserved protocol envelopes (greetings and
//! rejection causes) pass through as [`ConnectionEvent::Protocol`] for the
//! overlay layer.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use starling_core::{ChannelEvent, ChannelPair, Envelope, EventHub, RawChannel};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::config::ConnectionConfig;
use crate::error::{OverlayError, Result};
use crate::event::ConnectionEvent;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-local identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One overlay connection over a raw data channel.
///
/// Created from a [`ChannelPair`]; event dispatch begins when [`start`] is
/// called, so listeners registered in between never miss the `Open` event.
/// For consumers that cannot subscribe that early, [`take_events`] yields a
/// stream buffered since construction.
///
/// [`start`]: Connection::start
/// [`take_events`]: Connection::take_events
pub struct Connection {
    id: ConnectionId,
    channel: Arc<dyn RawChannel>,
    /// Taken by `start`.
    channel_events: Mutex<Option<mpsc::Receiver<ChannelEvent>>>,
    /// Replicated variables, last applied write wins.
    vars: Mutex<HashMap<String, Value>>,
    /// Probes awaiting their `pong`, keyed by probe-start millisecond.
    pending_pings: Mutex<HashMap<u64, oneshot::Sender<u64>>>,
    /// Subscribed at construction; taken by `take_events`.
    app_events: Mutex<Option<mpsc::UnboundedReceiver<ConnectionEvent>>>,
    hub: EventHub<ConnectionEvent>,
    config: ConnectionConfig,
    open: AtomicBool,
}

impl Connection {
    /// Wrap a raw channel. Call [`start`] to begin dispatching events.
    ///
    /// [`start`]: Connection::start
    pub fn new(pair: ChannelPair, config: ConnectionConfig) -> Self {
        let hub = EventHub::new();
        let app_events = hub.subscribe_channel();
        Self {
            id: ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            channel: pair.channel,
            channel_events: Mutex::new(Some(pair.events)),
            vars: Mutex::new(HashMap::new()),
            pending_pings: Mutex::new(HashMap::new()),
            app_events: Mutex::new(Some(app_events)),
            hub,
            config,
            open: AtomicBool::new(false),
        }
    }

    /// Spawn the event dispatch task. Idempotent.
    pub fn start(self: &Arc<Self>) {
        match self.channel_events.lock().take() {
            Some(events) => {
                tokio::spawn(self.clone().run(events));
            }
            None => warn!(connection = %self.id, "already started"),
        }
    }

    /// This connection's process-local id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the underlying channel is currently open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// The connection's event hub.
    pub fn events(&self) -> &EventHub<ConnectionEvent> {
        &self.hub
    }

    /// Take the event stream buffered since construction.
    ///
    /// The stream is subscribed before dispatch can start, so every event
    /// the connection has emitted, `Open` included, is already queued in
    /// order. A consumer that only learns of the connection later, e.g.
    /// from a network admission event, still observes the complete
    /// history. Returns `None` after the first call.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ConnectionEvent>> {
        self.app_events.lock().take()
    }

    /// Read a shared variable. No side effect.
    pub fn var(&self, name: &str) -> Option<Value> {
        self.vars.lock().get(name).cloned()
    }

    /// Snapshot of all shared variables.
    pub fn vars(&self) -> HashMap<String, Value> {
        self.vars.lock().clone()
    }

    /// Write a shared variable.
    ///
    /// Stores the value locally, sends a `var` envelope to the peer and
    /// emits a local-origin [`ConnectionEvent::VarUpdate`]. Writing a value
    /// structurally equal to the current one is a no-op: nothing is sent,
    /// nothing is emitted, the current value is returned.
    pub async fn set_var(&self, name: impl Into<String>, value: Value) -> Result<Value> {
        let name = name.into();
        {
            let mut vars = self.vars.lock();
            if vars.get(&name) == Some(&value) {
                return Ok(value);
            }
            vars.insert(name.clone(), value.clone());
        }

        self.send_envelope(&Envelope::Var {
            name: name.clone(),
            value: value.clone(),
        })
        .await?;

        self.hub.emit(&ConnectionEvent::VarUpdate {
            name,
            value: value.clone(),
            local: true,
        });
        Ok(value)
    }

    /// Send an opaque application payload, fire-and-forget.
    pub async fn send(&self, data: Value) -> Result<()> {
        self.send_envelope(&Envelope::Data { data }).await
    }

    /// Probe the round-trip latency to the peer.
    ///
    /// Resolves with the elapsed time once the matching `pong` arrives.
    /// Fails with [`OverlayError::PingTimeout`] after the configured
    /// timeout, removing the pending entry. Concurrent probes use distinct
    /// millisecond keys; a second probe within the same millisecond
    /// replaces the first's pending entry, failing the first probe.
    pub async fn ping(&self) -> Result<Duration> {
        self.ping_from(now_millis()).await
    }

    async fn ping_from(&self, t0: u64) -> Result<Duration> {
        let (tx, rx) = oneshot::channel();
        self.pending_pings.lock().insert(t0, tx);

        self.send_envelope(&Envelope::Ping { time: t0 }).await?;

        match tokio::time::timeout(self.config.ping_timeout, rx).await {
            Ok(Ok(elapsed)) => Ok(Duration::from_millis(elapsed)),
            Ok(Err(_)) => Err(OverlayError::ConnectionClosed),
            Err(_) => {
                self.pending_pings.lock().remove(&t0);
                Err(OverlayError::PingTimeout(self.config.ping_timeout))
            }
        }
    }

    /// Close the underlying channel. Both endpoints observe `Close`.
    pub async fn close(&self) -> Result<()> {
        self.channel.close().await?;
        Ok(())
    }

    /// Encode and transmit one envelope.
    pub(crate) async fn send_envelope(&self, envelope: &Envelope) -> Result<()> {
        self.channel.send(envelope.encode()?).await?;
        Ok(())
    }

    async fn run(self: Arc<Self>, mut events: mpsc::Receiver<ChannelEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                ChannelEvent::Open => {
                    debug!(connection = %self.id, "channel open");
                    self.open.store(true, Ordering::SeqCst);
                    self.hub.emit(&ConnectionEvent::Open);
                }
                ChannelEvent::Close => {
                    debug!(connection = %self.id, "channel closed");
                    self.open.store(false, Ordering::SeqCst);
                    // Fail fast instead of letting probes run into timeout
                    self.pending_pings.lock().clear();
                    self.hub.emit(&ConnectionEvent::Close);
                    break;
                }
                ChannelEvent::Error(err) => {
                    error!(connection = %self.id, %err, "channel error");
                    self.hub.emit(&ConnectionEvent::Error(err));
                }
                ChannelEvent::Data(payload) => self.dispatch(payload).await,
            }
        }
    }

    async fn dispatch(&self, payload: Value) {
        match Envelope::decode(&payload) {
            Some(Envelope::Var { name, value }) => {
                self.vars.lock().insert(name.clone(), value.clone());
                self.hub.emit(&ConnectionEvent::VarUpdate {
                    name,
                    value,
                    local: false,
                });
            }
            Some(Envelope::Data { data }) => {
                self.hub.emit(&ConnectionEvent::Data(data));
            }
            Some(Envelope::Ping { time }) => {
                if let Err(err) = self.send_envelope(&Envelope::Pong { time }).await {
                    warn!(connection = %self.id, %err, "failed to answer ping");
                }
            }
            Some(Envelope::Pong { time }) => {
                let elapsed = now_millis().saturating_sub(time);
                match self.pending_pings.lock().remove(&time) {
                    Some(tx) => {
                        let _ = tx.send(elapsed);
                    }
                    // Harmless under correct protocol use; key was already
                    // consumed or the probe timed out
                    None => debug!(connection = %self.id, time, "pong with no matching ping"),
                }
            }
            Some(envelope) if envelope.is_protocol() => {
                self.hub.emit(&ConnectionEvent::Protocol(envelope));
            }
            Some(envelope) => {
                // Unreachable with the current envelope set; keep the
                // connection alive regardless
                warn!(connection = %self.id, ?envelope, "unhandled envelope");
            }
            None => {
                self.hub.emit(&ConnectionEvent::UnknownData(payload));
            }
        }
    }

    #[cfg(test)]
    fn pending_ping_count(&self) -> usize {
        self.pending_pings.lock().len()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}
