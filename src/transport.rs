//! Transport traits and the session wire protocol.
//!
//! A transport moves [`Message`]s between engines. How messages are encoded
//! and carried (sockets, in-process channels, a relay service) is up to the
//! implementation; the session manager only needs ordered, reliable delivery
//! per connection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::Result;
use crate::types::{BootstrapFrame, EngineId, FrameBundle, Game, StateFrame};

/// Messages exchanged between engines.
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", bound = "")]
pub enum Message<G: Game> {
    /// Host to joiner: the frame the joiner will be admitted at and its id.
    Offer { frame: StateFrame, id: EngineId },
    /// Joiner to host: the offer was accepted.
    Ready,
    /// Host to joiner: the resolved frame that includes the joiner.
    Bootstrap { frame: BootstrapFrame<G> },
    /// Per-frame contributions, in both directions once live.
    Bundle { bundle: FrameBundle<G::Event> },
}

impl<G: Game> Message<G> {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Offer { .. } => "offer",
            Message::Ready => "ready",
            Message::Bootstrap { .. } => "bootstrap",
            Message::Bundle { .. } => "bundle",
        }
    }
}

impl<G: Game> Clone for Message<G> {
    fn clone(&self) -> Self {
        match self {
            Message::Offer { frame, id } => Message::Offer { frame: *frame, id: *id },
            Message::Ready => Message::Ready,
            Message::Bootstrap { frame } => Message::Bootstrap { frame: frame.clone() },
            Message::Bundle { bundle } => Message::Bundle { bundle: bundle.clone() },
        }
    }
}

impl<G: Game> fmt::Debug for Message<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Offer { frame, id } => {
                f.debug_struct("Offer").field("frame", frame).field("id", id).finish()
            }
            Message::Ready => f.write_str("Ready"),
            Message::Bootstrap { frame } => f.debug_tuple("Bootstrap").field(frame).finish(),
            Message::Bundle { bundle } => f.debug_tuple("Bundle").field(&bundle.frame).finish(),
        }
    }
}

/// Sending half of a connection.
#[async_trait::async_trait]
pub trait Outbound<G: Game>: Send + Sync {
    /// Queue a message for delivery, in order.
    async fn send(&self, message: Message<G>) -> Result<()>;

    /// Close the connection. The remote side sees its receive stream end.
    async fn close(&self);
}

/// Receiving half of a connection.
#[async_trait::async_trait]
pub trait Inbound<G: Game>: Send + Sync {
    /// Next message, or `None` once the connection is closed.
    ///
    /// Must be cancel-safe: dropping the future loses no message.
    async fn recv(&mut self) -> Option<Message<G>>;
}

/// A bidirectional, ordered connection to one peer.
pub struct Connection<G: Game> {
    outbound: Box<dyn Outbound<G>>,
    inbound: Box<dyn Inbound<G>>,
    peer: String,
}

impl<G: Game> Connection<G> {
    pub fn new(
        outbound: Box<dyn Outbound<G>>,
        inbound: Box<dyn Inbound<G>>,
        peer: impl Into<String>,
    ) -> Self {
        Self { outbound, inbound, peer: peer.into() }
    }

    /// Label of the remote end, for logs and errors.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub async fn send(&self, message: Message<G>) -> Result<()> {
        self.outbound.send(message).await
    }

    pub async fn recv(&mut self) -> Option<Message<G>> {
        self.inbound.recv().await
    }

    pub async fn close(&self) {
        self.outbound.close().await
    }

    /// Separate the halves so reading and writing can run in different tasks.
    pub fn split(self) -> (Box<dyn Outbound<G>>, Box<dyn Inbound<G>>, String) {
        (self.outbound, self.inbound, self.peer)
    }
}

impl<G: Game> fmt::Debug for Connection<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("peer", &self.peer).finish_non_exhaustive()
    }
}

/// Answers discovery pings with application data, or refuses to be listed.
pub type PingHandler = Arc<dyn Fn(&[u8]) -> std::result::Result<Vec<u8>, String> + Send + Sync>;

/// Accepts or refuses a join request based on its application data.
pub type JoinHandler = Arc<dyn Fn(&[u8]) -> std::result::Result<(), String> + Send + Sync>;

/// A host found by [`Transport::ping`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHost {
    pub address: String,
    /// The host's ping response.
    pub data: Vec<u8>,
    /// Set when the host refused the ping; such hosts cannot be joined.
    pub error: Option<String>,
}

impl RemoteHost {
    pub fn is_joinable(&self) -> bool {
        self.error.is_none()
    }
}

/// Discovery and connection setup between engines.
#[async_trait::async_trait]
pub trait Transport<G: Game>: Send + Sync + 'static {
    /// Start answering pings and accepting joins; `None` handlers disable hosting.
    fn host(&self, ping: Option<PingHandler>, join: Option<JoinHandler>);

    /// Ask every reachable host for its ping response.
    async fn ping(&self, data: &[u8]) -> Result<Vec<RemoteHost>>;

    /// Open a connection to `remote`, passing `data` to its join handler.
    async fn join(&self, remote: &RemoteHost, data: &[u8]) -> Result<Connection<G>>;

    /// Next connection opened by a remote join, or `None` once shut down.
    ///
    /// Must be cancel-safe.
    async fn accept(&mut self) -> Option<Connection<G>>;

    /// Stop hosting and refuse further joins.
    fn shutdown(&self);
}
