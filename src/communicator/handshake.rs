//! Joiner side of the join handshake.

use tracing::{debug, info, trace, warn};

use crate::transport::{Connection, Message};
use crate::types::{BootstrapFrame, EngineId, FrameBundle, Game, StateFrame};
use crate::{Result, SyncError};

/// Everything a joiner learns while being admitted.
pub struct JoinedSession<G: Game> {
    /// Id the host assigned to this engine.
    pub id: EngineId,
    /// Resolved frame that first includes this engine.
    pub bootstrap: BootstrapFrame<G>,
    /// Bundles the host relayed while the handshake was running, from the
    /// offered frame on.
    pub backlog: Vec<FrameBundle<G::Event>>,
    /// The connection, ready to be handed to the communicator.
    pub connection: Connection<G>,
}

impl<G: Game> JoinedSession<G> {
    /// Newest frame known from the handshake.
    pub fn horizon(&self) -> StateFrame {
        self.backlog.iter().map(|bundle| bundle.frame).fold(self.bootstrap.frame, StateFrame::max)
    }
}

/// Run the joiner side of the handshake over a freshly joined connection.
///
/// Expects `Offer`, answers `Ready`, then buffers bundles dated from the
/// offered frame on until `Bootstrap` arrives. Any other message closes the
/// connection with a protocol error.
pub async fn join_session<G: Game>(mut connection: Connection<G>) -> Result<JoinedSession<G>> {
    let (offered, id) = match connection.recv().await {
        Some(Message::Offer { frame, id }) => (frame, id),
        Some(other) => return Err(reject(&connection, "offer", &other).await),
        None => return Err(SyncError::connection_closed(connection.peer())),
    };
    debug!(peer = %connection.peer(), "Offered id {} from frame {}", id, offered);
    connection.send(Message::Ready).await?;

    let mut backlog = Vec::new();
    loop {
        match connection.recv().await {
            Some(Message::Bundle { bundle }) if bundle.frame < offered => {
                trace!("Bundle for frame {} predates the offer", bundle.frame);
            }
            Some(Message::Bundle { bundle }) => backlog.push(bundle),
            Some(Message::Bootstrap { frame }) => {
                if !frame.info.contains(id) {
                    let error = SyncError::protocol_violation(
                        connection.peer(),
                        format!("bootstrap frame {} does not include {}", frame.frame, id),
                    );
                    connection.close().await;
                    return Err(error);
                }
                info!(
                    peer = %connection.peer(),
                    "Joined as {} at frame {} with {} buffered bundles",
                    id,
                    frame.frame,
                    backlog.len()
                );
                return Ok(JoinedSession { id, bootstrap: frame, backlog, connection });
            }
            Some(other) => return Err(reject(&connection, "bootstrap", &other).await),
            None => return Err(SyncError::connection_closed(connection.peer())),
        }
    }
}

async fn reject<G: Game>(connection: &Connection<G>, expected: &str, got: &Message<G>) -> SyncError {
    let error = SyncError::protocol_violation(
        connection.peer(),
        format!("expected {}, got {}", expected, got.kind()),
    );
    warn!("{}", error);
    connection.close().await;
    error
}
