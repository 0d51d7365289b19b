//! Session manager: owns every peer connection.
//!
//! The communicator task accepts joins, runs the host side of the join
//! handshake, floods contributions through the peer mesh and hands every
//! fresh remote contribution to the auditor.
//!
//! Each connection gets a reader worker and a writer worker, tracked by a
//! [`TaskTracker`]. Readers push into one fan-in queue; writers drain a
//! per-peer queue, so a slow peer only delays itself.

mod handshake;

pub use handshake::{JoinedSession, join_session};

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::bundler::BundlerHandle;
use crate::transport::{Connection, Inbound, Message, Outbound, Transport};
use crate::types::{
    BootstrapFrame, EngineEvent, EngineId, EngineParams, FrameBundle, Game, StateFrame,
};
use crate::updater::ResolvedFrame;
use crate::{Result, SyncError};

/// Channels wiring the communicator into the rest of the engine.
pub struct CommunicatorParts<G: Game> {
    /// Accepted local bundles from the updater.
    pub broadcast: mpsc::UnboundedReceiver<FrameBundle<G::Event>>,
    /// Resolved frames from the updater, used to bootstrap joiners.
    pub resolved: watch::Receiver<ResolvedFrame<G>>,
    /// Fresh remote contributions, towards the auditor.
    pub remote: mpsc::UnboundedSender<FrameBundle<G::Event>>,
    /// Where membership changes for admitted peers are injected.
    pub bundler: BundlerHandle<G::Event>,
}

/// Query handle for a running communicator.
#[derive(Clone)]
pub struct CommunicatorHandle {
    requests: mpsc::UnboundedSender<oneshot::Sender<usize>>,
}

impl CommunicatorHandle {
    /// Number of open peer connections, including peers still joining.
    pub async fn peer_count(&self) -> Result<usize> {
        let (reply, answer) = oneshot::channel();
        self.requests.send(reply).map_err(|_| SyncError::EngineHalted)?;
        answer.await.map_err(|_| SyncError::EngineHalted)
    }
}

type PeerKey = u64;

enum PeerEvent<G: Game> {
    Message(PeerKey, Message<G>),
    Closed(PeerKey),
}

/// Where a peer stands in the join handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Sent `Offer`, waiting for `Ready`.
    Offered(EngineId),
    /// `Joined` injected, waiting for a resolved frame that includes it.
    Admitting(EngineId),
    Live,
}

struct Peer<G: Game> {
    label: String,
    /// Engine id this side assigned, if it admitted the peer.
    assigned: Option<EngineId>,
    /// First frame the admitted engine is expected to contribute to.
    since: StateFrame,
    stage: Stage,
    queue: mpsc::UnboundedSender<Message<G>>,
    cancel: CancellationToken,
}

impl<G: Game> Peer<G> {
    fn send(&self, message: Message<G>) {
        // A closed queue means the writer is gone; its reader reports the close.
        let _ = self.queue.send(message);
    }
}

/// Spawns the communicator task.
pub struct Communicator;

impl Communicator {
    /// Start managing `peers` (already-live connections, such as the one a
    /// joiner used to join) and accepting new ones from `transport`.
    ///
    /// `horizon` is the newest frame already known to this engine.
    pub fn spawn<G, T>(
        transport: T,
        params: &EngineParams,
        parts: CommunicatorParts<G>,
        peers: Vec<Connection<G>>,
        horizon: StateFrame,
        cancel: CancellationToken,
    ) -> (CommunicatorHandle, JoinHandle<()>)
    where
        G: Game,
        T: Transport<G>,
    {
        let (requests, request_rx) = mpsc::unbounded_channel();
        let (fan_in, fan_in_rx) = mpsc::unbounded_channel();
        let mut state = Mesh {
            id: params.id,
            retain_frames: params.window_capacity() as StateFrame,
            peers: HashMap::new(),
            next_key: 0,
            seen: BTreeSet::new(),
            horizon,
            local_horizon: horizon,
            departed: HashMap::new(),
            fan_in,
            tracker: TaskTracker::new(),
            cancel: cancel.clone(),
            remote: parts.remote,
            bundler: parts.bundler,
        };
        for connection in peers {
            state.add_peer(connection, None, horizon + 1, Stage::Live);
        }

        let task = tokio::spawn(Self::run(
            transport,
            state,
            parts.broadcast,
            parts.resolved,
            request_rx,
            fan_in_rx,
            cancel,
        ));
        (CommunicatorHandle { requests }, task)
    }

    async fn run<G, T>(
        mut transport: T,
        mut mesh: Mesh<G>,
        mut broadcast: mpsc::UnboundedReceiver<FrameBundle<G::Event>>,
        mut resolved: watch::Receiver<ResolvedFrame<G>>,
        mut requests: mpsc::UnboundedReceiver<oneshot::Sender<usize>>,
        mut fan_in: mpsc::UnboundedReceiver<PeerEvent<G>>,
        cancel: CancellationToken,
    ) where
        G: Game,
        T: Transport<G>,
    {
        info!(engine = %mesh.id, peers = mesh.peers.len(), "Communicator started");
        let mut accepting = true;
        let mut watching = true;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Communicator cancelled");
                    break;
                }
                Some(reply) = requests.recv() => {
                    let _ = reply.send(mesh.peers.len());
                }
                bundle = broadcast.recv() => match bundle {
                    Some(bundle) => mesh.broadcast_local(bundle),
                    None => {
                        debug!("Updater closed the broadcast stream");
                        break;
                    }
                },
                Some(event) = fan_in.recv() => match event {
                    PeerEvent::Message(key, message) => mesh.handle_message(key, message),
                    PeerEvent::Closed(key) => mesh.handle_closed(key),
                },
                changed = resolved.changed(), if watching => match changed {
                    Ok(()) => {
                        let frame = resolved.borrow_and_update().clone();
                        if let Some(frame) = frame {
                            mesh.bootstrap_ready(&frame);
                        }
                    }
                    Err(_) => watching = false,
                },
                connection = transport.accept(), if accepting => match connection {
                    Some(connection) => mesh.offer(connection),
                    None => {
                        debug!("Transport stopped accepting");
                        accepting = false;
                    }
                },
            }
        }

        mesh.teardown(&mut fan_in).await;
        transport.shutdown();
        info!("Communicator stopped");
    }
}

/// State owned by the communicator task.
struct Mesh<G: Game> {
    id: EngineId,
    retain_frames: StateFrame,
    peers: HashMap<PeerKey, Peer<G>>,
    next_key: PeerKey,
    /// Contributions already relayed, by frame then origin engine.
    seen: BTreeSet<(StateFrame, EngineId)>,
    horizon: StateFrame,
    /// Newest frame this engine has broadcast itself.
    local_horizon: StateFrame,
    /// Dropped engines still owed empty contributions, with the next frame to fill.
    departed: HashMap<EngineId, StateFrame>,
    fan_in: mpsc::UnboundedSender<PeerEvent<G>>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    remote: mpsc::UnboundedSender<FrameBundle<G::Event>>,
    bundler: BundlerHandle<G::Event>,
}

impl<G: Game> Mesh<G> {
    fn add_peer(
        &mut self,
        connection: Connection<G>,
        assigned: Option<EngineId>,
        since: StateFrame,
        stage: Stage,
    ) -> PeerKey {
        let key = self.next_key;
        self.next_key += 1;

        let (outbound, inbound, label) = connection.split();
        let (queue, queue_rx) = mpsc::unbounded_channel();
        let cancel = self.cancel.child_token();
        self.tracker.spawn(write_worker(key, outbound, queue_rx, cancel.clone()));
        self.tracker.spawn(read_worker(key, inbound, self.fan_in.clone(), cancel.clone()));

        debug!(peer = %label, "Peer {} added in stage {:?}", key, stage);
        self.peers.insert(key, Peer { label, assigned, since, stage, queue, cancel });
        key
    }

    /// Host side of a join: assign an id and offer the next frame.
    fn offer(&mut self, connection: Connection<G>) {
        let id = EngineId::random();
        let frame = self.horizon + 1;
        let key = self.add_peer(connection, Some(id), frame, Stage::Offered(id));
        if let Some(peer) = self.peers.get(&key) {
            info!(peer = %peer.label, "Offering id {} from frame {}", id, frame);
            peer.send(Message::Offer { frame, id });
        }
    }

    fn handle_message(&mut self, key: PeerKey, message: Message<G>) {
        let Some(peer) = self.peers.get_mut(&key) else {
            trace!("Message from closed peer {} ignored", key);
            return;
        };

        match (peer.stage, message) {
            (Stage::Live, Message::Bundle { bundle }) => self.relay(key, bundle),
            (Stage::Admitting(_), Message::Bundle { bundle }) => {
                trace!(peer = %peer.label, "Bundle for frame {} before bootstrap ignored", bundle.frame);
            }
            (Stage::Offered(id), Message::Ready) => {
                debug!(peer = %peer.label, "Ready; admitting {}", id);
                peer.stage = Stage::Admitting(id);
                if self.bundler.apply_engine_event(EngineEvent::Joined(id)).is_err() {
                    warn!("Bundler gone, cannot admit {}", id);
                }
            }
            (stage, message) => {
                let error = SyncError::protocol_violation(
                    peer.label.clone(),
                    format!("unexpected {} while {:?}", message.kind(), stage),
                );
                warn!("{}", error);
                self.disconnect(key);
            }
        }
    }

    /// Flood a peer's bundle: forward fresh contributions to everyone else
    /// and towards the updater.
    fn relay(&mut self, from: PeerKey, bundle: FrameBundle<G::Event>) {
        let FrameBundle { frame, bundle } = bundle;
        self.observe(frame);

        let fresh: FrameBundle<G::Event> = FrameBundle {
            frame,
            bundle: bundle
                .into_iter()
                .filter(|(engine, _)| self.seen.insert((frame, *engine)))
                .collect(),
        };
        if fresh.bundle.is_empty() {
            trace!("Bundle for frame {} already relayed", frame);
            return;
        }

        for (key, peer) in &self.peers {
            if *key != from {
                peer.send(Message::Bundle { bundle: fresh.clone() });
            }
        }
        if self.remote.send(fresh).is_err() {
            debug!("Auditor gone, remote bundle for frame {} dropped", frame);
        }
    }

    fn broadcast_local(&mut self, bundle: FrameBundle<G::Event>) {
        self.observe(bundle.frame);
        self.local_horizon = self.local_horizon.max(bundle.frame);
        for engine in bundle.contributors() {
            self.seen.insert((bundle.frame, engine));
        }
        trace!("Broadcasting frame {} to {} peers", bundle.frame, self.peers.len());
        for peer in self.peers.values() {
            peer.send(Message::Bundle { bundle: bundle.clone() });
        }
        if !self.departed.is_empty() {
            self.cover_departed(&bundle);
        }
    }

    /// Keep filling for dropped engines until the frame carrying their
    /// `Dropped` event goes out.
    fn cover_departed(&mut self, bundle: &FrameBundle<G::Event>) {
        let dropped_here: Vec<EngineId> = bundle
            .bundle
            .get(&self.id)
            .into_iter()
            .flat_map(|events| &events.engine)
            .filter_map(|event| match event {
                EngineEvent::Dropped(id) => Some(*id),
                EngineEvent::Joined(_) => None,
            })
            .collect();

        for (id, next) in std::mem::take(&mut self.departed) {
            if dropped_here.contains(&id) {
                self.fill(id, next, bundle.frame - 1);
                debug!("Drop of {} landed at frame {}", id, bundle.frame);
            } else {
                self.fill(id, next, bundle.frame);
                self.departed.insert(id, next.max(bundle.frame + 1));
            }
        }
    }

    /// Flood an empty contribution for `id` on every frame in `from..=to`
    /// that has not seen one, so nobody waits on an engine that is gone.
    fn fill(&mut self, id: EngineId, from: StateFrame, to: StateFrame) {
        let floor = self.horizon - self.retain_frames;
        for frame in from.max(floor + 1)..=to {
            if !self.seen.insert((frame, id)) {
                continue;
            }
            trace!("Filling frame {} for departed {}", frame, id);
            let filler = FrameBundle::empty(frame, id);
            for peer in self.peers.values() {
                peer.send(Message::Bundle { bundle: filler.clone() });
            }
            if self.remote.send(filler).is_err() {
                debug!("Auditor gone, filler for frame {} dropped", frame);
            }
        }
    }

    /// Track the newest frame and forget contributions older than the window.
    fn observe(&mut self, frame: StateFrame) {
        if frame <= self.horizon {
            return;
        }
        self.horizon = frame;
        let floor = self.horizon - self.retain_frames;
        self.seen = self.seen.split_off(&(floor, EngineId::new(0)));
    }

    /// Send `Bootstrap` to every admitted peer that `frame` includes.
    fn bootstrap_ready(&mut self, frame: &Arc<BootstrapFrame<G>>) {
        for peer in self.peers.values_mut() {
            if let Stage::Admitting(id) = peer.stage {
                if frame.info.contains(id) {
                    info!(peer = %peer.label, "Bootstrapping {} at frame {}", id, frame.frame);
                    peer.send(Message::Bootstrap { frame: (**frame).clone() });
                    peer.since = frame.frame + 1;
                    peer.stage = Stage::Live;
                }
            }
        }
    }

    fn handle_closed(&mut self, key: PeerKey) {
        if let Some(peer) = self.peers.get(&key) {
            warn!(peer = %peer.label, "Connection closed");
            self.disconnect(key);
        }
    }

    /// Close a peer. Engines this side admitted are dropped from the session,
    /// and get empty contributions for every frame before the drop lands so
    /// the rest of the mesh stops waiting for them.
    fn disconnect(&mut self, key: PeerKey) {
        let Some(peer) = self.peers.remove(&key) else {
            return;
        };
        peer.cancel.cancel();

        let admitted = match peer.stage {
            Stage::Offered(_) => None,
            Stage::Admitting(id) => Some(id),
            Stage::Live => peer.assigned,
        };
        if let Some(id) = admitted {
            info!(peer = %peer.label, "Dropping {} from the session", id);
            let _ = self.bundler.apply_engine_event(EngineEvent::Dropped(id));
            self.fill(id, peer.since, self.local_horizon);
            self.departed.insert(id, peer.since.max(self.local_horizon + 1));
        }
    }

    async fn teardown(mut self, fan_in: &mut mpsc::UnboundedReceiver<PeerEvent<G>>) {
        debug!("Closing {} peers", self.peers.len());
        for (_, peer) in self.peers.drain() {
            peer.cancel.cancel();
        }
        self.tracker.close();

        let workers = self.tracker.wait();
        tokio::pin!(workers);
        loop {
            tokio::select! {
                _ = &mut workers => break,
                event = fan_in.recv() => {
                    if event.is_none() {
                        break;
                    }
                }
            }
        }
    }
}

async fn read_worker<G: Game>(
    key: PeerKey,
    mut inbound: Box<dyn Inbound<G>>,
    fan_in: mpsc::UnboundedSender<PeerEvent<G>>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = inbound.recv() => message,
        };
        match message {
            Some(message) => {
                if fan_in.send(PeerEvent::Message(key, message)).is_err() {
                    break;
                }
            }
            None => break,
        }
    }
    cancel.cancel();
    let _ = fan_in.send(PeerEvent::Closed(key));
}

async fn write_worker<G: Game>(
    key: PeerKey,
    outbound: Box<dyn Outbound<G>>,
    mut queue: mpsc::UnboundedReceiver<Message<G>>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = queue.recv() => message,
        };
        let Some(message) = message else {
            break;
        };
        if let Err(e) = outbound.send(message).await {
            debug!("Writer for peer {} failed: {}", key, e);
            break;
        }
    }
    outbound.close().await;
    cancel.cancel();
}
