//! Engine facade: wires the bundler, updater, auditor and communicator.
//!
//! ```text
//! apply_event ──► Bundler ──local──► Updater ──broadcast──► Communicator ◄──► peers
//!                   ▲                  ▲  │                    │
//!                   │               audited└─resolved frames──►│
//!                   │                  │                       │
//!                   └──clock/membership┴── Auditor ◄──remote───┘
//! ```
//!
//! Three ways to start an engine:
//!
//! - [`EngineBuilder::local`]: single-engine session, no networking.
//! - [`EngineBuilder::host`]: start a session at frame 0 and accept joins.
//! - [`EngineBuilder::join`]: find a host, get admitted and bootstrap from
//!   its resolved state.
//!
//! ```rust,no_run
//! # use tandem::{EngineBuilder, EngineParams, MemoryNetwork, types::{Event, Game}};
//! # use serde::{Deserialize, Serialize};
//! # #[derive(Clone, Default, Serialize, Deserialize)]
//! # struct Counter { ticks: u64 }
//! # #[derive(Clone, Debug, Serialize, Deserialize)]
//! # struct Bump;
//! # impl Event<Counter> for Bump { fn apply(&self, _: &mut Counter) {} }
//! # impl Game for Counter { type Event = Bump; fn think(&mut self) { self.ticks += 1; } }
//! # async fn demo() -> tandem::Result<()> {
//! let network = MemoryNetwork::new();
//! let host = EngineBuilder::new(EngineParams::default()).host(Counter::default(), network.transport())?;
//! let guest = EngineBuilder::new(EngineParams::default())
//!     .join(network.transport(), b"hello")
//!     .await?;
//!
//! guest.apply_event(Bump)?;
//! let state = guest.final_state(-1).await?;
//! println!("{} ticks", state.game.ticks);
//! # Ok(()) }
//! ```

use futures::Stream;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auditor::{Auditor, PassThrough};
use crate::bundler::{Bundler, BundlerHandle};
use crate::communicator::{
    Communicator, CommunicatorHandle, CommunicatorParts, JoinedSession, join_session,
};
use crate::reconciler::Reconciler;
use crate::stream::{IntervalTicker, Ticker};
use crate::transport::{Connection, JoinHandler, PingHandler, Transport};
use crate::types::{
    BootstrapFrame, EngineId, EngineInfo, EngineParams, FrameData, Game, Snapshot, StateFrame,
};
use crate::updater::{ResolvedFrame, Updater, UpdaterChannels, UpdaterHandle};
use crate::{Result, SyncError};

/// Default bound on the join handshake.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Configures and starts an [`Engine`].
pub struct EngineBuilder {
    params: EngineParams,
    ticker: Option<BoxStream<'static, u64>>,
    ping_response: Vec<u8>,
    join_policy: Option<JoinHandler>,
    join_timeout: Duration,
}

impl EngineBuilder {
    pub fn new(params: EngineParams) -> Self {
        Self {
            params,
            ticker: None,
            ping_response: Vec::new(),
            join_policy: None,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }

    /// Drive the frame clock from `ticker` instead of wall-clock millis.
    pub fn with_ticker(mut self, ticker: impl Ticker) -> Self {
        self.ticker = Some(ticker.boxed());
        self
    }

    /// Data a hosting engine answers discovery pings with.
    pub fn ping_response(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.ping_response = data.into();
        self
    }

    /// Decide which joins a hosting engine accepts. Accepts everyone by default.
    pub fn join_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&[u8]) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.join_policy = Some(Arc::new(policy));
        self
    }

    /// Bound on the join handshake.
    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Start a single-engine session.
    pub fn local<G: Game>(self, game: G) -> Result<Engine<G>> {
        self.params.validate()?;
        let (engine, _) = self.genesis(game);
        Ok(engine)
    }

    /// Start a session and accept joins through `transport`.
    pub fn host<G, T>(self, game: G, transport: T) -> Result<Engine<G>>
    where
        G: Game,
        T: Transport<G>,
    {
        self.params.validate()?;
        let response = self.ping_response.clone();
        let ping: PingHandler = Arc::new(move |_| Ok(response.clone()));
        let join = self.join_policy.clone().unwrap_or_else(|| Arc::new(|_| Ok(())));
        let params = self.params.clone();

        let (mut engine, parts) = self.genesis(game);
        transport.host(Some(ping), Some(join));
        engine.connect(transport, &params, parts, Vec::new(), 0);
        Ok(engine)
    }

    /// Join the first host on `transport` that accepts `data`.
    ///
    /// The engine takes the id the host assigns, so `params.id` is ignored.
    pub async fn join<G, T>(self, transport: T, data: &[u8]) -> Result<Engine<G>>
    where
        G: Game,
        T: Transport<G>,
    {
        self.params.validate()?;
        let connection = Self::connect_to_host(&transport, data).await?;
        let session = tokio::time::timeout(self.join_timeout, join_session(connection))
            .await
            .map_err(|_| SyncError::Timeout { duration: self.join_timeout })??;

        let horizon = session.horizon();
        let JoinedSession { id, bootstrap, backlog, connection } = session;
        let mut params = self.params.clone();
        params.id = id;
        let current_ms = params.frame_ms * (bootstrap.frame + 1);
        info!(engine = %id, "Bootstrapping from frame {}", bootstrap.frame);

        let reconciler = Reconciler::bootstrap(&params, bootstrap);
        let (mut engine, parts) = Engine::start(&params, self.ticker, reconciler, current_ms);
        for bundle in backlog {
            let _ = parts.remote.send(bundle);
        }
        engine.connect(transport, &params, parts, vec![connection], horizon);
        Ok(engine)
    }

    async fn connect_to_host<G, T>(transport: &T, data: &[u8]) -> Result<Connection<G>>
    where
        G: Game,
        T: Transport<G>,
    {
        let hosts = transport.ping(data).await?;
        debug!("Ping found {} hosts", hosts.len());

        let mut last_error = None;
        for remote in hosts.iter().filter(|host| host.is_joinable()) {
            match transport.join(remote, data).await {
                Ok(connection) => return Ok(connection),
                Err(e) => {
                    warn!("Join to {} failed: {}", remote.address, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| SyncError::join_failed("no joinable hosts found")))
    }

    /// New session at frame 0 with this engine as its only member; the clock
    /// starts at frame 1.
    fn genesis<G: Game>(self, game: G) -> (Engine<G>, CommunicatorParts<G>) {
        let members: EngineInfo = std::iter::once(self.params.id).collect();
        let reconciler = Reconciler::start(&self.params, 0, FrameData::new(members, game));
        let current_ms = self.params.frame_ms;
        Engine::start(&self.params, self.ticker, reconciler, current_ms)
    }
}

/// A running engine.
///
/// Dropping the engine cancels every task; [`Engine::shutdown`] also waits
/// for them and reports a fatal error if one stopped the engine.
pub struct Engine<G: Game> {
    id: EngineId,
    bundler: BundlerHandle<G::Event>,
    updater: UpdaterHandle<G>,
    communicator: Option<CommunicatorHandle>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    updater_task: Option<JoinHandle<Result<()>>>,
}

impl<G: Game> Engine<G> {
    /// Spawn the bundler, auditor and updater.
    ///
    /// Returns the engine and the channel ends a communicator would take;
    /// a local engine drops them, which closes the remote path.
    fn start(
        params: &EngineParams,
        ticker: Option<BoxStream<'static, u64>>,
        reconciler: Reconciler<G>,
        current_ms: i64,
    ) -> (Self, CommunicatorParts<G>) {
        let cancel = CancellationToken::new();
        let ticker = ticker.unwrap_or_else(|| IntervalTicker::millis().boxed());

        let (local_tx, local) = mpsc::unbounded_channel();
        let (bundler, bundler_task) =
            Bundler::spawn(params, current_ms, ticker, local_tx, cancel.child_token());

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (audited_tx, remote) = mpsc::unbounded_channel();
        let auditor_task =
            Auditor::spawn(PassThrough, raw_rx, audited_tx, Some(bundler.clone()), cancel.child_token());

        let (broadcast, broadcast_rx) = mpsc::unbounded_channel();
        let (updater, updater_task) = Updater::spawn(
            reconciler,
            UpdaterChannels { local, remote, broadcast },
            cancel.child_token(),
        );

        info!(engine = %params.id, "Engine started at {}ms", current_ms);
        let parts = CommunicatorParts {
            broadcast: broadcast_rx,
            resolved: updater.subscribe(),
            remote: raw_tx,
            bundler: bundler.clone(),
        };
        let engine = Self {
            id: params.id,
            bundler,
            updater,
            communicator: None,
            cancel,
            tasks: vec![bundler_task, auditor_task],
            updater_task: Some(updater_task),
        };
        (engine, parts)
    }

    fn connect<T: Transport<G>>(
        &mut self,
        transport: T,
        params: &EngineParams,
        parts: CommunicatorParts<G>,
        peers: Vec<Connection<G>>,
        horizon: StateFrame,
    ) {
        let (handle, task) =
            Communicator::spawn(transport, params, parts, peers, horizon, self.cancel.child_token());
        self.communicator = Some(handle);
        self.tasks.push(task);
    }

    pub fn id(&self) -> EngineId {
        self.id
    }

    /// Queue a game event for the frame in progress.
    pub fn apply_event(&self, event: G::Event) -> Result<()> {
        self.bundler.apply_event(event)
    }

    /// Resolved state at `frame`, waiting until every engine has contributed.
    ///
    /// A negative frame returns the most recent resolved state. This waits
    /// indefinitely if a peer stalls; wrap it in a timeout when that matters.
    pub async fn final_state(&self, frame: StateFrame) -> Result<Snapshot<G>> {
        self.updater.final_state(frame).await
    }

    /// Best-effort state at `frame`; later bundles may still change it.
    pub async fn fast_state(&self, frame: StateFrame) -> Result<Snapshot<G>> {
        self.updater.fast_state(frame).await
    }

    /// Best-effort state at the newest known frame.
    pub async fn current_state(&self) -> Result<Snapshot<G>> {
        self.fast_state(-1).await
    }

    /// Refresh `game` from the most recent resolved state and return its frame.
    pub async fn sync_state(&self, game: &mut G) -> Result<StateFrame> {
        let snapshot = self.final_state(-1).await?;
        game.overwrite_with(&snapshot.game);
        Ok(snapshot.frame)
    }

    pub fn latest_resolved(&self) -> ResolvedFrame<G> {
        self.updater.latest_resolved()
    }

    /// Resolved frames as they happen; see [`UpdaterHandle::resolved_frames`].
    pub fn resolved_frames(&self) -> impl Stream<Item = Arc<BootstrapFrame<G>>> + 'static {
        self.updater.resolved_frames()
    }

    /// Open peer connections. Always zero for a local engine.
    pub async fn peer_count(&self) -> Result<usize> {
        match &self.communicator {
            Some(communicator) => communicator.peer_count().await,
            None => Ok(0),
        }
    }

    /// Stop every task and wait for them.
    ///
    /// Returns the error that halted the engine, if any.
    pub async fn shutdown(mut self) -> Result<()> {
        info!(engine = %self.id, "Shutting down");
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                warn!("Engine task failed: {}", e);
            }
        }
        match self.updater_task.take() {
            Some(task) => task.await.map_err(|_| SyncError::EngineHalted)?,
            None => Ok(()),
        }
    }
}

impl<G: Game> Drop for Engine<G> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
