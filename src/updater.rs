//! Updater task: drives the [`Reconciler`] and answers state queries.
//!
//! The updater owns the reconciler exclusively. Local bundles come from the
//! bundler, remote bundles from the auditor; both are applied in arrival
//! order. Accepted local bundles (and any filler bundles a bootstrapping
//! engine synthesizes) go out on the broadcast channel, and every resolved
//! frame is published on a watch channel.
//!
//! Queries are answered from inside the task, so callers never observe a
//! half-applied bundle. A query that cannot be answered yet is parked and
//! retried after each bundle.

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::reconciler::{Effects, Reconciler};
use crate::types::{BootstrapFrame, FrameBundle, Game, Snapshot, StateFrame};
use crate::{Result, SyncError};

/// Watch channel payload for resolved frames.
pub type ResolvedFrame<G> = Option<Arc<BootstrapFrame<G>>>;

/// Channels the updater consumes and feeds.
pub struct UpdaterChannels<E> {
    /// Bundles from this engine's bundler.
    pub local: mpsc::UnboundedReceiver<FrameBundle<E>>,
    /// Bundles from peers, after auditing.
    pub remote: mpsc::UnboundedReceiver<FrameBundle<E>>,
    /// Bundles to send to every peer.
    pub broadcast: mpsc::UnboundedSender<FrameBundle<E>>,
}

enum Query<G> {
    Final { frame: StateFrame, reply: oneshot::Sender<Snapshot<G>> },
    Fast { frame: StateFrame, reply: oneshot::Sender<Snapshot<G>> },
}

impl<G: Game> Query<G> {
    /// Answer if possible; otherwise hand the query back to be parked.
    fn try_answer(self, reconciler: &Reconciler<G>) -> Option<Self> {
        match self {
            Query::Final { frame, reply } => match reconciler.final_state(frame) {
                Some(snapshot) => {
                    let _ = reply.send(snapshot);
                    None
                }
                None => Some(Query::Final { frame, reply }),
            },
            Query::Fast { frame, reply } => match reconciler.fast_state(frame) {
                Some(snapshot) => {
                    let _ = reply.send(snapshot);
                    None
                }
                None => Some(Query::Fast { frame, reply }),
            },
        }
    }
}

/// Query and subscription handle for a running updater.
pub struct UpdaterHandle<G: Game> {
    queries: mpsc::UnboundedSender<Query<G>>,
    resolved: watch::Receiver<ResolvedFrame<G>>,
}

impl<G: Game> Clone for UpdaterHandle<G> {
    fn clone(&self) -> Self {
        Self { queries: self.queries.clone(), resolved: self.resolved.clone() }
    }
}

impl<G: Game> UpdaterHandle<G> {
    async fn ask(
        &self,
        query: impl FnOnce(oneshot::Sender<Snapshot<G>>) -> Query<G>,
    ) -> Result<Snapshot<G>> {
        let (reply, answer) = oneshot::channel();
        self.queries.send(query(reply)).map_err(|_| SyncError::EngineHalted)?;
        answer.await.map_err(|_| SyncError::EngineHalted)
    }

    /// Resolved state at `frame`; waits until every engine has contributed.
    ///
    /// A negative frame returns the most recent resolved frame immediately.
    pub async fn final_state(&self, frame: StateFrame) -> Result<Snapshot<G>> {
        self.ask(|reply| Query::Final { frame, reply }).await
    }

    /// Best-effort state at `frame`; waits only until some bundle reaches it.
    pub async fn fast_state(&self, frame: StateFrame) -> Result<Snapshot<G>> {
        self.ask(|reply| Query::Fast { frame, reply }).await
    }

    /// Most recently resolved frame.
    pub fn latest_resolved(&self) -> ResolvedFrame<G> {
        self.resolved.borrow().clone()
    }

    /// Watch receiver over resolved frames.
    pub fn subscribe(&self) -> watch::Receiver<ResolvedFrame<G>> {
        self.resolved.clone()
    }

    /// Stream of resolved frames, starting with the current one.
    ///
    /// Intermediate frames may be skipped when several resolve at once; each
    /// item is still a complete snapshot.
    pub fn resolved_frames(&self) -> impl Stream<Item = Arc<BootstrapFrame<G>>> + 'static {
        WatchStream::new(self.resolved.clone()).filter_map(|frame| async move { frame })
    }
}

/// Spawns the updater task.
pub struct Updater;

impl Updater {
    /// Start driving `reconciler`.
    ///
    /// The task ends on cancellation, when both bundle inputs close, or with
    /// an error when a bundle falls outside the history window. Queries still
    /// parked at exit fail with [`SyncError::EngineHalted`].
    pub fn spawn<G: Game>(
        reconciler: Reconciler<G>,
        channels: UpdaterChannels<G::Event>,
        cancel: CancellationToken,
    ) -> (UpdaterHandle<G>, JoinHandle<Result<()>>) {
        let (queries, query_rx) = mpsc::unbounded_channel();
        let (resolved_tx, resolved) = watch::channel(reconciler.latest_resolved().map(Arc::new));
        let task = tokio::spawn(Self::run(reconciler, channels, query_rx, resolved_tx, cancel));
        (UpdaterHandle { queries, resolved }, task)
    }

    async fn run<G: Game>(
        mut reconciler: Reconciler<G>,
        channels: UpdaterChannels<G::Event>,
        mut queries: mpsc::UnboundedReceiver<Query<G>>,
        resolved: watch::Sender<ResolvedFrame<G>>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let UpdaterChannels { mut local, mut remote, broadcast } = channels;
        let mut parked: Vec<Query<G>> = Vec::new();
        let mut local_open = true;
        let mut remote_open = true;

        info!(
            engine = %reconciler.id(),
            "Updater started at frame {}",
            reconciler.start_frame()
        );

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Updater cancelled");
                    break;
                }
                Some(query) = queries.recv() => {
                    if let Some(query) = query.try_answer(&reconciler) {
                        parked.push(query);
                    }
                    continue;
                }
                bundle = local.recv(), if local_open => match bundle {
                    Some(bundle) => {
                        trace!("Local bundle for frame {}", bundle.frame);
                        Some(reconciler.handle_local(bundle))
                    }
                    None => {
                        debug!("Local bundle stream closed");
                        local_open = false;
                        None
                    }
                },
                bundle = remote.recv(), if remote_open => match bundle {
                    Some(bundle) => {
                        trace!("Remote bundle for frame {}", bundle.frame);
                        Some(reconciler.handle_remote(bundle))
                    }
                    None => {
                        debug!("Remote bundle stream closed");
                        remote_open = false;
                        None
                    }
                },
            };

            match outcome {
                Some(Ok(effects)) => {
                    parked = Self::settle(parked, &effects.resolved, &reconciler);
                    Self::publish(effects, &broadcast, &resolved);
                }
                Some(Err(e)) => {
                    error!(
                        start = reconciler.start_frame(),
                        global = reconciler.global_frame(),
                        "Updater halted: {}",
                        e
                    );
                    return Err(e);
                }
                None => {}
            }

            if !local_open && !remote_open {
                debug!("All bundle inputs closed");
                break;
            }
        }

        info!("Updater stopped at frame {}", reconciler.start_frame());
        Ok(())
    }

    /// Retry parked queries after a bundle was applied.
    ///
    /// A final query for a frame that resolved in this batch gets that exact
    /// frame, even though the window may already have moved past it.
    fn settle<G: Game>(
        parked: Vec<Query<G>>,
        resolved: &[BootstrapFrame<G>],
        reconciler: &Reconciler<G>,
    ) -> Vec<Query<G>> {
        parked
            .into_iter()
            .filter_map(|query| match query {
                Query::Final { frame, reply } if frame >= 0 => {
                    match resolved.iter().find(|boot| boot.frame == frame) {
                        Some(boot) => {
                            let _ = reply.send(Snapshot { frame, game: Arc::clone(&boot.game) });
                            None
                        }
                        None => Query::Final { frame, reply }.try_answer(reconciler),
                    }
                }
                query => query.try_answer(reconciler),
            })
            .collect()
    }

    fn publish<G: Game>(
        effects: Effects<G>,
        broadcast: &mpsc::UnboundedSender<FrameBundle<G::Event>>,
        resolved: &watch::Sender<ResolvedFrame<G>>,
    ) {
        for bundle in effects.broadcast {
            // No session manager on a local-only engine.
            let _ = broadcast.send(bundle);
        }
        for frame in effects.resolved {
            resolved.send_replace(Some(Arc::new(frame)));
        }
    }
}
