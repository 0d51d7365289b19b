//! Auditor: the checkpoint between the session manager and the updater.
//!
//! Every remote bundle passes through an [`AuditPolicy`] before it reaches
//! the updater. The policy may forward it, drop it, add bundles of its own
//! (for example empty contributions on behalf of a peer it has declared
//! dead), and suggest clock corrections that are sent to the bundler.
//!
//! The default [`PassThrough`] policy forwards everything unchanged.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::bundler::BundlerHandle;
use crate::types::FrameBundle;

/// What to do with one audited bundle.
#[derive(Debug)]
pub struct Audit<E> {
    /// Bundles handed to the updater, in order.
    pub forward: Vec<FrameBundle<E>>,
    /// Signed millisecond correction for the local clock.
    pub clock_correction_ms: Option<i64>,
}

impl<E> Audit<E> {
    pub fn forward(bundle: FrameBundle<E>) -> Self {
        Self { forward: vec![bundle], clock_correction_ms: None }
    }

    pub fn drop_bundle() -> Self {
        Self { forward: Vec::new(), clock_correction_ms: None }
    }
}

/// Liveness and skew policy applied to remote bundles.
pub trait AuditPolicy<E>: Send + 'static {
    fn audit(&mut self, bundle: FrameBundle<E>) -> Audit<E>;
}

/// Forwards every bundle unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl<E> AuditPolicy<E> for PassThrough {
    fn audit(&mut self, bundle: FrameBundle<E>) -> Audit<E> {
        Audit::forward(bundle)
    }
}

/// Spawns the auditor task.
pub struct Auditor;

impl Auditor {
    /// Start auditing bundles from `input` into `output`.
    ///
    /// The task ends when `input` closes or on cancellation, dropping
    /// `output` so the updater sees the remote stream end.
    pub fn spawn<E, P>(
        mut policy: P,
        mut input: mpsc::UnboundedReceiver<FrameBundle<E>>,
        output: mpsc::UnboundedSender<FrameBundle<E>>,
        clock: Option<BundlerHandle<E>>,
        cancel: CancellationToken,
    ) -> JoinHandle<()>
    where
        E: Send + 'static,
        P: AuditPolicy<E>,
    {
        tokio::spawn(async move {
            info!("Auditor started");
            loop {
                let bundle = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    bundle = input.recv() => match bundle {
                        Some(bundle) => bundle,
                        None => break,
                    },
                };

                let frame = bundle.frame;
                let Audit { forward, clock_correction_ms } = policy.audit(bundle);
                if forward.is_empty() {
                    debug!("Bundle for frame {} held back by audit policy", frame);
                }
                for bundle in forward {
                    trace!("Forwarding audited bundle for frame {}", bundle.frame);
                    if output.send(bundle).is_err() {
                        debug!("Updater gone, stopping auditor");
                        return;
                    }
                }
                if let (Some(delta), Some(clock)) = (clock_correction_ms, clock.as_ref()) {
                    let _ = clock.correct_clock(delta);
                }
            }
            info!("Auditor stopped");
        })
    }
}
