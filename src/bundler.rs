//! Frame clock and bundler.
//!
//! The bundler turns a millisecond clock into frame boundaries and a stream of
//! local events into one [`FrameBundle`] per frame. Events accumulate in the
//! frame that is in progress; when the clock crosses a boundary the
//! accumulated events are emitted, dated `delay` frames ahead, and the
//! accumulator starts over. A clock jump that crosses several boundaries emits
//! one bundle per crossed frame, so the outgoing stream never has gaps.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::stream::Ticker;
use crate::types::{AllEvents, EngineEvent, EngineId, EngineParams, FrameBundle, StateFrame};
use crate::{Result, SyncError};

/// Input accepted by a running bundler.
#[derive(Debug, Clone)]
pub enum BundlerCommand<E> {
    /// Game event for the frame in progress.
    Event(E),
    /// Membership change for the frame in progress.
    EngineEvent(EngineEvent),
    /// Signed millisecond correction added to the clock.
    CorrectClock(i64),
}

/// Synchronous clock and accumulator. [`Bundler`] drives one from a task.
#[derive(Debug)]
pub struct FrameClock<E> {
    id: EngineId,
    delay: StateFrame,
    frame_ms: i64,
    current_ms: i64,
    current_frame: StateFrame,
    pending: AllEvents<E>,
}

impl<E> FrameClock<E> {
    /// Clock at `current_ms`; the frame in progress is `current_ms / frame_ms`.
    ///
    /// `params` must have passed [`EngineParams::validate`].
    pub fn new(params: &EngineParams, current_ms: i64) -> Self {
        let frame_ms = params.frame_ms;
        debug_assert!(frame_ms > 0, "frame_ms must be positive, got {frame_ms}");
        Self {
            id: params.id,
            delay: params.delay,
            frame_ms,
            current_ms,
            current_frame: current_ms.div_euclid(frame_ms),
            pending: AllEvents::default(),
        }
    }

    pub fn current_ms(&self) -> i64 {
        self.current_ms
    }

    pub fn current_frame(&self) -> StateFrame {
        self.current_frame
    }

    /// Empty bundles covering the frames a delayed clock never dates events for.
    pub fn lead_in(&self) -> Vec<FrameBundle<E>> {
        (self.current_frame..self.current_frame + self.delay)
            .map(|frame| FrameBundle::empty(frame, self.id))
            .collect()
    }

    pub fn push_event(&mut self, event: E) {
        self.pending.game.push(event);
    }

    pub fn push_engine_event(&mut self, event: EngineEvent) {
        self.pending.engine.push(event);
    }

    /// Shift the clock without emitting; boundaries are evaluated on the next tick.
    pub fn correct(&mut self, delta_ms: i64) {
        self.current_ms += delta_ms;
    }

    /// Advance the clock and emit a bundle for every boundary crossed.
    pub fn tick(&mut self, elapsed_ms: u64) -> Vec<FrameBundle<E>> {
        self.current_ms += elapsed_ms as i64;
        let reached = self.current_ms.div_euclid(self.frame_ms);

        let mut out = Vec::new();
        while self.current_frame < reached {
            let events = std::mem::take(&mut self.pending);
            out.push(FrameBundle::single(self.current_frame + self.delay, self.id, events));
            self.current_frame += 1;
        }
        out
    }
}

/// Cloneable sender half of a running bundler.
pub struct BundlerHandle<E> {
    inbox: mpsc::UnboundedSender<BundlerCommand<E>>,
}

impl<E> Clone for BundlerHandle<E> {
    fn clone(&self) -> Self {
        Self { inbox: self.inbox.clone() }
    }
}

impl<E> BundlerHandle<E> {
    fn send(&self, command: BundlerCommand<E>) -> Result<()> {
        self.inbox.send(command).map_err(|_| SyncError::EngineHalted)
    }

    pub fn apply_event(&self, event: E) -> Result<()> {
        self.send(BundlerCommand::Event(event))
    }

    pub fn apply_engine_event(&self, event: EngineEvent) -> Result<()> {
        self.send(BundlerCommand::EngineEvent(event))
    }

    pub fn correct_clock(&self, delta_ms: i64) -> Result<()> {
        self.send(BundlerCommand::CorrectClock(delta_ms))
    }

    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }
}

/// Spawns the bundler task.
pub struct Bundler;

impl Bundler {
    /// Start a bundler whose clock reads `current_ms`.
    ///
    /// Bundles go to `output` in frame order. The task ends on cancellation or
    /// when every [`BundlerHandle`] is dropped, and dropping `output` on exit
    /// closes the stream for the consumer.
    pub fn spawn<E, T>(
        params: &EngineParams,
        current_ms: i64,
        ticker: T,
        output: mpsc::UnboundedSender<FrameBundle<E>>,
        cancel: CancellationToken,
    ) -> (BundlerHandle<E>, JoinHandle<()>)
    where
        E: Send + 'static,
        T: Ticker,
    {
        let (inbox, commands) = mpsc::unbounded_channel();
        let clock = FrameClock::new(params, current_ms);
        let task = tokio::spawn(Self::run(clock, ticker, commands, output, cancel));
        (BundlerHandle { inbox }, task)
    }

    async fn run<E, T>(
        mut clock: FrameClock<E>,
        ticker: T,
        mut commands: mpsc::UnboundedReceiver<BundlerCommand<E>>,
        output: mpsc::UnboundedSender<FrameBundle<E>>,
        cancel: CancellationToken,
    ) where
        T: Ticker,
    {
        info!(
            engine = %clock.id,
            frame = clock.current_frame(),
            "Bundler started at {}ms",
            clock.current_ms()
        );
        let mut ticker = std::pin::pin!(ticker);
        let mut emitted = 0u64;

        for bundle in clock.lead_in() {
            if output.send(bundle).is_err() {
                debug!("Bundle receiver dropped before lead-in completed");
                return;
            }
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Bundler cancelled");
                    break;
                }
                command = commands.recv() => match command {
                    Some(BundlerCommand::Event(event)) => clock.push_event(event),
                    Some(BundlerCommand::EngineEvent(event)) => {
                        debug!("Engine event {:?} queued for frame {}", event, clock.current_frame());
                        clock.push_engine_event(event);
                    }
                    Some(BundlerCommand::CorrectClock(delta)) => {
                        debug!("Clock corrected by {}ms", delta);
                        clock.correct(delta);
                    }
                    None => {
                        debug!("All bundler handles dropped");
                        break;
                    }
                },
                Some(elapsed) = ticker.next() => {
                    for bundle in clock.tick(elapsed) {
                        trace!("Emitting bundle for frame {}", bundle.frame);
                        if output.send(bundle).is_err() {
                            debug!("Bundle receiver dropped, shutting down");
                            return;
                        }
                        emitted += 1;
                    }
                }
            }
        }

        info!("Bundler stopped after {} bundles", emitted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestEvent, test_params};
    use crate::stream::ManualClock;

    fn clock(delay: StateFrame) -> FrameClock<TestEvent> {
        let mut params = test_params(1234);
        params.delay = delay;
        FrameClock::new(&params, 0)
    }

    #[test]
    fn crossing_three_boundaries_emits_three_bundles() {
        let mut clock = clock(0);
        let bundles = clock.tick(17);
        let frames: Vec<StateFrame> = bundles.iter().map(|b| b.frame).collect();
        assert_eq!(frames, vec![0, 1, 2]);
        assert_eq!(clock.current_frame(), 3);
    }

    #[test]
    fn pending_events_go_to_first_crossed_frame() {
        let mut clock = clock(0);
        clock.push_event(TestEvent::A(1));
        clock.push_engine_event(EngineEvent::Joined(EngineId::new(9)));

        let bundles = clock.tick(12);
        assert_eq!(bundles.len(), 2);
        let first = &bundles[0].bundle[&EngineId::new(1234)];
        assert_eq!(first.game, vec![TestEvent::A(1)]);
        assert_eq!(first.engine, vec![EngineEvent::Joined(EngineId::new(9))]);
        assert!(bundles[1].bundle[&EngineId::new(1234)].is_empty());
    }

    #[test]
    fn ticks_inside_a_frame_emit_nothing() {
        let mut clock = clock(0);
        for _ in 0..4 {
            assert!(clock.tick(1).is_empty());
        }
        assert_eq!(clock.tick(1).len(), 1);
    }

    #[test]
    fn correction_is_applied_on_next_tick() {
        let mut clock = clock(0);
        clock.correct(20);
        assert_eq!(clock.current_frame(), 0);

        let frames: Vec<StateFrame> = clock.tick(1).iter().map(|b| b.frame).collect();
        assert_eq!(frames, vec![0, 1, 2, 3]);
    }

    #[test]
    fn negative_correction_holds_the_clock() {
        let mut clock = clock(0);
        clock.correct(-10);
        assert!(clock.tick(9).is_empty());
        assert_eq!(clock.tick(6).len(), 1);
    }

    #[test]
    fn delay_dates_bundles_ahead_and_fills_lead_in() {
        let mut params = test_params(7);
        params.delay = 2;
        let mut clock: FrameClock<TestEvent> = FrameClock::new(&params, 5 * 10);

        let lead: Vec<StateFrame> = clock.lead_in().iter().map(|b| b.frame).collect();
        assert_eq!(lead, vec![10, 11]);

        let next: Vec<StateFrame> = clock.tick(5).iter().map(|b| b.frame).collect();
        assert_eq!(next, vec![12]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "frame_ms must be positive")]
    fn unvalidated_frame_length_is_caught() {
        let mut params = test_params(1234);
        params.frame_ms = 0;
        let _: FrameClock<TestEvent> = FrameClock::new(&params, 0);
    }

    #[tokio::test]
    async fn running_bundler_alternates_event_order() -> anyhow::Result<()> {
        let _ = tracing_subscriber::fmt::try_init();
        let params = test_params(1234);
        let id = params.id;
        let (clock, ticker) = ManualClock::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let (handle, task) = Bundler::spawn(&params, 0, ticker, tx, cancel.clone());

        let mut frame = 0;
        for _ in 0..10 {
            if frame % 4 == 0 {
                handle.apply_event(TestEvent::A(frame))?;
                handle.apply_event(TestEvent::B(frame.to_string()))?;
            } else {
                handle.apply_event(TestEvent::B(frame.to_string()))?;
                handle.apply_event(TestEvent::A(frame))?;
            }
            clock.advance(10);

            for _ in 0..2 {
                let bundle = rx.recv().await.ok_or_else(|| anyhow::anyhow!("stream ended"))?;
                assert_eq!(bundle.frame, frame);
                let events = &bundle.bundle[&id].game;
                if frame % 2 == 1 {
                    assert!(events.is_empty(), "odd frame {frame} should be empty");
                } else if frame % 4 == 0 {
                    assert_eq!(events, &vec![TestEvent::A(frame), TestEvent::B(frame.to_string())]);
                } else {
                    assert_eq!(events, &vec![TestEvent::B(frame.to_string()), TestEvent::A(frame)]);
                }
                frame += 1;
            }
        }

        cancel.cancel();
        task.await?;
        assert!(rx.recv().await.is_none(), "stream closes after shutdown");
        assert!(handle.apply_event(TestEvent::A(0)).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn dropping_handles_stops_bundler() -> anyhow::Result<()> {
        let params = test_params(1);
        let (_clock, ticker) = ManualClock::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<FrameBundle<TestEvent>>();
        let (handle, task) = Bundler::spawn(&params, 0, ticker, tx, CancellationToken::new());

        drop(handle);
        task.await?;
        assert!(rx.recv().await.is_none());
        Ok(())
    }
}
