//! Millisecond clock sources for the bundler.
//!
//! A ticker is any stream of elapsed milliseconds. The bundler adds each item
//! to its clock, so a ticker that reports a stall as one large step makes the
//! bundler catch up by emitting every frame it missed.

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Sleep, sleep_until};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Source of elapsed milliseconds.
pub trait Ticker: Stream<Item = u64> + Send + 'static {}

impl<T> Ticker for T where T: Stream<Item = u64> + Send + 'static {}

pin_project! {
    /// Wall-clock ticker.
    ///
    /// Reports whole milliseconds elapsed since the previous item and carries
    /// the sub-millisecond remainder forward, so the total never drifts from
    /// the wall clock even when the task is polled late.
    pub struct IntervalTicker {
        #[pin]
        sleep: Sleep,
        period: Duration,
        last: Instant,
    }
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let now = Instant::now();
        Self { sleep: sleep_until(now + period), period, last: now }
    }

    /// Ticker waking every millisecond.
    pub fn millis() -> Self {
        Self::new(Duration::from_millis(1))
    }
}

impl Stream for IntervalTicker {
    type Item = u64;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<u64>> {
        let mut this = self.project();
        ready!(this.sleep.as_mut().poll(cx));

        let now = Instant::now();
        let elapsed = now.saturating_duration_since(*this.last).as_millis() as u64;
        *this.last += Duration::from_millis(elapsed);
        this.sleep.as_mut().reset(now + *this.period);

        Poll::Ready(Some(elapsed))
    }
}

/// Ticker driven by hand through its [`ManualClock`].
///
/// Used for replays and tests where frame boundaries must land exactly.
pub type ManualTicker = UnboundedReceiverStream<u64>;

/// Handle that advances a [`ManualTicker`].
#[derive(Debug, Clone)]
pub struct ManualClock {
    tx: mpsc::UnboundedSender<u64>,
}

impl ManualClock {
    pub fn new() -> (Self, ManualTicker) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, UnboundedReceiverStream::new(rx))
    }

    /// Advance the clock. Returns false once the ticker is gone.
    pub fn advance(&self, ms: u64) -> bool {
        self.tx.send(ms).is_ok()
    }
}
