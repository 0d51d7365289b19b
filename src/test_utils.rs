//! Shared fixtures for unit tests and benchmarks.
//!
//! [`TestGame`] counts thinks, sums `A` events and keeps the last `B` event,
//! which is enough to tell apart every ordering and gating mistake the
//! reconciler could make.

#![cfg(any(test, feature = "benchmark"))]

use serde::{Deserialize, Serialize};

use crate::types::{
    AllEvents, EngineEvent, EngineId, EngineInfo, EngineParams, Event, FrameBundle, FrameData,
    Game, StateFrame,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestGame {
    pub thinks: u32,
    pub a: i64,
    pub b: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestEvent {
    /// Adds to `a`.
    A(i64),
    /// Replaces `b`.
    B(String),
}

impl Event<TestGame> for TestEvent {
    fn apply(&self, game: &mut TestGame) {
        match self {
            TestEvent::A(amount) => game.a += amount,
            TestEvent::B(text) => game.b = text.clone(),
        }
    }
}

impl Game for TestGame {
    type Event = TestEvent;

    fn think(&mut self) {
        self.thinks += 1;
    }
}

/// Parameters with no delay and the default window size.
pub fn test_params(id: u64) -> EngineParams {
    EngineParams::new(EngineId::new(id), 0, 5, 25)
}

/// Window seed with the given members and a fresh game.
pub fn initial_frame(members: &[u64]) -> FrameData<TestGame> {
    FrameData::new(members.iter().copied().map(EngineId::new).collect::<EngineInfo>(), TestGame::default())
}

/// One engine's contribution of game events to one frame.
pub fn contribution(frame: StateFrame, engine: u64, game: Vec<TestEvent>) -> FrameBundle<TestEvent> {
    FrameBundle::single(frame, EngineId::new(engine), AllEvents { game, engine: Vec::new() })
}

/// One engine's contribution of membership events to one frame.
pub fn membership(
    frame: StateFrame,
    engine: u64,
    events: Vec<EngineEvent>,
) -> FrameBundle<TestEvent> {
    FrameBundle::single(frame, EngineId::new(engine), AllEvents { game: Vec::new(), engine: events })
}

/// Merge several single-engine bundles for the same frame into one.
pub fn merged(parts: Vec<FrameBundle<TestEvent>>) -> FrameBundle<TestEvent> {
    let mut parts = parts.into_iter();
    let mut first = parts.next().unwrap_or_else(|| FrameBundle { frame: 0, bundle: Default::default() });
    for part in parts {
        debug_assert_eq!(part.frame, first.frame);
        first.bundle.extend(part.bundle);
    }
    first
}
