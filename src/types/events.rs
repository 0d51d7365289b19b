//! Application contract and the events peers exchange.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::frame::EngineInfo;
use super::ids::EngineId;

/// Deterministic simulation driven by the engine.
///
/// Every peer replays the same events against the same prior state, so
/// [`think`](Game::think) and every [`Event::apply`] must be pure functions of
/// the state they are given: no clocks, no randomness without a seeded state,
/// no iteration over hash-ordered collections.
pub trait Game: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Events that mutate this game.
    type Event: Event<Self>;

    /// Advance the simulation by one frame.
    fn think(&mut self);

    /// Replace `self` with the contents of `other`.
    ///
    /// Lets an application keep one long-lived value (with its own buffers)
    /// and refresh it from engine snapshots.
    fn overwrite_with(&mut self, other: &Self) {
        self.clone_from(other);
    }
}

/// A change to the game contributed by one engine for one frame.
///
/// Polymorphic events are modeled as an application enum; serde carries the
/// discriminant on the wire.
pub trait Event<G>: Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    fn apply(&self, game: &mut G);
}

/// Membership change. Applied to [`EngineInfo`], never to the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "engine")]
pub enum EngineEvent {
    Joined(EngineId),
    Dropped(EngineId),
}

impl EngineEvent {
    pub fn apply(&self, info: &mut EngineInfo) {
        match *self {
            EngineEvent::Joined(id) => {
                info.insert(id);
            }
            EngineEvent::Dropped(id) => {
                info.remove(id);
            }
        }
    }

    pub fn engine(&self) -> EngineId {
        match *self {
            EngineEvent::Joined(id) | EngineEvent::Dropped(id) => id,
        }
    }
}

/// Everything one engine contributed to one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllEvents<E> {
    pub game: Vec<E>,
    pub engine: Vec<EngineEvent>,
}

impl<E> AllEvents<E> {
    pub fn is_empty(&self) -> bool {
        self.game.is_empty() && self.engine.is_empty()
    }
}

// Derived Default would require `E: Default`.
impl<E> Default for AllEvents<E> {
    fn default() -> Self {
        Self { game: Vec::new(), engine: Vec::new() }
    }
}

/// Contributions to a single frame keyed by the contributing engine.
///
/// Ordered by engine id so every peer replays contributions in the same order.
pub type EventBundle<E> = BTreeMap<EngineId, AllEvents<E>>;
