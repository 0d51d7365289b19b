//! Per-frame state held in the history window and shared between components.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::events::{AllEvents, EventBundle, Game};
use super::ids::{EngineId, StateFrame};

/// Engines that are members of the session as of a frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineInfo {
    engines: BTreeSet<EngineId>,
}

impl EngineInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: EngineId) -> bool {
        self.engines.contains(&id)
    }

    pub fn insert(&mut self, id: EngineId) -> bool {
        self.engines.insert(id)
    }

    pub fn remove(&mut self, id: EngineId) -> bool {
        self.engines.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Member ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = EngineId> + '_ {
        self.engines.iter().copied()
    }
}

impl FromIterator<EngineId> for EngineInfo {
    fn from_iter<I: IntoIterator<Item = EngineId>>(iter: I) -> Self {
        Self { engines: iter.into_iter().collect() }
    }
}

/// Contributions for one frame, as produced by a bundler or relayed by a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameBundle<E> {
    pub frame: StateFrame,
    pub bundle: EventBundle<E>,
}

impl<E> FrameBundle<E> {
    /// Bundle holding a single engine's contribution.
    pub fn single(frame: StateFrame, engine: EngineId, events: AllEvents<E>) -> Self {
        let mut bundle = EventBundle::new();
        bundle.insert(engine, events);
        Self { frame, bundle }
    }

    /// An engine's "nothing happened" contribution.
    pub fn empty(frame: StateFrame, engine: EngineId) -> Self {
        Self::single(frame, engine, AllEvents::default())
    }

    pub fn contributors(&self) -> impl Iterator<Item = EngineId> + '_ {
        self.bundle.keys().copied()
    }
}

/// One slot of the history window.
///
/// `game` is an immutable snapshot; recomputing a frame stores a new `Arc`
/// rather than mutating the shared one.
pub struct FrameData<G: Game> {
    pub info: EngineInfo,
    pub game: Arc<G>,
    pub bundle: EventBundle<G::Event>,
    /// Set on the first frame after a bootstrap until a contribution lands.
    pub placeholder: bool,
}

impl<G: Game> FrameData<G> {
    pub fn new(info: EngineInfo, game: G) -> Self {
        Self { info, game: Arc::new(game), bundle: EventBundle::new(), placeholder: false }
    }
}

// Manual impl: cloning the slot clones the `Arc`, not the game.
impl<G: Game> Clone for FrameData<G> {
    fn clone(&self) -> Self {
        Self {
            info: self.info.clone(),
            game: Arc::clone(&self.game),
            bundle: self.bundle.clone(),
            placeholder: self.placeholder,
        }
    }
}

/// Self-sufficient state of a resolved frame.
///
/// Published every time the window advances and sent to joiners so they can
/// start simulating without the history before it.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct BootstrapFrame<G: Game> {
    pub frame: StateFrame,
    pub game: Arc<G>,
    pub info: EngineInfo,
}

impl<G: Game> Clone for BootstrapFrame<G> {
    fn clone(&self) -> Self {
        Self { frame: self.frame, game: Arc::clone(&self.game), info: self.info.clone() }
    }
}

impl<G: Game> std::fmt::Debug for BootstrapFrame<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapFrame")
            .field("frame", &self.frame)
            .field("engines", &self.info.len())
            .finish_non_exhaustive()
    }
}

/// Answer to a state query: a frame number and the game as of that frame.
pub struct Snapshot<G> {
    pub frame: StateFrame,
    pub game: Arc<G>,
}

impl<G> Clone for Snapshot<G> {
    fn clone(&self) -> Self {
        Self { frame: self.frame, game: Arc::clone(&self.game) }
    }
}

impl<G> std::fmt::Debug for Snapshot<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot").field("frame", &self.frame).finish_non_exhaustive()
    }
}
