//! Engine identity and frame numbering.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Simulation tick number. Frames only move forward.
pub type StateFrame = i64;

/// Exclusive upper bound for randomly assigned engine ids.
const ID_SPACE: u64 = 1 << 62;

/// Identity of one engine (peer) in a session.
///
/// Ids are drawn at random from `[0, 2^62)` by whichever engine hosts the
/// join, so collisions are negligible without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineId(u64);

impl EngineId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Draw a fresh id from the thread-local RNG.
    pub fn random() -> Self {
        Self(rand::thread_rng().gen_range(0..ID_SPACE))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Default for EngineId {
    fn default() -> Self {
        Self::random()
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<u64> for EngineId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}
