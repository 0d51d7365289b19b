//! Peer-to-peer lockstep synchronization for deterministic simulations.
//!
//! Tandem keeps several copies of one deterministic game in step by
//! exchanging what happened each frame, never the state itself. Every engine
//! keeps a short window of recent frames; late contributions rewind the
//! window and replay it, so all peers resolve the same frames to the same
//! state regardless of network timing.
//!
//! # Features
//!
//! - **Deterministic reconciliation**: arrival order never changes resolved state
//! - **Speculative reads**: best-effort state ahead of the resolved frontier
//! - **Late join**: new engines bootstrap from a resolved frame, not from genesis
//! - **Pluggable transports**: an in-process fabric ships with the crate
//!
//! # Architecture
//!
//! Each engine runs four tasks connected by channels:
//!
//! - [`bundler`]: turns clock ticks and local events into per-frame bundles
//! - [`updater`]: owns the [`reconciler`] and answers state queries
//! - [`communicator`]: floods bundles between peers and admits joiners
//! - [`auditor`]: checkpoint for remote bundles before they reach the updater
//!
//! [`EngineBuilder`] wires them together.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tandem::{EngineBuilder, EngineParams};
//! use tandem::types::{Event, Game};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Default, Serialize, Deserialize)]
//! struct Tally { total: i64, frames: u64 }
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! struct Add(i64);
//!
//! impl Event<Tally> for Add {
//!     fn apply(&self, game: &mut Tally) { game.total += self.0; }
//! }
//!
//! impl Game for Tally {
//!     type Event = Add;
//!     fn think(&mut self) { self.frames += 1; }
//! }
//!
//! #[tokio::main]
//! async fn main() -> tandem::Result<()> {
//!     let engine = EngineBuilder::new(EngineParams::default()).local(Tally::default())?;
//!     engine.apply_event(Add(3))?;
//!
//!     let snapshot = engine.final_state(10).await?;
//!     println!("frame {}: total {}", snapshot.frame, snapshot.game.total);
//!     engine.shutdown().await
//! }
//! ```

pub mod auditor;
pub mod bundler;
pub mod communicator;
pub mod engine;
mod error;
pub mod reconciler;
pub mod stream;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod transport;
pub mod transports;
pub mod types;
pub mod updater;
pub mod window;

pub use engine::{Engine, EngineBuilder};
pub use error::*;
pub use transport::{Connection, Message, RemoteHost, Transport};
pub use transports::{MemoryNetwork, MemoryTransport};
pub use types::*;
pub use updater::{Updater, UpdaterHandle};
