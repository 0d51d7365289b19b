//! Data model shared by every component.
//!
//! ## Overview
//!
//! - [`EngineId`] and [`StateFrame`] identify peers and simulation ticks
//! - [`Game`] and [`Event`] are the contract an application implements
//! - [`EngineEvent`] edits session membership ([`EngineInfo`])
//! - [`FrameBundle`] carries the contributions for one frame over the wire
//! - [`FrameData`] is one slot of the history window
//! - [`BootstrapFrame`] is the self-sufficient state of a resolved frame
//! - [`EngineParams`] configures an engine
//!
//! Game snapshots are shared through `Arc` and never mutated after they are
//! stored, so handing one to another task is a pointer copy.

mod events;
mod frame;
mod ids;
mod params;

pub use events::{AllEvents, EngineEvent, Event, EventBundle, Game};
pub use frame::{BootstrapFrame, EngineInfo, FrameBundle, FrameData, Snapshot};
pub use ids::{EngineId, StateFrame};
pub use params::EngineParams;
