//! Transport implementations.

pub mod memory;

pub use memory::{MemoryNetwork, MemoryTransport};
