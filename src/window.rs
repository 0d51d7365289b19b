//! Fixed-capacity circular history of per-frame slots.
//!
//! The window covers `[start, start + capacity)`. Advancing moves `start`
//! forward by one and recycles the oldest slot as the new top slot; its
//! contents are stale until the owner overwrites them. Any access outside the
//! range is an error, never a silent wrap.

use crate::types::StateFrame;
use crate::{Result, SyncError};

#[derive(Debug, Clone)]
pub struct HistoryWindow<T> {
    start: StateFrame,
    head: usize,
    slots: Vec<T>,
}

impl<T: Clone> HistoryWindow<T> {
    /// Window of `capacity` slots starting at `start`, every slot a clone of `seed`.
    ///
    /// A zero capacity is raised to one so the start frame is always addressable.
    pub fn new(capacity: usize, start: StateFrame, seed: T) -> Self {
        Self { start, head: 0, slots: vec![seed; capacity.max(1)] }
    }
}

impl<T> HistoryWindow<T> {
    pub fn start(&self) -> StateFrame {
        self.start
    }

    /// First frame past the window.
    pub fn end(&self) -> StateFrame {
        self.start + self.slots.len() as StateFrame
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn contains(&self, frame: StateFrame) -> bool {
        frame >= self.start && frame < self.end()
    }

    fn index(&self, frame: StateFrame) -> Result<usize> {
        if !self.contains(frame) {
            return Err(SyncError::out_of_range(frame, self.start, self.end()));
        }
        let offset = (frame - self.start) as usize;
        Ok((self.head + offset) % self.slots.len())
    }

    pub fn get(&self, frame: StateFrame) -> Result<&T> {
        let index = self.index(frame)?;
        Ok(&self.slots[index])
    }

    pub fn get_mut(&mut self, frame: StateFrame) -> Result<&mut T> {
        let index = self.index(frame)?;
        Ok(&mut self.slots[index])
    }

    pub fn set(&mut self, frame: StateFrame, value: T) -> Result<()> {
        *self.get_mut(frame)? = value;
        Ok(())
    }

    /// Drop the oldest frame. The freed slot becomes frame `end() - 1`.
    pub fn advance(&mut self) {
        self.start += 1;
        self.head = (self.head + 1) % self.slots.len();
    }
}
