//! Free-list stack of dispatch-window slots
//!
//! LIFO stack, the same shape as the firmware's `free_slots[]` array with a
//! `remaining` counter: allocation pops from the top, release pushes back.
//! A slot that is already free can't be released again, so a slot index is
//! never handed to two live requests.

use crate::error::{PpError, Result};
use crate::slot::SlotId;

/// Fixed-capacity slot free list
pub struct FreeList {
    /// Free slot ids, top of stack is the next allocation
    stack: Vec<SlotId>,

    /// `held[i]` is true while slot `i` is allocated
    held: Vec<bool>,
}

impl FreeList {
    /// Create a free list holding slots `0..capacity`
    pub fn new(capacity: usize) -> Self {
        Self {
            stack: (0..capacity as u32).map(SlotId::new).collect(),
            held: vec![false; capacity],
        }
    }

    /// Pop a free slot, or `None` if the window is exhausted
    pub fn allocate(&mut self) -> Option<SlotId> {
        let slot = self.stack.pop()?;
        self.held[slot.as_usize()] = true;
        Some(slot)
    }

    /// Return a slot to the free list
    pub fn release(&mut self, slot: SlotId) -> Result<()> {
        match self.held.get_mut(slot.as_usize()) {
            Some(held) if *held => {
                *held = false;
                self.stack.push(slot);
                Ok(())
            }
            _ => Err(PpError::InvalidSlot(slot.as_u32())),
        }
    }

    /// Number of free slots
    #[inline]
    pub fn remaining(&self) -> usize {
        self.stack.len()
    }

    /// Number of allocated slots
    #[inline]
    pub fn in_use(&self) -> usize {
        self.held.len() - self.stack.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.held.len()
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.stack.is_empty()
    }

    /// Snapshot of the free ids, sorted
    pub fn free_ids(&self) -> Vec<SlotId> {
        let mut ids = self.stack.clone();
        ids.sort();
        ids
    }
}
