//! Compute core allocation
//!
//! First idle core wins. A core stays busy from launch until its
//! kernel-done interrupt.

use aqlpp_core::error::{PpError, Result};
use aqlpp_core::slot::SlotId;

/// Bookkeeping for one compute core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreSlot {
    pub busy: bool,
    /// Request running on the core; `SlotId::NONE` while idle
    pub slot: SlotId,
}

impl CoreSlot {
    const IDLE: CoreSlot = CoreSlot {
        busy: false,
        slot: SlotId::NONE,
    };
}

pub struct CoreAllocator {
    cores: Vec<CoreSlot>,
}

impl CoreAllocator {
    pub fn new(count: usize) -> Self {
        Self {
            cores: vec![CoreSlot::IDLE; count],
        }
    }

    /// Lowest-numbered idle core
    pub fn find_idle(&self) -> Option<usize> {
        self.cores.iter().position(|c| !c.busy)
    }

    /// Mark `core` busy running `slot`
    pub fn assign(&mut self, core: usize, slot: SlotId) -> Result<()> {
        match self.cores.get_mut(core) {
            Some(c) if !c.busy => {
                *c = CoreSlot { busy: true, slot };
                Ok(())
            }
            _ => Err(PpError::InvalidCore(core as u64)),
        }
    }

    /// Mark `core` idle and return the request it was running
    pub fn release(&mut self, core: usize) -> Result<SlotId> {
        match self.cores.get_mut(core) {
            Some(c) if c.busy => {
                let slot = c.slot;
                *c = CoreSlot::IDLE;
                Ok(slot)
            }
            _ => Err(PpError::InvalidCore(core as u64)),
        }
    }

    #[inline]
    pub fn busy_count(&self) -> usize {
        self.cores.iter().filter(|c| c.busy).count()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cores.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }

    pub fn get(&self, core: usize) -> Option<&CoreSlot> {
        self.cores.get(core)
    }
}
