//! Dispatch-window slot identifier

use core::fmt;

/// Index of a Request Record in the dispatch table.
///
/// Slot ids are dense (`0..dispatch_window`). `u32::MAX` is reserved as
/// the "no request" sentinel, which is what the hardware-facing bookkeeping
/// (core slots, resource owners) stores when idle.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SlotId(u32);

impl SlotId {
    /// Sentinel value indicating no request
    pub const NONE: SlotId = SlotId(u32::MAX);

    #[inline]
    pub const fn new(id: u32) -> Self {
        SlotId(id)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get as usize for indexing
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }

    /// Convert to Option
    #[inline]
    pub const fn to_option(self) -> Option<SlotId> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

impl From<u32> for SlotId {
    #[inline]
    fn from(id: u32) -> Self {
        SlotId(id)
    }
}

impl fmt::Debug for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "SlotId(NONE)")
        } else {
            write!(f, "SlotId({})", self.0)
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "slot:none")
        } else {
            write!(f, "slot:{}", self.0)
        }
    }
}
