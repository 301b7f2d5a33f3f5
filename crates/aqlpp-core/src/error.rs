//! Error types for the packet processor
//!
//! None of these are recoverable in the firmware sense: the processor never
//! retries. They exist so the conditions the hardware design leaves
//! undefined (out-of-order interrupts, overflowing staging memory) halt the
//! loop with a description instead of corrupting the dispatch table.

use core::fmt;

/// Result type for processor operations
pub type Result<T> = core::result::Result<T, PpError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PpError {
    /// A work queue was pushed past its capacity
    QueueFull(&'static str),

    /// A request was asked to move to a stage that does not follow its current one
    InvalidTransition {
        slot: u32,
        from: &'static str,
        to: &'static str,
    },

    /// An interrupt fired for a resource that no request owns
    SpuriousInterrupt(&'static str),

    /// Image does not fit the per-slot staging buffer
    StagingOverflow {
        slot: u32,
        needed: u64,
        available: u64,
    },

    /// Core index out of range or core not busy
    InvalidCore(u64),

    /// Slot id out of range, or released while already free
    InvalidSlot(u32),

    /// Argument blob shorter than its operation requires
    MalformedArgs(&'static str),

    /// Device or host address outside any mapped region
    BadAddress(u64),

    /// Memory mapping failed
    Memory(&'static str),

    /// Invalid configuration
    Config(&'static str),

    /// No forward progress after the given number of loop iterations
    Stalled(usize),
}

impl fmt::Display for PpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PpError::QueueFull(name) => write!(f, "{} queue full", name),
            PpError::InvalidTransition { slot, from, to } => {
                write!(f, "slot {}: invalid transition {} -> {}", slot, from, to)
            }
            PpError::SpuriousInterrupt(src) => write!(f, "spurious {} interrupt", src),
            PpError::StagingOverflow { slot, needed, available } => write!(
                f,
                "slot {}: image needs {} bytes, staging buffer holds {}",
                slot, needed, available
            ),
            PpError::InvalidCore(core) => write!(f, "invalid core {}", core),
            PpError::InvalidSlot(slot) => write!(f, "invalid slot {}", slot),
            PpError::MalformedArgs(msg) => write!(f, "malformed kernel arguments: {}", msg),
            PpError::BadAddress(addr) => write!(f, "bad address {:#x}", addr),
            PpError::Memory(msg) => write!(f, "memory error: {}", msg),
            PpError::Config(msg) => write!(f, "config error: {}", msg),
            PpError::Stalled(iters) => write!(f, "no progress after {} iterations", iters),
        }
    }
}

impl std::error::Error for PpError {}
