//! Hardware seams
//!
//! The processor never touches memory or registers directly. Everything it
//! needs from the device goes through these traits, so the same engine
//! runs against the real register file or against `aqlpp-sim`.
//!
//! All methods take `&self`: the hardware is shared with interrupt context,
//! and implementations provide their own interior mutability.
//!
//! | Trait | Provides |
//! |---|---|
//! | [`DeviceMemory`] | absolute-address reads/writes of device memory |
//! | [`QueueRing`] | packet ring, PASID array, read/write indices |
//! | [`SignalMemory`] | current value of a host completion signal |
//! | [`Mmio`] | config-space register access and the doorbell |
//! | [`InterruptControl`] | masking, pending interrupt delivery, yielding |

use crate::error::{PpError, Result};
use crate::layout::{regs, DeviceLayout, DEVICE_MEMORY_BASE};
use crate::packet::{PacketHeader, RawPacket, SignalHandle, PACKET_SIZE};

/// Device memory, addressed with absolute device addresses
/// (`DEVICE_MEMORY_BASE + offset`)
pub trait DeviceMemory {
    fn read_device(&self, addr: u64, buf: &mut [u8]) -> Result<()>;

    fn write_device(&self, addr: u64, data: &[u8]) -> Result<()>;

    fn read_device_u64(&self, addr: u64) -> Result<u64> {
        let mut b = [0u8; 8];
        self.read_device(addr, &mut b)?;
        Ok(u64::from_le_bytes(b))
    }

    fn write_device_u64(&self, addr: u64, value: u64) -> Result<()> {
        self.write_device(addr, &value.to_le_bytes())
    }
}

/// The host-visible packet ring and its bookkeeping words.
///
/// Only `queue_length` is required; the rest is derived from the device
/// layout.
pub trait QueueRing: DeviceMemory {
    /// Number of ring entries, a power of two
    fn queue_length(&self) -> usize;

    fn device_layout(&self) -> DeviceLayout {
        DeviceLayout::new(self.queue_length())
    }

    /// Copy of the entry at `ring_index` (already masked)
    fn read_packet(&self, ring_index: u64) -> Result<RawPacket> {
        let mut raw = RawPacket::zeroed();
        self.read_device(entry_addr(self, ring_index)?, &mut raw.0)?;
        Ok(raw)
    }

    fn write_header(&self, ring_index: u64, header: PacketHeader) -> Result<()> {
        self.write_device(entry_addr(self, ring_index)?, &header.raw().to_le_bytes())
    }

    /// Address-space id the host stored for the entry at `ring_index`
    fn pasid(&self, ring_index: u64) -> Result<u32> {
        let addr = DEVICE_MEMORY_BASE + self.device_layout().pasid_array() + ring_index * 4;
        let mut b = [0u8; 4];
        self.read_device(addr, &mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    fn read_index(&self) -> Result<u64> {
        self.read_device_u64(DEVICE_MEMORY_BASE + self.device_layout().read_index())
    }

    fn write_index(&self) -> Result<u64> {
        self.read_device_u64(DEVICE_MEMORY_BASE + self.device_layout().write_index())
    }

    /// Publish one retired entry to the host
    fn advance_read_index(&self) -> Result<u64> {
        let next = self.read_index()? + 1;
        self.write_device_u64(DEVICE_MEMORY_BASE + self.device_layout().read_index(), next)?;
        Ok(next)
    }
}

fn entry_addr<Q: QueueRing + ?Sized>(ring: &Q, ring_index: u64) -> Result<u64> {
    if ring_index >= ring.queue_length() as u64 {
        return Err(PpError::BadAddress(ring_index));
    }
    Ok(DEVICE_MEMORY_BASE + ring.device_layout().packet_ring() + ring_index * PACKET_SIZE as u64)
}

/// Host completion / dependency signals
pub trait SignalMemory {
    /// Current value of the counter behind `handle`. A signal is "set" once
    /// its value reaches 0.
    fn load_signal(&self, handle: SignalHandle) -> Result<i64>;
}

/// Config-space register access, offsets relative to `CONFIG_SPACE_BASE`
pub trait Mmio {
    fn write8(&self, offset: u64, value: u8);
    fn write16(&self, offset: u64, value: u16);
    fn write32(&self, offset: u64, value: u32);
    fn write64(&self, offset: u64, value: u64);
    fn read64(&self, offset: u64) -> u64;

    /// Raise the doorbell for the resource named by `code`
    fn ring_doorbell(&self, code: u64) {
        self.write64(regs::SND_INT, code);
    }
}

/// Interrupt masking and delivery
pub trait InterruptControl {
    /// Mask interrupts; returns whether they were enabled before
    fn disable_interrupts(&self) -> bool;

    fn enable_interrupts(&self);

    /// Next pending interrupt, if any is pending and interrupts are enabled.
    /// Real hardware vectors interrupts itself and returns `None`.
    fn take_interrupt(&self) -> Option<Interrupt> {
        None
    }

    /// Called on every iteration of a busy wait. `spins` counts iterations
    /// of the current wait, starting at 0.
    fn yield_now(&self, point: YieldPoint, spins: usize) {
        let _ = (point, spins);
        core::hint::spin_loop();
    }
}

/// Everything the processor needs from the hardware
pub trait Platform: QueueRing + SignalMemory + Mmio + InterruptControl {}

impl<T> Platform for T where T: QueueRing + SignalMemory + Mmio + InterruptControl {}

/// Interrupts masked for the guard's lifetime. Nesting is harmless: only
/// the outermost guard re-enables.
pub struct IrqGuard<'a, I: InterruptControl + ?Sized> {
    ctl: &'a I,
    was_enabled: bool,
}

impl<'a, I: InterruptControl + ?Sized> IrqGuard<'a, I> {
    pub fn new(ctl: &'a I) -> Self {
        let was_enabled = ctl.disable_interrupts();
        Self { ctl, was_enabled }
    }
}

impl<I: InterruptControl + ?Sized> Drop for IrqGuard<'_, I> {
    fn drop(&mut self) {
        if self.was_enabled {
            self.ctl.enable_interrupts();
        }
    }
}

/// Interrupt sources wired to the processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interrupt {
    /// DMA engine finished the programmed transfer
    DmaDone,
    /// A compute core finished; the core index is latched in `RCV_INT`
    KernelDone,
    /// Completion engine decremented the programmed signal
    CompletionDone,
    CoreAdded,
    CoreRemoved,
}

/// Named busy-wait points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum YieldPoint {
    /// Top of the main loop
    MainLoop,
    /// Barrier bit set: waiting for every earlier entry to retire
    AcquireBarrier,
    /// Barrier packet: waiting on dependency signals
    DependencyWait,
}

/// Doorbell target. The value written to `SND_INT` depends on the number
/// of compute cores: core indices come first, then four reserved codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Doorbell {
    Core(usize),
    CoreRemovedAck,
    CoreAddedAck,
    CompletionEngine,
    DmaEngine,
}

impl Doorbell {
    pub const fn encode(self, cores: usize) -> u64 {
        let code = match self {
            Doorbell::Core(i) => i,
            Doorbell::CoreRemovedAck => cores,
            Doorbell::CoreAddedAck => cores + 1,
            Doorbell::CompletionEngine => cores + 2,
            Doorbell::DmaEngine => cores + 3,
        };
        code as u64
    }

    pub const fn decode(code: u64, cores: usize) -> Option<Self> {
        let c = cores as u64;
        if code < c {
            Some(Doorbell::Core(code as usize))
        } else if code == c {
            Some(Doorbell::CoreRemovedAck)
        } else if code == c + 1 {
            Some(Doorbell::CoreAddedAck)
        } else if code == c + 2 {
            Some(Doorbell::CompletionEngine)
        } else if code == c + 3 {
            Some(Doorbell::DmaEngine)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    #[test]
    fn test_doorbell_codes() {
        assert_eq!(Doorbell::Core(1).encode(4), 1);
        assert_eq!(Doorbell::CoreRemovedAck.encode(4), 4);
        assert_eq!(Doorbell::CoreAddedAck.encode(4), 5);
        assert_eq!(Doorbell::CompletionEngine.encode(4), 6);
        assert_eq!(Doorbell::DmaEngine.encode(1), 4);
        assert_eq!(Doorbell::decode(6, 4), Some(Doorbell::CompletionEngine));
        assert_eq!(Doorbell::decode(3, 4), Some(Doorbell::Core(3)));
        assert_eq!(Doorbell::decode(8, 4), None);
    }

    struct Flag(Cell<bool>);

    impl InterruptControl for Flag {
        fn disable_interrupts(&self) -> bool {
            self.0.replace(false)
        }
        fn enable_interrupts(&self) {
            self.0.set(true);
        }
    }

    #[test]
    fn test_irq_guard_nesting() {
        let ctl = Flag(Cell::new(true));
        {
            let _outer = IrqGuard::new(&ctl);
            assert!(!ctl.0.get());
            {
                let _inner = IrqGuard::new(&ctl);
            }
            // inner guard must not re-enable
            assert!(!ctl.0.get());
        }
        assert!(ctl.0.get());
    }
}
