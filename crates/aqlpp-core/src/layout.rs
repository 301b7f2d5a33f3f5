//! Device address map
//!
//! Two windows are visible to the processor: device memory (packet ring,
//! queue bookkeeping, staging memory) and the config space (engine and core
//! registers). All offsets here are relative to the window base.

/// Base of device memory
pub const DEVICE_MEMORY_BASE: u64 = 0x0001_0000_0000_0000;

/// Base of the register file
pub const CONFIG_SPACE_BASE: u64 = 0x0002_0000_0000_0000;

/// Offsets inside device memory. Everything after the packet ring depends
/// on the queue length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLayout {
    queue_length: u64,
}

impl DeviceLayout {
    pub const fn new(queue_length: usize) -> Self {
        Self { queue_length: queue_length as u64 }
    }

    /// Packet ring, `queue_length` entries of 64 bytes
    #[inline]
    pub const fn packet_ring(&self) -> u64 {
        0
    }

    /// One PASID (u32) per ring entry
    #[inline]
    pub const fn pasid_array(&self) -> u64 {
        self.queue_length * crate::packet::PACKET_SIZE as u64
    }

    #[inline]
    pub const fn read_index(&self) -> u64 {
        self.pasid_array() + self.queue_length * 4
    }

    #[inline]
    pub const fn write_index(&self) -> u64 {
        self.read_index() + 8
    }

    /// First byte of free device memory (staging arena)
    #[inline]
    pub const fn free_memory(&self) -> u64 {
        self.write_index() + 8
    }
}

/// Config-space register offsets
pub mod regs {
    /// Write non-zero to halt the processor core
    pub const CPU_HALT: u64 = 0x00;
    /// Doorbell: the written value selects the target (see `hw::Doorbell`)
    pub const SND_INT: u64 = 0x08;
    /// Non-zero while the host has entries the processor has not consumed
    pub const AQL_LEFT: u64 = 0x10;
    /// Core index latched by a kernel-done interrupt
    pub const RCV_INT: u64 = 0x18;

    pub const DMA_HOST_ADDR: u64 = 0x50;
    pub const DMA_DEVICE_ADDR: u64 = 0x58;
    pub const DMA_PAYLOAD_SIZE: u64 = 0x60;
    /// u32, see `ops::DmaDirection`
    pub const DMA_LDST: u64 = 0x68;
    /// u32
    pub const DMA_PASID: u64 = 0x6C;

    pub const CMPL_SIG: u64 = 0x80;
    /// u32
    pub const CMPL_SIG_PASID: u64 = 0x88;
}

/// Per-core accelerator register block
pub mod core_regs {
    pub const ACCEL_BASE: u64 = 0x1000;
    pub const ACCEL_STRIDE: u64 = 0x200;

    pub const TASK: u64 = 0x00;
    pub const NORMALIZATION: u64 = 0x02;
    pub const THRESHOLD: u64 = 0x04;
    pub const COLOR_MODEL: u64 = 0x06;
    pub const BORDER_HANDLING: u64 = 0x07;
    pub const WIDTH: u64 = 0x08;
    pub const HEIGHT: u64 = 0x0C;
    pub const SRC_ADDR: u64 = 0x10;
    pub const DST_ADDR: u64 = 0x18;
    /// 25 x i32
    pub const MASK0: u64 = 0x20;
    /// 25 x i32
    pub const MASK1: u64 = 0x90;

    /// Config-space offset of `reg` in core `core`'s block
    #[inline]
    pub const fn offset(core: usize, reg: u64) -> u64 {
        ACCEL_BASE + core as u64 * ACCEL_STRIDE + reg
    }
}

/// Size of the config space window a platform has to back
pub const fn config_space_size(cores: usize) -> u64 {
    core_regs::ACCEL_BASE + cores as u64 * core_regs::ACCEL_STRIDE
}
