//! # aqlpp-core
//!
//! Types and hardware seams for the AQL packet processor: the queue entry
//! formats the host writes, the argument blob layout, the register map,
//! the traits the dispatch engine drives the device through, and the
//! small containers (work queues, slot free list) it is built from.
//!
//! Nothing here schedules anything; see `aqlpp-engine` for the processor.

#[macro_use]
pub mod kprint;
pub mod env;
pub mod error;
pub mod free_list;
pub mod hw;
pub mod kernarg;
pub mod layout;
pub mod ops;
pub mod packet;
pub mod slot;
pub mod work_queue;

pub use error::{PpError, Result};
pub use free_list::FreeList;
pub use hw::{
    DeviceMemory, Doorbell, Interrupt, InterruptControl, IrqGuard, Mmio, Platform, QueueRing,
    SignalMemory, YieldPoint,
};
pub use kernarg::{CustomMask, KernelArgs};
pub use kprint::LogLevel;
pub use ops::{BorderHandling, ColorModel, DmaDirection, MaskSelection, Operation};
pub use packet::{
    AgentDispatchPacket, BarrierPacket, FenceScope, KernelDispatchPacket, Packet, PacketHeader,
    PacketType, RawPacket, SignalHandle, PACKET_SIZE,
};
pub use slot::SlotId;
pub use work_queue::WorkQueue;
