//! Work queue entries
//!
//! Each entry names the request (or barrier entry) that owns it, so the
//! completion interrupt for the resource can find its way back.

use aqlpp_core::kernarg::CustomMask;
use aqlpp_core::ops::{BorderHandling, ColorModel, DmaDirection, Operation};
use aqlpp_core::packet::SignalHandle;
use aqlpp_core::slot::SlotId;

/// One transfer for the DMA engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaRequest {
    pub slot: SlotId,
    pub host_address: u64,
    pub device_address: u64,
    pub payload_size: u64,
    pub direction: DmaDirection,
    pub pasid: u32,
}

/// Everything a compute core needs to run one filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchRequest {
    pub slot: SlotId,
    pub operation: Operation,
    pub normalization: u16,
    pub threshold: u16,
    pub color_model: ColorModel,
    pub border_handling: BorderHandling,
    pub width: u32,
    pub height: u32,
    /// Device address of the staged image; results are written in place
    pub src_address: u64,
    pub dst_address: u64,
    pub custom_mask: Option<CustomMask>,
}

/// Who is waiting for a completion-signal decrement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrementOwner {
    /// A kernel-dispatch request in `SignalingCompletion`
    Request(SlotId),
    /// A barrier entry, retired by ring position
    Barrier { ring_index: u64 },
}

/// One decrement for the completion engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecrementRequest {
    pub owner: DecrementOwner,
    pub signal: SignalHandle,
    pub pasid: u32,
}
