//! Dispatch table
//!
//! One record per in-flight kernel dispatch, indexed by slot. Slots come
//! from a [`FreeList`] sized to the dispatch window, so the number of live
//! records can never exceed it.
//!
//! Staging memory is carved out of device memory per slot by the
//! [`StagingArena`]; nothing is allocated or freed at run time.
//!
//! ```text
//! arena base
//! +--------------------+--------------------+-----+
//! | kernarg slot 0     | kernarg slot 1     | ... |   KERNARG_STRIDE each
//! +--------------------+--------------------+-----+
//! | image slot 0                            | ... |   image_stage_bytes each
//! +-----------------------------------------+-----+
//! ```

use aqlpp_core::error::{PpError, Result};
use aqlpp_core::free_list::FreeList;
use aqlpp_core::kernarg::{KernelArgs, MAX_SIZE as KERNARG_MAX_SIZE};
use aqlpp_core::ops::Operation;
use aqlpp_core::packet::KernelDispatchPacket;
use aqlpp_core::slot::SlotId;
use aqlpp_core::ktrace;

use crate::stage::{RequestStage, StageHistory};

/// Bytes reserved per slot for the argument blob
pub const KERNARG_STRIDE: u64 = 128;

const _: () = assert!(KERNARG_MAX_SIZE as u64 <= KERNARG_STRIDE);

/// Per-slot staging buffers in device memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingArena {
    base: u64,
    slots: usize,
    image_stride: u64,
}

impl StagingArena {
    /// `base` is an absolute device address. Image buffers are rounded up
    /// to 64-byte multiples.
    pub fn new(base: u64, slots: usize, image_stage_bytes: u64) -> Self {
        Self {
            base,
            slots,
            image_stride: (image_stage_bytes + 63) & !63,
        }
    }

    #[inline]
    pub fn kernarg_address(&self, slot: SlotId) -> u64 {
        self.base + slot.as_usize() as u64 * KERNARG_STRIDE
    }

    #[inline]
    pub fn image_address(&self, slot: SlotId) -> u64 {
        self.images_base() + slot.as_usize() as u64 * self.image_stride
    }

    /// Largest image a slot can stage
    #[inline]
    pub fn image_capacity(&self) -> u64 {
        self.image_stride
    }

    /// Bytes of device memory the arena spans
    pub fn size(&self) -> u64 {
        self.images_base() + self.slots as u64 * self.image_stride - self.base
    }

    #[inline]
    fn images_base(&self) -> u64 {
        self.base + self.slots as u64 * KERNARG_STRIDE
    }
}

/// State of one in-flight kernel dispatch
#[derive(Debug, Clone, Copy)]
pub struct RequestRecord {
    /// Position of the entry in the packet ring
    pub ring_index: u64,
    pub packet: KernelDispatchPacket,
    pub operation: Operation,
    pub stage: RequestStage,
    pub pasid: u32,
    /// Staging buffer for the argument blob (device address)
    pub kernarg_address: u64,
    /// Staging buffer for the image (device address)
    pub image_address: u64,
    /// Parsed once the argument DMA completes
    pub args: Option<KernelArgs>,
    pub history: StageHistory,
}

impl RequestRecord {
    #[inline]
    pub fn has_completion_signal(&self) -> bool {
        !self.packet.completion_signal.is_null()
    }
}

pub struct DispatchTable {
    records: Vec<Option<RequestRecord>>,
    free: FreeList,
    /// History of the last record to occupy each slot
    retired: Vec<StageHistory>,
    arena: StagingArena,
}

impl DispatchTable {
    pub fn new(window: usize, arena: StagingArena) -> Self {
        Self {
            records: vec![None; window],
            free: FreeList::new(window),
            retired: vec![StageHistory::new(); window],
            arena,
        }
    }

    #[inline]
    pub fn has_free_slot(&self) -> bool {
        !self.free.is_exhausted()
    }

    #[inline]
    pub fn live(&self) -> usize {
        self.free.in_use()
    }

    #[inline]
    pub fn window(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn arena(&self) -> &StagingArena {
        &self.arena
    }

    #[inline]
    pub fn free_list(&self) -> &FreeList {
        &self.free
    }

    /// Allocate a slot for a new kernel dispatch, starting in
    /// `FetchingArguments`. `None` when the window is full.
    pub fn accept(
        &mut self,
        ring_index: u64,
        packet: KernelDispatchPacket,
        pasid: u32,
    ) -> Option<SlotId> {
        let slot = self.free.allocate()?;
        let mut history = StageHistory::new();
        history.push(RequestStage::FetchingArguments);
        self.records[slot.as_usize()] = Some(RequestRecord {
            ring_index,
            packet,
            operation: Operation::from_code(packet.kernel_object),
            stage: RequestStage::FetchingArguments,
            pasid,
            kernarg_address: self.arena.kernarg_address(slot),
            image_address: self.arena.image_address(slot),
            args: None,
            history,
        });
        Some(slot)
    }

    pub fn get(&self, slot: SlotId) -> Result<&RequestRecord> {
        self.records
            .get(slot.as_usize())
            .and_then(Option::as_ref)
            .ok_or(PpError::InvalidSlot(slot.as_u32()))
    }

    pub fn get_mut(&mut self, slot: SlotId) -> Result<&mut RequestRecord> {
        self.records
            .get_mut(slot.as_usize())
            .and_then(Option::as_mut)
            .ok_or(PpError::InvalidSlot(slot.as_u32()))
    }

    /// Current stage of a live request
    pub fn stage_of(&self, slot: SlotId) -> Option<RequestStage> {
        self.get(slot).ok().map(|r| r.stage)
    }

    /// Stage history of the live request in `slot`, or of the last request
    /// that retired from it
    pub fn history(&self, slot: SlotId) -> Option<StageHistory> {
        match self.get(slot) {
            Ok(record) => Some(record.history),
            Err(_) => self.retired.get(slot.as_usize()).copied(),
        }
    }

    /// Move a request one step forward. Anything but the successor of the
    /// current stage is rejected.
    pub fn advance(&mut self, slot: SlotId, to: RequestStage) -> Result<()> {
        let record = self.get_mut(slot)?;
        if record.stage.next(record.has_completion_signal()) != Some(to) {
            return Err(PpError::InvalidTransition {
                slot: slot.as_u32(),
                from: record.stage.name(),
                to: to.name(),
            });
        }
        ktrace!("{}: {} -> {}", slot, record.stage, to);
        record.stage = to;
        record.history.push(to);
        Ok(())
    }

    /// Advance to `Retired`, drop the record and free the slot
    pub fn retire(&mut self, slot: SlotId) -> Result<RequestRecord> {
        self.advance(slot, RequestStage::Retired)?;
        let record = self.records[slot.as_usize()]
            .take()
            .ok_or(PpError::InvalidSlot(slot.as_u32()))?;
        self.retired[slot.as_usize()] = record.history;
        self.free.release(slot)?;
        Ok(record)
    }

    /// Live records, in slot order
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &RequestRecord)> {
        self.records
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().map(|r| (SlotId::new(i as u32), r)))
    }
}
