//! Interrupt handlers
//!
//! Each handler runs with interrupts masked, moves exactly one request (or
//! barrier entry) one stage forward, and queues the follow-up work. None of
//! them program the DMA engine, a core or the completion engine; that is
//! left to the drains.

use aqlpp_core::error::{PpError, Result};
use aqlpp_core::hw::{Doorbell, Interrupt, Platform};
use aqlpp_core::kernarg::{self, KernelArgs};
use aqlpp_core::layout::regs;
use aqlpp_core::ops::{ColorModel, DmaDirection};
use aqlpp_core::slot::SlotId;
use aqlpp_core::{kdebug, kinfo, kwarn};

use super::{DispatchState, Processor};
use crate::dispatch::RequestRecord;
use crate::request::{DecrementOwner, DecrementRequest, DmaRequest, LaunchRequest};
use crate::stage::RequestStage;

impl<P: Platform> Processor<P> {
    /// Handle everything the platform has pending. Returns the count.
    pub fn service_interrupts(&mut self) -> Result<usize> {
        let mut handled = 0;
        while let Some(irq) = self.platform.take_interrupt() {
            self.handle_interrupt(irq)?;
            handled += 1;
        }
        Ok(handled)
    }

    pub fn handle_interrupt(&mut self, irq: Interrupt) -> Result<()> {
        self.state.stats.interrupts += 1;
        match irq {
            Interrupt::DmaDone => self.on_dma_done(),
            Interrupt::KernelDone => self.on_kernel_done(),
            Interrupt::CompletionDone => self.on_completion_done(),
            Interrupt::CoreAdded => self.on_core_added(),
            Interrupt::CoreRemoved => self.on_core_removed(),
        }
    }

    /// The DMA engine finished the transfer it was programmed with
    pub fn on_dma_done(&mut self) -> Result<()> {
        self.critical(|hw, st| st.dma_done(hw))
    }

    /// A compute core finished; its index is read from `RCV_INT`
    pub fn on_kernel_done(&mut self) -> Result<()> {
        self.critical(|hw, st| st.kernel_done(hw.read64(regs::RCV_INT)))
    }

    /// The completion engine decremented the programmed signal
    pub fn on_completion_done(&mut self) -> Result<()> {
        self.critical(|hw, st| st.completion_done(hw))
    }

    pub fn on_core_added(&mut self) -> Result<()> {
        self.critical(|hw, st| {
            st.acknowledge_topology(hw, Doorbell::CoreAddedAck);
            Ok(())
        })
    }

    pub fn on_core_removed(&mut self) -> Result<()> {
        self.critical(|hw, st| {
            st.acknowledge_topology(hw, Doorbell::CoreRemovedAck);
            Ok(())
        })
    }
}

impl DispatchState {
    fn dma_done<P: Platform>(&mut self, hw: &P) -> Result<()> {
        let slot = self.dma_owner.take().ok_or(PpError::SpuriousInterrupt("dma"))?;
        let record = *self.table.get(slot)?;
        match record.stage {
            RequestStage::FetchingArguments => self.arguments_fetched(hw, slot, &record),
            RequestStage::FetchingImage => self.image_fetched(slot, &record),
            RequestStage::StoringImage => self.image_stored(hw, slot, &record),
            stage => Err(PpError::InvalidTransition {
                slot: slot.as_u32(),
                from: stage.name(),
                to: "dma completion",
            }),
        }
    }

    /// Blob staged: parse it and fetch the source image
    fn arguments_fetched<P: Platform>(
        &mut self,
        hw: &P,
        slot: SlotId,
        record: &RequestRecord,
    ) -> Result<()> {
        let size = kernarg::blob_size(record.operation);
        let mut blob = [0u8; kernarg::MAX_SIZE];
        hw.read_device(record.kernarg_address, &mut blob[..size])?;
        let args = KernelArgs::parse(record.operation, &blob[..size])?;

        if let ColorModel::Other(raw) = args.color_model {
            kwarn!("{}: unknown colour model {}, image treated as empty", slot, raw);
        }
        let needed = args.image_bytes(record.packet.width(), record.packet.height());
        let available = self.table.arena().image_capacity();
        if needed > available {
            return Err(PpError::StagingOverflow {
                slot: slot.as_u32(),
                needed,
                available,
            });
        }

        self.table.get_mut(slot)?.args = Some(args);
        self.table.advance(slot, RequestStage::FetchingImage)?;
        self.dma_queue.push(DmaRequest {
            slot,
            host_address: args.src_address,
            device_address: record.image_address,
            payload_size: needed,
            direction: DmaDirection::Load,
            pasid: record.pasid,
        })
    }

    /// Image staged: queue the launch, computing in place
    fn image_fetched(&mut self, slot: SlotId, record: &RequestRecord) -> Result<()> {
        let args = staged_args(slot, record)?;
        let normalization = if record.operation.is_custom() {
            args.normalization
        } else {
            record.operation.fixed_normalization()
        };

        self.table.advance(slot, RequestStage::Computing)?;
        self.launch_queue.push(LaunchRequest {
            slot,
            operation: record.operation,
            normalization,
            threshold: args.threshold,
            color_model: args.color_model,
            border_handling: args.border_handling,
            width: record.packet.width(),
            height: record.packet.height(),
            src_address: record.image_address,
            dst_address: record.image_address,
            custom_mask: args.custom_mask,
        })
    }

    /// Result is back in host memory
    fn image_stored<P: Platform>(
        &mut self,
        hw: &P,
        slot: SlotId,
        record: &RequestRecord,
    ) -> Result<()> {
        if !record.has_completion_signal() {
            return self.retire_request(hw, slot);
        }
        self.table.advance(slot, RequestStage::SignalingCompletion)?;
        self.decrement_queue.push(DecrementRequest {
            owner: DecrementOwner::Request(slot),
            signal: record.packet.completion_signal,
            pasid: record.pasid,
        })
    }

    fn kernel_done(&mut self, core: u64) -> Result<()> {
        let index = usize::try_from(core).map_err(|_| PpError::InvalidCore(core))?;
        let slot = self.cores.release(index)?;
        let record = *self.table.get(slot)?;
        let args = staged_args(slot, &record)?;

        self.table.advance(slot, RequestStage::StoringImage)?;
        self.dma_queue.push(DmaRequest {
            slot,
            host_address: args.dst_address,
            device_address: record.image_address,
            payload_size: args.image_bytes(record.packet.width(), record.packet.height()),
            direction: DmaDirection::Store,
            pasid: record.pasid,
        })
    }

    fn completion_done<P: Platform>(&mut self, hw: &P) -> Result<()> {
        match self
            .completion_owner
            .take()
            .ok_or(PpError::SpuriousInterrupt("completion"))?
        {
            DecrementOwner::Request(slot) => self.retire_request(hw, slot),
            DecrementOwner::Barrier { ring_index } => self.retire_entry(hw, ring_index),
        }
    }

    /// Free the slot and hand the ring entry back to the host
    fn retire_request<P: Platform>(&mut self, hw: &P, slot: SlotId) -> Result<()> {
        let record = self.table.retire(slot)?;
        self.retire_entry(hw, record.ring_index)?;
        self.stats.requests_retired += 1;
        kdebug!("{} retired (ring[{}])", slot, record.ring_index);
        Ok(())
    }

    /// Topology changes are forwarded to the host; the allocator keeps its
    /// configured core count
    fn acknowledge_topology<P: Platform>(&mut self, hw: &P, ack: Doorbell) {
        self.stats.topology_events += 1;
        kinfo!("topology event acknowledged: {:?}", ack);
        hw.ring_doorbell(ack.encode(self.cores.len()));
    }
}

fn staged_args(slot: SlotId, record: &RequestRecord) -> Result<KernelArgs> {
    record.args.ok_or(PpError::InvalidTransition {
        slot: slot.as_u32(),
        from: RequestStage::FetchingArguments.name(),
        to: record.stage.name(),
    })
}
