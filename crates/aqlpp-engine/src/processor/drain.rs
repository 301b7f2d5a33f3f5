//! Work queue drains
//!
//! Each drain looks at the head of one queue and, if the resource behind it
//! is idle, programs the resource and rings its doorbell. One job per call.

use aqlpp_core::error::Result;
use aqlpp_core::hw::{Doorbell, Platform};
use aqlpp_core::layout::{core_regs, regs};
use aqlpp_core::ktrace;

use super::{DispatchState, Processor};
use crate::mask::write_mask;

impl<P: Platform> Processor<P> {
    /// Start the next DMA transfer if the engine is idle
    pub fn drain_dma_queue(&mut self) -> Result<bool> {
        self.critical(|hw, st| st.start_dma(hw))
    }

    /// Start the next launch on the first idle core. With every core busy
    /// the head stays queued.
    pub fn drain_launch_queue(&mut self) -> Result<bool> {
        self.critical(|hw, st| st.start_launch(hw))
    }

    /// Start the next signal decrement if the completion engine is idle
    pub fn drain_decrement_queue(&mut self) -> Result<bool> {
        self.critical(|hw, st| st.start_decrement(hw))
    }
}

impl DispatchState {
    fn start_dma<P: Platform>(&mut self, hw: &P) -> Result<bool> {
        if self.dma_owner.is_some() {
            return Ok(false);
        }
        let Some(req) = self.dma_queue.pop() else {
            return Ok(false);
        };

        hw.write64(regs::DMA_HOST_ADDR, req.host_address);
        hw.write64(regs::DMA_DEVICE_ADDR, req.device_address);
        hw.write64(regs::DMA_PAYLOAD_SIZE, req.payload_size);
        hw.write32(regs::DMA_LDST, req.direction as u32);
        hw.write32(regs::DMA_PASID, req.pasid);
        self.dma_owner = Some(req.slot);
        self.stats.dma_transfers += 1;

        ktrace!(
            "dma {:?} for {}: host={:#x} device={:#x} bytes={}",
            req.direction,
            req.slot,
            req.host_address,
            req.device_address,
            req.payload_size
        );
        hw.ring_doorbell(Doorbell::DmaEngine.encode(self.cores.len()));
        Ok(true)
    }

    fn start_launch<P: Platform>(&mut self, hw: &P) -> Result<bool> {
        if self.launch_queue.is_empty() {
            return Ok(false);
        }
        let Some(core) = self.cores.find_idle() else {
            return Ok(false);
        };
        let Some(req) = self.launch_queue.pop() else {
            return Ok(false);
        };

        let reg = |r| core_regs::offset(core, r);
        hw.write16(reg(core_regs::TASK), req.operation.code());
        hw.write16(reg(core_regs::NORMALIZATION), req.normalization);
        hw.write16(reg(core_regs::THRESHOLD), req.threshold);
        hw.write8(reg(core_regs::COLOR_MODEL), req.color_model.raw());
        hw.write8(reg(core_regs::BORDER_HANDLING), req.border_handling.raw());
        hw.write32(reg(core_regs::WIDTH), req.width);
        hw.write32(reg(core_regs::HEIGHT), req.height);
        hw.write64(reg(core_regs::SRC_ADDR), req.src_address);
        hw.write64(reg(core_regs::DST_ADDR), req.dst_address);
        write_mask(hw, core, req.operation, req.custom_mask.as_ref())?;

        self.cores.assign(core, req.slot)?;
        self.stats.launches += 1;
        ktrace!("launch {:?} for {} on core {}", req.operation, req.slot, core);
        hw.ring_doorbell(Doorbell::Core(core).encode(self.cores.len()));
        Ok(true)
    }

    fn start_decrement<P: Platform>(&mut self, hw: &P) -> Result<bool> {
        if self.completion_owner.is_some() {
            return Ok(false);
        }
        let Some(req) = self.decrement_queue.pop() else {
            return Ok(false);
        };

        hw.write64(regs::CMPL_SIG, req.signal.0);
        hw.write32(regs::CMPL_SIG_PASID, req.pasid);
        self.completion_owner = Some(req.owner);
        self.stats.decrements += 1;

        ktrace!("decrement {:#x} for {:?}", req.signal.0, req.owner);
        hw.ring_doorbell(Doorbell::CompletionEngine.encode(self.cores.len()));
        Ok(true)
    }
}
