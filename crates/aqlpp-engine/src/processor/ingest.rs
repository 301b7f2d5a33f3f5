//! Queue ingest
//!
//! Takes at most one ring entry per call. Kernel dispatches open a request
//! and queue the argument fetch; barrier entries are resolved on the spot,
//! blocking ingest until their dependencies are met. Entries with no work
//! only advance the packet counter; their header and `READ_INDEX` stay as
//! the host left them.

use aqlpp_core::error::Result;
use aqlpp_core::hw::{Platform, YieldPoint};
use aqlpp_core::kernarg;
use aqlpp_core::layout::regs;
use aqlpp_core::ops::{DmaDirection, Operation};
use aqlpp_core::packet::{BarrierPacket, KernelDispatchPacket, Packet, PacketHeader};
use aqlpp_core::{kdebug, ktrace, kwarn};

use super::{DispatchState, Processor};
use crate::request::{DecrementOwner, DecrementRequest, DmaRequest};

/// How a barrier combines its dependency signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BarrierMode {
    /// Every non-null dependency must be set
    All,
    /// One set dependency is enough
    Any,
}

impl<P: Platform> Processor<P> {
    /// Consume the next ring entry if the host has published one and the
    /// dispatch window has room. Returns whether an entry was consumed.
    pub fn service_queue(&mut self) -> Result<bool> {
        if self.platform.read64(regs::AQL_LEFT) == 0 || !self.state.table.has_free_slot() {
            return Ok(false);
        }

        let ring_index = self.state.ring_index();
        let raw = self.platform.read_packet(ring_index)?;
        let header = raw.header();
        let packet = raw.decode();

        match packet {
            Packet::Invalid => return Ok(false),
            Packet::BarrierAnd(bp) | Packet::BarrierOr(bp)
                if !bp.completion_signal.is_null()
                    && self.state.decrement_queue.len() >= self.state.config.dispatch_window =>
            {
                ktrace!("ring[{}]: barrier deferred, decrement queue full", ring_index);
                return Ok(false);
            }
            _ => {}
        }

        if header.barrier() {
            self.wait_for_prior_entries()?;
        }

        match packet {
            Packet::Invalid => return Ok(false),
            Packet::KernelDispatch(kp) => {
                let pasid = self.platform.pasid(ring_index)?;
                self.critical(|_, st| st.accept_kernel(ring_index, kp, pasid))?;
            }
            Packet::BarrierAnd(bp) => self.resolve_barrier(ring_index, bp, BarrierMode::All)?,
            Packet::BarrierOr(bp) => self.resolve_barrier(ring_index, bp, BarrierMode::Any)?,
            Packet::VendorSpecific(_) | Packet::AgentDispatch(_) => {
                kdebug!("ring[{}]: type {} acknowledged", ring_index, header.type_code());
                self.state.stats.packets_dropped += 1;
            }
            Packet::Unknown(code) => {
                kwarn!("ring[{}]: unknown packet type {}, dropped", ring_index, code);
                self.state.stats.packets_dropped += 1;
            }
        }

        self.state.packet_number += 1;
        self.state.stats.packets_processed += 1;
        if self.state.packet_number == self.platform.write_index()? {
            // ring drained: the host sets AQL_LEFT again on its next submit
            self.platform.write64(regs::AQL_LEFT, 0);
        }
        Ok(true)
    }

    /// Barrier bit: every earlier entry has to retire first
    fn wait_for_prior_entries(&mut self) -> Result<()> {
        let mut spins = 0;
        while self.state.packet_number != self.platform.read_index()? {
            self.platform.yield_now(YieldPoint::AcquireBarrier, spins);
            spins += 1;
            self.service_pending()?;
        }
        if spins > 0 {
            ktrace!("acquire barrier released after {} spins", spins);
        }
        Ok(())
    }

    fn resolve_barrier(&mut self, ring_index: u64, bp: BarrierPacket, mode: BarrierMode) -> Result<()> {
        let mut spins = 0;
        while !self.dependencies_met(&bp, mode)? {
            self.platform.yield_now(YieldPoint::DependencyWait, spins);
            spins += 1;
            self.service_pending()?;
        }
        let pasid = self.platform.pasid(ring_index)?;
        kdebug!("ring[{}]: barrier {:?} released after {} spins", ring_index, mode, spins);
        self.critical(|hw, st| st.release_barrier(hw, ring_index, &bp, pasid))
    }

    /// A dependency is set once its signal value reaches 0. A barrier with
    /// no dependencies is released immediately in either mode.
    fn dependencies_met(&self, bp: &BarrierPacket, mode: BarrierMode) -> Result<bool> {
        let mut any_active = false;
        for dep in bp.active_dependencies() {
            any_active = true;
            let set = self.platform.load_signal(dep)? == 0;
            match mode {
                BarrierMode::All if !set => return Ok(false),
                BarrierMode::Any if set => return Ok(true),
                _ => {}
            }
        }
        Ok(mode == BarrierMode::All || !any_active)
    }
}

impl DispatchState {
    #[inline]
    pub(super) fn ring_index(&self) -> u64 {
        self.packet_number & (self.config.queue_length as u64 - 1)
    }

    /// Open a request for a kernel dispatch and queue its argument fetch
    fn accept_kernel(&mut self, ring_index: u64, kp: KernelDispatchPacket, pasid: u32) -> Result<()> {
        let Some(slot) = self.table.accept(ring_index, kp, pasid) else {
            // checked by the caller before reading the entry
            return Ok(());
        };
        let record = self.table.get(slot)?;
        if let Operation::Other(code) = record.operation {
            kwarn!("{}: unknown operation {:#x}, forwarded unchanged", slot, code);
        }

        self.dma_queue.push(DmaRequest {
            slot,
            host_address: kp.kernarg_address,
            device_address: record.kernarg_address,
            payload_size: kernarg::blob_size(record.operation) as u64,
            direction: DmaDirection::Load,
            pasid,
        })?;
        self.stats.kernels_accepted += 1;
        kdebug!(
            "ring[{}] -> {}: {:?} {}x{}",
            ring_index,
            slot,
            record.operation,
            kp.width(),
            kp.height()
        );
        Ok(())
    }

    /// Dependencies met: signal completion through the decrement queue, or
    /// retire the entry right away when there is nothing to signal
    fn release_barrier<P: Platform>(
        &mut self,
        hw: &P,
        ring_index: u64,
        bp: &BarrierPacket,
        pasid: u32,
    ) -> Result<()> {
        self.stats.barriers_resolved += 1;
        if bp.completion_signal.is_null() {
            return self.retire_entry(hw, ring_index);
        }
        self.decrement_queue.push(DecrementRequest {
            owner: DecrementOwner::Barrier { ring_index },
            signal: bp.completion_signal,
            pasid,
        })
    }

    /// Hand a ring entry back to the host
    pub(super) fn retire_entry<P: Platform>(&mut self, hw: &P, ring_index: u64) -> Result<()> {
        hw.write_header(ring_index, PacketHeader::INVALID)?;
        let read_index = hw.advance_read_index()?;
        ktrace!("ring[{}] retired, read index {}", ring_index, read_index);
        Ok(())
    }
}
