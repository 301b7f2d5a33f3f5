//! The packet processor
//!
//! [`Processor`] owns the platform and all scheduling state. One call to
//! [`Processor::run_once`] is one iteration of the firmware main loop:
//!
//! ```text
//! service interrupts
//! service_queue          take at most one ring entry
//! service interrupts
//! drain_dma_queue        each drain starts at most one job, and only
//! drain_launch_queue     when its resource is idle
//! drain_decrement_queue
//! service interrupts
//! ```
//!
//! Interrupt handlers only enqueue work; only the drains program hardware.
//! Every mutation of the queues or the dispatch table happens with
//! interrupts masked.

mod drain;
mod ingest;
mod irq;

use aqlpp_core::error::{PpError, Result};
use aqlpp_core::hw::{IrqGuard, Platform, YieldPoint};
use aqlpp_core::kprint::{self, LogLevel};
use aqlpp_core::layout::{regs, DEVICE_MEMORY_BASE};
use aqlpp_core::slot::SlotId;
use aqlpp_core::work_queue::WorkQueue;
use aqlpp_core::{kdebug, kinfo};

use crate::config::ProcessorConfig;
use crate::cores::CoreAllocator;
use crate::dispatch::{DispatchTable, StagingArena};
use crate::request::{DecrementOwner, DecrementRequest, DmaRequest, LaunchRequest};
use crate::stage::{RequestStage, StageHistory};
use crate::stats::ProcessorStats;

/// Scheduling state, everything except the platform.
///
/// Kept apart from the platform so a critical section can hold
/// `&P` for its guard while handlers mutate the state.
pub(crate) struct DispatchState {
    config: ProcessorConfig,
    table: DispatchTable,
    cores: CoreAllocator,
    dma_queue: WorkQueue<DmaRequest>,
    launch_queue: WorkQueue<LaunchRequest>,
    decrement_queue: WorkQueue<DecrementRequest>,
    /// Request the DMA engine is working for
    dma_owner: Option<SlotId>,
    /// Owner of the decrement the completion engine is working on
    completion_owner: Option<DecrementOwner>,
    /// Local ring counter; catches up with the host write index
    packet_number: u64,
    stats: ProcessorStats,
}

pub struct Processor<P: Platform> {
    platform: P,
    state: DispatchState,
}

impl<P: Platform> Processor<P> {
    /// Validate `config` against the platform and set up an idle processor.
    /// The ring counter starts at the platform's current read index.
    pub fn new(platform: P, config: ProcessorConfig) -> Result<Self> {
        config.validate()?;
        if platform.queue_length() != config.queue_length {
            return Err(PpError::Config("platform queue length differs from config"));
        }
        if config.debug_logging && kprint::log_level() < LogLevel::Debug {
            kprint::set_log_level(LogLevel::Debug);
        }

        let layout = platform.device_layout();
        let arena = StagingArena::new(
            DEVICE_MEMORY_BASE + layout.free_memory(),
            config.dispatch_window,
            config.image_stage_bytes,
        );
        let packet_number = platform.read_index()?;

        kinfo!(
            "processor up: window={} cores={} queue={} staging={:#x}+{:#x}",
            config.dispatch_window,
            config.available_cores,
            config.queue_length,
            DEVICE_MEMORY_BASE + layout.free_memory(),
            arena.size()
        );

        let state = DispatchState {
            table: DispatchTable::new(config.dispatch_window, arena),
            cores: CoreAllocator::new(config.available_cores),
            dma_queue: WorkQueue::new("dma", config.dispatch_window),
            launch_queue: WorkQueue::new("launch", config.dispatch_window),
            decrement_queue: WorkQueue::new("decrement", config.decrement_queue_capacity()),
            dma_owner: None,
            completion_owner: None,
            packet_number,
            stats: ProcessorStats::default(),
            config,
        };

        Ok(Self { platform, state })
    }

    /// Run `f` with interrupts masked
    fn critical<R>(&mut self, f: impl FnOnce(&P, &mut DispatchState) -> R) -> R {
        let Self { platform, state } = self;
        let _guard = IrqGuard::new(&*platform);
        f(&*platform, state)
    }

    /// One main-loop iteration. Returns whether anything happened.
    pub fn run_once(&mut self) -> Result<bool> {
        let mut progress = self.service_interrupts()? > 0;
        progress |= self.service_queue()?;
        progress |= self.service_interrupts()? > 0;
        progress |= self.drain_all()?;
        progress |= self.service_interrupts()? > 0;
        Ok(progress)
    }

    /// Main loop. Returns when the host writes a non-zero value to
    /// `CPU_HALT`, or on the first fatal error.
    pub fn run(&mut self) -> Result<()> {
        let mut spins = 0;
        while self.platform.read64(regs::CPU_HALT) == 0 {
            self.run_once()?;
            self.platform.yield_now(YieldPoint::MainLoop, spins);
            spins = spins.wrapping_add(1);
        }
        kinfo!("halt requested");
        self.state.stats.log();
        Ok(())
    }

    /// Iterate until the ring is consumed and every request has retired.
    /// Returns the number of iterations taken.
    pub fn run_until_quiescent(&mut self, max_iterations: usize) -> Result<usize> {
        for i in 0..max_iterations {
            self.run_once()?;
            if self.is_quiescent() {
                kdebug!("quiescent after {} iterations", i + 1);
                return Ok(i + 1);
            }
            self.platform.yield_now(YieldPoint::MainLoop, i);
        }
        Err(PpError::Stalled(max_iterations))
    }

    /// Nothing left to ingest, nothing queued, nothing in flight
    pub fn is_quiescent(&self) -> bool {
        let s = &self.state;
        self.platform.read64(regs::AQL_LEFT) == 0
            && s.table.live() == 0
            && s.dma_queue.is_empty()
            && s.launch_queue.is_empty()
            && s.decrement_queue.is_empty()
            && s.dma_owner.is_none()
            && s.completion_owner.is_none()
            && s.cores.busy_count() == 0
    }

    /// Interrupts and drains only; used while a spin wait blocks ingest
    fn service_pending(&mut self) -> Result<()> {
        self.service_interrupts()?;
        self.drain_all()?;
        Ok(())
    }

    fn drain_all(&mut self) -> Result<bool> {
        let mut progress = self.drain_dma_queue()?;
        progress |= self.drain_launch_queue()?;
        progress |= self.drain_decrement_queue()?;
        Ok(progress)
    }

    // Inspection

    #[inline]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    #[inline]
    pub fn config(&self) -> &ProcessorConfig {
        &self.state.config
    }

    #[inline]
    pub fn stats(&self) -> &ProcessorStats {
        &self.state.stats
    }

    #[inline]
    pub fn live_requests(&self) -> usize {
        self.state.table.live()
    }

    pub fn stage_of(&self, slot: SlotId) -> Option<RequestStage> {
        self.state.table.stage_of(slot)
    }

    pub fn history(&self, slot: SlotId) -> Option<StageHistory> {
        self.state.table.history(slot)
    }

    /// Live slots and their stages
    pub fn live_stages(&self) -> Vec<(SlotId, RequestStage)> {
        self.state.table.iter().map(|(slot, r)| (slot, r.stage)).collect()
    }

    /// Slots currently on the free list, sorted
    pub fn free_slots(&self) -> Vec<SlotId> {
        self.state.table.free_list().free_ids()
    }

    /// Entries waiting in the DMA, launch and decrement queues
    pub fn queue_depths(&self) -> (usize, usize, usize) {
        let s = &self.state;
        (s.dma_queue.len(), s.launch_queue.len(), s.decrement_queue.len())
    }

    #[inline]
    pub fn packet_number(&self) -> u64 {
        self.state.packet_number
    }

    pub fn busy_cores(&self) -> usize {
        self.state.cores.busy_count()
    }

    pub fn staging_arena(&self) -> &StagingArena {
        self.state.table.arena()
    }

    /// Give the platform back
    pub fn into_platform(self) -> P {
        self.platform
    }
}
