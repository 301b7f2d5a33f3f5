//! Processor counters

use aqlpp_core::kinfo;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    /// Non-invalid ring entries consumed
    pub packets_processed: u64,
    pub kernels_accepted: u64,
    /// Barrier entries whose dependencies resolved
    pub barriers_resolved: u64,
    /// Vendor-specific, agent-dispatch and unknown entries acknowledged
    pub packets_dropped: u64,
    pub dma_transfers: u64,
    pub launches: u64,
    pub decrements: u64,
    pub requests_retired: u64,
    pub interrupts: u64,
    /// Core added / removed notifications
    pub topology_events: u64,
}

impl ProcessorStats {
    pub fn log(&self) {
        kinfo!(
            "stats: packets={} kernels={} barriers={} dropped={} retired={}",
            self.packets_processed,
            self.kernels_accepted,
            self.barriers_resolved,
            self.packets_dropped,
            self.requests_retired
        );
        kinfo!(
            "stats: dma={} launches={} decrements={} irqs={} topology={}",
            self.dma_transfers,
            self.launches,
            self.decrements,
            self.interrupts,
            self.topology_events
        );
    }
}
