//! # aqlpp-sim
//!
//! A host-side stand-in for the packet processor's hardware: device memory
//! holding the packet ring and staging buffers, the config-space register
//! file, host memory with completion signals, and DMA, completion and
//! compute engines that finish as soon as their doorbell rings.
//!
//! ```rust,ignore
//! use aqlpp_engine::{Processor, ProcessorConfig};
//! use aqlpp_sim::{SimConfig, SimPlatform};
//!
//! let platform = SimPlatform::new(SimConfig::new().cores(2))?;
//! platform.submit_kernel(&packet, pasid)?;
//! let mut processor = Processor::new(platform, ProcessorConfig::new())?;
//! processor.run_until_quiescent(1000)?;
//! ```

pub mod host;
pub mod platform;
pub mod region;

pub use host::{HostMemory, HOST_BASE};
pub use platform::{
    HwEvent, InterruptLine, LaunchRecord, SimConfig, SimPlatform, SimState, YieldHook,
};
pub use region::MmapRegion;
