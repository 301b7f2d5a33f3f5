//! # aqlpp-engine
//!
//! The dispatch engine of the AQL packet processor. It pulls entries off
//! the host's packet ring, walks each kernel dispatch through
//!
//! ```text
//! fetch arguments -> fetch image -> compute -> store image -> signal completion
//! ```
//!
//! and fans the work out to the DMA engine, the compute cores and the
//! completion engine through three decoupled FIFO work queues.
//!
//! The hardware is reached only through the traits in `aqlpp_core::hw`;
//! `aqlpp-sim` provides a host-side implementation.
//!
//! ```rust,ignore
//! use aqlpp_engine::{Processor, ProcessorConfig};
//!
//! let config = ProcessorConfig::from_env();
//! let mut processor = Processor::new(platform, config)?;
//! processor.run()?;
//! ```

pub mod config;
pub mod cores;
pub mod dispatch;
pub mod mask;
pub mod processor;
pub mod request;
pub mod stage;
pub mod stats;

pub use config::{ConfigError, ProcessorConfig};
pub use cores::{CoreAllocator, CoreSlot};
pub use dispatch::{DispatchTable, RequestRecord, StagingArena};
pub use processor::Processor;
pub use request::{DecrementOwner, DecrementRequest, DmaRequest, LaunchRequest};
pub use stage::{RequestStage, StageHistory};
pub use stats::ProcessorStats;
