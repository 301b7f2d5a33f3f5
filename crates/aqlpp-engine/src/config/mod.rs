//! Processor configuration
//!
//! Library defaults with environment overrides, then builder setters.
//!
//! ```rust,ignore
//! use aqlpp_engine::config::ProcessorConfig;
//!
//! let config = ProcessorConfig::from_env().available_cores(4);
//! config.validate()?;
//! ```

pub mod defaults;

use aqlpp_core::env::{env_get, env_get_bool, env_get_bytes};
use aqlpp_core::error::PpError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Maximum live requests, and the DMA / launch queue capacity
    pub dispatch_window: usize,
    /// Number of compute cores
    pub available_cores: usize,
    /// Packet ring entries
    pub queue_length: usize,
    /// Bytes of device memory reserved per slot for the image
    pub image_stage_bytes: u64,
    /// Log every request acceptance and retirement at info level
    pub debug_logging: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessorConfig {
    /// Defaults with environment overrides:
    /// - `AQLPP_DISPATCH_WINDOW`
    /// - `AQLPP_AVAILABLE_CORES`
    /// - `AQLPP_QUEUE_LENGTH`
    /// - `AQLPP_IMAGE_STAGE_BYTES` (accepts k/m/g suffixes)
    /// - `AQLPP_DEBUG` (0/1)
    pub fn from_env() -> Self {
        Self {
            dispatch_window: env_get("AQLPP_DISPATCH_WINDOW", defaults::DISPATCH_WINDOW),
            available_cores: env_get("AQLPP_AVAILABLE_CORES", defaults::AVAILABLE_CORES),
            queue_length: env_get("AQLPP_QUEUE_LENGTH", defaults::QUEUE_LENGTH),
            image_stage_bytes: env_get_bytes("AQLPP_IMAGE_STAGE_BYTES", defaults::IMAGE_STAGE_BYTES),
            debug_logging: env_get_bool("AQLPP_DEBUG", defaults::DEBUG_LOGGING),
        }
    }

    /// Library defaults, environment ignored
    pub fn new() -> Self {
        Self {
            dispatch_window: defaults::DISPATCH_WINDOW,
            available_cores: defaults::AVAILABLE_CORES,
            queue_length: defaults::QUEUE_LENGTH,
            image_stage_bytes: defaults::IMAGE_STAGE_BYTES,
            debug_logging: defaults::DEBUG_LOGGING,
        }
    }

    pub fn dispatch_window(mut self, n: usize) -> Self {
        self.dispatch_window = n;
        self
    }

    pub fn available_cores(mut self, n: usize) -> Self {
        self.available_cores = n;
        self
    }

    pub fn queue_length(mut self, n: usize) -> Self {
        self.queue_length = n;
        self
    }

    pub fn image_stage_bytes(mut self, bytes: u64) -> Self {
        self.image_stage_bytes = bytes;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    /// Decrement queue holds up to one entry per live request plus one per
    /// waiting barrier
    #[inline]
    pub fn decrement_queue_capacity(&self) -> usize {
        self.dispatch_window * 2
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.dispatch_window.is_power_of_two() {
            return Err(ConfigError::InvalidValue("dispatch_window must be a power of two"));
        }
        if !self.queue_length.is_power_of_two() {
            return Err(ConfigError::InvalidValue("queue_length must be a power of two"));
        }
        if self.available_cores == 0 {
            return Err(ConfigError::InvalidValue("available_cores must be > 0"));
        }
        if self.available_cores > defaults::MAX_CORES {
            return Err(ConfigError::InvalidValue("available_cores must be <= 64"));
        }
        if self.dispatch_window > self.queue_length {
            return Err(ConfigError::InvalidValue("dispatch_window must be <= queue_length"));
        }
        if self.image_stage_bytes == 0 {
            return Err(ConfigError::InvalidValue("image_stage_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn print(&self) {
        aqlpp_core::kprintln!("AQL packet processor configuration:");
        aqlpp_core::kprintln!("  dispatch_window:    {}", self.dispatch_window);
        aqlpp_core::kprintln!("  available_cores:    {}", self.available_cores);
        aqlpp_core::kprintln!("  queue_length:       {}", self.queue_length);
        aqlpp_core::kprintln!("  image_stage_bytes:  {}", self.image_stage_bytes);
        aqlpp_core::kprintln!("  debug_logging:      {}", self.debug_logging);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for PpError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::InvalidValue(msg) => PpError::Config(msg),
        }
    }
}
