//! Library defaults, overridable through `AQLPP_*` environment variables

/// Maximum requests in flight; power of two
pub const DISPATCH_WINDOW: usize = 8;

/// Compute cores wired to the processor
pub const AVAILABLE_CORES: usize = 1;

/// Packet ring entries; power of two
pub const QUEUE_LENGTH: usize = 128;

/// Per-slot image staging buffer. Holds a 1920x1080 Gray16 frame
/// (4_147_200 bytes) or a 1024x1024 Rgb8 one; a 1080p Rgb8 frame needs
/// 6_220_800 and stops the processor with `StagingOverflow`. Raise it
/// through `AQLPP_IMAGE_STAGE_BYTES` for larger images. Device memory grows
/// by `dispatch_window` times this value.
pub const IMAGE_STAGE_BYTES: u64 = 4 * 1024 * 1024;

pub const DEBUG_LOGGING: bool = false;

/// Hard upper bound on `available_cores`
pub const MAX_CORES: usize = 64;
