//! Request pipeline stages

use core::fmt;

/// Position of a request in the pipeline.
///
/// ```text
/// FetchingArguments -> FetchingImage -> Computing -> StoringImage
///     -> SignalingCompletion -> Retired
///                 (skipped when the packet has no completion signal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum RequestStage {
    /// Argument blob DMA queued or in flight
    FetchingArguments = 0,
    /// Source image DMA queued or in flight
    FetchingImage = 1,
    /// Launch queued or running on a core
    Computing = 2,
    /// Result DMA queued or in flight
    StoringImage = 3,
    /// Completion signal decrement queued or in flight
    SignalingCompletion = 4,
    /// Slot returned to the free list
    Retired = 5,
}

/// The full pipeline in order
pub const PIPELINE: [RequestStage; 6] = [
    RequestStage::FetchingArguments,
    RequestStage::FetchingImage,
    RequestStage::Computing,
    RequestStage::StoringImage,
    RequestStage::SignalingCompletion,
    RequestStage::Retired,
];

impl RequestStage {
    pub const fn name(self) -> &'static str {
        match self {
            RequestStage::FetchingArguments => "FetchingArguments",
            RequestStage::FetchingImage => "FetchingImage",
            RequestStage::Computing => "Computing",
            RequestStage::StoringImage => "StoringImage",
            RequestStage::SignalingCompletion => "SignalingCompletion",
            RequestStage::Retired => "Retired",
        }
    }

    /// Stage that follows this one. `None` once retired.
    pub const fn next(self, has_completion_signal: bool) -> Option<RequestStage> {
        match self {
            RequestStage::FetchingArguments => Some(RequestStage::FetchingImage),
            RequestStage::FetchingImage => Some(RequestStage::Computing),
            RequestStage::Computing => Some(RequestStage::StoringImage),
            RequestStage::StoringImage if has_completion_signal => {
                Some(RequestStage::SignalingCompletion)
            }
            RequestStage::StoringImage => Some(RequestStage::Retired),
            RequestStage::SignalingCompletion => Some(RequestStage::Retired),
            RequestStage::Retired => None,
        }
    }

    #[inline]
    pub const fn is_retired(self) -> bool {
        matches!(self, RequestStage::Retired)
    }
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stages a request has passed through, oldest first. Fixed size; the
/// pipeline has at most six positions.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct StageHistory {
    stages: [RequestStage; PIPELINE.len()],
    len: u8,
}

impl StageHistory {
    pub const fn new() -> Self {
        Self {
            stages: [RequestStage::FetchingArguments; PIPELINE.len()],
            len: 0,
        }
    }

    /// Record `stage`; ignored once the history is full
    pub fn push(&mut self, stage: RequestStage) {
        if (self.len as usize) < self.stages.len() {
            self.stages[self.len as usize] = stage;
            self.len += 1;
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[RequestStage] {
        &self.stages[..self.len as usize]
    }

    #[inline]
    pub fn last(&self) -> Option<RequestStage> {
        self.as_slice().last().copied()
    }

    /// True when the recorded stages follow the pipeline order, with only
    /// `SignalingCompletion` allowed to be missing
    pub fn is_pipeline_prefix(&self) -> bool {
        let mut expected = PIPELINE.iter().copied().peekable();
        for &stage in self.as_slice() {
            if expected.peek() == Some(&RequestStage::SignalingCompletion)
                && stage == RequestStage::Retired
            {
                expected.next();
            }
            if expected.next() != Some(stage) {
                return false;
            }
        }
        true
    }
}

impl Default for StageHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StageHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}
