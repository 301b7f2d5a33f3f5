//! Shared fixtures for processor-on-simulator tests

#![allow(dead_code)]

use aqlpp_core::error::Result;
use aqlpp_core::kernarg::{CustomMask, KernelArgs};
use aqlpp_core::ops::{BorderHandling, ColorModel, Operation};
use aqlpp_core::packet::{
    BarrierPacket, FenceScope, KernelDispatchPacket, PacketHeader, PacketType, SignalHandle,
    BARRIER_DEPENDENCIES,
};
use aqlpp_engine::{Processor, ProcessorConfig};
use aqlpp_sim::{SimConfig, SimPlatform};

pub const PASID: u32 = 7;

/// Per-slot image staging used by the tests; fits 64x64 RGB
pub const STAGE_BYTES: u64 = 16 << 10;

pub fn processor(window: usize, cores: usize, queue_length: usize) -> Processor<SimPlatform> {
    let platform = SimPlatform::new(
        SimConfig::new()
            .queue_length(queue_length)
            .cores(cores)
            .staging_bytes(window * (STAGE_BYTES as usize + 128)),
    )
    .expect("platform");
    let config = ProcessorConfig::new()
        .dispatch_window(window)
        .available_cores(cores)
        .queue_length(queue_length)
        .image_stage_bytes(STAGE_BYTES);
    Processor::new(platform, config).expect("processor")
}

pub fn kernel_header(barrier: bool) -> u16 {
    PacketHeader::new(
        PacketType::KernelDispatch,
        barrier,
        FenceScope::System,
        FenceScope::System,
    )
    .raw()
}

/// A submitted filter invocation and where to find its result
#[derive(Debug, Clone, Copy)]
pub struct Job {
    pub packet_id: u64,
    pub src: u64,
    pub dst: u64,
    pub bytes: usize,
    pub signal: SignalHandle,
}

pub struct JobSpec {
    pub operation: Operation,
    pub width: u32,
    pub height: u32,
    pub color_model: ColorModel,
    pub signal: Option<i64>,
    pub barrier: bool,
    pub custom: Option<(Vec<i32>, u16)>,
    pub threshold: u16,
}

impl JobSpec {
    pub fn new(operation: Operation, width: u32, height: u32) -> Self {
        Self {
            operation,
            width,
            height,
            color_model: ColorModel::Gray16,
            signal: Some(1),
            barrier: false,
            custom: None,
            threshold: 12,
        }
    }

    pub fn color_model(mut self, model: ColorModel) -> Self {
        self.color_model = model;
        self
    }

    pub fn no_signal(mut self) -> Self {
        self.signal = None;
        self
    }

    pub fn barrier(mut self) -> Self {
        self.barrier = true;
        self
    }

    pub fn threshold(mut self, threshold: u16) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn custom(mut self, coefficients: &[i32], normalization: u16) -> Self {
        self.custom = Some((coefficients.to_vec(), normalization));
        self
    }

    /// Stage the source image and argument blob in host memory and publish
    /// the dispatch packet
    pub fn submit(&self, platform: &SimPlatform) -> Result<Job> {
        let bytes = self.width as usize * self.height as usize
            * self.color_model.bytes_per_pixel() as usize;
        let image: Vec<u8> = (0..bytes).map(|i| (i * 7 + 3) as u8).collect();
        let src = platform.alloc_host(&image)?;
        let dst = platform.alloc_host(&vec![0u8; bytes.max(1)])?;

        let (custom_mask, normalization) = match &self.custom {
            Some((coefficients, norm)) => (Some(CustomMask::new(coefficients)), *norm),
            None => (None, 0),
        };
        let args = KernelArgs {
            src_address: src,
            dst_address: dst,
            color_model: self.color_model,
            border_handling: BorderHandling::ClampToEdge,
            threshold: self.threshold,
            normalization,
            custom_mask,
        };
        let kernarg_address = platform.alloc_host(&args.encode())?;

        let signal = match self.signal {
            Some(initial) => platform.alloc_signal(initial)?,
            None => SignalHandle::NULL,
        };
        let packet = KernelDispatchPacket {
            header: kernel_header(self.barrier),
            setup: 2,
            grid_size: [self.width, self.height, 1],
            kernel_object: self.operation.code() as u64,
            kernarg_address,
            completion_signal: signal,
            ..Default::default()
        };
        let packet_id = platform.submit_kernel(&packet, PASID)?;
        Ok(Job {
            packet_id,
            src,
            dst,
            bytes,
            signal,
        })
    }
}

pub fn barrier_packet(
    kind: PacketType,
    deps: [SignalHandle; BARRIER_DEPENDENCIES],
    completion: SignalHandle,
) -> BarrierPacket {
    BarrierPacket {
        header: PacketHeader::new(kind, false, FenceScope::System, FenceScope::System).raw(),
        dep_signals: deps,
        completion_signal: completion,
    }
}

/// Deterministic xorshift for randomized schedules
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    pub fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}
