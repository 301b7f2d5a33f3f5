//! AQL Packet Processor End-to-End Smoke Test
//!
//! Drives the dispatch engine over the simulated platform:
//!   Part A: Configuration and platform bring-up
//!   Part B: Kernel dispatch: every built-in filter plus both custom sizes
//!   Part C: Barrier-AND / barrier-OR entries
//!   Part D: Core contention and topology events
//!   Part E: Main loop until CPU_HALT
//!
//! Run: ./target/release/aqlpp-smoke
//! (AQLPP_LOG_LEVEL=debug for per-request logs)

use aqlpp_core::error::Result;
use aqlpp_core::hw::{Interrupt, QueueRing, SignalMemory, YieldPoint};
use aqlpp_core::kernarg::{CustomMask, KernelArgs};
use aqlpp_core::kprint;
use aqlpp_core::ops::{BorderHandling, ColorModel, DmaDirection, Operation};
use aqlpp_core::packet::{
    BarrierPacket, FenceScope, KernelDispatchPacket, PacketHeader, PacketType, SignalHandle,
};
use aqlpp_engine::{Processor, ProcessorConfig};
use aqlpp_sim::{HwEvent, SimConfig, SimPlatform};

const PASID: u32 = 1;
const STAGE_BYTES: u64 = 64 << 10;

// ── Test harness ──

struct TestRunner {
    total: usize,
    passed: usize,
    failed: usize,
}

const LINE: &str = "────────────────────────────────────────────────────────────";

impl TestRunner {
    fn new() -> Self {
        Self { total: 0, passed: 0, failed: 0 }
    }

    fn section(&self, name: &str) {
        println!("\n{}", LINE);
        println!("  {}", name);
        println!("{}", LINE);
    }

    fn pass(&mut self, name: &str) {
        self.total += 1;
        self.passed += 1;
        println!("  [{:2}] {:<52} PASS", self.total, name);
    }

    fn fail(&mut self, name: &str, reason: &str) {
        self.total += 1;
        self.failed += 1;
        println!("  [{:2}] {:<52} FAIL: {}", self.total, name, reason);
    }

    fn check(&mut self, name: &str, ok: bool, reason: &str) {
        if ok { self.pass(name); } else { self.fail(name, reason); }
    }

    fn result<T>(&mut self, name: &str, r: Result<T>) -> Option<T> {
        match r {
            Ok(v) => { self.pass(name); Some(v) }
            Err(e) => { self.fail(name, &e.to_string()); None }
        }
    }

    fn summary(&self) {
        println!("\n{}", LINE);
        println!(
            "  Total: {}  Passed: {}  Failed: {}",
            self.total, self.passed, self.failed
        );
        println!("{}", LINE);
    }
}

fn build(window: usize, cores: usize) -> Result<Processor<SimPlatform>> {
    let platform = SimPlatform::new(
        SimConfig::new()
            .queue_length(64)
            .cores(cores)
            .staging_bytes(window * (STAGE_BYTES as usize + 128))
            .host_bytes(8 << 20),
    )?;
    let config = ProcessorConfig::from_env()
        .dispatch_window(window)
        .available_cores(cores)
        .queue_length(64)
        .image_stage_bytes(STAGE_BYTES);
    Processor::new(platform, config)
}

/// Stage image and blob in host memory, publish the packet. Returns the
/// completion signal.
fn submit(
    hw: &SimPlatform,
    op: Operation,
    width: u32,
    height: u32,
    color_model: ColorModel,
) -> Result<SignalHandle> {
    let bytes = (width as u64 * height as u64 * color_model.bytes_per_pixel()) as usize;
    let image: Vec<u8> = (0..bytes).map(|i| i as u8).collect();
    let custom_mask = op.custom_mask_len().map(|n| {
        let coefficients: Vec<i32> = (0..n as i32).map(|i| i - n as i32 / 2).collect();
        CustomMask::new(&coefficients)
    });
    let args = KernelArgs {
        src_address: hw.alloc_host(&image)?,
        dst_address: hw.alloc_host(&vec![0u8; bytes])?,
        color_model,
        border_handling: BorderHandling::ClampToEdge,
        threshold: 64,
        normalization: if custom_mask.is_some() { 1 } else { 0 },
        custom_mask,
    };
    let signal = hw.alloc_signal(1)?;
    let packet = KernelDispatchPacket {
        header: PacketHeader::new(PacketType::KernelDispatch, false, FenceScope::System, FenceScope::System).raw(),
        setup: 2,
        grid_size: [width, height, 1],
        kernel_object: op.code() as u64,
        kernarg_address: hw.alloc_host(&args.encode())?,
        completion_signal: signal,
        ..Default::default()
    };
    hw.submit_kernel(&packet, PASID)?;
    Ok(signal)
}

// ════════════════════════════════════════════════════════════
// Part A: Configuration
// ════════════════════════════════════════════════════════════

fn test_config(t: &mut TestRunner) {
    t.section("Part A: Configuration and bring-up");

    let config = ProcessorConfig::from_env();
    config.print();
    t.check("config from env validates", config.validate().is_ok(), "validate failed");

    let bad = ProcessorConfig::new().dispatch_window(6);
    t.check("non power-of-two window rejected", bad.validate().is_err(), "accepted");

    let mismatch = SimPlatform::new(SimConfig::new().queue_length(32))
        .and_then(|p| Processor::new(p, ProcessorConfig::new().queue_length(64)));
    t.check("queue length mismatch rejected", mismatch.is_err(), "accepted");

    if let Some(pp) = t.result("processor on simulated platform", build(8, 2)) {
        t.check("ring counter starts at read index", pp.packet_number() == 0,
            &format!("packet_number={}", pp.packet_number()));
        t.check("all slots free", pp.free_slots().len() == 8,
            &format!("{} free", pp.free_slots().len()));
    }
}

// ════════════════════════════════════════════════════════════
// Part B: Kernel dispatch
// ════════════════════════════════════════════════════════════

const OPERATIONS: [Operation; 16] = [
    Operation::SobelX3x3,
    Operation::SobelY3x3,
    Operation::SobelXY3x3,
    Operation::SobelX5x5,
    Operation::SobelY5x5,
    Operation::SobelXY5x5,
    Operation::Gauss3x3,
    Operation::Gauss5x5,
    Operation::MinFilter3x3,
    Operation::MinFilter5x5,
    Operation::MaxFilter3x3,
    Operation::MaxFilter5x5,
    Operation::MedianFilter3x3,
    Operation::MedianFilter5x5,
    Operation::CustomFilter3x3,
    Operation::CustomFilter5x5,
];

fn test_dispatch(t: &mut TestRunner) {
    t.section("Part B: Kernel dispatch");

    let Some(mut pp) = t.result("build processor (window 8, 2 cores)", build(8, 2)) else {
        return;
    };

    let mut signals = Vec::new();
    for (i, op) in OPERATIONS.iter().enumerate() {
        let model = if i % 2 == 0 { ColorModel::Gray16 } else { ColorModel::Rgb8 };
        match submit(pp.platform(), *op, 32, 24, model) {
            Ok(s) => signals.push(s),
            Err(e) => t.fail(&format!("submit {:?}", op), &e.to_string()),
        }
    }
    t.check("16 packets published", signals.len() == 16, &format!("{}", signals.len()));

    if let Some(iters) = t.result("run until quiescent", pp.run_until_quiescent(2000)) {
        println!("       {} iterations", iters);
    }

    let hw = pp.platform();
    let n = signals.len();
    t.check(&format!("{} argument + image loads", 2 * n), hw.dma_count(DmaDirection::Load) == 2 * n,
        &format!("{}", hw.dma_count(DmaDirection::Load)));
    t.check(&format!("{} image stores", n), hw.dma_count(DmaDirection::Store) == n,
        &format!("{}", hw.dma_count(DmaDirection::Store)));
    t.check(&format!("{} launches", n), hw.launches().len() == n,
        &format!("{}", hw.launches().len()));
    let all_zero = signals.iter().all(|s| hw.load_signal(*s).map(|v| v == 0).unwrap_or(false));
    t.check("every completion signal reached 0", all_zero, "signal still set");
    t.check("read index caught up", hw.read_index().ok() == Some(n as u64),
        &format!("{:?}", hw.read_index()));
    t.check("no hardware faults", hw.faults().is_empty(), &format!("{:?}", hw.faults()));
    t.check("window fully reclaimed", pp.free_slots().len() == 8,
        &format!("{} free", pp.free_slots().len()));
    pp.stats().log();
}

// ════════════════════════════════════════════════════════════
// Part C: Barriers
// ════════════════════════════════════════════════════════════

fn barrier(hw: &SimPlatform, kind: PacketType, deps: &[SignalHandle]) -> Result<SignalHandle> {
    let mut bp = BarrierPacket {
        header: PacketHeader::new(kind, false, FenceScope::System, FenceScope::System).raw(),
        ..Default::default()
    };
    bp.dep_signals[..deps.len()].copy_from_slice(deps);
    bp.completion_signal = hw.alloc_signal(1)?;
    hw.submit_barrier(&bp, PASID)?;
    Ok(bp.completion_signal)
}

fn test_barriers(t: &mut TestRunner) {
    t.section("Part C: Barrier-AND / barrier-OR");

    for kind in [PacketType::BarrierAnd, PacketType::BarrierOr] {
        let Some(mut pp) = t.result(&format!("build processor for {:?}", kind), build(4, 1)) else {
            continue;
        };
        let hw = pp.platform();
        let (a, b) = match (hw.alloc_signal(1), hw.alloc_signal(1)) {
            (Ok(a), Ok(b)) => (a, b),
            _ => {
                t.fail("allocate dependency signals", "host memory");
                continue;
            }
        };
        let Some(done) = t.result(&format!("{:?} published", kind), barrier(hw, kind, &[a, b])) else {
            continue;
        };
        hw.set_yield_hook(move |state, point, spins| {
            if point != YieldPoint::DependencyWait {
                return;
            }
            let _ = match spins {
                10 => state.store_signal(a, 0),
                20 => state.store_signal(b, 0),
                _ => Ok(()),
            };
        });

        t.result(&format!("{:?} resolved", kind), pp.run_until_quiescent(50));
        let hw = pp.platform();
        let expected_b = if kind == PacketType::BarrierAnd { 0 } else { 1 };
        t.check(&format!("{:?} waited for the right deps", kind),
            hw.load_signal(b).ok() == Some(expected_b),
            &format!("b={:?}", hw.load_signal(b)));
        t.check(&format!("{:?} completion signalled", kind),
            hw.load_signal(done).ok() == Some(0), "not signalled");
    }
}

// ════════════════════════════════════════════════════════════
// Part D: Contention and topology
// ════════════════════════════════════════════════════════════

fn test_contention(t: &mut TestRunner) {
    t.section("Part D: Core contention and topology");

    let Some(mut pp) = t.result("build processor (window 4, 2 cores)", build(4, 2)) else {
        return;
    };
    pp.platform().hold_core(0, true);
    pp.platform().hold_core(1, true);
    for _ in 0..3 {
        if let Err(e) = submit(pp.platform(), Operation::Gauss5x5, 16, 16, ColorModel::Gray16) {
            t.fail("submit", &e.to_string());
        }
    }
    for _ in 0..100 {
        if pp.run_once().is_err() {
            break;
        }
    }
    let (_, queued, _) = pp.queue_depths();
    t.check("both cores busy", pp.busy_cores() == 2, &format!("{}", pp.busy_cores()));
    t.check("third launch waits in queue", queued == 1, &format!("{} queued", queued));

    pp.platform().release_core(0);
    pp.platform().release_core(1);
    t.result("contention drains", pp.run_until_quiescent(200));

    let line = pp.platform().interrupt_line();
    line.raise(Interrupt::CoreAdded);
    line.raise(Interrupt::CoreRemoved);
    t.result("topology interrupts serviced", pp.service_interrupts());
    let acks = pp
        .platform()
        .events()
        .iter()
        .filter(|e| matches!(e, HwEvent::TopologyAck(_)))
        .count();
    t.check("both topology events acknowledged", acks == 2, &format!("{} acks", acks));
}

// ════════════════════════════════════════════════════════════
// Part E: Main loop
// ════════════════════════════════════════════════════════════

fn test_main_loop(t: &mut TestRunner) {
    t.section("Part E: Main loop until CPU_HALT");

    let Some(mut pp) = t.result("build processor", build(8, 1)) else {
        return;
    };
    let mut signals = Vec::new();
    for _ in 0..4 {
        if let Ok(s) = submit(pp.platform(), Operation::MedianFilter3x3, 8, 8, ColorModel::Rgb8) {
            signals.push(s);
        }
    }
    pp.platform().set_yield_hook(|state, point, spins| {
        if point == YieldPoint::MainLoop && spins >= 200 {
            state.halt();
        }
    });
    t.result("run() returns on halt", pp.run());
    let hw = pp.platform();
    let done = signals.iter().filter(|s| hw.load_signal(**s).ok() == Some(0)).count();
    t.check("work finished before halt", done == 4, &format!("{} done", done));
}

// ════════════════════════════════════════════════════════════

fn main() {
    kprint::init();
    println!("=== AQL Packet Processor Smoke Test ===");

    let mut t = TestRunner::new();

    test_config(&mut t);
    test_dispatch(&mut t);
    test_barriers(&mut t);
    test_contention(&mut t);
    test_main_loop(&mut t);

    t.summary();
    std::process::exit(if t.failed > 0 { 1 } else { 0 });
}
