//! Ordering, barriers and resource contention on the simulated platform

mod common;

use std::cell::Cell;
use std::rc::Rc;

use aqlpp_core::error::PpError;
use aqlpp_core::hw::{Doorbell, Interrupt, Mmio, QueueRing, SignalMemory, YieldPoint};
use aqlpp_core::layout::regs;
use aqlpp_core::ops::Operation;
use aqlpp_core::packet::{PacketHeader, PacketType, RawPacket, SignalHandle};
use aqlpp_engine::RequestStage;
use aqlpp_sim::HwEvent;

use common::{barrier_packet, processor, JobSpec, XorShift, PASID};

#[test]
fn test_window_bound_under_random_completion() {
    let window = 4;
    let mut pp = processor(window, 2, 32);
    for i in 0..24u32 {
        let op = if i % 3 == 0 {
            Operation::SobelXY5x5
        } else {
            Operation::Gauss3x3
        };
        JobSpec::new(op, 4 + i % 5, 4).submit(pp.platform()).unwrap();
    }
    pp.platform().hold_core(0, true);
    pp.platform().hold_core(1, true);

    let mut rng = XorShift::new(0x5eed);
    for _ in 0..400 {
        pp.run_once().unwrap();
        assert!(pp.live_requests() <= window);
        for (slot, stage) in pp.live_stages() {
            assert!(!stage.is_retired());
            assert!(pp.history(slot).unwrap().is_pipeline_prefix());
        }
        let core = rng.below(2) as usize;
        match rng.below(4) {
            0 => pp.platform().hold_core(core, true),
            1 => {
                pp.platform().release_core(core);
            }
            _ => {}
        }
    }

    pp.platform().release_core(0);
    pp.platform().release_core(1);
    pp.run_until_quiescent(1000).unwrap();
    assert_eq!(pp.stats().requests_retired, 24);
    assert_eq!(pp.free_slots().len(), window);
    assert_eq!(pp.platform().read_index().unwrap(), 24);
}

#[test]
fn test_launches_follow_submission_order() {
    let mut pp = processor(4, 1, 16);
    let ops = [
        Operation::MinFilter3x3,
        Operation::SobelY5x5,
        Operation::Gauss3x3,
        Operation::MedianFilter5x5,
        Operation::SobelX3x3,
    ];
    for op in ops {
        JobSpec::new(op, 8, 8).submit(pp.platform()).unwrap();
    }
    pp.run_until_quiescent(200).unwrap();

    let tasks: Vec<u16> = pp.platform().launches().iter().map(|l| l.task).collect();
    let expected: Vec<u16> = ops.iter().map(|op| op.code()).collect();
    assert_eq!(tasks, expected);
}

#[test]
fn test_launch_waits_for_idle_core() {
    let mut pp = processor(4, 2, 16);
    pp.platform().hold_core(0, true);
    pp.platform().hold_core(1, true);
    for _ in 0..3 {
        JobSpec::new(Operation::Gauss5x5, 6, 6)
            .submit(pp.platform())
            .unwrap();
    }
    for _ in 0..60 {
        pp.run_once().unwrap();
    }

    assert_eq!(pp.busy_cores(), 2);
    assert_eq!(pp.platform().launches().len(), 2);
    let (_, launches_queued, _) = pp.queue_depths();
    assert_eq!(launches_queued, 1);
    let computing = pp
        .live_stages()
        .iter()
        .filter(|(_, s)| *s == RequestStage::Computing)
        .count();
    assert_eq!(computing, 3);

    assert!(pp.platform().release_core(1));
    pp.run_once().unwrap();
    let launches = pp.platform().launches();
    assert_eq!(launches.len(), 3);
    assert_eq!(launches[2].core, 1);

    pp.platform().release_core(0);
    pp.run_until_quiescent(200).unwrap();
    assert_eq!(pp.stats().requests_retired, 3);
}

/// Dependencies A and B; the hook sets A on the third dependency wait and
/// B on the sixth. Returns the number of dependency waits.
fn barrier_waits(kind: PacketType) -> usize {
    let mut pp = processor(4, 1, 16);
    let hw = pp.platform();
    let a = hw.alloc_signal(1).unwrap();
    let b = hw.alloc_signal(1).unwrap();
    let deps = [a, SignalHandle::NULL, b, SignalHandle::NULL, SignalHandle::NULL];
    hw.submit_barrier(&barrier_packet(kind, deps, SignalHandle::NULL), PASID)
        .unwrap();

    let waits = Rc::new(Cell::new(0usize));
    let seen = Rc::clone(&waits);
    hw.set_yield_hook(move |state, point, _| {
        if point != YieldPoint::DependencyWait {
            return;
        }
        seen.set(seen.get() + 1);
        match seen.get() {
            3 => state.store_signal(a, 0).unwrap(),
            6 => state.store_signal(b, 0).unwrap(),
            _ => {}
        }
    });

    pp.run_until_quiescent(50).unwrap();
    assert_eq!(pp.stats().barriers_resolved, 1);
    assert_eq!(pp.platform().header_at(0).unwrap(), PacketHeader::INVALID);
    assert_eq!(pp.platform().read_index().unwrap(), 1);
    waits.get()
}

#[test]
fn test_barrier_and_waits_for_every_dependency() {
    assert_eq!(barrier_waits(PacketType::BarrierAnd), 6);
}

#[test]
fn test_barrier_or_releases_on_first_dependency() {
    assert_eq!(barrier_waits(PacketType::BarrierOr), 3);
}

#[test]
fn test_barrier_without_dependencies() {
    for kind in [PacketType::BarrierAnd, PacketType::BarrierOr] {
        let mut pp = processor(4, 1, 16);
        let done = pp.platform().alloc_signal(1).unwrap();
        pp.platform()
            .submit_barrier(&barrier_packet(kind, [SignalHandle::NULL; 5], done), PASID)
            .unwrap();
        let waits = Rc::new(Cell::new(0usize));
        let seen = Rc::clone(&waits);
        pp.platform().set_yield_hook(move |_, point, _| {
            if point == YieldPoint::DependencyWait {
                seen.set(seen.get() + 1);
            }
        });
        pp.run_until_quiescent(20).unwrap();
        assert_eq!(waits.get(), 0);
        assert_eq!(pp.platform().load_signal(done).unwrap(), 0);
        assert_eq!(pp.platform().read_index().unwrap(), 1);
    }
}

#[test]
fn test_barrier_completion_signal() {
    let mut pp = processor(4, 1, 16);
    let dep = pp.platform().alloc_signal(0).unwrap();
    let done = pp.platform().alloc_signal(2).unwrap();
    let deps = [dep, SignalHandle::NULL, SignalHandle::NULL, SignalHandle::NULL, SignalHandle::NULL];
    pp.platform()
        .submit_barrier(&barrier_packet(PacketType::BarrierAnd, deps, done), PASID)
        .unwrap();
    pp.run_until_quiescent(20).unwrap();

    let events = pp.platform().events();
    assert_eq!(
        events,
        vec![HwEvent::Decrement {
            signal: done,
            pasid: PASID,
            value: 1
        }]
    );
    assert_eq!(pp.stats().decrements, 1);
    assert_eq!(pp.live_requests(), 0);
}

#[test]
fn test_barrier_bit_waits_for_prior_entries() {
    let mut pp = processor(4, 1, 16);
    let hw = pp.platform();
    hw.hold_core(0, true);
    JobSpec::new(Operation::SobelX3x3, 8, 8).submit(hw).unwrap();
    JobSpec::new(Operation::SobelY3x3, 8, 8)
        .barrier()
        .submit(hw)
        .unwrap();

    let spins = Rc::new(Cell::new(0usize));
    let seen = Rc::clone(&spins);
    hw.set_yield_hook(move |state, point, _| {
        if point == YieldPoint::AcquireBarrier {
            seen.set(seen.get() + 1);
            if seen.get() == 4 {
                state.release_core(0);
            }
        }
    });

    pp.run_until_quiescent(100).unwrap();
    assert!(spins.get() >= 4);
    assert_eq!(pp.stats().requests_retired, 2);
    assert_eq!(pp.stats().kernels_accepted, 2);

    // the second entry is read only once the first has signalled
    let dmas: Vec<_> = pp
        .platform()
        .events()
        .into_iter()
        .filter(|e| matches!(e, HwEvent::Dma { .. } | HwEvent::Decrement { .. }))
        .collect();
    let first_decrement = dmas
        .iter()
        .position(|e| matches!(e, HwEvent::Decrement { .. }))
        .unwrap();
    assert_eq!(first_decrement, 3);
}

#[test]
fn test_signalling_barrier_behind_kernels() {
    let mut pp = processor(2, 2, 16);
    let hw = pp.platform();
    let jobs: Vec<_> = (0..2)
        .map(|_| JobSpec::new(Operation::Gauss3x3, 4, 4).submit(hw).unwrap())
        .collect();
    let done = hw.alloc_signal(1).unwrap();
    hw.submit_barrier(
        &barrier_packet(PacketType::BarrierOr, [SignalHandle::NULL; 5], done),
        PASID,
    )
    .unwrap();

    pp.run_until_quiescent(200).unwrap();
    for job in &jobs {
        assert_eq!(pp.platform().load_signal(job.signal).unwrap(), 0);
    }
    assert_eq!(pp.platform().load_signal(done).unwrap(), 0);
    assert_eq!(pp.stats().barriers_resolved, 1);
    assert_eq!(pp.platform().read_index().unwrap(), 3);
}

#[test]
fn test_inert_entries_are_acknowledged() {
    let mut pp = processor(4, 1, 16);
    let hw = pp.platform();
    let vendor_header = PacketHeader(PacketType::VendorSpecific as u16);
    let agent_header = PacketHeader(PacketType::AgentDispatch as u16);
    let unknown_header = PacketHeader(0x2a);
    for header in [vendor_header, agent_header, unknown_header] {
        let mut raw = RawPacket::zeroed();
        raw.set_header(header);
        hw.submit(raw, PASID).unwrap();
    }
    JobSpec::new(Operation::Gauss3x3, 4, 4).submit(hw).unwrap();

    pp.run_until_quiescent(100).unwrap();
    assert_eq!(pp.stats().packets_dropped, 3);
    assert_eq!(pp.stats().packets_processed, 4);
    assert_eq!(pp.stats().requests_retired, 1);
    assert_eq!(pp.packet_number(), 4);

    // only the kernel is handed back; inert entries are left as submitted
    let hw = pp.platform();
    assert_eq!(hw.read_index().unwrap(), 1);
    assert_eq!(hw.header_at(0).unwrap(), vendor_header);
    assert_eq!(hw.header_at(1).unwrap(), agent_header);
    assert_eq!(hw.header_at(2).unwrap(), unknown_header);
    assert_eq!(hw.header_at(3).unwrap(), PacketHeader::INVALID);
}

#[test]
fn test_vendor_entry_only_advances_counter() {
    let mut pp = processor(4, 1, 16);
    let mut vendor = RawPacket::zeroed();
    vendor.set_header(PacketHeader(PacketType::VendorSpecific as u16));
    pp.platform().submit(vendor, PASID).unwrap();

    assert!(pp.service_queue().unwrap());
    assert_eq!(pp.packet_number(), 1);
    assert_eq!(pp.live_requests(), 0);
    assert_eq!(pp.queue_depths(), (0, 0, 0));
    let hw = pp.platform();
    assert_eq!(hw.read_index().unwrap(), 0);
    assert_eq!(
        hw.header_at(0).unwrap(),
        PacketHeader(PacketType::VendorSpecific as u16)
    );
    assert_eq!(hw.read64(regs::AQL_LEFT), 0);
    assert!(hw.events().is_empty());
}

#[test]
fn test_signalling_barriers_bounded_by_decrement_queue() {
    let mut pp = processor(2, 1, 16);
    let hw = pp.platform();
    let signals: Vec<_> = (0..3).map(|_| hw.alloc_signal(1).unwrap()).collect();
    for &done in &signals {
        hw.submit_barrier(
            &barrier_packet(PacketType::BarrierAnd, [SignalHandle::NULL; 5], done),
            PASID,
        )
        .unwrap();
    }

    assert!(pp.service_queue().unwrap());
    assert!(pp.service_queue().unwrap());
    // window = 2 decrements already queued
    assert!(!pp.service_queue().unwrap());
    assert_eq!(pp.packet_number(), 2);
    assert_eq!(pp.queue_depths(), (0, 0, 2));
    assert_eq!(pp.stats().barriers_resolved, 2);

    assert!(pp.drain_decrement_queue().unwrap());
    assert_eq!(pp.queue_depths(), (0, 0, 1));
    assert!(pp.service_queue().unwrap());
    assert_eq!(pp.packet_number(), 3);

    pp.run_until_quiescent(100).unwrap();
    for &done in &signals {
        assert_eq!(pp.platform().load_signal(done).unwrap(), 0);
    }
    assert_eq!(pp.platform().read_index().unwrap(), 3);
}

#[test]
fn test_ring_wraps() {
    let mut pp = processor(2, 1, 4);
    for round in 0..3u32 {
        for _ in 0..3 {
            JobSpec::new(Operation::MaxFilter3x3, 4, 4 + round)
                .submit(pp.platform())
                .unwrap();
        }
        pp.run_until_quiescent(200).unwrap();
    }
    assert_eq!(pp.stats().requests_retired, 9);
    assert_eq!(pp.packet_number(), 9);
    assert_eq!(pp.platform().read_index().unwrap(), 9);
}

#[test]
fn test_topology_events_are_acknowledged() {
    let mut pp = processor(4, 2, 16);
    let line = pp.platform().interrupt_line();
    assert!(line.raise(Interrupt::CoreAdded));
    assert!(line.raise(Interrupt::CoreRemoved));
    pp.run_once().unwrap();

    assert_eq!(
        pp.platform().events(),
        vec![
            HwEvent::TopologyAck(Doorbell::CoreAddedAck),
            HwEvent::TopologyAck(Doorbell::CoreRemovedAck),
        ]
    );
    assert_eq!(pp.stats().topology_events, 2);
    // allocator keeps its configured size
    JobSpec::new(Operation::Gauss3x3, 4, 4)
        .submit(pp.platform())
        .unwrap();
    pp.run_until_quiescent(100).unwrap();
    assert_eq!(pp.stats().requests_retired, 1);
}

#[test]
fn test_spurious_interrupts_are_fatal() {
    for irq in [Interrupt::DmaDone, Interrupt::CompletionDone] {
        let mut pp = processor(4, 1, 16);
        pp.platform().interrupt_line().raise(irq);
        assert!(matches!(pp.run_once(), Err(PpError::SpuriousInterrupt(_))));
    }

    let mut pp = processor(4, 1, 16);
    pp.platform().interrupt_line().raise(Interrupt::KernelDone);
    assert_eq!(pp.run_once(), Err(PpError::InvalidCore(0)));
}

#[test]
fn test_run_returns_on_halt() {
    let mut pp = processor(4, 1, 16);
    JobSpec::new(Operation::Gauss3x3, 4, 4)
        .submit(pp.platform())
        .unwrap();
    pp.platform().set_yield_hook(|state, point, spins| {
        if point == YieldPoint::MainLoop && spins == 30 {
            state.halt();
        }
    });

    pp.run().unwrap();
    assert_eq!(pp.stats().requests_retired, 1);
}
