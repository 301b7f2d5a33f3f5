//! Kernel dispatches end to end on the simulated platform

mod common;

use aqlpp_core::error::PpError;
use aqlpp_core::hw::{Mmio, QueueRing, SignalMemory};
use aqlpp_core::layout::regs;
use aqlpp_core::ops::{ColorModel, DmaDirection, Operation, SOBEL_X_3X3, SOBEL_Y_3X3};
use aqlpp_core::packet::PacketHeader;
use aqlpp_core::slot::SlotId;
use aqlpp_engine::RequestStage;
use aqlpp_sim::HwEvent;

use common::{processor, JobSpec, PASID};

#[test]
fn test_sobel_gray_end_to_end() {
    let mut pp = processor(4, 1, 16);
    let job = JobSpec::new(Operation::SobelXY3x3, 20, 20)
        .threshold(0)
        .submit(pp.platform())
        .unwrap();
    assert_eq!(job.bytes, 800);

    pp.run_until_quiescent(100).unwrap();

    let hw = pp.platform();
    assert_eq!(hw.dma_count(DmaDirection::Load), 2);
    assert_eq!(hw.dma_count(DmaDirection::Store), 1);
    assert_eq!(hw.decrement_count(), 1);
    assert!(hw.faults().is_empty());

    let launches = hw.launches();
    assert_eq!(launches.len(), 1);
    let launch = &launches[0];
    assert_eq!(launch.core, 0);
    assert_eq!(launch.task, Operation::SobelXY3x3.code());
    assert_eq!((launch.width, launch.height), (20, 20));
    assert_eq!(launch.color_model, ColorModel::Gray16.raw());
    assert_eq!(launch.threshold, 0);
    // computed in place in the staging buffer
    assert_eq!(launch.src_address, launch.dst_address);
    for i in 0..9 {
        assert_eq!(launch.mask0[i], SOBEL_X_3X3[i] as i32);
        assert_eq!(launch.mask1[i], SOBEL_Y_3X3[i] as i32);
    }

    // the simulated core leaves pixels untouched
    assert_eq!(
        hw.read_host(job.dst, job.bytes).unwrap(),
        hw.read_host(job.src, job.bytes).unwrap()
    );
    assert_eq!(hw.load_signal(job.signal).unwrap(), 0);
    assert_eq!(hw.header_at(0).unwrap(), PacketHeader::INVALID);
    assert_eq!(hw.read_index().unwrap(), 1);
    assert_eq!(hw.read64(regs::AQL_LEFT), 0);

    assert_eq!(pp.live_requests(), 0);
    assert_eq!(pp.free_slots().len(), 4);
    let stats = pp.stats();
    assert_eq!(stats.kernels_accepted, 1);
    assert_eq!(stats.requests_retired, 1);
    assert_eq!(stats.dma_transfers, 3);
}

#[test]
fn test_dma_programming_order() {
    let mut pp = processor(4, 1, 16);
    let job = JobSpec::new(Operation::Gauss5x5, 8, 4)
        .color_model(ColorModel::Rgb8)
        .submit(pp.platform())
        .unwrap();
    pp.run_until_quiescent(100).unwrap();

    let dmas: Vec<_> = pp
        .platform()
        .events()
        .into_iter()
        .filter_map(|e| match e {
            HwEvent::Dma {
                direction,
                host_address,
                bytes,
                pasid,
                ..
            } => Some((direction, host_address, bytes, pasid)),
            _ => None,
        })
        .collect();
    assert_eq!(dmas.len(), 3);
    assert_eq!(dmas[0].0, DmaDirection::Load);
    assert_eq!(dmas[0].2, 20);
    assert_eq!(dmas[1], (DmaDirection::Load, job.src, 96, PASID));
    assert_eq!(dmas[2], (DmaDirection::Store, job.dst, 96, PASID));

    let launch = &pp.platform().launches()[0];
    assert_eq!(launch.normalization, 256);
}

#[test]
fn test_first_slot_is_top_of_free_list() {
    let mut pp = processor(8, 1, 16);
    JobSpec::new(Operation::MedianFilter3x3, 4, 4)
        .submit(pp.platform())
        .unwrap();

    assert!(pp.service_queue().unwrap());
    assert_eq!(
        pp.live_stages(),
        vec![(SlotId::new(7), RequestStage::FetchingArguments)]
    );
    assert_eq!(pp.packet_number(), 1);

    pp.run_until_quiescent(100).unwrap();
    let all: Vec<_> = (0..8).map(SlotId::new).collect();
    assert_eq!(pp.free_slots(), all);
}

#[test]
fn test_history_is_pipeline_prefix() {
    let mut pp = processor(4, 1, 16);
    pp.platform().hold_core(0, true);
    JobSpec::new(Operation::SobelX3x3, 10, 10)
        .submit(pp.platform())
        .unwrap();

    let slot = SlotId::new(3);
    for _ in 0..50 {
        pp.run_once().unwrap();
        if pp.stage_of(slot) == Some(RequestStage::Computing) {
            break;
        }
    }
    let history = pp.history(slot).unwrap();
    assert_eq!(
        history.as_slice(),
        &[
            RequestStage::FetchingArguments,
            RequestStage::FetchingImage,
            RequestStage::Computing
        ]
    );
    assert!(history.is_pipeline_prefix());
    // the launch may still be queued when the image DMA completes late in
    // an iteration; one more pass hands it to the core
    pp.run_once().unwrap();
    assert_eq!(pp.busy_cores(), 1);
    assert_eq!(pp.queue_depths().1, 0);
    assert_eq!(pp.stage_of(slot), Some(RequestStage::Computing));

    pp.platform().release_core(0);
    pp.run_until_quiescent(100).unwrap();
    assert_eq!(pp.stage_of(slot), None);
}

#[test]
fn test_no_signal_skips_completion() {
    let mut pp = processor(4, 1, 16);
    JobSpec::new(Operation::MaxFilter5x5, 6, 6)
        .no_signal()
        .submit(pp.platform())
        .unwrap();
    pp.run_until_quiescent(100).unwrap();

    assert_eq!(pp.platform().decrement_count(), 0);
    assert_eq!(pp.stats().requests_retired, 1);
    assert_eq!(pp.platform().read_index().unwrap(), 1);
}

#[test]
fn test_custom_3x3_blob() {
    let mut pp = processor(4, 1, 16);
    let coefficients = [-1, -1, -1, -1, 8, -1, -1, -1, -1];
    JobSpec::new(Operation::CustomFilter3x3, 5, 5)
        .custom(&coefficients, 3)
        .submit(pp.platform())
        .unwrap();
    pp.run_until_quiescent(100).unwrap();

    let first_dma = pp.platform().events().into_iter().find_map(|e| match e {
        HwEvent::Dma { bytes, .. } => Some(bytes),
        _ => None,
    });
    assert_eq!(first_dma, Some(60));

    let launch = &pp.platform().launches()[0];
    assert_eq!(launch.normalization, 3);
    assert_eq!(&launch.mask0[..9], &coefficients);
    assert!(launch.mask0[9..].iter().all(|&c| c == 0));
}

#[test]
fn test_custom_5x5_blob() {
    let mut pp = processor(4, 1, 16);
    let coefficients: Vec<i32> = (0..25).map(|i| 100 - i * 9).collect();
    JobSpec::new(Operation::CustomFilter5x5, 5, 5)
        .custom(&coefficients, 1000)
        .submit(pp.platform())
        .unwrap();
    pp.run_until_quiescent(100).unwrap();

    let first_dma = pp.platform().events().into_iter().find_map(|e| match e {
        HwEvent::Dma { bytes, .. } => Some(bytes),
        _ => None,
    });
    assert_eq!(first_dma, Some(124));

    let launch = &pp.platform().launches()[0];
    assert_eq!(launch.task, 0x32);
    assert_eq!(launch.normalization, 1000);
    assert_eq!(launch.mask0.to_vec(), coefficients);
}

#[test]
fn test_unknown_operation_forwarded() {
    let mut pp = processor(4, 1, 16);
    JobSpec::new(Operation::Other(0x7e), 4, 4)
        .submit(pp.platform())
        .unwrap();
    pp.run_until_quiescent(100).unwrap();

    let launch = &pp.platform().launches()[0];
    assert_eq!(launch.task, 0x7e);
    assert!(launch.mask0.iter().all(|&c| c == 0));
    assert_eq!(pp.stats().requests_retired, 1);
}

#[test]
fn test_unknown_colour_model_is_empty_image() {
    let mut pp = processor(4, 1, 16);
    JobSpec::new(Operation::Gauss3x3, 16, 16)
        .color_model(ColorModel::Other(9))
        .submit(pp.platform())
        .unwrap();
    pp.run_until_quiescent(100).unwrap();

    let sizes: Vec<u64> = pp
        .platform()
        .events()
        .into_iter()
        .filter_map(|e| match e {
            HwEvent::Dma { bytes, .. } => Some(bytes),
            _ => None,
        })
        .collect();
    assert_eq!(sizes, vec![20, 0, 0]);
}

#[test]
fn test_image_larger_than_stage_is_fatal() {
    let mut pp = processor(4, 1, 16);
    // 128x128 gray needs 32 KiB, the stage holds 16
    JobSpec::new(Operation::Gauss3x3, 128, 128)
        .submit(pp.platform())
        .unwrap();
    let err = pp.run_until_quiescent(100).unwrap_err();
    assert!(matches!(
        err,
        PpError::StagingOverflow { needed: 32768, .. }
    ));
}
