//! End-to-end trials on the simulated device.

use dlrm_bench::{
    run_trial, Accelerator, DataType, Direction, DispatchPlan, DlrmError, DlrmStorage, DlrmTrial,
    HarnessConfig, KernelSet, ProblemConfig, ProblemParams, ReportSession, TrialOutcome,
    DEFAULT_REGISTRY,
};
use dlrm_bench_sim::{SimDevice, SimProfile, StreamOrdering};

fn params(data_type: DataType, direction: Direction) -> ProblemParams {
    ProblemParams {
        tile_size: 16,
        data_type,
        thread_block: (64, 1),
        problem_size: (32, 32, 4),
        direction,
    }
}

fn output(session: ReportSession<Vec<u8>>) -> String {
    String::from_utf8(session.into_inner()).unwrap()
}

// ============================================================================
// Report scenarios
// ============================================================================

#[test]
fn test_forward_bench_row() {
    let mut device = SimDevice::new(SimProfile::gfx90a());
    let mut storage = DlrmStorage::new();
    let mut session = ReportSession::new(Vec::new(), false);

    let record = run_trial(
        &mut device,
        &mut storage,
        &mut session,
        &params(DataType::F16, Direction::Forward),
        &HarnessConfig::bench(),
    )
    .unwrap();

    assert_eq!(record.outcome, TrialOutcome::Bench);
    assert_eq!(device.launches_executed(), 5);
    let metrics = record.metrics.unwrap();
    assert!(metrics.elapsed_ms > 0.0);
    assert!(metrics.efficiency >= 0.0);

    let text = output(session);
    let row = text.lines().nth(1).unwrap();
    assert!(row.starts_with("16, f16, Forwards, 32, 32, 4, "));
    assert!(row.ends_with(", BENCH"));
}

#[test]
fn test_forward_validation_passes() {
    for data_type in [DataType::F16, DataType::BF16, DataType::F32, DataType::I8] {
        let mut device = SimDevice::new(SimProfile::gfx90a());
        let mut storage = DlrmStorage::new();
        let mut session = ReportSession::new(Vec::new(), true);

        let record = run_trial(
            &mut device,
            &mut storage,
            &mut session,
            &params(data_type, Direction::Forward),
            &HarnessConfig::validation(),
        )
        .unwrap();

        assert_eq!(record.outcome, TrialOutcome::Passed, "{data_type}");
        assert_eq!(device.launches_executed(), 1);
        session.assert_all_passed();
        assert!(output(session).lines().nth(1).unwrap().ends_with(", PASSED"));
    }
}

#[test]
fn test_backward_validation_passes() {
    let mut device = SimDevice::new(SimProfile::gfx90a());
    let mut storage = DlrmStorage::new();
    let mut session = ReportSession::new(Vec::new(), true);

    let mut trial = DlrmTrial::new(
        &params(DataType::F16, Direction::Backward),
        &HarnessConfig::validation(),
    )
    .unwrap();
    let record = trial.run(&mut device, &mut storage, &mut session).unwrap();

    assert_eq!(record.outcome, TrialOutcome::Passed);
    let outcome = trial.state().validation.as_ref().unwrap();
    assert_eq!(outcome.checks.len(), 3);
    let max = outcome
        .checks
        .iter()
        .map(|(_, c)| c.max_relative_error)
        .fold(0.0, f64::max);
    assert_eq!(record.validation.unwrap().max_relative_error, max);
    session.assert_all_passed();
}

#[test]
fn test_gfx11_f32_is_skipped() {
    let mut device = SimDevice::new(SimProfile::gfx1100());
    let mut storage = DlrmStorage::new();
    let mut session = ReportSession::new(Vec::new(), true);

    let record = run_trial(
        &mut device,
        &mut storage,
        &mut session,
        &params(DataType::F32, Direction::Forward),
        &HarnessConfig::validation(),
    )
    .unwrap();

    assert_eq!(record.outcome, TrialOutcome::Skipped);
    assert_eq!(device.launches_executed(), 0);
    assert_eq!(device.live_buffers(), 0);
    assert_eq!(
        output(session).lines().nth(1).unwrap(),
        "16, f32, Forwards, 32, 32, 4, n/a, n/a, n/a, n/a, n/a, n/a, SKIPPED"
    );
}

#[test]
fn test_unaligned_size_is_skipped() {
    let mut device = SimDevice::new(SimProfile::gfx90a());
    let mut storage = DlrmStorage::new();
    let mut session = ReportSession::new(Vec::new(), true);
    let p = ProblemParams {
        problem_size: (40, 32, 4),
        ..params(DataType::F16, Direction::Backward)
    };

    let record = run_trial(
        &mut device,
        &mut storage,
        &mut session,
        &p,
        &HarnessConfig::validation(),
    )
    .unwrap();

    assert_eq!(record.outcome, TrialOutcome::Skipped);
    assert_eq!(device.launches_executed(), 0);
    assert_eq!(device.live_buffers(), 0);
    assert!(output(session).lines().nth(1).unwrap().ends_with(", SKIPPED"));
}

#[test]
fn test_gfx11_f16_runs_wave32() {
    let mut device = SimDevice::new(SimProfile::gfx1100());
    let mut storage = DlrmStorage::new();
    let mut session = ReportSession::new(Vec::new(), true);

    let record = run_trial(
        &mut device,
        &mut storage,
        &mut session,
        &params(DataType::F16, Direction::Backward),
        &HarnessConfig::validation(),
    )
    .unwrap();
    assert_eq!(record.outcome, TrialOutcome::Passed);
}

#[test]
fn test_header_printed_once_per_session() {
    let mut device = SimDevice::new(SimProfile::gfx908());
    let mut storage = DlrmStorage::new();
    let mut session = ReportSession::new(Vec::new(), true);

    for direction in [Direction::Forward, Direction::Backward] {
        for data_type in DataType::ALL {
            run_trial(
                &mut device,
                &mut storage,
                &mut session,
                &params(data_type, direction),
                &HarnessConfig::validation(),
            )
            .unwrap();
        }
    }
    session.assert_all_passed();

    let text = output(session);
    assert_eq!(text.matches("TileSize").count(), 1);
    assert_eq!(text.lines().count(), 1 + 2 * DataType::ALL.len());
    // gfx908 has no f64 path
    assert_eq!(text.matches("SKIPPED").count(), 2);
}

#[test]
fn test_storage_is_reused_across_trials() {
    let mut device = SimDevice::new(SimProfile::gfx90a());
    let mut storage = DlrmStorage::new();
    let mut session = ReportSession::new(Vec::new(), true);

    for direction in [Direction::Backward, Direction::Forward] {
        run_trial(
            &mut device,
            &mut storage,
            &mut session,
            &params(DataType::F32, direction),
            &HarnessConfig::validation(),
        )
        .unwrap();
    }
    // forward buffers plus the uploaded reference
    assert_eq!(device.live_buffers(), 4);
    storage.release(&mut device).unwrap();
    assert_eq!(device.live_buffers(), 0);
}

// ============================================================================
// Stream ordering
// ============================================================================

#[test]
fn test_plan_waits_for_reduction_on_unordered_stream() {
    let profile = SimProfile::gfx90a().with_ordering(StreamOrdering::Unordered);
    let mut device = SimDevice::new(profile);
    let mut storage = DlrmStorage::new();
    let mut session = ReportSession::new(Vec::new(), true);
    let harness = HarnessConfig {
        repeats: Some(3),
        ..HarnessConfig::validation()
    };

    let record = run_trial(
        &mut device,
        &mut storage,
        &mut session,
        &params(DataType::F32, Direction::Backward),
        &harness,
    )
    .unwrap();
    assert_eq!(record.outcome, TrialOutcome::Passed);
    assert_eq!(device.launches_executed(), 6);
}

#[test]
fn test_missing_wait_corrupts_backward_on_unordered_stream() {
    let profile = SimProfile::gfx90a().with_ordering(StreamOrdering::Unordered);
    let mut device = SimDevice::new(profile);
    let mut storage = DlrmStorage::new();
    let p = params(DataType::F32, Direction::Backward);
    let config = ProblemConfig::new(&p).unwrap();

    storage.resize_backward(&mut device, &config).unwrap();
    storage.fill_backward(&mut device, &config, 5489).unwrap();
    storage.copy_device_to_host_bwd_input(&mut device).unwrap();

    let kernels = KernelSet::standard(16, DataType::F32);
    let plan = DispatchPlan::build(&config, &kernels, &storage, 64).unwrap();
    let DispatchPlan::Backward { reduction, main } = &plan else {
        panic!("expected backward plan");
    };
    // Submit both launches back to back, without the event barrier.
    device
        .launch(&reduction.kernel, &reduction.config, &reduction.args)
        .unwrap();
    device.launch(&main.kernel, &main.config, &main.args).unwrap();

    let outcome =
        dlrm_bench::validation::validate_backward(&mut device, &mut storage, &config, 10.0)
            .unwrap();
    assert!(!outcome.passed);
    let failed: Vec<_> = outcome
        .checks
        .iter()
        .filter(|(_, c)| !c.passed)
        .map(|(label, _)| *label)
        .collect();
    assert_eq!(failed, ["grad"]);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_launch_fault_aborts_trial() {
    let mut device = SimDevice::new(SimProfile::gfx90a());
    device.inject_launch_fault("illegal address");
    let mut storage = DlrmStorage::new();
    let mut session = ReportSession::new(Vec::new(), false);

    let result = run_trial(
        &mut device,
        &mut storage,
        &mut session,
        &params(DataType::F16, Direction::Forward),
        &HarnessConfig::bench(),
    );
    match result {
        Err(DlrmError::Accelerator(msg)) => assert!(msg.contains("illegal address")),
        other => panic!("expected accelerator error, got {other:?}"),
    }
    assert!(!session.header_printed());
}

#[test]
fn test_unregistered_tile_fails_before_allocation() {
    let mut device = SimDevice::new(SimProfile::gfx90a());
    let mut storage = DlrmStorage::new();
    let mut session = ReportSession::new(Vec::new(), true);
    let p = ProblemParams {
        tile_size: 8,
        ..params(DataType::F16, Direction::Backward)
    };

    let result = run_trial(
        &mut device,
        &mut storage,
        &mut session,
        &p,
        &HarnessConfig::validation(),
    );
    assert!(matches!(
        result,
        Err(DlrmError::KernelNotFound {
            tile_size: 8,
            data_type: DataType::F16
        })
    ));
    assert_eq!(device.live_buffers(), 0);
    assert_eq!(device.launches_executed(), 0);
    assert!(!session.header_printed());
}

#[test]
fn test_default_registry_covers_presets() {
    for tile in [16, 32] {
        for data_type in DataType::ALL {
            assert!(DEFAULT_REGISTRY.get(tile, data_type).is_some());
        }
    }
}
