//! Integration tests for the role loops.
//!
//! The roles run one after another against the same segment directory,
//! which makes every cycle's input deterministic.

mod common;

use scaosim_core::aggregate::ResidualStatistic;
use scaosim_core::error::ScaoError;
use scaosim_core::exchange::{Channel, ChannelLayout, Subscriber};
use scaosim_core::geometry::SensorGeometry;
use scaosim_core::payload::{PhaseMap, SlopeVector, SubapertureMask};
use scaosim_core::reconstruct::ReconstructorMethod;
use scaosim_core::types::Generation;
use scaosim_runtime::roles::{HardwareSimulator, PerformanceMonitor, ReconstructorRole, RunOptions};
use std::time::Duration;

use common::test_config;

#[tokio::test]
async fn simulator_publishes_every_cycle() {
    let (_dir, config) = test_config();
    let geometry = SensorGeometry::from_settings(&config.sensor).unwrap();
    let layout = ChannelLayout::from_geometry(&geometry);
    let segments = config.segment_config();

    let status = HardwareSimulator::new(config)
        .run(&RunOptions::default().with_max_cycles(5))
        .await
        .unwrap();
    assert_eq!(status.cycles, 5);
    assert_eq!(status.published, 11);
    assert_eq!(status.last_generation, Generation::new(5));

    let mut mask =
        Subscriber::<SubapertureMask>::open(Channel::ValidSubapertures, &layout, &segments).unwrap();
    let mask = mask.latest().unwrap();
    assert_eq!(mask.generation, Generation::new(1));
    assert_eq!(&mask.payload, geometry.valid_subapertures());

    let mut truth = Subscriber::<PhaseMap>::open(Channel::TruePhase, &layout, &segments).unwrap();
    let truth = truth.latest().unwrap();
    assert_eq!(truth.generation, Generation::new(5));
    assert!(truth.payload.masked_std(geometry.pupil()) > 0.0);

    let mut slopes = Subscriber::<SlopeVector>::open(Channel::Slopes, &layout, &segments).unwrap();
    let slopes = slopes.latest().unwrap();
    assert_eq!(slopes.generation, Generation::new(5));
    assert_eq!(slopes.payload.len(), geometry.n_valid());
}

#[tokio::test]
async fn reconstructor_consumes_only_new_generations() {
    let (_dir, config) = test_config();
    HardwareSimulator::new(config.clone())
        .run(&RunOptions::default().with_max_cycles(3))
        .await
        .unwrap();

    let status = ReconstructorRole::new(config)
        .run(&RunOptions::default().with_max_cycles(3))
        .await
        .unwrap();
    assert_eq!(status.cycles, 3);
    assert_eq!(status.published, 1);
    assert_eq!(status.idle_cycles, 2);
    assert_eq!(status.last_generation, Generation::new(3));
}

#[tokio::test]
async fn monitor_reports_residual_of_zero_reconstruction() {
    let (_dir, mut config) = test_config();
    config.reconstructor.method = ReconstructorMethod::Zero;
    config.monitor.statistic = ResidualStatistic::Rms;

    HardwareSimulator::new(config.clone())
        .run(&RunOptions::default().with_max_cycles(4))
        .await
        .unwrap();
    ReconstructorRole::new(config.clone())
        .run(&RunOptions::default().with_max_cycles(1))
        .await
        .unwrap();

    let geometry = SensorGeometry::from_settings(&config.sensor).unwrap();
    let layout = ChannelLayout::from_geometry(&geometry);
    let mut truth =
        Subscriber::<PhaseMap>::open(Channel::TruePhase, &layout, &config.segment_config()).unwrap();
    let truth = truth.latest().unwrap().payload;
    let expected = ResidualStatistic::Rms.compute(
        truth.as_slice(),
        geometry.zero_phase().as_slice(),
        geometry.pupil(),
    );

    let status = PerformanceMonitor::new(config)
        .run(&RunOptions::default().with_max_cycles(2))
        .await
        .unwrap();
    assert_eq!(status.reports, 1);
    assert_eq!(status.idle_cycles, 1);
    let residual = status.last_residual.unwrap();
    assert!((residual - expected).abs() < 1e-9, "{residual} vs {expected}");
    assert!(residual > 0.0);
}

#[tokio::test]
async fn over_budget_reconstructor_reports_backpressure_and_keeps_up() {
    let (_dir, mut config) = test_config();
    // A budget this small rounds to zero, so every reconstruction overruns.
    config.reconstructor.latency_budget = 1e-9;
    config.reconstructor.backpressure_window = 1;

    let simulator = HardwareSimulator::new(config.clone());
    let reconstructor = ReconstructorRole::new(config);
    let sim_opts = RunOptions::default().with_max_cycles(20);
    let recon_opts = RunOptions::default().with_max_cycles(10);
    let (sim, recon) = tokio::join!(
        simulator.run(&sim_opts),
        reconstructor.run(&recon_opts),
    );
    let (sim, recon) = (sim.unwrap(), recon.unwrap());

    assert!(recon.published >= 1, "{recon:?}");
    assert!(recon.backpressure, "{recon:?}");
    assert_eq!(recon.overruns, recon.published);
    assert_eq!(recon.cycles, 10);

    // Backpressure is reported, not pushed upstream: the simulator ran
    // every cycle and published each one.
    assert_eq!(sim.cycles, 20);
    assert_eq!(sim.last_generation, Generation::new(20));
}

#[tokio::test]
async fn reconstructor_rejects_foreign_geometry() {
    let (_dir, config) = test_config();
    HardwareSimulator::new(config.clone())
        .run(&RunOptions::default().with_max_cycles(1))
        .await
        .unwrap();

    let mut strict = config;
    strict.sensor.illumination_threshold = 1.0;
    let err = ReconstructorRole::new(strict)
        .run(&RunOptions::default().with_max_cycles(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ScaoError::GeometryMismatch { .. }), "{err}");
    assert!(err.is_fatal());
}

#[tokio::test]
async fn stop_while_waiting_for_first_write() {
    let (_dir, config) = test_config();
    let role = ReconstructorRole::new(config);
    let control = role.control();

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        control.stop();
    });
    let status = role.run(&RunOptions::default()).await.unwrap();
    stopper.await.unwrap();

    assert_eq!(status.cycles, 0);
    assert!(!role.control().is_running());
}

#[tokio::test]
async fn first_write_timeout_is_reported() {
    let (_dir, mut config) = test_config();
    config.exchange.first_write_timeout_ms = Some(20);
    let err = PerformanceMonitor::new(config)
        .run(&RunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ScaoError::FirstWriteTimeout { .. }), "{err}");
}
