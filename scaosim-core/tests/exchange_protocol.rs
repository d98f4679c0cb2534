//! Integration tests for the exchange protocol.
//!
//! Covers torn-read freedom under concurrent publish/read, generation
//! ordering, the first-write handshake, schema checks at attach, and the
//! end-to-end residual pipeline.

use scaosim_core::aggregate::{PerformanceAggregator, ResidualStatistic};
use scaosim_core::config::{ReconstructorSettings, SensorSettings};
use scaosim_core::error::ScaoError;
use scaosim_core::exchange::{Backoff, Channel, Publisher, Subscriber};
use scaosim_core::geometry::SensorGeometry;
use scaosim_core::payload::{PhaseMap, SlopeVector};
use scaosim_core::reconstruct::{Reconstructor, ReconstructorMethod, ZonalReconstructor};
use scaosim_core::segment::{Segment, SegmentSpec};
use scaosim_core::types::{DType, Generation, Shape};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

mod common;

use common::{decode_pattern, pattern, scenario_layout, test_segment_config};

const WORDS: usize = 4096;

#[test]
fn snapshots_are_never_torn() {
    let (_dir, config) = test_segment_config();
    let spec = SegmentSpec::new("stress", Shape::new(&[WORDS as u64]), DType::F64);
    let segment = Segment::create_or_attach(&spec, &config).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let mut writer = segment.writer();
    let writer_done = Arc::clone(&done);
    let writer_thread = thread::spawn(move || {
        for generation in 1..=20_000u64 {
            let g = writer.publish(&pattern(generation, WORDS)).unwrap();
            assert_eq!(g, Generation::new(generation));
        }
        writer_done.store(true, Ordering::Release);
    });

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let reader = segment.reader();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut buf = vec![0u8; WORDS * 8];
                let mut last = 0u64;
                let mut consistent = 0u64;
                while !done.load(Ordering::Acquire) {
                    match reader.snapshot_into(&mut buf) {
                        Ok(meta) => {
                            let seen = decode_pattern(&buf).expect("torn payload observed");
                            assert_eq!(seen, meta.generation.as_u64());
                            assert!(seen >= last, "generation went backwards: {seen} < {last}");
                            last = seen;
                            consistent += 1;
                        }
                        Err(e) if e.is_transient() => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
                let meta = reader.snapshot_into(&mut buf).unwrap();
                assert_eq!(decode_pattern(&buf), Some(20_000));
                assert_eq!(meta.generation, Generation::new(20_000));
                consistent + 1
            })
        })
        .collect();

    writer_thread.join().unwrap();
    let total: u64 = readers.into_iter().map(|r| r.join().unwrap()).sum();
    assert!(total > 0);
}

#[test]
fn generations_strictly_increase() {
    let (_dir, config) = test_segment_config();
    let layout = scenario_layout();
    let mut publisher = Publisher::<PhaseMap>::open(Channel::TruePhase, &layout, &config).unwrap();

    let mut previous = publisher.generation();
    assert_eq!(previous, Generation::UNWRITTEN);
    for _ in 0..50 {
        let g = publisher.publish(&PhaseMap::zeros(64, 64)).unwrap();
        assert!(g > previous);
        previous = g;
    }
    assert_eq!(previous, Generation::new(50));
}

#[tokio::test]
async fn reader_before_writer_sees_exact_first_payload() {
    let (_dir, config) = test_segment_config();
    let layout = scenario_layout();

    let mut subscriber = Subscriber::<SlopeVector>::open(Channel::Slopes, &layout, &config).unwrap();
    assert!(matches!(
        subscriber.latest(),
        Err(ScaoError::NotYetWritten { .. })
    ));

    let first: Vec<[f32; 2]> = (0..100).map(|i| [i as f32 * 0.5, -(i as f32)]).collect();
    let expected = SlopeVector::from_pairs(&first);

    let publish_config = config.clone();
    let to_publish = expected.clone();
    let writer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        let mut publisher =
            Publisher::<SlopeVector>::open(Channel::Slopes, &scenario_layout(), &publish_config)
                .unwrap();
        publisher.publish(&to_publish).unwrap();
    });

    let backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(10), 2.0);
    let sample = subscriber
        .wait_for_first_write(&backoff, Some(Duration::from_secs(10)))
        .await
        .unwrap();
    writer.join().unwrap();

    assert_eq!(sample.generation, Generation::new(1));
    assert_eq!(sample.payload, expected);
}

#[test]
fn zero_pipeline_has_zero_residual() {
    let (_dir, config) = test_segment_config();
    let layout = scenario_layout();

    let mut slopes_out = Publisher::<SlopeVector>::open(Channel::Slopes, &layout, &config).unwrap();
    let mut truth_out = Publisher::<PhaseMap>::open(Channel::TruePhase, &layout, &config).unwrap();
    let mut recon_out =
        Publisher::<PhaseMap>::open(Channel::ReconstructedPhase, &layout, &config).unwrap();

    assert_eq!(slopes_out.publish(&SlopeVector::zeros(100)).unwrap(), Generation::new(1));
    assert_eq!(truth_out.publish(&PhaseMap::zeros(64, 64)).unwrap(), Generation::new(1));
    assert_eq!(recon_out.publish(&PhaseMap::zeros(64, 64)).unwrap(), Generation::new(1));

    let mut truth_in = Subscriber::<PhaseMap>::open(Channel::TruePhase, &layout, &config).unwrap();
    let mut recon_in =
        Subscriber::<PhaseMap>::open(Channel::ReconstructedPhase, &layout, &config).unwrap();

    let geometry = SensorGeometry::from_settings(&SensorSettings::default()).unwrap();
    let mut aggregator =
        PerformanceAggregator::new(geometry.pupil().to_vec(), ResidualStatistic::Rms, None);

    let truth = truth_in.latest().unwrap();
    let recon = recon_in.latest().unwrap();
    let report = aggregator
        .observe(Some(&truth), Some(&recon))
        .unwrap()
        .unwrap();
    assert_eq!(report.residual, 0.0);
    assert_eq!(report.recon_generation, Generation::new(1));

    // Same reconstruction again: no second report.
    let recon_again = recon_in.latest().unwrap();
    assert!(
        aggregator
            .observe(Some(&truth), Some(&recon_again))
            .unwrap()
            .is_none()
    );
}

#[test]
fn mismatched_attach_leaves_segment_untouched() {
    let (_dir, config) = test_segment_config();
    let layout = scenario_layout();

    let mut publisher = Publisher::<SlopeVector>::open(Channel::Slopes, &layout, &config).unwrap();
    let original = SlopeVector::from_pairs(&vec![[1.5, -2.5]; 100]);
    publisher.publish(&original).unwrap();

    let mut smaller = scenario_layout();
    smaller.slopes = Shape::matrix(50, 2);
    let err = Subscriber::<SlopeVector>::open(Channel::Slopes, &smaller, &config)
        .err()
        .expect("attach with (50, 2) must fail");
    match &err {
        ScaoError::SchemaMismatch {
            expected_shape,
            found_shape,
            ..
        } => {
            assert_eq!(*expected_shape, Shape::matrix(50, 2));
            assert_eq!(*found_shape, Shape::matrix(100, 2));
        }
        other => panic!("expected SchemaMismatch, got {other}"),
    }
    assert!(err.is_fatal());

    let mut reader = Subscriber::<SlopeVector>::open(Channel::Slopes, &layout, &config).unwrap();
    let sample = reader.latest().unwrap();
    assert_eq!(sample.payload, original);
    assert_eq!(sample.generation, Generation::new(1));

    let status = Segment::inspect(Channel::Slopes.name(), &config).unwrap();
    assert_eq!(status.header.shape, Shape::matrix(100, 2));
    assert_eq!(status.file_len, status.header.total_size());
}

#[test]
fn reconstruction_is_deterministic() {
    let geometry = Arc::new(SensorGeometry::from_settings(&SensorSettings::default()).unwrap());
    let n = geometry.n_valid();
    let pairs: Vec<[f32; 2]> = (0..n)
        .map(|i| {
            let t = i as f32 / n as f32;
            [(t * 6.0).sin() * 0.05, (t * 11.0).cos() * 0.05]
        })
        .collect();
    let slopes = SlopeVector::from_pairs(&pairs);

    let settings = ReconstructorSettings::default();
    let first = ReconstructorMethod::Zonal
        .build(Arc::clone(&geometry), &settings)
        .reconstruct(&slopes)
        .unwrap();
    let second = ZonalReconstructor::new(Arc::clone(&geometry), settings.iterations)
        .reconstruct(&slopes)
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(first.rows(), geometry.pupil_width());
}
