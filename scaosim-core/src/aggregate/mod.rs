//! Residual error between true and reconstructed phase.
//!
//! The aggregator pairs the most recent reconstruction with the most
//! recent truth. It never matches generation numbers across channels;
//! publish timestamps give the skew between the two samples instead.
//! A report is produced only when the reconstruction generation has
//! advanced since the last report.

mod stats;

pub use stats::RunningStats;

use crate::error::{Result, ScaoError};
use crate::exchange::{Channel, Sample};
use crate::payload::{Payload, PhaseMap};
use crate::types::Generation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Statistic of the residual over the pupil.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualStatistic {
    /// Root mean square of the residual.
    #[default]
    Rms,
    /// Standard deviation of the residual (RMS after removing its mean).
    PistonRemovedRms,
}

impl ResidualStatistic {
    /// Compute over the pixels where `pupil` is set.
    pub fn compute(self, truth: &[f32], recon: &[f32], pupil: &[bool]) -> f64 {
        let residuals = truth
            .iter()
            .zip(recon)
            .zip(pupil)
            .filter(|(_, p)| **p)
            .map(|((&t, &r), _)| f64::from(t) - f64::from(r));

        let mut n = 0usize;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for d in residuals {
            n += 1;
            sum += d;
            sum_sq += d * d;
        }
        if n == 0 {
            return 0.0;
        }
        let n = n as f64;
        match self {
            Self::Rms => (sum_sq / n).sqrt(),
            Self::PistonRemovedRms => {
                let mean = sum / n;
                (sum_sq / n - mean * mean).max(0.0).sqrt()
            }
        }
    }

    /// Config name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rms => "rms",
            Self::PistonRemovedRms => "piston_removed_rms",
        }
    }
}

impl fmt::Display for ResidualStatistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the aggregator is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    /// At least one channel has not produced a sample yet.
    WaitingForBoth,
    /// Both channels have data; waiting for a new reconstruction.
    Aligned,
    /// The last observation produced a report.
    Reported,
}

/// One residual measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualReport {
    /// Truth generation used.
    pub truth_generation: Generation,
    /// Reconstruction generation used.
    pub recon_generation: Generation,
    /// Residual statistic in microns.
    pub residual: f64,
    /// Distance between the two publish timestamps.
    pub skew: Duration,
    /// Skew exceeded the configured bound.
    pub stale: bool,
    /// Mean of all residuals reported so far.
    pub running_mean: f64,
    /// RMS of all residuals reported so far.
    pub running_rms: f64,
    /// Reports produced so far, including this one.
    pub reports: u64,
}

/// Pairs truth and reconstruction samples into residual reports.
#[derive(Debug, Clone)]
pub struct PerformanceAggregator {
    pupil: Vec<bool>,
    statistic: ResidualStatistic,
    max_skew: Option<Duration>,
    state: AggregatorState,
    last_truth: Generation,
    last_recon: Generation,
    stats: RunningStats,
}

impl PerformanceAggregator {
    /// Create over `pupil` (row-major, phase grid sized).
    pub fn new(pupil: Vec<bool>, statistic: ResidualStatistic, max_skew: Option<Duration>) -> Self {
        Self {
            pupil,
            statistic,
            max_skew,
            state: AggregatorState::WaitingForBoth,
            last_truth: Generation::UNWRITTEN,
            last_recon: Generation::UNWRITTEN,
            stats: RunningStats::default(),
        }
    }

    /// Feed the latest sample of each channel, `None` if not yet written.
    ///
    /// Returns a report only if the reconstruction generation advanced
    /// since the last report. Once both channels have data the aggregator
    /// is `Aligned` before any report is attempted, so a first call that
    /// reports goes `WaitingForBoth -> Aligned -> Reported` and one that
    /// fails the shape check stays `Aligned`.
    pub fn observe(
        &mut self,
        truth: Option<&Sample<PhaseMap>>,
        recon: Option<&Sample<PhaseMap>>,
    ) -> Result<Option<ResidualReport>> {
        let (Some(truth), Some(recon)) = (truth, recon) else {
            if self.state != AggregatorState::WaitingForBoth {
                self.state = AggregatorState::Aligned;
            }
            return Ok(None);
        };

        self.state = AggregatorState::Aligned;
        if recon.generation <= self.last_recon {
            return Ok(None);
        }

        let (t, r) = (&truth.payload, &recon.payload);
        if (t.rows(), t.cols()) != (r.rows(), r.cols()) || t.as_slice().len() != self.pupil.len() {
            return Err(ScaoError::ShapeMismatch {
                channel: Channel::ReconstructedPhase.name().to_string(),
                expected: t.shape(),
                actual: r.shape(),
            });
        }

        let residual = self.statistic.compute(t.as_slice(), r.as_slice(), &self.pupil);
        let skew = truth.timestamp.abs_diff(recon.timestamp);
        let stale = self.max_skew.is_some_and(|limit| skew > limit);

        self.stats.push(residual);
        self.last_truth = truth.generation;
        self.last_recon = recon.generation;
        self.state = AggregatorState::Reported;

        Ok(Some(ResidualReport {
            truth_generation: truth.generation,
            recon_generation: recon.generation,
            residual,
            skew,
            stale,
            running_mean: self.stats.mean(),
            running_rms: self.stats.rms(),
            reports: self.stats.count(),
        }))
    }

    /// Current state.
    pub fn state(&self) -> AggregatorState {
        self.state
    }

    /// Reconstruction generation of the last report.
    pub fn last_recon_generation(&self) -> Generation {
        self.last_recon
    }

    /// Truth generation of the last report.
    pub fn last_truth_generation(&self) -> Generation {
        self.last_truth
    }

    /// Statistic in use.
    pub fn statistic(&self) -> ResidualStatistic {
        self.statistic
    }

    /// Running statistics of all reports.
    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;

    fn sample(values: Vec<f32>, generation: u64, at_ms: u64) -> Sample<PhaseMap> {
        let n = values.len();
        Sample {
            payload: PhaseMap::from_vec(1, n, values).unwrap(),
            generation: Generation::new(generation),
            timestamp: Timestamp::from_nanos(at_ms * 1_000_000),
        }
    }

    #[test]
    fn statistics() {
        let pupil = [true, true, true, false];
        let truth = [1.0, 1.0, 1.0, 50.0];
        let recon = [0.0, 0.0, 0.0, 0.0];
        assert!((ResidualStatistic::Rms.compute(&truth, &recon, &pupil) - 1.0).abs() < 1e-12);
        assert_eq!(
            ResidualStatistic::PistonRemovedRms.compute(&truth, &recon, &pupil),
            0.0
        );
    }

    #[test]
    fn waits_for_both_channels() {
        let mut agg = PerformanceAggregator::new(vec![true; 2], ResidualStatistic::Rms, None);
        let truth = sample(vec![0.0, 0.0], 1, 0);
        assert!(agg.observe(Some(&truth), None).unwrap().is_none());
        assert_eq!(agg.state(), AggregatorState::WaitingForBoth);
        let recon = sample(vec![0.0, 0.0], 1, 0);
        assert!(agg.observe(None, Some(&recon)).unwrap().is_none());
        assert_eq!(agg.state(), AggregatorState::WaitingForBoth);
    }

    #[test]
    fn both_channels_align_before_reporting() {
        let mut agg = PerformanceAggregator::new(vec![true; 2], ResidualStatistic::Rms, None);
        let truth = sample(vec![1.0, 1.0], 1, 0);

        // Both present but the shapes disagree: aligned, nothing reported.
        let wide = sample(vec![0.0, 0.0, 0.0], 1, 0);
        assert!(agg.observe(Some(&truth), Some(&wide)).is_err());
        assert_eq!(agg.state(), AggregatorState::Aligned);

        let recon = sample(vec![0.0, 0.0], 2, 0);
        assert!(agg.observe(Some(&truth), Some(&recon)).unwrap().is_some());
        assert_eq!(agg.state(), AggregatorState::Reported);

        // Losing a channel after a report falls back to Aligned.
        assert!(agg.observe(None, Some(&recon)).unwrap().is_none());
        assert_eq!(agg.state(), AggregatorState::Aligned);
    }

    #[test]
    fn one_report_per_reconstruction_generation() {
        let mut agg = PerformanceAggregator::new(vec![true; 2], ResidualStatistic::Rms, None);
        let recon = sample(vec![0.0, 0.0], 3, 10);

        let first = agg
            .observe(Some(&sample(vec![1.0, 1.0], 10, 10)), Some(&recon))
            .unwrap()
            .unwrap();
        assert_eq!(first.recon_generation, Generation::new(3));
        assert_eq!(agg.state(), AggregatorState::Reported);

        // Truth moves on, reconstruction does not: nothing new to report.
        assert!(
            agg.observe(Some(&sample(vec![2.0, 2.0], 11, 12)), Some(&recon))
                .unwrap()
                .is_none()
        );
        assert_eq!(agg.state(), AggregatorState::Aligned);

        let next = sample(vec![0.0, 0.0], 4, 14);
        let second = agg
            .observe(Some(&sample(vec![2.0, 2.0], 12, 14)), Some(&next))
            .unwrap()
            .unwrap();
        assert_eq!(second.reports, 2);
        assert!((second.residual - 2.0).abs() < 1e-12);
        assert!((second.running_mean - 1.5).abs() < 1e-12);
    }

    #[test]
    fn skew_marks_stale() {
        let mut agg = PerformanceAggregator::new(
            vec![true],
            ResidualStatistic::Rms,
            Some(Duration::from_millis(5)),
        );
        let report = agg
            .observe(Some(&sample(vec![0.0], 1, 100)), Some(&sample(vec![0.0], 1, 90)))
            .unwrap()
            .unwrap();
        assert_eq!(report.skew, Duration::from_millis(10));
        assert!(report.stale);
    }

    #[test]
    fn mismatched_maps_are_rejected() {
        let mut agg = PerformanceAggregator::new(vec![true; 2], ResidualStatistic::Rms, None);
        let err = agg
            .observe(Some(&sample(vec![0.0, 0.0], 1, 0)), Some(&sample(vec![0.0; 3], 1, 0)))
            .unwrap_err();
        assert!(matches!(err, ScaoError::ShapeMismatch { .. }));
    }
}
