/// Running mean and RMS of a stream of values (Welford).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    sum_sq: f64,
}

impl RunningStats {
    /// Add one value.
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.sum_sq += value * value;
    }

    /// Values seen.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean of all values.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Root mean square of all values.
    pub fn rms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum_sq / self.count as f64).sqrt()
        }
    }

    /// Population standard deviation of all values.
    pub fn std(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).sqrt()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_rms_std() {
        let mut stats = RunningStats::default();
        for v in [1.0, 3.0] {
            stats.push(v);
        }
        assert_eq!(stats.count(), 2);
        assert!((stats.mean() - 2.0).abs() < 1e-12);
        assert!((stats.rms() - 5.0f64.sqrt()).abs() < 1e-12);
        assert!((stats.std() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty() {
        let stats = RunningStats::default();
        assert_eq!(stats.rms(), 0.0);
        assert_eq!(stats.std(), 0.0);
    }
}
