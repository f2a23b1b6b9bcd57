use std::time::Duration;

use crate::operation::OperationResult;

/// Running totals over every recorded result.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Counter {
    pub total:    u64,
    pub success:  u64,
    pub failed:   u64,
    pub reads:    u64,
    pub writes:   u64,
    pub duration: Duration,
    pub min:      Option<Duration>,
    pub max:      Duration,
}

impl Counter {
    /// Mean latency, zero when nothing was recorded.
    pub fn mean(&self) -> Duration {
        match u32::try_from(self.total) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.duration / n,
            Err(_) => Duration::from_secs_f64(self.duration.as_secs_f64() / self.total as f64),
        }
    }

    /// Failed operations as a percentage of all operations.
    pub fn error_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.failed as f64 / self.total as f64 * 100.0
    }
}

impl std::ops::AddAssign<&OperationResult> for Counter {
    fn add_assign(&mut self, res: &OperationResult) {
        self.total += 1;
        if res.success {
            self.success += 1;
        } else {
            self.failed += 1;
        }
        if res.is_read {
            self.reads += 1;
        } else {
            self.writes += 1;
        }
        self.duration += res.duration;
        self.min = Some(self.min.map_or(res.duration, |m| m.min(res.duration)));
        self.max = self.max.max(res.duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_outcomes_and_extremes() {
        let mut c = Counter::default();
        c += &OperationResult::success(Duration::from_millis(4), true);
        c += &OperationResult::failure(Duration::from_millis(2), false, "x");
        c += &OperationResult::success(Duration::from_millis(6), false);

        assert_eq!((c.total, c.success, c.failed), (3, 2, 1));
        assert_eq!((c.reads, c.writes), (1, 2));
        assert_eq!(c.min, Some(Duration::from_millis(2)));
        assert_eq!(c.max, Duration::from_millis(6));
        assert_eq!(c.mean(), Duration::from_millis(4));
        assert!((c.error_rate() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_counter_has_zero_rates() {
        let c = Counter::default();
        assert_eq!(c.mean(), Duration::ZERO);
        assert_eq!(c.error_rate(), 0.0);
    }
}
