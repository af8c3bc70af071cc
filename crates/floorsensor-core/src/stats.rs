//! Cycle duration statistics

use std::time::Duration;

/// Running statistics over completed poll cycles.
///
/// The first cycle is counted but excluded from min/max, since it pays for
/// adapter warm-up and the initial scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub count: u64,
    pub min: Option<Duration>,
    pub max: Option<Duration>,
}

impl CycleStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the duration of a completed cycle
    pub fn record(&mut self, duration: Duration) {
        if self.count > 0 {
            self.min = Some(self.min.map_or(duration, |min| min.min(duration)));
            self.max = Some(self.max.map_or(duration, |max| max.max(duration)));
        }
        self.count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_cycle_excluded() {
        let mut stats = CycleStats::new();
        stats.record(Duration::from_millis(5000));

        assert_eq!(stats.count, 1);
        assert_eq!(stats.min, None);
        assert_eq!(stats.max, None);
    }

    #[test]
    fn test_min_max_from_second_cycle() {
        let mut stats = CycleStats::new();
        stats.record(Duration::from_millis(5000));
        stats.record(Duration::from_millis(300));
        stats.record(Duration::from_millis(700));
        stats.record(Duration::from_millis(400));

        assert_eq!(stats.count, 4);
        assert_eq!(stats.min, Some(Duration::from_millis(300)));
        assert_eq!(stats.max, Some(Duration::from_millis(700)));
    }
}
