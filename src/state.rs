use serde::Serialize;

/// One row for the sink. The timestamp is assigned by the database at insert.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub cpu_usage_percent: Option<f64>,
    pub memory: MemoryStat,
    pub disk: DiskStat,
    pub net: NetStat,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryStat {
    pub ram_total_mb: Option<u64>,
    pub ram_used_mb: Option<u64>,
    pub ram_free_mb: Option<u64>,
    pub ram_available_mb: Option<u64>,
    pub ram_cache_mb: Option<u64>,
    pub ram_usage_percent: Option<f64>,
    pub swap_total_mb: Option<u64>,
    pub swap_used_mb: Option<u64>,
    pub swap_free_mb: Option<u64>,
    pub swap_usage_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiskStat {
    pub total_gb: f64,
    pub used_gb: f64,
    pub usage_percent: Option<f64>,
}

/// Cumulative since boot, summed over every interface except `lo`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetStat {
    pub rx_mb: u64,
    pub tx_mb: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub total: u64,
    pub idle: u64,
}

/// Turns successive cumulative tick readings into a busy percentage.
#[derive(Debug, Clone, Copy)]
pub struct CpuUsageTracker {
    prev: CpuTimes,
}

impl CpuUsageTracker {
    pub fn new(baseline: CpuTimes) -> Self {
        Self { prev: baseline }
    }

    /// The baseline always moves to `current`, even when no percentage can be
    /// derived (no ticks elapsed, or counters went backwards after a reset).
    pub fn update(&mut self, current: CpuTimes) -> Option<f64> {
        let dt_total = current.total as i128 - self.prev.total as i128;
        let dt_idle = current.idle as i128 - self.prev.idle as i128;
        self.prev = current;

        if dt_total <= 0 {
            return None;
        }
        let busy = 1.0 - (dt_idle as f64 / dt_total as f64);
        Some(round_to(busy * 100.0, 1))
    }

    #[cfg(test)]
    pub fn baseline(&self) -> CpuTimes {
        self.prev
    }
}

/// Halves go to the even neighbour, so `0.25` becomes `0.2`.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

/// `part / whole * 100` rounded to one decimal; absent when either side is
/// unknown or the denominator is zero.
pub fn usage_percent(part: Option<u64>, whole: Option<u64>) -> Option<f64> {
    match (part, whole) {
        (Some(part), Some(whole)) if whole > 0 => {
            Some(round_to(part as f64 / whole as f64 * 100.0, 1))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn times(total: u64, idle: u64) -> CpuTimes {
        CpuTimes { total, idle }
    }

    #[test]
    fn cpu_percent_from_tick_delta() {
        let mut tracker = CpuUsageTracker::new(times(10_000, 4_000));
        let pct = tracker.update(times(11_000, 4_250));
        assert_eq!(pct, Some(75.0));
        assert_eq!(tracker.baseline(), times(11_000, 4_250));
    }

    #[test]
    fn zero_elapsed_ticks_is_absent_but_baseline_advances() {
        let mut tracker = CpuUsageTracker::new(times(5_000, 1_000));
        assert_eq!(tracker.update(times(5_000, 1_200)), None);
        assert_eq!(tracker.baseline(), times(5_000, 1_200));

        assert_eq!(tracker.update(times(6_000, 1_700)), Some(50.0));
    }

    #[test]
    fn counter_reset_yields_absent() {
        let mut tracker = CpuUsageTracker::new(times(900_000, 400_000));
        assert_eq!(tracker.update(times(1_000, 500)), None);
        assert_eq!(tracker.baseline(), times(1_000, 500));
    }

    #[test]
    fn usage_percent_rules() {
        assert_eq!(usage_percent(Some(586), Some(977)), Some(60.0));
        assert_eq!(usage_percent(Some(0), Some(977)), Some(0.0));
        assert_eq!(usage_percent(None, Some(977)), None);
        assert_eq!(usage_percent(Some(5), None), None);
        assert_eq!(usage_percent(Some(0), Some(0)), None);
    }

    #[test]
    fn round_to_keeps_requested_precision() {
        assert_eq!(round_to(74.871, 1), 74.9);
        assert_eq!(round_to(1.234_567_89, 6), 1.234_568);
    }

    #[test]
    fn ties_round_to_even() {
        assert_eq!(round_to(0.25, 1), 0.2);
        assert_eq!(usage_percent(Some(1), Some(400)), Some(0.2));
        assert_eq!(usage_percent(Some(3), Some(400)), Some(0.8));
    }
}
