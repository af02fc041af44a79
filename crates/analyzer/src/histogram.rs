//! Elapsed-time distributions.

use crate::AnalyzeError;
use std::collections::BTreeMap;
use std::time::Duration;

/// Default width of a distribution bin.
pub const DEFAULT_BIN_WIDTH: Duration = Duration::from_secs(5);

/// Widest range of bins listed with empty gaps filled in.
pub const MAX_FILLED_BINS: u64 = 1_000;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Highest latency tracked for percentiles: one hour, in microseconds.
const MAX_TRACKED_MICROS: u64 = 3_600_000_000;

/// One bin of the distribution: `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bin {
    pub start: Duration,
    pub end: Duration,
    pub count: u64,
}

/// Fixed-width histogram of elapsed times.
#[derive(Debug, Clone)]
pub struct ElapsedHistogram {
    width: Duration,
    counts: BTreeMap<u64, u64>,
}

impl ElapsedHistogram {
    pub fn new(width: Duration) -> Result<Self, AnalyzeError> {
        if width.is_zero() {
            return Err(AnalyzeError::InvalidBinWidth);
        }
        Ok(Self {
            width,
            counts: BTreeMap::new(),
        })
    }

    pub fn width(&self) -> Duration {
        self.width
    }

    pub fn record(&mut self, elapsed: Duration) {
        let index = u64::try_from(elapsed.as_nanos() / self.width.as_nanos()).unwrap_or(u64::MAX);
        *self.counts.entry(index).or_default() += 1;
    }

    /// Bins from zero through the highest occupied one.
    ///
    /// Empty gaps are included while the range spans at most
    /// [`MAX_FILLED_BINS`] bins; wider ranges list occupied bins only.
    pub fn bins(&self) -> Vec<Bin> {
        let Some((&last, _)) = self.counts.last_key_value() else {
            return Vec::new();
        };
        if last < MAX_FILLED_BINS {
            (0..=last)
                .map(|index| self.bin(index, self.counts.get(&index).copied().unwrap_or(0)))
                .collect()
        } else {
            self.counts
                .iter()
                .map(|(&index, &count)| self.bin(index, count))
                .collect()
        }
    }

    fn bin(&self, index: u64, count: u64) -> Bin {
        let nanos = self.width.as_nanos().saturating_mul(u128::from(index));
        let secs = u64::try_from(nanos / NANOS_PER_SEC).unwrap_or(u64::MAX);
        let start = Duration::new(secs, (nanos % NANOS_PER_SEC) as u32);
        Bin {
            start,
            end: start.saturating_add(self.width),
            count,
        }
    }
}

/// Latency percentiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Percentiles {
    pub p50: Duration,
    pub p90: Duration,
    pub p99: Duration,
}

/// Percentile tracker backed by an HDR histogram at microsecond resolution.
pub struct LatencyTracker {
    histogram: hdrhistogram::Histogram<u64>,
}

impl LatencyTracker {
    pub fn new() -> Result<Self, AnalyzeError> {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, MAX_TRACKED_MICROS, 3)
            .map_err(|e| AnalyzeError::Histogram(e.to_string()))?;
        Ok(Self { histogram })
    }

    /// Values above the tracked range are clamped to it.
    pub fn record(&mut self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros())
            .unwrap_or(u64::MAX)
            .clamp(1, MAX_TRACKED_MICROS);
        self.histogram.saturating_record(micros);
    }

    pub fn percentiles(&self) -> Option<Percentiles> {
        if self.histogram.is_empty() {
            return None;
        }
        let at = |q: f64| Duration::from_micros(self.histogram.value_at_quantile(q));
        Some(Percentiles {
            p50: at(0.50),
            p90: at(0.90),
            p99: at(0.99),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bins_include_empty_gaps() {
        let mut histogram = ElapsedHistogram::new(Duration::from_secs(5)).unwrap();
        histogram.record(Duration::from_millis(1200));
        histogram.record(Duration::from_millis(4999));
        histogram.record(Duration::from_secs(12));

        let bins = histogram.bins();
        assert_eq!(bins.len(), 3);
        assert_eq!(bins[0].count, 2);
        assert_eq!(bins[1].count, 0);
        assert_eq!(bins[2].count, 1);
        assert_eq!(bins[2].start, Duration::from_secs(10));
        assert_eq!(bins[2].end, Duration::from_secs(15));
    }

    #[test]
    fn test_wide_range_lists_occupied_bins_only() {
        let mut histogram = ElapsedHistogram::new(Duration::from_millis(1)).unwrap();
        histogram.record(Duration::from_micros(500));
        histogram.record(Duration::from_secs(20_000));

        let bins = histogram.bins();
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].start, Duration::ZERO);
        assert_eq!(bins[1].start, Duration::from_secs(20_000));
        assert_eq!(bins[1].end, Duration::from_secs(20_000) + Duration::from_millis(1));
        assert_eq!(bins[1].count, 1);
    }

    #[test]
    fn test_bin_start_past_u32_index() {
        let mut histogram = ElapsedHistogram::new(Duration::from_nanos(1)).unwrap();
        let elapsed = Duration::from_secs(10);
        histogram.record(elapsed);

        // index 10^10 does not fit in u32
        let bins = histogram.bins();
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].start, elapsed);
    }

    #[test]
    fn test_zero_width_rejected() {
        assert!(matches!(
            ElapsedHistogram::new(Duration::ZERO),
            Err(AnalyzeError::InvalidBinWidth)
        ));
    }

    #[test]
    fn test_percentiles() {
        let mut tracker = LatencyTracker::new().unwrap();
        assert!(tracker.percentiles().is_none());

        for ms in 1..=100 {
            tracker.record(Duration::from_millis(ms));
        }
        let p = tracker.percentiles().unwrap();
        // three significant digits
        let close = |actual: Duration, expected_ms: u64| {
            let diff = actual.as_micros().abs_diff(expected_ms as u128 * 1000);
            diff <= expected_ms as u128
        };
        assert!(close(p.p50, 50), "p50 {:?}", p.p50);
        assert!(close(p.p90, 90), "p90 {:?}", p.p90);
        assert!(close(p.p99, 99), "p99 {:?}", p.p99);
    }
}
