use crate::delta::{Cumulative, CumulativeCalculator, Delta};
use crate::key::MetricKey;
use crate::protocol::{QuantileValue, Timestamp};
use crate::ttl::{SweepHandle, TtlConfig};

/// The cumulative sum and count of a summary.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SummarySnapshot {
    /// The sum of all observed values.
    pub sum: f64,
    /// The number of observed values.
    pub count: u64,
}

impl Cumulative for SummarySnapshot {
    /// A summary has restarted when it has seen fewer values than before.
    fn is_reset(&self, previous: &Self) -> bool {
        self.count < previous.count
    }

    fn delta(&self, previous: &Self) -> Self {
        Self {
            sum: self.sum - previous.sum,
            count: self.count - previous.count,
        }
    }
}

/// The increment of a summary between two reports.
pub type SummaryDelta = Delta<SummarySnapshot>;

/// Computes the increments of cumulative summaries, keyed by series.
#[derive(Debug)]
pub struct SummaryCalculator {
    inner: CumulativeCalculator<SummarySnapshot>,
}

impl SummaryCalculator {
    /// Creates a calculator with an empty state store.
    pub fn new(config: &TtlConfig) -> Self {
        Self {
            inner: CumulativeCalculator::new("summaries", config),
        }
    }

    /// Computes the sum and count observed since the last report of the series `key`.
    ///
    /// Follows the same ordering and reset rules as [`DeltaCalculator`](crate::DeltaCalculator).
    /// A decreasing count marks a reset, in which case the new cumulative values are the delta.
    pub fn calculate_delta(
        &self,
        key: &MetricKey,
        timestamp: Timestamp,
        sum: f64,
        count: u64,
    ) -> Option<SummaryDelta> {
        self.inner
            .calculate(key, timestamp, SummarySnapshot { sum, count })
    }

    /// Returns the number of stored series, including expired ones that were not swept yet.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if no series are stored.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Starts sweeping expired series in the background.
    pub fn spawn_sweeper(&self) -> Option<SweepHandle> {
        self.inner.spawn_sweeper()
    }
}

/// Extracts the minimum and maximum from the quantiles of a summary snapshot.
///
/// Quantile `0` is the minimum. Quantile `1`, or `100` in percentile notation, is the maximum. If
/// those are not reported, the smallest and largest reported values are used instead.
pub fn quantile_bounds(quantiles: &[QuantileValue]) -> (Option<f64>, Option<f64>) {
    let exact = |predicate: fn(f64) -> bool| {
        quantiles
            .iter()
            .find(|q| predicate(q.quantile))
            .map(|q| q.value)
    };

    let min = exact(|q| q == 0.0).or_else(|| quantiles.iter().map(|q| q.value).reduce(f64::min));
    let max = exact(|q| q == 1.0 || q == 100.0)
        .or_else(|| quantiles.iter().map(|q| q.value).reduce(f64::max));

    (min, max)
}
