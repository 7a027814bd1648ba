//! Conversion of cumulative samples into deltas.
//!
//! A [`CumulativeCalculator`] remembers the last sample of every series in a [`TtlMap`] and
//! computes the increment of each new sample against it. Samples that are not newer than the last
//! sample are out of order and yield no delta. Samples that are smaller than the last sample
//! indicate a restarted counter; their full value is the delta.

use std::sync::Arc;

use crate::key::MetricKey;
use crate::protocol::{NumberValue, Timestamp};
use crate::ttl::{SweepHandle, TtlConfig, TtlMap};

/// A value that accumulates over time and can be turned into increments.
pub trait Cumulative: Clone {
    /// Returns `true` if `self` cannot follow `previous` without the source having restarted.
    fn is_reset(&self, previous: &Self) -> bool;

    /// Returns the increment from `previous` to `self`.
    ///
    /// Only called if [`is_reset`](Self::is_reset) returned `false`.
    fn delta(&self, previous: &Self) -> Self;
}

impl Cumulative for NumberValue {
    fn is_reset(&self, previous: &Self) -> bool {
        match (*self, *previous) {
            (Self::Int(value), Self::Int(previous)) => value < previous,
            (value, previous) => value.as_f64() < previous.as_f64(),
        }
    }

    fn delta(&self, previous: &Self) -> Self {
        match (*self, *previous) {
            (Self::Int(value), Self::Int(previous)) => Self::Int(value.saturating_sub(previous)),
            (value, previous) => Self::Float(value.as_f64() - previous.as_f64()),
        }
    }
}

/// The last observed sample of a series.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimestampedValue<V> {
    /// The time of the observation.
    pub timestamp: Timestamp,
    /// The cumulative value at that time.
    pub value: V,
}

/// How a [`Delta`] relates to the previous sample of its series.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DeltaKind {
    /// The first sample of a series, or the first after its state expired.
    ///
    /// The delta is the sample's full value.
    Initial,
    /// The sample is smaller than the previous one, so the source restarted.
    ///
    /// The delta is the sample's full value.
    Reset,
    /// The increment since the previous sample.
    Increment,
}

impl DeltaKind {
    /// Returns `true` for deltas that carry a full cumulative value instead of an increment.
    pub fn is_baseline(self) -> bool {
        matches!(self, Self::Initial | Self::Reset)
    }
}

/// The result of a successful delta calculation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Delta<V> {
    /// The computed delta.
    pub value: V,
    /// How the delta was computed.
    pub kind: DeltaKind,
    /// The timestamp of the previous sample, if there was one.
    pub start: Option<Timestamp>,
}

/// Computes deltas from cumulative values, keyed by series.
#[derive(Debug)]
pub struct CumulativeCalculator<V> {
    name: &'static str,
    state: Arc<TtlMap<MetricKey, TimestampedValue<V>>>,
}

impl<V: Cumulative> CumulativeCalculator<V> {
    /// Creates a calculator with an empty state store.
    ///
    /// The name identifies the store in logs.
    pub fn new(name: &'static str, config: &TtlConfig) -> Self {
        Self {
            name,
            state: Arc::new(TtlMap::new(config)),
        }
    }

    /// Computes the delta of `value` against the last sample of the series `key`.
    ///
    /// Returns `None` if the sample is not newer than the last sample. In that case the state is
    /// not updated. Otherwise, the sample becomes the new last sample of the series.
    pub fn calculate(&self, key: &MetricKey, timestamp: Timestamp, value: V) -> Option<Delta<V>> {
        self.state.update(key, |previous| {
            let Some(previous) = previous else {
                let delta = Delta {
                    value: value.clone(),
                    kind: DeltaKind::Initial,
                    start: None,
                };

                return (Some(TimestampedValue { timestamp, value }), Some(delta));
            };

            if timestamp <= previous.timestamp {
                tally_log::debug!(
                    store = self.name,
                    key = %key,
                    timestamp = %timestamp,
                    previous = %previous.timestamp,
                    "dropped out-of-order sample"
                );
                return (None, None);
            }

            let delta = if value.is_reset(&previous.value) {
                tally_log::debug!(store = self.name, key = %key, "detected counter reset");
                Delta {
                    value: value.clone(),
                    kind: DeltaKind::Reset,
                    start: Some(previous.timestamp),
                }
            } else {
                Delta {
                    value: value.delta(&previous.value),
                    kind: DeltaKind::Increment,
                    start: Some(previous.timestamp),
                }
            };

            (Some(TimestampedValue { timestamp, value }), Some(delta))
        })
    }

    /// Returns the live last sample of the series `key`.
    pub fn last(&self, key: &MetricKey) -> Option<TimestampedValue<V>> {
        self.state.get(key)
    }

    /// Returns the number of stored series, including expired ones that were not swept yet.
    pub fn len(&self) -> usize {
        self.state.len()
    }

    /// Returns `true` if no series are stored.
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Starts sweeping expired series in the background.
    ///
    /// See [`TtlMap::spawn_sweeper`].
    pub fn spawn_sweeper(&self) -> Option<SweepHandle>
    where
        V: Send + 'static,
    {
        self.state.spawn_sweeper(self.name)
    }
}

/// Computes deltas of cumulative sums and counters.
pub type DeltaCalculator = CumulativeCalculator<NumberValue>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use similar_asserts::assert_eq;

    use super::*;
    use crate::protocol::Dimensions;

    fn calculator() -> DeltaCalculator {
        DeltaCalculator::new("deltas", &TtlConfig::default())
    }

    fn key() -> MetricKey {
        MetricKey::new("metric.example", Dimensions::new())
    }

    fn secs(secs: u64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    #[test]
    fn test_first_sample_is_its_own_delta() {
        tally_test::setup();
        let calculator = calculator();

        let delta = calculator.calculate(&key(), secs(0), NumberValue::Int(-17));
        assert_eq!(
            delta,
            Some(Delta {
                value: NumberValue::Int(-17),
                kind: DeltaKind::Initial,
                start: None,
            })
        );

        let delta = calculator.calculate(&key(), secs(1), NumberValue::Int(1));
        assert_eq!(
            delta,
            Some(Delta {
                value: NumberValue::Int(18),
                kind: DeltaKind::Increment,
                start: Some(secs(0)),
            })
        );
    }

    #[test]
    fn test_float_deltas() {
        tally_test::setup();
        let calculator = calculator();

        let first = calculator.calculate(&key(), secs(0), NumberValue::Float(0.4));
        assert_eq!(first.unwrap().value, NumberValue::Float(0.4));

        let second = calculator
            .calculate(&key(), secs(1), NumberValue::Float(0.5))
            .unwrap();
        assert!((second.value.as_f64() - 0.1).abs() < 1e-9);
        assert_eq!(second.kind, DeltaKind::Increment);
    }

    #[test]
    fn test_monotonic_sum_of_deltas() {
        tally_test::setup();
        let calculator = calculator();
        let increments = [1, 2, 200, 3, 7, 0];

        let mut cumulative = 0;
        let mut total = 0;
        calculator.calculate(&key(), secs(0), NumberValue::Int(cumulative));

        for (i, increment) in increments.into_iter().enumerate() {
            cumulative += increment;
            let delta = calculator
                .calculate(&key(), secs(i as u64 + 1), NumberValue::Int(cumulative))
                .unwrap();

            assert_eq!(delta.value, NumberValue::Int(increment));
            if let NumberValue::Int(value) = delta.value {
                total += value;
            }
        }

        assert_eq!(total, cumulative);
    }

    #[test]
    fn test_reset() {
        tally_test::setup();
        let calculator = calculator();

        let kinds: Vec<_> = [0, 30, 0, 20]
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                let delta = calculator.calculate(&key(), secs(i as u64), NumberValue::Int(value));
                delta.map(|delta| (delta.kind, delta.value))
            })
            .collect();

        assert_eq!(
            kinds,
            vec![
                Some((DeltaKind::Initial, NumberValue::Int(0))),
                Some((DeltaKind::Increment, NumberValue::Int(30))),
                Some((DeltaKind::Reset, NumberValue::Int(0))),
                Some((DeltaKind::Increment, NumberValue::Int(20))),
            ]
        );
    }

    #[test]
    fn test_out_of_order() {
        tally_test::setup();
        let calculator = calculator();

        let stamps = [1, 0, 2, 3];
        let values = [0.0, 1.0, 2.0, 3.0];

        let deltas: Vec<_> = stamps
            .into_iter()
            .zip(values)
            .map(|(stamp, value)| {
                calculator
                    .calculate(&key(), secs(stamp), NumberValue::Float(value))
                    .map(|delta| delta.value)
            })
            .collect();

        assert_eq!(
            deltas,
            vec![
                Some(NumberValue::Float(0.0)),
                None,
                Some(NumberValue::Float(2.0)),
                Some(NumberValue::Float(1.0)),
            ]
        );
    }

    #[test]
    fn test_duplicate_timestamp_keeps_state() {
        tally_test::setup();
        let calculator = calculator();

        calculator.calculate(&key(), secs(1), NumberValue::Int(5));
        assert_eq!(calculator.calculate(&key(), secs(1), NumberValue::Int(9)), None);

        let last = calculator.last(&key()).unwrap();
        assert_eq!(last.value, NumberValue::Int(5));
    }

    #[test]
    fn test_dimensions_are_independent() {
        tally_test::setup();
        let calculator = calculator();
        let plain = key();
        let tagged = MetricKey::new("metric.example", [("key1", "valA")]);

        calculator.calculate(&plain, secs(0), NumberValue::Int(0));
        calculator.calculate(&tagged, secs(0), NumberValue::Int(0));

        let plain_delta = calculator.calculate(&plain, secs(1), NumberValue::Int(20));
        let tagged_delta = calculator.calculate(&tagged, secs(1), NumberValue::Int(30));

        assert_eq!(plain_delta.unwrap().value, NumberValue::Int(20));
        assert_eq!(tagged_delta.unwrap().value, NumberValue::Int(30));
        assert_eq!(calculator.len(), 2);
    }

    #[test]
    fn test_mixed_int_and_float() {
        tally_test::setup();
        let calculator = calculator();

        calculator.calculate(&key(), secs(0), NumberValue::Int(4));
        let delta = calculator.calculate(&key(), secs(1), NumberValue::Float(4.5));

        assert_eq!(delta.unwrap().value, NumberValue::Float(0.5));
    }

    #[test]
    fn test_integer_delta_saturates() {
        tally_test::setup();
        let calculator = calculator();

        calculator.calculate(&key(), secs(0), NumberValue::Int(i64::MIN));
        let delta = calculator.calculate(&key(), secs(1), NumberValue::Int(i64::MAX));

        assert_eq!(delta.unwrap().value, NumberValue::Int(i64::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_state_restarts_series() {
        tally_test::setup();
        let calculator = DeltaCalculator::new(
            "deltas",
            &TtlConfig {
                sweep_interval: 0,
                max_age: 60,
            },
        );

        calculator.calculate(&key(), secs(0), NumberValue::Int(10));
        tokio::time::advance(Duration::from_secs(61)).await;

        let delta = calculator
            .calculate(&key(), secs(1), NumberValue::Int(15))
            .unwrap();
        assert_eq!(delta.kind, DeltaKind::Initial);
        assert_eq!(delta.value, NumberValue::Int(15));
    }
}
