use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Dimensions (labels) attached to a data point, ordered by key.
pub type Dimensions = BTreeMap<String, String>;

/// A point in time, in nanoseconds elapsed since 1970-01-01 00:00 UTC.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp from the given number of seconds.
    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Creates a timestamp from the given number of milliseconds.
    pub fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Creates a timestamp from the given number of nanoseconds.
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a timestamp from the given system time.
    pub fn from_system(time: SystemTime) -> Self {
        let duration = time
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default();

        Self(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
    }

    /// Returns the current timestamp.
    #[inline]
    pub fn now() -> Self {
        Self::from_system(SystemTime::now())
    }

    /// Returns the number of nanoseconds since the UNIX epoch.
    pub fn as_nanos(self) -> u64 {
        self.0
    }

    /// Returns the number of fractional seconds since the UNIX epoch.
    pub fn as_secs_f64(self) -> f64 {
        Duration::from_nanos(self.0).as_secs_f64()
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A numeric sample, either an integer or a floating point number.
///
/// Integers and floats keep their representation through delta conversion: two integer samples
/// produce an integer delta, everything else produces a float.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum NumberValue {
    /// A signed 64-bit integer.
    Int(i64),
    /// A 64-bit floating point number.
    Float(f64),
}

impl NumberValue {
    /// Returns the value as a float, converting integers lossily.
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(value) => value as f64,
            Self::Float(value) => value,
        }
    }

    /// Returns `false` for `NaN` and infinite floats.
    pub fn is_finite(self) -> bool {
        match self {
            Self::Int(_) => true,
            Self::Float(value) => value.is_finite(),
        }
    }
}

impl From<i64> for NumberValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for NumberValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl fmt::Display for NumberValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => value.fmt(f),
            Self::Float(value) => value.fmt(f),
        }
    }
}

/// Whether a sum reports increments since the last report or totals since a fixed start.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Temporality {
    /// Every value is the running total since the series started.
    Cumulative,
    /// Every value only covers the interval since the previous report.
    Delta,
}

/// A batch of metrics, as delivered to the converter in one call.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct MetricBatch {
    /// Dimensions describing the entity that produced the metrics, such as the host.
    #[serde(default, skip_serializing_if = "Dimensions::is_empty")]
    pub resource: Dimensions,
    /// Metrics grouped by the instrumentation library that recorded them.
    #[serde(default)]
    pub libraries: Vec<LibraryMetrics>,
}

/// All metrics recorded by one instrumentation library.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct LibraryMetrics {
    /// The name of the instrumentation library, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The metrics of this library.
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

/// A named metric with its data points.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Metric {
    /// The metric name, for example `system.network.packets`.
    pub name: String,
    /// The unit of all values, for example `bytes`. May be empty.
    #[serde(default)]
    pub unit: String,
    /// The data points, shaped by the type of the metric.
    pub data: MetricData,
}

/// The data points of a [`Metric`], one variant per metric type.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricData {
    /// Instantaneous measurements.
    Gauge {
        /// The sampled values.
        points: Vec<NumberPoint>,
    },
    /// Counters and other additive values.
    Sum {
        /// Whether values are running totals or increments.
        temporality: Temporality,
        /// Whether the values can only grow, apart from resets.
        #[serde(default)]
        monotonic: bool,
        /// The sampled values.
        points: Vec<NumberPoint>,
    },
    /// Distributions reported as explicit buckets.
    Histogram {
        /// The sampled distributions.
        points: Vec<HistogramPoint>,
    },
    /// Distributions reported as cumulative sum, count and quantiles.
    Summary {
        /// The sampled distributions.
        points: Vec<SummaryPoint>,
    },
    /// A metric whose data type was never set.
    Empty,
}

impl MetricData {
    /// Returns the name of the metric type for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Gauge { .. } => "Gauge",
            Self::Sum { .. } => "Sum",
            Self::Histogram { .. } => "Histogram",
            Self::Summary { .. } => "Summary",
            Self::Empty => "Empty",
        }
    }
}

/// A single numeric sample.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct NumberPoint {
    /// The time at which the value was observed.
    pub timestamp: Timestamp,
    /// Dimensions identifying the series within the metric.
    #[serde(default, skip_serializing_if = "Dimensions::is_empty")]
    pub dimensions: Dimensions,
    /// The sampled value.
    pub value: NumberValue,
}

/// A single histogram sample.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct HistogramPoint {
    /// The time at which the distribution was observed.
    pub timestamp: Timestamp,
    /// Dimensions identifying the series within the metric.
    #[serde(default, skip_serializing_if = "Dimensions::is_empty")]
    pub dimensions: Dimensions,
    /// The number of values in the distribution.
    pub count: u64,
    /// The sum of all values in the distribution.
    pub sum: f64,
    /// Upper bounds of all buckets but the last, in increasing order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bounds: Vec<f64>,
    /// The number of values per bucket, one more than there are bounds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bucket_counts: Vec<u64>,
}

/// A single summary sample.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct SummaryPoint {
    /// The time at which the summary was observed.
    pub timestamp: Timestamp,
    /// Dimensions identifying the series within the metric.
    #[serde(default, skip_serializing_if = "Dimensions::is_empty")]
    pub dimensions: Dimensions,
    /// The cumulative number of observed values.
    pub count: u64,
    /// The cumulative sum of observed values.
    pub sum: f64,
    /// Values at given quantiles of the latest snapshot.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quantiles: Vec<QuantileValue>,
}

/// The value at a quantile of a summary.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct QuantileValue {
    /// The quantile, either in `[0, 1]` or in percentile notation `[0, 100]`.
    pub quantile: f64,
    /// The observed value at this quantile.
    pub value: f64,
}

/// Statistics of a distribution between two reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct MetricStats {
    /// The smallest observed value, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// The largest observed value, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// The sum of observed values.
    pub sum: f64,
    /// The number of observed values.
    pub count: u64,
}

/// The kind of an output [`DataPoint`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DataPointKind {
    /// A value reported as-is.
    Gauge,
    /// An increment computed from cumulative values.
    Count,
    /// Distribution statistics.
    Stats,
}

/// The [typed value](DataPoint::value) of an output data point.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum DataPointValue {
    /// A value reported as-is. See [`DataPointKind::Gauge`].
    Gauge(NumberValue),
    /// An increment computed from cumulative values. See [`DataPointKind::Count`].
    Count(NumberValue),
    /// Distribution statistics. See [`DataPointKind::Stats`].
    Stats(MetricStats),
}

impl DataPointValue {
    /// Returns the kind of this value.
    pub fn kind(&self) -> DataPointKind {
        match self {
            Self::Gauge(_) => DataPointKind::Gauge,
            Self::Count(_) => DataPointKind::Count,
            Self::Stats(_) => DataPointKind::Stats,
        }
    }
}

/// A converted data point, ready to be handed to a vendor encoder.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct DataPoint {
    /// The metric name.
    pub name: String,
    /// The metric unit. May be empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
    /// The timestamp of the sample this point was computed from.
    pub timestamp: Timestamp,
    /// All dimensions, including resource and library dimensions.
    #[serde(default, skip_serializing_if = "Dimensions::is_empty")]
    pub dimensions: Dimensions,
    /// The typed value.
    #[serde(flatten)]
    pub value: DataPointValue,
}

impl DataPoint {
    /// Returns the kind of this data point.
    pub fn kind(&self) -> DataPointKind {
        self.value.kind()
    }
}

/// The result of converting a [`MetricBatch`].
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Converted {
    /// All emitted data points, in input order.
    pub points: Vec<DataPoint>,
    /// The number of time series that were skipped because they could not be converted.
    pub dropped: usize,
}
