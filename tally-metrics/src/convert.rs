use std::error::Error;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::delta::{DeltaCalculator, DeltaKind};
use crate::key::MetricKey;
use crate::protocol::{
    Converted, DataPoint, DataPointValue, Dimensions, HistogramPoint, Metric, MetricBatch,
    MetricData, MetricStats, NumberPoint, NumberValue, SummaryPoint, Temporality, Timestamp,
};
use crate::summary::{SummaryCalculator, quantile_bounds};
use crate::ttl::{SweepHandle, TtlConfig};

/// Dimension carrying the name of the instrumentation library.
pub const LIBRARY_DIMENSION: &str = "oTelLib";

/// Dimension carrying the bucket index of a histogram bucket count.
pub const BUCKET_INDEX_DIMENSION: &str = "bucket_idx";

/// Appended to histogram names for per-bucket count points.
const BUCKET_COUNT_SUFFIX: &str = ".count_per_bucket";

/// What to emit for the first sample of a series and for samples after a reset.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselinePolicy {
    /// Emit the full cumulative value as the delta.
    #[default]
    Report,
    /// Only record the value as new baseline and emit nothing.
    Suppress,
}

/// Error returned when parsing an unknown [`BaselinePolicy`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParseBaselinePolicyError;

impl fmt::Display for ParseBaselinePolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("expected either report or suppress")
    }
}

impl Error for ParseBaselinePolicyError {}

impl FromStr for BaselinePolicy {
    type Err = ParseBaselinePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "report" => Ok(Self::Report),
            "suppress" => Ok(Self::Suppress),
            _ => Err(ParseBaselinePolicyError),
        }
    }
}

/// Configuration for the [`Converter`].
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Expiry of per-series state.
    pub ttl: TtlConfig,

    /// Handling of initial and reset samples of cumulative series.
    ///
    /// Defaults to [`BaselinePolicy::Report`].
    pub baseline: BaselinePolicy,

    /// Emit one gauge per histogram bucket in addition to sum and count.
    ///
    /// Defaults to `false`.
    pub histogram_buckets: bool,

    /// Add the batch's resource dimensions to every data point.
    ///
    /// Point dimensions take precedence over resource dimensions of the same name. Defaults to
    /// `false`.
    pub resource_dimensions: bool,
}

/// Dimensions shared by all points of one instrumentation library.
struct Scope<'a> {
    resource: Option<&'a Dimensions>,
    library: Option<&'a str>,
}

impl Scope<'_> {
    fn dimensions(&self, point: &Dimensions) -> Dimensions {
        let mut dimensions = self.resource.cloned().unwrap_or_default();
        dimensions.extend(point.iter().map(|(k, v)| (k.clone(), v.clone())));

        if let Some(library) = self.library {
            dimensions.insert(LIBRARY_DIMENSION.to_owned(), library.to_owned());
        }

        dimensions
    }
}

/// Converts metric batches into data points, turning cumulative values into deltas.
///
/// The converter owns the state of all cumulative series it has seen. Use one converter per
/// destination, and keep it alive for as long as batches arrive, so that deltas can be computed
/// across batches.
///
/// Points are handled by metric type:
///
///  - Gauges, delta sums and non-monotonic sums are passed through as gauges.
///  - Cumulative monotonic sums are converted to counts through a [`DeltaCalculator`].
///  - Histograms are passed through as statistics, optionally with one gauge per bucket.
///  - Summaries are converted to statistics of the increment through a [`SummaryCalculator`].
///  - Metrics without data type are dropped.
///
/// Points with non-finite values are dropped. All dropped time series are counted in
/// [`Converted::dropped`].
#[derive(Debug)]
pub struct Converter {
    config: ConverterConfig,
    deltas: DeltaCalculator,
    summaries: SummaryCalculator,
}

impl Converter {
    /// Creates a converter with empty state.
    pub fn new(config: ConverterConfig) -> Self {
        Self {
            deltas: DeltaCalculator::new("deltas", &config.ttl),
            summaries: SummaryCalculator::new(&config.ttl),
            config,
        }
    }

    /// Returns the configuration of this converter.
    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Returns the calculator used for cumulative sums.
    pub fn deltas(&self) -> &DeltaCalculator {
        &self.deltas
    }

    /// Returns the calculator used for summaries.
    pub fn summaries(&self) -> &SummaryCalculator {
        &self.summaries
    }

    /// Converts all metrics of a batch.
    ///
    /// This never fails. Metrics and points that cannot be converted are skipped and counted.
    pub fn convert(&self, batch: &MetricBatch) -> Converted {
        let mut output = Converted::default();

        for library in &batch.libraries {
            let scope = Scope {
                resource: Some(&batch.resource).filter(|_| self.config.resource_dimensions),
                library: library.name.as_deref().filter(|name| !name.is_empty()),
            };

            for metric in &library.metrics {
                self.convert_metric(&scope, metric, &mut output);
            }
        }

        output
    }

    /// Starts background sweepers for the state of all calculators.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn spawn_sweepers(&self) -> Vec<SweepHandle> {
        self.deltas
            .spawn_sweeper()
            .into_iter()
            .chain(self.summaries.spawn_sweeper())
            .collect()
    }

    fn convert_metric(&self, scope: &Scope<'_>, metric: &Metric, output: &mut Converted) {
        match &metric.data {
            MetricData::Gauge { points } => self.convert_gauges(scope, metric, points, output),
            MetricData::Sum {
                temporality: Temporality::Cumulative,
                monotonic: true,
                points,
            } => self.convert_cumulative(scope, metric, points, output),
            MetricData::Sum { points, .. } => self.convert_gauges(scope, metric, points, output),
            MetricData::Histogram { points } => {
                self.convert_histograms(scope, metric, points, output)
            }
            MetricData::Summary { points } => self.convert_summaries(scope, metric, points, output),
            MetricData::Empty => {
                tally_log::warn!(
                    metric = %metric.name,
                    unit = %metric.unit,
                    data_type = metric.data.type_name(),
                    "unhandled metric data type"
                );
                output.dropped += 1;
            }
        }
    }

    fn convert_gauges(
        &self,
        scope: &Scope<'_>,
        metric: &Metric,
        points: &[NumberPoint],
        output: &mut Converted,
    ) {
        for point in points {
            if !point.value.is_finite() {
                reject(metric, point.timestamp, "non-finite value", output);
                continue;
            }

            output.points.push(data_point(
                &metric.name,
                metric,
                point.timestamp,
                scope.dimensions(&point.dimensions),
                DataPointValue::Gauge(point.value),
            ));
        }
    }

    fn convert_cumulative(
        &self,
        scope: &Scope<'_>,
        metric: &Metric,
        points: &[NumberPoint],
        output: &mut Converted,
    ) {
        for point in points {
            if !point.value.is_finite() {
                reject(metric, point.timestamp, "non-finite value", output);
                continue;
            }

            let dimensions = scope.dimensions(&point.dimensions);
            let key = MetricKey::from_dimensions(&metric.name, &dimensions);

            let Some(delta) = self.deltas.calculate(&key, point.timestamp, point.value) else {
                continue;
            };

            if self.suppresses(delta.kind) {
                continue;
            }

            output.points.push(data_point(
                &metric.name,
                metric,
                point.timestamp,
                dimensions,
                DataPointValue::Count(delta.value),
            ));
        }
    }

    fn convert_histograms(
        &self,
        scope: &Scope<'_>,
        metric: &Metric,
        points: &[HistogramPoint],
        output: &mut Converted,
    ) {
        for point in points {
            if !point.sum.is_finite() {
                reject(metric, point.timestamp, "non-finite sum", output);
                continue;
            }

            let buckets_match =
                point.bounds.is_empty() || point.bucket_counts.len() == point.bounds.len() + 1;
            if self.config.histogram_buckets && !buckets_match {
                reject(metric, point.timestamp, "bucket counts do not match bounds", output);
                continue;
            }

            let dimensions = scope.dimensions(&point.dimensions);
            let stats = MetricStats {
                min: None,
                max: None,
                sum: point.sum,
                count: point.count,
            };

            if self.config.histogram_buckets {
                let name = format!("{}{BUCKET_COUNT_SUFFIX}", metric.name);
                output.points.push(data_point(
                    &metric.name,
                    metric,
                    point.timestamp,
                    dimensions.clone(),
                    DataPointValue::Stats(stats),
                ));

                for (index, count) in point.bucket_counts.iter().enumerate() {
                    let mut dimensions = dimensions.clone();
                    dimensions.insert(BUCKET_INDEX_DIMENSION.to_owned(), index.to_string());

                    output.points.push(data_point(
                        &name,
                        metric,
                        point.timestamp,
                        dimensions,
                        DataPointValue::Gauge(count_value(*count)),
                    ));
                }
            } else {
                output.points.push(data_point(
                    &metric.name,
                    metric,
                    point.timestamp,
                    dimensions,
                    DataPointValue::Stats(stats),
                ));
            }
        }
    }

    fn convert_summaries(
        &self,
        scope: &Scope<'_>,
        metric: &Metric,
        points: &[SummaryPoint],
        output: &mut Converted,
    ) {
        for point in points {
            let finite = point.sum.is_finite() && point.quantiles.iter().all(|q| q.value.is_finite());
            if !finite {
                reject(metric, point.timestamp, "non-finite value", output);
                continue;
            }

            let dimensions = scope.dimensions(&point.dimensions);
            let key = MetricKey::from_dimensions(&metric.name, &dimensions);

            let Some(delta) =
                self.summaries
                    .calculate_delta(&key, point.timestamp, point.sum, point.count)
            else {
                continue;
            };

            if self.suppresses(delta.kind) {
                continue;
            }

            let (min, max) = quantile_bounds(&point.quantiles);
            let stats = MetricStats {
                min,
                max,
                sum: delta.value.sum,
                count: delta.value.count,
            };

            output.points.push(data_point(
                &metric.name,
                metric,
                point.timestamp,
                dimensions,
                DataPointValue::Stats(stats),
            ));
        }
    }

    fn suppresses(&self, kind: DeltaKind) -> bool {
        kind.is_baseline() && self.config.baseline == BaselinePolicy::Suppress
    }
}

fn data_point(
    name: &str,
    metric: &Metric,
    timestamp: Timestamp,
    dimensions: Dimensions,
    value: DataPointValue,
) -> DataPoint {
    DataPoint {
        name: name.to_owned(),
        unit: metric.unit.clone(),
        timestamp,
        dimensions,
        value,
    }
}

fn count_value(count: u64) -> NumberValue {
    match i64::try_from(count) {
        Ok(count) => NumberValue::Int(count),
        Err(_) => NumberValue::Float(count as f64),
    }
}

fn reject(metric: &Metric, timestamp: Timestamp, reason: &'static str, output: &mut Converted) {
    tally_log::debug!(
        metric = %metric.name,
        timestamp = %timestamp,
        reason,
        "dropped malformed data point"
    );
    output.dropped += 1;
}
