//! Conversion of cumulative metrics into deltas.
//!
//! Many metric sources report counters and summaries as running totals since the source started.
//! Most metric backends instead expect the increment since the previous report. This crate
//! converts between the two by remembering the last sample of every time series.
//!
//! # Protocol
//!
//! Input is a [`MetricBatch`] of named [`Metric`]s, grouped by instrumentation library. The data
//! of each metric is one of the [`MetricData`] variants. Output is a list of [`DataPoint`]s along
//! with the number of dropped time series, see [`Converted`].
//!
//! ```
//! use tally_metrics::{Converter, ConverterConfig, MetricBatch};
//!
//! let json = r#"{"libraries": [{"name": "cloudwatch-otel", "metrics": [
//!     {"name": "requests", "unit": "1", "data": {"type": "sum", "temporality": "cumulative",
//!      "monotonic": true, "points": [{"timestamp": 1000000000, "value": 4}]}}
//! ]}]}"#;
//!
//! let batch: MetricBatch = serde_json::from_str(json).unwrap();
//! let converter = Converter::new(ConverterConfig::default());
//!
//! let converted = converter.convert(&batch);
//! assert_eq!(converted.points.len(), 1);
//! assert_eq!(converted.dropped, 0);
//! ```
//!
//! # Series Identity
//!
//! A time series is identified by a [`MetricKey`], which is built from the metric name and the
//! full set of dimensions of a point, so the order in which dimensions are given does not matter.
//! For logs, keys render their dimensions as sorted `key:value` tags, see [`dimension_tags`].
//!
//! # Delta Calculation
//!
//! For every cumulative sample, the [`DeltaCalculator`] and [`SummaryCalculator`] look up the last
//! sample of the same series:
//!
//!  - Without a previous sample, the sample is its own delta.
//!  - If the sample is not newer than the previous one, it is dropped without updating state.
//!  - If the sample is smaller than the previous one, the source restarted and the sample is its
//!    own delta.
//!  - Otherwise, the delta is the difference to the previous sample.
//!
//! The [`Converter`] can be configured to suppress the first two cases through the
//! [`BaselinePolicy`].
//!
//! # State Expiry
//!
//! Series state lives in a [`TtlMap`] and expires when a series is not reported for
//! [`TtlConfig::max_age`] seconds. The [`ConverterService`] periodically frees expired state.

#![warn(missing_docs)]

mod convert;
mod delta;
mod key;
mod protocol;
mod service;
mod summary;
mod ttl;

pub use self::convert::*;
pub use self::delta::*;
pub use self::key::*;
pub use self::protocol::*;
pub use self::service::*;
pub use self::summary::*;
pub use self::ttl::*;
