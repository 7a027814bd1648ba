use std::time::Duration;

use similar_asserts::assert_eq;
use tally_metrics::{
    BaselinePolicy, Converted, Converter, ConverterConfig, DataPointValue, DeltaCalculator,
    Dimensions, LibraryMetrics, Metric, MetricBatch, MetricData, MetricKey, NumberPoint,
    NumberValue, QuantileValue, SummaryPoint, Temporality, Timestamp, TtlConfig, TtlMap,
};

fn seconds(secs: u64) -> Timestamp {
    Timestamp::from_secs(secs)
}

fn point(secs: u64, dimensions: &[(&str, &str)], value: NumberValue) -> NumberPoint {
    NumberPoint {
        timestamp: seconds(secs),
        dimensions: dimensions
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect(),
        value,
    }
}

fn batch(metrics: Vec<Metric>) -> MetricBatch {
    MetricBatch {
        resource: Dimensions::new(),
        libraries: vec![LibraryMetrics {
            name: Some("cloudwatch-otel".to_owned()),
            metrics,
        }],
    }
}

fn monotonic_sum(points: Vec<NumberPoint>) -> Metric {
    Metric {
        name: "metric.example".to_owned(),
        unit: "1".to_owned(),
        data: MetricData::Sum {
            temporality: Temporality::Cumulative,
            monotonic: true,
            points,
        },
    }
}

fn suppressing() -> Converter {
    Converter::new(ConverterConfig {
        baseline: BaselinePolicy::Suppress,
        ..Default::default()
    })
}

/// Renders counts as `(seconds, value)` pairs.
fn counts(converted: &Converted) -> Vec<(f64, f64)> {
    converted
        .points
        .iter()
        .map(|point| match point.value {
            DataPointValue::Count(value) => (point.timestamp.as_secs_f64(), value.as_f64()),
            other => panic!("expected a count, got {other:?}"),
        })
        .collect()
}

#[test]
fn test_monotonic_deltas_add_up() {
    tally_test::setup();
    let increments = [1.0, 2.0, 200.0, 3.0, 7.0, 0.0];

    let mut cumulative = vec![0.0];
    for increment in increments {
        cumulative.push(cumulative[cumulative.len() - 1] + increment);
    }

    let points = cumulative
        .iter()
        .enumerate()
        .map(|(i, value)| point(i as u64, &[], NumberValue::Float(*value)))
        .collect();

    let converted = suppressing().convert(&batch(vec![monotonic_sum(points)]));
    let deltas: Vec<f64> = counts(&converted).into_iter().map(|(_, v)| v).collect();

    assert_eq!(deltas, increments.to_vec());
    assert_eq!(
        deltas.iter().sum::<f64>(),
        cumulative[cumulative.len() - 1] - cumulative[0]
    );
}

#[test]
fn test_counter_reset() {
    tally_test::setup();
    let points = [0, 30, 0, 20]
        .into_iter()
        .enumerate()
        .map(|(i, value)| point(i as u64, &[], NumberValue::Int(value)))
        .collect();

    let converted = suppressing().convert(&batch(vec![monotonic_sum(points)]));

    assert_eq!(counts(&converted), vec![(1.0, 30.0), (3.0, 20.0)]);
}

#[test]
fn test_out_of_order() {
    tally_test::setup();
    let stamps = [1, 0, 2, 3];
    let values = [0, 1, 2, 3];

    let points = stamps
        .into_iter()
        .zip(values)
        .map(|(secs, value)| point(secs, &[], NumberValue::Int(value)))
        .collect();

    let converted = suppressing().convert(&batch(vec![monotonic_sum(points)]));

    assert_eq!(counts(&converted), vec![(2.0, 2.0), (3.0, 1.0)]);
}

#[test]
fn test_different_dimensions() {
    tally_test::setup();
    let points = vec![
        point(0, &[], NumberValue::Int(0)),
        point(1, &[], NumberValue::Int(20)),
        point(0, &[("key1", "valA")], NumberValue::Int(0)),
        point(1, &[("key1", "valA")], NumberValue::Int(30)),
        point(0, &[("key1", "valB")], NumberValue::Int(0)),
        point(1, &[("key1", "valB")], NumberValue::Int(40)),
    ];

    let converted = suppressing().convert(&batch(vec![monotonic_sum(points)]));

    let rendered: Vec<_> = converted
        .points
        .iter()
        .map(|point| {
            let tag = point.dimensions.get("key1").cloned();
            (tag, point.value)
        })
        .collect();

    assert_eq!(
        rendered,
        vec![
            (None, DataPointValue::Count(NumberValue::Int(20))),
            (
                Some("valA".to_owned()),
                DataPointValue::Count(NumberValue::Int(30))
            ),
            (
                Some("valB".to_owned()),
                DataPointValue::Count(NumberValue::Int(40))
            ),
        ]
    );
}

#[test]
fn test_key_canonicalization() {
    let some_tags = MetricKey::new("metric.name", [("key1", "val1"), ("key2", "val2")]);
    let same_tags = MetricKey::new("metric.name", [("key2", "val2"), ("key1", "val1")]);
    let diff_tags = MetricKey::new("metric.name", [("key3", "val3")]);

    assert_eq!(some_tags, same_tags);
    assert_ne!(some_tags, diff_tags);
}

#[test]
fn test_first_sample_reported() {
    tally_test::setup();
    let converter = Converter::new(ConverterConfig::default());

    let first = converter.convert(&batch(vec![monotonic_sum(vec![point(
        0,
        &[("label", "value")],
        NumberValue::Int(-17),
    )])]));
    let second = converter.convert(&batch(vec![monotonic_sum(vec![point(
        1,
        &[("label", "value")],
        NumberValue::Int(1),
    )])]));

    assert_eq!(
        first.points[0].value,
        DataPointValue::Count(NumberValue::Int(-17))
    );
    assert_eq!(
        second.points[0].value,
        DataPointValue::Count(NumberValue::Int(18))
    );

    let dimensions = &second.points[0].dimensions;
    assert_eq!(dimensions.len(), 2);
    assert_eq!(dimensions["oTelLib"].as_str(), "cloudwatch-otel");
    assert_eq!(dimensions["label"].as_str(), "value");
}

#[test]
fn test_summary_merge() {
    tally_test::setup();
    let converter = Converter::new(ConverterConfig::default());

    let summary = |secs, sum, count| Metric {
        name: "foo".to_owned(),
        unit: "Seconds".to_owned(),
        data: MetricData::Summary {
            points: vec![SummaryPoint {
                timestamp: seconds(secs),
                dimensions: Dimensions::from([("label1".to_owned(), "value1".to_owned())]),
                count,
                sum,
                quantiles: vec![
                    QuantileValue {
                        quantile: 0.0,
                        value: 1.0,
                    },
                    QuantileValue {
                        quantile: 100.0,
                        value: 5.0,
                    },
                ],
            }],
        },
    };

    let inputs = [(17.3, 17), (100.0, 25), (120.0, 26)];
    let expected = [(17.3, 17), (82.7, 8), (20.0, 1)];

    for (i, ((sum, count), (expected_sum, expected_count))) in
        inputs.into_iter().zip(expected).enumerate()
    {
        let converted = converter.convert(&batch(vec![summary(i as u64, sum, count)]));

        let DataPointValue::Stats(stats) = converted.points[0].value else {
            panic!("expected stats");
        };

        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(5.0));
        assert_eq!(stats.count, expected_count);
        assert!((stats.sum - expected_sum).abs() < 0.02, "{stats:?}");
    }
}

#[test]
fn test_unhandled_metric_type() {
    tally_test::setup();
    let converter = Converter::new(ConverterConfig::default());

    let metric = Metric {
        name: "foo".to_owned(),
        unit: "Count".to_owned(),
        data: MetricData::Empty,
    };

    let (converted, logs) = tally_test::capture_logs(|| converter.convert(&batch(vec![metric])));

    assert!(converted.points.is_empty());
    assert_eq!(converted.dropped, 1);

    let warnings: Vec<serde_json::Value> = logs
        .iter()
        .map(|line| serde_json::from_str(line).unwrap())
        .filter(|event: &serde_json::Value| event["level"] == "WARN")
        .collect();

    assert_eq!(warnings.len(), 1);
    insta::assert_json_snapshot!(warnings[0], {".target" => "[target]"}, @r#"
    {
      "data_type": "Empty",
      "level": "WARN",
      "message": "unhandled metric data type",
      "metric": "foo",
      "target": "[target]",
      "unit": "Count"
    }
    "#);
}

#[tokio::test(start_paused = true)]
async fn test_ttl_expiry() {
    tally_test::setup();
    let config = TtlConfig {
        sweep_interval: 1800,
        max_age: 3600,
    };

    let map = TtlMap::new(&config);
    map.put("key", 1);

    tokio::time::advance(Duration::from_secs(3600)).await;
    assert_eq!(map.get(&"key"), Some(1));

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(map.get(&"key"), None);

    let calculator = DeltaCalculator::new("deltas", &config);
    let key = MetricKey::new("metric.example", Dimensions::new());
    calculator.calculate(&key, seconds(0), NumberValue::Int(100));

    tokio::time::advance(Duration::from_secs(3601)).await;
    let delta = calculator
        .calculate(&key, seconds(1), NumberValue::Int(110))
        .unwrap();

    // The previous sample expired, so the counter starts over.
    assert_eq!(delta.value, NumberValue::Int(110));
}
