// Model tests: metric name string form, aggregate identities

use histmon::models::{AggregatedValue, MetricName};

#[test]
fn metric_names_round_trip_their_string_form() {
    for metric in MetricName::ALL {
        assert_eq!(MetricName::from_str_opt(metric.as_str()), Some(metric));
        assert_eq!(metric.to_string(), metric.as_str());
    }
    assert_eq!(MetricName::from_str_opt("gpu_pct"), None);
}

#[test]
fn metric_name_strings_are_unique() {
    let mut names: Vec<&str> = MetricName::ALL.iter().map(|m| m.as_str()).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), MetricName::ALL.len());
}

#[test]
fn single_sample_aggregate_is_the_value_itself() {
    let agg = AggregatedValue::single(42.5);
    assert_eq!(agg.avg, 42.5);
    assert_eq!(agg.min, 42.5);
    assert_eq!(agg.max, 42.5);
    assert_eq!(agg.count, 1);
}

#[test]
fn merge_with_empty_side_is_identity() {
    let mut agg = AggregatedValue::single(10.0);
    let empty = AggregatedValue {
        avg: 0.0,
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
        count: 0,
    };
    agg.merge(&empty);
    assert_eq!(agg.avg, 10.0);
    assert_eq!(agg.count, 1);
    assert_eq!(agg.min, 10.0);
    assert_eq!(agg.max, 10.0);
}
