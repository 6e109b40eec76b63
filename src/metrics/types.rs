//! Metric batch model.
//!
//! A [`MetricBatch`] is an ordered list of resource groups, each holding
//! named metrics whose data is one of four closed variants. Passes rewrite
//! batches by value; nothing in here is shared between threads.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Data-point label set.
pub type Labels = HashMap<String, String>;

/// Resource attribute set.
pub type Attributes = HashMap<String, AttributeValue>;

/// Typed resource attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Bool(bool),
    Int(i64),
    Double(f64),
}

impl AttributeValue {
    /// Canonical, type-tagged rendering used for identity comparisons.
    ///
    /// `Int(1)` and `String("1")` must not collide, hence the tag.
    pub fn canonical(&self) -> String {
        match self {
            AttributeValue::String(s) => format!("s:{}", s),
            AttributeValue::Bool(b) => format!("b:{}", b),
            AttributeValue::Int(i) => format!("i:{}", i),
            AttributeValue::Double(d) => format!("d:{}", d),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => write!(f, "{}", s),
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Int(i) => write!(f, "{}", i),
            AttributeValue::Double(d) => write!(f, "{}", d),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Double(value)
    }
}

/// Aggregation temporality of a sum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationTemporality {
    #[default]
    Cumulative,
    Delta,
}

/// Numeric sample types a data point can carry.
pub trait NumberValue: Copy + PartialEq + fmt::Debug {
    /// Widen to f64 for rate arithmetic.
    fn as_f64(self) -> f64;
}

impl NumberValue for i64 {
    #[allow(clippy::cast_precision_loss)]
    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl NumberValue for f64 {
    fn as_f64(self) -> f64 {
        self
    }
}

/// One sample of a time series
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint<T> {
    pub labels: Labels,
    pub start_time_unix_nano: u64,
    pub time_unix_nano: u64,
    pub value: T,
}

impl<T> DataPoint<T> {
    pub fn new(labels: Labels, start_time_unix_nano: u64, time_unix_nano: u64, value: T) -> Self {
        Self {
            labels,
            start_time_unix_nano,
            time_unix_nano,
            value,
        }
    }
}

/// Cumulative or delta sum
#[derive(Debug, Clone, PartialEq)]
pub struct Sum<T> {
    pub is_monotonic: bool,
    pub temporality: AggregationTemporality,
    pub data_points: Vec<DataPoint<T>>,
}

impl<T> Sum<T> {
    /// Sum with the same metadata and the given points.
    fn with_points(&self, data_points: Vec<DataPoint<T>>) -> Self {
        Self {
            is_monotonic: self.is_monotonic,
            temporality: self.temporality,
            data_points,
        }
    }
}

/// Point-in-time measurement
#[derive(Debug, Clone, PartialEq)]
pub struct Gauge<T> {
    pub data_points: Vec<DataPoint<T>>,
}

/// Type tag of a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricType {
    IntSum,
    DoubleSum,
    IntGauge,
    DoubleGauge,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricType::IntSum => "int_sum",
            MetricType::DoubleSum => "double_sum",
            MetricType::IntGauge => "int_gauge",
            MetricType::DoubleGauge => "double_gauge",
        };
        f.write_str(name)
    }
}

/// Metric payload, one closed variant per supported type
#[derive(Debug, Clone, PartialEq)]
pub enum MetricData {
    IntSum(Sum<i64>),
    DoubleSum(Sum<f64>),
    IntGauge(Gauge<i64>),
    DoubleGauge(Gauge<f64>),
}

impl MetricData {
    pub fn metric_type(&self) -> MetricType {
        match self {
            MetricData::IntSum(_) => MetricType::IntSum,
            MetricData::DoubleSum(_) => MetricType::DoubleSum,
            MetricData::IntGauge(_) => MetricType::IntGauge,
            MetricData::DoubleGauge(_) => MetricType::DoubleGauge,
        }
    }

    /// Number of data points
    pub fn len(&self) -> usize {
        match self {
            MetricData::IntSum(s) => s.data_points.len(),
            MetricData::DoubleSum(s) => s.data_points.len(),
            MetricData::IntGauge(g) => g.data_points.len(),
            MetricData::DoubleGauge(g) => g.data_points.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Label sets of all data points, in order.
    pub fn labels(&self) -> Vec<&Labels> {
        match self {
            MetricData::IntSum(s) => s.data_points.iter().map(|p| &p.labels).collect(),
            MetricData::DoubleSum(s) => s.data_points.iter().map(|p| &p.labels).collect(),
            MetricData::IntGauge(g) => g.data_points.iter().map(|p| &p.labels).collect(),
            MetricData::DoubleGauge(g) => g.data_points.iter().map(|p| &p.labels).collect(),
        }
    }

    /// Moves data points out into groups keyed by `classify`.
    ///
    /// `classify` sees each point's labels mutably so it can strip the label
    /// it keys on. Points it returns `None` for stay in `self`. Groups come
    /// back in first-seen key order and keep this metric's variant and sum
    /// metadata.
    pub fn partition_by<K, F>(&mut self, mut classify: F) -> Vec<(K, MetricData)>
    where
        K: Eq + Hash + Clone,
        F: FnMut(&mut Labels) -> Option<K>,
    {
        match self {
            MetricData::IntSum(sum) => {
                let (rest, groups) =
                    partition_points(std::mem::take(&mut sum.data_points), &mut classify);
                let out = groups
                    .into_iter()
                    .map(|(k, points)| (k, MetricData::IntSum(sum.with_points(points))))
                    .collect();
                sum.data_points = rest;
                out
            },
            MetricData::DoubleSum(sum) => {
                let (rest, groups) =
                    partition_points(std::mem::take(&mut sum.data_points), &mut classify);
                let out = groups
                    .into_iter()
                    .map(|(k, points)| (k, MetricData::DoubleSum(sum.with_points(points))))
                    .collect();
                sum.data_points = rest;
                out
            },
            MetricData::IntGauge(gauge) => {
                let (rest, groups) =
                    partition_points(std::mem::take(&mut gauge.data_points), &mut classify);
                gauge.data_points = rest;
                groups
                    .into_iter()
                    .map(|(k, data_points)| (k, MetricData::IntGauge(Gauge { data_points })))
                    .collect()
            },
            MetricData::DoubleGauge(gauge) => {
                let (rest, groups) =
                    partition_points(std::mem::take(&mut gauge.data_points), &mut classify);
                gauge.data_points = rest;
                groups
                    .into_iter()
                    .map(|(k, data_points)| (k, MetricData::DoubleGauge(Gauge { data_points })))
                    .collect()
            },
        }
    }
}

fn partition_points<T, K, F>(
    points: Vec<DataPoint<T>>,
    classify: &mut F,
) -> (Vec<DataPoint<T>>, Vec<(K, Vec<DataPoint<T>>)>)
where
    K: Eq + Hash + Clone,
    F: FnMut(&mut Labels) -> Option<K>,
{
    let mut rest = Vec::new();
    let mut groups: Vec<(K, Vec<DataPoint<T>>)> = Vec::new();
    let mut index: HashMap<K, usize> = HashMap::new();

    for mut point in points {
        match classify(&mut point.labels) {
            Some(key) => {
                let slot = *index.entry(key.clone()).or_insert_with(|| {
                    groups.push((key, Vec::new()));
                    groups.len() - 1
                });
                groups[slot].1.push(point);
            },
            None => rest.push(point),
        }
    }

    (rest, groups)
}

/// Named metric
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub data: MetricData,
}

impl Metric {
    pub fn new(name: impl Into<String>, data: MetricData) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            unit: String::new(),
            data,
        }
    }

    /// Cumulative integer sum
    pub fn int_sum(
        name: impl Into<String>,
        is_monotonic: bool,
        data_points: Vec<DataPoint<i64>>,
    ) -> Self {
        Self::new(
            name,
            MetricData::IntSum(Sum {
                is_monotonic,
                temporality: AggregationTemporality::Cumulative,
                data_points,
            }),
        )
    }

    /// Cumulative floating point sum
    pub fn double_sum(
        name: impl Into<String>,
        is_monotonic: bool,
        data_points: Vec<DataPoint<f64>>,
    ) -> Self {
        Self::new(
            name,
            MetricData::DoubleSum(Sum {
                is_monotonic,
                temporality: AggregationTemporality::Cumulative,
                data_points,
            }),
        )
    }

    pub fn int_gauge(name: impl Into<String>, data_points: Vec<DataPoint<i64>>) -> Self {
        Self::new(name, MetricData::IntGauge(Gauge { data_points }))
    }

    pub fn double_gauge(name: impl Into<String>, data_points: Vec<DataPoint<f64>>) -> Self {
        Self::new(name, MetricData::DoubleGauge(Gauge { data_points }))
    }

    /// Same descriptor, different payload.
    pub fn with_data(&self, name: impl Into<String>, data: MetricData) -> Self {
        Self {
            name: name.into(),
            description: self.description.clone(),
            unit: self.unit.clone(),
            data,
        }
    }

    pub fn metric_type(&self) -> MetricType {
        self.data.metric_type()
    }
}

/// Metrics sharing one resource
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceMetrics {
    pub resource: Attributes,
    pub metrics: Vec<Metric>,
}

impl ResourceMetrics {
    pub fn new(resource: Attributes, metrics: Vec<Metric>) -> Self {
        Self { resource, metrics }
    }

    /// Total data points across all metrics
    pub fn data_point_count(&self) -> usize {
        self.metrics.iter().map(|m| m.data.len()).sum()
    }
}

/// One inbound or outbound batch
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricBatch {
    pub resource_metrics: Vec<ResourceMetrics>,
}

impl MetricBatch {
    pub fn new(resource_metrics: Vec<ResourceMetrics>) -> Self {
        Self { resource_metrics }
    }

    pub fn metric_count(&self) -> usize {
        self.resource_metrics.iter().map(|rm| rm.metrics.len()).sum()
    }

    pub fn data_point_count(&self) -> usize {
        self.resource_metrics.iter().map(ResourceMetrics::data_point_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.resource_metrics.is_empty()
    }
}

/// Build a label set from string pairs.
pub fn labels<const N: usize>(pairs: [(&str, &str); N]) -> Labels {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_canonical_is_type_tagged() {
        assert_ne!(
            AttributeValue::from(1_i64).canonical(),
            AttributeValue::from("1").canonical()
        );
        assert_eq!(AttributeValue::from("host-1").to_string(), "host-1");
    }

    #[test]
    fn test_partition_keeps_unmatched_points() {
        let mut data = Metric::int_sum(
            "disk.io",
            true,
            vec![
                DataPoint::new(labels([("direction", "read")]), 0, 1, 100),
                DataPoint::new(labels([("device", "sda")]), 0, 1, 7),
                DataPoint::new(labels([("direction", "write")]), 0, 1, 50),
                DataPoint::new(labels([("direction", "read"), ("device", "sdb")]), 0, 1, 3),
            ],
        )
        .data;

        let groups = data.partition_by(|l| l.remove("direction"));

        assert_eq!(data.len(), 1);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "read");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "write");
        assert!(groups
            .iter()
            .all(|(_, d)| d.labels().iter().all(|l| !l.contains_key("direction"))));
        match &groups[0].1 {
            MetricData::IntSum(sum) => assert!(sum.is_monotonic),
            other => panic!("unexpected variant {:?}", other.metric_type()),
        }
    }

    #[test]
    fn test_batch_counts() {
        let batch = MetricBatch::new(vec![ResourceMetrics::new(
            Attributes::new(),
            vec![
                Metric::double_gauge("a", vec![DataPoint::new(Labels::new(), 0, 0, 1.0)]),
                Metric::int_gauge("b", vec![]),
            ],
        )]);

        assert_eq!(batch.metric_count(), 2);
        assert_eq!(batch.data_point_count(), 1);
        assert!(!batch.is_empty());
    }
}
