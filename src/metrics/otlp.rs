//! OTLP conversion.
//!
//! Maps `ExportMetricsServiceRequest` to and from the batch model. Only
//! number metrics (gauges and sums) have a place in a [`MetricBatch`];
//! histogram, exponential histogram and summary points are reported back
//! as rejected instead of vanishing.

use crate::metrics::types::{
    AggregationTemporality, AttributeValue, Attributes, DataPoint, Gauge, Labels, Metric,
    MetricBatch, MetricData, ResourceMetrics, Sum,
};
use opentelemetry_proto::tonic::{
    collector::metrics::v1::ExportMetricsServiceRequest,
    common::v1::{any_value::Value, AnyValue, KeyValue},
    metrics::v1::{
        metric::Data, number_data_point::Value as PointValue,
        AggregationTemporality as OtlpTemporality, Gauge as OtlpGauge, Metric as OtlpMetric,
        NumberDataPoint, ResourceMetrics as OtlpResourceMetrics, ScopeMetrics, Sum as OtlpSum,
    },
    resource::v1::Resource,
};

/// Batch decoded from an OTLP request
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedBatch {
    pub batch: MetricBatch,
    /// Data points the batch model cannot carry
    pub rejected_data_points: i64,
}

impl MetricBatch {
    /// Decode an OTLP export request. Scope groups of one resource are
    /// flattened into a single group.
    pub fn from_otlp(request: ExportMetricsServiceRequest) -> DecodedBatch {
        let mut rejected = 0i64;
        let resource_metrics = request
            .resource_metrics
            .into_iter()
            .map(|rm| {
                let resource = rm
                    .resource
                    .map(|r| decode_attributes(r.attributes))
                    .unwrap_or_default();
                let metrics = rm
                    .scope_metrics
                    .into_iter()
                    .flat_map(|sm| sm.metrics)
                    .filter_map(|m| decode_metric(m, &mut rejected))
                    .collect();
                ResourceMetrics::new(resource, metrics)
            })
            .collect();

        if rejected > 0 {
            tracing::debug!(rejected, "Rejected data points of unsupported metric kinds");
        }

        DecodedBatch {
            batch: MetricBatch::new(resource_metrics),
            rejected_data_points: rejected,
        }
    }

    /// Encode as an OTLP export request, one scope group per resource.
    pub fn into_otlp(self) -> ExportMetricsServiceRequest {
        ExportMetricsServiceRequest {
            resource_metrics: self
                .resource_metrics
                .into_iter()
                .map(|rm| OtlpResourceMetrics {
                    resource: Some(Resource {
                        attributes: encode_attributes(rm.resource),
                        dropped_attributes_count: 0,
                    }),
                    scope_metrics: vec![ScopeMetrics {
                        scope: None,
                        metrics: rm.metrics.into_iter().map(encode_metric).collect(),
                        schema_url: String::new(),
                    }],
                    schema_url: String::new(),
                })
                .collect(),
        }
    }
}

fn decode_attributes(attributes: Vec<KeyValue>) -> Attributes {
    attributes
        .into_iter()
        .filter_map(|kv| {
            let value = match kv.value?.value? {
                Value::StringValue(s) => AttributeValue::String(s),
                Value::BoolValue(b) => AttributeValue::Bool(b),
                Value::IntValue(i) => AttributeValue::Int(i),
                Value::DoubleValue(d) => AttributeValue::Double(d),
                other => AttributeValue::String(value_to_string(other)),
            };
            Some((kv.key, value))
        })
        .collect()
}

fn decode_labels(attributes: Vec<KeyValue>) -> Labels {
    attributes
        .into_iter()
        .map(|kv| {
            let value = kv
                .value
                .and_then(|v| v.value)
                .map(value_to_string)
                .unwrap_or_default();
            (kv.key, value)
        })
        .collect()
}

/// Convert OTEL value to string.
fn value_to_string(value: Value) -> String {
    match value {
        Value::StringValue(s) => s,
        Value::BoolValue(b) => b.to_string(),
        Value::IntValue(i) => i.to_string(),
        Value::DoubleValue(d) => d.to_string(),
        Value::ArrayValue(arr) => {
            let values: Vec<String> = arr
                .values
                .into_iter()
                .filter_map(|v| v.value.map(value_to_string))
                .collect();
            format!("[{}]", values.join(", "))
        },
        Value::KvlistValue(kv) => {
            let pairs: Vec<String> = kv
                .values
                .into_iter()
                .map(|kv| {
                    let value = kv
                        .value
                        .and_then(|v| v.value)
                        .map(value_to_string)
                        .unwrap_or_default();
                    format!("{}={}", kv.key, value)
                })
                .collect();
            format!("{{{}}}", pairs.join(", "))
        },
        Value::BytesValue(bytes) => format!("bytes({})", bytes.len()),
    }
}

fn decode_metric(metric: OtlpMetric, rejected: &mut i64) -> Option<Metric> {
    let data = match metric.data? {
        Data::Gauge(gauge) => decode_gauge(gauge.data_points, rejected),
        Data::Sum(sum) => {
            let temporality = if sum.aggregation_temporality == OtlpTemporality::Delta as i32 {
                AggregationTemporality::Delta
            } else {
                AggregationTemporality::Cumulative
            };
            decode_sum(sum.data_points, sum.is_monotonic, temporality, rejected)
        },
        Data::Histogram(h) => return reject(&metric.name, h.data_points.len(), rejected),
        Data::ExponentialHistogram(h) => return reject(&metric.name, h.data_points.len(), rejected),
        Data::Summary(s) => return reject(&metric.name, s.data_points.len(), rejected),
    };

    Some(Metric {
        name: metric.name,
        description: metric.description,
        unit: metric.unit,
        data,
    })
}

fn reject(name: &str, points: usize, rejected: &mut i64) -> Option<Metric> {
    tracing::debug!(metric = name, points, "Unsupported metric kind");
    *rejected += i64::try_from(points).unwrap_or(i64::MAX);
    None
}

fn all_int(points: &[NumberDataPoint]) -> bool {
    !points.is_empty()
        && points
            .iter()
            .all(|p| matches!(p.value, Some(PointValue::AsInt(_))))
}

fn int_points(points: Vec<NumberDataPoint>) -> Vec<DataPoint<i64>> {
    points
        .into_iter()
        .filter_map(|p| match p.value {
            Some(PointValue::AsInt(v)) => Some(DataPoint::new(
                decode_labels(p.attributes),
                p.start_time_unix_nano,
                p.time_unix_nano,
                v,
            )),
            _ => None,
        })
        .collect()
}

/// Mixed int/double points widen to double; points without a value are rejected.
#[allow(clippy::cast_precision_loss)]
fn double_points(points: Vec<NumberDataPoint>, rejected: &mut i64) -> Vec<DataPoint<f64>> {
    points
        .into_iter()
        .filter_map(|p| {
            let value = match p.value {
                Some(PointValue::AsDouble(v)) => v,
                Some(PointValue::AsInt(v)) => v as f64,
                None => {
                    *rejected += 1;
                    return None;
                },
            };
            Some(DataPoint::new(
                decode_labels(p.attributes),
                p.start_time_unix_nano,
                p.time_unix_nano,
                value,
            ))
        })
        .collect()
}

fn decode_gauge(points: Vec<NumberDataPoint>, rejected: &mut i64) -> MetricData {
    if all_int(&points) {
        MetricData::IntGauge(Gauge {
            data_points: int_points(points),
        })
    } else {
        MetricData::DoubleGauge(Gauge {
            data_points: double_points(points, rejected),
        })
    }
}

fn decode_sum(
    points: Vec<NumberDataPoint>,
    is_monotonic: bool,
    temporality: AggregationTemporality,
    rejected: &mut i64,
) -> MetricData {
    if all_int(&points) {
        MetricData::IntSum(Sum {
            is_monotonic,
            temporality,
            data_points: int_points(points),
        })
    } else {
        MetricData::DoubleSum(Sum {
            is_monotonic,
            temporality,
            data_points: double_points(points, rejected),
        })
    }
}

fn encode_attributes(attributes: Attributes) -> Vec<KeyValue> {
    let mut pairs: Vec<(String, AttributeValue)> = attributes.into_iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
        .into_iter()
        .map(|(key, value)| KeyValue {
            key,
            value: Some(AnyValue {
                value: Some(match value {
                    AttributeValue::String(s) => Value::StringValue(s),
                    AttributeValue::Bool(b) => Value::BoolValue(b),
                    AttributeValue::Int(i) => Value::IntValue(i),
                    AttributeValue::Double(d) => Value::DoubleValue(d),
                }),
            }),
        })
        .collect()
}

fn encode_labels(labels: Labels) -> Vec<KeyValue> {
    let mut pairs: Vec<(String, String)> = labels.into_iter().collect();
    pairs.sort_unstable();
    pairs
        .into_iter()
        .map(|(key, value)| KeyValue {
            key,
            value: Some(AnyValue {
                value: Some(Value::StringValue(value)),
            }),
        })
        .collect()
}

fn encode_points<T>(points: Vec<DataPoint<T>>, wrap: fn(T) -> PointValue) -> Vec<NumberDataPoint> {
    points
        .into_iter()
        .map(|p| NumberDataPoint {
            attributes: encode_labels(p.labels),
            start_time_unix_nano: p.start_time_unix_nano,
            time_unix_nano: p.time_unix_nano,
            value: Some(wrap(p.value)),
            exemplars: vec![],
            flags: 0,
        })
        .collect()
}

fn encode_temporality(temporality: AggregationTemporality) -> i32 {
    match temporality {
        AggregationTemporality::Cumulative => OtlpTemporality::Cumulative as i32,
        AggregationTemporality::Delta => OtlpTemporality::Delta as i32,
    }
}

fn encode_metric(metric: Metric) -> OtlpMetric {
    let data = match metric.data {
        MetricData::IntSum(sum) => Data::Sum(OtlpSum {
            data_points: encode_points(sum.data_points, PointValue::AsInt),
            aggregation_temporality: encode_temporality(sum.temporality),
            is_monotonic: sum.is_monotonic,
        }),
        MetricData::DoubleSum(sum) => Data::Sum(OtlpSum {
            data_points: encode_points(sum.data_points, PointValue::AsDouble),
            aggregation_temporality: encode_temporality(sum.temporality),
            is_monotonic: sum.is_monotonic,
        }),
        MetricData::IntGauge(gauge) => Data::Gauge(OtlpGauge {
            data_points: encode_points(gauge.data_points, PointValue::AsInt),
        }),
        MetricData::DoubleGauge(gauge) => Data::Gauge(OtlpGauge {
            data_points: encode_points(gauge.data_points, PointValue::AsDouble),
        }),
    };

    OtlpMetric {
        name: metric.name,
        description: metric.description,
        unit: metric.unit,
        metadata: vec![],
        data: Some(data),
    }
}
