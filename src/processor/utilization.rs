//! Utilization derivation.
//!
//! Turns a cumulative "active time" counter into a utilization gauge by
//! dividing the counter's growth by the wall-clock time between two
//! consecutive observations of the same series. The previous observation
//! lives in the [`DerivationState`] the processor owns.

use crate::core::UtilizationRule;
use crate::metrics::{
    AggregationTemporality, Attributes, DataPoint, DerivationState, Gauge, MetricBatch,
    MetricData, NumberValue, Observation, SeriesKey, Sum,
};

/// Unit of derived gauges
const UTILIZATION_UNIT: &str = "1";

/// Append one utilization metric after every source counter that yields a rate.
///
/// A series needs two observations before it emits anything. Counter resets
/// and out-of-order observations are skipped for the cycle.
pub(crate) fn append_utilization_metrics(
    batch: &mut MetricBatch,
    rules: &[UtilizationRule],
    state: &DerivationState,
) {
    if rules.is_empty() {
        return;
    }

    for rm in &mut batch.resource_metrics {
        let metrics = std::mem::take(&mut rm.metrics);
        let mut out = Vec::with_capacity(metrics.len() + 1);

        for metric in metrics {
            let Some(rule) = rules.iter().find(|r| r.source == metric.name) else {
                out.push(metric);
                continue;
            };

            let points = match &metric.data {
                MetricData::IntSum(sum) if is_cumulative_counter(sum) => Some(derive_points(
                    &rm.resource,
                    &metric.name,
                    &sum.data_points,
                    rule,
                    state,
                )),
                MetricData::DoubleSum(sum) if is_cumulative_counter(sum) => Some(derive_points(
                    &rm.resource,
                    &metric.name,
                    &sum.data_points,
                    rule,
                    state,
                )),
                _ => None,
            };

            let Some(points) = points else {
                tracing::debug!(
                    metric = %metric.name,
                    metric_type = %metric.metric_type(),
                    "Utilization source is not a cumulative monotonic sum, passing through"
                );
                out.push(metric);
                continue;
            };

            let derived = if points.is_empty() {
                None
            } else {
                let mut derived = metric.with_data(
                    rule.target.clone(),
                    MetricData::DoubleGauge(Gauge {
                        data_points: points,
                    }),
                );
                derived.unit = UTILIZATION_UNIT.to_string();
                Some(derived)
            };

            if !rule.drop_source {
                out.push(metric);
            }
            out.extend(derived);
        }

        rm.metrics = out;
    }

    state.evict_stale();
}

fn is_cumulative_counter<T>(sum: &Sum<T>) -> bool {
    sum.is_monotonic && sum.temporality == AggregationTemporality::Cumulative
}

fn derive_points<T: NumberValue>(
    resource: &Attributes,
    metric: &str,
    points: &[DataPoint<T>],
    rule: &UtilizationRule,
    state: &DerivationState,
) -> Vec<DataPoint<f64>> {
    points
        .iter()
        .filter_map(|point| {
            let key = SeriesKey::new(resource, metric, &point.labels);
            match state.observe(key, point.value.as_f64(), point.time_unix_nano) {
                Observation::Rate {
                    delta_value,
                    elapsed_seconds,
                    previous_time_unix_nano,
                } => {
                    let mut value = delta_value / elapsed_seconds * rule.scale;
                    if let Some(clamp) = rule.clamp {
                        value = clamp.apply(value);
                    }
                    Some(DataPoint::new(
                        point.labels.clone(),
                        previous_time_unix_nano,
                        point.time_unix_nano,
                        value,
                    ))
                },
                Observation::First => None,
                Observation::Reset => {
                    tracing::debug!(
                        metric,
                        labels = ?point.labels,
                        "Counter reset, resyncing baseline"
                    );
                    None
                },
                Observation::Invalid => {
                    tracing::debug!(
                        metric,
                        labels = ?point.labels,
                        "Non-finite counter value, skipping"
                    );
                    None
                },
                Observation::Stale => {
                    tracing::debug!(
                        metric,
                        labels = ?point.labels,
                        time_unix_nano = point.time_unix_nano,
                        "Observation not newer than stored state, skipping"
                    );
                    None
                },
            }
        })
        .collect()
}
