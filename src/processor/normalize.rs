//! Non-monotonic sum normalization.
//!
//! The agent reports "free"-style counters as non-monotonic cumulative sums.
//! Downstream expects those as gauges, so they are re-tagged with their
//! points untouched.

use crate::metrics::{Gauge, MetricBatch, MetricData};

/// Rewrite every non-monotonic sum in the batch as a gauge.
pub(crate) fn convert_non_monotonic_sums(batch: &mut MetricBatch) {
    let mut converted = 0usize;

    for rm in &mut batch.resource_metrics {
        for metric in &mut rm.metrics {
            let empty = MetricData::IntGauge(Gauge {
                data_points: Vec::new(),
            });
            let data = std::mem::replace(&mut metric.data, empty);
            metric.data = match data {
                MetricData::IntSum(sum) if !sum.is_monotonic => {
                    converted += 1;
                    MetricData::IntGauge(Gauge {
                        data_points: sum.data_points,
                    })
                },
                MetricData::DoubleSum(sum) if !sum.is_monotonic => {
                    converted += 1;
                    MetricData::DoubleGauge(Gauge {
                        data_points: sum.data_points,
                    })
                },
                other => other,
            };
        }
    }

    if converted > 0 {
        tracing::trace!(converted, "Converted non-monotonic sums to gauges");
    }
}
