//! Metric splitting.
//!
//! Some agent metrics multiplex two quantities through a label, for example
//! `direction=read|write` on one disk I/O counter. A split rule turns every
//! mapped label value into its own metric and removes the label.

use crate::core::SplitRule;
use crate::metrics::{Attributes, MetricBatch, MetricData, SeriesKey};
use std::collections::{BTreeMap, HashSet};

/// Apply the split rules to every resource group in the batch.
///
/// Points whose label is missing or maps to no suffix stay in the original
/// metric, which is kept only while it still has points.
pub(crate) fn split_metrics(batch: &mut MetricBatch, rules: &BTreeMap<String, SplitRule>) {
    if rules.is_empty() {
        return;
    }

    for rm in &mut batch.resource_metrics {
        let metrics = std::mem::take(&mut rm.metrics);
        let mut out = Vec::with_capacity(metrics.len());

        for mut metric in metrics {
            let Some(rule) = rules.get(&metric.name) else {
                out.push(metric);
                continue;
            };

            let parts = metric.data.partition_by(|labels| {
                let value = labels.get(&rule.label)?;
                if !rule.suffixes.contains_key(value) {
                    return None;
                }
                labels.remove(&rule.label)
            });

            if parts.is_empty() {
                tracing::debug!(
                    metric = %metric.name,
                    label = %rule.label,
                    "No data point carries a mapped split label"
                );
                out.push(metric);
                continue;
            }

            let mut split = Vec::with_capacity(parts.len());
            for (value, data) in parts {
                let Some(name) = rule.target_name(&metric.name, &value) else {
                    continue;
                };
                if tracing::enabled!(tracing::Level::DEBUG) {
                    report_duplicate_series(&rm.resource, &name, &data);
                }
                split.push(metric.with_data(name, data));
            }

            if !metric.data.is_empty() {
                tracing::debug!(
                    metric = %metric.name,
                    remaining = metric.data.len(),
                    "Unmapped split label values left in place"
                );
                out.push(metric);
            }
            out.extend(split);
        }

        rm.metrics = out;
    }
}

/// Removing the split label can make two points share a series; keep both.
fn report_duplicate_series(resource: &Attributes, metric: &str, data: &MetricData) {
    let mut seen = HashSet::new();
    for labels in data.labels() {
        let key = SeriesKey::new(resource, metric, labels);
        if !seen.insert(key.clone()) {
            tracing::debug!(series = %key, "Split produced a duplicate series");
        }
    }
}
