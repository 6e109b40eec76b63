//! Process resource explosion.
//!
//! The agent reports every process under the host resource and tells them
//! apart with a data-point label. Each distinct label value becomes its own
//! resource group with the identity promoted to a resource attribute.

use crate::metrics::{AttributeValue, MetricBatch, ResourceMetrics};
use std::collections::HashMap;

/// Split resource groups carrying `label` into one group per process.
///
/// Points without the label stay in the original group, which is dropped
/// only if explosion emptied it. Synthesized groups follow the original, in
/// first-seen order of their identity value.
pub(crate) fn explode_process_resources(batch: &mut MetricBatch, label: &str, attribute: &str) {
    let groups = std::mem::take(&mut batch.resource_metrics);
    let mut out = Vec::with_capacity(groups.len());

    for rm in groups {
        explode_group(rm, label, attribute, &mut out);
    }

    batch.resource_metrics = out;
}

fn explode_group(
    mut rm: ResourceMetrics,
    label: &str,
    attribute: &str,
    out: &mut Vec<ResourceMetrics>,
) {
    let carries_label = rm
        .metrics
        .iter()
        .any(|m| m.data.labels().iter().any(|l| l.contains_key(label)));
    if !carries_label {
        out.push(rm);
        return;
    }

    let mut processes: Vec<ResourceMetrics> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut drained = vec![false; rm.metrics.len()];

    for (i, metric) in rm.metrics.iter_mut().enumerate() {
        let parts = metric.data.partition_by(|labels| labels.remove(label));
        if parts.is_empty() {
            continue;
        }
        drained[i] = metric.data.is_empty();

        for (identity, data) in parts {
            let slot = *index.entry(identity.clone()).or_insert_with(|| {
                let mut resource = rm.resource.clone();
                resource.insert(attribute.to_string(), AttributeValue::String(identity));
                processes.push(ResourceMetrics::new(resource, Vec::new()));
                processes.len() - 1
            });
            processes[slot]
                .metrics
                .push(metric.with_data(metric.name.clone(), data));
        }
    }

    let mut drained = drained.into_iter();
    rm.metrics.retain(|_| !drained.next().unwrap_or(false));

    tracing::debug!(
        processes = processes.len(),
        remaining_metrics = rm.metrics.len(),
        "Exploded process resource group"
    );

    if !rm.metrics.is_empty() {
        out.push(rm);
    }
    out.extend(processes);
}
