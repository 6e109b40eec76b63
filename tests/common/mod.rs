//! Common test utilities and fixtures.

#![allow(dead_code)]

use agentmetrics_lib::core::ProcessorConfig;
use agentmetrics_lib::export::CollectingConsumer;
use agentmetrics_lib::metrics::{
    labels, AttributeValue, Attributes, DataPoint, Metric, MetricBatch, MetricData,
    ResourceMetrics,
};
use agentmetrics_lib::processor::AgentMetricsProcessor;
use std::sync::Arc;

pub const SECOND: u64 = 1_000_000_000;

/// Resource attributes from string pairs.
pub fn resource<const N: usize>(pairs: [(&str, &str); N]) -> Attributes {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), AttributeValue::from(v)))
        .collect()
}

pub fn host() -> Attributes {
    resource([("host.name", "test-host")])
}

/// One resource group holding `metrics`.
pub fn batch(resource: Attributes, metrics: Vec<Metric>) -> MetricBatch {
    MetricBatch::new(vec![ResourceMetrics::new(resource, metrics)])
}

/// A running processor with default rules and an in-memory sink.
pub fn started_processor() -> (AgentMetricsProcessor, Arc<CollectingConsumer>) {
    started_processor_with(ProcessorConfig::default())
}

pub fn started_processor_with(
    config: ProcessorConfig,
) -> (AgentMetricsProcessor, Arc<CollectingConsumer>) {
    let sink = Arc::new(CollectingConsumer::new());
    let processor = AgentMetricsProcessor::new(config, Arc::clone(&sink) as _);
    processor.start().unwrap();
    (processor, sink)
}

/// A `system.cpu.time` counter with one point per `(cpu, value)`.
pub fn cpu_time(time_unix_nano: u64, cpus: &[(&str, f64)]) -> Metric {
    Metric::double_sum(
        "system.cpu.time",
        true,
        cpus.iter()
            .map(|&(cpu, value)| DataPoint::new(labels([("cpu", cpu)]), 0, time_unix_nano, value))
            .collect(),
    )
}

/// Values of every double gauge named `name`, in batch order.
pub fn gauge_values(batch: &MetricBatch, name: &str) -> Vec<f64> {
    batch
        .resource_metrics
        .iter()
        .flat_map(|rm| &rm.metrics)
        .filter(|m| m.name == name)
        .flat_map(|m| match &m.data {
            MetricData::DoubleGauge(g) => g.data_points.iter().map(|p| p.value).collect(),
            _ => Vec::new(),
        })
        .collect()
}

/// Metric names per resource group.
pub fn metric_names(batch: &MetricBatch) -> Vec<Vec<String>> {
    batch
        .resource_metrics
        .iter()
        .map(|rm| rm.metrics.iter().map(|m| m.name.clone()).collect())
        .collect()
}
