//! Agent metrics processor.
//!
//! Rewrites batches from the legacy host-monitoring agent into the canonical
//! shape before they continue downstream. Every batch runs through four
//! passes in a fixed order:
//!
//! 1. `normalize`: non-monotonic sums become gauges
//! 2. `process`: per-process points get their own resource group
//! 3. `split`: label-multiplexed metrics become one metric per label value
//! 4. `utilization`: cumulative time counters yield utilization gauges
//!
//! Splitting runs after explosion so it sees process-level resources, and
//! derivation runs last so it keys on the final metric names and resources.

mod normalize;
mod process;
mod split;
mod utilization;

use crate::core::{ProcessorConfig, ProcessorError, Result};
use crate::metrics::{DerivationState, MetricBatch};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use normalize::convert_non_monotonic_sums;
use process::explode_process_resources;
use split::split_metrics;
use utilization::append_utilization_metrics;

/// Next stage of the pipeline
#[async_trait]
pub trait MetricsConsumer: Send + Sync {
    /// Hand a batch to this stage.
    async fn consume_metrics(&self, batch: MetricBatch) -> Result<()>;
}

/// What a pipeline stage does to the data it is given
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// The batch passed in is rewritten; callers must not reuse it.
    pub mutates_consumed_data: bool,
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Stopped,
    Running,
}

/// Lifecycle wrapper owning the derivation state.
///
/// Safe to call from many tasks at once: the first three passes are
/// batch-local and the state store serializes access per series.
pub struct AgentMetricsProcessor {
    config: ProcessorConfig,
    next: Arc<dyn MetricsConsumer>,
    state: RwLock<Option<Arc<DerivationState>>>,
}

impl AgentMetricsProcessor {
    /// Create a stopped processor forwarding to `next`.
    pub fn new(config: ProcessorConfig, next: Arc<dyn MetricsConsumer>) -> Self {
        Self {
            config,
            next,
            state: RwLock::new(None),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            mutates_consumed_data: true,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        if self.state.read().is_some() {
            Lifecycle::Running
        } else {
            Lifecycle::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle() == Lifecycle::Running
    }

    /// Validate the rules and allocate a fresh state store.
    pub fn start(&self) -> Result<()> {
        let state = DerivationState::new(self.config.state_ttl);
        self.start_with_state(state)
    }

    /// Start with a pre-populated state store.
    pub fn start_with_state(&self, state: DerivationState) -> Result<()> {
        self.config.validate()?;

        let mut guard = self.state.write();
        if guard.is_some() {
            return Err(ProcessorError::AlreadyRunning);
        }
        *guard = Some(Arc::new(state));

        tracing::info!(
            split_rules = self.config.split_rules.len(),
            utilization_rules = self.config.utilization.len(),
            "Agent metrics processor started"
        );
        Ok(())
    }

    /// Release the state store. Calls already in flight finish with the
    /// store they started with.
    pub fn shutdown(&self) -> Result<()> {
        if let Some(state) = self.state.write().take() {
            tracing::info!(series = state.len(), "Agent metrics processor stopped");
        }
        Ok(())
    }

    /// The current state store, while running.
    pub fn state(&self) -> Option<Arc<DerivationState>> {
        self.state.read().as_ref().map(Arc::clone)
    }

    /// Run all passes over `batch` and return the rewritten batch.
    pub fn process_metrics(&self, mut batch: MetricBatch) -> Result<MetricBatch> {
        let state = self.state().ok_or(ProcessorError::NotRunning)?;

        convert_non_monotonic_sums(&mut batch);
        explode_process_resources(
            &mut batch,
            &self.config.process_label,
            &self.config.process_attribute,
        );
        split_metrics(&mut batch, &self.config.split_rules);
        append_utilization_metrics(&mut batch, &self.config.utilization, &state);

        Ok(batch)
    }
}

#[async_trait]
impl MetricsConsumer for AgentMetricsProcessor {
    /// Transform `batch` and forward it; downstream errors come back as-is.
    async fn consume_metrics(&self, batch: MetricBatch) -> Result<()> {
        let batch = self.process_metrics(batch)?;
        let result = self.next.consume_metrics(batch).await;
        if let Err(e) = &result {
            tracing::warn!(category = e.category(), "Downstream consumer failed: {}", e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::CollectingConsumer;
    use crate::metrics::{labels, Attributes, DataPoint, Metric, ResourceMetrics};

    fn processor() -> (AgentMetricsProcessor, Arc<CollectingConsumer>) {
        let sink = Arc::new(CollectingConsumer::new());
        let processor = AgentMetricsProcessor::new(
            ProcessorConfig::default(),
            Arc::clone(&sink) as Arc<dyn MetricsConsumer>,
        );
        (processor, sink)
    }

    #[test]
    fn test_lifecycle_transitions() {
        let (processor, _) = processor();
        assert_eq!(processor.lifecycle(), Lifecycle::Stopped);
        assert!(processor.capabilities().mutates_consumed_data);

        processor.start().unwrap();
        assert!(processor.is_running());
        assert!(matches!(processor.start(), Err(ProcessorError::AlreadyRunning)));

        processor.shutdown().unwrap();
        assert!(!processor.is_running());
        assert!(processor.state().is_none());
        // second shutdown is a no-op
        assert!(processor.shutdown().is_ok());
    }

    #[test]
    fn test_process_requires_running() {
        let (processor, _) = processor();
        let result = processor.process_metrics(MetricBatch::default());
        assert!(matches!(result, Err(ProcessorError::NotRunning)));
    }

    #[test]
    fn test_invalid_config_refuses_start() {
        let mut config = ProcessorConfig::empty();
        config.process_attribute.clear();
        let processor = AgentMetricsProcessor::new(config, Arc::new(CollectingConsumer::new()));

        assert!(matches!(processor.start(), Err(ProcessorError::Config(_))));
        assert!(!processor.is_running());
    }

    #[test]
    fn test_inverted_clamp_refuses_start() {
        let mut config = ProcessorConfig::empty();
        config.utilization.push(
            crate::core::UtilizationRule::new("system.cpu.time", "system.cpu.utilization")
                .with_clamp(crate::core::ClampBounds { min: 1.0, max: 0.0 }),
        );
        let processor = AgentMetricsProcessor::new(config, Arc::new(CollectingConsumer::new()));

        assert!(matches!(processor.start(), Err(ProcessorError::Config(_))));
        assert!(matches!(
            processor.process_metrics(MetricBatch::default()),
            Err(ProcessorError::NotRunning)
        ));
    }

    #[test]
    fn test_restart_gets_fresh_state() {
        let (processor, _) = processor();
        processor.start().unwrap();
        let batch = MetricBatch::new(vec![ResourceMetrics::new(
            Attributes::new(),
            vec![Metric::double_sum(
                "system.cpu.time",
                true,
                vec![DataPoint::new(labels([]), 0, 1, 1.0)],
            )],
        )]);
        processor.process_metrics(batch).unwrap();
        assert_eq!(processor.state().unwrap().len(), 1);

        processor.shutdown().unwrap();
        processor.start().unwrap();
        assert!(processor.state().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_consume_forwards_to_next() {
        let (processor, sink) = processor();
        processor.start().unwrap();

        processor
            .consume_metrics(MetricBatch::new(vec![ResourceMetrics::default()]))
            .await
            .unwrap();

        assert_eq!(sink.batches().len(), 1);
    }
}
