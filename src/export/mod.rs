//! Downstream consumers.
//!
//! The processor forwards every rewritten batch to a [`MetricsConsumer`].
//! Three are provided:
//!
//! - [`OtlpExporter`]: forwards over OTLP/gRPC
//! - [`LoggingExporter`]: logs a summary and drops the batch
//! - [`CollectingConsumer`]: keeps batches in memory, for tests and embedding

use crate::core::{ProcessorError, Result};
use crate::metrics::MetricBatch;
use crate::processor::MetricsConsumer;
use async_trait::async_trait;
use opentelemetry_proto::tonic::collector::metrics::v1::metrics_service_client::MetricsServiceClient;
use parking_lot::Mutex;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};

/// Forwards batches to an OTLP/gRPC endpoint.
#[derive(Debug, Clone)]
pub struct OtlpExporter {
    client: MetricsServiceClient<Channel>,
    endpoint: String,
}

impl OtlpExporter {
    /// Build an exporter whose channel connects on first use.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn connect_lazy(endpoint: &str, timeout: Duration) -> Result<Self> {
        let channel = Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| ProcessorError::config(format!("Invalid endpoint '{}': {}", endpoint, e)))?
            .timeout(timeout)
            .connect_timeout(timeout)
            .connect_lazy();

        tracing::info!(endpoint, ?timeout, "OTLP exporter configured");
        Ok(Self {
            client: MetricsServiceClient::new(channel),
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MetricsConsumer for OtlpExporter {
    async fn consume_metrics(&self, batch: MetricBatch) -> Result<()> {
        let points = batch.data_point_count();
        let mut client = self.client.clone();

        let response = client
            .export(tonic::Request::new(batch.into_otlp()))
            .await
            .map_err(|status| {
                if status.code() == tonic::Code::Unavailable {
                    ProcessorError::transport(format!("{}: {}", self.endpoint, status.message()))
                } else {
                    ProcessorError::Grpc(status)
                }
            })?;

        if let Some(partial) = response.into_inner().partial_success {
            if partial.rejected_data_points > 0 {
                tracing::warn!(
                    endpoint = %self.endpoint,
                    rejected = partial.rejected_data_points,
                    "Downstream rejected data points: {}",
                    partial.error_message
                );
            }
        }

        tracing::trace!(endpoint = %self.endpoint, points, "Exported batch");
        Ok(())
    }
}

/// Logs what it receives.
#[derive(Debug, Default)]
pub struct LoggingExporter;

impl LoggingExporter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetricsConsumer for LoggingExporter {
    async fn consume_metrics(&self, batch: MetricBatch) -> Result<()> {
        tracing::info!(
            resources = batch.resource_metrics.len(),
            metrics = batch.metric_count(),
            points = batch.data_point_count(),
            "Received metric batch"
        );
        for rm in &batch.resource_metrics {
            for metric in &rm.metrics {
                tracing::debug!(
                    metric = %metric.name,
                    metric_type = %metric.metric_type(),
                    points = metric.data.len(),
                    "Metric"
                );
            }
        }
        Ok(())
    }
}

/// In-memory sink.
#[derive(Debug, Default)]
pub struct CollectingConsumer {
    batches: Mutex<Vec<MetricBatch>>,
    failure: Option<String>,
}

impl CollectingConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that refuses every batch with a downstream error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            failure: Some(message.into()),
        }
    }

    /// Batches received so far, oldest first.
    pub fn batches(&self) -> Vec<MetricBatch> {
        self.batches.lock().clone()
    }

    /// Drain the received batches.
    pub fn take(&self) -> Vec<MetricBatch> {
        std::mem::take(&mut *self.batches.lock())
    }

    pub fn len(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MetricsConsumer for CollectingConsumer {
    async fn consume_metrics(&self, batch: MetricBatch) -> Result<()> {
        if let Some(message) = &self.failure {
            return Err(ProcessorError::downstream(message.clone()));
        }
        self.batches.lock().push(batch);
        Ok(())
    }
}
