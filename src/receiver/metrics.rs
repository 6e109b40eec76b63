//! OTLP metrics service.
//!
//! Decodes each export request, runs it through the processor and reports
//! unsupported points back as a partial success.

use crate::core::ProcessorError;
use crate::metrics::MetricBatch;
use crate::processor::{AgentMetricsProcessor, MetricsConsumer};
use opentelemetry_proto::tonic::collector::metrics::v1::{
    metrics_service_server::{MetricsService, MetricsServiceServer},
    ExportMetricsPartialSuccess, ExportMetricsServiceRequest, ExportMetricsServiceResponse,
};
use std::sync::Arc;
use tonic::{Request, Response, Status};

/// Create a metrics service server for GRPC
pub fn create_metrics_service_server(
    processor: Arc<AgentMetricsProcessor>,
    max_message_size: usize,
) -> MetricsServiceServer<MetricsReceiver> {
    MetricsServiceServer::new(MetricsReceiver::new(processor))
        .max_decoding_message_size(max_message_size)
}

/// OTLP metrics receiver feeding the processor
pub struct MetricsReceiver {
    processor: Arc<AgentMetricsProcessor>,
}

impl MetricsReceiver {
    pub fn new(processor: Arc<AgentMetricsProcessor>) -> Self {
        Self { processor }
    }
}

/// Map a processing failure to the status the client sees.
pub fn status_from_error(err: ProcessorError) -> Status {
    match err {
        ProcessorError::Grpc(status) => status,
        ProcessorError::NotRunning
        | ProcessorError::Transport(_)
        | ProcessorError::Downstream(_) => Status::unavailable(err.to_string()),
        other => Status::internal(other.to_string()),
    }
}

#[tonic::async_trait]
impl MetricsService for MetricsReceiver {
    async fn export(
        &self,
        request: Request<ExportMetricsServiceRequest>,
    ) -> std::result::Result<Response<ExportMetricsServiceResponse>, Status> {
        let decoded = MetricBatch::from_otlp(request.into_inner());
        tracing::debug!(
            resources = decoded.batch.resource_metrics.len(),
            points = decoded.batch.data_point_count(),
            "Received metrics via gRPC"
        );

        self.processor
            .consume_metrics(decoded.batch)
            .await
            .map_err(status_from_error)?;

        let partial_success =
            (decoded.rejected_data_points > 0).then(|| ExportMetricsPartialSuccess {
                rejected_data_points: decoded.rejected_data_points,
                error_message:
                    "histogram, exponential histogram and summary metrics are not supported"
                        .to_string(),
            });

        Ok(Response::new(ExportMetricsServiceResponse { partial_success }))
    }
}
