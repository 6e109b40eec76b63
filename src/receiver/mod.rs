//! OTLP/gRPC receiver.
//!
//! Hosts the metrics service in front of the processor.

pub mod metrics;

use crate::core::{ProcessorError, Result, ServerConfig};
use crate::processor::AgentMetricsProcessor;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::transport::Server;

pub use metrics::{create_metrics_service_server, status_from_error, MetricsReceiver};

/// Serve OTLP metrics until `shutdown` resolves.
pub async fn serve<F>(
    config: &ServerConfig,
    processor: Arc<AgentMetricsProcessor>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    let addr = SocketAddr::new(config.bind_address, config.grpc_port);
    let service = create_metrics_service_server(processor, config.max_message_size);

    tracing::info!("GRPC server binding to {}", addr);

    match Server::builder()
        .add_service(service)
        .serve_with_shutdown(addr, shutdown)
        .await
    {
        Ok(()) => {
            tracing::info!("GRPC server stopped gracefully");
            Ok(())
        },
        Err(e) => {
            tracing::error!("GRPC server error: {} (binding to {})", e, addr);
            if e.to_string().contains("Address already in use") {
                Err(ProcessorError::transport(format!("Port {} already in use", addr.port())))
            } else {
                Err(ProcessorError::transport(format!("Failed to start GRPC server: {}", e)))
            }
        },
    }
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }
}
