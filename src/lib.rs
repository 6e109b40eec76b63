//! agentmetrics - normalization stage for host-monitoring agent metrics.
//!
//! Legacy monitoring agents report metrics in a shape that differs from
//! current conventions. This crate rewrites every batch in flight so the
//! rest of an OTLP pipeline sees canonical metrics.
//!
//! # Features
//!
//! - **Gauge normalization**: non-monotonic sums become gauges
//! - **Process resources**: per-process points move to their own resource
//! - **Metric splitting**: `direction=read|write` style labels become metric names
//! - **Utilization**: cumulative time counters yield utilization gauges
//! - **OTLP/gRPC**: receive on port 4317, forward to any OTLP endpoint
//!
//! # Architecture
//!
//! - `metrics`: batch model, series identity and derivation state
//! - `processor`: the four passes and the lifecycle façade
//! - `receiver`: OTLP metrics service
//! - `export`: downstream consumers
//! - `core`: configuration and errors
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use agentmetrics_lib::core::ProcessorConfig;
//! use agentmetrics_lib::export::CollectingConsumer;
//! use agentmetrics_lib::metrics::MetricBatch;
//! use agentmetrics_lib::processor::{AgentMetricsProcessor, MetricsConsumer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sink = Arc::new(CollectingConsumer::new());
//!     let processor = AgentMetricsProcessor::new(ProcessorConfig::default(), sink);
//!     processor.start()?;
//!     processor.consume_metrics(MetricBatch::default()).await?;
//!     processor.shutdown()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod cli;
pub mod core;
pub mod export;
pub mod metrics;
pub mod processor;
pub mod receiver;

// Re-export core types for convenience
pub use crate::core::{ProcessorConfig, ProcessorError, Result};
pub use crate::metrics::MetricBatch;
pub use crate::processor::{AgentMetricsProcessor, MetricsConsumer};
