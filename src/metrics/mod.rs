//! Metric batch model and series bookkeeping.
//!
//! - `types`: the batch model the processor consumes and produces
//! - `series`: order-independent time series identity
//! - `state`: previous observations for rate derivation
//! - `otlp`: conversion to and from OTLP export requests

pub mod otlp;
pub mod series;
pub mod state;
pub mod types;

pub use otlp::DecodedBatch;
pub use series::SeriesKey;
pub use state::{DerivationState, DerivationStateEntry, Observation};
pub use types::{
    labels, AggregationTemporality, AttributeValue, Attributes, DataPoint, Gauge, Labels, Metric,
    MetricBatch, MetricData, MetricType, NumberValue, ResourceMetrics, Sum,
};
