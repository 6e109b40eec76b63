//! Time series identity.
//!
//! A [`SeriesKey`] names one time series across collection cycles: the
//! owning resource, the metric name and the data point's labels. Both
//! attribute sets are sorted on construction, so keys compare equal
//! whatever order the agent emitted them in.

use crate::metrics::types::{Attributes, Labels};
use std::fmt;

/// Canonical identity of one time series
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    resource: Vec<(String, String)>,
    metric: String,
    labels: Vec<(String, String)>,
}

impl SeriesKey {
    /// Derive the key for a data point of `metric` under `resource`.
    pub fn new(resource: &Attributes, metric: &str, labels: &Labels) -> Self {
        Self {
            resource: canonical_resource(resource),
            metric: metric.to_string(),
            labels: canonical_labels(labels),
        }
    }

    /// True if this series belongs to exactly `resource`.
    pub fn belongs_to(&self, resource: &Attributes) -> bool {
        self.resource == canonical_resource(resource)
    }
}

fn canonical_resource(resource: &Attributes) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = resource
        .iter()
        .map(|(k, v)| (k.clone(), v.canonical()))
        .collect();
    pairs.sort_unstable();
    pairs
}

fn canonical_labels(labels: &Labels) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> =
        labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    pairs.sort_unstable();
    pairs
}

fn write_pairs(f: &mut fmt::Formatter<'_>, pairs: &[(String, String)]) -> fmt::Result {
    f.write_str("{")?;
    for (i, (k, v)) in pairs.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{}={}", k, v)?;
    }
    f.write_str("}")
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_pairs(f, &self.resource)?;
        write!(f, "/{}", self.metric)?;
        write_pairs(f, &self.labels)
    }
}
