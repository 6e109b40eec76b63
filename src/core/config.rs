//! Configuration management.
//!
//! This module provides configuration handling with:
//! - YAML file support, including the agent override file merged on top
//! - CLI argument overrides
//! - Validation and defaults
//!
//! Processor rules are validated once, when the processor starts; a bad rule
//! table never reaches the per-batch path.

use crate::core::{ProcessorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File merged over the primary config when it sits in the same directory.
pub const AGENT_OVERRIDE_FILE: &str = "config-cloud-monitoring-agent.yaml";

/// Complete configuration for the collector binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Receiver configuration
    pub server: ServerConfig,
    /// Downstream configuration
    pub exporter: ExporterConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Transformation rules
    pub processor: ProcessorConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Receiver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// GRPC port for the OTLP receiver
    pub grpc_port: u16,
    /// Bind address for the receiver
    pub bind_address: IpAddr,
    /// Maximum decoded message size in bytes
    pub max_message_size: usize,
}

/// Downstream configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// OTLP/gRPC endpoint to forward to; batches are only logged when unset
    pub endpoint: Option<String>,
    /// Per-export timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Include targets, thread ids and line numbers
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Split one label-multiplexed metric into one metric per label value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRule {
    /// Label carrying the multiplexed dimension
    pub label: String,
    /// Label value to name suffix
    pub suffixes: BTreeMap<String, String>,
}

impl SplitRule {
    pub fn new<const N: usize>(label: &str, suffixes: [(&str, &str); N]) -> Self {
        Self {
            label: label.to_string(),
            suffixes: suffixes
                .into_iter()
                .map(|(value, suffix)| (value.to_string(), suffix.to_string()))
                .collect(),
        }
    }

    /// Name of the metric carrying `label_value`, if mapped.
    pub fn target_name(&self, metric: &str, label_value: &str) -> Option<String> {
        self.suffixes
            .get(label_value)
            .map(|suffix| format!("{}{}", metric, suffix))
    }
}

/// Inclusive bounds applied to derived utilization values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClampBounds {
    pub min: f64,
    pub max: f64,
}

impl ClampBounds {
    /// Fraction of capacity
    pub const UNIT: ClampBounds = ClampBounds { min: 0.0, max: 1.0 };

    /// Clamp `value` into the bounds.
    ///
    /// # Panics
    ///
    /// If `min > max` or either bound is NaN. [`ProcessorConfig::validate`]
    /// rejects such rules.
    pub fn apply(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Derive a utilization gauge from a cumulative time counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationRule {
    /// Cumulative counter to read
    pub source: String,
    /// Gauge to emit
    pub target: String,
    /// Multiplier applied to the rate (100 for percent)
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Optional clamp applied after scaling
    #[serde(default)]
    pub clamp: Option<ClampBounds>,
    /// Drop the source counter once it has fed the derivation
    #[serde(default)]
    pub drop_source: bool,
}

fn default_scale() -> f64 {
    1.0
}

impl UtilizationRule {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            scale: default_scale(),
            clamp: None,
            drop_source: false,
        }
    }

    pub fn with_clamp(mut self, clamp: ClampBounds) -> Self {
        self.clamp = Some(clamp);
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn dropping_source(mut self) -> Self {
        self.drop_source = true;
        self
    }
}

/// Transformation rules for the processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Data-point label identifying a process
    pub process_label: String,
    /// Resource attribute the process identity is promoted to
    pub process_attribute: String,
    /// Metric name to split rule
    pub split_rules: BTreeMap<String, SplitRule>,
    /// Utilization derivations
    pub utilization: Vec<UtilizationRule>,
    /// Forget series not observed for this long
    #[serde(with = "humantime_serde")]
    pub state_ttl: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            server: ServerConfig::default(),
            exporter: ExporterConfig::default(),
            logging: LoggingConfig::default(),
            processor: ProcessorConfig::default(),
            debug: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            grpc_port: 4317,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            max_message_size: 4 * 1024 * 1024,
        }
    }
}

impl Default for ExporterConfig {
    fn default() -> Self {
        ExporterConfig {
            endpoint: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        let disk = SplitRule::new("direction", [("read", ".read"), ("write", ".write")]);
        let network = SplitRule::new(
            "direction",
            [("receive", ".receive"), ("transmit", ".transmit")],
        );

        let mut split_rules = BTreeMap::new();
        split_rules.insert("system.disk.io".to_string(), disk.clone());
        split_rules.insert("system.disk.operations".to_string(), disk.clone());
        split_rules.insert("process.disk.io".to_string(), disk);
        split_rules.insert("system.network.io".to_string(), network);

        ProcessorConfig {
            process_label: "process.pid".to_string(),
            process_attribute: "process.pid".to_string(),
            split_rules,
            utilization: vec![
                UtilizationRule::new("system.cpu.time", "system.cpu.utilization"),
                UtilizationRule::new("process.cpu.time", "process.cpu.utilization"),
            ],
            state_ttl: Some(Duration::from_secs(600)),
        }
    }
}

impl ProcessorConfig {
    /// Rules that do nothing; every pass passes data through.
    pub fn empty() -> Self {
        ProcessorConfig {
            split_rules: BTreeMap::new(),
            utilization: Vec::new(),
            state_ttl: None,
            ..ProcessorConfig::default()
        }
    }

    /// Validate the rule tables
    pub fn validate(&self) -> Result<()> {
        if self.process_label.is_empty() {
            return Err(ProcessorError::config("process_label must not be empty"));
        }
        if self.process_attribute.is_empty() {
            return Err(ProcessorError::config("process_attribute must not be empty"));
        }

        self.validate_split_rules()?;
        self.validate_utilization_rules()?;

        if self.state_ttl == Some(Duration::ZERO) {
            return Err(ProcessorError::config("state_ttl must be greater than 0"));
        }

        Ok(())
    }

    fn validate_split_rules(&self) -> Result<()> {
        // generated name -> source metric
        let mut generated: HashMap<String, &str> = HashMap::new();

        for (metric, rule) in &self.split_rules {
            if metric.is_empty() {
                return Err(ProcessorError::config("split rule metric name must not be empty"));
            }
            if rule.label.is_empty() {
                return Err(ProcessorError::config(format!(
                    "split rule for '{}' has an empty label",
                    metric
                )));
            }
            if rule.suffixes.is_empty() {
                return Err(ProcessorError::config(format!(
                    "split rule for '{}' has no suffixes",
                    metric
                )));
            }

            let mut seen_suffixes = HashSet::new();
            for (value, suffix) in &rule.suffixes {
                if suffix.is_empty() {
                    return Err(ProcessorError::config(format!(
                        "split rule for '{}' maps '{}' to an empty suffix",
                        metric, value
                    )));
                }
                if !seen_suffixes.insert(suffix.as_str()) {
                    return Err(ProcessorError::config(format!(
                        "split rule for '{}' maps several values to suffix '{}'",
                        metric, suffix
                    )));
                }

                let name = format!("{}{}", metric, suffix);
                if let Some(other) = generated.insert(name.clone(), metric) {
                    return Err(ProcessorError::config(format!(
                        "split rules for '{}' and '{}' both generate '{}'",
                        other, metric, name
                    )));
                }
            }
        }

        for name in generated.keys() {
            if self.split_rules.contains_key(name) {
                return Err(ProcessorError::config(format!(
                    "generated metric '{}' is itself a split source",
                    name
                )));
            }
        }

        Ok(())
    }

    fn validate_utilization_rules(&self) -> Result<()> {
        let mut sources = HashSet::new();
        let mut targets = HashSet::new();

        for rule in &self.utilization {
            if rule.source.is_empty() || rule.target.is_empty() {
                return Err(ProcessorError::config(
                    "utilization rule source and target must not be empty",
                ));
            }
            if rule.source == rule.target {
                return Err(ProcessorError::config(format!(
                    "utilization rule for '{}' targets its own source",
                    rule.source
                )));
            }
            if !sources.insert(rule.source.as_str()) {
                return Err(ProcessorError::config(format!(
                    "duplicate utilization source '{}'",
                    rule.source
                )));
            }
            if !targets.insert(rule.target.as_str()) {
                return Err(ProcessorError::config(format!(
                    "duplicate utilization target '{}'",
                    rule.target
                )));
            }
            if !rule.scale.is_finite() || rule.scale <= 0.0 {
                return Err(ProcessorError::config(format!(
                    "utilization scale for '{}' must be positive, got {}",
                    rule.source, rule.scale
                )));
            }
            if let Some(clamp) = rule.clamp {
                if !clamp.min.is_finite() || !clamp.max.is_finite() || clamp.min > clamp.max {
                    return Err(ProcessorError::config(format!(
                        "invalid clamp for '{}': [{}, {}]",
                        rule.source, clamp.min, clamp.max
                    )));
                }
            }
        }

        Ok(())
    }
}

impl AppConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.grpc_port == 0 {
            return Err(ProcessorError::config("grpc_port must be greater than 0"));
        }
        if self.server.max_message_size == 0 {
            return Err(ProcessorError::config("max_message_size must be greater than 0"));
        }
        if self.exporter.timeout.is_zero() {
            return Err(ProcessorError::config("exporter timeout must be greater than 0"));
        }
        if let Some(endpoint) = &self.exporter.endpoint {
            if endpoint.trim().is_empty() {
                return Err(ProcessorError::config("exporter endpoint must not be blank"));
            }
        }

        self.processor.validate()
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    document: serde_yaml::Value,
    overrides: Vec<Box<dyn FnOnce(&mut AppConfig)>>,
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            document: serde_yaml::Value::Mapping(serde_yaml::Mapping::new()),
            overrides: Vec::new(),
        }
    }

    /// Load configuration from a YAML string, replacing earlier documents
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.document = parse_document(yaml)?;
        Ok(self)
    }

    /// Merge a YAML document over what has been loaded so far
    pub fn merge_yaml(mut self, yaml: &str) -> Result<Self> {
        let overlay = parse_document(yaml)?;
        merge_values(&mut self.document, overlay);
        Ok(self)
    }

    /// Load configuration from a YAML file
    pub fn from_file(self, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProcessorError::config(format!("error loading config file {:?}: {}", path, e))
        })?;
        self.from_yaml(&content)
    }

    /// Merge the agent override file from `dir`, when there is one
    pub fn with_agent_overrides(self, dir: &Path) -> Result<Self> {
        let path = dir.join(AGENT_OVERRIDE_FILE);
        if !path.exists() {
            tracing::debug!("No agent override file at {:?}", path);
            return Ok(self);
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            ProcessorError::config(format!("error loading config file {:?}: {}", path, e))
        })?;
        tracing::info!("Merging agent overrides from {:?}", path);
        self.merge_yaml(&content)
    }

    /// Set GRPC port
    pub fn grpc_port(mut self, port: u16) -> Self {
        self.overrides
            .push(Box::new(move |c| c.server.grpc_port = port));
        self
    }

    /// Set downstream endpoint
    pub fn endpoint(mut self, endpoint: String) -> Self {
        self.overrides
            .push(Box::new(move |c| c.exporter.endpoint = Some(endpoint)));
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.overrides.push(Box::new(move |c| {
            c.debug = debug;
            if debug {
                c.logging.level = LogLevel::Debug;
            }
        }));
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<AppConfig> {
        let mut config: AppConfig = serde_yaml::from_value(self.document)
            .map_err(|e| ProcessorError::config(format!("Failed to parse YAML config: {}", e)))?;

        for apply in self.overrides {
            apply(&mut config);
        }

        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_document(yaml: &str) -> Result<serde_yaml::Value> {
    let value: serde_yaml::Value = serde_yaml::from_str(yaml)
        .map_err(|e| ProcessorError::config(format!("Failed to parse YAML config: {}", e)))?;

    match value {
        serde_yaml::Value::Null => Ok(serde_yaml::Value::Mapping(serde_yaml::Mapping::new())),
        serde_yaml::Value::Mapping(_) => Ok(value),
        _ => Err(ProcessorError::config("configuration root must be a mapping")),
    }
}

/// Mappings merge key by key; anything else in `overlay` replaces `base`.
fn merge_values(base: &mut serde_yaml::Value, overlay: serde_yaml::Value) {
    match (base, overlay) {
        (serde_yaml::Value::Mapping(base), serde_yaml::Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    },
                }
            }
        },
        (base, overlay) => *base = overlay,
    }
}

/// Default config file location
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("agentmetrics").join("config.yaml"))
        .unwrap_or_else(|| PathBuf::from("~/.config/agentmetrics/config.yaml"))
}
