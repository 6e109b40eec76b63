//! Command-line interface.
//!
//! Run `agentmetrics` to receive OTLP metrics on port 4317, normalize them
//! and forward them to `--endpoint` (or just log them when no endpoint is set).

use crate::core::{config::default_config_path, AppConfig, ConfigBuilder, ProcessorError, Result};
use crate::export::{LoggingExporter, OtlpExporter};
use crate::processor::{AgentMetricsProcessor, MetricsConsumer};
use crate::receiver;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Normalizes host-monitoring agent metrics in an OTLP pipeline
#[derive(Parser, Debug)]
#[command(name = "agentmetrics")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (default: ~/.config/agentmetrics/config.yaml)
    #[arg(short, long, env = "AGENTMETRICS_CONFIG")]
    pub config: Option<PathBuf>,

    /// GRPC port for the OTLP receiver
    #[arg(long, env = "AGENTMETRICS_GRPC_PORT")]
    pub grpc_port: Option<u16>,

    /// OTLP/gRPC endpoint to forward normalized metrics to
    #[arg(long, env = "AGENTMETRICS_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Enable debug logging
    #[arg(short, long, env = "AGENTMETRICS_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments and environment (highest priority)
    /// 2. Agent override file next to the config file
    /// 3. Config file
    /// 4. Defaults (lowest priority)
    pub fn load_config(&self) -> Result<AppConfig> {
        let mut builder = ConfigBuilder::new();

        let config_path = match &self.config {
            Some(path) => Some(path.clone()),
            None => Some(default_config_path()).filter(|p| p.exists()),
        };

        if let Some(path) = &config_path {
            builder = builder.from_file(path)?;
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            builder = builder.with_agent_overrides(dir)?;
        }

        if let Some(port) = self.grpc_port {
            builder = builder.grpc_port(port);
        }
        if let Some(endpoint) = &self.endpoint {
            builder = builder.endpoint(endpoint.clone());
        }

        builder.debug(self.debug).build()
    }

    /// Initialize logging based on configuration.
    pub fn init_logging(&self, config: &AppConfig) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let env_log_level = std::env::var("AGENTMETRICS_LOG_LEVEL")
            .unwrap_or_else(|_| config.logging.level.as_str().to_string());
        let log_level = if self.debug {
            "debug"
        } else {
            env_log_level.as_str()
        };

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let fmt_layer = if config.logging.structured {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .compact()
        } else {
            tracing_subscriber::fmt::layer().with_target(false).compact()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| ProcessorError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Execute the agentmetrics application.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config()?;
    cli.init_logging(&config)?;

    if cli.check_config {
        println!("Configuration is valid!");
        println!("  GRPC port: {}", config.server.grpc_port);
        println!(
            "  Endpoint: {}",
            config.exporter.endpoint.as_deref().unwrap_or("(log only)")
        );
        println!("  Split rules: {}", config.processor.split_rules.len());
        println!("  Utilization rules: {}", config.processor.utilization.len());
        return Ok(());
    }

    run(config).await
}

/// Serve until Ctrl-C with the processor in front of the configured sink.
pub async fn run(config: AppConfig) -> Result<()> {
    let next: Arc<dyn MetricsConsumer> = match &config.exporter.endpoint {
        Some(endpoint) => Arc::new(OtlpExporter::connect_lazy(endpoint, config.exporter.timeout)?),
        None => {
            tracing::info!("No exporter endpoint configured, logging batches only");
            Arc::new(LoggingExporter::new())
        },
    };

    let processor = Arc::new(AgentMetricsProcessor::new(config.processor.clone(), next));
    processor.start()?;

    let result =
        receiver::serve(&config.server, Arc::clone(&processor), receiver::shutdown_signal()).await;

    processor.shutdown()?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(config: Option<PathBuf>) -> Cli {
        Cli {
            config,
            grpc_port: None,
            endpoint: None,
            debug: false,
            check_config: false,
        }
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "agentmetrics",
            "--grpc-port",
            "5317",
            "--endpoint",
            "http://collector:4317",
            "--debug",
        ])
        .unwrap();

        assert_eq!(cli.grpc_port, Some(5317));
        assert_eq!(cli.endpoint.as_deref(), Some("http://collector:4317"));
        assert!(cli.debug);
        assert!(!cli.check_config);
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "server:\n  grpc_port: 6000").unwrap();

        let mut cli = cli(Some(path));
        cli.grpc_port = Some(7000);
        cli.debug = true;
        let config = cli.load_config().unwrap();

        assert_eq!(config.server.grpc_port, 7000);
        assert!(config.debug);
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cli = cli(Some(dir.path().join("absent.yaml")));

        assert!(matches!(cli.load_config(), Err(ProcessorError::Config(_))));
    }
}
