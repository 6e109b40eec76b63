//! Error type and configuration shared by every component.

#![warn(missing_docs)]

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{
    AppConfig, ClampBounds, ConfigBuilder, ExporterConfig, LogLevel, LoggingConfig,
    ProcessorConfig, ServerConfig, SplitRule, UtilizationRule,
};
pub use error::{ProcessorError, Result};
