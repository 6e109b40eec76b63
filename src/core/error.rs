use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Processor is not running")]
    NotRunning,

    #[error("Processor is already running")]
    AlreadyRunning,

    #[error("Downstream consumer error: {0}")]
    Downstream(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("GRPC error: {0}")]
    Grpc(#[from] tonic::Status),
}

/// Result type alias for processor operations
pub type Result<T> = std::result::Result<T, ProcessorError>;

impl ProcessorError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new downstream error
    pub fn downstream<S: Into<String>>(msg: S) -> Self {
        Self::Downstream(msg.into())
    }

    /// Creates a new transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::NotRunning | Self::AlreadyRunning => "lifecycle",
            Self::Downstream(_) => "downstream",
            Self::Transport(_) | Self::Grpc(_) => "network",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ProcessorError::config("empty split label");
        assert_eq!(err.to_string(), "Configuration error: empty split label");
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_grpc_status_converts() {
        let err: ProcessorError = tonic::Status::unavailable("collector down").into();
        assert!(matches!(
            &err,
            ProcessorError::Grpc(status) if status.code() == tonic::Code::Unavailable
        ));
        assert_eq!(err.category(), "network");
        assert_eq!(ProcessorError::downstream("queue full").category(), "downstream");
    }

    #[test]
    fn test_lifecycle_messages() {
        assert_eq!(ProcessorError::NotRunning.to_string(), "Processor is not running");
        assert_eq!(ProcessorError::AlreadyRunning.category(), "lifecycle");
    }
}
