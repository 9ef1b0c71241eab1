//! Error types for the execution lifecycle
//!
//! Every failure a caller can observe is an [`ExecutionError`]. Lifecycle
//! variants carry the language, the image and, once it exists, the
//! environment involved, so a single message is enough to tell which step
//! failed and where. Failures reported by the container runtime itself are
//! wrapped as [`RuntimeError`].

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Unsupported language: {language}")]
    NotSupported { language: String },
    #[error("Source code is empty")]
    EmptySource,
    #[error("Source code is {size} bytes, exceeding the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("Failed to create {language} environment from image '{image}': {source}")]
    Provision {
        language: String,
        image: String,
        source: RuntimeError,
    },
    #[error("Failed to start {language} environment {environment} (image '{image}'): {source}")]
    Start {
        language: String,
        image: String,
        environment: String,
        source: RuntimeError,
    },
    #[error("Failed to read output of {language} environment {environment} (image '{image}'): {source}")]
    Stream {
        language: String,
        image: String,
        environment: String,
        source: RuntimeError,
    },
    #[error("Failed to remove {language} environment {environment} (image '{image}'): {source}")]
    Removal {
        language: String,
        image: String,
        environment: String,
        source: RuntimeError,
    },
    #[error("{language} execution in image '{image}' timed out after {}s", .after.as_secs_f64())]
    Timeout {
        language: String,
        image: String,
        after: Duration,
    },
    #[error("Output of {language} execution in image '{image}' exceeded the {limit} byte limit")]
    OutputTooLarge {
        language: String,
        image: String,
        limit: usize,
    },
    #[error("Execution capacity exhausted: all {limit} environment slots are busy")]
    Busy { limit: usize },
    #[error("Execution task aborted: {0}")]
    Aborted(String),
}

impl ExecutionError {
    /// Stable machine-readable name of the failure, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::NotSupported { .. } => "not_supported",
            ExecutionError::EmptySource => "empty_source",
            ExecutionError::PayloadTooLarge { .. } => "payload_too_large",
            ExecutionError::Provision { .. } => "provision_error",
            ExecutionError::Start { .. } => "start_error",
            ExecutionError::Stream { .. } => "stream_error",
            ExecutionError::Removal { .. } => "removal_error",
            ExecutionError::Timeout { .. } => "timeout",
            ExecutionError::OutputTooLarge { .. } => "output_too_large",
            ExecutionError::Busy { .. } => "busy",
            ExecutionError::Aborted(_) => "aborted",
        }
    }

    /// Whether the failure was caused by the request itself rather than the
    /// runtime. Such requests never reach a container.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ExecutionError::NotSupported { .. }
                | ExecutionError::EmptySource
                | ExecutionError::PayloadTooLarge { .. }
        )
    }
}

/// Failure reported by a container runtime client.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Bollard (Docker client) error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("{0}")]
    Message(String),
}

impl RuntimeError {
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid value '{value}' for {key}")]
    InvalidOverride { key: String, value: String },
    #[error("Configuration error: {0}")]
    Invalid(String),
}
