//! Container runtime client abstraction.
//!
//! The lifecycle only needs four operations from a runtime: create, start,
//! attach to output, remove. [`docker::DockerRuntime`] implements them on top
//! of bollard; tests substitute an in-memory runtime.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use std::collections::HashMap;
use std::pin::Pin;

use crate::errors::RuntimeError;

pub mod docker;

pub use docker::DockerRuntime;

/// Combined output of an environment, chunk by chunk, until the process exits.
pub type OutputStream = Pin<Box<dyn Stream<Item = Result<Bytes, RuntimeError>> + Send>>;

/// Opaque reference to a created environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvironmentHandle {
    id: String,
}

impl EnvironmentHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// First 12 characters of the id, the way docker prints container ids.
    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(12) {
            Some((end, _)) => &self.id[..end],
            None => &self.id,
        }
    }
}

impl std::fmt::Display for EnvironmentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.short_id())
    }
}

/// Everything needed to create (but not start) an environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSpec {
    pub image: String,
    pub command: Vec<String>,
    /// Attach stdout/stderr so output can be streamed.
    pub streaming: bool,
    pub name: Option<String>,
    pub working_dir: Option<String>,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputOptions {
    pub stdout: bool,
    pub stderr: bool,
    pub follow: bool,
}

impl OutputOptions {
    /// Both streams, following until the process exits.
    pub fn combined() -> Self {
        Self {
            stdout: true,
            stderr: true,
            follow: true,
        }
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn create_environment(
        &self,
        spec: &EnvironmentSpec,
    ) -> Result<EnvironmentHandle, RuntimeError>;

    async fn start(&self, handle: &EnvironmentHandle) -> Result<(), RuntimeError>;

    async fn attach_output(
        &self,
        handle: &EnvironmentHandle,
        options: OutputOptions,
    ) -> Result<OutputStream, RuntimeError>;

    /// Removes the environment, killing its process if it is still running.
    async fn remove(&self, handle: &EnvironmentHandle) -> Result<(), RuntimeError>;
}
