//! Provisioning and ownership of a single execution environment.
//!
//! An [`Environment`] owns exactly one created container and releases it
//! through [`Environment::remove`]. If it is dropped before that (a panic, a
//! cancelled task) the drop guard hands the removal to the tokio runtime, so
//! the container is still released exactly once.

use futures_util::stream::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::{ExecutionError, RuntimeError};
use crate::registry::LanguageProfile;
use crate::runtime::{ContainerRuntime, EnvironmentHandle, EnvironmentSpec, OutputOptions};

/// Label attached to every container this crate creates.
pub const LANGUAGE_LABEL: &str = "coderun.language";

const WORKING_DIR: &str = "/tmp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentState {
    Provisioned,
    Started,
    OutputCollected,
    Removed { failed: bool },
}

/// Creates environments for a profile without starting them.
#[derive(Clone)]
pub struct Provisioner {
    runtime: Arc<dyn ContainerRuntime>,
}

impl Provisioner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    pub fn spec_for(profile: &LanguageProfile, code: &str) -> EnvironmentSpec {
        let mut labels = HashMap::new();
        labels.insert(LANGUAGE_LABEL.to_string(), profile.identifier.clone());

        EnvironmentSpec {
            image: profile.image.clone(),
            command: profile.command(code),
            streaming: true,
            name: Some(format!("coderun-{}-{}", profile.identifier, Uuid::new_v4())),
            working_dir: Some(WORKING_DIR.to_string()),
            labels,
        }
    }

    pub async fn provision(
        &self,
        profile: &LanguageProfile,
        code: &str,
    ) -> Result<Environment, ExecutionError> {
        let spec = Self::spec_for(profile, code);
        let handle = self
            .runtime
            .create_environment(&spec)
            .await
            .map_err(|source| ExecutionError::Provision {
                language: profile.identifier.clone(),
                image: profile.image.clone(),
                source,
            })?;

        log::info!(
            "Created {} environment {} from image {}",
            profile.identifier,
            handle,
            profile.image
        );

        Ok(Environment {
            runtime: self.runtime.clone(),
            pending_removal: Some(handle.clone()),
            id: handle,
            language: profile.identifier.clone(),
            image: profile.image.clone(),
            state: EnvironmentState::Provisioned,
        })
    }
}

pub struct Environment {
    runtime: Arc<dyn ContainerRuntime>,
    /// `None` once removal has been attempted.
    pending_removal: Option<EnvironmentHandle>,
    id: EnvironmentHandle,
    language: String,
    image: String,
    state: EnvironmentState,
}

impl Environment {
    pub fn handle(&self) -> &EnvironmentHandle {
        &self.id
    }

    pub fn state(&self) -> EnvironmentState {
        self.state
    }

    pub async fn start(&mut self) -> Result<(), ExecutionError> {
        self.runtime
            .start(&self.id)
            .await
            .map_err(|source| ExecutionError::Start {
                language: self.language.clone(),
                image: self.image.clone(),
                environment: self.id.to_string(),
                source,
            })?;
        self.state = EnvironmentState::Started;
        log::debug!("Started {} environment {}", self.language, self.id);
        Ok(())
    }

    /// Reads the combined output until the stream ends. Fails with
    /// `OutputTooLarge` as soon as more than `limit` bytes have arrived.
    pub async fn collect_output(&mut self, limit: usize) -> Result<Vec<u8>, ExecutionError> {
        let stream_error = |source| ExecutionError::Stream {
            language: self.language.clone(),
            image: self.image.clone(),
            environment: self.id.to_string(),
            source,
        };

        let mut stream = self
            .runtime
            .attach_output(&self.id, OutputOptions::combined())
            .await
            .map_err(stream_error)?;

        let mut output = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(stream_error)?;
            if output.len() + chunk.len() > limit {
                return Err(ExecutionError::OutputTooLarge {
                    language: self.language.clone(),
                    image: self.image.clone(),
                    limit,
                });
            }
            output.extend_from_slice(&chunk);
        }

        self.state = EnvironmentState::OutputCollected;
        log::debug!(
            "Collected {} bytes from {} environment {}",
            output.len(),
            self.language,
            self.id
        );
        Ok(output)
    }

    /// Removes the environment. Only the first call reaches the runtime; later
    /// calls, and the drop guard, are no-ops.
    pub async fn remove(&mut self) -> Result<(), ExecutionError> {
        let Some(handle) = self.pending_removal.take() else {
            return Ok(());
        };
        let result = self.runtime.remove(&handle).await;
        self.finish_removal(handle, result)
    }

    /// Like [`Environment::remove`], but gives up once `limit` has passed
    /// without an answer from the runtime. An abandoned removal is reported as
    /// a failed one and is not retried.
    pub async fn remove_within(&mut self, limit: Duration) -> Result<(), ExecutionError> {
        let Some(handle) = self.pending_removal.take() else {
            return Ok(());
        };
        let result = match tokio::time::timeout(limit, self.runtime.remove(&handle)).await {
            Ok(result) => result,
            Err(_) => Err(RuntimeError::message(format!(
                "no response from the runtime after {:?}",
                limit
            ))),
        };
        self.finish_removal(handle, result)
    }

    fn finish_removal(
        &mut self,
        handle: EnvironmentHandle,
        result: Result<(), RuntimeError>,
    ) -> Result<(), ExecutionError> {
        match result {
            Ok(()) => {
                self.state = EnvironmentState::Removed { failed: false };
                log::info!("Removed {} environment {}", self.language, handle);
                Ok(())
            }
            Err(source) => {
                self.state = EnvironmentState::Removed { failed: true };
                Err(ExecutionError::Removal {
                    language: self.language.clone(),
                    image: self.image.clone(),
                    environment: handle.to_string(),
                    source,
                })
            }
        }
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        let Some(handle) = self.pending_removal.take() else {
            return;
        };

        log::warn!(
            "{} environment {} dropped in state {:?} without removal, removing in background",
            self.language,
            handle,
            self.state
        );
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                let runtime = self.runtime.clone();
                rt.spawn(async move {
                    if let Err(e) = runtime.remove(&handle).await {
                        log::error!("Background removal of environment {} failed: {}", handle, e);
                    }
                });
            }
            Err(_) => log::error!(
                "No async runtime available to remove environment {}; it has leaked",
                handle
            ),
        }
    }
}
