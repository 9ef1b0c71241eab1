//! Execution runner: one request, one environment, always torn down.
//!
//! [`Runner::run`] resolves the language, validates the source, waits for an
//! admission slot and then drives the environment through
//! `Provisioned -> Started -> OutputCollected -> Removed`. The lifecycle runs
//! on its own tokio task so that a caller which stops polling (for example a
//! disconnected HTTP client) cannot interrupt teardown. Removal gets its own
//! time limit so an unresponsive runtime cannot hold an admission slot forever.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::RunnerConfig;
use crate::environment::{Environment, Provisioner};
use crate::errors::ExecutionError;
use crate::registry::{LanguageProfile, LanguageRegistry};
use crate::runtime::ContainerRuntime;
use crate::sanitizer::sanitize_bytes;

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub raw_output: Vec<u8>,
    pub sanitized_output: String,
    pub elapsed: Duration,
}

impl ExecutionResult {
    fn new(raw_output: Vec<u8>, elapsed: Duration) -> Self {
        let sanitized_output = sanitize_bytes(&raw_output);
        Self {
            raw_output,
            sanitized_output,
            elapsed,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    timeout: Duration,
    queue_timeout: Duration,
    cleanup_timeout: Duration,
    max_code_bytes: usize,
    max_output_bytes: usize,
    max_concurrent: usize,
}

impl From<&RunnerConfig> for Limits {
    fn from(config: &RunnerConfig) -> Self {
        Self {
            timeout: config.timeout(),
            queue_timeout: config.queue_timeout(),
            cleanup_timeout: config.cleanup_timeout(),
            max_code_bytes: config.max_code_bytes,
            max_output_bytes: config.max_output_bytes,
            max_concurrent: config.max_concurrent,
        }
    }
}

/// Cheap to clone; clones share the registry and the admission slots.
#[derive(Clone)]
pub struct Runner {
    registry: Arc<LanguageRegistry>,
    provisioner: Provisioner,
    slots: Arc<Semaphore>,
    limits: Limits,
}

impl Runner {
    pub fn new(
        registry: Arc<LanguageRegistry>,
        runtime: Arc<dyn ContainerRuntime>,
        config: &RunnerConfig,
    ) -> Self {
        let limits = Limits::from(config);
        Self {
            registry,
            provisioner: Provisioner::new(runtime),
            slots: Arc::new(Semaphore::new(
                limits.max_concurrent.min(Semaphore::MAX_PERMITS),
            )),
            limits,
        }
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    /// Free admission slots right now.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Runs `code` and returns its sanitized combined output.
    pub async fn execute(&self, language: &str, code: &str) -> Result<String, ExecutionError> {
        self.run(language, code)
            .await
            .map(|result| result.sanitized_output)
    }

    pub async fn run(&self, language: &str, code: &str) -> Result<ExecutionResult, ExecutionError> {
        let profile = self.registry.resolve(language)?.clone();
        self.check_source(code)?;

        let permit = self.admit().await?;
        let runner = self.clone();
        let code = code.to_string();

        let lifecycle = tokio::spawn(async move {
            let result = runner.run_lifecycle(&profile, &code).await;
            drop(permit);
            result
        });

        lifecycle.await.map_err(|e| {
            log::error!("Execution task for {} failed: {}", language, e);
            ExecutionError::Aborted(e.to_string())
        })?
    }

    fn check_source(&self, code: &str) -> Result<(), ExecutionError> {
        if code.trim().is_empty() {
            return Err(ExecutionError::EmptySource);
        }
        if code.len() > self.limits.max_code_bytes {
            return Err(ExecutionError::PayloadTooLarge {
                size: code.len(),
                limit: self.limits.max_code_bytes,
            });
        }
        Ok(())
    }

    async fn admit(&self) -> Result<OwnedSemaphorePermit, ExecutionError> {
        let acquire = self.slots.clone().acquire_owned();
        match tokio::time::timeout(self.limits.queue_timeout, acquire).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(closed)) => Err(ExecutionError::Aborted(closed.to_string())),
            Err(_) => {
                log::warn!(
                    "No free execution slot after {:?} ({} in use)",
                    self.limits.queue_timeout,
                    self.limits.max_concurrent
                );
                Err(ExecutionError::Busy {
                    limit: self.limits.max_concurrent,
                })
            }
        }
    }

    async fn run_lifecycle(
        &self,
        profile: &LanguageProfile,
        code: &str,
    ) -> Result<ExecutionResult, ExecutionError> {
        let started = Instant::now();
        let mut environment = self.provisioner.provision(profile, code).await?;

        let outcome =
            match tokio::time::timeout(self.limits.timeout, self.drive(&mut environment)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    log::warn!(
                        "{} environment {} exceeded {:?} in state {:?}, removing",
                        profile.identifier,
                        environment.handle(),
                        self.limits.timeout,
                        environment.state()
                    );
                    Err(ExecutionError::Timeout {
                        language: profile.identifier.clone(),
                        image: profile.image.clone(),
                        after: self.limits.timeout,
                    })
                }
            };

        let removal = environment.remove_within(self.limits.cleanup_timeout).await;

        match (outcome, removal) {
            (Ok(raw), removal) => {
                if let Err(e) = removal {
                    log::warn!("{}", e);
                }
                let result = ExecutionResult::new(raw, started.elapsed());
                log::info!(
                    "{} execution finished in {:?} with {} bytes of output",
                    profile.identifier,
                    result.elapsed,
                    result.raw_output.len()
                );
                Ok(result)
            }
            (Err(e), removal) => {
                if let Err(removal_err) = removal {
                    log::warn!("{}", removal_err);
                }
                log::error!("{} execution failed ({}): {}", profile.identifier, e.kind(), e);
                Err(e)
            }
        }
    }

    async fn drive(&self, environment: &mut Environment) -> Result<Vec<u8>, ExecutionError> {
        environment.start().await?;
        environment
            .collect_output(self.limits.max_output_bytes)
            .await
    }
}
