//! Runner configuration loaded from YAML with `CODERUN_*` environment overrides
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! usable configuration. Overrides are applied after parsing and the result is
//! validated against the language registry before the runner is built.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::fs;
use tokio::sync::Semaphore;

use crate::errors::ConfigError;
use crate::registry::LanguageRegistry;

pub const ENV_TIMEOUT_SECS: &str = "CODERUN_TIMEOUT_SECS";
pub const ENV_MAX_CODE_BYTES: &str = "CODERUN_MAX_CODE_BYTES";
pub const ENV_MAX_OUTPUT_BYTES: &str = "CODERUN_MAX_OUTPUT_BYTES";
pub const ENV_MAX_CONCURRENT: &str = "CODERUN_MAX_CONCURRENT";
pub const ENV_QUEUE_TIMEOUT_SECS: &str = "CODERUN_QUEUE_TIMEOUT_SECS";
pub const ENV_CLEANUP_TIMEOUT_SECS: &str = "CODERUN_CLEANUP_TIMEOUT_SECS";
pub const ENV_PULL_IMAGES: &str = "CODERUN_PULL_IMAGES";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Deadline for start plus output collection, in seconds.
    pub timeout_secs: u64,
    /// Largest accepted source, in bytes.
    pub max_code_bytes: usize,
    /// Largest accepted combined output, in bytes.
    pub max_output_bytes: usize,
    /// Environments allowed to exist at the same time.
    pub max_concurrent: usize,
    /// How long a request may wait for a free slot, in seconds.
    pub queue_timeout_secs: u64,
    /// How long removal of an environment may take before it is abandoned, in seconds.
    pub cleanup_timeout_secs: u64,
    /// Per-language image overrides, e.g. `python: python:3.12-slim`.
    pub images: HashMap<String, String>,
    /// Pull every image at startup.
    pub pull_images: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_code_bytes: 64 * 1024,
            max_output_bytes: 1024 * 1024,
            max_concurrent: 8,
            queue_timeout_secs: 10,
            cleanup_timeout_secs: 30,
            images: HashMap::new(),
            pull_images: false,
        }
    }
}

impl RunnerConfig {
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from any key/value source.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_with(&lookup, ENV_TIMEOUT_SECS, &mut self.timeout_secs)?;
        override_with(&lookup, ENV_MAX_CODE_BYTES, &mut self.max_code_bytes)?;
        override_with(&lookup, ENV_MAX_OUTPUT_BYTES, &mut self.max_output_bytes)?;
        override_with(&lookup, ENV_MAX_CONCURRENT, &mut self.max_concurrent)?;
        override_with(&lookup, ENV_QUEUE_TIMEOUT_SECS, &mut self.queue_timeout_secs)?;
        override_with(&lookup, ENV_CLEANUP_TIMEOUT_SECS, &mut self.cleanup_timeout_secs)?;
        override_with(&lookup, ENV_PULL_IMAGES, &mut self.pull_images)?;
        Ok(())
    }

    pub fn validate(&self, registry: &LanguageRegistry) -> Result<(), ConfigError> {
        let zero_checks = [
            ("timeout_secs", self.timeout_secs == 0),
            ("max_code_bytes", self.max_code_bytes == 0),
            ("max_output_bytes", self.max_output_bytes == 0),
            ("max_concurrent", self.max_concurrent == 0),
            ("cleanup_timeout_secs", self.cleanup_timeout_secs == 0),
        ];
        for (name, is_zero) in zero_checks {
            if is_zero {
                return Err(ConfigError::Invalid(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        if self.max_concurrent > Semaphore::MAX_PERMITS {
            return Err(ConfigError::Invalid(format!(
                "max_concurrent must be at most {}, got {}",
                Semaphore::MAX_PERMITS,
                self.max_concurrent
            )));
        }

        for (language, image) in &self.images {
            if !registry.contains(language) {
                return Err(ConfigError::Invalid(format!(
                    "image override for unsupported language '{}'",
                    language
                )));
            }
            if image.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "image override for '{}' is empty",
                    language
                )));
            }
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }

    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_secs(self.cleanup_timeout_secs)
    }
}

fn override_with<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(key) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidOverride {
                key: key.to_string(),
                value,
            })?;
        log::debug!("Applied configuration override from {}", key);
    }
    Ok(())
}
