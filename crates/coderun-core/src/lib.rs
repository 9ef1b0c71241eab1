//! Run untrusted code snippets in single-use containers.
//!
//! A request names a language and carries source code. The crate maps the
//! language to an image and command, creates a fresh container, starts it,
//! collects its combined stdout/stderr and removes the container again on
//! every exit path before returning the sanitized output.
//!
//! # Architecture Overview
//!
//! - **Language registry** ([`registry`]): immutable language → image/command table
//! - **Runtime client** ([`runtime`]): the four container operations, with a Docker implementation
//! - **Provisioning** ([`environment`]): creates environments and guards their removal
//! - **Runner** ([`runner`]): admission control, deadline, lifecycle and teardown
//! - **Sanitizer** ([`sanitizer`]): turns raw output into compact control-free text
//! - **Configuration** ([`config`]): YAML file plus `CODERUN_*` overrides

pub mod config;
pub mod environment;
pub mod errors;
pub mod registry;
pub mod runner;
pub mod runtime;
pub mod sanitizer;

pub use config::RunnerConfig;
pub use environment::{Environment, EnvironmentState, Provisioner};
pub use errors::{ConfigError, ExecutionError, RuntimeError};
pub use registry::{LanguageProfile, LanguageRegistry};
pub use runner::{ExecutionResult, Runner};
pub use runtime::{ContainerRuntime, DockerRuntime, EnvironmentHandle, EnvironmentSpec};
pub use sanitizer::sanitize;
