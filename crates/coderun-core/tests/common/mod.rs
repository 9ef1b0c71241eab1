#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use coderun_core::errors::RuntimeError;
use coderun_core::runtime::{
    ContainerRuntime, EnvironmentHandle, EnvironmentSpec, OutputOptions, OutputStream,
};
use futures_util::stream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct Calls {
    pub create_attempts: usize,
    pub created: Vec<EnvironmentSpec>,
    pub started: Vec<String>,
    pub attached: Vec<(String, OutputOptions)>,
    pub removed: Vec<String>,
}

#[derive(Clone)]
pub enum Output {
    Chunks(Vec<&'static str>),
    FailAfter(Vec<&'static str>),
    AttachFails,
    Hang,
}

/// In-memory runtime that records every call and fails where told to.
#[derive(Clone)]
pub struct FakeRuntime {
    calls: Arc<Mutex<Calls>>,
    fail_create: bool,
    fail_start: bool,
    fail_remove: bool,
    hang_remove: bool,
    output: Output,
}

impl FakeRuntime {
    pub fn new(output: Output) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Calls::default())),
            fail_create: false,
            fail_start: false,
            fail_remove: false,
            hang_remove: false,
            output,
        }
    }

    pub fn printing(text: &'static str) -> Self {
        Self::new(Output::Chunks(vec![text]))
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_remove(mut self) -> Self {
        self.fail_remove = true;
        self
    }

    /// Removal is recorded but never answers.
    pub fn hanging_remove(mut self) -> Self {
        self.hang_remove = true;
        self
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }

    pub fn created(&self) -> usize {
        self.calls.lock().unwrap().created.len()
    }

    pub fn removed(&self) -> usize {
        self.calls.lock().unwrap().removed.len()
    }

    /// Polls until `removed()` reaches `count` or the deadline passes.
    pub async fn wait_for_removals(&self, count: usize, deadline: Duration) -> bool {
        let started = tokio::time::Instant::now();
        while started.elapsed() < deadline {
            if self.removed() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.removed() >= count
    }

    pub async fn wait_for_start(&self, deadline: Duration) -> bool {
        let started = tokio::time::Instant::now();
        while started.elapsed() < deadline {
            if !self.calls.lock().unwrap().started.is_empty() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create_environment(
        &self,
        spec: &EnvironmentSpec,
    ) -> Result<EnvironmentHandle, RuntimeError> {
        let mut calls = self.calls.lock().unwrap();
        calls.create_attempts += 1;
        if self.fail_create {
            return Err(RuntimeError::message(format!(
                "No such image: {}",
                spec.image
            )));
        }
        calls.created.push(spec.clone());
        Ok(EnvironmentHandle::new(format!(
            "fake{:020}",
            calls.created.len()
        )))
    }

    async fn start(&self, handle: &EnvironmentHandle) -> Result<(), RuntimeError> {
        if self.fail_start {
            return Err(RuntimeError::message("cannot start container"));
        }
        self.calls
            .lock()
            .unwrap()
            .started
            .push(handle.id().to_string());
        Ok(())
    }

    async fn attach_output(
        &self,
        handle: &EnvironmentHandle,
        options: OutputOptions,
    ) -> Result<OutputStream, RuntimeError> {
        self.calls
            .lock()
            .unwrap()
            .attached
            .push((handle.id().to_string(), options));

        let chunks = |parts: &[&'static str]| {
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<Result<Bytes, RuntimeError>>>()
        };

        match &self.output {
            Output::Chunks(parts) => Ok(Box::pin(stream::iter(chunks(parts)))),
            Output::FailAfter(parts) => {
                let mut items = chunks(parts);
                items.push(Err(RuntimeError::message("connection reset by peer")));
                Ok(Box::pin(stream::iter(items)))
            }
            Output::AttachFails => Err(RuntimeError::message("attach refused")),
            Output::Hang => Ok(Box::pin(stream::pending())),
        }
    }

    async fn remove(&self, handle: &EnvironmentHandle) -> Result<(), RuntimeError> {
        self.calls
            .lock()
            .unwrap()
            .removed
            .push(handle.id().to_string());
        if self.hang_remove {
            std::future::pending::<()>().await;
        }
        if self.fail_remove {
            return Err(RuntimeError::message("device or resource busy"));
        }
        Ok(())
    }
}
