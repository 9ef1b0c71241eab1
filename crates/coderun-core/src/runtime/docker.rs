// src/runtime/docker.rs
use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    CreateImageOptions as BollardCreateImageOptionsQuery,
    LogsOptions as BollardLogsOptionsQuery,
    RemoveContainerOptions as BollardRemoveContainerOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
};
use bollard::Docker;
use futures_util::stream::StreamExt;

use super::{ContainerRuntime, EnvironmentHandle, EnvironmentSpec, OutputOptions, OutputStream};
use crate::errors::RuntimeError;

/// [`ContainerRuntime`] backed by the local Docker daemon.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects using the platform defaults (`DOCKER_HOST` or the local socket).
    /// No request is made until the first operation.
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }

    pub async fn is_available(&self) -> bool {
        self.docker.ping().await.is_ok()
    }

    /// Pulls `image` so the first request for it does not fail on a missing image.
    pub async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        let options = Some(BollardCreateImageOptionsQuery {
            from_image: Some(image.to_string()),
            ..Default::default()
        });

        let mut pull_stream = self.docker.create_image(options, None, None);
        while let Some(progress) = pull_stream.next().await {
            let progress = progress?;
            if let Some(status) = progress.status {
                log::debug!("Pulling {}: {}", image, status);
            }
        }
        Ok(())
    }

    /// Pulls every image, logging failures instead of stopping at the first.
    /// Returns the number of images pulled.
    pub async fn pull_images<'a, I>(&self, images: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut pulled = 0;
        for image in images {
            log::info!("Pulling image {}...", image);
            match self.pull_image(image).await {
                Ok(()) => pulled += 1,
                Err(e) => log::warn!("Failed to pull image {}: {}", image, e),
            }
        }
        pulled
    }
}

fn is_not_found(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_environment(
        &self,
        spec: &EnvironmentSpec,
    ) -> Result<EnvironmentHandle, RuntimeError> {
        let options = Some(BollardCreateContainerOptionsQuery {
            name: spec.name.clone(),
            ..Default::default()
        });

        let config = ContainerCreateBody {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            working_dir: spec.working_dir.clone(),
            labels: Some(spec.labels.clone()),
            tty: Some(false),
            open_stdin: Some(false),
            attach_stdin: Some(false),
            attach_stdout: Some(spec.streaming),
            attach_stderr: Some(spec.streaming),
            host_config: Some(HostConfig {
                auto_remove: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };

        let container = self.docker.create_container(options, config).await?;
        for warning in &container.warnings {
            log::warn!("Docker warning for container {}: {}", container.id, warning);
        }
        Ok(EnvironmentHandle::new(container.id))
    }

    async fn start(&self, handle: &EnvironmentHandle) -> Result<(), RuntimeError> {
        self.docker
            .start_container(handle.id(), None::<BollardStartContainerOptionsQuery>)
            .await?;
        Ok(())
    }

    async fn attach_output(
        &self,
        handle: &EnvironmentHandle,
        options: OutputOptions,
    ) -> Result<OutputStream, RuntimeError> {
        let logs = self.docker.logs(
            handle.id(),
            Some(BollardLogsOptionsQuery {
                stdout: options.stdout,
                stderr: options.stderr,
                follow: options.follow,
                ..Default::default()
            }),
        );

        let stream = logs.map(|chunk| match chunk {
            Ok(LogOutput::StdOut { message })
            | Ok(LogOutput::StdErr { message })
            | Ok(LogOutput::Console { message })
            | Ok(LogOutput::StdIn { message }) => Ok(message),
            Err(e) => Err(RuntimeError::Docker(e)),
        });
        Ok(Box::pin(stream))
    }

    async fn remove(&self, handle: &EnvironmentHandle) -> Result<(), RuntimeError> {
        let options = Some(BollardRemoveContainerOptionsQuery {
            force: true,
            v: true,
            ..Default::default()
        });

        match self.docker.remove_container(handle.id(), options).await {
            Ok(()) => Ok(()),
            // Already gone: nothing left to tear down.
            Err(e) if is_not_found(&e) => {
                log::debug!("Container {} was already removed", handle.short_id());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
