//! coderun server binary
//!
//! Serves `POST /run` and executes every request in a fresh Docker container.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coderun_core::{DockerRuntime, LanguageRegistry, Runner, RunnerConfig};
use coderun_server::{shutdown_signal, CodeServer, ServerConfig};
use log::LevelFilter;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(author, version, about = "coderun - run code snippets in single-use containers")]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(long, short, help = "YAML configuration file")]
    config: Option<PathBuf>,

    #[clap(long, default_value = "0.0.0.0:3000")]
    bind_addr: String,

    #[clap(long, short, default_value = "info")]
    log_level: String,

    #[clap(long, help = "Execution deadline in seconds (overrides the config file)")]
    timeout: Option<u64>,

    #[clap(long, help = "Maximum number of concurrently running containers")]
    max_concurrent: Option<usize>,

    #[clap(long, help = "Comma-separated CORS origins; any origin is allowed when unset")]
    cors_origins: Option<String>,

    #[clap(long, help = "Pull all language images before serving")]
    pull_images: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server (default command)
    Serve,
    /// List supported languages and their images
    Languages,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level_filter = cli.log_level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    let config = load_config(&cli).await?;
    let registry = Arc::new(LanguageRegistry::builtin().with_image_overrides(&config.images));
    config.validate(&registry)?;

    match cli.command {
        Some(Commands::Languages) => {
            for profile in registry.profiles() {
                println!("{:<8} {}", profile.identifier, profile.image);
            }
            Ok(())
        }
        Some(Commands::Serve) | None => run_server(&cli, config, registry).await,
    }
}

async fn load_config(cli: &Cli) -> Result<RunnerConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            log::info!("Loading configuration from file: {}", path.display());
            RunnerConfig::from_file(path).await?
        }
        None => RunnerConfig::default(),
    };
    config.apply_env_overrides()?;

    if let Some(timeout) = cli.timeout {
        config.timeout_secs = timeout;
    }
    if let Some(max_concurrent) = cli.max_concurrent {
        config.max_concurrent = max_concurrent;
    }
    if cli.pull_images {
        config.pull_images = true;
    }
    Ok(config)
}

async fn run_server(cli: &Cli, config: RunnerConfig, registry: Arc<LanguageRegistry>) -> Result<()> {
    let runtime = DockerRuntime::connect().context("Failed to create Docker client")?;
    if runtime.is_available().await {
        log::info!("Docker daemon is reachable");
    } else {
        log::warn!("Docker daemon is not reachable; executions will fail until it is");
    }

    if config.pull_images {
        let pulled = runtime.pull_images(registry.images()).await;
        log::info!("Pulled {} of {} images", pulled, registry.images().len());
    }

    log::info!(
        "Execution limits: timeout {}s, {} concurrent, {} byte source, {} byte output",
        config.timeout_secs,
        config.max_concurrent,
        config.max_code_bytes,
        config.max_output_bytes
    );
    let runner = Runner::new(registry, Arc::new(runtime), &config);

    let mut server_config = ServerConfig::default()
        .with_bind_addr_str(&cli.bind_addr)?
        .with_logging(true);
    if let Some(origins) = &cli.cors_origins {
        let origins = origins
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        server_config = server_config.with_cors_origins(origins);
    }

    let server = CodeServer::with_config(runner, server_config);
    if let Err(e) = server.serve_with_shutdown(shutdown_signal()).await {
        log::error!("Server failed ({}): {}", e.error_type(), e);
        return Err(e.into());
    }

    Ok(())
}
