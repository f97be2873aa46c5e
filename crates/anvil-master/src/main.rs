//! Anvil build master entrypoint.

use anyhow::Context;
use anvil_config::LoadedConfig;
use anvil_core::events::DispatchEvent;
use anvil_core::project::Project;
use anvil_notify::build_sinks;
use anvil_scheduler::dispatch::Dispatcher;
use anvil_scheduler::pool::WorkerPool;
use anvil_scheduler::registry::ProjectRegistry;
use anvil_scheduler::triggers::{spawn_nightly, NightlySchedule};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod local;

use local::LocalTransport;

#[derive(Parser)]
#[command(name = "anvil-master")]
#[command(author, version, about = "Anvil build master", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a configuration directory and report what it defines.
    Validate {
        #[arg(long, default_value = "config")]
        config: PathBuf,
    },
    /// Print the expanded target catalog with eligible workers per target.
    Targets {
        #[arg(long, default_value = "config")]
        config: PathBuf,
    },
    /// Run the dispatch loop with the local transport.
    Serve {
        #[arg(long, default_value = "config")]
        config: PathBuf,
        /// Directory that holds one scratch checkout per active run.
        #[arg(long, default_value = "workspace")]
        workspace: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Validate { config } => validate(&config),
        Commands::Targets { config } => targets(&config),
        Commands::Serve { config, workspace } => serve(&config, workspace).await,
    }
}

/// Loaded configuration together with the registries built from it.
struct Prepared {
    config: LoadedConfig,
    registry: Arc<ProjectRegistry>,
    pool: WorkerPool,
}

fn prepare(dir: &Path) -> anyhow::Result<Prepared> {
    let config = anvil_config::load(dir)
        .with_context(|| format!("loading configuration from {}", dir.display()))?;

    let projects: Vec<Project> = config
        .projects
        .iter()
        .cloned()
        .map(|p| p.into_project())
        .collect();
    let registry = Arc::new(ProjectRegistry::build(projects)?);

    let mut pool = WorkerPool::new();
    for worker in config.workers.iter().cloned() {
        pool.register(worker.into_worker())?;
    }

    Ok(Prepared {
        config,
        registry,
        pool,
    })
}

fn validate(dir: &Path) -> anyhow::Result<()> {
    let prepared = prepare(dir)?;
    println!(
        "ok: {} worker(s), {} project(s), {} target(s), {} report sink(s)",
        prepared.config.workers.len(),
        prepared.config.projects.len(),
        prepared.registry.targets().len(),
        prepared.config.sinks.len(),
    );
    Ok(())
}

fn targets(dir: &Path) -> anyhow::Result<()> {
    let prepared = prepare(dir)?;
    for target in prepared.registry.targets() {
        let eligible: Vec<&str> = prepared
            .pool
            .find_eligible(target)
            .iter()
            .map(|w| w.hostname.as_str())
            .collect();
        println!("{} [{}]", target.qualified_name(), eligible.join(", "));
        for step in &target.steps {
            println!("    {}", step.join(" "));
        }
    }
    Ok(())
}

async fn serve(dir: &Path, workspace: PathBuf) -> anyhow::Result<()> {
    let prepared = prepare(dir)?;
    let sinks = build_sinks(&prepared.config.sinks)?;
    let schedule = NightlySchedule::new(
        prepared.config.master.nightly.hour,
        prepared.config.master.nightly.minute,
    )
    .context("nightly schedule out of range")?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let transport = Arc::new(LocalTransport::new(events_tx.clone(), workspace));
    let dispatcher = Dispatcher::new(
        Arc::clone(&prepared.registry),
        prepared.pool,
        transport,
        sinks,
        prepared.config.force_policy.clone(),
        events_tx.clone(),
    );

    let project_names: Vec<String> = prepared
        .config
        .projects
        .iter()
        .map(|p| p.name.clone())
        .collect();
    let timer = spawn_nightly(schedule, project_names, events_tx.clone(), shutdown_rx);

    info!(
        title = %prepared.config.master.title,
        worker_port = prepared.config.master.worker_port,
        status_port = prepared.config.master.status_port,
        workers = prepared.config.workers.len(),
        targets = prepared.registry.targets().len(),
        "master started"
    );

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
            let _ = events_tx.send(DispatchEvent::Shutdown);
        }
    });

    dispatcher.run(events_rx).await;
    let _ = timer.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn prepare_builds_registry_and_pool() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("master.json"),
            r#"{"title": "test farm", "nightly": {"hour": 1, "minute": 30}}"#,
        );
        write(
            &dir.path().join("workers/a.json"),
            r#"{"hostname": "a.example.com", "password": "pw", "features": ["riscv"]}"#,
        );
        write(
            &dir.path().join("projects/gcc.json"),
            r#"{
                "name": "riscv-gcc",
                "url": "https://example.com/gcc.git",
                "configurations": [{
                    "name": "gcc-ARCH",
                    "steps": [["make", "ARCH"]],
                    "parameters": [{"pattern": "ARCH", "values": ["rv32", "rv64"]}],
                    "features": ["riscv"]
                }]
            }"#,
        );

        let prepared = prepare(dir.path()).unwrap();
        assert_eq!(prepared.registry.targets().len(), 2);
        assert_eq!(prepared.config.master.title, "test farm");
        let target = prepared.registry.target("riscv-gcc@gcc-rv64").unwrap();
        assert_eq!(prepared.pool.find_eligible(target).len(), 1);
    }

    #[test]
    fn prepare_rejects_broken_configuration() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("master.json"),
            r#"{"nightly": {"hour": 99}}"#,
        );
        assert!(prepare(dir.path()).is_err());
    }
}
