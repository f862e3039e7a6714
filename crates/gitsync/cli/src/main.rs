//! gitsync CLI - reconcile a workspace manifest into the platform store
//!
//! - `validate`: report every change a commit would make, exit 1 if any
//! - `plan`: print the ordered operation queue as text, JSON or YAML
//! - `commit`: apply the queue in one transaction under the sync lock

use anyhow::Context;
use clap::{Parser, Subcommand};
use gitsync_engine::{Mode, PassOutcome, ReconciliationPass};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod backend;
mod config;
mod content;
mod error;
mod manifest;
mod output;

use config::SyncConfig;
use content::FsContentSource;
use output::PlanFormat;

/// gitsync CLI
#[derive(Parser)]
#[command(name = "gitsync")]
#[command(about = "gitsync - Reconcile workspace manifests into the platform store", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "GITSYNC_CONFIG")]
    config: Option<String>,

    /// Workspace to sync; overrides the configured one
    #[arg(short, long)]
    workspace: Option<String>,

    /// Log level; overrides the configured one
    #[arg(long)]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what a commit would change without writing
    Validate {
        /// Manifest file (.yaml, .yml or .json)
        manifest: PathBuf,
    },

    /// Print the planned operations
    Plan {
        manifest: PathBuf,

        #[arg(short, long, value_enum, default_value_t = PlanFormat::Text)]
        format: PlanFormat,
    },

    /// Apply the manifest
    Commit { manifest: PathBuf },
}

impl Commands {
    fn manifest(&self) -> &Path {
        match self {
            Commands::Validate { manifest }
            | Commands::Plan { manifest, .. }
            | Commands::Commit { manifest } => manifest,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config =
        SyncConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(workspace) = cli.workspace.clone() {
        config.workspace = workspace;
    }
    if let Some(level) = cli.log_level.clone() {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }

    init_tracing(&config);

    let manifest_path = cli.command.manifest();
    let manifest = manifest::load_manifest(manifest_path).await?;
    let backend = backend::open(&config.storage).await?;

    let content_root = manifest_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let pass = ReconciliationPass::new(backend.store, backend.lock)
        .with_content_source(Arc::new(FsContentSource::new(content_root)))
        .with_config(config.pass_config());

    let workspace = config.workspace_id();
    tracing::info!(
        %workspace,
        storage = config.storage.backend_name(),
        manifest = %manifest_path.display(),
        "gitsync starting"
    );

    match &cli.command {
        Commands::Plan { format, .. } => {
            let plan = pass.plan(&manifest).await?;
            println!("{}", output::render_plan(&plan, *format)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate { .. } => match pass.run(&workspace, &manifest, Mode::Validate).await? {
            PassOutcome::Validated(report) => {
                println!("{}", output::render_validation(&report));
                Ok(if report.is_clean() {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                })
            }
            PassOutcome::Committed(_) => anyhow::bail!("validation pass reported a commit"),
        },
        Commands::Commit { .. } => match pass.run(&workspace, &manifest, Mode::Commit).await? {
            PassOutcome::Committed(report) => {
                println!("{}", output::render_report(&report));
                Ok(ExitCode::SUCCESS)
            }
            PassOutcome::Validated(_) => anyhow::bail!("commit pass reported a validation"),
        },
    }
}

fn init_tracing(config: &SyncConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
