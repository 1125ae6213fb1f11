//! webshell-update: run one update check from the command line
//!
//! Stands in for the shell's "Check for updates" action: status lines go to
//! stdout as they happen, the final outcome is printed last.

#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use webshell::{UpdateConfig, UpdateOrchestrator, UpdateOutcome, UpdateSettings};

#[derive(Parser, Debug)]
#[command(name = "webshell-update", version, about = "Check for and apply webshell updates")]
struct Args {
    /// Install root containing the project metadata file
    #[arg(long, default_value = ".")]
    install_root: PathBuf,

    /// Update the packaged (AppImage) binary instead of the source tree
    #[arg(long)]
    packaged: bool,

    /// Settings file [default: per-user config directory]
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("WEBSHELL_LOG")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("webshell=info,warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    tracing::debug!("Starting webshell-update v{}", env!("CARGO_PKG_VERSION"));

    let settings_path = match args.config {
        Some(path) => path,
        None => default_settings_path()?,
    };
    let settings = UpdateSettings::load(&settings_path);
    tracing::debug!("Loaded update settings from {:?}", settings_path);

    let install_root = args
        .install_root
        .canonicalize()
        .with_context(|| format!("Install root {:?} is not accessible", args.install_root))?;

    let orchestrator = UpdateOrchestrator::new(UpdateConfig::from_env(settings))?;
    let on_status = |line: &str| println!("{}", line);
    let outcome = orchestrator
        .check_for_updates(&install_root, args.packaged, &on_status)
        .await;

    println!("{}", outcome);
    if let UpdateOutcome::Updated { warnings, .. } = &outcome {
        for warning in warnings {
            println!("warning: {}", warning);
        }
    }

    match outcome {
        UpdateOutcome::Failed { cause } => Err(cause.into()),
        _ => Ok(()),
    }
}

/// `update.json` in the per-user config directory
fn default_settings_path() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("org", "webshell", "Webshell")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    Ok(project_dirs.config_dir().join("update.json"))
}
