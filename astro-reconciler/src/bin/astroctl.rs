//! astroctl - drive one deployment lifecycle verb against a JSON state file
//!
//! The state file holds a single declared deployment. Every verb reads it,
//! calls the reconciler and writes the refreshed state back (delete removes
//! the file). When a create or update fails after the remote side changed,
//! the partial state is still written so the deployment stays tracked.

use anyhow::{Context, bail};
use astro_client::{ClientConfig, HttpDeploymentClient};
use astro_reconciler::{
    DeclaredField, ReconcileError, Reconciler, ReconcilerConfig, SupportedFields,
    import_composite, logger,
};
use clap::{Parser, Subcommand};
use shared::DeclaredDeployment;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Declarative lifecycle for Astro deployments
#[derive(Parser, Debug)]
#[command(name = "astroctl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Create, read, update, delete and import Astro deployments", long_about = None)]
struct Cli {
    /// Declared deployment state file
    #[arg(global = true, long = "state", short = 's', default_value = "deployment.json")]
    state: PathBuf,

    /// Log level, overridden by RUST_LOG
    #[arg(global = true, long = "log-level", env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit JSON logs
    #[arg(global = true, long = "json-logs", env = "LOG_JSON")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the declared deployment and wait until it is healthy
    Create,
    /// Refresh the state file from the control plane
    Read,
    /// Push the declared mutable fields
    Update,
    /// Delete the deployment and remove the state file
    Delete,
    /// Adopt an existing deployment into a new state file
    Import {
        /// Deployment id, or `<organization>/<id>`
        #[arg(value_name = "ID")]
        id: String,

        /// Overwrite an existing state file
        #[arg(long = "force")]
        force: bool,
    },
    /// List the declared fields each verb sends or refreshes
    Fields,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    logger::init_logger(&cli.log_level, cli.json_logs)?;

    match cli.command {
        Commands::Create => {
            let declared = load_state(&cli.state)?;
            let result = connect()?.create(declared, &cancel_on_interrupt()).await;
            finish(&cli.state, result)
        }
        Commands::Read => {
            let declared = load_state(&cli.state)?;
            let result = connect()?.read(declared).await;
            finish(&cli.state, result)
        }
        Commands::Update => {
            let declared = load_state(&cli.state)?;
            let result = connect()?.update(declared, &cancel_on_interrupt()).await;
            finish(&cli.state, result)
        }
        Commands::Delete => {
            let declared = load_state(&cli.state)?;
            connect()?.delete(&declared).await?;
            remove_state(&cli.state)?;
            info!(state = %cli.state.display(), "state removed");
            Ok(())
        }
        Commands::Import { id, force } => {
            if cli.state.exists() && !force {
                bail!(
                    "{} already exists; pass --force to overwrite it",
                    cli.state.display()
                );
            }
            let hydrated = connect()?.read(import_composite(&id)).await?;
            save_state(&cli.state, &hydrated)?;
            print_state(&hydrated)
        }
        Commands::Fields => {
            print_fields();
            Ok(())
        }
    }
}

/// Reconciler against the hosted control plane, configured from the environment
fn connect() -> anyhow::Result<Reconciler<HttpDeploymentClient>> {
    let client = ClientConfig::from_env()
        .build_http_client()
        .context("failed to build control plane client")?;
    let config = ReconcilerConfig::from_env().context("invalid reconciler configuration")?;
    Ok(Reconciler::new(client, config))
}

/// Token cancelled on Ctrl-C, ending any convergence wait
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            on_signal.cancel();
        }
    });
    cancel
}

/// Persist the outcome of a create, read or update
fn finish(
    path: &Path,
    result: Result<DeclaredDeployment, ReconcileError>,
) -> anyhow::Result<()> {
    match result {
        Ok(declared) => {
            save_state(path, &declared)?;
            print_state(&declared)
        }
        Err(err) => {
            if let Some(partial) = err.partial() {
                save_state(path, partial)?;
                warn!(state = %path.display(), "partial state written");
            }
            Err(err.into())
        }
    }
}

fn load_state(path: &Path) -> anyhow::Result<DeclaredDeployment> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read state file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("state file {} is not a declared deployment", path.display()))
}

fn save_state(path: &Path, declared: &DeclaredDeployment) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(declared)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body + "\n")
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace state file {}", path.display()))?;
    Ok(())
}

fn remove_state(path: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
    }
}

fn print_state(declared: &DeclaredDeployment) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(declared)?);
    Ok(())
}

fn print_fields() {
    let tables = [
        ("create", SupportedFields::CREATE),
        ("update", SupportedFields::UPDATE),
        ("refresh", SupportedFields::OBSERVED),
    ];
    for field in DeclaredField::ALL {
        let verbs: Vec<&str> = tables
            .iter()
            .filter(|(_, table)| table.contains(field))
            .map(|(verb, _)| *verb)
            .collect();
        let marker = if field.is_immutable() { " (immutable)" } else { "" };
        println!("{:<24} {}{}", field.wire_key(), verbs.join(","), marker);
    }
}
