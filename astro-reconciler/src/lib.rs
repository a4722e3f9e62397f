//! astro-reconciler - declarative lifecycle for hosted Airflow deployments
//!
//! Takes a declared deployment, drives the control plane through
//! create/read/update/delete/import, and hands back the refreshed declared
//! state. Creates wait until the deployment reports healthy.
//!
//! ```no_run
//! use astro_client::ClientConfig;
//! use astro_reconciler::{Reconciler, ReconcilerConfig, import};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let client = ClientConfig::from_env().build_http_client()?;
//! let reconciler = Reconciler::new(client, ReconcilerConfig::from_env()?);
//! let adopted = reconciler.read(import("clx9deployment")).await?;
//! reconciler.update(adopted, &CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod import;
pub mod logger;
pub mod mapper;
pub mod phase;
pub mod poller;
pub mod reconciler;
pub mod validation;

pub use config::{ConfigError, ConvergencePolicy, ReconcilerConfig};
pub use error::{FailureKind, ReconcileError, ReconcileResult, Verb};
pub use import::{import, import_composite};
pub use mapper::{DeclaredField, SupportedFields};
pub use phase::Phase;
pub use poller::{Backoff, PollFailure, PollPolicy, Readiness, await_ready};
pub use reconciler::Reconciler;
pub use validation::Violation;
