//! Astro Client - control plane access for deployments
//!
//! Provides the [`RemoteClient`] trait consumed by the reconciler, an HTTP
//! implementation for the hosted API and an in-memory control plane for
//! tests and local simulation.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod memory;

pub use client::RemoteClient;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use http::HttpDeploymentClient;
pub use memory::{InMemoryControlPlane, Operation};
