//! Shared types for the Astro deployment workspace
//!
//! Declared and remote deployment models used by both `astro-client`
//! and `astro-reconciler`.

pub mod models;

// Re-exports
pub use models::{
    DeclaredDeployment, DeploymentCreateRequest, DeploymentStatus, DeploymentUpdateRequest,
    EnvironmentVariableRequest, RemoteDeployment, WorkerQueuePayload, WorkerQueueSpec,
};
pub use serde::{Deserialize, Serialize};
