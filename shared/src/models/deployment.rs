//! Deployment Model
//!
//! `DeclaredDeployment` is the caller's desired state; `RemoteDeployment` is
//! what the control plane reports. Request payloads are what actually goes
//! over the wire on create and update.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::worker_queue::{WorkerQueuePayload, WorkerQueueSpec};

/// Desired state of a deployment
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeclaredDeployment {
    /// Server-assigned identity, empty until created or imported
    #[serde(default)]
    pub id: String,

    // Immutable once created
    #[serde(default)]
    pub astro_runtime_version: String,
    #[serde(default)]
    pub cloud_provider: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub organization_id: String,
    #[serde(default)]
    pub workspace_id: String,

    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub deployment_type: String,
    #[serde(default)]
    pub executor: String,
    #[serde(default)]
    pub default_task_pod_cpu: String,
    #[serde(default)]
    pub default_task_pod_memory: String,
    #[serde(default)]
    pub resource_quota_cpu: String,
    #[serde(default)]
    pub resource_quota_memory: String,
    #[serde(default)]
    pub scheduler_size: String,
    #[serde(default)]
    pub is_cicd_enforced: bool,
    #[serde(default)]
    pub is_dag_deploy_enforced: bool,
    #[serde(default)]
    pub is_high_availability: bool,
    #[serde(default)]
    pub worker_queues: Vec<WorkerQueueSpec>,
}

impl DeclaredDeployment {
    /// Whether the control plane has assigned an identity yet
    pub fn has_identity(&self) -> bool {
        !self.id.is_empty()
    }

    /// An identity (and optionally its organization) with nothing else
    /// declared, as left behind by an import
    ///
    /// Any caller-set field disqualifies the value, so a read never replaces
    /// caller-owned settings with the remote ones.
    pub fn is_import_stub(&self) -> bool {
        self.has_identity()
            && *self
                == Self {
                    id: self.id.clone(),
                    organization_id: self.organization_id.clone(),
                    ..Default::default()
                }
    }

    /// Identity for error messages and log fields
    pub fn identity(&self) -> Option<&str> {
        if self.id.is_empty() {
            None
        } else {
            Some(&self.id)
        }
    }
}

/// Status reported by the control plane
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeploymentStatus {
    Creating,
    Deploying,
    Provisioning,
    Healthy,
    Degraded,
    Unhealthy,
    Error,
    Failed,
    Deleted,
    Unknown(String),
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Creating => "CREATING",
            Self::Deploying => "DEPLOYING",
            Self::Provisioning => "PROVISIONING",
            Self::Healthy => "HEALTHY",
            Self::Degraded => "DEGRADED",
            Self::Unhealthy => "UNHEALTHY",
            Self::Error => "ERROR",
            Self::Failed => "FAILED",
            Self::Deleted => "DELETED",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<String> for DeploymentStatus {
    fn from(raw: String) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "CREATING" => Self::Creating,
            "DEPLOYING" => Self::Deploying,
            "PROVISIONING" => Self::Provisioning,
            "HEALTHY" => Self::Healthy,
            "DEGRADED" => Self::Degraded,
            "UNHEALTHY" => Self::Unhealthy,
            "ERROR" => Self::Error,
            "FAILED" => Self::Failed,
            "DELETED" => Self::Deleted,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<&str> for DeploymentStatus {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_string())
    }
}

impl From<DeploymentStatus> for String {
    fn from(status: DeploymentStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment as reported by the control plane
///
/// Everything but `id` and `status` is optional so partial responses still
/// deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDeployment {
    pub id: String,
    pub status: DeploymentStatus,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub deployment_type: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub organization_id: String,
    #[serde(default)]
    pub workspace_id: String,
    #[serde(default)]
    pub cloud_provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub astro_runtime_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_task_pod_cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_task_pod_memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_quota_cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_quota_memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_cicd_enforced: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dag_deploy_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_high_availability: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_queues: Option<Vec<WorkerQueuePayload>>,
}

impl RemoteDeployment {
    /// Minimal remote record, mostly useful in tests and simulations
    pub fn new(id: impl Into<String>, status: DeploymentStatus) -> Self {
        Self {
            id: id.into(),
            status,
            name: String::new(),
            description: None,
            deployment_type: String::new(),
            region: String::new(),
            organization_id: String::new(),
            workspace_id: String::new(),
            cloud_provider: String::new(),
            astro_runtime_version: None,
            executor: None,
            scheduler_size: None,
            default_task_pod_cpu: None,
            default_task_pod_memory: None,
            resource_quota_cpu: None,
            resource_quota_memory: None,
            is_cicd_enforced: None,
            is_dag_deploy_enabled: None,
            is_high_availability: None,
            worker_queues: None,
        }
    }
}

/// Create deployment payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentCreateRequest {
    pub astro_runtime_version: String,
    pub cloud_provider: String,
    pub region: String,
    pub workspace_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub deployment_type: String,
    pub executor: String,
    pub default_task_pod_cpu: String,
    pub default_task_pod_memory: String,
    pub resource_quota_cpu: String,
    pub resource_quota_memory: String,
    pub scheduler_size: String,
    pub is_cicd_enforced: bool,
    pub is_dag_deploy_enabled: bool,
    pub is_high_availability: bool,
    pub worker_queues: Vec<WorkerQueuePayload>,
}

/// Environment variable entry on update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentVariableRequest {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub is_secret: bool,
}

/// Update deployment payload
///
/// Carries no runtime version, cloud provider, region, organization or
/// workspace: those are fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentUpdateRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub deployment_type: String,
    pub executor: String,
    pub default_task_pod_cpu: String,
    pub default_task_pod_memory: String,
    pub resource_quota_cpu: String,
    pub resource_quota_memory: String,
    pub scheduler_size: String,
    pub is_cicd_enforced: bool,
    pub is_dag_deploy_enabled: bool,
    pub is_high_availability: bool,
    #[serde(default)]
    pub environment_variables: Vec<EnvironmentVariableRequest>,
    pub worker_queues: Vec<WorkerQueuePayload>,
}
