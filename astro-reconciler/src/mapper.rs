//! State mapper
//!
//! Pure translation between the declared deployment and the control plane's
//! request/response shapes. Which declared fields travel in each direction is
//! spelled out in [`SupportedFields`]; anything outside a direction's set is
//! dropped without error.

use shared::{
    DeclaredDeployment, DeploymentCreateRequest, DeploymentUpdateRequest, RemoteDeployment,
    WorkerQueuePayload, WorkerQueueSpec,
};

/// Every field of a declared deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclaredField {
    Id,
    AstroRuntimeVersion,
    CloudProvider,
    Region,
    OrganizationId,
    WorkspaceId,
    Name,
    Description,
    DeploymentType,
    Executor,
    DefaultTaskPodCpu,
    DefaultTaskPodMemory,
    ResourceQuotaCpu,
    ResourceQuotaMemory,
    SchedulerSize,
    IsCicdEnforced,
    IsDagDeployEnforced,
    IsHighAvailability,
    WorkerQueues,
}

impl DeclaredField {
    pub const ALL: [DeclaredField; 19] = [
        Self::Id,
        Self::AstroRuntimeVersion,
        Self::CloudProvider,
        Self::Region,
        Self::OrganizationId,
        Self::WorkspaceId,
        Self::Name,
        Self::Description,
        Self::DeploymentType,
        Self::Executor,
        Self::DefaultTaskPodCpu,
        Self::DefaultTaskPodMemory,
        Self::ResourceQuotaCpu,
        Self::ResourceQuotaMemory,
        Self::SchedulerSize,
        Self::IsCicdEnforced,
        Self::IsDagDeployEnforced,
        Self::IsHighAvailability,
        Self::WorkerQueues,
    ];

    /// Fixed once the deployment exists
    pub fn is_immutable(self) -> bool {
        matches!(
            self,
            Self::AstroRuntimeVersion
                | Self::CloudProvider
                | Self::Region
                | Self::OrganizationId
                | Self::WorkspaceId
        )
    }

    /// JSON key on the wire
    pub fn wire_key(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::AstroRuntimeVersion => "astroRuntimeVersion",
            Self::CloudProvider => "cloudProvider",
            Self::Region => "region",
            Self::OrganizationId => "organizationId",
            Self::WorkspaceId => "workspaceId",
            Self::Name => "name",
            Self::Description => "description",
            Self::DeploymentType => "type",
            Self::Executor => "executor",
            Self::DefaultTaskPodCpu => "defaultTaskPodCpu",
            Self::DefaultTaskPodMemory => "defaultTaskPodMemory",
            Self::ResourceQuotaCpu => "resourceQuotaCpu",
            Self::ResourceQuotaMemory => "resourceQuotaMemory",
            Self::SchedulerSize => "schedulerSize",
            Self::IsCicdEnforced => "isCicdEnforced",
            Self::IsDagDeployEnforced => "isDagDeployEnabled",
            Self::IsHighAvailability => "isHighAvailability",
            Self::WorkerQueues => "workerQueues",
        }
    }
}

/// Declared fields forwarded in one direction
#[derive(Debug, Clone, Copy)]
pub struct SupportedFields(&'static [DeclaredField]);

impl SupportedFields {
    /// Create body; the organization travels in the URL instead
    pub const CREATE: Self = Self(&[
        DeclaredField::AstroRuntimeVersion,
        DeclaredField::CloudProvider,
        DeclaredField::Region,
        DeclaredField::WorkspaceId,
        DeclaredField::Name,
        DeclaredField::Description,
        DeclaredField::DeploymentType,
        DeclaredField::Executor,
        DeclaredField::DefaultTaskPodCpu,
        DeclaredField::DefaultTaskPodMemory,
        DeclaredField::ResourceQuotaCpu,
        DeclaredField::ResourceQuotaMemory,
        DeclaredField::SchedulerSize,
        DeclaredField::IsCicdEnforced,
        DeclaredField::IsDagDeployEnforced,
        DeclaredField::IsHighAvailability,
        DeclaredField::WorkerQueues,
    ]);

    /// Update body: mutable fields only
    pub const UPDATE: Self = Self(&[
        DeclaredField::Name,
        DeclaredField::Description,
        DeclaredField::DeploymentType,
        DeclaredField::Executor,
        DeclaredField::DefaultTaskPodCpu,
        DeclaredField::DefaultTaskPodMemory,
        DeclaredField::ResourceQuotaCpu,
        DeclaredField::ResourceQuotaMemory,
        DeclaredField::SchedulerSize,
        DeclaredField::IsCicdEnforced,
        DeclaredField::IsDagDeployEnforced,
        DeclaredField::IsHighAvailability,
        DeclaredField::WorkerQueues,
    ]);

    /// Server-owned fields written back after every remote call
    ///
    /// For worker queues only the identities are written back.
    pub const OBSERVED: Self = Self(&[
        DeclaredField::Id,
        DeclaredField::CloudProvider,
        DeclaredField::Region,
        DeclaredField::OrganizationId,
        DeclaredField::WorkspaceId,
        DeclaredField::Name,
        DeclaredField::DeploymentType,
        DeclaredField::WorkerQueues,
    ]);

    pub fn fields(&self) -> &'static [DeclaredField] {
        self.0
    }

    pub fn contains(&self, field: DeclaredField) -> bool {
        self.0.contains(&field)
    }

    /// Declared fields this direction drops
    pub fn unsupported(&self) -> impl Iterator<Item = DeclaredField> + '_ {
        DeclaredField::ALL
            .into_iter()
            .filter(move |f| !self.contains(*f))
    }
}

/// Server-owned view of a remote deployment
///
/// Empty strings mean the response did not carry the field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObservedDeployment {
    pub id: String,
    pub cloud_provider: String,
    pub region: String,
    pub organization_id: String,
    pub workspace_id: String,
    pub name: String,
    pub deployment_type: String,
    /// `(name, id)` of every queue the control plane reported
    pub queue_ids: Vec<(String, String)>,
}

/// Canonical cloud provider spelling
pub fn normalize_cloud_provider(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

fn queue_payload(spec: &WorkerQueueSpec, with_id: bool) -> WorkerQueuePayload {
    WorkerQueuePayload {
        id: if with_id { spec.id.clone() } else { None },
        name: spec.name.clone(),
        astro_machine: spec.astro_machine.clone(),
        is_default: spec.is_default,
        min_worker_count: spec.min_worker_count,
        max_worker_count: spec.max_worker_count,
        worker_concurrency: spec.worker_concurrency,
    }
}

fn queue_spec(payload: &WorkerQueuePayload) -> WorkerQueueSpec {
    WorkerQueueSpec {
        id: payload.id.clone(),
        name: payload.name.clone(),
        astro_machine: payload.astro_machine.clone(),
        is_default: payload.is_default,
        min_worker_count: payload.min_worker_count,
        max_worker_count: payload.max_worker_count,
        worker_concurrency: payload.worker_concurrency,
    }
}

/// Build the create body
pub fn to_create_request(declared: &DeclaredDeployment) -> DeploymentCreateRequest {
    DeploymentCreateRequest {
        astro_runtime_version: declared.astro_runtime_version.clone(),
        cloud_provider: declared.cloud_provider.clone(),
        region: declared.region.clone(),
        workspace_id: declared.workspace_id.clone(),
        name: declared.name.clone(),
        description: declared.description.clone(),
        deployment_type: declared.deployment_type.clone(),
        executor: declared.executor.clone(),
        default_task_pod_cpu: declared.default_task_pod_cpu.clone(),
        default_task_pod_memory: declared.default_task_pod_memory.clone(),
        resource_quota_cpu: declared.resource_quota_cpu.clone(),
        resource_quota_memory: declared.resource_quota_memory.clone(),
        scheduler_size: declared.scheduler_size.clone(),
        is_cicd_enforced: declared.is_cicd_enforced,
        is_dag_deploy_enabled: declared.is_dag_deploy_enforced,
        is_high_availability: declared.is_high_availability,
        worker_queues: declared
            .worker_queues
            .iter()
            .map(|q| queue_payload(q, false))
            .collect(),
    }
}

/// Build the update body; immutable fields are left out
pub fn to_update_request(declared: &DeclaredDeployment) -> DeploymentUpdateRequest {
    DeploymentUpdateRequest {
        name: declared.name.clone(),
        description: declared.description.clone(),
        deployment_type: declared.deployment_type.clone(),
        executor: declared.executor.clone(),
        default_task_pod_cpu: declared.default_task_pod_cpu.clone(),
        default_task_pod_memory: declared.default_task_pod_memory.clone(),
        resource_quota_cpu: declared.resource_quota_cpu.clone(),
        resource_quota_memory: declared.resource_quota_memory.clone(),
        scheduler_size: declared.scheduler_size.clone(),
        is_cicd_enforced: declared.is_cicd_enforced,
        is_dag_deploy_enabled: declared.is_dag_deploy_enforced,
        is_high_availability: declared.is_high_availability,
        environment_variables: Vec::new(),
        worker_queues: declared
            .worker_queues
            .iter()
            .map(|q| queue_payload(q, true))
            .collect(),
    }
}

/// Extract the server-owned fields of a remote record
pub fn from_remote(remote: &RemoteDeployment) -> ObservedDeployment {
    ObservedDeployment {
        id: remote.id.clone(),
        cloud_provider: normalize_cloud_provider(&remote.cloud_provider),
        region: remote.region.clone(),
        organization_id: remote.organization_id.clone(),
        workspace_id: remote.workspace_id.clone(),
        name: remote.name.clone(),
        deployment_type: remote.deployment_type.clone(),
        queue_ids: remote
            .worker_queues
            .iter()
            .flatten()
            .filter_map(|q| q.id.clone().map(|id| (q.name.clone(), id)))
            .collect(),
    }
}

fn overwrite(target: &mut String, observed: String) {
    if !observed.is_empty() {
        *target = observed;
    }
}

/// Write server-owned fields into the declared value
///
/// Caller-owned fields, including every per-queue setting, stay as declared.
/// Queue identities are matched by name.
pub fn merge_observed(
    mut declared: DeclaredDeployment,
    observed: ObservedDeployment,
) -> DeclaredDeployment {
    overwrite(&mut declared.id, observed.id);
    overwrite(&mut declared.cloud_provider, observed.cloud_provider);
    overwrite(&mut declared.region, observed.region);
    overwrite(&mut declared.organization_id, observed.organization_id);
    overwrite(&mut declared.workspace_id, observed.workspace_id);
    overwrite(&mut declared.name, observed.name);
    overwrite(&mut declared.deployment_type, observed.deployment_type);

    for queue in &mut declared.worker_queues {
        if let Some((_, id)) = observed.queue_ids.iter().find(|(name, _)| *name == queue.name) {
            queue.id = Some(id.clone());
        }
    }
    declared
}

/// Full declared value rebuilt from a remote record
///
/// Used after an import, when the caller has nothing but an identity.
pub fn hydrate(remote: &RemoteDeployment) -> DeclaredDeployment {
    DeclaredDeployment {
        id: remote.id.clone(),
        astro_runtime_version: remote.astro_runtime_version.clone().unwrap_or_default(),
        cloud_provider: normalize_cloud_provider(&remote.cloud_provider),
        region: remote.region.clone(),
        organization_id: remote.organization_id.clone(),
        workspace_id: remote.workspace_id.clone(),
        name: remote.name.clone(),
        description: remote.description.clone(),
        deployment_type: remote.deployment_type.clone(),
        executor: remote.executor.clone().unwrap_or_default(),
        default_task_pod_cpu: remote.default_task_pod_cpu.clone().unwrap_or_default(),
        default_task_pod_memory: remote.default_task_pod_memory.clone().unwrap_or_default(),
        resource_quota_cpu: remote.resource_quota_cpu.clone().unwrap_or_default(),
        resource_quota_memory: remote.resource_quota_memory.clone().unwrap_or_default(),
        scheduler_size: remote.scheduler_size.clone().unwrap_or_default(),
        is_cicd_enforced: remote.is_cicd_enforced.unwrap_or_default(),
        is_dag_deploy_enforced: remote.is_dag_deploy_enabled.unwrap_or_default(),
        is_high_availability: remote.is_high_availability.unwrap_or_default(),
        worker_queues: remote
            .worker_queues
            .iter()
            .flatten()
            .map(queue_spec)
            .collect(),
    }
}
