//! In-memory control plane
//!
//! Implements [`RemoteClient`] against a process-local map. Statuses can be
//! scripted so convergence can be exercised without a network, and call
//! counters let callers assert how many remote operations happened.
//!
//! Like the hosted API, it reports cloud providers in lower case.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::{
    DeploymentCreateRequest, DeploymentStatus, DeploymentUpdateRequest, RemoteDeployment,
    WorkerQueuePayload,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{ClientError, ClientResult, RemoteClient};

/// Which remote operation a counter or injected failure refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Get,
    Update,
    Delete,
}

#[derive(Debug)]
struct Entry {
    organization_id: String,
    record: RemoteDeployment,
    /// Statuses handed out by successive reads; the last one sticks
    script: VecDeque<DeploymentStatus>,
}

#[derive(Debug, Default)]
struct Counters {
    create: AtomicUsize,
    get: AtomicUsize,
    update: AtomicUsize,
    delete: AtomicUsize,
}

impl Counters {
    fn slot(&self, op: Operation) -> &AtomicUsize {
        match op {
            Operation::Create => &self.create,
            Operation::Get => &self.get,
            Operation::Update => &self.update,
            Operation::Delete => &self.delete,
        }
    }
}

/// Process-local stand-in for the deployments API
#[derive(Debug)]
pub struct InMemoryControlPlane {
    deployments: Mutex<HashMap<String, Entry>>,
    create_script: Mutex<Vec<DeploymentStatus>>,
    failures: Mutex<HashMap<Operation, VecDeque<ClientError>>>,
    counters: Counters,
}

impl Default for InMemoryControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryControlPlane {
    /// New deployments report HEALTHY straight away
    pub fn new() -> Self {
        Self {
            deployments: Mutex::new(HashMap::new()),
            create_script: Mutex::new(vec![DeploymentStatus::Healthy]),
            failures: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Status sequence for newly created deployments
    ///
    /// The first status is returned by create, the rest by successive reads.
    pub fn with_create_statuses(self, statuses: Vec<DeploymentStatus>) -> Self {
        if !statuses.is_empty() {
            *self.create_script.lock() = statuses;
        }
        self
    }

    /// Queue statuses for the next reads of an existing deployment
    pub fn script_statuses(&self, deployment_id: &str, statuses: Vec<DeploymentStatus>) {
        if let Some(entry) = self.deployments.lock().get_mut(deployment_id) {
            entry.script = statuses.into();
        }
    }

    /// Fail the next call of `op` with `error`
    pub fn fail_next(&self, op: Operation, error: ClientError) {
        self.failures.lock().entry(op).or_default().push_back(error);
    }

    /// Seed a deployment that already exists remotely
    pub fn insert(&self, organization_id: impl Into<String>, record: RemoteDeployment) {
        self.deployments.lock().insert(
            record.id.clone(),
            Entry {
                organization_id: organization_id.into(),
                record,
                script: VecDeque::new(),
            },
        );
    }

    /// Current record, without counting as a read
    pub fn snapshot(&self, deployment_id: &str) -> Option<RemoteDeployment> {
        self.deployments
            .lock()
            .get(deployment_id)
            .map(|e| e.record.clone())
    }

    pub fn calls(&self, op: Operation) -> usize {
        self.counters.slot(op).load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.deployments.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn begin(&self, op: Operation) -> ClientResult<()> {
        self.counters.slot(op).fetch_add(1, Ordering::SeqCst);
        match self.failures.lock().get_mut(&op).and_then(|q| q.pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn locate<'a>(
        map: &'a mut HashMap<String, Entry>,
        organization_id: &str,
        deployment_id: &str,
    ) -> ClientResult<&'a mut Entry> {
        match map.get_mut(deployment_id) {
            Some(entry) if entry.organization_id == organization_id => Ok(entry),
            _ => Err(ClientError::NotFound(format!(
                "deployment {deployment_id} not found in organization {organization_id}"
            ))),
        }
    }
}

fn assign_queue_ids(queues: &[WorkerQueuePayload]) -> Vec<WorkerQueuePayload> {
    queues
        .iter()
        .map(|q| WorkerQueuePayload {
            id: Some(
                q.id.clone()
                    .unwrap_or_else(|| format!("wq-{}", uuid::Uuid::new_v4().simple())),
            ),
            ..q.clone()
        })
        .collect()
}

#[async_trait]
impl RemoteClient for InMemoryControlPlane {
    async fn create_deployment(
        &self,
        organization_id: &str,
        request: &DeploymentCreateRequest,
    ) -> ClientResult<RemoteDeployment> {
        self.begin(Operation::Create)?;

        let mut script: VecDeque<DeploymentStatus> = self.create_script.lock().clone().into();
        let status = script.pop_front().unwrap_or(DeploymentStatus::Healthy);

        let record = RemoteDeployment {
            id: format!("dep-{}", uuid::Uuid::new_v4().simple()),
            status,
            name: request.name.clone(),
            description: request.description.clone(),
            deployment_type: request.deployment_type.clone(),
            region: request.region.clone(),
            organization_id: organization_id.to_string(),
            workspace_id: request.workspace_id.clone(),
            cloud_provider: request.cloud_provider.to_ascii_lowercase(),
            astro_runtime_version: Some(request.astro_runtime_version.clone()),
            executor: Some(request.executor.clone()),
            scheduler_size: Some(request.scheduler_size.clone()),
            default_task_pod_cpu: Some(request.default_task_pod_cpu.clone()),
            default_task_pod_memory: Some(request.default_task_pod_memory.clone()),
            resource_quota_cpu: Some(request.resource_quota_cpu.clone()),
            resource_quota_memory: Some(request.resource_quota_memory.clone()),
            is_cicd_enforced: Some(request.is_cicd_enforced),
            is_dag_deploy_enabled: Some(request.is_dag_deploy_enabled),
            is_high_availability: Some(request.is_high_availability),
            worker_queues: Some(assign_queue_ids(&request.worker_queues)),
        };

        tracing::debug!(id = %record.id, status = %record.status, "simulated create");
        self.deployments.lock().insert(
            record.id.clone(),
            Entry {
                organization_id: organization_id.to_string(),
                record: record.clone(),
                script,
            },
        );
        Ok(record)
    }

    async fn get_deployment(
        &self,
        organization_id: &str,
        deployment_id: &str,
    ) -> ClientResult<RemoteDeployment> {
        self.begin(Operation::Get)?;
        let mut map = self.deployments.lock();
        let entry = Self::locate(&mut map, organization_id, deployment_id)?;
        if let Some(next) = entry.script.pop_front() {
            entry.record.status = next;
        }
        Ok(entry.record.clone())
    }

    async fn update_deployment(
        &self,
        organization_id: &str,
        deployment_id: &str,
        request: &DeploymentUpdateRequest,
    ) -> ClientResult<RemoteDeployment> {
        self.begin(Operation::Update)?;
        let mut map = self.deployments.lock();
        let entry = Self::locate(&mut map, organization_id, deployment_id)?;
        let record = &mut entry.record;
        record.name = request.name.clone();
        record.description = request.description.clone();
        record.deployment_type = request.deployment_type.clone();
        record.executor = Some(request.executor.clone());
        record.scheduler_size = Some(request.scheduler_size.clone());
        record.default_task_pod_cpu = Some(request.default_task_pod_cpu.clone());
        record.default_task_pod_memory = Some(request.default_task_pod_memory.clone());
        record.resource_quota_cpu = Some(request.resource_quota_cpu.clone());
        record.resource_quota_memory = Some(request.resource_quota_memory.clone());
        record.is_cicd_enforced = Some(request.is_cicd_enforced);
        record.is_dag_deploy_enabled = Some(request.is_dag_deploy_enabled);
        record.is_high_availability = Some(request.is_high_availability);
        record.worker_queues = Some(assign_queue_ids(&request.worker_queues));
        Ok(record.clone())
    }

    async fn delete_deployment(
        &self,
        organization_id: &str,
        deployment_id: &str,
    ) -> ClientResult<()> {
        self.begin(Operation::Delete)?;
        let mut map = self.deployments.lock();
        Self::locate(&mut map, organization_id, deployment_id)?;
        map.remove(deployment_id);
        Ok(())
    }
}
