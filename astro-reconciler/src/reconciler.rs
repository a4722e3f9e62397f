//! Lifecycle orchestration
//!
//! Each verb is an isolated call: declared state in, refreshed declared
//! state (or a [`ReconcileError`]) out. The reconciler keeps nothing between
//! calls and never retries a failed remote call; callers must not run two
//! operations on the same deployment at once.

use astro_client::RemoteClient;
use shared::{DeclaredDeployment, DeploymentStatus, RemoteDeployment};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::config::ReconcilerConfig;
use crate::error::{FailureKind, ReconcileError, ReconcileResult, Verb};
use crate::mapper;
use crate::phase::{Lifecycle, Phase};
use crate::poller::{self, Readiness};
use crate::validation;

pub struct Reconciler<C> {
    client: C,
    config: ReconcilerConfig,
}

impl<C: RemoteClient> Reconciler<C> {
    pub fn new(client: C, config: ReconcilerConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Create the deployment and wait until it is healthy
    ///
    /// If the deployment is created but never converges, the error carries
    /// the partial declared state, identity included.
    #[instrument(skip_all, fields(name = %declared.name))]
    pub async fn create(
        &self,
        declared: DeclaredDeployment,
        cancel: &CancellationToken,
    ) -> ReconcileResult<DeclaredDeployment> {
        let mut lifecycle = Lifecycle::start(Verb::Create);
        let organization_id = self
            .organization_for(&declared, Verb::Create)
            .map_err(|e| lifecycle.fail(e))?;
        self.preflight(&declared, Verb::Create)
            .map_err(|e| lifecycle.fail(e))?;

        let request = mapper::to_create_request(&declared);
        lifecycle.advance(Phase::InFlight);
        let created = self
            .client
            .create_deployment(&organization_id, &request)
            .await
            .map_err(|e| lifecycle.fail(ReconcileError::from_client(Verb::Create, None, e)))?;
        info!(id = %created.id, status = %created.status, "deployment created");

        let mut result = mapper::merge_observed(declared, mapper::from_remote(&created));
        if result.organization_id.is_empty() {
            result.organization_id = organization_id.clone();
        }
        let result = self
            .settle(
                &mut lifecycle,
                Verb::Create,
                &organization_id,
                result,
                &created,
                cancel,
            )
            .await?;

        lifecycle.advance(Phase::Done);
        Ok(result)
    }

    /// Refresh server-owned fields, or hydrate an imported identity
    #[instrument(skip_all, fields(id = %declared.id))]
    pub async fn read(&self, declared: DeclaredDeployment) -> ReconcileResult<DeclaredDeployment> {
        let mut lifecycle = Lifecycle::start(Verb::Read);
        let organization_id = self
            .organization_for(&declared, Verb::Read)
            .and_then(|org| Self::require_identity(&declared, Verb::Read).map(|_| org))
            .map_err(|e| lifecycle.fail(e))?;

        lifecycle.advance(Phase::InFlight);
        let remote = self
            .client
            .get_deployment(&organization_id, &declared.id)
            .await
            .map_err(|e| {
                lifecycle.fail(ReconcileError::from_client(Verb::Read, Some(&declared.id), e))
            })?;

        if remote.status == DeploymentStatus::Deleted {
            return Err(lifecycle.fail(
                ReconcileError::new(
                    FailureKind::NotFound,
                    Verb::Read,
                    "control plane reports the deployment as deleted",
                )
                .with_identity(Some(&declared.id)),
            ));
        }

        let result = if declared.is_import_stub() {
            info!("hydrating imported deployment");
            let mut hydrated = mapper::hydrate(&remote);
            if hydrated.organization_id.is_empty() {
                hydrated.organization_id = organization_id;
            }
            hydrated
        } else {
            mapper::merge_observed(declared, mapper::from_remote(&remote))
        };

        lifecycle.advance(Phase::Done);
        Ok(result)
    }

    /// Push mutable fields; immutable ones are never sent
    #[instrument(skip_all, fields(id = %declared.id))]
    pub async fn update(
        &self,
        declared: DeclaredDeployment,
        cancel: &CancellationToken,
    ) -> ReconcileResult<DeclaredDeployment> {
        let mut lifecycle = Lifecycle::start(Verb::Update);
        let organization_id = self
            .organization_for(&declared, Verb::Update)
            .and_then(|org| Self::require_identity(&declared, Verb::Update).map(|_| org))
            .map_err(|e| lifecycle.fail(e))?;
        self.preflight(&declared, Verb::Update)
            .map_err(|e| lifecycle.fail(e))?;

        let request = mapper::to_update_request(&declared);
        lifecycle.advance(Phase::InFlight);
        let updated = self
            .client
            .update_deployment(&organization_id, &declared.id, &request)
            .await
            .map_err(|e| {
                lifecycle.fail(ReconcileError::from_client(
                    Verb::Update,
                    Some(&declared.id),
                    e,
                ))
            })?;
        info!(status = %updated.status, "deployment updated");

        let result = mapper::merge_observed(declared, mapper::from_remote(&updated));
        let result = self
            .settle(
                &mut lifecycle,
                Verb::Update,
                &organization_id,
                result,
                &updated,
                cancel,
            )
            .await?;

        lifecycle.advance(Phase::Done);
        Ok(result)
    }

    /// Delete the deployment; an already absent one counts as deleted
    #[instrument(skip_all, fields(id = %declared.id))]
    pub async fn delete(&self, declared: &DeclaredDeployment) -> ReconcileResult<()> {
        let mut lifecycle = Lifecycle::start(Verb::Delete);
        let organization_id = self
            .organization_for(declared, Verb::Delete)
            .and_then(|org| Self::require_identity(declared, Verb::Delete).map(|_| org))
            .map_err(|e| lifecycle.fail(e))?;

        lifecycle.advance(Phase::InFlight);
        match self
            .client
            .delete_deployment(&organization_id, &declared.id)
            .await
        {
            Ok(()) => info!("deployment deleted"),
            Err(e) if e.is_not_found() => info!("deployment already absent"),
            Err(e) => {
                return Err(lifecycle.fail(ReconcileError::from_client(
                    Verb::Delete,
                    Some(&declared.id),
                    e,
                )));
            }
        }

        lifecycle.advance(Phase::Done);
        Ok(())
    }

    /// Adopt an existing deployment by identity
    ///
    /// The identity is kept verbatim; nothing is split or trimmed and no
    /// remote call is made. Use [`crate::import_composite`] for
    /// `<organization>/<id>` input.
    pub fn import(&self, id: &str) -> ReconcileResult<DeclaredDeployment> {
        if id.is_empty() {
            return Err(ReconcileError::invalid(
                Verb::Import,
                "cannot import an empty identity",
            ));
        }
        info!(id, "deployment imported");
        Ok(crate::import::import(id))
    }

    /// Wait for convergence after a create or update response when the
    /// convergence policy asks for it
    async fn settle(
        &self,
        lifecycle: &mut Lifecycle,
        verb: Verb,
        organization_id: &str,
        result: DeclaredDeployment,
        response: &RemoteDeployment,
        cancel: &CancellationToken,
    ) -> ReconcileResult<DeclaredDeployment> {
        debug_assert_eq!(lifecycle.phase(), Phase::InFlight);
        if !self.config.convergence.waits_after(verb) {
            return Ok(result);
        }
        match poller::classify_status(&response.status) {
            Readiness::Ready => Ok(result),
            Readiness::Failed => Err(lifecycle.fail(
                ReconcileError::new(
                    FailureKind::RemoteTerminalFailure,
                    verb,
                    format!("control plane reported status {}", response.status),
                )
                .with_partial(result),
            )),
            Readiness::Pending => {
                lifecycle.advance(Phase::Converging);
                let client = &self.client;
                let poll = |id: String| async move {
                    client.get_deployment(organization_id, &id).await
                };
                match poller::await_ready(
                    &response.id,
                    &self.config.poll,
                    cancel,
                    poll,
                    poller::classify_status,
                )
                .await
                {
                    Ok(ready) => Ok(mapper::merge_observed(result, mapper::from_remote(&ready))),
                    Err(failure) => {
                        let partial = match failure.last_observed() {
                            Some(last) => mapper::merge_observed(result, mapper::from_remote(last)),
                            None => result,
                        };
                        Err(lifecycle.fail(
                            ReconcileError::from_poll(verb, &response.id, failure)
                                .with_partial(partial),
                        ))
                    }
                }
            }
        }
    }

    fn preflight(&self, declared: &DeclaredDeployment, verb: Verb) -> ReconcileResult<()> {
        if !self.config.validate_declarations {
            return Ok(());
        }
        validation::validate(declared).map_err(|violations| {
            ReconcileError::invalid(verb, validation::describe(&violations))
                .with_identity(declared.identity())
        })
    }

    fn require_identity(declared: &DeclaredDeployment, verb: Verb) -> ReconcileResult<()> {
        if declared.has_identity() {
            Ok(())
        } else {
            Err(ReconcileError::invalid(verb, "deployment has no identity"))
        }
    }

    fn organization_for(&self, declared: &DeclaredDeployment, verb: Verb) -> ReconcileResult<String> {
        if !declared.organization_id.is_empty() {
            return Ok(declared.organization_id.clone());
        }
        self.config
            .default_organization_id
            .clone()
            .ok_or_else(|| {
                ReconcileError::invalid(
                    verb,
                    "no organization declared and no default organization configured",
                )
                .with_identity(declared.identity())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astro_client::{ClientError, InMemoryControlPlane, Operation};
    use shared::WorkerQueueSpec;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::ConvergencePolicy;
    use crate::poller::PollPolicy;

    fn declared() -> DeclaredDeployment {
        DeclaredDeployment {
            astro_runtime_version: "12.1.0".into(),
            cloud_provider: "AWS".into(),
            region: "us-east-1".into(),
            organization_id: "org-1".into(),
            workspace_id: "ws-1".into(),
            name: "prod".into(),
            deployment_type: "DEDICATED".into(),
            executor: "CELERY".into(),
            default_task_pod_cpu: "0.25".into(),
            default_task_pod_memory: "0.5Gi".into(),
            resource_quota_cpu: "10".into(),
            resource_quota_memory: "20Gi".into(),
            scheduler_size: "SMALL".into(),
            is_dag_deploy_enforced: true,
            worker_queues: vec![
                WorkerQueueSpec::new("default", "A5")
                    .with_default(true)
                    .with_workers(1, 5)
                    .with_concurrency(1),
                WorkerQueueSpec::new("extra", "A5")
                    .with_workers(0, 3)
                    .with_concurrency(2),
            ],
            ..Default::default()
        }
    }

    fn reconciler(plane: Arc<InMemoryControlPlane>) -> Reconciler<Arc<InMemoryControlPlane>> {
        let config = ReconcilerConfig::default()
            .with_poll_policy(PollPolicy::fixed(Duration::from_secs(1), Duration::from_secs(30)));
        Reconciler::new(plane, config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_waits_for_healthy() {
        let plane = Arc::new(InMemoryControlPlane::new().with_create_statuses(vec![
            DeploymentStatus::Creating,
            DeploymentStatus::Deploying,
            DeploymentStatus::Healthy,
        ]));
        let r = reconciler(plane.clone());

        let created = r.create(declared(), &CancellationToken::new()).await.unwrap();

        assert!(created.has_identity());
        assert_eq!(plane.calls(Operation::Create), 1);
        assert_eq!(plane.calls(Operation::Get), 2);
        assert!(created.worker_queues.iter().all(|q| q.id.is_some()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_terminal_failure_returns_partial() {
        let plane = Arc::new(InMemoryControlPlane::new().with_create_statuses(vec![
            DeploymentStatus::Creating,
            DeploymentStatus::Unhealthy,
        ]));
        let r = reconciler(plane.clone());

        let err = r.create(declared(), &CancellationToken::new()).await.unwrap_err();

        assert_eq!(err.kind, FailureKind::RemoteTerminalFailure);
        assert_eq!(err.verb, Verb::Create);
        let partial = err.partial().unwrap();
        assert!(partial.has_identity());
        assert_eq!(err.identity.as_deref(), Some(partial.id.as_str()));
        assert_eq!(plane.calls(Operation::Get), 1);
    }

    #[tokio::test]
    async fn test_create_response_already_failed_skips_polling() {
        let plane = Arc::new(
            InMemoryControlPlane::new().with_create_statuses(vec![DeploymentStatus::Error]),
        );
        let r = reconciler(plane.clone());

        let err = r.create(declared(), &CancellationToken::new()).await.unwrap_err();

        assert_eq!(err.kind, FailureKind::RemoteTerminalFailure);
        assert_eq!(plane.calls(Operation::Get), 0);
    }

    #[tokio::test]
    async fn test_create_rejection_is_not_retried() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.fail_next(
            Operation::Create,
            ClientError::Rejected {
                status: 400,
                message: "unknown runtime version".into(),
            },
        );
        let r = reconciler(plane.clone());

        let err = r.create(declared(), &CancellationToken::new()).await.unwrap_err();

        assert_eq!(err.kind, FailureKind::CreateRejected);
        assert!(err.message.contains("unknown runtime version"));
        assert!(err.identity.is_none());
        assert_eq!(plane.calls(Operation::Create), 1);
        assert!(plane.is_empty());
    }

    #[tokio::test]
    async fn test_two_default_queues_rejected_locally() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let r = reconciler(plane.clone());
        let mut d = declared();
        d.worker_queues[1].is_default = true;

        let err = r.create(d, &CancellationToken::new()).await.unwrap_err();

        assert_eq!(err.kind, FailureKind::InvalidDeclaration);
        assert_eq!(plane.calls(Operation::Create), 0);
    }

    #[tokio::test]
    async fn test_validation_can_be_disabled() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let r = Reconciler::new(plane.clone(), ReconcilerConfig::default().with_validation(false));
        let mut d = declared();
        d.worker_queues[1].is_default = true;

        assert!(r.create(d, &CancellationToken::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_organization_uses_default() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let mut d = declared();
        d.organization_id.clear();

        let bare = reconciler(plane.clone());
        let err = bare.create(d.clone(), &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::InvalidDeclaration);

        let r = Reconciler::new(
            plane.clone(),
            ReconcilerConfig::default().with_default_organization("org-7"),
        );
        let created = r.create(d, &CancellationToken::new()).await.unwrap();
        assert_eq!(created.organization_id, "org-7");
    }

    #[tokio::test]
    async fn test_read_unknown_identity_is_not_found() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let r = reconciler(plane);
        let mut d = declared();
        d.id = "dep-missing".into();

        let err = r.read(d).await.unwrap_err();

        assert_eq!(err.kind, FailureKind::NotFound);
        assert_eq!(err.identity.as_deref(), Some("dep-missing"));
    }

    #[tokio::test]
    async fn test_read_deleted_status_is_not_found() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.insert(
            "org-1",
            RemoteDeployment::new("dep-gone", DeploymentStatus::Deleted),
        );
        let r = reconciler(plane);
        let mut d = declared();
        d.id = "dep-gone".into();

        assert_eq!(r.read(d).await.unwrap_err().kind, FailureKind::NotFound);
    }

    #[tokio::test]
    async fn test_read_without_identity_makes_no_call() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let r = reconciler(plane.clone());

        let err = r.read(declared()).await.unwrap_err();

        assert_eq!(err.kind, FailureKind::InvalidDeclaration);
        assert_eq!(plane.calls(Operation::Get), 0);
    }

    #[tokio::test]
    async fn test_update_does_not_wait_by_default() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let r = reconciler(plane.clone());
        let created = r.create(declared(), &CancellationToken::new()).await.unwrap();
        plane.insert(
            "org-1",
            RemoteDeployment {
                status: DeploymentStatus::Deploying,
                ..plane.snapshot(&created.id).unwrap()
            },
        );
        plane.script_statuses(&created.id, vec![DeploymentStatus::Healthy]);

        let mut desired = created.clone();
        desired.scheduler_size = "MEDIUM".into();
        let updated = r.update(desired, &CancellationToken::new()).await.unwrap();

        assert_eq!(updated.scheduler_size, "MEDIUM");
        assert_eq!(plane.calls(Operation::Update), 1);
        assert_eq!(plane.calls(Operation::Get), 0);
        assert_eq!(
            plane.snapshot(&created.id).unwrap().status,
            DeploymentStatus::Deploying
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_waits_when_configured() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let r = Reconciler::new(
            plane.clone(),
            ReconcilerConfig::default()
                .with_poll_policy(PollPolicy::fixed(
                    Duration::from_secs(1),
                    Duration::from_secs(30),
                ))
                .with_convergence(ConvergencePolicy {
                    on_create: true,
                    on_update: true,
                }),
        );
        let created = r.create(declared(), &CancellationToken::new()).await.unwrap();
        plane.insert(
            "org-1",
            RemoteDeployment {
                status: DeploymentStatus::Deploying,
                ..plane.snapshot(&created.id).unwrap()
            },
        );
        plane.script_statuses(&created.id, vec![DeploymentStatus::Healthy]);

        let updated = r.update(created, &CancellationToken::new()).await.unwrap();

        assert!(updated.has_identity());
        assert_eq!(plane.calls(Operation::Get), 1);
    }

    #[tokio::test]
    async fn test_update_rejection() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let r = reconciler(plane.clone());
        let created = r.create(declared(), &CancellationToken::new()).await.unwrap();
        plane.fail_next(
            Operation::Update,
            ClientError::Rejected {
                status: 422,
                message: "quota exceeded".into(),
            },
        );

        let err = r.update(created.clone(), &CancellationToken::new()).await.unwrap_err();

        assert_eq!(err.kind, FailureKind::UpdateRejected);
        assert_eq!(err.identity.as_deref(), Some(created.id.as_str()));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let r = reconciler(plane.clone());
        let created = r.create(declared(), &CancellationToken::new()).await.unwrap();

        r.delete(&created).await.unwrap();
        r.delete(&created).await.unwrap();

        assert_eq!(plane.calls(Operation::Delete), 2);
        assert!(plane.is_empty());
    }

    #[tokio::test]
    async fn test_delete_transport_failure() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let r = reconciler(plane.clone());
        let created = r.create(declared(), &CancellationToken::new()).await.unwrap();
        plane.fail_next(Operation::Delete, ClientError::Internal("504".into()));

        let err = r.delete(&created).await.unwrap_err();

        assert_eq!(err.kind, FailureKind::RemoteError);
        assert_eq!(plane.len(), 1);
    }

    #[test]
    fn test_import_keeps_identity_verbatim() {
        let r = reconciler(Arc::new(InMemoryControlPlane::new()));

        let stub = r.import("team/dep-1").unwrap();

        assert_eq!(stub.id, "team/dep-1");
        assert!(stub.organization_id.is_empty());
        assert!(stub.is_import_stub());
    }

    #[test]
    fn test_import_empty_identity_is_invalid() {
        let r = reconciler(Arc::new(InMemoryControlPlane::new()));

        let err = r.import("").unwrap_err();

        assert_eq!(err.kind, FailureKind::InvalidDeclaration);
        assert_eq!(err.verb, Verb::Import);
    }

    #[tokio::test]
    async fn test_read_keeps_caller_owned_fields_without_name() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let mut remote = RemoteDeployment::new("dep-7", DeploymentStatus::Healthy);
        remote.name = "prod".into();
        remote.executor = Some("KUBERNETES".into());
        remote.scheduler_size = Some("LARGE".into());
        plane.insert("org-1", remote);
        let r = reconciler(plane);

        let read = r
            .read(DeclaredDeployment {
                id: "dep-7".into(),
                organization_id: "org-1".into(),
                executor: "CELERY".into(),
                scheduler_size: "SMALL".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(read.executor, "CELERY");
        assert_eq!(read.scheduler_size, "SMALL");
        assert_eq!(read.name, "prod");
    }

    #[tokio::test]
    async fn test_read_hydrates_bare_identity() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let mut remote = RemoteDeployment::new("dep-8", DeploymentStatus::Healthy);
        remote.executor = Some("KUBERNETES".into());
        plane.insert("org-1", remote);
        let r = reconciler(plane);

        let mut stub = r.import("dep-8").unwrap();
        stub.organization_id = "org-1".into();
        let read = r.read(stub).await.unwrap();

        assert_eq!(read.executor, "KUBERNETES");
        assert_eq!(read.organization_id, "org-1");
    }
}
