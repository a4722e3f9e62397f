//! End-to-end lifecycle against the in-memory control plane

use astro_client::{ClientError, InMemoryControlPlane, Operation, RemoteClient};
use astro_reconciler::{
    FailureKind, PollPolicy, Reconciler, ReconcilerConfig, Verb, import, import_composite,
};
use shared::{DeclaredDeployment, DeploymentStatus, WorkerQueueSpec};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn prod() -> DeclaredDeployment {
    DeclaredDeployment {
        astro_runtime_version: "12.1.0".into(),
        cloud_provider: "aws".into(),
        region: "us-east-1".into(),
        organization_id: "org-1".into(),
        workspace_id: "ws-1".into(),
        name: "prod".into(),
        description: Some("production airflow".into()),
        deployment_type: "DEDICATED".into(),
        executor: "CELERY".into(),
        default_task_pod_cpu: "0.25".into(),
        default_task_pod_memory: "0.5Gi".into(),
        resource_quota_cpu: "10".into(),
        resource_quota_memory: "20Gi".into(),
        scheduler_size: "SMALL".into(),
        is_cicd_enforced: false,
        is_dag_deploy_enforced: true,
        is_high_availability: true,
        worker_queues: vec![
            WorkerQueueSpec::new("default", "A5")
                .with_default(true)
                .with_workers(1, 5)
                .with_concurrency(1),
            WorkerQueueSpec::new("extra", "A10")
                .with_workers(0, 3)
                .with_concurrency(2),
        ],
        ..Default::default()
    }
}

fn setup(plane: InMemoryControlPlane) -> (Arc<InMemoryControlPlane>, Reconciler<Arc<InMemoryControlPlane>>) {
    let plane = Arc::new(plane);
    let config = ReconcilerConfig::default().with_poll_policy(PollPolicy::fixed(
        Duration::from_secs(5),
        Duration::from_secs(60),
    ));
    (plane.clone(), Reconciler::new(plane, config))
}

#[tokio::test]
async fn test_create_healthy_immediately() {
    let (plane, reconciler) = setup(InMemoryControlPlane::new());

    let created = reconciler
        .create(prod(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(plane.calls(Operation::Create), 1);
    assert_eq!(plane.calls(Operation::Get), 0);
    assert!(created.has_identity());
    assert_eq!(created.cloud_provider, "AWS");
    let names: Vec<_> = created.worker_queues.iter().map(|q| q.name.as_str()).collect();
    assert_eq!(names, ["default", "extra"]);
    assert_eq!(created.worker_queues[0].min_worker_count, 1);
    assert_eq!(created.worker_queues[0].max_worker_count, 5);
    assert_eq!(created.worker_queues[1].worker_concurrency, 2);
    assert_eq!(created.worker_queues[1].astro_machine, "A10");
}

#[tokio::test]
async fn test_read_after_create_is_stable() {
    let (_, reconciler) = setup(InMemoryControlPlane::new());
    let created = reconciler
        .create(prod(), &CancellationToken::new())
        .await
        .unwrap();

    let refreshed = reconciler.read(created.clone()).await.unwrap();

    assert_eq!(refreshed, created);
}

#[tokio::test(start_paused = true)]
async fn test_create_converges_through_provisioning() {
    let (plane, reconciler) = setup(InMemoryControlPlane::new().with_create_statuses(vec![
        DeploymentStatus::Provisioning,
        DeploymentStatus::Provisioning,
        DeploymentStatus::Healthy,
    ]));

    let created = reconciler
        .create(prod(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(created.has_identity());
    assert_eq!(plane.calls(Operation::Get), 2);
}

#[tokio::test(start_paused = true)]
async fn test_create_never_healthy_times_out_with_partial_state() {
    let (plane, reconciler) = setup(
        InMemoryControlPlane::new().with_create_statuses(vec![DeploymentStatus::Deploying]),
    );

    let err = reconciler
        .create(prod(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind, FailureKind::Timeout);
    assert_eq!(err.verb, Verb::Create);
    let partial = err.into_partial().unwrap();
    assert!(partial.has_identity());
    assert!(plane.snapshot(&partial.id).is_some());
    // checks at 0s, 5s, ... 55s; the 60s wake-up hits the deadline
    assert_eq!(plane.calls(Operation::Get), 12);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_create_keeps_identity() {
    let (_, reconciler) = setup(
        InMemoryControlPlane::new().with_create_statuses(vec![DeploymentStatus::Creating]),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(12)).await;
        trigger.cancel();
    });

    let err = reconciler.create(prod(), &cancel).await.unwrap_err();

    assert_eq!(err.kind, FailureKind::Timeout);
    assert!(err.partial().is_some_and(|p| p.has_identity()));
}

#[tokio::test]
async fn test_remote_error_on_create() {
    let (plane, reconciler) = setup(InMemoryControlPlane::new());
    plane.fail_next(
        Operation::Create,
        ClientError::InvalidResponse("truncated body".into()),
    );

    let err = reconciler
        .create(prod(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind, FailureKind::RemoteError);
    assert!(err.to_string().starts_with("create deployment <unassigned>"));
    assert!(err.partial().is_none());
}

#[tokio::test]
async fn test_update_never_sends_changed_region() {
    let (plane, reconciler) = setup(InMemoryControlPlane::new());
    let created = reconciler
        .create(prod(), &CancellationToken::new())
        .await
        .unwrap();

    let mut desired = created.clone();
    desired.region = "eu-west-1".into();
    desired.executor = "KUBERNETES".into();
    reconciler
        .update(desired, &CancellationToken::new())
        .await
        .unwrap();

    let remote = plane.snapshot(&created.id).unwrap();
    assert_eq!(remote.region, "us-east-1");
    assert_eq!(remote.executor.as_deref(), Some("KUBERNETES"));
}

#[tokio::test]
async fn test_update_keeps_queue_ids() {
    let (plane, reconciler) = setup(InMemoryControlPlane::new());
    let created = reconciler
        .create(prod(), &CancellationToken::new())
        .await
        .unwrap();
    let before: Vec<_> = created.worker_queues.iter().map(|q| q.id.clone()).collect();

    let mut desired = created.clone();
    desired.worker_queues[1].max_worker_count = 8;
    let updated = reconciler
        .update(desired, &CancellationToken::new())
        .await
        .unwrap();

    let after: Vec<_> = updated.worker_queues.iter().map(|q| q.id.clone()).collect();
    assert_eq!(before, after);
    let remote_queues = plane.snapshot(&created.id).unwrap().worker_queues.unwrap();
    assert_eq!(remote_queues[1].max_worker_count, 8);
}

#[tokio::test]
async fn test_delete_twice_succeeds() {
    let (plane, reconciler) = setup(InMemoryControlPlane::new());
    let created = reconciler
        .create(prod(), &CancellationToken::new())
        .await
        .unwrap();

    reconciler.delete(&created).await.unwrap();
    reconciler.delete(&created).await.unwrap();

    assert!(plane.is_empty());
}

#[tokio::test]
async fn test_delete_rejection_is_reported() {
    let (plane, reconciler) = setup(InMemoryControlPlane::new());
    let created = reconciler
        .create(prod(), &CancellationToken::new())
        .await
        .unwrap();
    plane.fail_next(
        Operation::Delete,
        ClientError::Forbidden("deployment is locked".into()),
    );

    let err = reconciler.delete(&created).await.unwrap_err();

    assert_eq!(err.kind, FailureKind::DeleteRejected);
    assert!(err.message.contains("deployment is locked"));
}

#[tokio::test]
async fn test_import_then_read_hydrates() {
    let seed = InMemoryControlPlane::new();
    let existing = seed
        .create_deployment("org-1", &astro_reconciler::mapper::to_create_request(&prod()))
        .await
        .unwrap();
    let (_, reconciler) = setup(seed);

    let adopted = reconciler
        .read(import_composite(&format!("org-1/{}", existing.id)))
        .await
        .unwrap();

    assert_eq!(adopted.id, existing.id);
    assert_eq!(adopted.name, "prod");
    assert_eq!(adopted.organization_id, "org-1");
    assert_eq!(adopted.cloud_provider, "AWS");
    assert_eq!(adopted.astro_runtime_version, "12.1.0");
    assert_eq!(adopted.scheduler_size, "SMALL");
    assert_eq!(adopted.worker_queues.len(), 2);
    assert!(adopted.worker_queues.iter().all(|q| q.id.is_some()));
}

#[tokio::test]
async fn test_import_bare_id_uses_default_organization() {
    let plane = Arc::new(InMemoryControlPlane::new());
    let existing = plane
        .create_deployment("org-9", &astro_reconciler::mapper::to_create_request(&prod()))
        .await
        .unwrap();
    let reconciler = Reconciler::new(
        plane.clone(),
        ReconcilerConfig::default().with_default_organization("org-9"),
    );

    let adopted = reconciler.read(import(existing.id.clone())).await.unwrap();

    assert_eq!(adopted.organization_id, "org-9");
    assert_eq!(adopted.name, "prod");
}

#[tokio::test]
async fn test_read_unknown_id_is_not_found() {
    let (_, reconciler) = setup(InMemoryControlPlane::new());

    let err = reconciler.read(import("org-1/dep-nope")).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::InvalidDeclaration);

    let err = reconciler
        .read(import_composite("org-1/dep-nope"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::NotFound);
    assert_eq!(err.verb, Verb::Read);
}

#[tokio::test]
async fn test_two_default_queues_make_no_remote_call() {
    let (plane, reconciler) = setup(InMemoryControlPlane::new());
    let mut declared = prod();
    declared.worker_queues[1].is_default = true;

    let err = reconciler
        .create(declared, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind, FailureKind::InvalidDeclaration);
    assert!(err.message.contains("default"));
    assert_eq!(plane.calls(Operation::Create), 0);
}
