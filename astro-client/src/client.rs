//! Remote client trait
//!
//! The narrow interface the reconciler consumes. Implementations must be
//! safe to share between deployments; callers never issue two operations
//! for the same deployment at once.

use async_trait::async_trait;
use shared::{DeploymentCreateRequest, DeploymentUpdateRequest, RemoteDeployment};

use crate::ClientResult;

/// Deployment CRUD against the control plane
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn create_deployment(
        &self,
        organization_id: &str,
        request: &DeploymentCreateRequest,
    ) -> ClientResult<RemoteDeployment>;

    async fn get_deployment(
        &self,
        organization_id: &str,
        deployment_id: &str,
    ) -> ClientResult<RemoteDeployment>;

    async fn update_deployment(
        &self,
        organization_id: &str,
        deployment_id: &str,
        request: &DeploymentUpdateRequest,
    ) -> ClientResult<RemoteDeployment>;

    async fn delete_deployment(&self, organization_id: &str, deployment_id: &str)
    -> ClientResult<()>;
}

#[async_trait]
impl<C: RemoteClient + ?Sized> RemoteClient for std::sync::Arc<C> {
    async fn create_deployment(
        &self,
        organization_id: &str,
        request: &DeploymentCreateRequest,
    ) -> ClientResult<RemoteDeployment> {
        (**self).create_deployment(organization_id, request).await
    }

    async fn get_deployment(
        &self,
        organization_id: &str,
        deployment_id: &str,
    ) -> ClientResult<RemoteDeployment> {
        (**self).get_deployment(organization_id, deployment_id).await
    }

    async fn update_deployment(
        &self,
        organization_id: &str,
        deployment_id: &str,
        request: &DeploymentUpdateRequest,
    ) -> ClientResult<RemoteDeployment> {
        (**self)
            .update_deployment(organization_id, deployment_id, request)
            .await
    }

    async fn delete_deployment(
        &self,
        organization_id: &str,
        deployment_id: &str,
    ) -> ClientResult<()> {
        (**self).delete_deployment(organization_id, deployment_id).await
    }
}
