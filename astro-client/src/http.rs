//! HTTP client for the deployments API

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use shared::{DeploymentCreateRequest, DeploymentUpdateRequest, RemoteDeployment};
use tracing::{debug, instrument};

use crate::{ClientConfig, ClientError, ClientResult, RemoteClient};

/// Error body returned by the control plane
#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiErrorResponse {
    pub message: String,
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Network HTTP client
#[derive(Debug, Clone)]
pub struct HttpDeploymentClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpDeploymentClient {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn auth_header(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }

    fn deployments_url(&self, organization_id: &str) -> String {
        format!(
            "{}/organizations/{}/deployments",
            self.base_url, organization_id
        )
    }

    fn deployment_url(&self, organization_id: &str, deployment_id: &str) -> String {
        format!("{}/{}", self.deployments_url(organization_id), deployment_id)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_header() {
            Some(auth) => req.header(reqwest::header::AUTHORIZATION, auth),
            None => req,
        }
    }

    async fn error_from(response: reqwest::Response) -> ClientError {
        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return ClientError::Http(e),
        };
        let message = match serde_json::from_str::<ApiErrorResponse>(&text) {
            Ok(api_err) => match api_err.request_id {
                Some(request_id) => format!("{} (request {})", api_err.message, request_id),
                None => api_err.message,
            },
            Err(_) => text,
        };
        classify_status(status, message)
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ClientError::InvalidResponse(format!("{e}: {}", truncate(&text, 200)))
        })
    }
}

/// Map a non-success status to the client error taxonomy
pub(crate) fn classify_status(status: StatusCode, message: String) -> ClientError {
    match status {
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized(message),
        StatusCode::FORBIDDEN => ClientError::Forbidden(message),
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        s if s.is_client_error() => ClientError::Rejected {
            status: s.as_u16(),
            message,
        },
        _ => ClientError::Internal(message),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl RemoteClient for HttpDeploymentClient {
    #[instrument(skip(self, request), fields(name = %request.name))]
    async fn create_deployment(
        &self,
        organization_id: &str,
        request: &DeploymentCreateRequest,
    ) -> ClientResult<RemoteDeployment> {
        let url = self.deployments_url(organization_id);
        debug!(%url, "POST deployment");
        let response = self
            .authorize(self.client.post(&url).json(request))
            .send()
            .await?;
        Self::handle_response(response).await
    }

    #[instrument(skip(self))]
    async fn get_deployment(
        &self,
        organization_id: &str,
        deployment_id: &str,
    ) -> ClientResult<RemoteDeployment> {
        let url = self.deployment_url(organization_id, deployment_id);
        let response = self.authorize(self.client.get(&url)).send().await?;
        Self::handle_response(response).await
    }

    #[instrument(skip(self, request))]
    async fn update_deployment(
        &self,
        organization_id: &str,
        deployment_id: &str,
        request: &DeploymentUpdateRequest,
    ) -> ClientResult<RemoteDeployment> {
        let url = self.deployment_url(organization_id, deployment_id);
        debug!(%url, "POST deployment update");
        let response = self
            .authorize(self.client.post(&url).json(request))
            .send()
            .await?;
        Self::handle_response(response).await
    }

    #[instrument(skip(self))]
    async fn delete_deployment(
        &self,
        organization_id: &str,
        deployment_id: &str,
    ) -> ClientResult<()> {
        let url = self.deployment_url(organization_id, deployment_id);
        let response = self.authorize(self.client.delete(&url)).send().await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        Ok(())
    }
}
