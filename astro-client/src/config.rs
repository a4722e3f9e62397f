//! Client configuration

/// Public Astro platform API
pub const DEFAULT_BASE_URL: &str = "https://api.astronomer.io/platform/v1beta1";

/// Client configuration for connecting to the control plane
///
/// # Environment variables
///
/// | Variable | Default |
/// |----------|---------|
/// | ASTRO_API_URL | https://api.astronomer.io/platform/v1beta1 |
/// | ASTRO_API_TOKEN | (none) |
/// | ASTRO_REQUEST_TIMEOUT_SECS | 30 |
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL
    pub base_url: String,

    /// Bearer token for authentication
    pub token: Option<String>,

    /// Request timeout in seconds
    pub timeout: u64,
}

impl ClientConfig {
    /// Create a new client configuration
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: 30,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("ASTRO_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into()),
            token: std::env::var("ASTRO_API_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            timeout: std::env::var("ASTRO_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }

    /// Set the bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Create an HTTP client from this configuration
    pub fn build_http_client(&self) -> crate::ClientResult<crate::HttpDeploymentClient> {
        crate::HttpDeploymentClient::new(self)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}
