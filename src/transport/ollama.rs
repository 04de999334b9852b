use super::retry::RetryPolicy;
use super::types::{GenerateRequest, TagsResponse};
use super::Transport;
use crate::core::error::ChatError;
use crate::stream::{StreamHandle, lines};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Method, RequestBuilder, Response};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub user_agent: String,
    pub list_timeout: Duration,
    pub generate_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            list_timeout: Duration::from_secs(10),
            generate_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Client for an Ollama-compatible server (`/api/tags`, `/api/generate`).
#[derive(Clone)]
pub struct OllamaClient {
    endpoint: String,
    client: Client,
    headers: HashMap<String, String>,
    settings: TransportSettings,
}

impl OllamaClient {
    pub fn new(endpoint: impl Into<String>, settings: TransportSettings) -> Result<Self, ChatError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ChatError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        // Lets requests through ngrok tunnels without the interstitial page.
        headers.insert("ngrok-skip-browser-warning".to_string(), "true".to_string());
        headers.insert("User-Agent".to_string(), settings.user_agent.clone());

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
            headers,
            settings,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.endpoint, path);
        let mut request = self.client.request(method, &url);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        request
    }

    async fn fetch_tags(&self) -> Result<Vec<String>, ChatError> {
        let response = self
            .request(Method::GET, "api/tags")
            .timeout(self.settings.list_timeout)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let body = response.text().await?;
        let tags: TagsResponse = serde_json::from_str(&body)
            .map_err(|e| ChatError::Parse(format!("invalid model list: {}", e)))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

async fn ensure_success(response: Response) -> Result<Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ChatError::Http {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl Transport for OllamaClient {
    async fn list_models(&self) -> Result<Vec<String>, ChatError> {
        let models = self
            .settings
            .retry
            .run("model listing", |attempt| {
                debug!(attempt, endpoint = %self.endpoint, "requesting model list");
                self.fetch_tags()
            })
            .await?;
        info!("server offers {} model(s)", models.len());
        Ok(models)
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<StreamHandle, ChatError> {
        let timeout = self.settings.generate_timeout;
        debug!(model = %request.model, context_len = request.context.len(), "starting generation");

        let send = self.request(Method::POST, "api/generate").json(request).send();
        let response = tokio::time::timeout(timeout, send).await.map_err(|_| {
            ChatError::Timeout(format!(
                "no response from {} within {}s",
                self.endpoint,
                timeout.as_secs()
            ))
        })??;
        let response = ensure_success(response).await?;

        let chunks = response.bytes_stream().map(|chunk| chunk.map_err(ChatError::from));
        Ok(StreamHandle::from_chunks(lines::with_idle_timeout(chunks, timeout)))
    }
}
