//! Embedding providers.
//!
//! The OpenAI embeddings API is the only remote provider; tests and
//! callers can plug in anything else through [`EmbeddingProvider`].

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// Default OpenAI embedding model.
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";

/// Seconds to wait when a 429 carries no usable `retry-after` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Text to embed, optionally overriding the provider's model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub text: String,

    /// Falls back to [`EmbeddingProvider::default_model`] when unset.
    pub model: Option<String>,

    /// Shortened output size, for models that support it.
    pub dimensions: Option<usize>,
}

impl EmbeddingRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            dimensions: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

/// An embedding together with what produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub embedding: Embedding,

    /// Model the provider actually used.
    pub model: String,

    pub dimension: usize,

    /// Billed tokens, when the provider reports them.
    pub tokens_used: Option<u64>,
}

/// Turns text into vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Model used when a request does not name one.
    fn default_model(&self) -> &str;

    fn default_dimension(&self) -> usize;

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse>;

    /// Whether credentials are present. Says nothing about reachability.
    fn is_available(&self) -> bool;
}

#[async_trait]
impl<P> EmbeddingProvider for std::sync::Arc<P>
where
    P: EmbeddingProvider + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn default_model(&self) -> &str {
        (**self).default_model()
    }

    fn default_dimension(&self) -> usize {
        (**self).default_dimension()
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        (**self).embed(request).await
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}

/// Client for the OpenAI `/embeddings` endpoint.
pub struct OpenAIProvider {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
    model: String,
}

impl OpenAIProvider {
    /// Provider for the public API, keyed from `OPENAI_API_KEY` if set.
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Point at another OpenAI-compatible server.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn default_dimension(&self) -> usize {
        if self.model == "text-embedding-3-large" {
            3072
        } else {
            1536
        }
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(EmbeddingError::ProviderNotConfigured);
        };
        let body = EmbeddingsBody {
            input: &request.text,
            model: request.model.as_deref().unwrap_or(&self.model),
            dimensions: request.dimensions,
        };
        debug!("Embedding {} chars with {}", request.text.len(), body.model);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;
        let payload: EmbeddingsPayload = ensure_success(response).await?.json().await?;

        let Some(first) = payload.data.into_iter().next() else {
            return Err(EmbeddingError::InvalidResponse(
                "response carried no embedding".to_string(),
            ));
        };
        let dimension = first.embedding.len();
        info!("Embedded text into {dimension} dimensions with {}", payload.model);

        Ok(EmbeddingResponse {
            embedding: first.embedding,
            model: payload.model,
            dimension,
            tokens_used: payload.usage.map(|usage| usage.total_tokens),
        })
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Map rate limiting and other non-2xx answers to errors.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        warn!("Embedding provider rate limited us for {retry_after_secs}s");
        return Err(EmbeddingError::RateLimited { retry_after_secs });
    }
    let detail = response.text().await.unwrap_or_default();
    Err(EmbeddingError::ApiRequest(format!("{status}: {detail}")))
}

#[derive(Serialize)]
struct EmbeddingsBody<'a> {
    input: &'a str,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingsPayload {
    data: Vec<EmbeddingItem>,
    model: String,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Embedding,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> OpenAIProvider {
        OpenAIProvider::new()
            .with_api_key("test-key")
            .with_base_url(format!("{}/", server.uri()))
    }

    #[test]
    fn test_large_model_reports_its_dimension() {
        let provider = OpenAIProvider::new().with_model("text-embedding-3-large");
        assert_eq!(provider.default_dimension(), 3072);
        assert_eq!(OpenAIProvider::new().default_dimension(), 1536);
    }

    #[tokio::test]
    async fn test_embed_sends_request_and_reads_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_json(serde_json::json!({
                "input": "What is a window function?",
                "model": "text-embedding-3-small",
                "dimensions": 3
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "object": "list",
                "data": [{"object": "embedding", "index": 0, "embedding": [0.1, 0.2, 0.3]}],
                "model": "text-embedding-3-small",
                "usage": {"prompt_tokens": 6, "total_tokens": 6}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = provider(&server)
            .embed(EmbeddingRequest::new("What is a window function?").with_dimensions(3))
            .await
            .unwrap();

        assert_eq!(response.embedding, vec![0.1, 0.2, 0.3]);
        assert_eq!(response.dimension, 3);
        assert_eq!(response.tokens_used, Some(6));
    }

    #[tokio::test]
    async fn test_request_model_overrides_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(serde_json::json!({
                "input": "joins",
                "model": "text-embedding-3-large"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [1.0]}],
                "model": "text-embedding-3-large"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = provider(&server)
            .embed(EmbeddingRequest::new("joins").with_model("text-embedding-3-large"))
            .await
            .unwrap();
        assert_eq!(response.model, "text-embedding-3-large");
        assert_eq!(response.tokens_used, None);
    }

    #[tokio::test]
    async fn test_rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .embed(EmbeddingRequest::new("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::RateLimited { retry_after_secs: 7 }));
    }

    #[tokio::test]
    async fn test_server_error_and_empty_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(serde_json::json!({"input": "boom", "model": DEFAULT_OPENAI_MODEL})))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_json(serde_json::json!({"input": "empty", "model": DEFAULT_OPENAI_MODEL})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [],
                "model": DEFAULT_OPENAI_MODEL
            })))
            .mount(&server)
            .await;

        let provider = provider(&server);
        let err = provider.embed(EmbeddingRequest::new("boom")).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::ApiRequest(ref detail) if detail.contains("upstream down")));

        let err = provider.embed(EmbeddingRequest::new("empty")).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_request() {
        let provider = OpenAIProvider {
            api_key: None,
            base_url: "http://127.0.0.1:9".to_string(),
            client: reqwest::Client::new(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
        };
        assert!(!provider.is_available());
        let err = provider
            .embed(EmbeddingRequest::new("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::ProviderNotConfigured));
    }
}
