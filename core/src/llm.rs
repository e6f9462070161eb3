//! OpenAI chat completions client.
//!
//! Two calls are exposed: a structured completion constrained by a JSON
//! schema derived from the target type, and a streamed completion that
//! yields text deltas as they arrive over server-sent events.

use eventsource_stream::Eventsource;
use futures::StreamExt;
use futures::stream::BoxStream;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::GenerationError;

/// Default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.8;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const DONE_MARKER: &str = "[DONE]";

/// Stream of text deltas from a streamed completion.
pub type TextStream = BoxStream<'static, Result<String, GenerationError>>;

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Client for the chat completions endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
    model: String,
    temperature: f32,
}

impl ChatClient {
    /// Create a client reading `OPENAI_API_KEY` from the environment.
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sampling temperature, clamped to `0.0..=1.0`.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    /// Complete `messages`, constraining the answer to the JSON schema of `T`.
    ///
    /// A refusal from the model is reported as [`GenerationError::Refusal`].
    pub async fn complete_structured<T>(
        &self,
        schema_name: &str,
        messages: &[ChatMessage],
    ) -> Result<T, GenerationError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let mut schema = serde_json::to_value(schemars::schema_for!(T))?;
        if let Some(object) = schema.as_object_mut() {
            object.remove("$schema");
            object.insert("additionalProperties".to_string(), serde_json::json!(false));
        }

        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": schema_name,
                    "strict": true,
                    "schema": schema
                }
            }
        });

        debug!("Requesting structured completion with model: {}", self.model);
        let response = self.post(&body).await?;
        let completion: CompletionResponse = response.json().await?;

        let message = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::InvalidResponse("no choices in response".to_string()))?
            .message;

        if let Some(refusal) = message.refusal {
            return Err(GenerationError::Refusal(refusal));
        }
        let content = message
            .content
            .ok_or_else(|| GenerationError::InvalidResponse("empty message content".to_string()))?;

        info!("Received structured completion ({} bytes)", content.len());
        serde_json::from_str(&content).map_err(|e| GenerationError::Parse(e.to_string()))
    }

    /// Stream the completion of `messages` as text deltas.
    ///
    /// The stream ends when the provider sends its completion marker or
    /// closes the connection.
    pub async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "stream": true
        });

        debug!("Requesting streamed completion with model: {}", self.model);
        let response = self.post(&body).await?;

        let deltas = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| {
                let done = matches!(event, Ok(event) if event.data.trim() == DONE_MARKER);
                futures::future::ready(!done)
            })
            .filter_map(|event| async move {
                match event {
                    Ok(event) => parse_delta(&event.data).transpose(),
                    Err(e) => Some(Err(GenerationError::Stream(e.to_string()))),
                }
            });

        Ok(deltas.boxed())
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response, GenerationError> {
        let api_key = self.api_key.as_ref().ok_or(GenerationError::NotConfigured)?;

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::ApiRequest(format!(
                "API error ({status}): {error_text}"
            )));
        }
        Ok(response)
    }
}

impl Default for ChatClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the text delta of one streamed chunk, if it carries any.
fn parse_delta(data: &str) -> Result<Option<String>, GenerationError> {
    let chunk: StreamChunkBody = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunkBody {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
