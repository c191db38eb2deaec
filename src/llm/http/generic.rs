use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use serde_json::{json, Value};
use tracing::instrument;

use crate::config::{EnvConfig, LlmSettings};
use crate::error::{Result, ToolFlowError};
use crate::llm::client::{DynLlmClient, LlmClient, LlmStream};
use crate::llm::types::{LlmRequest, LlmResponse};

use super::stream::SseParser;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
const API_KEY_ENV: &str = "TOOLFLOW_LLM_API_KEY";

/// Client for OpenAI-compatible chat completion endpoints.
#[derive(Clone)]
pub struct GenericHttpClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl GenericHttpClient {
    /// Pooled client. Only the connect phase is bounded here; the
    /// orchestrator owns the overall time budget of a streamed response.
    fn create_client() -> reqwest::Client {
        reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    }

    pub fn new<S1, S2, S3>(endpoint: S1, api_key: S2, model: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self {
            client: Self::create_client(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// `api_key` may reference a variable as `${ENV_VAR}`.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        let api_key = EnvConfig::get_api_key(settings.api_key.as_deref().unwrap_or(""), API_KEY_ENV)?;
        let endpoint = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        Ok(Self::new(endpoint, api_key, settings.model.clone()))
    }

    fn url(&self) -> String {
        if self.endpoint.ends_with("/chat/completions") {
            self.endpoint.clone()
        } else {
            format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
        }
    }

    fn body(&self, request: &LlmRequest, stream: bool) -> Value {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        for message in &request.history {
            messages.push(json!({ "role": message.role, "content": message.content }));
        }
        messages.push(json!({ "role": "user", "content": request.user }));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
            "stream": stream,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }

    async fn send(&self, request: &LlmRequest, stream: bool) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.url())
            .bearer_auth(&self.api_key)
            .json(&self.body(request, stream))
            .send()
            .await
            .map_err(|e| ToolFlowError::Llm(format!("HTTP request error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let preview: String = text.chars().take(500).collect();
            return Err(ToolFlowError::Llm(format!(
                "request failed with status {status}: {preview}"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmClient for GenericHttpClient {
    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let response = self.send(&request, false).await?;
        let payload: Value = response
            .json()
            .await
            .map_err(|e| ToolFlowError::Llm(format!("response parse error: {e}")))?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ToolFlowError::Llm("missing message content".to_string()))?
            .to_string();
        Ok(LlmResponse {
            content,
            metadata: Some(payload),
        })
    }

    /// Server-sent event stream, one chunk per delta.
    fn complete_stream(&self, request: LlmRequest) -> LlmStream {
        let client = self.clone();
        let opened = async move { client.send(&request, true).await };

        Box::pin(stream::once(opened).flat_map(|opened| match opened {
            Err(err) => stream::iter(vec![Err(err)]).boxed(),
            Ok(response) => {
                let mut parser = SseParser::new();
                response
                    .bytes_stream()
                    .map(move |bytes| match bytes {
                        Ok(bytes) => parser.parse_chunk(&bytes),
                        Err(e) => Err(ToolFlowError::Llm(format!("stream read error: {e}"))),
                    })
                    .flat_map(|parsed| {
                        let items: Vec<Result<_>> = match parsed {
                            Ok(chunks) => chunks.into_iter().map(Ok).collect(),
                            Err(err) => vec![Err(err)],
                        };
                        stream::iter(items)
                    })
                    .boxed()
            }
        }))
    }

    fn clone_dyn(&self) -> DynLlmClient {
        Arc::new(self.clone())
    }
}
