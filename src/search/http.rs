use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;

use crate::error::{Result, ToolFlowError};

use super::{SearchHit, WebSearchClient};

/// JSON search backend reached over HTTP `GET {endpoint}?q=...&count=...`.
///
/// Accepts a bare array or `{"results": [...]}`, with the snippet under
/// `snippet`, `body` or `description` and the link under `url`, `href` or `link`.
#[derive(Clone)]
pub struct HttpSearchClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpSearchClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        }
    }

    fn parse_hits(payload: &Value) -> Vec<SearchHit> {
        let items = payload
            .as_array()
            .or_else(|| payload["results"].as_array())
            .cloned()
            .unwrap_or_default();

        let field = |item: &Value, names: &[&str]| {
            names
                .iter()
                .find_map(|name| item[*name].as_str())
                .unwrap_or_default()
                .to_string()
        };

        items
            .iter()
            .map(|item| SearchHit {
                title: field(item, &["title", "name"]),
                snippet: field(item, &["snippet", "body", "description"]),
                url: field(item, &["url", "href", "link"]),
            })
            .filter(|hit| !hit.snippet.is_empty() || !hit.title.is_empty())
            .collect()
    }
}

#[async_trait]
impl WebSearchClient for HttpSearchClient {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let count = max_results.to_string();
        let mut request = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("count", count.as_str())]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ToolFlowError::Search(format!("request error: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolFlowError::Search(format!(
                "search backend returned status {status}"
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ToolFlowError::Search(format!("invalid response body: {e}")))?;
        let mut hits = Self::parse_hits(&payload);
        hits.truncate(max_results);
        Ok(hits)
    }
}
