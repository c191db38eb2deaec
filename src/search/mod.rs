//! Web-search capability consumed by the search tool.

#[cfg(feature = "http-client")]
mod http;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolFlowError};

#[cfg(feature = "http-client")]
pub use http::HttpSearchClient;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

impl SearchHit {
    pub fn new(
        title: impl Into<String>,
        snippet: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            snippet: snippet.into(),
            url: url.into(),
        }
    }
}

/// Returns hits in the backend's rank order. Errors are transport failures;
/// an empty list means nothing matched.
#[async_trait]
pub trait WebSearchClient: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

pub type DynSearchClient = Arc<dyn WebSearchClient>;

/// In-process search backend with canned hits. Topic hits are returned when
/// their keyword appears in the query; general hits are returned for every
/// query.
#[derive(Default)]
pub struct StaticSearchClient {
    topics: Vec<(String, SearchHit)>,
    general: Vec<SearchHit>,
    delay: Option<Duration>,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl StaticSearchClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hit(mut self, hit: SearchHit) -> Self {
        self.general.push(hit);
        self
    }

    pub fn with_topic(mut self, keyword: impl Into<String>, hit: SearchHit) -> Self {
        self.topics.push((keyword.into().to_lowercase(), hit));
        self
    }

    /// Every call sleeps before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every call fails with a transport error.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearchClient for StaticSearchClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(ToolFlowError::Search(message.clone()));
        }

        let query = query.to_lowercase();
        let hits = self
            .topics
            .iter()
            .filter(|(keyword, _)| query.contains(keyword.as_str()))
            .map(|(_, hit)| hit.clone())
            .chain(self.general.iter().cloned())
            .take(max_results)
            .collect();
        Ok(hits)
    }
}
