use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SearchConfig;
use crate::error::Result;
use crate::search::{DynSearchClient, SearchHit};
use crate::tools::{
    CapabilityKind, CapabilityTool, ToolContext, ToolDescriptor, ToolError, ToolErrorKind,
    ToolRequest, ToolResult,
};

use super::text;

const FRESHNESS_WORDS: &[&str] = &[
    "current", "latest", "recent", "recently", "today", "now", "news", "weather", "price",
    "stock", "update", "this week", "this year",
];

const LOOKUP_PHRASES: &[&str] = &[
    "what is", "what are", "who is", "who was", "when did", "when was", "where is", "how many",
    "how much", "tell me about", "search", "look up", "find",
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
    pub relevance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchOutput {
    pub query: String,
    pub results: Vec<RankedHit>,
}

/// Phrases match as substrings, single words as whole tokens.
fn mentions(query: &str, phrase: &str) -> bool {
    if phrase.contains(' ') {
        query.contains(phrase)
    } else {
        text::contains_word(query, phrase)
    }
}

pub struct SearchTool {
    descriptor: ToolDescriptor,
    client: DynSearchClient,
    config: SearchConfig,
}

impl SearchTool {
    pub const NAME: &'static str = "web_search";

    pub fn new(client: DynSearchClient, config: SearchConfig) -> Self {
        Self::named(Self::NAME, client, config)
    }

    pub fn named(name: impl Into<String>, client: DynSearchClient, config: SearchConfig) -> Self {
        let descriptor = ToolDescriptor::builder(name, CapabilityKind::Search)
            .description("Queries the web-search backend and ranks snippets by query-term coverage")
            .build();
        Self {
            descriptor,
            client,
            config,
        }
    }

    fn rank(&self, query: &str, hits: Vec<SearchHit>) -> Vec<RankedHit> {
        let terms = text::keywords(query);
        let mut ranked: Vec<RankedHit> = hits
            .into_iter()
            .map(|hit| {
                let haystack = format!("{} {}", hit.title, hit.snippet);
                let relevance = if terms.is_empty() {
                    0.5
                } else {
                    text::term_coverage(&terms, &haystack)
                };
                RankedHit {
                    title: hit.title,
                    snippet: text::truncate_chars(&hit.snippet, self.config.max_snippet_chars),
                    url: hit.url,
                    relevance,
                }
            })
            .collect();
        // stable: backend rank breaks relevance ties
        ranked.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        ranked
    }

    fn confidence(&self, results: &[RankedHit]) -> f64 {
        if results.is_empty() {
            return 0.0;
        }
        let coverage = (results.len() as f64 / self.config.max_results.max(1) as f64).min(1.0);
        let relevance = results.iter().map(|r| r.relevance).sum::<f64>() / results.len() as f64;
        0.4 * coverage + 0.6 * relevance
    }
}

#[async_trait]
impl CapabilityTool for SearchTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn can_handle(&self, request: &ToolRequest) -> f64 {
        let query = request.query().trim().to_lowercase();
        if query.is_empty() || !request.capability_enabled(&CapabilityKind::Search) {
            return 0.0;
        }
        if FRESHNESS_WORDS.iter().any(|w| mentions(&query, w)) {
            0.95
        } else if LOOKUP_PHRASES.iter().any(|p| mentions(&query, p)) {
            0.7
        } else {
            0.4
        }
    }

    async fn execute(&self, request: &ToolRequest, ctx: &ToolContext) -> Result<ToolResult> {
        let started = Instant::now();
        if ctx.is_cancelled() {
            return Ok(ToolResult::failure(&self.descriptor, ToolError::cancelled()));
        }

        let call = self.client.search(request.query(), self.config.max_results);
        let outcome = tokio::select! {
            _ = ctx.cancellation().cancelled() => {
                return Ok(ToolResult::failure(&self.descriptor, ToolError::cancelled())
                    .with_latency(started.elapsed()));
            }
            outcome = tokio::time::timeout(self.config.timeout(), call) => outcome,
        };

        let result = match outcome {
            Err(_) => ToolResult::failure(&self.descriptor, ToolError::timeout()),
            Ok(Err(err)) => ToolResult::failure(
                &self.descriptor,
                ToolError::new(ToolErrorKind::Unavailable, err.to_string()),
            ),
            Ok(Ok(hits)) if hits.is_empty() => ToolResult::failure(
                &self.descriptor,
                ToolError::new(ToolErrorKind::EmptyResult, "no results"),
            ),
            Ok(Ok(hits)) => {
                let results = self.rank(request.query(), hits);
                let confidence = self.confidence(&results);
                debug!(
                    workflow_id = %ctx.workflow_id(),
                    hits = results.len(),
                    confidence,
                    "search finished"
                );
                let output = SearchOutput {
                    query: request.query().to_string(),
                    results,
                };
                ToolResult::success(&self.descriptor, confidence, serde_json::to_value(output)?)
            }
        };
        Ok(result.with_latency(started.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::search::StaticSearchClient;

    fn tool(client: StaticSearchClient) -> SearchTool {
        SearchTool::new(Arc::new(client), SearchConfig::default())
    }

    #[test]
    fn freshness_queries_score_highest() {
        let tool = tool(StaticSearchClient::new());
        let latest = ToolRequest::new("latest rust release");
        let lookup = ToolRequest::new("What is the capital of France?");
        let chat = ToolRequest::new("write me a poem");
        assert_eq!(tool.can_handle(&latest), 0.95);
        assert_eq!(tool.can_handle(&lookup), 0.7);
        assert_eq!(tool.can_handle(&chat), 0.4);
        assert_eq!(tool.can_handle(&ToolRequest::new("   ")), 0.0);
        assert_eq!(tool.can_handle(&lookup), tool.can_handle(&lookup));
    }

    #[tokio::test]
    async fn ranks_by_query_terms() -> Result<()> {
        let client = StaticSearchClient::new()
            .with_hit(SearchHit::new("Weather", "Sunny today.", "https://w"))
            .with_hit(SearchHit::new("France", "Paris is the capital of France.", "https://f"));
        let tool = tool(client);
        let request = ToolRequest::new("What is the capital of France?");

        let result = tool.execute(&request, &ToolContext::default()).await?;
        assert!(result.success);
        let output: SearchOutput = result.decode()?;
        assert_eq!(output.results[0].url, "https://f");
        assert_eq!(output.results[0].relevance, 1.0);
        assert!(result.confidence > 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn empty_results_are_a_failure() -> Result<()> {
        let tool = tool(StaticSearchClient::new());
        let result = tool
            .execute(&ToolRequest::new("anything"), &ToolContext::default())
            .await?;
        assert!(!result.success);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.error.unwrap().kind, ToolErrorKind::EmptyResult);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_times_out() -> Result<()> {
        let client = StaticSearchClient::new()
            .with_hit(SearchHit::new("t", "s", "u"))
            .with_delay(Duration::from_secs(30));
        let tool = tool(client);
        let result = tool
            .execute(&ToolRequest::new("anything"), &ToolContext::default())
            .await?;
        assert!(!result.success);
        assert_eq!(result.error.unwrap().message, "timeout");
        Ok(())
    }
}
