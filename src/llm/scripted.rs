use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;

use super::client::{DynLlmClient, LlmClient, LlmStream};
use super::types::{segment, LlmRequest, LlmResponse, LlmStreamChunk};
use crate::error::{Result, ToolFlowError};

#[derive(Default)]
struct ScriptState {
    attempts: AtomicU32,
    produced: AtomicUsize,
    requests: Mutex<Vec<LlmRequest>>,
}

/// Deterministic language model: streams a fixed token script, optionally
/// slowly, optionally failing the first attempts or mid-stream. Clones share
/// their counters.
#[derive(Clone, Default)]
pub struct ScriptedLlmClient {
    tokens: Arc<Vec<String>>,
    token_delay: Duration,
    first_token_delay: Duration,
    failing_attempts: u32,
    fail_after: Option<usize>,
    state: Arc<ScriptState>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: Arc::new(tokens.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Script made of the word segments of `text`.
    pub fn from_text(text: &str) -> Self {
        Self::new(segment(text))
    }

    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    pub fn with_first_token_delay(mut self, delay: Duration) -> Self {
        self.first_token_delay = delay;
        self
    }

    /// The first `attempts` calls fail before producing anything.
    pub fn failing_first(mut self, attempts: u32) -> Self {
        self.failing_attempts = attempts;
        self
    }

    /// Every call fails before producing anything.
    pub fn always_failing(self) -> Self {
        self.failing_first(u32::MAX)
    }

    /// Streams fail after yielding `tokens` tokens.
    pub fn failing_after(mut self, tokens: usize) -> Self {
        self.fail_after = Some(tokens);
        self
    }

    pub fn attempts(&self) -> u32 {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Tokens handed out so far, across all attempts.
    pub fn produced(&self) -> usize {
        self.state.produced.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.state.requests.lock().clone()
    }

    fn begin_attempt(&self, request: LlmRequest) -> Result<()> {
        let attempt = self.state.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.requests.lock().push(request);
        if attempt <= self.failing_attempts {
            return Err(ToolFlowError::Llm(format!(
                "scripted failure on attempt {attempt}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        self.begin_attempt(request)?;
        if let Some(limit) = self.fail_after {
            self.state.produced.fetch_add(limit.min(self.tokens.len()), Ordering::SeqCst);
            return Err(ToolFlowError::Llm("scripted failure mid-response".to_string()));
        }
        self.state
            .produced
            .fetch_add(self.tokens.len(), Ordering::SeqCst);
        Ok(LlmResponse {
            content: self.tokens.concat(),
            metadata: None,
        })
    }

    fn complete_stream(&self, request: LlmRequest) -> LlmStream {
        if let Err(err) = self.begin_attempt(request) {
            return Box::pin(stream::iter(std::iter::once(Err(err))));
        }

        let script = self.clone();
        Box::pin(stream::unfold(Some(0usize), move |cursor| {
            let script = script.clone();
            async move {
                let idx = cursor?;
                if script.fail_after == Some(idx) {
                    let err = ToolFlowError::Llm(format!("scripted failure after {idx} tokens"));
                    return Some((Err(err), None));
                }
                if idx == script.tokens.len() {
                    return Some((Ok(LlmStreamChunk::done()), None));
                }
                if idx == 0 && !script.first_token_delay.is_zero() {
                    tokio::time::sleep(script.first_token_delay).await;
                }
                if !script.token_delay.is_zero() {
                    tokio::time::sleep(script.token_delay).await;
                }
                script.state.produced.fetch_add(1, Ordering::SeqCst);
                let chunk = LlmStreamChunk::delta(script.tokens[idx].clone());
                Some((Ok(chunk), Some(idx + 1)))
            }
        }))
    }

    fn clone_dyn(&self) -> DynLlmClient {
        Arc::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    async fn drain(mut stream: LlmStream) -> (String, Option<ToolFlowError>) {
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) if chunk.done => break,
                Ok(chunk) => text.push_str(&chunk.content),
                Err(err) => return (text, Some(err)),
            }
        }
        (text, None)
    }

    #[tokio::test]
    async fn streams_script_in_order() {
        let client = ScriptedLlmClient::new(["Par", "is"]);
        let (text, err) = drain(client.complete_stream(LlmRequest::new("q"))).await;
        assert_eq!(text, "Paris");
        assert!(err.is_none());
        assert_eq!(client.produced(), 2);
        assert_eq!(client.attempts(), 1);
        assert_eq!(client.requests()[0].user, "q");
    }

    #[tokio::test]
    async fn first_attempts_fail_then_succeed() {
        let client = ScriptedLlmClient::from_text("hello world").failing_first(2);
        for _ in 0..2 {
            let (text, err) = drain(client.complete_stream(LlmRequest::new("q"))).await;
            assert!(text.is_empty());
            assert!(err.is_some());
        }
        let (text, err) = drain(client.complete_stream(LlmRequest::new("q"))).await;
        assert_eq!(text, "hello world");
        assert!(err.is_none());
        assert_eq!(client.attempts(), 3);
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_prefix() {
        let client = ScriptedLlmClient::new(["a", "b", "c"]).failing_after(2);
        let (text, err) = drain(client.complete_stream(LlmRequest::new("q"))).await;
        assert_eq!(text, "ab");
        assert!(err.is_some());
    }
}
