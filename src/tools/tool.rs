use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::Result;
use crate::state::{ConversationStore, ConversationTurn};

use super::descriptor::{CapabilityKind, ToolDescriptor};

/// The user's query plus everything a tool may consult. Immutable once built.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolRequest {
    query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    context: Vec<ConversationTurn>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    hints: BTreeMap<String, Value>,
}

impl ToolRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            context: Vec::new(),
            hints: BTreeMap::new(),
        }
    }

    pub fn builder(query: impl Into<String>) -> ToolRequestBuilder {
        ToolRequestBuilder {
            request: Self::new(query),
        }
    }

    /// Builds a request whose context is the most recent stored turns.
    pub async fn from_store(
        store: &dyn ConversationStore,
        conversation_id: &str,
        query: impl Into<String>,
        limit: usize,
    ) -> Result<Self> {
        let turns = store.recent_turns(conversation_id, limit).await?;
        Ok(Self::builder(query).context(turns).build())
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn context(&self) -> &[ConversationTurn] {
        &self.context
    }

    pub fn hints(&self) -> &BTreeMap<String, Value> {
        &self.hints
    }

    pub fn hint(&self, key: &str) -> Option<&Value> {
        self.hints.get(key)
    }

    /// A hint `"<kind>": false` switches a capability off for this request.
    pub fn capability_enabled(&self, kind: &CapabilityKind) -> bool {
        !matches!(self.hints.get(&kind.to_string()), Some(Value::Bool(false)))
    }
}

#[derive(Clone, Debug)]
pub struct ToolRequestBuilder {
    request: ToolRequest,
}

impl ToolRequestBuilder {
    pub fn context(mut self, turns: Vec<ConversationTurn>) -> Self {
        self.request.context = turns;
        self
    }

    pub fn turn(mut self, turn: ConversationTurn) -> Self {
        self.request.context.push(turn);
        self
    }

    pub fn hint(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.request.hints.insert(key.into(), value.into());
        self
    }

    pub fn disable(self, kind: &CapabilityKind) -> Self {
        let key = kind.to_string();
        self.hint(key, false)
    }

    pub fn build(self) -> ToolRequest {
        self.request
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    Timeout,
    Unavailable,
    EmptyResult,
    MissingInput,
    Cancelled,
}

impl ToolErrorKind {
    pub fn is_transient(self) -> bool {
        matches!(self, ToolErrorKind::Timeout | ToolErrorKind::Unavailable)
    }
}

/// Recoverable failure recorded inside a `ToolResult`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::new(ToolErrorKind::Timeout, "timeout")
    }

    pub fn cancelled() -> Self {
        Self::new(ToolErrorKind::Cancelled, "cancelled")
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub tool_name: String,
    pub kind: CapabilityKind,
    pub success: bool,
    pub confidence: f64,
    #[serde(default)]
    pub payload: Value,
    pub latency: Duration,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolResult {
    pub fn success(descriptor: &ToolDescriptor, confidence: f64, payload: Value) -> Self {
        Self {
            tool_name: descriptor.name.clone(),
            kind: descriptor.kind.clone(),
            success: true,
            confidence: confidence.clamp(0.0, 1.0),
            payload,
            latency: Duration::ZERO,
            attempts: 1,
            error: None,
        }
    }

    pub fn failure(descriptor: &ToolDescriptor, error: ToolError) -> Self {
        Self {
            tool_name: descriptor.name.clone(),
            kind: descriptor.kind.clone(),
            success: false,
            confidence: 0.0,
            payload: Value::Null,
            latency: Duration::ZERO,
            attempts: 1,
            error: Some(error),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Decodes the payload into the tool's typed output.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    pub fn is_transient_failure(&self) -> bool {
        self.error.as_ref().is_some_and(|e| e.kind.is_transient())
    }
}

/// Per-invocation view of the workflow: upstream results, inputs known to be
/// missing and the cancellation flag.
#[derive(Clone, Debug, Default)]
pub struct ToolContext {
    workflow_id: String,
    upstream: BTreeMap<CapabilityKind, ToolResult>,
    missing: BTreeSet<CapabilityKind>,
    cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(workflow_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            upstream: BTreeMap::new(),
            missing: BTreeSet::new(),
            cancel,
        }
    }

    pub fn with_upstream(mut self, result: ToolResult) -> Self {
        self.upstream.insert(result.kind.clone(), result);
        self
    }

    pub fn with_missing(mut self, kind: CapabilityKind) -> Self {
        self.missing.insert(kind);
        self
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Successful upstream output of the given kind.
    pub fn input(&self, kind: &CapabilityKind) -> Option<&ToolResult> {
        self.upstream.get(kind).filter(|result| result.success)
    }

    /// Successful upstream output decoded as `T`. A payload of another shape
    /// counts as missing input.
    pub fn typed_input<T: DeserializeOwned>(&self, kind: &CapabilityKind) -> Option<T> {
        let result = self.input(kind)?;
        match result.decode() {
            Ok(output) => Some(output),
            Err(err) => {
                warn!(
                    workflow_id = %self.workflow_id,
                    tool = %result.tool_name,
                    error = %err,
                    "upstream payload not understood; treating input as missing"
                );
                None
            }
        }
    }

    pub fn upstream(&self) -> impl Iterator<Item = &ToolResult> {
        self.upstream.values()
    }

    pub fn is_missing(&self, kind: &CapabilityKind) -> bool {
        self.missing.contains(kind)
    }

    pub fn missing(&self) -> &BTreeSet<CapabilityKind> {
        &self.missing
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[async_trait]
pub trait CapabilityTool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    fn kind(&self) -> &CapabilityKind {
        &self.descriptor().kind
    }

    /// Confidence in [0, 1] that this tool is useful for the request. Must be
    /// pure and cheap.
    fn can_handle(&self, request: &ToolRequest) -> f64;

    /// Recoverable failures come back as `Ok` with `success == false`; `Err`
    /// is reserved for faults that should abort the workflow.
    async fn execute(&self, request: &ToolRequest, ctx: &ToolContext) -> Result<ToolResult>;
}

pub type DynTool = Arc<dyn CapabilityTool>;
