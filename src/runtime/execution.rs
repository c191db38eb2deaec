use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::planner::ExecutionPlan;
use crate::tools::builtin::QualityReport;
use crate::tools::{CapabilityKind, ToolRequest, ToolResult};

static WORKFLOW_SEQ: AtomicU64 = AtomicU64::new(0);

/// Process-unique workflow id: `wf-{secs}-{nanos}-{seq}`.
pub fn workflow_id() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let seq = WORKFLOW_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("wf-{}-{}-{}", now.as_secs(), now.subsec_nanos(), seq)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
}

/// State of one orchestration. Owned by a single call, never shared.
#[derive(Clone, Debug, Serialize)]
pub struct WorkflowExecution {
    pub id: String,
    pub request: ToolRequest,
    pub plan: ExecutionPlan,
    pub results: BTreeMap<String, ToolResult>,
    pub overall_confidence: f64,
    pub status: WorkflowStatus,
}

impl WorkflowExecution {
    pub fn new(id: impl Into<String>, request: ToolRequest, plan: ExecutionPlan) -> Self {
        Self {
            id: id.into(),
            request,
            plan,
            results: BTreeMap::new(),
            overall_confidence: 0.0,
            status: WorkflowStatus::Running,
        }
    }

    pub fn result(&self, tool_name: &str) -> Option<&ToolResult> {
        self.results.get(tool_name)
    }

    /// The planned tool's result for `kind`; at most one tool per kind runs.
    pub fn result_of_kind(&self, kind: &CapabilityKind) -> Option<&ToolResult> {
        self.plan
            .tools()
            .find(|tool| &tool.kind == kind)
            .and_then(|tool| self.results.get(&tool.name))
    }

    /// Typed payload of the successful result for `kind`.
    pub fn output<T: DeserializeOwned>(&self, kind: &CapabilityKind) -> Option<T> {
        self.result_of_kind(kind)
            .filter(|result| result.success)
            .and_then(|result| result.decode().ok())
    }

    /// Tools whose result succeeded, in plan order.
    pub fn tools_used(&self) -> Vec<String> {
        self.plan
            .tools()
            .filter(|tool| self.results.get(&tool.name).is_some_and(|r| r.success))
            .map(|tool| tool.name.clone())
            .collect()
    }
}

/// What a completed workflow hands back to the caller for persisting.
#[derive(Clone, Debug, Serialize)]
pub struct WorkflowOutcome {
    pub workflow_id: String,
    pub text: String,
    pub overall_confidence: f64,
    pub tools_used: Vec<String>,
    pub quality: QualityReport,
    pub execution: WorkflowExecution,
}
