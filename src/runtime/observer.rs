use async_trait::async_trait;

use crate::error::Result;
use crate::planner::PlannedTool;
use crate::tools::ToolResult;

/// Receives orchestration progress as it happens. An `Err` from any hook
/// means the consumer is gone and the workflow should stop.
#[async_trait]
pub trait WorkflowObserver: Send + Sync {
    async fn tool_started(&self, _tool: &PlannedTool) -> Result<()> {
        Ok(())
    }

    async fn tool_finished(&self, _tool: &PlannedTool, _result: &ToolResult) -> Result<()> {
        Ok(())
    }

    /// One generated token or segment, in production order.
    async fn content(&self, _text: &str) -> Result<()> {
        Ok(())
    }
}

pub struct NoopObserver;

#[async_trait]
impl WorkflowObserver for NoopObserver {}
