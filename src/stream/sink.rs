use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::StreamingConfig;
use crate::error::{Result, ToolFlowError};
use crate::planner::PlannedTool;
use crate::runtime::WorkflowObserver;
use crate::tools::{ToolErrorKind, ToolResult};

use super::batcher::ChunkBatcher;
use super::wire::{StreamEvent, ToolPhase};

/// Observer that turns workflow progress into wire events. A failed send
/// means the client went away: the workflow token is cancelled and the
/// error stops the orchestrator.
pub(crate) struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
    batcher: Mutex<ChunkBatcher>,
    progress_for_all_tools: bool,
    cancel: CancellationToken,
}

impl EventSink {
    pub(crate) fn new(
        tx: mpsc::Sender<StreamEvent>,
        config: &StreamingConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tx,
            batcher: Mutex::new(ChunkBatcher::new(config.min_chunk_chars)),
            progress_for_all_tools: config.progress_for_all_tools,
            cancel,
        }
    }

    /// Nothing is emitted once the workflow is cancelled.
    pub(crate) async fn send(&self, event: StreamEvent) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ToolFlowError::Cancelled);
        }
        self.tx.send(event).await.map_err(|_| {
            self.cancel.cancel();
            ToolFlowError::Cancelled
        })
    }

    /// Emits whatever content the batcher still holds.
    pub(crate) async fn flush(&self) -> Result<()> {
        let pending = self.batcher.lock().flush();
        match pending {
            Some(text) => self.send(StreamEvent::Content { text }).await,
            None => Ok(()),
        }
    }

    fn reports(&self, tool: &PlannedTool) -> bool {
        self.progress_for_all_tools || tool.kind.is_search()
    }
}

#[async_trait]
impl WorkflowObserver for EventSink {
    async fn tool_started(&self, tool: &PlannedTool) -> Result<()> {
        if !self.reports(tool) {
            return Ok(());
        }
        self.send(StreamEvent::ToolProgress {
            tool: tool.name.clone(),
            phase: ToolPhase::Started,
        })
        .await
    }

    async fn tool_finished(&self, tool: &PlannedTool, result: &ToolResult) -> Result<()> {
        if result.error.as_ref().is_some_and(|e| e.kind == ToolErrorKind::Cancelled) {
            return Err(ToolFlowError::Cancelled);
        }
        if !self.reports(tool) {
            return Ok(());
        }
        let phase = if result.success {
            ToolPhase::Completed
        } else {
            ToolPhase::Failed
        };
        self.send(StreamEvent::ToolProgress {
            tool: tool.name.clone(),
            phase,
        })
        .await
    }

    async fn content(&self, text: &str) -> Result<()> {
        let ready = self.batcher.lock().push(text);
        match ready {
            Some(text) => self.send(StreamEvent::Content { text }).await,
            None => Ok(()),
        }
    }
}
