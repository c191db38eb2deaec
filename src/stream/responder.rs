use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{BoxStream, Stream};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, ToolFlowError};
use crate::runtime::{workflow_id, Orchestrator};
use crate::tools::ToolRequest;

use super::sink::EventSink;
use super::wire::{encode_event, StreamEvent};

/// Runs workflows in the background and exposes them as event streams.
#[derive(Clone)]
pub struct StreamingResponder {
    orchestrator: Arc<Orchestrator>,
}

impl StreamingResponder {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Starts the workflow and returns immediately. The stream opens with
    /// `start` and ends with exactly one `complete` or `error`, unless the
    /// client drops it first, in which case the workflow is cancelled and
    /// nothing further is sent.
    pub fn respond(&self, request: ToolRequest) -> ResponseStream {
        let buffer = self.orchestrator.config().streaming.event_buffer.max(1);
        let (tx, rx) = mpsc::channel(buffer);
        let cancel = CancellationToken::new();
        let id = workflow_id();

        tokio::spawn(drive(
            self.orchestrator.clone(),
            id.clone(),
            request,
            tx,
            cancel.clone(),
        ));

        ResponseStream {
            workflow_id: id,
            rx,
            cancel,
        }
    }
}

async fn drive(
    orchestrator: Arc<Orchestrator>,
    id: String,
    request: ToolRequest,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) {
    let sink = EventSink::new(tx, &orchestrator.config().streaming, cancel.clone());
    if sink
        .send(StreamEvent::Start {
            workflow_id: id.clone(),
        })
        .await
        .is_err()
    {
        return;
    }

    let deadline = orchestrator.config().timeouts.workflow_deadline();
    let outcome = tokio::time::timeout(
        deadline,
        orchestrator.execute_with_id(id.clone(), request, &sink, &cancel),
    )
    .await;

    let mut deadline_hit = false;
    let terminal = match outcome {
        Ok(Ok(outcome)) => StreamEvent::Complete {
            text: outcome.text,
            confidence: outcome.overall_confidence,
            tools_used: outcome.tools_used,
        },
        Ok(Err(_)) if cancel.is_cancelled() => {
            debug!(workflow_id = %id, "client disconnected, stream abandoned");
            return;
        }
        Ok(Err(err)) => StreamEvent::error(err.code(), err.to_string()),
        Err(_) => {
            deadline_hit = true;
            orchestrator.record_deadline_exceeded();
            let err = ToolFlowError::DeadlineExceeded(deadline);
            StreamEvent::error(err.code(), err.to_string())
        }
    };

    if sink.flush().await.is_ok() {
        let _ = sink.send(terminal).await;
    }
    if deadline_hit {
        // the timed-out workflow was dropped; the token goes last so the
        // error above is still delivered
        cancel.cancel();
    }
}

/// Client end of a streamed workflow. Dropping it cancels the workflow.
pub struct ResponseStream {
    workflow_id: String,
    rx: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
}

impl ResponseStream {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Same as dropping the stream, but keeps it readable so events that
    /// were already buffered can still be drained. Nothing new is emitted
    /// after this call.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Encoded `data: ...\n\n` frames, ready for an HTTP body.
    pub fn into_sse(self) -> BoxStream<'static, Result<String>> {
        self.map(|event| encode_event(&event)).boxed()
    }
}

impl Stream for ResponseStream {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
