//! Workflow execution, retries and statistics.

mod execution;
mod observer;
mod orchestrator;
mod retry;
mod statistics;

pub use execution::{workflow_id, WorkflowExecution, WorkflowOutcome, WorkflowStatus};
pub use observer::{NoopObserver, WorkflowObserver};
pub use orchestrator::Orchestrator;
pub use retry::RetryPolicy;
pub use statistics::OrchestratorStatistics;
