use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::tools::ToolReport;

#[derive(Default)]
pub(crate) struct WorkflowCounters {
    total: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    latency_ms: AtomicU64,
}

impl WorkflowCounters {
    pub(crate) fn started(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn completed(&self, latency: Duration) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub(crate) fn failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, tools: Vec<ToolReport>) -> OrchestratorStatistics {
        let completed = self.completed.load(Ordering::Relaxed);
        let average_latency_ms = if completed == 0 {
            0.0
        } else {
            self.latency_ms.load(Ordering::Relaxed) as f64 / completed as f64
        };

        let mut by_use: Vec<&ToolReport> = tools.iter().filter(|t| t.invocations > 0).collect();
        by_use.sort_by(|a, b| b.invocations.cmp(&a.invocations));
        let most_used = by_use.iter().take(3).map(|t| t.name.clone()).collect();

        OrchestratorStatistics {
            total_workflows: self.total.load(Ordering::Relaxed),
            completed,
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            average_latency_ms,
            most_used,
            tools,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct OrchestratorStatistics {
    pub total_workflows: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub average_latency_ms: f64,
    pub most_used: Vec<String>,
    pub tools: Vec<ToolReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, invocations: u64) -> ToolReport {
        ToolReport {
            name: name.to_string(),
            kind: "search".to_string(),
            invocations,
            success_rate: Some(1.0),
            mean_latency_ms: 1,
            mean_confidence: 0.5,
        }
    }

    #[test]
    fn snapshot_ranks_most_used() {
        let counters = WorkflowCounters::default();
        counters.started();
        counters.started();
        counters.completed(Duration::from_millis(40));
        counters.failed();

        let stats = counters.snapshot(vec![report("a", 1), report("b", 5), report("c", 0)]);
        assert_eq!(stats.total_workflows, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.average_latency_ms, 40.0);
        assert_eq!(stats.most_used, vec!["b", "a"]);
    }
}
