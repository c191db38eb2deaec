use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::tool::ToolResult;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub total_invocations: u64,
    pub successes: u64,
    pub cumulative_latency: Duration,
    pub cumulative_confidence: f64,
}

impl PerformanceStats {
    pub fn record(&mut self, result: &ToolResult) {
        self.total_invocations += 1;
        if result.success {
            self.successes += 1;
        }
        self.cumulative_latency += result.latency;
        self.cumulative_confidence += result.confidence;
    }

    /// `None` until the tool has been invoked at least once.
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_invocations == 0 {
            return None;
        }
        Some(self.successes as f64 / self.total_invocations as f64)
    }

    pub fn mean_latency(&self) -> Duration {
        if self.total_invocations == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.cumulative_latency.as_secs_f64() / self.total_invocations as f64)
    }

    pub fn mean_confidence(&self) -> f64 {
        if self.total_invocations == 0 {
            return 0.0;
        }
        self.cumulative_confidence / self.total_invocations as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{CapabilityKind, ToolDescriptor, ToolError};
    use serde_json::Value;

    #[test]
    fn record_accumulates() {
        let descriptor = ToolDescriptor::builder("web_search", CapabilityKind::Search).build();
        let mut stats = PerformanceStats::default();
        assert_eq!(stats.success_rate(), None);

        stats.record(
            &ToolResult::success(&descriptor, 0.8, Value::Null)
                .with_latency(Duration::from_millis(100)),
        );
        stats.record(
            &ToolResult::failure(&descriptor, ToolError::timeout())
                .with_latency(Duration::from_millis(300)),
        );

        assert_eq!(stats.total_invocations, 2);
        assert_eq!(stats.success_rate(), Some(0.5));
        assert_eq!(stats.mean_latency(), Duration::from_millis(200));
        assert!((stats.mean_confidence() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn mean_latency_past_u32_invocations() {
        let stats = PerformanceStats {
            total_invocations: 1 << 32,
            successes: 1 << 32,
            cumulative_latency: Duration::from_secs(1 << 32),
            cumulative_confidence: 0.0,
        };
        assert_eq!(stats.mean_latency(), Duration::from_secs(1));
    }
}
