use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::error::{Result, ToolFlowError};
use crate::planner::graph;
use crate::utils::validation::ConfigValidator;

use super::descriptor::ToolDescriptor;
use super::stats::PerformanceStats;
use super::tool::{DynTool, ToolResult};

struct ToolEntry {
    tool: DynTool,
    stats: Mutex<PerformanceStats>,
}

/// Registered tools in registration order. Registration happens at startup
/// through `&mut self`; stats are updated through `&self` with one lock per
/// tool, so a shared `Arc<ToolRegistry>` serializes updates per tool name.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<ToolEntry>,
    index: HashMap<String, usize>,
}

pub type StatsSnapshot = HashMap<String, PerformanceStats>;

#[derive(Clone, Debug, Serialize)]
pub struct ToolReport {
    pub name: String,
    pub kind: String,
    pub invocations: u64,
    pub success_rate: Option<f64>,
    pub mean_latency_ms: u128,
    pub mean_confidence: f64,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: DynTool) -> Result<()> {
        let name = tool.name().to_string();
        ConfigValidator::validate_tool_name(&name)?;
        if self.index.contains_key(&name) {
            return Err(ToolFlowError::DuplicateTool(name));
        }
        self.index.insert(name, self.entries.len());
        self.entries.push(ToolEntry {
            tool,
            stats: Mutex::new(PerformanceStats::default()),
        });
        Ok(())
    }

    /// Rejects dependency cycles between capability kinds. Call once after
    /// registration; the orchestrator refuses to start otherwise.
    pub fn validate(&self) -> Result<()> {
        let descriptors = self.descriptors();
        if let Some(cycle) = graph::find_cycle(&descriptors) {
            let path = cycle
                .iter()
                .map(|kind| kind.to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(ToolFlowError::CyclicDependency(path));
        }
        Ok(())
    }

    /// Every tool, in registration order.
    pub fn all(&self) -> Vec<DynTool> {
        self.entries
            .iter()
            .map(|entry| Arc::clone(&entry.tool))
            .collect()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.entries
            .iter()
            .map(|entry| entry.tool.descriptor().clone())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<DynTool> {
        self.index
            .get(name)
            .map(|&idx| Arc::clone(&self.entries[idx].tool))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Best-effort bookkeeping: unknown names are logged and ignored.
    pub fn record_outcome(&self, tool_name: &str, result: &ToolResult) {
        match self.index.get(tool_name) {
            Some(&idx) => self.entries[idx].stats.lock().record(result),
            None => warn!(tool = %tool_name, "record_outcome for unregistered tool ignored"),
        }
    }

    pub fn stats(&self, tool_name: &str) -> Option<PerformanceStats> {
        self.index
            .get(tool_name)
            .map(|&idx| self.entries[idx].stats.lock().clone())
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.entries
            .iter()
            .map(|entry| (entry.tool.name().to_string(), entry.stats.lock().clone()))
            .collect()
    }

    pub fn report(&self) -> Vec<ToolReport> {
        self.entries
            .iter()
            .map(|entry| {
                let stats = entry.stats.lock().clone();
                ToolReport {
                    name: entry.tool.name().to_string(),
                    kind: entry.tool.kind().to_string(),
                    invocations: stats.total_invocations,
                    success_rate: stats.success_rate(),
                    mean_latency_ms: stats.mean_latency().as_millis(),
                    mean_confidence: stats.mean_confidence(),
                }
            })
            .collect()
    }
}
