//! Turns a request into tiers of tools that may run concurrently.

pub mod graph;

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::PlannerConfig;
use crate::error::{Result, ToolFlowError};
use crate::tools::{
    CapabilityKind, DynTool, StatsSnapshot, ToolRegistry, ToolRequest,
};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlannedTool {
    pub name: String,
    pub kind: CapabilityKind,
    pub dependencies: BTreeSet<CapabilityKind>,
    pub confidence: f64,
    pub score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    BelowThreshold { confidence: f64 },
    DependencyUnsatisfied { missing: Vec<CapabilityKind> },
    Outranked { by: String, score: f64 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedTool {
    pub name: String,
    pub kind: CapabilityKind,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ExecutionPlan {
    pub tiers: Vec<Vec<PlannedTool>>,
    pub skipped: Vec<SkippedTool>,
}

impl ExecutionPlan {
    pub fn tools(&self) -> impl Iterator<Item = &PlannedTool> {
        self.tiers.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.tiers.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools().any(|tool| tool.name == name)
    }

    pub fn contains_kind(&self, kind: &CapabilityKind) -> bool {
        self.tools().any(|tool| &tool.kind == kind)
    }

    pub fn tier_of(&self, name: &str) -> Option<usize> {
        self.tiers
            .iter()
            .position(|tier| tier.iter().any(|tool| tool.name == name))
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools().map(|tool| tool.name.as_str()).collect()
    }
}

struct Candidate {
    tool: DynTool,
    confidence: f64,
}

pub struct WorkflowPlanner {
    config: PlannerConfig,
}

impl WorkflowPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn plan(&self, registry: &ToolRegistry, request: &ToolRequest) -> Result<ExecutionPlan> {
        let snapshot = registry.snapshot();
        self.plan_with_stats(registry, request, &snapshot)
    }

    /// Same request and same stats snapshot always yield the same plan.
    pub fn plan_with_stats(
        &self,
        registry: &ToolRegistry,
        request: &ToolRequest,
        stats: &StatsSnapshot,
    ) -> Result<ExecutionPlan> {
        let mut skipped = Vec::new();

        let mut candidates = Vec::new();
        for tool in registry.all() {
            let confidence = self.score_request(&tool, request);
            if confidence < self.config.min_confidence {
                skipped.push(SkippedTool {
                    name: tool.name().to_string(),
                    kind: tool.kind().clone(),
                    reason: SkipReason::BelowThreshold { confidence },
                });
                continue;
            }
            candidates.push(Candidate { tool, confidence });
        }

        let candidates = Self::resolve_dependencies(candidates, &mut skipped);
        let selected = self.break_ties(candidates, stats, &mut skipped);

        let tiers = graph::layer(
            selected,
            |tool: &PlannedTool| tool.kind.clone(),
            |tool: &PlannedTool| tool.dependencies.clone(),
        )
        .ok_or_else(|| {
            ToolFlowError::CyclicDependency("cycle among planned tools".to_string())
        })?;

        let plan = ExecutionPlan { tiers, skipped };
        debug!(
            tools = ?plan.tool_names(),
            tiers = plan.tiers.len(),
            skipped = plan.skipped.len(),
            "workflow planned"
        );
        Ok(plan)
    }

    fn score_request(&self, tool: &DynTool, request: &ToolRequest) -> f64 {
        if !request.capability_enabled(tool.kind()) {
            return 0.0;
        }
        let started = Instant::now();
        let confidence = tool.can_handle(request);
        let elapsed = started.elapsed();
        if elapsed > Duration::from_millis(self.config.can_handle_budget_ms) {
            warn!(
                tool = %tool.name(),
                elapsed_us = elapsed.as_micros() as u64,
                "can_handle exceeded its time budget"
            );
        }
        if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        }
    }

    /// Drops candidates whose dependencies name a kind no surviving
    /// candidate provides, repeating until nothing else drops.
    fn resolve_dependencies(
        mut candidates: Vec<Candidate>,
        skipped: &mut Vec<SkippedTool>,
    ) -> Vec<Candidate> {
        loop {
            let available: BTreeSet<CapabilityKind> = candidates
                .iter()
                .map(|candidate| candidate.tool.kind().clone())
                .collect();
            let before = candidates.len();
            candidates.retain(|candidate| {
                let missing: Vec<CapabilityKind> = candidate
                    .tool
                    .descriptor()
                    .dependencies
                    .iter()
                    .filter(|dep| !available.contains(*dep))
                    .cloned()
                    .collect();
                if missing.is_empty() {
                    return true;
                }
                skipped.push(SkippedTool {
                    name: candidate.tool.name().to_string(),
                    kind: candidate.tool.kind().clone(),
                    reason: SkipReason::DependencyUnsatisfied { missing },
                });
                false
            });
            if candidates.len() == before {
                return candidates;
            }
        }
    }

    /// Keeps one tool per kind: highest `confidence + weight * success_rate`,
    /// earlier registration on exact ties.
    fn break_ties(
        &self,
        candidates: Vec<Candidate>,
        stats: &StatsSnapshot,
        skipped: &mut Vec<SkippedTool>,
    ) -> Vec<PlannedTool> {
        let mut winners: BTreeMap<CapabilityKind, usize> = BTreeMap::new();
        let mut planned: Vec<PlannedTool> = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let descriptor = candidate.tool.descriptor();
            let success_rate = stats
                .get(&descriptor.name)
                .and_then(|s| s.success_rate())
                .unwrap_or(self.config.default_success_rate);
            let tool = PlannedTool {
                name: descriptor.name.clone(),
                kind: descriptor.kind.clone(),
                dependencies: descriptor.dependencies.clone(),
                confidence: candidate.confidence,
                score: candidate.confidence + self.config.success_rate_weight * success_rate,
            };

            match winners.get(&tool.kind).copied() {
                None => {
                    winners.insert(tool.kind.clone(), planned.len());
                    planned.push(tool);
                }
                Some(idx) if tool.score > planned[idx].score => {
                    let loser = std::mem::replace(&mut planned[idx], tool);
                    skipped.push(SkippedTool {
                        name: loser.name,
                        kind: loser.kind,
                        reason: SkipReason::Outranked {
                            by: planned[idx].name.clone(),
                            score: loser.score,
                        },
                    });
                }
                Some(idx) => {
                    skipped.push(SkippedTool {
                        name: tool.name,
                        kind: tool.kind,
                        reason: SkipReason::Outranked {
                            by: planned[idx].name.clone(),
                            score: tool.score,
                        },
                    });
                }
            }
        }

        planned
    }
}
