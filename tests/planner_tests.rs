use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use toolflow::config::PlannerConfig;
use toolflow::planner::SkipReason;
use toolflow::tools::ToolError;
use toolflow::tools::ToolErrorKind;
use toolflow::{
    builtin_registry, CapabilityKind, CapabilityTool, OrchestratorConfig, StaticSearchClient,
    ToolContext, ToolDescriptor, ToolRegistry, ToolRequest, ToolResult, WorkflowPlanner,
};

struct StubTool {
    descriptor: ToolDescriptor,
    confidence: f64,
}

impl StubTool {
    fn new(name: &str, kind: CapabilityKind, confidence: f64) -> Self {
        Self::with_deps(name, kind, &[], confidence)
    }

    fn with_deps(name: &str, kind: CapabilityKind, deps: &[CapabilityKind], confidence: f64) -> Self {
        let mut builder = ToolDescriptor::builder(name, kind);
        for dep in deps {
            builder = builder.depends_on(dep.clone());
        }
        Self {
            descriptor: builder.build(),
            confidence,
        }
    }
}

#[async_trait]
impl CapabilityTool for StubTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn can_handle(&self, _request: &ToolRequest) -> f64 {
        self.confidence
    }

    async fn execute(&self, _request: &ToolRequest, _ctx: &ToolContext) -> toolflow::Result<ToolResult> {
        Ok(ToolResult::success(&self.descriptor, self.confidence, json!({})))
    }
}

fn planner() -> WorkflowPlanner {
    WorkflowPlanner::new(PlannerConfig::default())
}

#[test]
fn higher_confidence_search_tool_wins() -> anyhow::Result<()> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(StubTool::new("search_b", CapabilityKind::Search, 0.6)))?;
    registry.register(Arc::new(StubTool::new("search_a", CapabilityKind::Search, 0.8)))?;

    let plan = planner().plan(&registry, &ToolRequest::new("latest news"))?;
    assert_eq!(plan.tool_names(), vec!["search_a"]);
    assert!(matches!(
        &plan.skipped[0].reason,
        SkipReason::Outranked { by, .. } if by == "search_a"
    ));
    Ok(())
}

#[test]
fn exact_tie_goes_to_first_registered() -> anyhow::Result<()> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(StubTool::new("first", CapabilityKind::Search, 0.8)))?;
    registry.register(Arc::new(StubTool::new("second", CapabilityKind::Search, 0.8)))?;

    let plan = planner().plan(&registry, &ToolRequest::new("latest news"))?;
    assert_eq!(plan.tool_names(), vec!["first"]);
    Ok(())
}

#[test]
fn success_history_breaks_near_ties() -> anyhow::Result<()> {
    let mut registry = ToolRegistry::new();
    let flaky = StubTool::new("flaky", CapabilityKind::Search, 0.8);
    let failure = ToolResult::failure(&flaky.descriptor, ToolError::new(ToolErrorKind::Unavailable, "down"));
    registry.register(Arc::new(flaky))?;
    registry.register(Arc::new(StubTool::new("steady", CapabilityKind::Search, 0.8)))?;
    for _ in 0..3 {
        registry.record_outcome("flaky", &failure);
    }

    let plan = planner().plan(&registry, &ToolRequest::new("latest news"))?;
    assert_eq!(plan.tool_names(), vec!["steady"]);
    Ok(())
}

#[test]
fn tools_below_threshold_are_skipped() -> anyhow::Result<()> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(StubTool::new("weak", CapabilityKind::Analyze, 0.05)))?;
    registry.register(Arc::new(StubTool::new("nan", CapabilityKind::Validate, f64::NAN)))?;

    let plan = planner().plan(&registry, &ToolRequest::new("anything"))?;
    assert!(plan.is_empty());
    assert_eq!(plan.skipped.len(), 2);
    assert!(plan
        .skipped
        .iter()
        .all(|s| matches!(s.reason, SkipReason::BelowThreshold { .. })));
    Ok(())
}

#[test]
fn unsatisfied_dependencies_cascade() -> anyhow::Result<()> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(StubTool::new("search", CapabilityKind::Search, 0.05)))?;
    registry.register(Arc::new(StubTool::new("analyze", CapabilityKind::Analyze, 0.9)))?;
    registry.register(Arc::new(StubTool::with_deps(
        "merge",
        CapabilityKind::Synthesize,
        &[CapabilityKind::Search],
        0.9,
    )))?;
    registry.register(Arc::new(StubTool::with_deps(
        "check",
        CapabilityKind::Validate,
        &[CapabilityKind::Synthesize],
        0.9,
    )))?;

    let plan = planner().plan(&registry, &ToolRequest::new("anything"))?;
    assert_eq!(plan.tool_names(), vec!["analyze"]);
    let dropped: Vec<&str> = plan
        .skipped
        .iter()
        .filter(|s| matches!(s.reason, SkipReason::DependencyUnsatisfied { .. }))
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(dropped, vec!["merge", "check"]);
    Ok(())
}

#[test]
fn builtin_tools_are_layered_by_dependency() -> anyhow::Result<()> {
    let registry = builtin_registry(
        Arc::new(StaticSearchClient::new()),
        OrchestratorConfig::default().search,
    )?;
    let plan = planner().plan(&registry, &ToolRequest::new("What is the latest Rust release?"))?;

    assert_eq!(plan.len(), 4);
    assert_eq!(plan.tier_of("web_search"), Some(0));
    assert_eq!(plan.tier_of("query_analyzer"), Some(0));
    assert_eq!(plan.tier_of("context_synthesizer"), Some(1));
    assert_eq!(plan.tier_of("quality_validator"), Some(2));

    // every tool sits in a later tier than the providers of its dependencies
    for tool in plan.tools() {
        let tier = plan.tier_of(&tool.name).unwrap_or_default();
        for provider in plan.tools().filter(|p| tool.dependencies.contains(&p.kind)) {
            assert!(plan.tier_of(&provider.name).unwrap_or_default() < tier);
        }
    }
    Ok(())
}

#[test]
fn disabling_search_drops_its_dependents() -> anyhow::Result<()> {
    let registry = builtin_registry(
        Arc::new(StaticSearchClient::new()),
        OrchestratorConfig::default().search,
    )?;
    let request = ToolRequest::builder("What is the capital of France?")
        .disable(&CapabilityKind::Search)
        .build();

    let plan = planner().plan(&registry, &request)?;
    assert_eq!(plan.tool_names(), vec!["query_analyzer"]);
    assert!(!plan.contains_kind(&CapabilityKind::Search));
    Ok(())
}

#[test]
fn same_inputs_same_plan() -> anyhow::Result<()> {
    let registry = builtin_registry(
        Arc::new(StaticSearchClient::new()),
        OrchestratorConfig::default().search,
    )?;
    let request = ToolRequest::new("How does tokio schedule tasks and also what is io_uring?");
    let snapshot = registry.snapshot();

    let first = planner().plan_with_stats(&registry, &request, &snapshot)?;
    let second = planner().plan_with_stats(&registry, &request, &snapshot)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn empty_query_plans_nothing() -> anyhow::Result<()> {
    let registry = builtin_registry(
        Arc::new(StaticSearchClient::new()),
        OrchestratorConfig::default().search,
    )?;
    let plan = planner().plan(&registry, &ToolRequest::new("   "))?;
    assert!(plan.is_empty());
    Ok(())
}
