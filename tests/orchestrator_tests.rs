use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use toolflow::tools::builtin::{AnalyzeTool, SynthesisOutput, SynthesizeTool};
use toolflow::tools::{ToolError, ToolErrorKind};
use toolflow::{
    CapabilityKind, CapabilityTool, ConversationStore, ConversationTurn, MemoryConversationStore,
    Orchestrator, OrchestratorConfig, ScriptedLlmClient, SearchHit, StaticSearchClient,
    ToolContext, ToolDescriptor, ToolFlowError, ToolRegistry, ToolRequest, ToolResult,
    WorkflowStatus,
};

const FRANCE: &str = "What is the capital of France?";

fn france_search() -> StaticSearchClient {
    StaticSearchClient::new()
        .with_topic(
            "france",
            SearchHit::new(
                "France - Wikipedia",
                "Paris is the capital and largest city of France, according to the official census.",
                "https://en.wikipedia.org/wiki/France",
            ),
        )
        .with_topic(
            "capital",
            SearchHit::new(
                "Paris",
                "Paris has been the capital of France since the 10th century.",
                "https://example.org/paris",
            ),
        )
}

enum Behavior {
    Succeed(f64),
    Fail(ToolErrorKind),
    FailFirst(u32),
    Fatal,
}

/// Custom-kind tool with scripted outcomes; records what it saw upstream.
struct ScriptedTool {
    descriptor: ToolDescriptor,
    behavior: Behavior,
    calls: AtomicU32,
    seen_inputs: Mutex<Vec<CapabilityKind>>,
    seen_missing: Mutex<Vec<CapabilityKind>>,
}

impl ScriptedTool {
    fn new(name: &str, behavior: Behavior) -> Self {
        Self::depending(name, &[], behavior)
    }

    fn depending(name: &str, deps: &[CapabilityKind], behavior: Behavior) -> Self {
        let mut builder = ToolDescriptor::builder(name, CapabilityKind::custom(name));
        for dep in deps {
            builder = builder.depends_on(dep.clone());
        }
        Self {
            descriptor: builder.build(),
            behavior,
            calls: AtomicU32::new(0),
            seen_inputs: Mutex::new(Vec::new()),
            seen_missing: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CapabilityTool for ScriptedTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn can_handle(&self, _request: &ToolRequest) -> f64 {
        0.9
    }

    async fn execute(&self, _request: &ToolRequest, ctx: &ToolContext) -> toolflow::Result<ToolResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        for dep in &self.descriptor.dependencies {
            if ctx.input(dep).is_some() {
                self.seen_inputs.lock().push(dep.clone());
            }
        }
        self.seen_missing
            .lock()
            .extend(ctx.missing().iter().cloned());

        let unavailable = || ToolError::new(ToolErrorKind::Unavailable, "backend busy");
        match self.behavior {
            Behavior::Succeed(confidence) => {
                Ok(ToolResult::success(&self.descriptor, confidence, json!({ "call": call })))
            }
            Behavior::Fail(kind) => Ok(ToolResult::failure(
                &self.descriptor,
                ToolError::new(kind, "scripted failure"),
            )),
            Behavior::FailFirst(n) if call <= n => {
                Ok(ToolResult::failure(&self.descriptor, unavailable()))
            }
            Behavior::FailFirst(_) => Ok(ToolResult::success(&self.descriptor, 0.9, json!({}))),
            Behavior::Fatal => Err(ToolFlowError::Other(anyhow::anyhow!("corrupted index"))),
        }
    }
}

fn single_tool(tool: Arc<ScriptedTool>, llm: ScriptedLlmClient) -> anyhow::Result<Orchestrator> {
    let mut registry = ToolRegistry::new();
    registry.register(tool)?;
    Ok(Orchestrator::new(registry, Arc::new(llm), OrchestratorConfig::default())?)
}

#[tokio::test(start_paused = true)]
async fn search_timeout_degrades_but_completes() -> anyhow::Result<()> {
    let healthy = Orchestrator::with_builtin_tools(
        Arc::new(france_search()),
        Arc::new(ScriptedLlmClient::from_text("Paris.")),
        OrchestratorConfig::default(),
    )?;
    let baseline = healthy.run(ToolRequest::new(FRANCE)).await?;

    let slow = Arc::new(france_search().with_delay(Duration::from_secs(120)));
    let degraded = Orchestrator::with_builtin_tools(
        slow.clone(),
        Arc::new(ScriptedLlmClient::from_text("Paris.")),
        OrchestratorConfig::default(),
    )?;
    let outcome = degraded.run(ToolRequest::new(FRANCE)).await?;

    let search = outcome
        .execution
        .result("web_search")
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("search result missing"))?;
    assert!(!search.success);
    assert_eq!(search.error.map(|e| e.message).as_deref(), Some("timeout"));
    assert_eq!(search.attempts, 2);
    assert_eq!(slow.calls(), 2);

    let synthesis = outcome
        .execution
        .result("context_synthesizer")
        .ok_or_else(|| anyhow::anyhow!("synthesis result missing"))?;
    assert!(synthesis.success);
    assert!(!outcome.tools_used.contains(&"web_search".to_string()));
    assert!(outcome.tools_used.contains(&"context_synthesizer".to_string()));

    assert_eq!(outcome.text, "Paris.");
    assert!(outcome.overall_confidence < baseline.overall_confidence);
    Ok(())
}

#[tokio::test]
async fn all_tools_failing_still_completes_with_zero_confidence() -> anyhow::Result<()> {
    let tool = Arc::new(ScriptedTool::new("lookup", Behavior::Fail(ToolErrorKind::EmptyResult)));
    let orchestrator = single_tool(tool.clone(), ScriptedLlmClient::from_text("I am not sure."))?;

    let outcome = orchestrator.run(ToolRequest::new("obscure question")).await?;
    assert_eq!(outcome.execution.status, WorkflowStatus::Completed);
    assert_eq!(outcome.overall_confidence, 0.0);
    assert!(outcome.tools_used.is_empty());
    assert_eq!(outcome.text, "I am not sure.");
    // non-transient failures are not retried
    assert_eq!(tool.calls(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_once() -> anyhow::Result<()> {
    let tool = Arc::new(ScriptedTool::new("flaky", Behavior::FailFirst(1)));
    let orchestrator = single_tool(tool.clone(), ScriptedLlmClient::from_text("ok"))?;

    let outcome = orchestrator.run(ToolRequest::new("anything")).await?;
    let result = outcome
        .execution
        .result("flaky")
        .ok_or_else(|| anyhow::anyhow!("missing result"))?;
    assert!(result.success);
    assert_eq!(result.attempts, 2);
    assert_eq!(tool.calls(), 2);

    let stats = orchestrator.registry().stats("flaky").unwrap_or_default();
    assert_eq!(stats.total_invocations, 1);
    assert_eq!(stats.success_rate(), Some(1.0));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn retry_gives_up_after_policy_limit() -> anyhow::Result<()> {
    let tool = Arc::new(ScriptedTool::new("down", Behavior::FailFirst(10)));
    let orchestrator = single_tool(tool.clone(), ScriptedLlmClient::from_text("ok"))?;

    let outcome = orchestrator.run(ToolRequest::new("anything")).await?;
    assert_eq!(tool.calls(), 2);
    assert_eq!(outcome.overall_confidence, 0.0);
    Ok(())
}

#[tokio::test]
async fn fatal_tool_error_fails_the_workflow() -> anyhow::Result<()> {
    let tool = Arc::new(ScriptedTool::new("broken", Behavior::Fatal));
    let llm = ScriptedLlmClient::from_text("never sent");
    let orchestrator = single_tool(tool, llm.clone())?;

    let err = orchestrator
        .run(ToolRequest::new("anything"))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolFlowError::ToolFatal { ref tool, .. } if tool == "broken"));
    assert_eq!(err.code(), "tool_fatal");
    assert_eq!(llm.attempts(), 0);
    assert_eq!(orchestrator.statistics().failed, 1);
    Ok(())
}

#[tokio::test]
async fn later_tiers_see_earlier_results() -> anyhow::Result<()> {
    let source = Arc::new(ScriptedTool::new("source", Behavior::Succeed(0.8)));
    let broken = Arc::new(ScriptedTool::new("broken", Behavior::Fail(ToolErrorKind::EmptyResult)));
    let consumer = Arc::new(ScriptedTool::depending(
        "consumer",
        &[CapabilityKind::custom("source"), CapabilityKind::custom("broken")],
        Behavior::Succeed(0.6),
    ));

    let mut registry = ToolRegistry::new();
    registry.register(consumer.clone())?;
    registry.register(source.clone())?;
    registry.register(broken)?;
    let orchestrator = Orchestrator::new(
        registry,
        Arc::new(ScriptedLlmClient::from_text("done")),
        OrchestratorConfig::default(),
    )?;

    let outcome = orchestrator.run(ToolRequest::new("anything")).await?;
    assert_eq!(outcome.execution.plan.tier_of("consumer"), Some(1));
    assert_eq!(*consumer.seen_inputs.lock(), vec![CapabilityKind::custom("source")]);
    assert_eq!(*consumer.seen_missing.lock(), vec![CapabilityKind::custom("broken")]);
    assert_eq!(outcome.tools_used, vec!["source", "consumer"]);
    Ok(())
}

/// Search-kind tool whose payload is its own shape, not the builtin one.
struct KnowledgeBaseSearch {
    descriptor: ToolDescriptor,
}

#[async_trait]
impl CapabilityTool for KnowledgeBaseSearch {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn can_handle(&self, _request: &ToolRequest) -> f64 {
        0.95
    }

    async fn execute(&self, _request: &ToolRequest, _ctx: &ToolContext) -> toolflow::Result<ToolResult> {
        Ok(ToolResult::success(
            &self.descriptor,
            0.9,
            json!({ "snippets": ["Paris is the capital of France."] }),
        ))
    }
}

#[tokio::test]
async fn synthesis_degrades_on_foreign_search_payload() -> anyhow::Result<()> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(KnowledgeBaseSearch {
        descriptor: ToolDescriptor::builder("kb_search", CapabilityKind::Search).build(),
    }))?;
    registry.register(Arc::new(AnalyzeTool::new()))?;
    registry.register(Arc::new(SynthesizeTool::new()))?;
    let orchestrator = Orchestrator::new(
        registry,
        Arc::new(ScriptedLlmClient::from_text("Paris.")),
        OrchestratorConfig::default(),
    )?;

    let outcome = orchestrator.run(ToolRequest::new(FRANCE)).await?;
    let synthesis = outcome
        .execution
        .result("context_synthesizer")
        .expect("synthesizer planned");
    assert!(synthesis.success);
    let output: SynthesisOutput = synthesis.decode()?;
    assert!(output.degraded);
    assert_eq!(output.missing, vec![CapabilityKind::Search]);
    assert_eq!(outcome.text, "Paris.");
    Ok(())
}

#[tokio::test]
async fn overall_confidence_weights_every_planned_tool() -> anyhow::Result<()> {
    let good = Arc::new(ScriptedTool::new("good", Behavior::Succeed(0.8)));
    let bad = Arc::new(ScriptedTool::new("bad", Behavior::Fail(ToolErrorKind::MissingInput)));
    let mut registry = ToolRegistry::new();
    registry.register(good)?;
    registry.register(bad)?;
    let orchestrator = Orchestrator::new(
        registry,
        Arc::new(ScriptedLlmClient::from_text("x")),
        OrchestratorConfig::default(),
    )?;

    let outcome = orchestrator.run(ToolRequest::new("anything")).await?;
    // equal custom weights: (0.8 + 0) / 2
    assert!((outcome.overall_confidence - 0.4).abs() < 1e-9);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn generation_recovers_after_failed_attempt() -> anyhow::Result<()> {
    let llm = ScriptedLlmClient::from_text("Paris is the capital.").failing_first(1);
    let orchestrator = Orchestrator::with_builtin_tools(
        Arc::new(france_search()),
        Arc::new(llm.clone()),
        OrchestratorConfig::default(),
    )?;

    let outcome = orchestrator.run(ToolRequest::new(FRANCE)).await?;
    assert_eq!(outcome.text, "Paris is the capital.");
    assert_eq!(llm.attempts(), 2);

    // the prompt is grounded in the synthesized sources
    let system = llm.requests()[0].system.clone().unwrap_or_default();
    assert!(system.contains("Context:"));
    assert!(system.contains("https://en.wikipedia.org/wiki/France"));
    assert!(outcome.quality.score > 0.0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_first_token_counts_as_failed_attempt() -> anyhow::Result<()> {
    let mut config = OrchestratorConfig::default();
    config.timeouts.first_token_timeout_ms = 1_000;
    config.timeouts.workflow_deadline_ms = 600_000;
    let llm = ScriptedLlmClient::from_text("late").with_first_token_delay(Duration::from_secs(5));
    let orchestrator = Orchestrator::new(ToolRegistry::new(), Arc::new(llm.clone()), config)?;

    let err = orchestrator
        .run(ToolRequest::new("anything"))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolFlowError::Generation { attempts: 3, .. }));
    assert_eq!(llm.attempts(), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn deadline_bounds_the_whole_workflow() -> anyhow::Result<()> {
    let mut config = OrchestratorConfig::default();
    config.timeouts.workflow_deadline_ms = 2_000;
    let llm = ScriptedLlmClient::from_text("a slow and deliberately long answer").with_token_delay(Duration::from_secs(1));
    let orchestrator = Orchestrator::new(ToolRegistry::new(), Arc::new(llm), config)?;

    let err = orchestrator
        .run(ToolRequest::new("anything"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "deadline_exceeded");
    assert_eq!(orchestrator.statistics().cancelled, 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_workflows_are_isolated() -> anyhow::Result<()> {
    let orchestrator = Arc::new(Orchestrator::with_builtin_tools(
        Arc::new(france_search()),
        Arc::new(ScriptedLlmClient::from_text("Paris.")),
        OrchestratorConfig::default(),
    )?);

    let runs = (0..4).map(|_| {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run(ToolRequest::new(FRANCE)).await })
    });
    let mut ids = Vec::new();
    for run in futures::future::join_all(runs).await {
        let outcome = run??;
        assert_eq!(outcome.text, "Paris.");
        assert_eq!(outcome.execution.results.len(), outcome.execution.plan.len());
        ids.push(outcome.workflow_id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);

    let stats = orchestrator.statistics();
    assert_eq!(stats.completed, 4);
    let search = orchestrator.registry().stats("web_search").unwrap_or_default();
    assert_eq!(search.total_invocations, 4);
    Ok(())
}

#[tokio::test]
async fn stored_turns_reach_the_prompt() -> anyhow::Result<()> {
    let store = MemoryConversationStore::new();
    store.append("conv-1", ConversationTurn::user(FRANCE)).await?;
    store.append("conv-1", ConversationTurn::assistant("Paris.")).await?;

    let llm = ScriptedLlmClient::from_text("About 2.1 million.");
    let orchestrator = Orchestrator::with_builtin_tools(
        Arc::new(france_search()),
        Arc::new(llm.clone()),
        OrchestratorConfig::default(),
    )?;
    let request = ToolRequest::from_store(&store, "conv-1", "And its population?", 20).await?;
    let outcome = orchestrator.run(request).await?;

    let history = llm.requests()[0].history.clone();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].role, "assistant");

    // the caller persists the answer, not the orchestrator
    assert_eq!(store.recent_turns("conv-1", 10).await?.len(), 2);
    store
        .append("conv-1", ConversationTurn::assistant(outcome.text))
        .await?;
    assert_eq!(store.recent_turns("conv-1", 10).await?.len(), 3);
    Ok(())
}
