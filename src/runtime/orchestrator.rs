use std::time::Instant;

use futures::future::join_all;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::error::{Result, ToolFlowError};
use crate::llm::prompt::{self, PromptBuilder};
use crate::llm::{DynLlmClient, LlmStream};
use crate::planner::{ExecutionPlan, PlannedTool, WorkflowPlanner};
use crate::search::DynSearchClient;
use crate::tools::builtin::{self, analyze, validate, QualityReport, QueryAnalysis, SearchOutput, SynthesisOutput};
use crate::tools::{
    CapabilityKind, DynTool, ToolContext, ToolError, ToolRegistry, ToolRequest, ToolResult,
};

use super::execution::{workflow_id, WorkflowExecution, WorkflowOutcome, WorkflowStatus};
use super::observer::{NoopObserver, WorkflowObserver};
use super::retry;
use super::statistics::{OrchestratorStatistics, WorkflowCounters};

/// How the first read from a generation stream ended.
enum Opening {
    Token(String),
    Finished,
}

async fn first_token(stream: &mut LlmStream) -> Result<Opening> {
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if !chunk.content.is_empty() {
            return Ok(Opening::Token(chunk.content));
        }
        if chunk.done {
            break;
        }
    }
    Ok(Opening::Finished)
}

/// Plans, runs tool tiers concurrently, then generates the answer.
///
/// The registry and configuration are shared read-only; each call owns its
/// own `WorkflowExecution`, so concurrent workflows never see each other.
pub struct Orchestrator {
    registry: ToolRegistry,
    planner: WorkflowPlanner,
    llm: DynLlmClient,
    prompts: PromptBuilder,
    config: OrchestratorConfig,
    counters: WorkflowCounters,
}

impl Orchestrator {
    pub fn new(registry: ToolRegistry, llm: DynLlmClient, config: OrchestratorConfig) -> Result<Self> {
        registry.validate()?;
        config.validate()?;
        Ok(Self {
            planner: WorkflowPlanner::new(config.planner.clone()),
            prompts: PromptBuilder::new(config.llm.clone()),
            registry,
            llm,
            config,
            counters: WorkflowCounters::default(),
        })
    }

    /// Orchestrator over the four builtin tools.
    pub fn with_builtin_tools(
        search_client: DynSearchClient,
        llm: DynLlmClient,
        config: OrchestratorConfig,
    ) -> Result<Self> {
        let registry = builtin::builtin_registry(search_client, config.search.clone())?;
        Self::new(registry, llm, config)
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn plan(&self, request: &ToolRequest) -> Result<ExecutionPlan> {
        self.planner.plan(&self.registry, request)
    }

    pub fn statistics(&self) -> OrchestratorStatistics {
        self.counters.snapshot(self.registry.report())
    }

    /// Non-streaming entry point, bounded by the workflow deadline.
    pub async fn run(&self, request: ToolRequest) -> Result<WorkflowOutcome> {
        let cancel = CancellationToken::new();
        let deadline = self.config.timeouts.workflow_deadline();
        match retry::with_timeout(deadline, self.execute(request, &NoopObserver, &cancel)).await {
            Some(outcome) => outcome,
            None => {
                cancel.cancel();
                self.record_deadline_exceeded();
                Err(ToolFlowError::DeadlineExceeded(deadline))
            }
        }
    }

    pub async fn execute(
        &self,
        request: ToolRequest,
        observer: &dyn WorkflowObserver,
        cancel: &CancellationToken,
    ) -> Result<WorkflowOutcome> {
        self.execute_with_id(workflow_id(), request, observer, cancel)
            .await
    }

    /// Runs one workflow under a caller-chosen id. No deadline is applied
    /// here; callers wrap this in their own.
    pub async fn execute_with_id(
        &self,
        id: String,
        request: ToolRequest,
        observer: &dyn WorkflowObserver,
        cancel: &CancellationToken,
    ) -> Result<WorkflowOutcome> {
        let started = Instant::now();
        self.counters.started();
        info!(workflow_id = %id, query = %request.query(), "workflow started");

        let outcome = self.drive(id.clone(), request, observer, cancel).await;
        match &outcome {
            Ok(outcome) => {
                self.counters.completed(started.elapsed());
                info!(
                    workflow_id = %id,
                    confidence = outcome.overall_confidence,
                    tools_used = ?outcome.tools_used,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "workflow completed"
                );
            }
            Err(err) if err.is_cancellation() => {
                self.counters.cancelled();
                info!(workflow_id = %id, "workflow cancelled");
            }
            Err(err) => {
                self.counters.failed();
                warn!(workflow_id = %id, error = %err, "workflow failed");
            }
        }
        outcome
    }

    pub(crate) fn record_deadline_exceeded(&self) {
        self.counters.cancelled();
        warn!(
            deadline_ms = self.config.timeouts.workflow_deadline_ms,
            "workflow deadline exceeded"
        );
    }

    async fn drive(
        &self,
        id: String,
        request: ToolRequest,
        observer: &dyn WorkflowObserver,
        cancel: &CancellationToken,
    ) -> Result<WorkflowOutcome> {
        let plan = self.plan(&request)?;
        debug!(
            workflow_id = %id,
            tools = ?plan.tool_names(),
            tiers = plan.tiers.len(),
            skipped = plan.skipped.len(),
            "plan ready"
        );

        let mut execution = WorkflowExecution::new(id, request, plan);
        let tiers = execution.plan.tiers.clone();
        for tier in &tiers {
            if cancel.is_cancelled() {
                return Err(ToolFlowError::Cancelled);
            }
            self.run_tier(&mut execution, tier, observer, cancel).await?;
        }
        if cancel.is_cancelled() {
            return Err(ToolFlowError::Cancelled);
        }

        execution.overall_confidence = self.overall_confidence(&execution);
        let text = match self.generate(&execution, observer, cancel).await {
            Ok(text) => text,
            Err(err) => {
                if !err.is_cancellation() {
                    execution.status = WorkflowStatus::Failed;
                    debug!(
                        workflow_id = %execution.id,
                        status = ?execution.status,
                        results = execution.results.len(),
                        "generation failed; execution discarded"
                    );
                }
                return Err(err);
            }
        };
        let quality = self.assess(&execution, &text);
        execution.status = WorkflowStatus::Completed;

        Ok(WorkflowOutcome {
            workflow_id: execution.id.clone(),
            overall_confidence: execution.overall_confidence,
            tools_used: execution.tools_used(),
            text,
            quality,
            execution,
        })
    }

    /// Runs every tool of one tier concurrently; all finish before the next
    /// tier starts.
    async fn run_tier(
        &self,
        execution: &mut WorkflowExecution,
        tier: &[PlannedTool],
        observer: &dyn WorkflowObserver,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut invocations = Vec::with_capacity(tier.len());
        for planned in tier {
            let tool = self
                .registry
                .get(&planned.name)
                .ok_or_else(|| ToolFlowError::ToolNotRegistered(planned.name.clone()))?;
            let ctx = Self::context_for(execution, planned, cancel);
            observer.tool_started(planned).await?;
            invocations.push((planned, tool, ctx));
        }

        let request = &execution.request;
        let runs = invocations.iter().map(|(planned, tool, ctx)| async move {
            let result = self.invoke(tool, request, ctx).await?;
            self.registry.record_outcome(&planned.name, &result);
            observer.tool_finished(planned, &result).await?;
            Ok::<_, ToolFlowError>(result)
        });
        let outcomes = join_all(runs).await;

        for ((planned, _, _), outcome) in invocations.iter().zip(outcomes) {
            let result = outcome?;
            execution.results.insert(planned.name.clone(), result);
        }
        Ok(())
    }

    fn context_for(
        execution: &WorkflowExecution,
        planned: &PlannedTool,
        cancel: &CancellationToken,
    ) -> ToolContext {
        let mut ctx = ToolContext::new(execution.id.clone(), cancel.clone());
        for kind in &planned.dependencies {
            ctx = match execution.result_of_kind(kind) {
                Some(result) if result.success => ctx.with_upstream(result.clone()),
                Some(result) => ctx.with_upstream(result.clone()).with_missing(kind.clone()),
                None => ctx.with_missing(kind.clone()),
            };
        }
        ctx
    }

    /// One tool under the per-tool timeout, retrying transient failures per
    /// the tool retry policy.
    async fn invoke(
        &self,
        tool: &DynTool,
        request: &ToolRequest,
        ctx: &ToolContext,
    ) -> Result<ToolResult> {
        let policy = &self.config.retry.tool;
        let limit = self.config.timeouts.tool_timeout();
        let descriptor = tool.descriptor();
        let mut attempt = 0;

        loop {
            attempt += 1;
            if retry::backoff(policy.delay_before(attempt), ctx.cancellation())
                .await
                .is_err()
            {
                return Ok(ToolResult::failure(descriptor, ToolError::cancelled()).with_attempts(attempt));
            }

            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = ctx.cancellation().cancelled() => {
                    Ok(ToolResult::failure(descriptor, ToolError::cancelled()))
                }
                outcome = retry::with_timeout(limit, tool.execute(request, ctx)) => {
                    outcome.unwrap_or_else(|| Ok(ToolResult::failure(descriptor, ToolError::timeout())))
                }
            };

            let result = match outcome {
                Ok(result) => result,
                Err(err) if err.is_cancellation() => {
                    ToolResult::failure(descriptor, ToolError::cancelled())
                }
                Err(err) => {
                    return Err(ToolFlowError::ToolFatal {
                        tool: descriptor.name.clone(),
                        message: err.to_string(),
                    })
                }
            };
            let result = result
                .with_attempts(attempt)
                .with_latency(started.elapsed());

            if result.success || !result.is_transient_failure() || attempt >= policy.max_attempts() {
                match &result.error {
                    None => debug!(
                        workflow_id = %ctx.workflow_id(),
                        tool = %descriptor.name,
                        confidence = result.confidence,
                        attempts = attempt,
                        "tool finished"
                    ),
                    Some(error) => warn!(
                        workflow_id = %ctx.workflow_id(),
                        tool = %descriptor.name,
                        attempts = attempt,
                        error = %error,
                        "tool failed"
                    ),
                }
                return Ok(result);
            }

            warn!(
                workflow_id = %ctx.workflow_id(),
                tool = %descriptor.name,
                attempt,
                "tool invocation failed, retrying"
            );
        }
    }

    /// Weighted mean of tool confidences over every planned tool; failed
    /// tools count as zero.
    fn overall_confidence(&self, execution: &WorkflowExecution) -> f64 {
        let weights = &self.config.weights;
        let planned: f64 = execution
            .plan
            .tools()
            .map(|tool| weights.weight_for(&tool.kind))
            .sum();
        if planned <= 0.0 {
            return 0.0;
        }
        let earned: f64 = execution
            .plan
            .tools()
            .filter_map(|tool| {
                execution
                    .result(&tool.name)
                    .filter(|result| result.success)
                    .map(|result| weights.weight_for(&tool.kind) * result.confidence)
            })
            .sum();
        (earned / planned).clamp(0.0, 1.0)
    }

    /// Streams the answer. Retries happen only while nothing has been
    /// emitted; once the first token is out a failure ends the workflow.
    async fn generate(
        &self,
        execution: &WorkflowExecution,
        observer: &dyn WorkflowObserver,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let grounding = prompt::grounding(
            execution.output::<SynthesisOutput>(&CapabilityKind::Synthesize).as_ref(),
            execution.output::<SearchOutput>(&CapabilityKind::Search).as_ref(),
        );
        let prompt = self.prompts.build(&execution.request, grounding.as_deref());
        let policy = &self.config.retry.generation;
        let first_token_timeout = self.config.timeouts.first_token_timeout();
        let mut attempt = 0;

        loop {
            attempt += 1;
            retry::backoff(policy.delay_before(attempt), cancel).await?;

            let mut stream = self.llm.complete_stream(prompt.clone());
            let opening = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ToolFlowError::Cancelled),
                opening = retry::with_timeout(first_token_timeout, first_token(&mut stream)) => opening,
            };

            let failure = match opening {
                Some(Ok(Opening::Token(first))) => {
                    return self.relay(first, stream, attempt, observer, cancel).await;
                }
                Some(Ok(Opening::Finished)) => return Ok(String::new()),
                Some(Err(err)) => err.to_string(),
                None => format!("no token within {first_token_timeout:?}"),
            };

            if attempt >= policy.max_attempts() {
                return Err(ToolFlowError::Generation {
                    attempts: attempt,
                    message: failure,
                });
            }
            warn!(
                workflow_id = %execution.id,
                attempt,
                error = %failure,
                "generation failed before first token, retrying"
            );
        }
    }

    async fn relay(
        &self,
        first: String,
        mut stream: LlmStream,
        attempt: u32,
        observer: &dyn WorkflowObserver,
        cancel: &CancellationToken,
    ) -> Result<String> {
        observer.content(&first).await?;
        let mut text = first;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ToolFlowError::Cancelled),
                next = stream.next() => next,
            };
            match next {
                None => break,
                Some(Ok(chunk)) => {
                    if !chunk.content.is_empty() {
                        observer.content(&chunk.content).await?;
                        text.push_str(&chunk.content);
                    }
                    if chunk.done {
                        break;
                    }
                }
                Some(Err(err)) => {
                    return Err(ToolFlowError::Generation {
                        attempts: attempt,
                        message: err.to_string(),
                    })
                }
            }
        }
        Ok(text)
    }

    fn assess(&self, execution: &WorkflowExecution, text: &str) -> QualityReport {
        let intents = execution
            .output::<QueryAnalysis>(&CapabilityKind::Analyze)
            .map(|analysis| analysis.sub_intents)
            .unwrap_or_else(|| analyze::sub_intents(execution.request.query()));
        let search = execution.output::<SearchOutput>(&CapabilityKind::Search);
        let synthesis = execution.output::<SynthesisOutput>(&CapabilityKind::Synthesize);
        let sources = validate::source_texts(search.as_ref(), synthesis.as_ref());
        let conflicts = synthesis.as_ref().map_or(0, |s| s.conflicts.len());
        validate::assess_draft(text, &intents, &sources, conflicts)
    }
}
