use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ToolFlowError};
use crate::runtime::RetryPolicy;
use crate::tools::CapabilityKind;
use crate::utils::validation::ConfigValidator;

use super::env::EnvConfig;

/// Orchestrator configuration
///
/// All thresholds are tunables with defaults; nothing in the planner or
/// orchestrator hard-codes them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub planner: PlannerConfig,
    pub weights: ConfidenceWeights,
    pub retry: RetryConfig,
    pub timeouts: TimeoutConfig,
    pub streaming: StreamingConfig,
    pub search: SearchConfig,
    pub llm: LlmSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub min_confidence: f64,
    pub success_rate_weight: f64,
    /// Success rate assumed for a tool without recorded invocations.
    pub default_success_rate: f64,
    pub can_handle_budget_ms: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.1,
            success_rate_weight: 0.1,
            default_success_rate: 0.5,
            can_handle_budget_ms: 5,
        }
    }
}

/// Importance of each capability kind in `overall_confidence`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    pub search: f64,
    pub analyze: f64,
    pub synthesize: f64,
    pub validate: f64,
    pub custom: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            search: 0.3,
            analyze: 0.2,
            synthesize: 0.3,
            validate: 0.2,
            custom: 0.1,
        }
    }
}

impl ConfidenceWeights {
    pub fn weight_for(&self, kind: &CapabilityKind) -> f64 {
        match kind {
            CapabilityKind::Search => self.search,
            CapabilityKind::Analyze => self.analyze,
            CapabilityKind::Synthesize => self.synthesize,
            CapabilityKind::Validate => self.validate,
            CapabilityKind::Custom(_) => self.custom,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub tool: RetryPolicy,
    pub generation: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            tool: RetryPolicy::tool_default(),
            generation: RetryPolicy::generation_default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub tool_timeout_ms: u64,
    pub workflow_deadline_ms: u64,
    pub first_token_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            tool_timeout_ms: 15_000,
            workflow_deadline_ms: 60_000,
            first_token_timeout_ms: 30_000,
        }
    }
}

impl TimeoutConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    pub fn workflow_deadline(&self) -> Duration {
        Duration::from_millis(self.workflow_deadline_ms)
    }

    pub fn first_token_timeout(&self) -> Duration {
        Duration::from_millis(self.first_token_timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Content fragments shorter than this are merged; 0 disables batching.
    pub min_chunk_chars: usize,
    pub event_buffer: usize,
    pub progress_for_all_tools: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            min_chunk_chars: 0,
            event_buffer: 64,
            progress_for_all_tools: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_results: usize,
    pub max_snippet_chars: usize,
    pub timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 5,
            max_snippet_chars: 500,
            timeout_ms: 8_000,
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub system_prompt: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub endpoint: Option<String>,
    /// Literal key or `${ENV_VAR}` reference.
    pub api_key: Option<String>,
    pub history_limit: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            system_prompt: None,
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            endpoint: None,
            api_key: None,
            history_limit: 20,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| ToolFlowError::Configuration(format!("malformed config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ToolFlowError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "loading orchestrator config");
        Self::from_json_str(&raw)
    }

    /// Overrides selected fields from `TOOLFLOW_*` environment variables.
    pub fn apply_env_overrides(mut self) -> Result<Self> {
        if let Some(value) = EnvConfig::parse_optional::<f64>("TOOLFLOW_MIN_CONFIDENCE")? {
            self.planner.min_confidence = value;
        }
        if let Some(value) = EnvConfig::parse_optional::<u64>("TOOLFLOW_WORKFLOW_DEADLINE_MS")? {
            self.timeouts.workflow_deadline_ms = value;
        }
        if let Some(value) = EnvConfig::parse_optional::<usize>("TOOLFLOW_MIN_CHUNK_CHARS")? {
            self.streaming.min_chunk_chars = value;
        }
        if let Some(model) = EnvConfig::get_env_optional("TOOLFLOW_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(endpoint) = EnvConfig::get_env_optional("TOOLFLOW_LLM_ENDPOINT") {
            self.llm.endpoint = Some(endpoint);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        ConfigValidator::validate_unit_interval("planner.min_confidence", self.planner.min_confidence)?;
        ConfigValidator::validate_unit_interval(
            "planner.default_success_rate",
            self.planner.default_success_rate,
        )?;
        ConfigValidator::validate_non_negative(
            "planner.success_rate_weight",
            self.planner.success_rate_weight,
        )?;
        for (name, weight) in [
            ("weights.search", self.weights.search),
            ("weights.analyze", self.weights.analyze),
            ("weights.synthesize", self.weights.synthesize),
            ("weights.validate", self.weights.validate),
            ("weights.custom", self.weights.custom),
        ] {
            ConfigValidator::validate_non_negative(name, weight)?;
        }
        ConfigValidator::validate_retry("retry.tool", &self.retry.tool)?;
        ConfigValidator::validate_retry("retry.generation", &self.retry.generation)?;
        if self.streaming.event_buffer == 0 {
            return Err(ToolFlowError::Configuration(
                "streaming.event_buffer must be at least 1".into(),
            ));
        }
        if self.timeouts.workflow_deadline_ms == 0 || self.timeouts.tool_timeout_ms == 0 {
            return Err(ToolFlowError::Configuration(
                "timeouts must be greater than zero".into(),
            ));
        }
        if self.search.max_results == 0 {
            return Err(ToolFlowError::Configuration(
                "search.max_results must be at least 1".into(),
            ));
        }
        if let Some(endpoint) = &self.llm.endpoint {
            ConfigValidator::validate_url(endpoint)?;
        }
        Ok(())
    }
}
