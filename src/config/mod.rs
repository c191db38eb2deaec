pub mod env;
pub mod orchestrator;

pub use env::EnvConfig;
pub use orchestrator::{
    ConfidenceWeights, LlmSettings, OrchestratorConfig, PlannerConfig, RetryConfig, SearchConfig,
    StreamingConfig, TimeoutConfig,
};
