pub mod config;
pub mod error;
pub mod llm;
pub mod planner;
pub mod runtime;
pub mod search;
pub mod state;
pub mod stream;
pub mod tools;
pub mod utils;

pub use config::{EnvConfig, OrchestratorConfig};
pub use error::{ErrorKind, Result, ToolFlowError};
pub use llm::{DynLlmClient, LlmClient, LlmRequest, LlmResponse, LocalEchoClient, ScriptedLlmClient};
#[cfg(feature = "http-client")]
pub use llm::GenericHttpClient;
pub use planner::{ExecutionPlan, PlannedTool, WorkflowPlanner};
pub use runtime::{
    Orchestrator, OrchestratorStatistics, WorkflowExecution, WorkflowObserver, WorkflowOutcome,
    WorkflowStatus,
};
#[cfg(feature = "http-client")]
pub use search::HttpSearchClient;
pub use search::{DynSearchClient, SearchHit, StaticSearchClient, WebSearchClient};
#[cfg(feature = "redis-store")]
pub use state::RedisConversationStore;
pub use state::{ConversationStore, ConversationTurn, MemoryConversationStore, TurnRole};
pub use stream::{ResponseStream, StreamEvent, StreamingResponder, ToolPhase};
pub use tools::{
    builtin::{builtin_registry, register_builtin_tools},
    CapabilityKind, CapabilityTool, ToolContext, ToolDescriptor, ToolRegistry, ToolRequest,
    ToolResult,
};
pub use utils::{logging, validation};
