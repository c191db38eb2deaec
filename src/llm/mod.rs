//! Language-model capability used by the generation step.

pub mod client;
pub mod echo;
pub mod http;
pub mod prompt;
pub mod scripted;
pub mod types;

pub use client::{DynLlmClient, LlmClient, LlmStream};
pub use echo::LocalEchoClient;
pub use prompt::PromptBuilder;
pub use scripted::ScriptedLlmClient;
pub use types::{segment, LlmMessage, LlmRequest, LlmResponse, LlmStreamChunk};

#[cfg(feature = "http-client")]
pub use http::{GenericHttpClient, SseParser};
