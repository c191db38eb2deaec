use std::fmt::Write as _;

use crate::config::LlmSettings;
use crate::tools::builtin::{SearchOutput, SynthesisOutput};
use crate::tools::ToolRequest;

use super::types::{LlmMessage, LlmRequest};

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Answer the user's question accurately and concisely.";

const GROUNDING_INSTRUCTIONS: &str = "Use the context below to answer the user's question. \
Cite sources by their bracketed number, for example [1]. If the context does not contain \
the answer, say so and answer from general knowledge.";

/// Builds the generation request from the user query, prior turns and the
/// grounding produced by the tools.
pub struct PromptBuilder {
    settings: LlmSettings,
}

impl PromptBuilder {
    pub fn new(settings: LlmSettings) -> Self {
        Self { settings }
    }

    pub fn build(&self, request: &ToolRequest, grounding: Option<&str>) -> LlmRequest {
        let base = self
            .settings
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        let system = match grounding {
            Some(context) if !context.trim().is_empty() => {
                format!("{base}\n\n{GROUNDING_INSTRUCTIONS}\n\nContext:\n{context}")
            }
            _ => base.to_string(),
        };

        let turns = request.context();
        let skip = turns.len().saturating_sub(self.settings.history_limit);
        LlmRequest {
            system: Some(system),
            user: request.query().to_string(),
            history: turns[skip..].iter().map(LlmMessage::from).collect(),
            temperature: self.settings.temperature,
            max_tokens: Some(self.settings.max_tokens),
            metadata: None,
        }
    }
}

/// Grounding text for generation: the synthesized context when available,
/// otherwise the raw search results.
pub fn grounding(
    synthesis: Option<&SynthesisOutput>,
    search: Option<&SearchOutput>,
) -> Option<String> {
    if let Some(synthesis) = synthesis {
        return Some(synthesis.context.clone());
    }
    let search = search.filter(|s| !s.results.is_empty())?;
    let mut context = String::new();
    for (idx, hit) in search.results.iter().enumerate() {
        let _ = writeln!(context, "[{}] {}: {} ({})", idx + 1, hit.title, hit.snippet, hit.url);
    }
    Some(context.trim_end().to_string())
}
