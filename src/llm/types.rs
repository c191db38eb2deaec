use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::state::ConversationTurn;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl From<&ConversationTurn> for LlmMessage {
    fn from(turn: &ConversationTurn) -> Self {
        Self {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    #[serde(default)]
    pub system: Option<String>,
    pub user: String,
    /// Prior turns, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<LlmMessage>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

fn default_temperature() -> f32 {
    0.7
}

impl LlmRequest {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
            history: Vec::new(),
            temperature: default_temperature(),
            max_tokens: None,
            metadata: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LlmStreamChunk {
    pub content: String,
    pub done: bool,
}

impl LlmStreamChunk {
    pub fn delta(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            done: false,
        }
    }

    pub fn done() -> Self {
        Self {
            content: String::new(),
            done: true,
        }
    }
}

pub type LlmStream = Pin<Box<dyn Stream<Item = Result<LlmStreamChunk>> + Send>>;

/// Splits text into word segments, each carrying its trailing whitespace,
/// so concatenating the segments restores the text exactly.
pub fn segment(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_space = false;
    for ch in text.chars() {
        if in_space && !ch.is_whitespace() {
            segments.push(std::mem::take(&mut current));
            in_space = false;
        }
        if ch.is_whitespace() {
            in_space = true;
        }
        current.push(ch);
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_round_trip() {
        let text = "The capital  of France\nis Paris.";
        let parts = segment(text);
        assert_eq!(parts, vec!["The ", "capital  ", "of ", "France\n", "is ", "Paris."]);
        assert_eq!(parts.concat(), text);
        assert!(segment("").is_empty());
    }
}
