use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::state::TurnRole;
use crate::tools::{
    CapabilityKind, CapabilityTool, ToolContext, ToolDescriptor, ToolRequest, ToolResult,
};

use super::text;

const REFERRING_WORDS: &[&str] = &[
    "it", "that", "this", "they", "them", "those", "these", "he", "she", "its", "there",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Factual,
    HowTo,
    Explanation,
    Comparison,
    Open,
}

/// One clause of the query that needs its own answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubIntent {
    pub text: String,
    pub keywords: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub keywords: Vec<String>,
    pub complexity: Complexity,
    pub sentiment: Sentiment,
    pub question_type: QuestionType,
    pub sub_intents: Vec<SubIntent>,
    pub follow_up: bool,
    pub technical_terms: Vec<String>,
    pub word_count: usize,
}

impl QueryAnalysis {
    pub fn of(request: &ToolRequest) -> Self {
        let query = request.query();
        let lower = query.to_lowercase();
        let tokens = text::tokens(query);

        Self {
            keywords: text::top_keywords(query, 5),
            complexity: complexity(query),
            sentiment: sentiment(&tokens),
            question_type: question_type(&lower),
            sub_intents: sub_intents(query),
            follow_up: is_follow_up(request, &tokens),
            technical_terms: text::TECHNICAL_TERMS
                .iter()
                .filter(|term| tokens.iter().any(|t| t == *term))
                .map(|term| term.to_string())
                .collect(),
            word_count: query.split_whitespace().count(),
        }
    }

    /// Heuristic certainty: longer queries with clear keywords and intents
    /// analyse more reliably.
    pub fn certainty(&self) -> f64 {
        let mut certainty = 0.5 + 0.2 * (self.word_count as f64 / 8.0).min(1.0);
        if !self.keywords.is_empty() {
            certainty += 0.15;
        }
        if !self.sub_intents.is_empty() {
            certainty += 0.15;
        }
        certainty.min(1.0)
    }
}

fn complexity(query: &str) -> Complexity {
    let words: Vec<&str> = query.split_whitespace().collect();
    if words.is_empty() {
        return Complexity::Low;
    }
    let average = words.iter().map(|w| w.chars().count()).sum::<usize>() as f64 / words.len() as f64;
    if average > 6.0 || words.len() > 30 {
        Complexity::High
    } else if average > 4.5 || words.len() > 12 {
        Complexity::Medium
    } else {
        Complexity::Low
    }
}

fn sentiment(tokens: &[String]) -> Sentiment {
    let count = |words: &[&str]| tokens.iter().filter(|t| words.contains(&t.as_str())).count();
    let positive = count(text::POSITIVE_WORDS);
    let negative = count(text::NEGATIVE_WORDS);
    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => Sentiment::Positive,
        std::cmp::Ordering::Less => Sentiment::Negative,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    }
}

fn question_type(lower: &str) -> QuestionType {
    let first = lower.split_whitespace().next().unwrap_or_default();
    if lower.contains(" vs ")
        || lower.contains("versus")
        || lower.contains("compare")
        || lower.contains("difference between")
    {
        QuestionType::Comparison
    } else if first == "how" {
        QuestionType::HowTo
    } else if first == "why" {
        QuestionType::Explanation
    } else if matches!(first, "what" | "who" | "when" | "where" | "which" | "is" | "are") {
        QuestionType::Factual
    } else {
        QuestionType::Open
    }
}

/// Clauses split on `?`, `;`, newlines and " and also ", keeping only
/// clauses that carry at least one keyword.
pub fn sub_intents(query: &str) -> Vec<SubIntent> {
    query
        .split(['?', ';', '\n'])
        .flat_map(|part| part.split(" and also "))
        .filter_map(|clause| {
            let clause = clause.trim().trim_end_matches(['.', '!']);
            let keywords = text::keywords(clause);
            (!keywords.is_empty()).then(|| SubIntent {
                text: clause.to_string(),
                keywords,
            })
        })
        .collect()
}

fn is_follow_up(request: &ToolRequest, tokens: &[String]) -> bool {
    let has_history = request
        .context()
        .iter()
        .any(|turn| turn.role == TurnRole::Assistant);
    has_history
        && tokens.len() < 12
        && tokens.iter().any(|t| REFERRING_WORDS.contains(&t.as_str()))
}

/// Deterministic query analysis; never calls out and never fails.
pub struct AnalyzeTool {
    descriptor: ToolDescriptor,
}

impl AnalyzeTool {
    pub const NAME: &'static str = "query_analyzer";

    pub fn new() -> Self {
        Self::named(Self::NAME)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            descriptor: ToolDescriptor::builder(name, CapabilityKind::Analyze)
                .description("Extracts keywords, complexity, sentiment and sub-intents from the query")
                .build(),
        }
    }
}

impl Default for AnalyzeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityTool for AnalyzeTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn can_handle(&self, request: &ToolRequest) -> f64 {
        if request.query().trim().is_empty() {
            0.0
        } else {
            0.9
        }
    }

    async fn execute(&self, request: &ToolRequest, _ctx: &ToolContext) -> Result<ToolResult> {
        let started = Instant::now();
        let analysis = QueryAnalysis::of(request);
        let certainty = analysis.certainty();
        Ok(
            ToolResult::success(&self.descriptor, certainty, serde_json::to_value(analysis)?)
                .with_latency(started.elapsed()),
        )
    }
}
