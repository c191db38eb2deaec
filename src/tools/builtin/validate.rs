use std::collections::BTreeSet;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tools::{
    CapabilityKind, CapabilityTool, ToolContext, ToolDescriptor, ToolRequest, ToolResult,
};

use super::analyze::{self, QueryAnalysis, SubIntent};
use super::search::SearchOutput;
use super::synthesize::SynthesisOutput;
use super::text;

const MAX_FLAGS: usize = 5;

/// Quality assessment of a context or draft answer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub score: f64,
    pub completeness: f64,
    pub consistency: f64,
    pub support: f64,
    pub unaddressed_intents: Vec<String>,
    pub unsupported_statements: Vec<String>,
    pub absolute_claims: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub degraded: bool,
}

struct Statement {
    text: String,
    keywords: BTreeSet<String>,
}

fn statements(body: &str) -> Vec<Statement> {
    text::sentences(body)
        .into_iter()
        .filter(|s| s.split_whitespace().count() >= 3)
        .map(|s| Statement {
            keywords: text::keyword_set(&s),
            text: s,
        })
        .collect()
}

/// A statement is corroborated by a source sharing two of its keywords, or
/// its only keyword when it has just one.
fn corroborates(statement: &Statement, source: &BTreeSet<String>) -> bool {
    let needed = statement.keywords.len().min(2);
    needed > 0 && statement.keywords.intersection(source).count() >= needed
}

fn completeness(body: &str, intents: &[SubIntent]) -> (f64, Vec<String>) {
    if intents.is_empty() {
        return (1.0, Vec::new());
    }
    let present: BTreeSet<String> = text::tokens(body).into_iter().collect();
    let unaddressed: Vec<String> = intents
        .iter()
        .filter(|intent| {
            let hits = intent
                .keywords
                .iter()
                .filter(|k| present.contains(k.as_str()))
                .count();
            hits * 2 < intent.keywords.len() || hits == 0
        })
        .map(|intent| intent.text.clone())
        .collect();
    let ratio = 1.0 - unaddressed.len() as f64 / intents.len() as f64;
    (ratio, unaddressed)
}

fn absolute_claims(body: &str) -> Vec<String> {
    text::sentences(body)
        .into_iter()
        .filter(|s| text::ABSOLUTE_WORDS.iter().any(|w| text::contains_word(s, w)))
        .take(MAX_FLAGS)
        .collect()
}

fn build_report(
    completeness: (f64, Vec<String>),
    conflicts: usize,
    support: f64,
    unsupported: Vec<String>,
    absolute: Vec<String>,
) -> QualityReport {
    let (completeness, unaddressed) = completeness;
    let consistency = (1.0 - 0.2 * conflicts as f64).max(0.0);
    let score = 0.4 * completeness + 0.3 * consistency + 0.3 * support;

    let mut recommendations = Vec::new();
    if let Some(first) = unaddressed.first() {
        recommendations.push(format!("address the unanswered part: {first}"));
    }
    if support < 0.5 {
        recommendations.push("add corroborating sources".to_string());
    }
    if conflicts > 0 {
        recommendations.push("resolve conflicting statements between sources".to_string());
    }
    if !absolute.is_empty() {
        recommendations.push("qualify absolute claims".to_string());
    }

    QualityReport {
        score: score.clamp(0.0, 1.0),
        completeness,
        consistency,
        support,
        unaddressed_intents: unaddressed,
        unsupported_statements: unsupported,
        absolute_claims: absolute,
        recommendations,
        degraded: false,
    }
}

/// Scores a draft answer against the query's sub-intents and the source
/// texts that were available to write it.
pub fn assess_draft(
    draft: &str,
    intents: &[SubIntent],
    sources: &[String],
    conflicts: usize,
) -> QualityReport {
    let source_sets: Vec<BTreeSet<String>> = sources.iter().map(|s| text::keyword_set(s)).collect();
    let statements = statements(draft);
    let unsupported: Vec<String> = statements
        .iter()
        .filter(|st| !source_sets.iter().any(|src| corroborates(st, src)))
        .map(|st| st.text.clone())
        .collect();
    let support = if statements.is_empty() {
        1.0
    } else {
        1.0 - unsupported.len() as f64 / statements.len() as f64
    };

    build_report(
        completeness(draft, intents),
        conflicts,
        support,
        unsupported.into_iter().take(MAX_FLAGS).collect(),
        absolute_claims(draft),
    )
}

/// Scores a merged context: each source's statements need corroboration
/// from some other source.
fn assess_context(synthesis: &SynthesisOutput, intents: &[SubIntent]) -> QualityReport {
    let source_sets: Vec<BTreeSet<String>> = synthesis
        .sources
        .iter()
        .map(|s| text::keyword_set(&s.text))
        .collect();
    let mut total = 0usize;
    let mut unsupported = Vec::new();
    for (idx, source) in synthesis.sources.iter().enumerate() {
        for statement in statements(&source.text) {
            total += 1;
            let backed = source_sets
                .iter()
                .enumerate()
                .any(|(other, set)| other != idx && corroborates(&statement, set));
            if !backed {
                unsupported.push(format!("[{}] {}", source.id, statement.text));
            }
        }
    }
    let support = if total == 0 {
        0.0
    } else {
        1.0 - unsupported.len() as f64 / total as f64
    };

    let body = synthesis
        .sources
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    build_report(
        completeness(&body, intents),
        synthesis.conflicts.len(),
        support,
        unsupported.into_iter().take(MAX_FLAGS).collect(),
        absolute_claims(&body),
    )
}

/// Source texts a draft may legitimately draw on.
pub fn source_texts(search: Option<&SearchOutput>, synthesis: Option<&SynthesisOutput>) -> Vec<String> {
    match (synthesis, search) {
        (Some(synthesis), _) => synthesis.sources.iter().map(|s| s.text.clone()).collect(),
        (None, Some(search)) => search
            .results
            .iter()
            .map(|hit| format!("{} {}", hit.title, hit.snippet))
            .collect(),
        (None, None) => Vec::new(),
    }
}

pub struct ValidateTool {
    descriptor: ToolDescriptor,
}

impl ValidateTool {
    pub const NAME: &'static str = "quality_validator";

    pub fn new() -> Self {
        Self::named(Self::NAME)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            descriptor: ToolDescriptor::builder(name, CapabilityKind::Validate)
                .description("Scores the synthesized context for completeness, consistency and support")
                .depends_on(CapabilityKind::Synthesize)
                .build(),
        }
    }
}

impl Default for ValidateTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityTool for ValidateTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn can_handle(&self, request: &ToolRequest) -> f64 {
        if request.query().trim().is_empty() {
            0.0
        } else {
            0.7
        }
    }

    async fn execute(&self, request: &ToolRequest, ctx: &ToolContext) -> Result<ToolResult> {
        let started = Instant::now();
        let intents = match ctx.typed_input::<QueryAnalysis>(&CapabilityKind::Analyze) {
            Some(analysis) => analysis.sub_intents,
            None => analyze::sub_intents(request.query()),
        };
        let synthesis = ctx.typed_input::<SynthesisOutput>(&CapabilityKind::Synthesize);

        let (report, confidence) = match synthesis {
            Some(synthesis) => {
                let report = assess_context(&synthesis, &intents);
                let confidence = report.score;
                (report, confidence)
            }
            None => {
                // nothing merged upstream: judge the bare query at half weight
                let mut report = assess_draft(request.query(), &intents, &[], 0);
                report.degraded = true;
                let confidence = report.score * 0.5;
                (report, confidence)
            }
        };

        Ok(
            ToolResult::success(&self.descriptor, confidence, serde_json::to_value(report)?)
                .with_latency(started.elapsed()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intents(query: &str) -> Vec<SubIntent> {
        analyze::sub_intents(query)
    }

    #[test]
    fn grounded_complete_answer_scores_high() {
        let sources = vec!["Paris is the capital of France.".to_string()];
        let report = assess_draft(
            "The capital of France is Paris.",
            &intents("What is the capital of France?"),
            &sources,
            0,
        );
        assert_eq!(report.completeness, 1.0);
        assert_eq!(report.support, 1.0);
        assert!((report.score - 1.0).abs() < 1e-9);
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn unsupported_and_absolute_claims_are_flagged() {
        let sources = vec!["Paris is the capital of France.".to_string()];
        let report = assess_draft(
            "Paris is the capital of France. Tourists always love the food there.",
            &intents("What is the capital of France?"),
            &sources,
            0,
        );
        assert_eq!(
            report.unsupported_statements,
            vec!["Tourists always love the food there."]
        );
        assert_eq!(report.support, 0.5);
        assert_eq!(report.absolute_claims.len(), 1);
    }

    #[test]
    fn missing_intents_reduce_completeness() {
        let report = assess_draft(
            "Tokio is an async runtime for Rust.",
            &intents("What is tokio? How does work stealing scheduling behave?"),
            &[],
            1,
        );
        assert_eq!(report.completeness, 0.5);
        assert!((report.consistency - 0.8).abs() < 1e-9);
        assert_eq!(report.unaddressed_intents.len(), 1);
    }

    #[tokio::test]
    async fn degrades_without_synthesis() -> Result<()> {
        let result = ValidateTool::new()
            .execute(
                &ToolRequest::new("What is the capital of France?"),
                &ToolContext::default().with_missing(CapabilityKind::Synthesize),
            )
            .await?;
        let report: QualityReport = result.decode()?;
        assert!(result.success);
        assert!(report.degraded);
        assert!(result.confidence <= 0.5);
        Ok(())
    }
}
