use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::state::TurnRole;
use crate::tools::{
    CapabilityKind, CapabilityTool, ToolContext, ToolDescriptor, ToolError, ToolErrorKind,
    ToolRequest, ToolResult,
};

use super::analyze::QueryAnalysis;
use super::search::SearchOutput;
use super::text;

const EVIDENCE_WORDS: &[&str] = &[
    "study", "research", "data", "report", "official", "analysis", "survey", "census",
];
const MAX_CONFLICTS: usize = 5;
const MAX_CONVERSATION_SOURCES: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOrigin {
    Search,
    Conversation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: usize,
    pub origin: SourceOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub text: String,
    pub reliability: f64,
    pub relevance: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Antonym,
    Number,
}

/// Two sources that appear to disagree about the same topic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub sources: (usize, usize),
    pub kind: ConflictKind,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SynthesisOutput {
    pub context: String,
    pub sources: Vec<Source>,
    pub conflicts: Vec<Conflict>,
    pub reliability: f64,
    pub degraded: bool,
    pub missing: Vec<CapabilityKind>,
    pub key_topics: Vec<String>,
    pub gaps: Vec<String>,
}

pub struct SynthesizeTool {
    descriptor: ToolDescriptor,
}

impl SynthesizeTool {
    pub const NAME: &'static str = "context_synthesizer";

    pub fn new() -> Self {
        Self::named(Self::NAME)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            descriptor: ToolDescriptor::builder(name, CapabilityKind::Synthesize)
                .description("Merges search results and analysis into one attributed context")
                .depends_on(CapabilityKind::Search)
                .depends_on(CapabilityKind::Analyze)
                .build(),
        }
    }
}

impl Default for SynthesizeTool {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_sources(request: &ToolRequest, search: Option<&SearchOutput>) -> Vec<Source> {
    let terms = text::keywords(request.query());
    let mut sources = Vec::new();

    if let Some(search) = search {
        for hit in &search.results {
            let body = format!("{} {}", hit.title, hit.snippet);
            let mut reliability: f64 = 0.7;
            if hit.snippet.chars().count() > 100 {
                reliability += 0.1;
            }
            if EVIDENCE_WORDS.iter().any(|w| text::contains_word(&body, w)) {
                reliability += 0.2;
            }
            sources.push(Source {
                id: sources.len() + 1,
                origin: SourceOrigin::Search,
                title: Some(hit.title.clone()),
                url: Some(hit.url.clone()),
                text: hit.snippet.clone(),
                reliability: reliability.min(1.0),
                relevance: text::term_coverage(&terms, &body),
            });
        }
    }

    let earlier_answers = request
        .context()
        .iter()
        .rev()
        .filter(|turn| turn.role == TurnRole::Assistant)
        .filter(|turn| text::term_coverage(&terms, &turn.content) > 0.0)
        .take(MAX_CONVERSATION_SOURCES)
        .collect::<Vec<_>>();
    for turn in earlier_answers.into_iter().rev() {
        sources.push(Source {
            id: sources.len() + 1,
            origin: SourceOrigin::Conversation,
            title: None,
            url: None,
            text: turn.content.clone(),
            reliability: 0.4,
            relevance: text::term_coverage(&terms, &turn.content),
        });
    }

    sources
}

/// Pairwise contradiction check. Sources must share at least two keywords
/// to count as talking about the same thing.
pub(crate) fn detect_conflicts(sources: &[Source]) -> Vec<Conflict> {
    let keyword_sets: Vec<BTreeSet<String>> =
        sources.iter().map(|s| text::keyword_set(&s.text)).collect();
    let mut conflicts = Vec::new();

    for i in 0..sources.len() {
        for j in (i + 1)..sources.len() {
            if keyword_sets[i].intersection(&keyword_sets[j]).count() < 2 {
                continue;
            }
            let (a, b) = (&sources[i], &sources[j]);
            if let Some(conflict) = antonym_clash(a, b) {
                conflicts.push(conflict);
            }
            if let Some(conflict) = number_clash(a, b) {
                conflicts.push(conflict);
            }
            if conflicts.len() >= MAX_CONFLICTS {
                conflicts.truncate(MAX_CONFLICTS);
                return conflicts;
            }
        }
    }
    conflicts
}

fn antonym_clash(a: &Source, b: &Source) -> Option<Conflict> {
    fn has(tokens: &[String], word: &str) -> bool {
        tokens.iter().any(|t| t == word)
    }
    let (ta, tb) = (text::tokens(&a.text), text::tokens(&b.text));
    text::ANTONYMS.iter().find_map(|&(x, y)| {
        let clash = (has(&ta, x) && has(&tb, y)) || (has(&ta, y) && has(&tb, x));
        clash.then(|| Conflict {
            sources: (a.id, b.id),
            kind: ConflictKind::Antonym,
            detail: format!(
                "source {} and source {} disagree ('{}' vs '{}')",
                a.id, b.id, x, y
            ),
        })
    })
}

fn number_clash(a: &Source, b: &Source) -> Option<Conflict> {
    for sa in text::sentences(&a.text) {
        let (ka, na) = (text::keyword_set(&sa), text::numbers(&sa));
        if na.is_empty() {
            continue;
        }
        for sb in text::sentences(&b.text) {
            let nb = text::numbers(&sb);
            if nb.is_empty() || !na.is_disjoint(&nb) {
                continue;
            }
            let kb = text::keyword_set(&sb);
            let shared: Vec<&String> = ka.intersection(&kb).collect();
            if shared.len() >= 2 {
                return Some(Conflict {
                    sources: (a.id, b.id),
                    kind: ConflictKind::Number,
                    detail: format!(
                        "source {} says {} but source {} says {} about {}",
                        a.id,
                        join(&na),
                        b.id,
                        join(&nb),
                        shared
                            .iter()
                            .map(|s| s.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                });
            }
        }
    }
    None
}

fn join(set: &BTreeSet<String>) -> String {
    set.iter().cloned().collect::<Vec<_>>().join("/")
}

fn render_context(topics: &[String], sources: &[Source], conflicts: &[Conflict]) -> String {
    let mut context = String::new();
    if !topics.is_empty() {
        let _ = writeln!(context, "Key topics: {}", topics.join(", "));
    }
    if sources.is_empty() {
        context.push_str("No external sources available; answer from general knowledge.\n");
    } else {
        context.push_str("Sources:\n");
        for source in sources {
            match (&source.title, &source.url) {
                (Some(title), Some(url)) => {
                    let _ = writeln!(context, "[{}] {}: {} ({})", source.id, title, source.text, url);
                }
                _ => {
                    let _ = writeln!(context, "[{}] Earlier answer: {}", source.id, source.text);
                }
            }
        }
    }
    if !conflicts.is_empty() {
        context.push_str("Possible conflicts:\n");
        for conflict in conflicts {
            let _ = writeln!(context, "- {}", conflict.detail);
        }
    }
    context.trim_end().to_string()
}

fn information_gaps(terms: &[String], sources: &[Source]) -> Vec<String> {
    if sources.is_empty() {
        return Vec::new();
    }
    terms
        .iter()
        .filter(|term| !sources.iter().any(|s| text::contains_word(&s.text, term)))
        .map(|term| format!("no source mentions '{term}'"))
        .collect()
}

#[async_trait]
impl CapabilityTool for SynthesizeTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn can_handle(&self, request: &ToolRequest) -> f64 {
        if request.query().trim().is_empty() {
            0.0
        } else {
            0.8
        }
    }

    async fn execute(&self, request: &ToolRequest, ctx: &ToolContext) -> Result<ToolResult> {
        let started = Instant::now();
        let search = ctx.typed_input::<SearchOutput>(&CapabilityKind::Search);
        let analysis = ctx.typed_input::<QueryAnalysis>(&CapabilityKind::Analyze);

        let sources = collect_sources(request, search.as_ref());
        if sources.is_empty() && analysis.is_none() {
            return Ok(ToolResult::failure(
                &self.descriptor,
                ToolError::new(ToolErrorKind::MissingInput, "no upstream input to synthesize"),
            )
            .with_latency(started.elapsed()));
        }

        let conflicts = detect_conflicts(&sources);
        let mut missing = Vec::new();
        if search.is_none() {
            missing.push(CapabilityKind::Search);
        }
        if analysis.is_none() {
            missing.push(CapabilityKind::Analyze);
        }
        let degraded = !missing.is_empty();

        let base = if sources.is_empty() {
            0.3
        } else {
            sources.iter().map(|s| s.reliability).sum::<f64>() / sources.len() as f64
        };
        let mut reliability = base * (1.0 - 0.15 * conflicts.len() as f64).max(0.25);
        if missing.contains(&CapabilityKind::Search) {
            reliability *= 0.6;
        }
        if analysis.is_some() {
            reliability += 0.05;
        }
        let reliability = reliability.clamp(0.0, 1.0);

        let key_topics = match &analysis {
            Some(analysis) => analysis.keywords.clone(),
            None => text::top_keywords(request.query(), 5),
        };
        let gaps = information_gaps(&text::keywords(request.query()), &sources);
        let output = SynthesisOutput {
            context: render_context(&key_topics, &sources, &conflicts),
            sources,
            conflicts,
            reliability,
            degraded,
            missing,
            key_topics,
            gaps,
        };
        debug!(
            workflow_id = %ctx.workflow_id(),
            sources = output.sources.len(),
            conflicts = output.conflicts.len(),
            reliability,
            degraded,
            "context synthesized"
        );

        Ok(
            ToolResult::success(&self.descriptor, reliability, serde_json::to_value(output)?)
                .with_latency(started.elapsed()),
        )
    }
}
