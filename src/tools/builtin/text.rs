//! Deterministic text heuristics shared by the builtin tools.

use std::collections::{BTreeSet, HashMap, HashSet};

use once_cell::sync::Lazy;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "could", "did", "do",
        "does", "for", "from", "had", "has", "have", "how", "i", "in", "is", "it", "its", "me",
        "my", "of", "on", "or", "our", "please", "should", "so", "tell", "than", "that", "the",
        "their", "them", "then", "there", "these", "they", "this", "those", "to", "was", "we",
        "were", "what", "when", "where", "which", "who", "whom", "why", "will", "with", "would",
        "you", "your", "about", "also", "into", "just", "some", "any", "been", "being", "more",
        "most", "much", "very", "not",
    ]
    .into_iter()
    .collect()
});

/// Pairs of words that contradict each other when two sources use them
/// about the same topic.
pub(crate) const ANTONYMS: &[(&str, &str)] = &[
    ("yes", "no"),
    ("true", "false"),
    ("increase", "decrease"),
    ("increased", "decreased"),
    ("increasing", "decreasing"),
    ("rise", "fall"),
    ("higher", "lower"),
    ("positive", "negative"),
    ("safe", "unsafe"),
    ("legal", "illegal"),
    ("open", "closed"),
];

pub(crate) const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "amazing", "helpful", "useful", "love", "best",
];

pub(crate) const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "awful", "useless", "poor", "disappointing", "hate", "worst", "broken",
];

pub(crate) const TECHNICAL_TERMS: &[&str] = &[
    "algorithm", "database", "api", "framework", "optimization", "implementation",
    "architecture", "methodology", "paradigm", "protocol", "interface", "configuration",
    "deployment", "compiler", "runtime", "kernel", "latency", "concurrency",
];

pub(crate) const ABSOLUTE_WORDS: &[&str] = &[
    "always", "never", "everyone", "nobody", "all", "none", "guaranteed", "impossible",
];

/// Lowercased alphanumeric tokens. Decimal points inside numbers are kept.
pub(crate) fn tokens(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = text.chars().collect();
    for (i, &ch) in chars.iter().enumerate() {
        let inside_number = ch == '.'
            && current.chars().last().is_some_and(|c| c.is_ascii_digit())
            && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit());
        if ch.is_alphanumeric() || inside_number {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

pub(crate) fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(word)
}

fn is_number(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
        && token.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// Content words in first-occurrence order, without duplicates.
pub(crate) fn keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens(text)
        .into_iter()
        .filter(|t| t.chars().count() > 2 && !is_stopword(t) && !is_number(t))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

pub(crate) fn keyword_set(text: &str) -> BTreeSet<String> {
    keywords(text).into_iter().collect()
}

/// Most frequent content words; ties keep first-occurrence order.
pub(crate) fn top_keywords(text: &str, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (position, token) in tokens(text).into_iter().enumerate() {
        if token.chars().count() <= 2 || is_stopword(&token) || is_number(&token) {
            continue;
        }
        counts.entry(token).or_insert((0, position)).0 += 1;
    }
    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked.into_iter().take(limit).map(|(word, _)| word).collect()
}

pub(crate) fn numbers(text: &str) -> BTreeSet<String> {
    tokens(text).into_iter().filter(|t| is_number(t)).collect()
}

/// Splits on `.`, `!`, `?` followed by whitespace (or end of text) and on
/// newlines, so decimals such as `3.5` stay inside their sentence.
pub(crate) fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\n' {
            push_sentence(&mut out, &mut current);
            continue;
        }
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') && chars.peek().map_or(true, |next| next.is_whitespace()) {
            push_sentence(&mut out, &mut current);
        }
    }
    push_sentence(&mut out, &mut current);
    out
}

fn push_sentence(out: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    current.clear();
}

pub(crate) fn contains_word(text: &str, word: &str) -> bool {
    tokens(text).iter().any(|t| t == word)
}

/// Share of `terms` present in `text`.
pub(crate) fn term_coverage(terms: &[String], text: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let present: HashSet<String> = tokens(text).into_iter().collect();
    let hits = terms.iter().filter(|t| present.contains(t.as_str())).count();
    hits as f64 / terms.len() as f64
}

pub(crate) fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", text[..idx].trim_end()),
        None => text.to_string(),
    }
}
