//! Few-shot retrieval scorer.
//!
//! Picks the pool examples that share the most words with a transcript,
//! embeds them in a prompt and asks the model backend for a structured
//! verdict. Replies that cannot be parsed fall back to a keyword guess.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::backend::{call_with_timeout, ScoringBackend};
use super::error::{BackendError, ParseError};
use super::patterns::tokenize;
use super::pool::ExamplePool;
use super::types::{AnalysisContext, FewShotEntry, PoolCategory, SourceScore};

/// A pool entry selected for a prompt, with its relevance
#[derive(Clone, Debug)]
pub struct ScoredExample {
    pub category: PoolCategory,
    pub entry: FewShotEntry,
    pub relevance: f64,
}

/// Verdict of the few-shot scorer
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FewShotScore {
    pub risk: f64,
    pub confidence: f64,
    pub classification: String,
    pub rationale: String,
    pub similar_examples: Vec<String>,
    pub key_patterns: Vec<String>,
    pub examples_used: usize,
}

impl FewShotScore {
    /// No qualifying examples: neutral risk, zero confidence
    pub fn empty() -> Self {
        Self {
            risk: 0.5,
            confidence: 0.0,
            classification: "uncertain".to_string(),
            rationale: String::new(),
            similar_examples: vec![],
            key_patterns: vec![],
            examples_used: 0,
        }
    }

    pub fn source_score(&self) -> SourceScore {
        SourceScore::new(self.risk, self.confidence)
    }
}

/// Every field may be missing or null; defaults are filled in by `parse_reply`
#[derive(Deserialize)]
struct FewShotReply {
    #[serde(default)]
    risk_score: Option<f64>,
    #[serde(default)]
    classification: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    similar_examples: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    key_patterns: Option<Vec<Option<String>>>,
}

/// Word-overlap relevance normalised by the larger word set
pub fn relevance(text_words: &HashSet<String>, example_words: &HashSet<String>) -> f64 {
    let denominator = text_words.len().max(example_words.len());
    if denominator == 0 {
        return 0.0;
    }
    text_words.intersection(example_words).count() as f64 / denominator as f64
}

/// Pool examples with relevance above `min_relevance`, best first
pub fn select_examples(
    pool: &ExamplePool,
    text: &str,
    min_relevance: f64,
    max_examples: usize,
) -> Vec<ScoredExample> {
    if pool.is_empty() {
        return Vec::new();
    }
    let text_words: HashSet<String> = tokenize(text).into_iter().collect();

    let mut selected: Vec<ScoredExample> = pool
        .iter()
        .filter_map(|(category, entry)| {
            let example_words: HashSet<String> = tokenize(&entry.text).into_iter().collect();
            let score = relevance(&text_words, &example_words);
            (score > min_relevance).then(|| ScoredExample {
                category,
                entry: entry.clone(),
                relevance: score,
            })
        })
        .collect();

    selected.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
    selected.truncate(max_examples);
    selected
}

pub fn build_prompt(text: &str, context: &AnalysisContext, examples: &[ScoredExample]) -> String {
    let mut prompt = String::from(
        "You are an expert in detecting phone fraud.\n\
         Use the labelled examples below to analyze a new call transcript.\n\n\
         ## Labelled examples:\n",
    );

    for (i, example) in examples.iter().enumerate() {
        prompt.push_str(&format!(
            "\nExample {}:\nText: \"{}\"\nLabel: {}\nConfidence: {:.2}\nRationale: {}\n---\n",
            i + 1,
            example.entry.text,
            example.entry.label.as_str(),
            example.entry.confidence,
            example.entry.rationale,
        ));
    }

    let call_context = context.to_prompt();
    if !call_context.is_empty() {
        prompt.push_str(&format!("\n## Call context:\n{}\n", call_context));
    }

    prompt.push_str(&format!(
        r#"

## Transcript to analyze:
"{}"

## Instructions:
Compare the transcript with the patterns in the examples and return ONLY valid JSON:
{{
  "risk_score": 0.0-1.0,
  "classification": "scam" or "legitimate",
  "confidence": 0.0-1.0,
  "reasoning": "why, mentioning similarities to the examples",
  "similar_examples": ["numbers of the similar examples"],
  "key_patterns": ["main patterns detected"]
}}
"#,
        text
    ));

    prompt
}

/// Parse a structured reply, tolerating prose or code fences around it
pub fn parse_reply(content: &str) -> Result<FewShotScore, ParseError> {
    let json = extract_json(content).ok_or(ParseError::NoJson)?;
    let reply: FewShotReply = serde_json::from_str(json)?;

    let similar_examples = reply
        .similar_examples
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| match v {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
        .collect();

    Ok(FewShotScore {
        risk: reply.risk_score.unwrap_or(0.5).clamp(0.0, 1.0),
        confidence: reply.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
        classification: reply
            .classification
            .unwrap_or_else(|| "uncertain".to_string()),
        rationale: reply.reasoning.unwrap_or_default(),
        similar_examples,
        key_patterns: reply
            .key_patterns
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .collect(),
        examples_used: 0,
    })
}

/// Crude keyword guess used when the reply is not valid JSON
pub fn fallback_from_text(content: &str) -> FewShotScore {
    let lower = content.to_lowercase();
    let (classification, risk) = if lower.contains("scam") {
        ("scam", 0.7)
    } else if lower.contains("legitimate") {
        ("legitimate", 0.3)
    } else {
        ("uncertain", 0.5)
    };

    FewShotScore {
        risk,
        confidence: 0.5,
        classification: classification.to_string(),
        rationale: "backend reply could not be parsed; keyword fallback used".to_string(),
        similar_examples: vec![],
        key_patterns: vec![],
        examples_used: 0,
    }
}

fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        if let Some(end) = find_matching_brace(trimmed) {
            return Some(&trimmed[..=end]);
        }
    }

    // Markdown code block
    if let Some(start) = trimmed.find("```json") {
        let body = &trimmed[start + 7..];
        if let Some(end) = body.find("```") {
            let inner = body[..end].trim();
            if !inner.is_empty() {
                return Some(inner);
            }
        }
    }

    let start = trimmed.find('{')?;
    find_matching_brace(&trimmed[start..]).map(|end| &trimmed[start..=start + end])
}

/// Byte offset of the brace closing the object that opens at offset 0
fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Scores a transcript against pre-selected examples through the backend
pub struct FewShotScorer {
    backend: Arc<dyn ScoringBackend>,
    timeout: Duration,
}

impl FewShotScorer {
    pub fn new(backend: Arc<dyn ScoringBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Never calls the backend when `examples` is empty.
    pub fn score(
        &self,
        text: &str,
        context: &AnalysisContext,
        examples: &[ScoredExample],
    ) -> Result<FewShotScore, BackendError> {
        if examples.is_empty() {
            return Ok(FewShotScore::empty());
        }

        let prompt = build_prompt(text, context, examples);
        let mut context = context.clone();
        context.analysis_type = Some("few_shot_learning".to_string());

        let reply = call_with_timeout(&self.backend, prompt, context, self.timeout)?;

        let mut score = match parse_reply(&reply.content) {
            Ok(score) => score,
            Err(e) => {
                log::warn!("Few-shot reply not parseable ({}), using keyword fallback", e);
                fallback_from_text(&reply.content)
            }
        };
        score.examples_used = examples.len();
        Ok(score)
    }
}
