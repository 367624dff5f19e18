use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::heuristic::contains_term;
use super::types::{AdaptivePattern, SourceScore};

/// One adaptive pattern that overlapped with the text
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PatternMatch {
    pub pattern_id: String,
    pub match_score: f64,
    pub keywords_matched: usize,
    pub success_rate: f64,
    pub usage_count: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PatternResult {
    pub confidence: f64,
    pub matched: Vec<PatternMatch>,
    pub best: Option<PatternMatch>,
    pub total_checked: usize,
}

impl PatternResult {
    /// The pattern signal feeds fusion with its confidence as risk
    pub fn source_score(&self) -> SourceScore {
        SourceScore::new(self.confidence, self.confidence)
    }
}

/// Lowercased whitespace tokens with surrounding punctuation stripped
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Score text by keyword overlap with every stored pattern
pub fn match_patterns(patterns: &BTreeMap<String, AdaptivePattern>, text: &str) -> PatternResult {
    let lower = text.to_lowercase();
    let mut matched: Vec<PatternMatch> = Vec::new();
    let mut total = 0.0;

    for pattern in patterns.values() {
        if pattern.keywords.is_empty() {
            continue;
        }

        let hits = pattern
            .keywords
            .iter()
            .filter(|k| contains_term(&lower, k))
            .count();
        if hits == 0 {
            continue;
        }

        let match_score = hits as f64 / pattern.keywords.len() as f64 * pattern.success_rate;
        total += match_score;
        matched.push(PatternMatch {
            pattern_id: pattern.pattern_id.clone(),
            match_score,
            keywords_matched: hits,
            success_rate: pattern.success_rate,
            usage_count: pattern.usage_count,
        });
    }

    // First maximum wins on ties
    let mut best: Option<&PatternMatch> = None;
    for m in &matched {
        if best.is_none_or(|b| m.match_score > b.match_score) {
            best = Some(m);
        }
    }
    let best = best.cloned();

    PatternResult {
        confidence: f64::min(total, 1.0).max(0.0),
        matched,
        best,
        total_checked: patterns.len(),
    }
}

/// Increment usage counts of the patterns that matched
pub fn record_usage(patterns: &mut BTreeMap<String, AdaptivePattern>, result: &PatternResult) {
    for m in &result.matched {
        if let Some(pattern) = patterns.get_mut(&m.pattern_id) {
            pattern.usage_count += 1;
        }
    }
}

/// Most frequent words across `texts` that occur at least `min_freq` times.
/// Ties keep first-seen order.
pub fn mine_keywords<'a>(
    texts: impl IntoIterator<Item = &'a str>,
    limit: usize,
    min_freq: usize,
) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut order = 0;

    for text in texts {
        for word in tokenize(text) {
            let entry = counts.entry(word).or_insert((0, order));
            entry.0 += 1;
            order += 1;
        }
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked
        .into_iter()
        .take(limit)
        .filter(|(_, count, _)| *count >= min_freq)
        .map(|(word, _, _)| word)
        .collect()
}

/// `learned_pattern_{n}_{YYYYMMDD}`, bumping `n` past any existing id
pub fn next_pattern_id(patterns: &BTreeMap<String, AdaptivePattern>, now: DateTime<Utc>) -> String {
    let date = now.format("%Y%m%d");
    let mut n = patterns.len() + 1;
    loop {
        let id = format!("learned_pattern_{}_{}", n, date);
        if !patterns.contains_key(&id) {
            return id;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(id: &str, keywords: &[&str], success_rate: f64) -> AdaptivePattern {
        AdaptivePattern {
            pattern_id: id.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            cultural_context: vec![],
            success_rate,
            usage_count: 0,
            last_updated: Utc::now(),
            examples: vec![],
        }
    }

    fn table(patterns: Vec<AdaptivePattern>) -> BTreeMap<String, AdaptivePattern> {
        patterns
            .into_iter()
            .map(|p| (p.pattern_id.clone(), p))
            .collect()
    }

    #[test]
    fn test_overlap_times_success_rate() {
        let patterns = table(vec![pattern("p1", &["gift", "card", "urgent", "boss"], 0.8)]);
        let result = match_patterns(&patterns, "Buy a gift card, it is urgent");
        assert_eq!(result.matched.len(), 1);
        assert!((result.confidence - 0.6).abs() < 1e-9);
        assert_eq!(result.best.unwrap().keywords_matched, 3);
    }

    #[test]
    fn test_confidence_capped_and_best_pattern() {
        let patterns = table(vec![
            pattern("a", &["refund"], 0.9),
            pattern("b", &["refund", "tax"], 0.9),
            pattern("c", &["tax"], 0.7),
        ]);
        let result = match_patterns(&patterns, "tax refund waiting");
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.best.unwrap().pattern_id, "a");
        assert_eq!(result.total_checked, 3);
    }

    #[test]
    fn test_no_match() {
        let patterns = table(vec![pattern("a", &["refund"], 0.9)]);
        let result = match_patterns(&patterns, "hello there");
        assert_eq!(result.confidence, 0.0);
        assert!(result.best.is_none());
    }

    #[test]
    fn test_record_usage() {
        let mut patterns = table(vec![pattern("a", &["refund"], 0.9), pattern("b", &["x"], 0.9)]);
        let result = match_patterns(&patterns, "refund");
        record_usage(&mut patterns, &result);
        assert_eq!(patterns["a"].usage_count, 1);
        assert_eq!(patterns["b"].usage_count, 0);
    }

    #[test]
    fn test_mine_keywords_frequency_and_threshold() {
        let texts = [
            "send the gift card code",
            "gift card code now please",
            "the gift card is needed",
        ];
        let keywords = mine_keywords(texts, 10, 2);
        // "the" and "code" both occur twice; "the" was seen first
        assert_eq!(keywords, vec!["gift", "card", "the", "code"]);
        assert!(!keywords.contains(&"send".to_string()));
    }

    #[test]
    fn test_tokenize_strips_punctuation() {
        assert_eq!(tokenize("Hello, World! ok"), vec!["hello", "world", "ok"]);
    }

    #[test]
    fn test_next_pattern_id_skips_taken() {
        let now = Utc::now();
        let date = now.format("%Y%m%d").to_string();
        let taken = format!("learned_pattern_2_{}", date);
        let patterns = table(vec![pattern(&taken, &["x"], 0.7)]);
        assert_eq!(
            next_pattern_id(&patterns, now),
            format!("learned_pattern_3_{}", date)
        );
    }
}
