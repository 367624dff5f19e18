use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::patterns::{mine_keywords, next_pattern_id};
use super::pool::{categorize, ExamplePool};
use super::types::{
    AccuracySnapshot, AdaptivePattern, EngineConfig, FewShotEntry, Label, LabeledExample,
    LearningStatus, PerformanceTracker, PoolCategory, UserFeedback,
};

const CONFIRMED_RATIONALE: &str = "real case confirmed by a user";

/// Mutable learning tables owned by one engine, guarded by one lock
#[derive(Clone, Debug)]
pub struct LearningState {
    /// Ordered learning log
    pub examples: Vec<LabeledExample>,
    /// Feedback submissions since the last learning cycle
    pub since_last_cycle: usize,
    pub patterns: BTreeMap<String, AdaptivePattern>,
    pub pool: ExamplePool,
    pub tracker: PerformanceTracker,
    /// Bumped on every commit; orders snapshots written to disk
    pub generation: u64,
}

impl LearningState {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            examples: Vec::new(),
            since_last_cycle: 0,
            patterns: BTreeMap::new(),
            pool: ExamplePool::seeded(config.pool_category_cap),
            tracker: PerformanceTracker::default(),
            generation: 0,
        }
    }

    /// Append feedback to the log. Returns true when a cycle is due.
    pub fn record_feedback(&mut self, example: LabeledExample, config: &EngineConfig) -> bool {
        self.examples.push(example);
        self.tracker.user_feedback_count += 1;
        self.since_last_cycle += 1;
        self.since_last_cycle >= config.learning_threshold.max(1)
    }

    pub fn status(&self, config: &EngineConfig) -> LearningStatus {
        LearningStatus {
            total_analyses: self.tracker.total_analyses,
            feedback_count: self.tracker.user_feedback_count,
            example_count: self.examples.len(),
            pattern_count: self.patterns.len(),
            pool_sizes_by_category: self.pool.sizes(),
            cycle_count: self.tracker.learning_cycles,
            latest_accuracy: self.tracker.latest_accuracy(),
            // A cycle runs inside the submission that reaches the threshold
            ready_for_next_cycle: self.since_last_cycle + 1 >= config.learning_threshold.max(1),
        }
    }
}

/// Everything one learning cycle will change, computed without mutating
#[derive(Clone, Debug)]
pub struct CyclePlan {
    pub new_pattern: Option<AdaptivePattern>,
    pub pool_additions: Vec<(PoolCategory, FewShotEntry)>,
    pub accuracy: Option<AccuracySnapshot>,
}

/// What a committed cycle did
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle_number: u64,
    pub new_pattern_id: Option<String>,
    pub pool_additions: usize,
    pub accuracy: f64,
    pub persisted: bool,
}

impl CyclePlan {
    /// Read-only pass over the learning log
    pub fn prepare(state: &LearningState, config: &EngineConfig, now: DateTime<Utc>) -> Self {
        Self {
            new_pattern: discover_pattern(state, config, now),
            pool_additions: select_pool_additions(state, config),
            accuracy: compute_accuracy(&state.examples, now),
        }
    }

    /// Apply the plan in one step. Infallible, so a cycle either lands
    /// completely or, if never committed, not at all.
    pub fn commit(self, state: &mut LearningState, config: &EngineConfig) -> CycleSummary {
        let new_pattern_id = self.new_pattern.map(|pattern| {
            let id = pattern.pattern_id.clone();
            log::info!(
                "New pattern discovered: {} - keywords: {:?}",
                id,
                pattern.keywords.iter().take(5).collect::<Vec<_>>()
            );
            state.patterns.insert(id.clone(), pattern);
            id
        });

        let mut pool_additions = 0;
        for (category, entry) in self.pool_additions {
            if state.pool.push(category, entry) {
                log::info!("Few-shot example added: {}", category.as_str());
                pool_additions += 1;
            }
        }

        let accuracy = match self.accuracy {
            Some(snapshot) => {
                let accuracy = snapshot.accuracy;
                log::info!(
                    "Current accuracy: {:.3} ({} examples)",
                    accuracy,
                    snapshot.total_examples
                );
                state.tracker.push_accuracy(snapshot, config.accuracy_window);
                accuracy
            }
            None => state.tracker.latest_accuracy(),
        };

        state.tracker.learning_cycles += 1;
        state.since_last_cycle = 0;
        state.generation += 1;

        CycleSummary {
            cycle_number: state.tracker.learning_cycles,
            new_pattern_id,
            pool_additions,
            accuracy,
            persisted: false,
        }
    }
}

/// Mine a keyword pattern from scam transcripts the engine got wrong
fn discover_pattern(
    state: &LearningState,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Option<AdaptivePattern> {
    let missed: Vec<&LabeledExample> = state
        .examples
        .iter()
        .filter(|e| e.user_feedback == UserFeedback::Wrong && e.actual_label == Label::Scam)
        .collect();

    if missed.len() < config.min_examples_for_pattern {
        log::debug!(
            "Skipping pattern discovery: {} misclassified scam example(s), need {}",
            missed.len(),
            config.min_examples_for_pattern
        );
        return None;
    }

    let keywords = mine_keywords(
        missed.iter().map(|e| e.text.as_str()),
        config.pattern_keyword_limit,
        2,
    );
    if keywords.is_empty() {
        return None;
    }

    let mut mined: Vec<&str> = keywords.iter().map(String::as_str).collect();
    mined.sort_unstable();
    if let Some(existing) = state.patterns.values().find(|p| {
        let mut known: Vec<&str> = p.keywords.iter().map(String::as_str).collect();
        known.sort_unstable();
        known == mined
    }) {
        log::debug!(
            "Skipping pattern discovery: keywords already covered by {}",
            existing.pattern_id
        );
        return None;
    }

    Some(AdaptivePattern {
        pattern_id: next_pattern_id(&state.patterns, now),
        keywords,
        cultural_context: vec![],
        success_rate: config.initial_pattern_success_rate,
        usage_count: 0,
        last_updated: now,
        examples: missed
            .iter()
            .take(config.pattern_example_limit)
            .map(|e| e.text.clone())
            .collect(),
    })
}

/// High-confidence confirmed examples the pool can still take
fn select_pool_additions(
    state: &LearningState,
    config: &EngineConfig,
) -> Vec<(PoolCategory, FewShotEntry)> {
    let mut pool = state.pool.clone();
    let mut additions = Vec::new();

    for example in state.examples.iter().filter(|e| {
        e.user_feedback == UserFeedback::Correct && e.confidence > config.pool_confidence_threshold
    }) {
        if additions.len() >= config.pool_additions_per_cycle {
            break;
        }
        let Some(category) = categorize(example) else {
            continue;
        };
        let entry = FewShotEntry {
            text: example.text.clone(),
            label: example.actual_label,
            rationale: CONFIRMED_RATIONALE.to_string(),
            confidence: example.confidence,
        };
        if pool.push(category, entry.clone()) {
            additions.push((category, entry));
        }
    }

    additions
}

fn compute_accuracy(examples: &[LabeledExample], now: DateTime<Utc>) -> Option<AccuracySnapshot> {
    if examples.is_empty() {
        return None;
    }

    let correct = examples
        .iter()
        .filter(|e| e.user_feedback == UserFeedback::Correct)
        .count();

    Some(AccuracySnapshot {
        timestamp: now,
        accuracy: correct as f64 / examples.len() as f64,
        total_examples: examples.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(text: &str, label: Label, feedback: UserFeedback, confidence: f64) -> LabeledExample {
        LabeledExample {
            text: text.to_string(),
            actual_label: label,
            predicted_label: Label::Legitimate,
            confidence,
            user_feedback: feedback,
            markers: vec![],
            created_at: Utc::now(),
            user_id: Some("tester".to_string()),
        }
    }

    fn run_cycle(state: &mut LearningState, config: &EngineConfig) -> CycleSummary {
        CyclePlan::prepare(state, config, Utc::now()).commit(state, config)
    }

    #[test]
    fn test_threshold_reached_once() {
        let config = EngineConfig::default();
        let mut state = LearningState::new(&config);

        for i in 0..9 {
            let due = state.record_feedback(
                example(&format!("call {}", i), Label::Legitimate, UserFeedback::Correct, 0.5),
                &config,
            );
            assert!(!due);
        }
        assert!(state.record_feedback(
            example("call 9", Label::Legitimate, UserFeedback::Correct, 0.5),
            &config
        ));
        run_cycle(&mut state, &config);
        assert_eq!(state.since_last_cycle, 0);
        assert!(!state.record_feedback(
            example("call 10", Label::Legitimate, UserFeedback::Correct, 0.5),
            &config
        ));
    }

    #[test]
    fn test_pattern_mined_from_missed_scams() {
        let config = EngineConfig::default();
        let mut state = LearningState::new(&config);
        for text in [
            "buy gift cards for the director today",
            "the director needs gift cards urgently",
            "gift cards for the director please",
        ] {
            state.record_feedback(example(text, Label::Scam, UserFeedback::Wrong, 0.3), &config);
        }

        let summary = run_cycle(&mut state, &config);
        let id = summary.new_pattern_id.expect("pattern created");
        let pattern = &state.patterns[&id];
        assert!(pattern.keywords.contains(&"gift".to_string()));
        assert!(pattern.keywords.contains(&"director".to_string()));
        assert_eq!(pattern.success_rate, 0.7);
        assert_eq!(pattern.usage_count, 0);
        assert_eq!(pattern.examples.len(), 3);
    }

    #[test]
    fn test_repeated_cycles_do_not_duplicate_pattern() {
        let config = EngineConfig::default();
        let mut state = LearningState::new(&config);
        for text in [
            "buy gift cards for the director today",
            "the director needs gift cards urgently",
            "gift cards for the director please",
        ] {
            state.record_feedback(example(text, Label::Scam, UserFeedback::Wrong, 0.3), &config);
        }

        let first = run_cycle(&mut state, &config);
        assert!(first.new_pattern_id.is_some());

        for cycle in 0..2 {
            for i in 0..10 {
                state.record_feedback(
                    example(
                        &format!("routine call {} {}", cycle, i),
                        Label::Legitimate,
                        UserFeedback::Correct,
                        0.5,
                    ),
                    &config,
                );
            }
            let summary = run_cycle(&mut state, &config);
            assert!(summary.new_pattern_id.is_none());
        }

        assert_eq!(state.patterns.len(), 1);
        assert_eq!(state.tracker.learning_cycles, 3);
        let matched = crate::scoring::patterns::match_patterns(&state.patterns, "gift cards");
        assert_eq!(matched.matched.len(), 1);
    }

    #[test]
    fn test_ready_flag_tracks_next_submission() {
        let config = EngineConfig {
            learning_threshold: 3,
            ..EngineConfig::default()
        };
        let mut state = LearningState::new(&config);
        assert!(!state.status(&config).ready_for_next_cycle);

        state.record_feedback(example("a", Label::Scam, UserFeedback::Correct, 0.5), &config);
        assert!(!state.status(&config).ready_for_next_cycle);

        state.record_feedback(example("b", Label::Scam, UserFeedback::Correct, 0.5), &config);
        assert!(state.status(&config).ready_for_next_cycle);

        let due = state.record_feedback(example("c", Label::Scam, UserFeedback::Correct, 0.5), &config);
        assert!(due);
        run_cycle(&mut state, &config);
        assert!(!state.status(&config).ready_for_next_cycle);
    }

    #[test]
    fn test_too_few_missed_scams_skips_discovery() {
        let config = EngineConfig::default();
        let mut state = LearningState::new(&config);
        for text in ["gift cards now", "gift cards now"] {
            state.record_feedback(example(text, Label::Scam, UserFeedback::Wrong, 0.3), &config);
        }
        state.record_feedback(
            example("gift cards now", Label::Legitimate, UserFeedback::Wrong, 0.3),
            &config,
        );

        let summary = run_cycle(&mut state, &config);
        assert!(summary.new_pattern_id.is_none());
        assert!(state.patterns.is_empty());
        assert_eq!(state.tracker.learning_cycles, 1);
    }

    #[test]
    fn test_pool_growth_respects_cap_over_cycles() {
        let config = EngineConfig {
            pool_category_cap: 4,
            ..EngineConfig::default()
        };
        let mut state = LearningState::new(&config);

        for cycle in 0..4 {
            for i in 0..5 {
                state.record_feedback(
                    example(
                        &format!("the police called about case {} {}", cycle, i),
                        Label::Scam,
                        UserFeedback::Correct,
                        0.9,
                    ),
                    &config,
                );
            }
            run_cycle(&mut state, &config);
            for category in PoolCategory::ALL {
                assert!(state.pool.category(category).len() <= 4);
            }
        }
        assert_eq!(state.pool.category(PoolCategory::GovernmentImpersonation).len(), 4);
    }

    #[test]
    fn test_pool_additions_limited_per_cycle() {
        let config = EngineConfig::default();
        let mut state = LearningState::new(&config);
        for i in 0..8 {
            state.record_feedback(
                example(&format!("parcel {} arrives", i), Label::Legitimate, UserFeedback::Correct, 0.95),
                &config,
            );
        }
        let summary = run_cycle(&mut state, &config);
        assert_eq!(summary.pool_additions, 5);
    }

    #[test]
    fn test_accuracy_window() {
        let config = EngineConfig {
            accuracy_window: 3,
            ..EngineConfig::default()
        };
        let mut state = LearningState::new(&config);
        state.record_feedback(example("a", Label::Scam, UserFeedback::Correct, 0.5), &config);
        state.record_feedback(example("b", Label::Scam, UserFeedback::Wrong, 0.5), &config);

        for _ in 0..5 {
            run_cycle(&mut state, &config);
        }
        assert_eq!(state.tracker.accuracy_trend.len(), 3);
        assert_eq!(state.tracker.latest_accuracy(), 0.5);
        assert_eq!(state.tracker.learning_cycles, 5);
    }
}
