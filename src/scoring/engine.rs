use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::backend::ScoringBackend;
use super::error::{BackendError, FeedbackError, PersistenceError};
use super::fewshot::{select_examples, FewShotScore, FewShotScorer};
use super::heuristic::{self, HeuristicScore};
use super::learning::{CyclePlan, CycleSummary, LearningState};
use super::patterns::{match_patterns, record_usage, PatternResult};
use super::storage::{merge_into, LearningStore, StoredState};
use super::types::{
    AnalysisBreakdown, AnalysisContext, AnalysisResult, EngineConfig, Label, LabeledExample,
    LearningStatus, RiskLevel, SourceScore, UserFeedback,
};

pub const HEURISTIC_WEIGHT: f64 = 0.4;
pub const FEW_SHOT_WEIGHT: f64 = 0.4;
pub const PATTERN_WEIGHT: f64 = 0.2;

const REASONING_SEPARATOR: &str = " | ";
const HIGH_RISK_SCORE: f64 = 0.6;

/// Combine the three signal sources into one risk and confidence.
///
/// Without a few-shot score (backend failed) the remaining weights are
/// renormalised and confidence is averaged over the two sources left.
pub fn fuse(
    heuristic: SourceScore,
    few_shot: Option<SourceScore>,
    pattern: SourceScore,
) -> SourceScore {
    match few_shot {
        Some(few_shot) => SourceScore::new(
            HEURISTIC_WEIGHT * heuristic.risk
                + FEW_SHOT_WEIGHT * few_shot.risk
                + PATTERN_WEIGHT * pattern.risk,
            (heuristic.confidence + few_shot.confidence + pattern.confidence) / 3.0,
        ),
        None => SourceScore::new(
            (HEURISTIC_WEIGHT * heuristic.risk + PATTERN_WEIGHT * pattern.risk)
                / (HEURISTIC_WEIGHT + PATTERN_WEIGHT),
            (heuristic.confidence + pattern.confidence) / 2.0,
        ),
    }
}

/// Result of a feedback submission
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedbackOutcome {
    pub analysis_id: String,
    /// Size of the learning log after this submission
    pub examples_recorded: usize,
    /// Present when this submission triggered a learning cycle
    pub cycle: Option<CycleSummary>,
}

struct SessionEntry {
    text: String,
    result: AnalysisResult,
    created: Instant,
}

/// Adaptive risk-scoring engine. Owns the learning tables; share it
/// behind an `Arc` to analyze and take feedback from several threads.
pub struct RiskEngine {
    config: EngineConfig,
    scorer: FewShotScorer,
    store: LearningStore,
    state: Mutex<LearningState>,
    sessions: Mutex<HashMap<String, SessionEntry>>,
    sequence: AtomicU64,
}

impl RiskEngine {
    /// Build an engine and merge any previously saved learning state.
    /// A missing or unreadable store only produces a warning.
    pub fn new(config: EngineConfig, backend: Arc<dyn ScoringBackend>) -> Self {
        let store = LearningStore::new(config.data_path.clone());
        let mut state = LearningState::new(&config);

        match store.load() {
            Ok(Some(stored)) => {
                let summary = merge_into(&mut state, stored);
                log::info!(
                    "Loaded learning state from {}: {} pattern(s) added, {} few-shot example(s) added",
                    store.path().display(),
                    summary.patterns_added,
                    summary.pool_entries_added
                );
            }
            Ok(None) => log::info!("No learning state at {}, starting fresh", store.path().display()),
            Err(e) => log::warn!("Failed to load learning state, starting fresh: {}", e),
        }

        log::info!(
            "Risk engine ready: {} adaptive pattern(s), {} few-shot example(s)",
            state.patterns.len(),
            state.pool.len()
        );

        let scorer = FewShotScorer::new(backend, Duration::from_millis(config.backend.timeout_ms));

        Self {
            config,
            scorer,
            store,
            state: Mutex::new(state),
            sessions: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Score a transcript and register the result for later feedback
    pub fn analyze(&self, text: &str, context: &AnalysisContext) -> AnalysisResult {
        let started = Instant::now();
        let heuristic = heuristic::score(text);

        let (examples, patterns) = {
            let state = self.lock_state();
            let examples = select_examples(
                &state.pool,
                text,
                self.config.min_relevance,
                self.config.max_few_shot_examples,
            );
            (examples, match_patterns(&state.patterns, text))
        };

        // Backend call happens with no lock held
        let few_shot = self.scorer.score(text, context, &examples);
        if let Err(ref e) = few_shot {
            log::warn!("Few-shot scoring unavailable, degrading: {}", e);
        }

        let fused = fuse(
            heuristic.source_score(),
            few_shot.as_ref().ok().map(FewShotScore::source_score),
            patterns.source_score(),
        );
        let risk_level = RiskLevel::from_score(fused.risk);
        let now = Utc::now();
        let analysis_id = self.next_analysis_id(text, now);
        let few_shot_used = few_shot.as_ref().map(|s| s.examples_used).unwrap_or(0);

        let result = AnalysisResult {
            analysis_id: analysis_id.clone(),
            final_risk_score: fused.risk,
            risk_level,
            confidence: fused.confidence,
            scam_type: heuristic.scam_type.clone(),
            key_indicators: heuristic.indicators.clone(),
            reasoning: build_reasoning(&heuristic, &few_shot, &patterns),
            recommendation: heuristic::recommendation_for(risk_level).to_string(),
            immediate_action: fused.risk >= 0.8,
            few_shot_applied: few_shot_used > 0,
            patterns_matched: patterns.matched.len(),
            degraded: few_shot.is_err(),
            breakdown: AnalysisBreakdown {
                heuristic: heuristic.source_score(),
                few_shot: few_shot.as_ref().ok().map(FewShotScore::source_score),
                pattern: patterns.source_score(),
                few_shot_examples_used: few_shot_used,
                best_pattern: patterns.best.as_ref().map(|b| b.pattern_id.clone()),
            },
            analyzed_at: now,
        };

        {
            let mut state = self.lock_state();
            record_usage(&mut state.patterns, &patterns);
            state.tracker.total_analyses += 1;
            if result.final_risk_score >= HIGH_RISK_SCORE {
                state.tracker.high_risk_detections += 1;
            }
        }

        {
            let mut sessions = self.lock_sessions();
            self.prune_expired(&mut sessions);
            sessions.insert(
                analysis_id,
                SessionEntry {
                    text: text.to_string(),
                    result: result.clone(),
                    created: Instant::now(),
                },
            );
        }

        log::info!(
            "Analysis {} complete in {:.3}s: risk {:.2} ({})",
            result.analysis_id,
            started.elapsed().as_secs_f64(),
            result.final_risk_score,
            risk_level.as_str()
        );

        result
    }

    /// Attribute a correctness label to an earlier analysis.
    ///
    /// The example is in the learning log once this returns `Ok`, even if
    /// the learning cycle it triggered could not be persisted.
    pub fn submit_feedback(
        &self,
        analysis_id: &str,
        actual_label: Label,
        user_feedback: UserFeedback,
        user_id: Option<&str>,
    ) -> Result<FeedbackOutcome, FeedbackError> {
        let (text, result) = {
            let mut sessions = self.lock_sessions();
            self.prune_expired(&mut sessions);
            sessions
                .get(analysis_id)
                .map(|e| (e.text.clone(), e.result.clone()))
                .ok_or_else(|| FeedbackError::NotFound(analysis_id.to_string()))?
        };

        let example = LabeledExample {
            text,
            actual_label,
            predicted_label: result.predicted_label(),
            confidence: result.confidence,
            user_feedback,
            markers: result.key_indicators.clone(),
            created_at: Utc::now(),
            user_id: user_id.map(str::to_string),
        };

        let (examples_recorded, cycle, snapshot) = {
            let mut state = self.lock_state();
            let due = state.record_feedback(example, &self.config);
            log::info!(
                "Feedback recorded for {}: {:?} ({} total)",
                analysis_id,
                user_feedback,
                state.examples.len()
            );

            if due {
                log::info!("Learning cycle starting");
                let plan = CyclePlan::prepare(&state, &self.config, Utc::now());
                let summary = plan.commit(&mut state, &self.config);
                log::info!("Learning cycle #{} complete", summary.cycle_number);
                (
                    state.examples.len(),
                    Some(summary),
                    Some(StoredState::snapshot(&state)),
                )
            } else {
                (state.examples.len(), None, None)
            }
        };

        // Written after the lock is released so analyze() never waits on disk
        let cycle = cycle.map(|mut summary| {
            if let Some(snapshot) = snapshot {
                match self.store.save(&snapshot) {
                    Ok(written) => summary.persisted = written,
                    Err(e) => log::error!(
                        "Failed to save learning state, continuing in memory: {}",
                        e
                    ),
                }
            }
            summary
        });

        Ok(FeedbackOutcome {
            analysis_id: analysis_id.to_string(),
            examples_recorded,
            cycle,
        })
    }

    pub fn get_learning_status(&self) -> LearningStatus {
        self.lock_state().status(&self.config)
    }

    /// Persist the current learning state
    pub fn save(&self) -> Result<bool, PersistenceError> {
        let snapshot = StoredState::snapshot(&self.lock_state());
        self.store.save(&snapshot)
    }

    fn next_analysis_id(&self, text: &str, now: DateTime<Utc>) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        now.timestamp_nanos_opt().unwrap_or_default().hash(&mut hasher);
        sequence.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    fn prune_expired(&self, sessions: &mut HashMap<String, SessionEntry>) {
        let ttl = Duration::from_secs(self.config.session_ttl_secs);
        sessions.retain(|_, entry| entry.created.elapsed() < ttl);
    }

    fn lock_state(&self) -> MutexGuard<'_, LearningState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn build_reasoning(
    heuristic: &HeuristicScore,
    few_shot: &Result<FewShotScore, BackendError>,
    patterns: &PatternResult,
) -> String {
    let mut parts = vec![];

    if !heuristic.reasoning.is_empty() {
        parts.push(format!("keywords: {}", heuristic.reasoning));
    }

    match few_shot {
        Ok(score) if score.examples_used > 0 && !score.rationale.is_empty() => {
            parts.push(format!("few-shot: {}", score.rationale));
        }
        Ok(_) => {}
        Err(e) => parts.push(format!(
            "few-shot retrieval unavailable ({}); scored from keywords and patterns only",
            e
        )),
    }

    if let Some(ref best) = patterns.best {
        parts.push(format!(
            "pattern: {} matched at {:.2}",
            best.pattern_id, best.match_score
        ));
    }

    if parts.is_empty() {
        "analysis complete".to_string()
    } else {
        parts.join(REASONING_SEPARATOR)
    }
}
