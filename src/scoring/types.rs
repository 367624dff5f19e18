use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ground-truth or predicted label of a transcript
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Scam,
    Legitimate,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scam => "scam",
            Self::Legitimate => "legitimate",
        }
    }
}

/// What the user said about a prediction
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UserFeedback {
    Correct,
    Wrong,
    Uncertain,
}

/// Categorical risk level derived from the final risk score
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Lower bounds are inclusive: 0.8 is critical, 0.79999 is high.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Critical
        } else if score >= 0.6 {
            Self::High
        } else if score >= 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Fixed category keys of the few-shot example pool
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PoolCategory {
    GovernmentImpersonation,
    FamilyEmergency,
    LegitimateCalls,
}

impl PoolCategory {
    pub const ALL: [PoolCategory; 3] = [
        Self::GovernmentImpersonation,
        Self::FamilyEmergency,
        Self::LegitimateCalls,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GovernmentImpersonation => "government_impersonation",
            Self::FamilyEmergency => "family_emergency",
            Self::LegitimateCalls => "legitimate_calls",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == key)
    }
}

/// One user-labelled analysis, appended to the learning log
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LabeledExample {
    pub text: String,
    pub actual_label: Label,
    pub predicted_label: Label,
    /// Confidence of the prediction being labelled
    pub confidence: f64,
    pub user_feedback: UserFeedback,
    /// Contextual markers seen at analysis time (matched indicators)
    pub markers: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub user_id: Option<String>,
}

/// A keyword cluster mined from misclassified feedback
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AdaptivePattern {
    pub pattern_id: String,
    /// Never empty
    pub keywords: Vec<String>,
    #[serde(default)]
    pub cultural_context: Vec<String>,
    pub success_rate: f64,
    #[serde(default)]
    pub usage_count: u64,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub examples: Vec<String>,
}

/// A labelled text + rationale used to condition the model backend
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FewShotEntry {
    pub text: String,
    pub label: Label,
    #[serde(alias = "reasoning")]
    pub rationale: String,
    pub confidence: f64,
}

/// Structured metadata passed along with a transcript
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AnalysisContext {
    /// Caller number or identifier, if known
    pub caller: Option<String>,
    /// Where the transcript came from (e.g. "live_call", "voicemail")
    pub source: Option<String>,
    /// Call duration so far, in seconds
    pub call_duration_secs: Option<u64>,
    /// Set by the engine for backend calls (e.g. "few_shot_learning")
    pub analysis_type: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl AnalysisContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_caller(mut self, caller: &str) -> Self {
        self.caller = Some(caller.to_string());
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn to_prompt(&self) -> String {
        let mut lines = vec![];

        if let Some(ref caller) = self.caller {
            lines.push(format!("Caller: {}", caller));
        }
        if let Some(ref source) = self.source {
            lines.push(format!("Source: {}", source));
        }
        if let Some(secs) = self.call_duration_secs {
            lines.push(format!("Call duration: {}s", secs));
        }
        for (key, value) in &self.metadata {
            lines.push(format!("{}: {}", key, value));
        }

        lines.join("\n")
    }
}

/// Risk and confidence reported by a single signal source
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceScore {
    pub risk: f64,
    pub confidence: f64,
}

impl SourceScore {
    pub fn new(risk: f64, confidence: f64) -> Self {
        Self {
            risk: risk.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Per-source view of how the final score was reached
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisBreakdown {
    pub heuristic: SourceScore,
    /// `None` when the retrieval signal was unavailable
    pub few_shot: Option<SourceScore>,
    pub pattern: SourceScore,
    pub few_shot_examples_used: usize,
    pub best_pattern: Option<String>,
}

/// Outcome of one `analyze` call
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub analysis_id: String,
    pub final_risk_score: f64,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub scam_type: String,
    pub key_indicators: Vec<String>,
    pub reasoning: String,
    pub recommendation: String,
    pub immediate_action: bool,
    pub few_shot_applied: bool,
    pub patterns_matched: usize,
    pub degraded: bool,
    pub breakdown: AnalysisBreakdown,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Label implied by the final score, used when feedback arrives
    pub fn predicted_label(&self) -> Label {
        if self.final_risk_score >= 0.5 {
            Label::Scam
        } else {
            Label::Legitimate
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AccuracySnapshot {
    pub timestamp: DateTime<Utc>,
    pub accuracy: f64,
    pub total_examples: usize,
}

/// Cumulative counters plus a trailing accuracy window
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PerformanceTracker {
    pub total_analyses: u64,
    pub high_risk_detections: u64,
    pub user_feedback_count: u64,
    pub learning_cycles: u64,
    pub accuracy_trend: Vec<AccuracySnapshot>,
}

impl PerformanceTracker {
    pub fn latest_accuracy(&self) -> f64 {
        self.accuracy_trend.last().map(|s| s.accuracy).unwrap_or(0.0)
    }

    pub fn push_accuracy(&mut self, snapshot: AccuracySnapshot, window: usize) {
        self.accuracy_trend.push(snapshot);
        if self.accuracy_trend.len() > window {
            let excess = self.accuracy_trend.len() - window;
            self.accuracy_trend.drain(..excess);
        }
    }
}

/// Snapshot returned by `get_learning_status`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LearningStatus {
    pub total_analyses: u64,
    pub feedback_count: u64,
    pub example_count: usize,
    pub pattern_count: usize,
    pub pool_sizes_by_category: BTreeMap<String, usize>,
    pub cycle_count: u64,
    pub latest_accuracy: f64,
    pub ready_for_next_cycle: bool,
}

/// Model backend configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Scoring endpoint; empty means no backend (offline mode)
    pub url: String,
    /// Environment variable holding the API key, if any
    pub api_key_env: Option<String>,
    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key_env: Some("CALLGUARD_API_KEY".to_string()),
            timeout_ms: 30_000,
        }
    }
}

/// Engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum misclassified scam examples before mining a pattern
    pub min_examples_for_pattern: usize,
    /// Maximum few-shot examples embedded in one prompt
    pub max_few_shot_examples: usize,
    /// Examples at or below this relevance are never selected
    pub min_relevance: f64,
    /// Feedback submissions between learning cycles
    pub learning_threshold: usize,
    /// Success rate assigned to freshly mined patterns
    pub initial_pattern_success_rate: f64,
    pub pattern_keyword_limit: usize,
    pub pattern_example_limit: usize,
    /// Maximum entries per few-shot pool category
    pub pool_category_cap: usize,
    pub pool_additions_per_cycle: usize,
    /// Confirmed examples must exceed this confidence to join the pool
    pub pool_confidence_threshold: f64,
    pub accuracy_window: usize,
    /// Analyses older than this can no longer receive feedback
    pub session_ttl_secs: u64,
    /// Durable learning store
    pub data_path: PathBuf,
    pub backend: BackendConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_examples_for_pattern: 3,
            max_few_shot_examples: 5,
            min_relevance: 0.1,
            learning_threshold: 10,
            initial_pattern_success_rate: 0.7,
            pattern_keyword_limit: 10,
            pattern_example_limit: 3,
            pool_category_cap: 10,
            pool_additions_per_cycle: 5,
            pool_confidence_threshold: 0.8,
            accuracy_window: 10,
            session_ttl_secs: 3600,
            data_path: PathBuf::from("data/learning_data.json"),
            backend: BackendConfig::default(),
        }
    }
}
