pub mod types;
pub mod error;
pub mod builtin;
pub mod heuristic;
pub mod pool;
pub mod backend;
pub mod fewshot;
pub mod patterns;
pub mod learning;
pub mod storage;
pub mod engine;

// Re-export commonly used items
pub use types::{
    AdaptivePattern, AnalysisContext, AnalysisResult, BackendConfig, EngineConfig, FewShotEntry,
    Label, LabeledExample, LearningStatus, PoolCategory, RiskLevel, UserFeedback,
};
pub use error::{BackendError, FeedbackError, ParseError, PersistenceError};
pub use backend::{BackendReply, HttpBackend, OfflineBackend, ScoringBackend};
pub use engine::{fuse, FeedbackOutcome, RiskEngine};
pub use learning::CycleSummary;
