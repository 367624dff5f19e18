//! Adaptive risk scoring for phone-call transcripts.
//!
//! Fuses a keyword heuristic, few-shot retrieval through a language-model
//! backend and learned keyword patterns into one fraud risk score, and
//! grows its pattern library and example pool from user feedback.

pub mod config;
pub mod scoring;

pub use scoring::{
    AnalysisContext, AnalysisResult, EngineConfig, FeedbackError, Label, RiskEngine, RiskLevel,
    UserFeedback,
};
