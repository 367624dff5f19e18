use serde::{Deserialize, Serialize};

use super::builtin::{IndicatorTier, KEYWORD_TIERS};
use super::types::{RiskLevel, SourceScore};

/// Result of the stateless keyword scorer
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HeuristicScore {
    pub risk: f64,
    pub confidence: f64,
    pub indicators: Vec<String>,
    pub scam_type: String,
    pub reasoning: String,
    pub recommendation: String,
}

impl HeuristicScore {
    pub fn source_score(&self) -> SourceScore {
        SourceScore::new(self.risk, self.confidence)
    }
}

/// Score text against the fixed keyword tiers
pub fn score(text: &str) -> HeuristicScore {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return HeuristicScore {
            scam_type: "unknown".to_string(),
            recommendation: recommendation_for(RiskLevel::Low).to_string(),
            ..Default::default()
        };
    }

    let mut risk = 0.0;
    let mut indicators = Vec::new();
    let mut strongest: Option<IndicatorTier> = None;

    for tier in KEYWORD_TIERS {
        for keyword in tier.keywords {
            if contains_term(&lower, keyword) {
                risk += tier.weight;
                indicators.push(keyword.to_string());
                if strongest.is_none() {
                    strongest = Some(tier.tier);
                }
            }
        }
    }

    let risk = f64::min(risk, 1.0);
    let confidence = if indicators.is_empty() {
        0.5
    } else {
        f64::min(0.5 + 0.1 * indicators.len() as f64, 0.95)
    };

    let reasoning = if indicators.is_empty() {
        String::new()
    } else {
        format!(
            "{} indicator(s) matched: {}",
            indicators.len(),
            indicators.join(", ")
        )
    };

    HeuristicScore {
        risk,
        confidence,
        indicators,
        scam_type: scam_type_for(strongest).to_string(),
        reasoning,
        recommendation: recommendation_for(RiskLevel::from_score(risk)).to_string(),
    }
}

/// Case-sensitive term search that only matches at the start of a word,
/// so "son" does not match inside "person". Callers lowercase both sides.
pub fn contains_term(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }

    haystack.match_indices(term).any(|(i, _)| {
        haystack[..i]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric())
    })
}

fn scam_type_for(tier: Option<IndicatorTier>) -> &'static str {
    match tier {
        Some(IndicatorTier::Critical) => "threat_or_coercion",
        Some(IndicatorTier::High) => "authority_impersonation",
        Some(IndicatorTier::Medium) => "loan_or_refund_lure",
        Some(IndicatorTier::Financial) => "financial_information_request",
        Some(IndicatorTier::App) => "malicious_app_install",
        None => "unknown",
    }
}

pub fn recommendation_for(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Critical => "Hang up now and call the institution back on its official number",
        RiskLevel::High => "Do not transfer money or share personal details; verify the caller independently",
        RiskLevel::Medium => "Be careful and confirm the caller's identity before acting",
        RiskLevel::Low => "No strong fraud signals; stay alert to requests for money or credentials",
    }
}
