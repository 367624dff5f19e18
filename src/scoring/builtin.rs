use super::types::{FewShotEntry, Label, PoolCategory};

/// Indicator tier of the heuristic keyword scorer
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IndicatorTier {
    Critical,
    High,
    Medium,
    Financial,
    App,
}

/// A fixed keyword tier and its per-hit risk contribution
pub struct KeywordTier {
    pub tier: IndicatorTier,
    pub weight: f64,
    pub keywords: &'static [&'static str],
}

/// Keyword tiers, strongest first
pub const KEYWORD_TIERS: &[KeywordTier] = &[
    KeywordTier {
        tier: IndicatorTier::Critical,
        weight: 0.5,
        keywords: &[
            "kidnap",
            "abduct",
            "you will die",
            "arrest warrant",
            "account frozen",
            "emergency room",
        ],
    },
    KeywordTier {
        tier: IndicatorTier::High,
        weight: 0.3,
        keywords: &[
            "financial supervisory service",
            "prosecutor",
            "police",
            "investigation",
            "inquiry",
            "crime",
            "suspect",
        ],
    },
    KeywordTier {
        tier: IndicatorTier::Medium,
        weight: 0.15,
        keywords: &[
            "loan",
            "low interest",
            "government subsidy",
            "refund",
            "you have won",
            "meet in person",
            "directly",
        ],
    },
    KeywordTier {
        tier: IndicatorTier::Financial,
        weight: 0.2,
        keywords: &[
            "account number",
            "password",
            "transfer",
            "cash",
            "card number",
        ],
    },
    KeywordTier {
        tier: IndicatorTier::App,
        weight: 0.15,
        keywords: &[
            "install the app",
            "download",
            "permission",
            "allow access",
            "update",
            "verification code",
        ],
    },
];

/// Keywords that route a confirmed example into the government category
pub const GOVERNMENT_KEYWORDS: &[&str] = &[
    "financial supervisory service",
    "prosecutor",
    "police",
    "tax office",
];

/// Keywords that route a confirmed example into the family category
pub const FAMILY_EMERGENCY_KEYWORDS: &[&str] = &[
    "mother",
    "son",
    "daughter",
    "accident",
    "emergency room",
];

/// Seed entries every fresh example pool starts with
pub fn seed_examples() -> Vec<(PoolCategory, FewShotEntry)> {
    vec![
        // Government impersonation
        seed(
            PoolCategory::GovernmentImpersonation,
            "hello this is the financial supervisory service electronic finance team your account is involved in a crime and needs immediate action",
            Label::Scam,
            "the financial supervisory service never calls individuals to demand action on their accounts",
            0.95,
        ),
        seed(
            PoolCategory::GovernmentImpersonation,
            "this is an investigator from the prosecutor office you must appear regarding a case involving you",
            Label::Scam,
            "summons from the prosecutor are served in writing, not by a personal phone call",
            0.93,
        ),
        // Family emergencies
        seed(
            PoolCategory::FamilyEmergency,
            "mom it is me your son i was in a car accident and i am in the emergency room i need money for surgery now",
            Label::Scam,
            "urgent money request without identity check; real hospitals contact family officially",
            0.88,
        ),
        seed(
            PoolCategory::FamilyEmergency,
            "grandpa it is your grandson loan sharks caught me and i need money right away",
            Label::Scam,
            "emotional manipulation through family ties; mentions illegal trouble to discourage reporting",
            0.91,
        ),
        // Legitimate calls
        seed(
            PoolCategory::LegitimateCalls,
            "hello i am calling to let you know the result of the loan review you applied for",
            Label::Legitimate,
            "follow-up on a service the customer requested beforehand",
            0.85,
        ),
        seed(
            PoolCategory::LegitimateCalls,
            "your parcel could not be delivered because of an address problem so we are calling to confirm",
            Label::Legitimate,
            "specific delivery question with no request for personal information",
            0.80,
        ),
    ]
}

fn seed(
    category: PoolCategory,
    text: &str,
    label: Label,
    rationale: &str,
    confidence: f64,
) -> (PoolCategory, FewShotEntry) {
    (
        category,
        FewShotEntry {
            text: text.to_string(),
            label,
            rationale: rationale.to_string(),
            confidence,
        },
    )
}
