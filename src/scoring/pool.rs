use std::collections::BTreeMap;

use super::builtin::{seed_examples, FAMILY_EMERGENCY_KEYWORDS, GOVERNMENT_KEYWORDS};
use super::heuristic::contains_term;
use super::types::{FewShotEntry, Label, LabeledExample, PoolCategory};

/// Categorised few-shot examples, capped per category
#[derive(Clone, Debug)]
pub struct ExamplePool {
    categories: BTreeMap<PoolCategory, Vec<FewShotEntry>>,
    cap: usize,
}

impl ExamplePool {
    /// Empty pool with every category present
    pub fn new(cap: usize) -> Self {
        let categories = PoolCategory::ALL
            .into_iter()
            .map(|c| (c, Vec::new()))
            .collect();
        Self { categories, cap }
    }

    /// Pool populated with the builtin seed examples
    pub fn seeded(cap: usize) -> Self {
        let mut pool = Self::new(cap);
        for (category, entry) in seed_examples() {
            pool.push(category, entry);
        }
        pool
    }

    /// Append an entry. Returns false if the category is full or already
    /// holds the same text.
    pub fn push(&mut self, category: PoolCategory, entry: FewShotEntry) -> bool {
        let entries = self.categories.entry(category).or_default();
        if entries.len() >= self.cap || entries.iter().any(|e| e.text == entry.text) {
            return false;
        }
        entries.push(entry);
        true
    }

    pub fn category(&self, category: PoolCategory) -> &[FewShotEntry] {
        self.categories
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (PoolCategory, &FewShotEntry)> {
        self.categories
            .iter()
            .flat_map(|(c, entries)| entries.iter().map(move |e| (*c, e)))
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sizes(&self) -> BTreeMap<String, usize> {
        self.categories
            .iter()
            .map(|(c, entries)| (c.as_str().to_string(), entries.len()))
            .collect()
    }

    /// Serializable form keyed by category name
    pub fn to_map(&self) -> BTreeMap<String, Vec<FewShotEntry>> {
        self.categories
            .iter()
            .map(|(c, entries)| (c.as_str().to_string(), entries.clone()))
            .collect()
    }
}

/// Route a confirmed example to a pool category. First match wins:
/// authority keywords, then family/emergency keywords, then legitimate label.
pub fn categorize(example: &LabeledExample) -> Option<PoolCategory> {
    let text = example.text.to_lowercase();

    if GOVERNMENT_KEYWORDS.iter().any(|k| contains_term(&text, k)) {
        Some(PoolCategory::GovernmentImpersonation)
    } else if FAMILY_EMERGENCY_KEYWORDS
        .iter()
        .any(|k| contains_term(&text, k))
    {
        Some(PoolCategory::FamilyEmergency)
    } else if example.actual_label == Label::Legitimate {
        Some(PoolCategory::LegitimateCalls)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::types::UserFeedback;

    fn example(text: &str, label: Label) -> LabeledExample {
        LabeledExample {
            text: text.to_string(),
            actual_label: label,
            predicted_label: label,
            confidence: 0.9,
            user_feedback: UserFeedback::Correct,
            markers: vec![],
            created_at: chrono::Utc::now(),
            user_id: None,
        }
    }

    fn entry(text: &str) -> FewShotEntry {
        FewShotEntry {
            text: text.to_string(),
            label: Label::Scam,
            rationale: "test".to_string(),
            confidence: 0.9,
        }
    }

    #[test]
    fn test_seeded_pool_has_all_categories() {
        let pool = ExamplePool::seeded(10);
        assert_eq!(pool.sizes().len(), 3);
        assert_eq!(pool.len(), 6);
    }

    #[test]
    fn test_push_respects_cap() {
        let mut pool = ExamplePool::new(2);
        assert!(pool.push(PoolCategory::FamilyEmergency, entry("a")));
        assert!(pool.push(PoolCategory::FamilyEmergency, entry("b")));
        assert!(!pool.push(PoolCategory::FamilyEmergency, entry("c")));
        assert_eq!(pool.category(PoolCategory::FamilyEmergency).len(), 2);
    }

    #[test]
    fn test_push_rejects_duplicate_text() {
        let mut pool = ExamplePool::new(5);
        assert!(pool.push(PoolCategory::LegitimateCalls, entry("same")));
        assert!(!pool.push(PoolCategory::LegitimateCalls, entry("same")));
        assert_eq!(pool.category(PoolCategory::LegitimateCalls).len(), 1);
    }

    #[test]
    fn test_categorize_first_match_wins() {
        let both = example("the police say your son had an accident", Label::Scam);
        assert_eq!(categorize(&both), Some(PoolCategory::GovernmentImpersonation));

        let family = example("mother i had an accident", Label::Scam);
        assert_eq!(categorize(&family), Some(PoolCategory::FamilyEmergency));

        let legit = example("your parcel arrives tomorrow", Label::Legitimate);
        assert_eq!(categorize(&legit), Some(PoolCategory::LegitimateCalls));

        let other = example("you have won a prize", Label::Scam);
        assert_eq!(categorize(&other), None);
    }
}
