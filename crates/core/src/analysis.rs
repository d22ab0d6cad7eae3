//! Per-channel accumulator of raw facts and per-dimension results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{FactValue, Facts, Metric};

/// Independent axis of evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Performance,
    Contextual,
    Suitability,
}

impl Dimension {
    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Performance => "performance",
            Dimension::Contextual => "contextual",
            Dimension::Suitability => "suitability",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSection {
    pub passed: bool,
    /// Coerced value of every metric that was compared.
    pub metrics: BTreeMap<Metric, f64>,
    /// Metrics that did not meet their threshold.
    pub failed_metrics: Vec<Metric>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextualSection {
    pub passed: bool,
    pub languages: Option<String>,
    pub content_quality: Option<String>,
    pub content_type: Option<String>,
    pub content_categories: Vec<String>,
    /// Categories that hit the exclusion list.
    pub excluded_categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuitabilitySection {
    pub passed: bool,
    pub overall_score: f64,
}

/// Outcome of one dimension for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dimension", rename_all = "snake_case")]
pub enum SectionResult {
    Performance(PerformanceSection),
    Contextual(ContextualSection),
    Suitability(SuitabilitySection),
}

impl SectionResult {
    pub fn dimension(&self) -> Dimension {
        match self {
            SectionResult::Performance(_) => Dimension::Performance,
            SectionResult::Contextual(_) => Dimension::Contextual,
            SectionResult::Suitability(_) => Dimension::Suitability,
        }
    }

    pub fn passed(&self) -> bool {
        match self {
            SectionResult::Performance(s) => s.passed,
            SectionResult::Contextual(s) => s.passed,
            SectionResult::Suitability(s) => s.passed,
        }
    }
}

/// Everything known about one channel during a run.
///
/// `clean` starts `true` and is cleared by the first failing dimension. It
/// is never set back, so dimensions that never evaluated the channel leave
/// it untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelAnalysis {
    pub channel_id: String,
    pub facts: Facts,
    pub section_results: BTreeMap<Dimension, SectionResult>,
    pub clean: bool,
}

impl ChannelAnalysis {
    pub fn new(channel_id: impl Into<String>, facts: Facts) -> Self {
        Self {
            channel_id: channel_id.into(),
            facts,
            section_results: BTreeMap::new(),
            clean: true,
        }
    }

    pub fn get(&self, field: &str) -> Option<&FactValue> {
        self.facts.get(field)
    }

    /// Merge later facts over existing ones.
    pub fn add_facts(&mut self, facts: Facts) {
        self.facts.extend(facts);
    }

    /// Record a dimension outcome. A dimension reports at most once per
    /// channel; a repeat replaces the earlier entry.
    pub fn add_result(&mut self, result: SectionResult) {
        if !result.passed() {
            self.clean = false;
        }
        self.section_results.insert(result.dimension(), result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suitability(passed: bool) -> SectionResult {
        SectionResult::Suitability(SuitabilitySection {
            passed,
            overall_score: 80.0,
        })
    }

    #[test]
    fn test_new_channel_is_clean() {
        let channel = ChannelAnalysis::new("UC1", Facts::new());
        assert!(channel.clean);
        assert!(channel.section_results.is_empty());
    }

    #[test]
    fn test_failure_is_sticky() {
        let mut channel = ChannelAnalysis::new("UC1", Facts::new());
        channel.add_result(suitability(false));
        assert!(!channel.clean);

        channel.add_result(SectionResult::Contextual(ContextualSection {
            passed: true,
            languages: Some("en".to_string()),
            content_quality: None,
            content_type: None,
            content_categories: vec![],
            excluded_categories: vec![],
        }));
        assert!(!channel.clean);
        assert_eq!(channel.section_results.len(), 2);
    }

    #[test]
    fn test_one_entry_per_dimension() {
        let mut channel = ChannelAnalysis::new("UC1", Facts::new());
        channel.add_result(suitability(true));
        channel.add_result(suitability(true));
        assert_eq!(channel.section_results.len(), 1);
        assert!(channel.section_results[&Dimension::Suitability].passed());
    }

    #[test]
    fn test_add_facts_merges() {
        let mut facts = Facts::new();
        facts.insert("cpm".to_string(), FactValue::Number(2.0));
        let mut channel = ChannelAnalysis::new("UC1", facts);

        let mut later = Facts::new();
        later.insert("languages".to_string(), FactValue::Text("en".to_string()));
        channel.add_facts(later);

        assert_eq!(channel.get("cpm"), Some(&FactValue::Number(2.0)));
        assert_eq!(channel.get("languages"), Some(&FactValue::Text("en".to_string())));
    }
}
