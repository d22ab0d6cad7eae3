//! Contextual dimension: checks a channel's topical and categorical
//! metadata against campaign allow-lists and the category exclusion list.

use channel_audit_core::analysis::{ContextualSection, SectionResult};
use channel_audit_core::scoring::{coerce, score, CoerceKind};
use channel_audit_core::types::{fields, AnalysisParams, ContextualField};
use channel_audit_core::ChannelAnalysis;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Number of categories listed in `top_occurrences`.
pub const TOP_OCCURRENCES_MAX: usize = 5;

/// Value frequencies that remember first-seen order for tie breaks.
#[derive(Debug, Default)]
struct OccurrenceCounter {
    order: Vec<String>,
    counts: HashMap<String, u64>,
}

impl OccurrenceCounter {
    fn record(&mut self, value: &str) {
        match self.counts.get_mut(value) {
            Some(count) => *count += 1,
            None => {
                self.order.push(value.to_string());
                self.counts.insert(value.to_string(), 1);
            }
        }
    }

    /// Descending by count; stable sort keeps first-seen order on ties.
    fn sorted(&self) -> Vec<(&str, u64)> {
        let mut entries: Vec<(&str, u64)> = self
            .order
            .iter()
            .map(|v| (v.as_str(), self.counts[v]))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries
    }
}

#[derive(Debug, Default)]
struct FieldTally {
    observed: u64,
    occurrences: OccurrenceCounter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueOccurrence {
    pub value: String,
    pub count: u64,
    pub percent: f64,
    /// Whether the value is on the campaign allow-list.
    pub targeted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryOccurrence {
    pub category: String,
    pub count: u64,
    pub percent_occurrence: f64,
    pub targeted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub occurrences: Vec<CategoryOccurrence>,
    pub top_occurrences: Vec<String>,
    pub matched_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextualResults {
    /// Breakdown for every configured scalar field, most frequent first.
    pub fields: BTreeMap<ContextualField, Vec<ValueOccurrence>>,
    pub content_categories: CategoryBreakdown,
    pub channels_analyzed: u64,
    pub channels_passed: u64,
    pub overall_score: Option<f64>,
}

pub struct ContextualAnalyzer {
    allowed: BTreeMap<ContextualField, BTreeSet<String>>,
    categories: BTreeSet<String>,
    excluded: BTreeSet<String>,
    field_tallies: BTreeMap<ContextualField, FieldTally>,
    category_occurrences: OccurrenceCounter,
    categories_seen: u64,
    categories_checked: u64,
    categories_matched: u64,
    analyzed: u64,
    passed: u64,
}

impl ContextualAnalyzer {
    pub fn new(params: &AnalysisParams) -> Self {
        let allowed = ContextualField::ALL
            .iter()
            .filter(|f| !params.allowed(**f).is_empty())
            .map(|f| (*f, params.allowed(*f).clone()))
            .collect();
        Self {
            allowed,
            categories: params.content_categories.clone(),
            excluded: params.exclude_content_categories.clone(),
            field_tallies: BTreeMap::new(),
            category_occurrences: OccurrenceCounter::default(),
            categories_seen: 0,
            categories_checked: 0,
            categories_matched: 0,
            analyzed: 0,
            passed: 0,
        }
    }

    fn is_configured(&self) -> bool {
        !self.allowed.is_empty() || !self.categories.is_empty() || !self.excluded.is_empty()
    }

    /// Evaluate one channel. A channel passes when every analyzed field
    /// passes; `None` when no configured field had a value to check.
    pub fn analyze(&mut self, channel: &ChannelAnalysis) -> Option<SectionResult> {
        let mut analyzed = false;
        let mut passed = true;
        let mut scalars: BTreeMap<ContextualField, String> = BTreeMap::new();

        for (field, allowed) in &self.allowed {
            let Some(value) = channel
                .get(field.field_name())
                .and_then(|v| coerce(v, CoerceKind::Category))
                .and_then(|c| c.into_category())
            else {
                continue;
            };
            let tally = self.field_tallies.entry(*field).or_default();
            tally.observed += 1;
            tally.occurrences.record(&value);

            analyzed = true;
            if !allowed.contains(&value) {
                passed = false;
            }
            scalars.insert(*field, value);
        }

        let channel_categories = channel
            .get(fields::CONTENT_CATEGORIES)
            .and_then(|v| coerce(v, CoerceKind::CategoryList))
            .and_then(|c| c.into_categories());
        let mut excluded_categories = Vec::new();
        let mut content_categories = Vec::new();

        if let Some(categories) = channel_categories {
            if !self.categories.is_empty() || !self.excluded.is_empty() {
                analyzed = true;
                self.categories_seen += 1;
                for category in &categories {
                    self.category_occurrences.record(category);
                }

                if !self.categories.is_empty() {
                    self.categories_checked += 1;
                    if categories.iter().any(|c| self.categories.contains(c)) {
                        self.categories_matched += 1;
                    } else {
                        passed = false;
                    }
                }

                excluded_categories = categories
                    .iter()
                    .filter(|c| self.excluded.contains(*c))
                    .cloned()
                    .collect();
                if !excluded_categories.is_empty() {
                    passed = false;
                }
            }
            content_categories = categories;
        }

        if !analyzed {
            return None;
        }
        self.analyzed += 1;
        if passed {
            self.passed += 1;
        }

        Some(SectionResult::Contextual(ContextualSection {
            passed,
            languages: scalars.remove(&ContextualField::Languages),
            content_quality: scalars.remove(&ContextualField::ContentQuality),
            content_type: scalars.remove(&ContextualField::ContentType),
            content_categories,
            excluded_categories,
        }))
    }

    pub fn get_results(&self) -> ContextualResults {
        let fields = self
            .allowed
            .iter()
            .map(|(field, allowed)| {
                let breakdown = self
                    .field_tallies
                    .get(field)
                    .map(|tally| {
                        tally
                            .occurrences
                            .sorted()
                            .into_iter()
                            .map(|(value, count)| ValueOccurrence {
                                value: value.to_string(),
                                count,
                                percent: score(count, tally.observed),
                                targeted: allowed.contains(value),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                (*field, breakdown)
            })
            .collect();

        let occurrences: Vec<CategoryOccurrence> = self
            .category_occurrences
            .sorted()
            .into_iter()
            .map(|(category, count)| CategoryOccurrence {
                category: category.to_string(),
                count,
                percent_occurrence: score(count, self.categories_seen),
                targeted: self.categories.contains(category),
            })
            .collect();
        let top_occurrences = occurrences
            .iter()
            .take(TOP_OCCURRENCES_MAX)
            .map(|o| o.category.clone())
            .collect();

        ContextualResults {
            fields,
            content_categories: CategoryBreakdown {
                occurrences,
                top_occurrences,
                matched_percent: score(self.categories_matched, self.categories_checked),
            },
            channels_analyzed: self.analyzed,
            channels_passed: self.passed,
            overall_score: self
                .is_configured()
                .then(|| score(self.passed, self.analyzed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use channel_audit_core::types::{FactValue, Facts};

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn channel(
        id: &str,
        categories: &[&str],
        language: &str,
        quality: f64,
        content_type: f64,
    ) -> ChannelAnalysis {
        let mut facts = Facts::new();
        facts.insert(
            fields::CONTENT_CATEGORIES.to_string(),
            FactValue::List(categories.iter().map(|c| c.to_string()).collect()),
        );
        facts.insert(fields::LANGUAGES.to_string(), FactValue::Text(language.to_string()));
        facts.insert(fields::CONTENT_QUALITY.to_string(), FactValue::Number(quality));
        facts.insert(fields::CONTENT_TYPE.to_string(), FactValue::Number(content_type));
        ChannelAnalysis::new(id, facts)
    }

    fn full_params() -> AnalysisParams {
        AnalysisParams {
            content_categories: set(&["Movies"]),
            content_quality: set(&["0"]),
            content_type: set(&["0"]),
            languages: set(&["en"]),
            ..Default::default()
        }
    }

    #[test]
    fn test_single_channel_passes() {
        let mut analyzer = ContextualAnalyzer::new(&full_params());
        let result = analyzer
            .analyze(&channel("UC1", &["Movies"], "en", 0.0, 0.0))
            .unwrap();
        assert!(result.passed());
    }

    #[test]
    fn test_category_mismatch_fails_even_if_others_pass() {
        let mut analyzer = ContextualAnalyzer::new(&full_params());
        let result = analyzer
            .analyze(&channel("UC1", &["Automotive"], "en", 0.0, 0.0))
            .unwrap();
        assert!(!result.passed());
    }

    #[test]
    fn test_scalar_mismatch_fails() {
        let mut analyzer = ContextualAnalyzer::new(&full_params());
        let result = analyzer
            .analyze(&channel("UC1", &["Movies"], "ko", 0.0, 0.0))
            .unwrap();
        assert!(!result.passed());
    }

    #[test]
    fn test_unconfigured_fields_not_analyzed() {
        let params = AnalysisParams {
            content_type: set(&["0"]),
            languages: set(&["en"]),
            ..Default::default()
        };
        let mut analyzer = ContextualAnalyzer::new(&params);
        let result = analyzer
            .analyze(&channel("UC1", &["Music"], "en", 1.0, 0.0))
            .unwrap();
        assert!(result.passed());

        let results = analyzer.get_results();
        assert!(!results.fields.contains_key(&ContextualField::ContentQuality));
        assert!(results.content_categories.occurrences.is_empty());
        assert_eq!(results.overall_score, Some(100.0));
    }

    #[test]
    fn test_matched_percent() {
        let params = AnalysisParams {
            content_categories: set(&["Music", "Movies", "Television"]),
            ..Default::default()
        };
        let mut analyzer = ContextualAnalyzer::new(&params);
        analyzer.analyze(&channel("UC1", &["Music", "Movies", "Television"], "en", 0.0, 0.0));
        analyzer.analyze(&channel("UC2", &["Music"], "en", 0.0, 0.0));
        analyzer.analyze(&channel("UC3", &["Cars"], "en", 0.0, 0.0));

        let results = analyzer.get_results();
        assert_eq!(results.content_categories.matched_percent, 66.6667);
        assert_eq!(results.overall_score, Some(66.6667));
    }

    #[test]
    fn test_category_occurrence_ordering() {
        let params = AnalysisParams {
            content_categories: set(&["Music"]),
            ..Default::default()
        };
        let mut analyzer = ContextualAnalyzer::new(&params);
        analyzer.analyze(&channel("UC1", &["Cars", "Music"], "en", 0.0, 0.0));
        analyzer.analyze(&channel("UC2", &["Music", "Sports"], "en", 0.0, 0.0));
        analyzer.analyze(&channel("UC3", &["Sports"], "en", 0.0, 0.0));

        let results = analyzer.get_results();
        let order: Vec<&str> = results
            .content_categories
            .occurrences
            .iter()
            .map(|o| o.category.as_str())
            .collect();
        // Music and Sports tie at 2; Music was seen first.
        assert_eq!(order, vec!["Music", "Sports", "Cars"]);
        assert!(results.content_categories.occurrences[0].targeted);
        assert_eq!(results.content_categories.occurrences[2].percent_occurrence, 33.3333);
        assert_eq!(results.content_categories.top_occurrences.len(), 3);
    }

    #[test]
    fn test_exclusion_overrides_inclusion() {
        let params = AnalysisParams {
            content_categories: set(&["Music"]),
            exclude_content_categories: set(&["Kids"]),
            ..Default::default()
        };
        let mut analyzer = ContextualAnalyzer::new(&params);
        let result = analyzer
            .analyze(&channel("UC1", &["Music", "Kids"], "en", 0.0, 0.0))
            .unwrap();
        assert!(!result.passed());
        match result {
            SectionResult::Contextual(s) => assert_eq!(s.excluded_categories, vec!["Kids"]),
            other => panic!("unexpected section {other:?}"),
        }
    }

    #[test]
    fn test_exclusion_only_configuration() {
        let params = AnalysisParams {
            exclude_content_categories: set(&["Kids"]),
            ..Default::default()
        };
        let mut analyzer = ContextualAnalyzer::new(&params);
        assert!(analyzer
            .analyze(&channel("UC1", &["Music"], "en", 0.0, 0.0))
            .unwrap()
            .passed());
        assert!(!analyzer
            .analyze(&channel("UC2", &["Kids"], "en", 0.0, 0.0))
            .unwrap()
            .passed());
        assert_eq!(analyzer.get_results().overall_score, Some(50.0));
    }

    #[test]
    fn test_empty_category_list_fails_allow_list() {
        let params = AnalysisParams {
            content_categories: set(&["Music"]),
            ..Default::default()
        };
        let mut analyzer = ContextualAnalyzer::new(&params);
        let result = analyzer.analyze(&channel("UC1", &[], "en", 0.0, 0.0)).unwrap();
        assert!(!result.passed());
    }

    #[test]
    fn test_channel_without_facts_is_skipped() {
        let mut analyzer = ContextualAnalyzer::new(&full_params());
        assert!(analyzer
            .analyze(&ChannelAnalysis::new("UC1", Facts::new()))
            .is_none());
        let results = analyzer.get_results();
        assert_eq!(results.channels_analyzed, 0);
        assert_eq!(results.overall_score, Some(0.0));
    }

    #[test]
    fn test_field_breakdown() {
        let params = AnalysisParams {
            languages: set(&["en"]),
            ..Default::default()
        };
        let mut analyzer = ContextualAnalyzer::new(&params);
        analyzer.analyze(&channel("UC1", &[], "es", 0.0, 0.0));
        analyzer.analyze(&channel("UC2", &[], "en", 0.0, 0.0));
        analyzer.analyze(&channel("UC3", &[], "en", 0.0, 0.0));
        analyzer.analyze(&channel("UC4", &[], "en", 0.0, 0.0));

        let results = analyzer.get_results();
        let languages = &results.fields[&ContextualField::Languages];
        assert_eq!(languages[0].value, "en");
        assert_eq!(languages[0].count, 3);
        assert_eq!(languages[0].percent, 75.0);
        assert!(languages[0].targeted);
        assert_eq!(languages[1].value, "es");
        assert!(!languages[1].targeted);
        assert_eq!(results.overall_score, Some(75.0));
    }
}
