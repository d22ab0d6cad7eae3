//! The list of dimensions active for a run, built once from the campaign
//! params and driven uniformly by the executor.

use channel_audit_core::analysis::Dimension;
use channel_audit_core::types::AnalysisParams;
use channel_audit_core::{ChannelAnalysis, SectionResult};
use serde::{Deserialize, Serialize};

use crate::contextual::{ContextualAnalyzer, ContextualResults};
use crate::performance::{PerformanceAnalyzer, PerformanceResults};
use crate::suitability::{SuitabilityAnalyzer, SuitabilityResults};

pub enum DimensionAnalyzer {
    Performance(PerformanceAnalyzer),
    Contextual(ContextualAnalyzer),
    Suitability(SuitabilityAnalyzer),
}

impl DimensionAnalyzer {
    /// Fresh analyzers for one run. Performance is always present so cost
    /// averages are reported; the metadata dimensions only when the params
    /// give them something to check.
    pub fn configured(params: &AnalysisParams) -> Vec<DimensionAnalyzer> {
        let mut analyzers = vec![DimensionAnalyzer::Performance(PerformanceAnalyzer::new(params))];
        if params.has_contextual_criteria() {
            analyzers.push(DimensionAnalyzer::Contextual(ContextualAnalyzer::new(params)));
        }
        if params.has_suitability_criteria() {
            analyzers.push(DimensionAnalyzer::Suitability(SuitabilityAnalyzer::new(params)));
        }
        analyzers
    }

    pub fn dimension(&self) -> Dimension {
        match self {
            DimensionAnalyzer::Performance(_) => Dimension::Performance,
            DimensionAnalyzer::Contextual(_) => Dimension::Contextual,
            DimensionAnalyzer::Suitability(_) => Dimension::Suitability,
        }
    }

    /// Whether the dimension reads facts from the metadata source.
    pub fn needs_metadata(&self) -> bool {
        !matches!(self, DimensionAnalyzer::Performance(_))
    }

    pub fn analyze(&mut self, channel: &ChannelAnalysis) -> Option<SectionResult> {
        match self {
            DimensionAnalyzer::Performance(a) => a.analyze(channel),
            DimensionAnalyzer::Contextual(a) => a.analyze(channel),
            DimensionAnalyzer::Suitability(a) => a.analyze(channel),
        }
    }

    /// Analyze and record the outcome on the channel. Returns whether the
    /// dimension evaluated it.
    pub fn apply(&mut self, channel: &mut ChannelAnalysis) -> bool {
        match self.analyze(channel) {
            Some(result) => {
                channel.add_result(result);
                true
            }
            None => false,
        }
    }

    pub fn get_results(&self) -> DimensionResults {
        match self {
            DimensionAnalyzer::Performance(a) => DimensionResults::Performance(a.get_results()),
            DimensionAnalyzer::Contextual(a) => DimensionResults::Contextual(a.get_results()),
            DimensionAnalyzer::Suitability(a) => DimensionResults::Suitability(a.get_results()),
        }
    }
}

/// Aggregate produced by one dimension at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dimension", rename_all = "snake_case")]
pub enum DimensionResults {
    Performance(PerformanceResults),
    Contextual(ContextualResults),
    Suitability(SuitabilityResults),
}

impl DimensionResults {
    pub fn overall_score(&self) -> Option<f64> {
        match self {
            DimensionResults::Performance(r) => r.overall_score,
            DimensionResults::Contextual(r) => r.overall_score,
            DimensionResults::Suitability(r) => r.overall_score,
        }
    }
}

/// Mean of every reported dimension score, or `None` when no dimension had
/// criteria to apply.
pub fn total_score(results: &[DimensionResults]) -> Option<f64> {
    let scores: Vec<f64> = results.iter().filter_map(|r| r.overall_score()).collect();
    if scores.is_empty() {
        return None;
    }
    let sum: f64 = scores.iter().sum();
    Some(channel_audit_core::scoring::round_to(
        sum / scores.len() as f64,
        channel_audit_core::scoring::SCORE_PRECISION,
    ))
}
