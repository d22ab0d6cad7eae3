//! Brand-safety dimension.

use channel_audit_core::analysis::{SectionResult, SuitabilitySection};
use channel_audit_core::scoring::{coerce_number, score, CoerceKind};
use channel_audit_core::types::{fields, AnalysisParams};
use channel_audit_core::ChannelAnalysis;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuitabilityResults {
    pub score_threshold: Option<f64>,
    pub passed: u64,
    pub failed: u64,
    pub overall_score: Option<f64>,
}

pub struct SuitabilityAnalyzer {
    threshold: Option<f64>,
    passed: u64,
    failed: u64,
}

impl SuitabilityAnalyzer {
    pub fn new(params: &AnalysisParams) -> Self {
        Self {
            threshold: params.score_threshold,
            passed: 0,
            failed: 0,
        }
    }

    /// A channel passes when its overall brand-safety score is strictly
    /// above the threshold. Channels without a usable score are skipped.
    pub fn analyze(&mut self, channel: &ChannelAnalysis) -> Option<SectionResult> {
        let threshold = self.threshold?;
        let overall_score = channel
            .get(fields::BRAND_SAFETY_SCORE)
            .and_then(|v| coerce_number(v, CoerceKind::Plain))?;

        let passed = overall_score > threshold;
        if passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        Some(SectionResult::Suitability(SuitabilitySection {
            passed,
            overall_score,
        }))
    }

    pub fn get_results(&self) -> SuitabilityResults {
        SuitabilityResults {
            score_threshold: self.threshold,
            passed: self.passed,
            failed: self.failed,
            overall_score: self
                .threshold
                .map(|_| score(self.passed, self.passed + self.failed)),
        }
    }
}
