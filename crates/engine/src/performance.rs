//! Delivery-metric dimension: compares cost and rate metrics against
//! campaign thresholds.

use channel_audit_core::analysis::{PerformanceSection, SectionResult};
use channel_audit_core::scoring::{average, coerce_number, score};
use channel_audit_core::types::{AnalysisParams, Metric};
use channel_audit_core::ChannelAnalysis;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default)]
struct MetricTally {
    passed: u64,
    failed: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct RunningSum {
    sum: f64,
    count: u64,
}

/// Per-metric line of the performance summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub threshold: Option<f64>,
    pub passed: u64,
    pub failed: u64,
    /// Percent of compared channels that passed. `None` when no threshold is set.
    pub performance: Option<f64>,
    /// Campaign-wide mean, reported for cost metrics only.
    pub avg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceResults {
    pub metrics: BTreeMap<Metric, MetricSummary>,
    pub channels_analyzed: u64,
    pub channels_passed: u64,
    pub overall_score: Option<f64>,
}

pub struct PerformanceAnalyzer {
    thresholds: BTreeMap<Metric, f64>,
    tallies: BTreeMap<Metric, MetricTally>,
    sums: BTreeMap<Metric, RunningSum>,
    analyzed: u64,
    passed: u64,
}

impl PerformanceAnalyzer {
    pub fn new(params: &AnalysisParams) -> Self {
        let thresholds = Metric::ALL
            .iter()
            .filter_map(|m| params.threshold(*m).map(|t| (*m, t)))
            .collect();
        Self {
            thresholds,
            tallies: BTreeMap::new(),
            sums: BTreeMap::new(),
            analyzed: 0,
            passed: 0,
        }
    }

    /// Evaluate one channel. Returns `None` when no configured metric could
    /// be compared, in which case the channel is left out of every total.
    pub fn analyze(&mut self, channel: &ChannelAnalysis) -> Option<SectionResult> {
        let mut metrics = BTreeMap::new();
        let mut failed_metrics = Vec::new();

        for metric in Metric::ALL {
            let value = match channel
                .get(metric.field_name())
                .and_then(|v| coerce_number(v, metric.coerce_kind()))
            {
                Some(v) => v,
                None => continue,
            };

            if metric.is_averaged() {
                let running = self.sums.entry(metric).or_default();
                running.sum += value;
                running.count += 1;
            }

            let Some(threshold) = self.thresholds.get(&metric).copied() else {
                continue;
            };
            let tally = self.tallies.entry(metric).or_default();
            if metric.direction().passes(value, threshold) {
                tally.passed += 1;
            } else {
                tally.failed += 1;
                failed_metrics.push(metric);
            }
            metrics.insert(metric, value);
        }

        if metrics.is_empty() {
            return None;
        }

        let passed = failed_metrics.is_empty();
        self.analyzed += 1;
        if passed {
            self.passed += 1;
        }
        Some(SectionResult::Performance(PerformanceSection {
            passed,
            metrics,
            failed_metrics,
        }))
    }

    pub fn get_results(&self) -> PerformanceResults {
        let metrics = Metric::ALL
            .iter()
            .map(|metric| {
                let tally = self.tallies.get(metric).copied().unwrap_or_default();
                let threshold = self.thresholds.get(metric).copied();
                let performance =
                    threshold.map(|_| score(tally.passed, tally.passed + tally.failed));
                let avg = self
                    .sums
                    .get(metric)
                    .and_then(|running| average(running.sum, running.count));
                (
                    *metric,
                    MetricSummary {
                        threshold,
                        passed: tally.passed,
                        failed: tally.failed,
                        performance,
                        avg,
                    },
                )
            })
            .collect();

        let overall_score =
            (!self.thresholds.is_empty()).then(|| score(self.passed, self.analyzed));

        PerformanceResults {
            metrics,
            channels_analyzed: self.analyzed,
            channels_passed: self.passed,
            overall_score,
        }
    }
}
