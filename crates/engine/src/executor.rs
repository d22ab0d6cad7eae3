//! Campaign analysis run: fetch delivery rows, build one record per
//! channel, run the performance pass, merge metadata in batches for the
//! contextual and suitability passes, then classify, summarise and export.

use channel_audit_core::scoring::{coerce_number, round_to, score, CoerceKind, SCORE_PRECISION};
use channel_audit_core::types::{fields, normalize_channel_id, RunConfig};
use channel_audit_core::{
    AnalysisParams, AuditError, AuditResult, ChannelAnalysis, EngineConfig, RawMetricRow,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::batcher::MetadataBatcher;
use crate::dimensions::{total_score, DimensionAnalyzer, DimensionResults};
use crate::sources::{
    ChannelMetadataSource, DeliverySourceRegistry, ExportKeys, ExportRequest,
    FallbackCandidateSource, FallbackQuery, ResultsExporter, UncleanChannel,
};

/// Spend and channel share attributable to unclean channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WastageStatistics {
    pub total_channels: u64,
    pub unclean_channels: u64,
    /// Percent of channels that are unclean.
    pub wastage_percent: f64,
    pub total_spend: f64,
    pub wastage_spend: f64,
    /// Percent of total spend that went to unclean channels.
    pub wastage_spend_percent: f64,
}

/// Everything a completed run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub run_id: Uuid,
    pub campaign_id: String,
    pub completed_at: DateTime<Utc>,
    pub channels: Vec<ChannelAnalysis>,
    pub results: Vec<DimensionResults>,
    pub total_score: Option<f64>,
    pub wastage: WastageStatistics,
    pub recommended_ids: Vec<String>,
    pub export: ExportKeys,
}

impl AuditReport {
    pub fn channel(&self, channel_id: &str) -> Option<&ChannelAnalysis> {
        self.channels.iter().find(|c| c.channel_id == channel_id)
    }
}

/// External systems a run talks to.
pub struct AuditCollaborators {
    pub delivery: DeliverySourceRegistry,
    pub metadata: Arc<dyn ChannelMetadataSource>,
    pub fallback: Option<Arc<dyn FallbackCandidateSource>>,
    pub exporter: Arc<dyn ResultsExporter>,
}

/// Drives a single campaign analysis. Analyzer state is created per run, so
/// one executor can serve consecutive runs.
pub struct ExecutorAnalyzer {
    params: AnalysisParams,
    engine: EngineConfig,
    collaborators: AuditCollaborators,
}

impl ExecutorAnalyzer {
    pub fn new(
        params: AnalysisParams,
        engine: EngineConfig,
        collaborators: AuditCollaborators,
    ) -> Self {
        Self {
            params,
            engine,
            collaborators,
        }
    }

    /// Run to completion without external cancellation.
    pub async fn run(&self, run: &RunConfig) -> AuditResult<AuditReport> {
        let (_keep, cancel) = watch::channel(false);
        self.run_with_cancel(run, &cancel).await
    }

    /// Run the analysis. Only delivery fetch failures, export failures and
    /// cancellation end the run early; a cancelled run exports nothing.
    pub async fn run_with_cancel(
        &self,
        run: &RunConfig,
        cancel: &watch::Receiver<bool>,
    ) -> AuditResult<AuditReport> {
        let start = std::time::Instant::now();
        info!(campaign_id = %run.campaign_id, "Starting channel analysis");

        // Fetch
        let source = self.collaborators.delivery.select(run)?;
        let rows = until_cancelled(cancel, source.fetch(run)).await??;
        let row_count = rows.len();

        // Materialize
        let mut channels = materialize(rows);
        metrics::counter!("audit.channels_materialized").increment(channels.len() as u64);
        info!(
            campaign_id = %run.campaign_id,
            source = ?source.source_type(),
            rows = row_count,
            channels = channels.len(),
            "Delivery data materialized"
        );

        let mut analyzers = DimensionAnalyzer::configured(&self.params);

        // Performance pass uses delivery facts only.
        for analyzer in analyzers.iter_mut().filter(|a| !a.needs_metadata()) {
            for channel in channels.iter_mut() {
                analyzer.apply(channel);
            }
        }

        // Metadata batches feed the contextual and suitability passes.
        if analyzers.iter().any(|a| a.needs_metadata()) {
            self.metadata_pass(&mut channels, &mut analyzers, cancel)
                .await?;
        }

        let results: Vec<DimensionResults> = analyzers.iter().map(|a| a.get_results()).collect();
        let total_score = total_score(&results);
        let wastage = wastage_statistics(&channels);
        info!(
            campaign_id = %run.campaign_id,
            unclean = wastage.unclean_channels,
            wastage_percent = wastage.wastage_percent,
            wastage_spend = wastage.wastage_spend,
            "Channels classified"
        );

        // Export handoff. The export itself is not interrupted once started.
        let recommended_ids = until_cancelled(cancel, self.recommended_ids(&channels)).await?;
        ensure_not_cancelled(cancel)?;
        let request = ExportRequest {
            campaign_id: run.campaign_id.clone(),
            recommended_ids: recommended_ids.clone(),
            unclean: channels
                .iter()
                .filter(|c| !c.clean)
                .map(|c| UncleanChannel {
                    channel_id: c.channel_id.clone(),
                    facts: c.facts.clone(),
                    section_results: c.section_results.clone(),
                })
                .collect(),
        };
        let export = self.collaborators.exporter.export(&request).await?;

        info!(
            campaign_id = %run.campaign_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            recommended = recommended_ids.len(),
            "Channel analysis complete"
        );

        Ok(AuditReport {
            run_id: Uuid::new_v4(),
            campaign_id: run.campaign_id.clone(),
            completed_at: Utc::now(),
            channels,
            results,
            total_score,
            wastage,
            recommended_ids,
            export,
        })
    }

    async fn metadata_pass(
        &self,
        channels: &mut [ChannelAnalysis],
        analyzers: &mut [DimensionAnalyzer],
        cancel: &watch::Receiver<bool>,
    ) -> AuditResult<()> {
        let index: HashMap<String, usize> = channels
            .iter()
            .enumerate()
            .map(|(i, c)| (c.channel_id.clone(), i))
            .collect();
        let ids: Vec<String> = channels.iter().map(|c| c.channel_id.clone()).collect();
        let batcher = MetadataBatcher::new(
            self.collaborators.metadata.clone(),
            self.engine.metadata_batch_size,
        );
        info!(
            channels = ids.len(),
            batch_size = batcher.max_batch_size(),
            "Fetching channel metadata"
        );

        for (batch_no, batch) in batcher.batches(&ids).enumerate() {
            // Documents are applied only once the whole batch has arrived.
            let outcome = until_cancelled(cancel, batcher.fetch(batch)).await?;
            metrics::counter!("audit.metadata_batches").increment(1);

            if !outcome.missing.is_empty() {
                metrics::counter!("audit.metadata_batch_gaps").increment(1);
                warn!(
                    batch = batch_no,
                    missing = outcome.missing.len(),
                    requested = batch.len(),
                    "Metadata batch omitted channels"
                );
            }

            for doc in &outcome.documents {
                let Some(&i) = index.get(&doc.channel_id) else {
                    continue;
                };
                let channel = &mut channels[i];
                channel.add_facts(doc.to_facts());
                for analyzer in analyzers.iter_mut().filter(|a| a.needs_metadata()) {
                    analyzer.apply(channel);
                }
            }
            debug!(
                batch = batch_no,
                merged = outcome.documents.len(),
                "Metadata batch analyzed"
            );
        }
        Ok(())
    }

    /// Clean channel ids up to the export limit, topped up from the fallback
    /// source with ids not already classified in this run.
    async fn recommended_ids(&self, channels: &[ChannelAnalysis]) -> Vec<String> {
        let limit = self.engine.export_limit;
        let mut recommended: Vec<String> = channels
            .iter()
            .filter(|c| c.clean)
            .map(|c| c.channel_id.clone())
            .take(limit)
            .collect();

        let fallback = match &self.collaborators.fallback {
            Some(fallback) if self.engine.fallback_enabled && recommended.len() < limit => fallback,
            _ => return recommended,
        };

        let mut seen: HashSet<String> = channels.iter().map(|c| c.channel_id.clone()).collect();
        let query = FallbackQuery::from(&self.params);
        let mut offset = 0;
        while recommended.len() < limit {
            let wanted = limit - recommended.len();
            let page = match fallback.candidates(&query, offset, wanted).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(error = %e, "Fallback candidates unavailable, export left short");
                    break;
                }
            };
            offset += page.len();
            let exhausted = page.len() < wanted;
            let before = recommended.len();
            for id in page {
                if recommended.len() >= limit {
                    break;
                }
                if seen.insert(id.clone()) {
                    recommended.push(id);
                }
            }
            if exhausted {
                break;
            }
            if recommended.len() == before {
                debug!(offset, "Fallback page added no new channels, stopping top-up");
                break;
            }
        }
        recommended
    }
}

/// One record per first-seen channel id. Rows without a recoverable id are
/// dropped; later rows for a known id are ignored.
pub fn materialize(rows: Vec<RawMetricRow>) -> Vec<ChannelAnalysis> {
    let mut seen = HashSet::new();
    let mut channels = Vec::new();
    let mut discarded = 0u64;

    for row in rows {
        let Some(channel_id) = row.channel_id.as_deref().and_then(normalize_channel_id) else {
            discarded += 1;
            continue;
        };
        if seen.insert(channel_id.clone()) {
            channels.push(ChannelAnalysis::new(channel_id, row.values));
        }
    }

    if discarded > 0 {
        metrics::counter!("audit.rows_discarded").increment(discarded);
        debug!(discarded, "Dropped delivery rows without a channel id");
    }
    channels
}

pub fn wastage_statistics(channels: &[ChannelAnalysis]) -> WastageStatistics {
    let cost = |c: &ChannelAnalysis| {
        c.get(fields::COST)
            .and_then(|v| coerce_number(v, CoerceKind::Currency))
            .unwrap_or(0.0)
    };
    let total_spend: f64 = channels.iter().map(cost).sum();
    let unclean: Vec<&ChannelAnalysis> = channels.iter().filter(|c| !c.clean).collect();
    let wastage_spend: f64 = unclean.iter().map(|c| cost(*c)).sum();
    let wastage_spend_percent = if total_spend > 0.0 {
        round_to(wastage_spend / total_spend * 100.0, SCORE_PRECISION)
    } else {
        0.0
    };

    WastageStatistics {
        total_channels: channels.len() as u64,
        unclean_channels: unclean.len() as u64,
        wastage_percent: score(unclean.len() as u64, channels.len() as u64),
        total_spend,
        wastage_spend,
        wastage_spend_percent,
    }
}

fn ensure_not_cancelled(cancel: &watch::Receiver<bool>) -> AuditResult<()> {
    if *cancel.borrow() {
        return Err(AuditError::Cancelled);
    }
    Ok(())
}

/// Drive `work` unless the run is cancelled first, in which case the
/// in-flight request is dropped.
async fn until_cancelled<F: Future>(
    cancel: &watch::Receiver<bool>,
    work: F,
) -> AuditResult<F::Output> {
    ensure_not_cancelled(cancel)?;
    let mut cancel = cancel.clone();
    tokio::select! {
        output = work => Ok(output),
        _ = cancelled(&mut cancel) => {
            metrics::counter!("audit.runs_cancelled").increment(1);
            Err(AuditError::Cancelled)
        }
    }
}

/// Resolves once the flag turns true. A dropped sender can no longer
/// cancel, so the wait never resolves in that case.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
