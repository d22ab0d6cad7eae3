//! Collaborator contracts consumed by the executor. Implementations live
//! outside the engine (platform APIs, document index, object storage).

use async_trait::async_trait;
use channel_audit_core::analysis::{Dimension, SectionResult};
use channel_audit_core::types::{DataSourceType, RunConfig};
use channel_audit_core::{
    AnalysisParams, AuditError, AuditResult, Facts, MetadataDocument, RawMetricRow,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Delivery metrics for a campaign from one platform.
#[async_trait]
pub trait DeliveryMetricsSource: Send + Sync {
    fn source_type(&self) -> DataSourceType;

    /// A structural failure must be reported as [`AuditError::DataFetch`].
    async fn fetch(&self, run: &RunConfig) -> AuditResult<Vec<RawMetricRow>>;
}

/// Contextual and brand-safety metadata, looked up by channel id.
#[async_trait]
pub trait ChannelMetadataSource: Send + Sync {
    /// Documents for the requested ids. Ids without a document are simply
    /// absent from the response.
    async fn fetch_batch(&self, channel_ids: &[String]) -> AuditResult<Vec<MetadataDocument>>;
}

/// Ranked supplementary channel ids used to top up the recommended export.
#[async_trait]
pub trait FallbackCandidateSource: Send + Sync {
    /// One page of candidates, starting at `offset`. A page shorter than
    /// `limit` means the source is exhausted.
    async fn candidates(
        &self,
        query: &FallbackQuery,
        offset: usize,
        limit: usize,
    ) -> AuditResult<Vec<String>>;
}

/// Durable-storage handoff of the classified channel set.
#[async_trait]
pub trait ResultsExporter: Send + Sync {
    async fn export(&self, request: &ExportRequest) -> AuditResult<ExportKeys>;
}

/// Criteria a fallback candidate must satisfy, taken from the campaign params.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FallbackQuery {
    pub content_categories: BTreeSet<String>,
    pub exclude_content_categories: BTreeSet<String>,
    pub languages: BTreeSet<String>,
    pub content_quality: BTreeSet<String>,
    pub content_type: BTreeSet<String>,
    pub score_threshold: Option<f64>,
}

impl From<&AnalysisParams> for FallbackQuery {
    fn from(params: &AnalysisParams) -> Self {
        Self {
            content_categories: params.content_categories.clone(),
            exclude_content_categories: params.exclude_content_categories.clone(),
            languages: params.languages.clone(),
            content_quality: params.content_quality.clone(),
            content_type: params.content_type.clone(),
            score_threshold: params.score_threshold,
        }
    }
}

/// An unclean channel with the detail of every dimension that saw it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncleanChannel {
    pub channel_id: String,
    pub facts: Facts,
    pub section_results: BTreeMap<Dimension, SectionResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub campaign_id: String,
    /// Clean channel ids, topped up from the fallback source when short.
    pub recommended_ids: Vec<String>,
    pub unclean: Vec<UncleanChannel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportKeys {
    pub recommended_key: String,
    pub wastage_key: String,
}

/// Delivery sources available to the executor, one per platform.
#[derive(Default, Clone)]
pub struct DeliverySourceRegistry {
    sources: HashMap<DataSourceType, Arc<dyn DeliveryMetricsSource>>,
}

impl DeliverySourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, source: Arc<dyn DeliveryMetricsSource>) -> Self {
        self.sources.insert(source.source_type(), source);
        self
    }

    /// Pick exactly one source for the run: an uploaded CSV wins, otherwise
    /// the campaign's OAuth connection decides.
    pub fn select(&self, run: &RunConfig) -> AuditResult<Arc<dyn DeliveryMetricsSource>> {
        let source_type = run.source_type().ok_or_else(|| {
            AuditError::DataFetch(format!(
                "campaign {} has neither an uploaded CSV nor an OAuth connection",
                run.campaign_id
            ))
        })?;
        debug!(campaign_id = %run.campaign_id, source = ?source_type, "Selected delivery source");
        self.sources.get(&source_type).cloned().ok_or_else(|| {
            AuditError::DataFetch(format!("no delivery source registered for {source_type:?}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use channel_audit_core::types::OAuthType;

    struct StaticSource(DataSourceType);

    #[async_trait]
    impl DeliveryMetricsSource for StaticSource {
        fn source_type(&self) -> DataSourceType {
            self.0
        }

        async fn fetch(&self, _run: &RunConfig) -> AuditResult<Vec<RawMetricRow>> {
            Ok(vec![])
        }
    }

    fn run(csv_key: Option<&str>, oauth_type: Option<OAuthType>) -> RunConfig {
        RunConfig {
            campaign_id: "c1".to_string(),
            csv_key: csv_key.map(str::to_string),
            oauth_type,
        }
    }

    #[test]
    fn test_select_by_run_config() {
        let registry = DeliverySourceRegistry::new()
            .register(Arc::new(StaticSource(DataSourceType::GoogleAds)))
            .register(Arc::new(StaticSource(DataSourceType::Dv360)))
            .register(Arc::new(StaticSource(DataSourceType::Csv)));

        let selected = registry.select(&run(None, Some(OAuthType::GoogleAds))).unwrap();
        assert_eq!(selected.source_type(), DataSourceType::GoogleAds);
        let selected = registry
            .select(&run(Some("uploads/c1.csv"), Some(OAuthType::Dv360)))
            .unwrap();
        assert_eq!(selected.source_type(), DataSourceType::Csv);
    }

    #[test]
    fn test_select_failures_are_fetch_errors() {
        let registry =
            DeliverySourceRegistry::new().register(Arc::new(StaticSource(DataSourceType::Csv)));
        assert!(matches!(
            registry.select(&run(None, None)),
            Err(AuditError::DataFetch(_))
        ));
        assert!(matches!(
            registry.select(&run(None, Some(OAuthType::Dv360))),
            Err(AuditError::DataFetch(_))
        ));
    }

    #[test]
    fn test_fallback_query_from_params() {
        let params = AnalysisParams {
            score_threshold: Some(79.0),
            languages: ["en".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let query = FallbackQuery::from(&params);
        assert_eq!(query.score_threshold, Some(79.0));
        assert!(query.languages.contains("en"));
    }
}
