//! File-backed collaborators for running an audit from local JSON exports.

use async_trait::async_trait;
use channel_audit_core::scoring::{coerce, coerce_number, CoerceKind};
use channel_audit_core::types::{fields, DataSourceType, FactValue, RunConfig};
use channel_audit_core::{AuditError, AuditResult, MetadataDocument, RawMetricRow};
use channel_audit_engine::{
    ChannelMetadataSource, CsvColumnMapping, DeliveryMetricsSource, ExportKeys, ExportRequest,
    FallbackCandidateSource, FallbackQuery, ResultsExporter,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

async fn read_json<T: DeserializeOwned>(path: &Path) -> AuditResult<T> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Delivery rows exported from an ads platform as a JSON array.
pub struct JsonDeliverySource {
    source_type: DataSourceType,
    path: PathBuf,
    /// Google Ads reports cost in millionths of the account currency.
    cost_in_micros: bool,
}

impl JsonDeliverySource {
    pub fn new(source_type: DataSourceType, path: impl Into<PathBuf>) -> Self {
        Self {
            source_type,
            path: path.into(),
            cost_in_micros: source_type == DataSourceType::GoogleAds,
        }
    }
}

/// Rewrite micro-unit costs as currency units. A cost that cannot be read
/// is dropped and counts as no spend.
fn scale_micro_costs(rows: &mut [RawMetricRow]) {
    for row in rows {
        let Some(raw) = row.values.remove(fields::COST) else {
            continue;
        };
        if let Some(cost) = coerce_number(&raw, CoerceKind::Micros) {
            row.values
                .insert(fields::COST.to_string(), FactValue::Number(cost));
        }
    }
}

#[async_trait]
impl DeliveryMetricsSource for JsonDeliverySource {
    fn source_type(&self) -> DataSourceType {
        self.source_type
    }

    async fn fetch(&self, run: &RunConfig) -> AuditResult<Vec<RawMetricRow>> {
        let mut rows: Vec<RawMetricRow> = read_json(&self.path).await.map_err(|e| {
            AuditError::DataFetch(format!("{}: {e}", self.path.display()))
        })?;
        if self.cost_in_micros {
            scale_micro_costs(&mut rows);
        }
        info!(campaign_id = %run.campaign_id, rows = rows.len(), "Loaded delivery rows");
        Ok(rows)
    }
}

/// An uploaded CSV after splitting, with the column mapping the user chose.
#[derive(Debug, Deserialize)]
pub struct CsvUpload {
    pub header: Vec<String>,
    pub records: Vec<Vec<String>>,
    pub mapping: CsvColumnMapping,
}

/// Resolves the run's CSV key as a path to a [`CsvUpload`] file.
pub struct CsvUploadSource;

#[async_trait]
impl DeliveryMetricsSource for CsvUploadSource {
    fn source_type(&self) -> DataSourceType {
        DataSourceType::Csv
    }

    async fn fetch(&self, run: &RunConfig) -> AuditResult<Vec<RawMetricRow>> {
        let key = run
            .csv_key
            .as_deref()
            .ok_or_else(|| AuditError::DataFetch("run has no CSV key".to_string()))?;
        let upload: CsvUpload = read_json(Path::new(key))
            .await
            .map_err(|e| AuditError::DataFetch(format!("{key}: {e}")))?;
        upload.mapping.rows(&upload.header, &upload.records)
    }
}

/// Metadata documents held in memory, keyed by channel id.
pub struct DocumentIndex {
    documents: HashMap<String, MetadataDocument>,
}

impl DocumentIndex {
    pub async fn load(path: &Path) -> AuditResult<Self> {
        let documents: Vec<MetadataDocument> = read_json(path).await?;
        debug!(documents = documents.len(), "Loaded metadata index");
        Ok(Self::from_documents(documents))
    }

    pub fn from_documents(documents: Vec<MetadataDocument>) -> Self {
        Self {
            documents: documents
                .into_iter()
                .map(|doc| (doc.channel_id.clone(), doc))
                .collect(),
        }
    }
}

#[async_trait]
impl ChannelMetadataSource for DocumentIndex {
    async fn fetch_batch(&self, channel_ids: &[String]) -> AuditResult<Vec<MetadataDocument>> {
        Ok(channel_ids
            .iter()
            .filter_map(|id| self.documents.get(id).cloned())
            .collect())
    }
}

/// Candidate pool for topping up the recommended export, ranked by
/// brand-safety score, highest first.
pub struct RankedCandidatePool {
    ranked: Vec<MetadataDocument>,
}

impl RankedCandidatePool {
    pub async fn load(path: &Path) -> AuditResult<Self> {
        Ok(Self::from_documents(read_json(path).await?))
    }

    pub fn from_documents(mut documents: Vec<MetadataDocument>) -> Self {
        documents.sort_by(|a, b| {
            let a = a.brand_safety_score.unwrap_or(f64::MIN);
            let b = b.brand_safety_score.unwrap_or(f64::MIN);
            b.total_cmp(&a)
        });
        Self { ranked: documents }
    }
}

fn allows(allowed: &BTreeSet<String>, value: Option<&FactValue>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    value
        .and_then(|v| coerce(v, CoerceKind::Category))
        .and_then(|c| c.into_category())
        .is_some_and(|c| allowed.contains(&c))
}

fn matches_query(doc: &MetadataDocument, query: &FallbackQuery) -> bool {
    if let Some(threshold) = query.score_threshold {
        if !doc.brand_safety_score.is_some_and(|s| s > threshold) {
            return false;
        }
    }
    let categories = doc.category_union();
    if categories
        .iter()
        .any(|c| query.exclude_content_categories.contains(c))
    {
        return false;
    }
    if !query.content_categories.is_empty()
        && !categories.iter().any(|c| query.content_categories.contains(c))
    {
        return false;
    }
    let language = doc.language.clone().map(FactValue::Text);
    allows(&query.languages, language.as_ref())
        && allows(&query.content_quality, doc.content_quality.as_ref())
        && allows(&query.content_type, doc.content_type.as_ref())
}

#[async_trait]
impl FallbackCandidateSource for RankedCandidatePool {
    async fn candidates(
        &self,
        query: &FallbackQuery,
        offset: usize,
        limit: usize,
    ) -> AuditResult<Vec<String>> {
        Ok(self
            .ranked
            .iter()
            .filter(|doc| matches_query(doc, query))
            .skip(offset)
            .take(limit)
            .map(|doc| doc.channel_id.clone())
            .collect())
    }
}

/// Writes the recommended and wastage sets as JSON files under `out_dir`.
pub struct JsonFileExporter {
    out_dir: PathBuf,
}

impl JsonFileExporter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    async fn write(&self, name: String, value: &impl serde::Serialize) -> AuditResult<String> {
        let path = self.out_dir.join(name);
        let body = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| AuditError::Export(format!("{}: {e}", path.display())))?;
        Ok(path.display().to_string())
    }
}

#[async_trait]
impl ResultsExporter for JsonFileExporter {
    async fn export(&self, request: &ExportRequest) -> AuditResult<ExportKeys> {
        tokio::fs::create_dir_all(&self.out_dir)
            .await
            .map_err(|e| AuditError::Export(format!("{}: {e}", self.out_dir.display())))?;
        let recommended_key = self
            .write(
                format!("{}_recommended.json", request.campaign_id),
                &request.recommended_ids,
            )
            .await?;
        let wastage_key = self
            .write(format!("{}_wastage.json", request.campaign_id), &request.unclean)
            .await?;
        info!(
            campaign_id = %request.campaign_id,
            recommended = request.recommended_ids.len(),
            unclean = request.unclean.len(),
            "Results exported"
        );
        Ok(ExportKeys {
            recommended_key,
            wastage_key,
        })
    }
}
