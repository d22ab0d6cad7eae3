use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::scoring::{coerce, CoerceKind};

/// Fact keys shared between sources, the orchestrator and the analyzers.
pub mod fields {
    pub const CHANNEL_ID: &str = "channel_id";
    pub const COST: &str = "cost";
    pub const IMPRESSIONS: &str = "impressions";
    pub const VIDEO_VIEWS: &str = "video_views";
    pub const CONTENT_CATEGORIES: &str = "content_categories";
    pub const LANGUAGES: &str = "languages";
    pub const CONTENT_QUALITY: &str = "content_quality";
    pub const CONTENT_TYPE: &str = "content_type";
    pub const BRAND_SAFETY_SCORE: &str = "brand_safety_score";
}

/// A raw per-channel value as received from a source. Booleans and `null`
/// are kept so a single odd cell never rejects its row; neither coerces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Number(f64),
    Text(String),
    List(Vec<String>),
    Bool(bool),
    Null,
}

impl From<f64> for FactValue {
    fn from(n: f64) -> Self {
        FactValue::Number(n)
    }
}

impl From<&str> for FactValue {
    fn from(s: &str) -> Self {
        FactValue::Text(s.to_string())
    }
}

impl From<String> for FactValue {
    fn from(s: String) -> Self {
        FactValue::Text(s)
    }
}

impl From<Vec<String>> for FactValue {
    fn from(items: Vec<String>) -> Self {
        FactValue::List(items)
    }
}

pub type Facts = BTreeMap<String, FactValue>;

/// Which way a delivery metric has to move to be acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    LowerIsBetter,
    HigherIsBetter,
}

impl Direction {
    pub fn passes(self, value: f64, threshold: f64) -> bool {
        match self {
            Direction::LowerIsBetter => value <= threshold,
            Direction::HigherIsBetter => value >= threshold,
        }
    }
}

/// Delivery metrics evaluated by the performance dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Cpv,
    Cpm,
    Ctr,
    ActiveViewViewability,
    VideoViewRate,
    #[serde(rename = "video_quartile_100_rate")]
    VideoQuartile100Rate,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Cpv,
        Metric::Cpm,
        Metric::Ctr,
        Metric::ActiveViewViewability,
        Metric::VideoViewRate,
        Metric::VideoQuartile100Rate,
    ];

    pub fn field_name(self) -> &'static str {
        match self {
            Metric::Cpv => "cpv",
            Metric::Cpm => "cpm",
            Metric::Ctr => "ctr",
            Metric::ActiveViewViewability => "active_view_viewability",
            Metric::VideoViewRate => "video_view_rate",
            Metric::VideoQuartile100Rate => "video_quartile_100_rate",
        }
    }

    /// Cost metrics pass at or under the threshold; rates pass at or above it.
    pub fn direction(self) -> Direction {
        match self {
            Metric::Cpm | Metric::Cpv => Direction::LowerIsBetter,
            _ => Direction::HigherIsBetter,
        }
    }

    pub fn coerce_kind(self) -> CoerceKind {
        match self {
            Metric::Cpm | Metric::Cpv => CoerceKind::Currency,
            _ => CoerceKind::Percentage,
        }
    }

    /// Metrics whose campaign-wide mean is reported.
    pub fn is_averaged(self) -> bool {
        matches!(self, Metric::Cpm | Metric::Cpv)
    }
}

/// Single-valued categorical fields evaluated by the contextual dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextualField {
    Languages,
    ContentQuality,
    ContentType,
}

impl ContextualField {
    pub const ALL: [ContextualField; 3] = [
        ContextualField::Languages,
        ContextualField::ContentQuality,
        ContextualField::ContentType,
    ];

    pub fn field_name(self) -> &'static str {
        match self {
            ContextualField::Languages => fields::LANGUAGES,
            ContextualField::ContentQuality => fields::CONTENT_QUALITY,
            ContextualField::ContentType => fields::CONTENT_TYPE,
        }
    }
}

/// Campaign-level acceptability criteria. Immutable for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisParams {
    #[serde(default)]
    pub cpv: Option<f64>,
    #[serde(default)]
    pub cpm: Option<f64>,
    #[serde(default)]
    pub ctr: Option<f64>,
    #[serde(default)]
    pub active_view_viewability: Option<f64>,
    #[serde(default)]
    pub video_view_rate: Option<f64>,
    #[serde(default)]
    pub video_quartile_100_rate: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_value_set")]
    pub content_categories: BTreeSet<String>,
    #[serde(default, deserialize_with = "deserialize_value_set")]
    pub languages: BTreeSet<String>,
    #[serde(default, deserialize_with = "deserialize_value_set")]
    pub content_quality: BTreeSet<String>,
    #[serde(default, deserialize_with = "deserialize_value_set")]
    pub content_type: BTreeSet<String>,
    #[serde(default, deserialize_with = "deserialize_value_set")]
    pub exclude_content_categories: BTreeSet<String>,
    #[serde(default)]
    pub score_threshold: Option<f64>,
}

impl AnalysisParams {
    pub fn threshold(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Cpv => self.cpv,
            Metric::Cpm => self.cpm,
            Metric::Ctr => self.ctr,
            Metric::ActiveViewViewability => self.active_view_viewability,
            Metric::VideoViewRate => self.video_view_rate,
            Metric::VideoQuartile100Rate => self.video_quartile_100_rate,
        }
    }

    pub fn allowed(&self, field: ContextualField) -> &BTreeSet<String> {
        match field {
            ContextualField::Languages => &self.languages,
            ContextualField::ContentQuality => &self.content_quality,
            ContextualField::ContentType => &self.content_type,
        }
    }

    pub fn has_performance_criteria(&self) -> bool {
        Metric::ALL.iter().any(|m| self.threshold(*m).is_some())
    }

    pub fn has_contextual_criteria(&self) -> bool {
        !self.content_categories.is_empty()
            || !self.exclude_content_categories.is_empty()
            || ContextualField::ALL
                .iter()
                .any(|f| !self.allowed(*f).is_empty())
    }

    pub fn has_suitability_criteria(&self) -> bool {
        self.score_threshold.is_some()
    }
}

/// Accepts a list of strings and/or numbers (`[0, "1"]`) or `null`.
fn deserialize_value_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<FactValue>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .iter()
        .filter_map(|v| coerce(v, CoerceKind::Category).and_then(|c| c.into_category()))
        .collect())
}

/// Map a client brand-safety severity level (1-4) to an overall-score
/// cutoff. Unknown levels disable the suitability dimension.
pub fn score_threshold_for_severity(severity: u8) -> Option<f64> {
    match severity {
        1 => Some(0.0),
        2 => Some(69.0),
        3 => Some(79.0),
        4 => Some(89.0),
        _ => None,
    }
}

/// Platform a delivery-metrics source reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceType {
    GoogleAds,
    Dv360,
    Csv,
}

/// OAuth connection type attached to a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthType {
    GoogleAds,
    Dv360,
}

/// Per-run configuration passed to the delivery-metrics source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub campaign_id: String,
    /// Storage key of an uploaded CSV. Takes precedence over API sources.
    #[serde(default)]
    pub csv_key: Option<String>,
    #[serde(default)]
    pub oauth_type: Option<OAuthType>,
}

impl RunConfig {
    pub fn source_type(&self) -> Option<DataSourceType> {
        if self.csv_key.is_some() {
            return Some(DataSourceType::Csv);
        }
        self.oauth_type.map(|t| match t {
            OAuthType::GoogleAds => DataSourceType::GoogleAds,
            OAuthType::Dv360 => DataSourceType::Dv360,
        })
    }
}

/// One row of delivery metrics for a channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMetricRow {
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(flatten)]
    pub values: Facts,
}

impl RawMetricRow {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: Some(channel_id.into()),
            values: Facts::new(),
        }
    }

    pub fn with(mut self, field: &str, value: impl Into<FactValue>) -> Self {
        self.values.insert(field.to_string(), value.into());
        self
    }
}

/// Contextual and brand-safety metadata for one channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataDocument {
    pub channel_id: String,
    #[serde(default)]
    pub primary_category: Option<String>,
    #[serde(default)]
    pub secondary_categories: Option<Vec<String>>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub content_quality: Option<FactValue>,
    #[serde(default)]
    pub content_type: Option<FactValue>,
    #[serde(default)]
    pub brand_safety_score: Option<f64>,
}

impl MetadataDocument {
    /// De-duplicated union of the primary and secondary categories,
    /// primary first.
    pub fn category_union(&self) -> Vec<String> {
        let mut union: Vec<String> = Vec::new();
        let candidates = self
            .primary_category
            .iter()
            .chain(self.secondary_categories.iter().flatten());
        for category in candidates {
            let category = category.trim();
            if !category.is_empty() && !union.iter().any(|c| c == category) {
                union.push(category.to_string());
            }
        }
        union
    }

    /// Facts this document contributes to a channel.
    pub fn to_facts(&self) -> Facts {
        let mut facts = Facts::new();
        facts.insert(
            fields::CONTENT_CATEGORIES.to_string(),
            FactValue::List(self.category_union()),
        );
        if let Some(language) = &self.language {
            facts.insert(fields::LANGUAGES.to_string(), FactValue::Text(language.clone()));
        }
        if let Some(quality) = &self.content_quality {
            facts.insert(fields::CONTENT_QUALITY.to_string(), quality.clone());
        }
        if let Some(content_type) = &self.content_type {
            facts.insert(fields::CONTENT_TYPE.to_string(), content_type.clone());
        }
        if let Some(score) = self.brand_safety_score {
            facts.insert(fields::BRAND_SAFETY_SCORE.to_string(), FactValue::Number(score));
        }
        facts
    }
}

/// Recover a stable channel id from a raw id or placement URL.
pub fn normalize_channel_id(raw: &str) -> Option<String> {
    let id = match raw.rfind("/channel/") {
        Some(pos) => &raw[pos + "/channel/".len()..],
        None => raw,
    };
    let id = id.trim().trim_end_matches('/');
    (!id.is_empty()).then(|| id.to_string())
}
