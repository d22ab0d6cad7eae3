//! Channel analysis engine: scores every channel a campaign served on for
//! delivery performance, contextual fit and brand-safety suitability, and
//! classifies it clean or unclean.

pub mod batcher;
pub mod contextual;
pub mod csv_mapping;
pub mod dimensions;
pub mod executor;
pub mod performance;
pub mod sources;
pub mod suitability;

pub use batcher::MetadataBatcher;
pub use contextual::ContextualAnalyzer;
pub use csv_mapping::CsvColumnMapping;
pub use dimensions::{DimensionAnalyzer, DimensionResults};
pub use executor::{AuditCollaborators, AuditReport, ExecutorAnalyzer, WastageStatistics};
pub use performance::PerformanceAnalyzer;
pub use sources::{
    ChannelMetadataSource, DeliveryMetricsSource, DeliverySourceRegistry, ExportKeys,
    ExportRequest, FallbackCandidateSource, FallbackQuery, ResultsExporter,
};
pub use suitability::SuitabilityAnalyzer;
