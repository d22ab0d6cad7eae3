//! Data model, scoring primitives, configuration and error taxonomy for the
//! channel audit engine.

pub mod analysis;
pub mod config;
pub mod error;
pub mod scoring;
pub mod types;

pub use analysis::{ChannelAnalysis, Dimension, SectionResult};
pub use config::{AppConfig, EngineConfig};
pub use error::{AuditError, AuditResult};
pub use types::{AnalysisParams, FactValue, Facts, MetadataDocument, Metric, RawMetricRow};
