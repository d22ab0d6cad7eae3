//! Channel audit: scores every channel a campaign ran on and reports the
//! share of spend wasted on channels that fail the campaign's criteria.

mod files;

use anyhow::Context;
use channel_audit_core::config::AppConfig;
use channel_audit_core::types::{score_threshold_for_severity, DataSourceType, OAuthType, RunConfig};
use channel_audit_core::AnalysisParams;
use channel_audit_engine::{
    AuditCollaborators, DeliverySourceRegistry, ExecutorAnalyzer, FallbackCandidateSource,
};
use clap::{Parser, ValueEnum};
use files::{CsvUploadSource, DocumentIndex, JsonDeliverySource, JsonFileExporter, RankedCandidatePool};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Platform {
    GoogleAds,
    Dv360,
}

impl From<Platform> for OAuthType {
    fn from(platform: Platform) -> Self {
        match platform {
            Platform::GoogleAds => OAuthType::GoogleAds,
            Platform::Dv360 => OAuthType::Dv360,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "channel-audit")]
#[command(about = "Classify campaign channels as clean or unclean and report wasted spend")]
#[command(version)]
struct Cli {
    /// Campaign being audited
    #[arg(long)]
    campaign_id: String,

    /// Analysis parameters (JSON)
    #[arg(long)]
    params: PathBuf,

    /// Brand-safety severity 1-4 (overrides score_threshold in params)
    #[arg(long)]
    severity: Option<u8>,

    /// Delivery rows exported from the ads platform (JSON array)
    #[arg(long)]
    delivery: Option<PathBuf>,

    /// Ads platform the delivery rows came from
    #[arg(long, value_enum)]
    platform: Option<Platform>,

    /// Uploaded CSV (split header, records and column mapping as JSON).
    /// Takes precedence over --platform.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Channel metadata documents (JSON array)
    #[arg(long)]
    metadata: PathBuf,

    /// Candidate documents for topping up the recommended export
    #[arg(long)]
    fallback: Option<PathBuf>,

    /// Directory the export files and report are written to
    #[arg(long, default_value = "out")]
    out_dir: PathBuf,

    /// Node identifier (overrides config)
    #[arg(long, env = "CHANNEL_AUDIT__NODE_ID")]
    node_id: Option<String>,

    /// Metadata batch size (overrides config)
    #[arg(long, env = "CHANNEL_AUDIT__ENGINE__METADATA_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Recommended export size (overrides config)
    #[arg(long, env = "CHANNEL_AUDIT__ENGINE__EXPORT_LIMIT")]
    export_limit: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "channel_audit=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(batch_size) = cli.batch_size {
        config.engine.metadata_batch_size = batch_size;
    }
    if let Some(limit) = cli.export_limit {
        config.engine.export_limit = limit;
    }
    config.validate()?;

    info!(
        node_id = %config.node_id,
        batch_size = config.engine.metadata_batch_size,
        export_limit = config.engine.export_limit,
        "Configuration loaded"
    );

    let params_raw = tokio::fs::read(&cli.params)
        .await
        .with_context(|| format!("reading {}", cli.params.display()))?;
    let mut params: AnalysisParams = serde_json::from_slice(&params_raw)
        .with_context(|| format!("parsing {}", cli.params.display()))?;
    if let Some(severity) = cli.severity {
        params.score_threshold = Some(
            score_threshold_for_severity(severity)
                .with_context(|| format!("unknown severity {severity}"))?,
        );
    }

    let mut delivery = DeliverySourceRegistry::new().register(Arc::new(CsvUploadSource));
    if let Some(path) = &cli.delivery {
        for source_type in [DataSourceType::GoogleAds, DataSourceType::Dv360] {
            delivery = delivery.register(Arc::new(JsonDeliverySource::new(source_type, path)));
        }
    }

    let fallback = match &cli.fallback {
        Some(path) => Some(Arc::new(RankedCandidatePool::load(path).await?)
            as Arc<dyn FallbackCandidateSource>),
        None => None,
    };

    let collaborators = AuditCollaborators {
        delivery,
        metadata: Arc::new(DocumentIndex::load(&cli.metadata).await?),
        fallback,
        exporter: Arc::new(JsonFileExporter::new(&cli.out_dir)),
    };
    let executor = ExecutorAnalyzer::new(params, config.engine.clone(), collaborators);

    let run = RunConfig {
        campaign_id: cli.campaign_id,
        csv_key: cli.csv.map(|p| p.display().to_string()),
        oauth_type: cli.platform.map(OAuthType::from),
    };

    // Ctrl-C cancels the run before anything is exported.
    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            let _ = cancel_tx.send(true);
        }
    });

    let report = executor.run_with_cancel(&run, &cancel_rx).await?;

    let report_path = cli.out_dir.join(format!("{}_report.json", report.campaign_id));
    tokio::fs::write(&report_path, serde_json::to_vec_pretty(&report)?)
        .await
        .with_context(|| format!("writing {}", report_path.display()))?;

    info!(
        run_id = %report.run_id,
        channels = report.channels.len(),
        total_score = ?report.total_score,
        wastage_percent = report.wastage.wastage_percent,
        wastage_spend = report.wastage.wastage_spend,
        report = %report_path.display(),
        "Channel audit finished"
    );

    Ok(())
}
