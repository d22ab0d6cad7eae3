//! Bounded batching in front of the metadata source.
//!
//! The [`MetadataBatcher`] splits the run's channel ids into fixed-size
//! batches and fetches each one as a whole. Documents come back in request
//! order, restricted to the ids that were asked for, and ids the source did
//! not answer for are reported as a gap rather than an error.

use channel_audit_core::MetadataDocument;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::sources::ChannelMetadataSource;

/// Result of fetching one batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Documents in the order their ids were requested.
    pub documents: Vec<MetadataDocument>,
    /// Requested ids with no document.
    pub missing: Vec<String>,
}

pub struct MetadataBatcher {
    source: Arc<dyn ChannelMetadataSource>,
    max_batch_size: usize,
}

impl MetadataBatcher {
    /// * `source`: the metadata backend to query.
    /// * `max_batch_size`: channel ids per request; values below one are
    ///   treated as one.
    pub fn new(source: Arc<dyn ChannelMetadataSource>, max_batch_size: usize) -> Self {
        Self {
            source,
            max_batch_size: max_batch_size.max(1),
        }
    }

    pub fn batches<'a>(&self, channel_ids: &'a [String]) -> std::slice::Chunks<'a, String> {
        channel_ids.chunks(self.max_batch_size)
    }

    /// Fetch one batch. A failed request leaves the whole batch unanswered.
    pub async fn fetch(&self, batch: &[String]) -> BatchOutcome {
        let documents = match self.source.fetch_batch(batch).await {
            Ok(documents) => documents,
            Err(e) => {
                warn!(error = %e, batch_size = batch.len(), "Metadata batch failed, channels left unanalyzed");
                metrics::counter!("audit.metadata_batch_errors").increment(1);
                return BatchOutcome {
                    documents: Vec::new(),
                    missing: batch.to_vec(),
                };
            }
        };

        let mut by_id: HashMap<String, MetadataDocument> = documents
            .into_iter()
            .map(|doc| (doc.channel_id.clone(), doc))
            .collect();

        let mut outcome = BatchOutcome::default();
        for id in batch {
            match by_id.remove(id) {
                Some(doc) => outcome.documents.push(doc),
                None => outcome.missing.push(id.clone()),
            }
        }
        if !by_id.is_empty() {
            debug!(unrequested = by_id.len(), "Ignoring metadata documents that were not requested");
        }
        outcome
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use channel_audit_core::{AuditError, AuditResult};

    struct PartialSource;

    #[async_trait]
    impl ChannelMetadataSource for PartialSource {
        async fn fetch_batch(&self, ids: &[String]) -> AuditResult<Vec<MetadataDocument>> {
            if ids.iter().any(|id| id == "boom") {
                return Err(AuditError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "index unavailable",
                )));
            }
            // Answer every other id, in reverse, plus one stray document.
            let mut docs: Vec<MetadataDocument> = ids
                .iter()
                .step_by(2)
                .rev()
                .map(|id| MetadataDocument {
                    channel_id: id.clone(),
                    ..Default::default()
                })
                .collect();
            docs.push(MetadataDocument {
                channel_id: "stray".to_string(),
                ..Default::default()
            });
            Ok(docs)
        }
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("UC{i}")).collect()
    }

    #[test]
    fn test_batches_bounded() {
        let batcher = MetadataBatcher::new(Arc::new(PartialSource), 2);
        let all = ids(5);
        let sizes: Vec<usize> = batcher.batches(&all).map(|b| b.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(MetadataBatcher::new(Arc::new(PartialSource), 0).max_batch_size(), 1);
    }

    #[tokio::test]
    async fn test_fetch_orders_and_reports_gaps() {
        let batcher = MetadataBatcher::new(Arc::new(PartialSource), 10);
        let all = ids(4);
        let outcome = batcher.fetch(&all).await;
        let returned: Vec<&str> = outcome.documents.iter().map(|d| d.channel_id.as_str()).collect();
        assert_eq!(returned, vec!["UC0", "UC2"]);
        assert_eq!(outcome.missing, vec!["UC1".to_string(), "UC3".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_batch_is_a_gap() {
        let batcher = MetadataBatcher::new(Arc::new(PartialSource), 10);
        let batch = vec!["UC0".to_string(), "boom".to_string()];
        let outcome = batcher.fetch(&batch).await;
        assert!(outcome.documents.is_empty());
        assert_eq!(outcome.missing.len(), 2);
    }
}
