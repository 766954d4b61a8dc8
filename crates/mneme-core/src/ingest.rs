//! Ingest pipeline: fetch → indexability check → memory engine.

use std::sync::Arc;

use crate::engine::{AddOutcome, MemoryEngine};
use crate::error::MemoryError;
use crate::fetch::Fetcher;
use crate::types::{MemoryRecord, RecordKind};

pub struct Ingestor {
    fetcher: Arc<dyn Fetcher>,
    engine: Arc<MemoryEngine>,
}

impl Ingestor {
    pub fn new(fetcher: Arc<dyn Fetcher>, engine: Arc<MemoryEngine>) -> Self {
        Self { fetcher, engine }
    }

    pub fn engine(&self) -> &MemoryEngine {
        &self.engine
    }

    /// Fetches `url` and adds it to memory. Pages the fetcher marks unindexable
    /// are skipped without embedding and without error.
    pub async fn ingest_url(
        &self,
        url: &str,
        session_id: Option<&str>,
    ) -> Result<AddOutcome, MemoryError> {
        let page = self.fetcher.fetch(url).await;
        if !page.indexable {
            let reason = page.skip_reason.unwrap_or_else(|| "not indexable".into());
            tracing::info!(url, reason = %reason, "skipping page");
            return Ok(AddOutcome::Unindexable(reason));
        }
        let mut record = MemoryRecord::new(page.url, page.title, page.text).with_kind(RecordKind::Fact);
        record.session_id = session_id.map(str::to_string);
        self.engine.add(record).await
    }

    /// Ingests each URL in turn. A failing URL is logged and reported; the rest continue.
    pub async fn ingest_batch(
        &self,
        urls: &[String],
        session_id: Option<&str>,
    ) -> Vec<(String, Result<AddOutcome, MemoryError>)> {
        let mut out = Vec::with_capacity(urls.len());
        for url in urls {
            let res = self.ingest_url(url, session_id).await;
            if let Err(e) = &res {
                tracing::warn!(url = %url, error = %e, "ingestion failed");
            }
            out.push((url.clone(), res));
        }
        out
    }
}
