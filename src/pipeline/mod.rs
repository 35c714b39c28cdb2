//! The indexing pipeline.
//!
//! Each page goes through the same steps:
//!
//! ```text
//! Queued -> OCRing -> Extracting -> Indexing -> Indexed
//!              |                        |
//!              +-------> Failed <-------+
//! ```
//!
//! A failure is only ever terminal for its own page. [`Pipeline::run`] feeds a
//! stream of page images through a pool of workers, and [`Pipeline::reindex`]
//! replays an archived scan one page at a time.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::{
    document::{Document, ScannedPage, page_id},
    extract::Extractor,
    index::{IndexError, SearchIndex},
    layout::LayoutStrategy,
    ocr::{OcrError, OcrGate},
    prelude::*,
    storage::{PageStore, StorageError},
};

pub mod source;
pub mod workers;

pub use self::workers::{DEFAULT_WORKERS, RunSummary};

/// Why a single page couldn't be indexed.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("OCR failed")]
    Ocr(#[from] OcrError),

    #[error("indexing failed")]
    Index(#[from] IndexError),

    #[error("storage failed")]
    Storage(#[from] StorageError),
}

/// Everything a worker needs to process pages. Cheap to clone.
#[derive(Clone)]
pub struct Pipeline {
    ocr: OcrGate,
    extractor: Extractor,
    index: Arc<dyn SearchIndex>,
    layout: LayoutStrategy,

    /// Where to archive pages before OCRing them, if anywhere.
    archive: Option<Arc<dyn PageStore>>,
}

impl Pipeline {
    pub fn new(
        ocr: OcrGate,
        extractor: Extractor,
        index: Arc<dyn SearchIndex>,
        layout: LayoutStrategy,
    ) -> Self {
        Self {
            ocr,
            extractor,
            index,
            layout,
            archive: None,
        }
    }

    /// Store each page in `store` before processing it.
    pub fn with_archive(mut self, store: Arc<dyn PageStore>) -> Self {
        self.archive = Some(store);
        self
    }

    /// Make sure our services are up, and create the index if needed. Any
    /// failure here is fatal for the run.
    #[instrument(level = "debug", skip_all)]
    pub async fn check_health(&self) -> Result<()> {
        self.index
            .ping()
            .await
            .context("unable to ping search index")?;
        let healthy = self
            .ocr
            .is_healthy()
            .await
            .context("unable to ping OCR service")?;
        if !healthy {
            bail!("OCR service is not healthy");
        }
        self.index
            .ensure_index()
            .await
            .context("unable to create search index")?;
        // We can index without companies, so this isn't fatal.
        if let Err(err) = self.extractor.ping().await {
            warn!("{:?}", err);
        }
        Ok(())
    }

    /// OCR a page, extract what we can, and upsert it into the index.
    #[instrument(level = "debug", skip_all, fields(id = %page.id()))]
    pub async fn process_page(&self, page: &ScannedPage) -> Result<(), PageError> {
        debug!("OCRing");
        let ocr_result = self.ocr.recognize(&page.image).await?;

        debug!(
            blocks = ocr_result.text_blocks.len(),
            barcodes = ocr_result.barcodes.len(),
            "Extracting"
        );
        let text = ocr_result.text(&self.layout);
        let extraction = self.extractor.extract(&ocr_result, &text).await;
        let document = Document::new(page, text, extraction, Utc::now());

        debug!("Indexing");
        self.index.upsert(&document.id(), &document).await?;
        debug!("Indexed");
        Ok(())
    }

    /// Archive a freshly scanned page (if we have an archive), then process
    /// it.
    pub async fn ingest_page(&self, page: &ScannedPage) -> Result<(), PageError> {
        if let Some(archive) = &self.archive {
            archive.store(page).await?;
        }
        self.process_page(page).await
    }

    /// Re-run every stored page of `scan_id` through [`Pipeline::process_page`],
    /// in sequence order. Document IDs are deterministic, so this overwrites
    /// the existing documents.
    #[instrument(level = "debug", skip(self, store))]
    pub async fn reindex(&self, store: &dyn PageStore, scan_id: &str) -> Result<RunSummary> {
        let pages = store
            .list_pages(scan_id)
            .await
            .with_context(|| format!("unable to list pages of scan {scan_id}"))?;
        info!(scan_id, pages = pages.len(), "Reindexing scan");

        let mut summary = RunSummary::default();
        for stored in pages {
            summary.total += 1;
            let page = match store.retrieve(&stored.scan_id, stored.sequence_id).await {
                Ok(page) => page,
                Err(err) => {
                    error!(
                        id = %page_id(&stored.scan_id, stored.sequence_id),
                        error = ?anyhow::Error::from(err),
                        "Unable to retrieve page"
                    );
                    summary.failed += 1;
                    continue;
                }
            };
            match self.process_page(&page).await {
                Ok(()) => summary.indexed += 1,
                Err(err) => {
                    error!(id = %page.id(), error = ?anyhow::Error::from(err), "Unable to index page");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }
}
