//! Processing a batch of pages with a fixed pool of workers.
//!
//! The producer reads page images, numbers them, and pushes them onto a
//! bounded queue. Workers pull pages off the queue until it's closed and
//! drained. Because the queue is bounded, a slow OCR service slows down the
//! producer instead of filling up memory with images.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::{SinkExt as _, StreamExt as _, channel::mpsc};
use indicatif::ProgressBar;
use tracing::{Instrument as _, debug_span};

use crate::{
    async_utils::{BoxedStream, JoinWorker},
    document::ScannedPage,
    prelude::*,
    ui::Ui,
};

use super::Pipeline;

/// How many workers we run if we're given a nonsensical count.
pub const DEFAULT_WORKERS: usize = 4;

/// What happened during a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Pages we tried to process.
    pub total: usize,

    /// Pages that made it into the index.
    pub indexed: usize,

    /// Pages that failed somewhere in the pipeline.
    pub failed: usize,

    /// Files we couldn't read at all. These never got a sequence ID.
    pub skipped: usize,
}

impl RunSummary {
    /// Fail if we had pages, but none of them made it into the index.
    pub fn check(&self) -> Result<()> {
        let lost = self.failed + self.skipped;
        if self.indexed == 0 && lost > 0 {
            bail!("all {lost} pages failed");
        }
        Ok(())
    }

    /// Tell the user how it went.
    pub fn display(&self, ui: &Ui) {
        ui.display_message("📄", &format!("{} pages indexed", self.indexed));
        if self.failed > 0 {
            ui.display_message("❌", &format!("{} pages could not be indexed", self.failed));
        }
        if self.skipped > 0 {
            ui.display_message("⚠️", &format!("{} files could not be read", self.skipped));
        }
    }
}

/// Counter methods for the shared `Mutex<RunSummary>` the workers update.
pub trait RunCounterExt {
    /// Record the outcome of one page.
    fn record(&self, indexed: bool);

    /// Record a file we couldn't read.
    fn record_skipped(&self);

    /// A snapshot of the counters.
    fn summary(&self) -> RunSummary;
}

impl RunCounterExt for Mutex<RunSummary> {
    fn record(&self, indexed: bool) {
        let mut counters = self.lock().expect("lock poisoned");
        counters.total += 1;
        if indexed {
            counters.indexed += 1;
        } else {
            counters.failed += 1;
        }
    }

    fn record_skipped(&self) {
        self.lock().expect("lock poisoned").skipped += 1;
    }

    fn summary(&self) -> RunSummary {
        *self.lock().expect("lock poisoned")
    }
}

/// Turn a user-supplied worker count into something usable.
pub fn worker_count(requested: i32) -> usize {
    match usize::try_from(requested) {
        Ok(count) if count > 0 => count,
        _ => {
            warn!(requested, "Invalid worker count, using {DEFAULT_WORKERS}");
            DEFAULT_WORKERS
        }
    }
}

impl Pipeline {
    /// Ingest every image in `images` as a page of scan `scan_id`, using
    /// `workers` concurrent workers. Sequence IDs are assigned in stream order,
    /// starting at 1.
    ///
    /// Individual page failures are logged and counted. We only return an
    /// error if the workers themselves fall over.
    #[instrument(level = "debug", skip(self, images, progress))]
    pub async fn run(
        &self,
        scan_id: &str,
        mut images: BoxedStream<Result<Vec<u8>>>,
        workers: i32,
        progress: ProgressBar,
    ) -> Result<RunSummary> {
        let workers = worker_count(workers);
        let counters = Arc::new(Mutex::new(RunSummary::default()));
        let (mut tx, rx) = mpsc::channel::<ScannedPage>(workers);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let handles = (0..workers)
            .map(|worker| {
                let pipeline = self.clone();
                let rx = rx.clone();
                let counters = counters.clone();
                let progress = progress.clone();
                let handle = tokio::spawn(
                    async move {
                        loop {
                            // Idle workers take turns waiting on the queue.
                            let next = rx.lock().await.next().await;
                            let Some(page) = next else { break };
                            match pipeline.ingest_page(&page).await {
                                Ok(()) => counters.record(true),
                                Err(err) => {
                                    error!(
                                        id = %page.id(),
                                        error = ?anyhow::Error::from(err),
                                        "Unable to index page"
                                    );
                                    counters.record(false);
                                }
                            }
                            progress.inc(1);
                        }
                        trace!("Queue drained");
                        Ok(())
                    }
                    .instrument(debug_span!("worker", worker)),
                );
                JoinWorker::from_handle(handle)
            })
            .collect::<Vec<_>>();
        drop(rx);

        let mut sequence_id = 0;
        while let Some(image) = images.next().await {
            match image {
                Ok(image) => {
                    sequence_id += 1;
                    let page = ScannedPage {
                        scan_id: scan_id.to_owned(),
                        sequence_id,
                        image,
                        scan_time: Utc::now(),
                    };
                    debug!(id = %page.id(), "Queued");
                    if tx.send(page).await.is_err() {
                        // Every worker is gone. Joining them will tell us why.
                        break;
                    }
                }
                Err(err) => {
                    error!(error = ?err, "Unable to read page, skipping");
                    counters.record_skipped();
                    progress.inc(1);
                }
            }
        }
        drop(tx);

        JoinWorker::join_all(handles).await?;
        progress.finish_using_style();
        Ok(counters.summary())
    }
}
