//! Limit the number of concurrent requests to the OCR service.
//!
//! The OCR service is by far the slowest part of the pipeline, and it falls
//! over if we send it more than a handful of pages at once. So every OCR call
//! goes through an [`OcrGate`], which holds a semaphore with a fixed number of
//! permits (normally one). A large worker pool then just queues up in front of
//! the gate, while index writes downstream continue in parallel.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::prelude::*;

use super::{OcrEngine, OcrError, OcrResult};

/// The default number of OCR requests we allow in flight.
pub const DEFAULT_OCR_PERMITS: usize = 1;

/// An [`OcrEngine`] with a concurrency limit. Cheap to clone; all clones share
/// the same permits.
#[derive(Clone)]
pub struct OcrGate {
    engine: Arc<dyn OcrEngine>,
    semaphore: Arc<Semaphore>,
}

impl OcrGate {
    /// Wrap `engine`, allowing at most `permits` requests at a time. Zero is
    /// treated as one.
    pub fn new(engine: Arc<dyn OcrEngine>, permits: usize) -> Self {
        Self {
            engine,
            semaphore: Arc::new(Semaphore::new(permits.max(1))),
        }
    }

    /// Recognize a page while holding a permit.
    #[instrument(level = "trace", skip_all)]
    pub async fn recognize(&self, image: &[u8]) -> Result<OcrResult, OcrError> {
        // We never close the semaphore, so `acquire` can't fail.
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("OCR semaphore should never be closed");
        self.engine.recognize(image).await
    }

    /// Check the service's health. This bypasses the permits, because it's
    /// only called before any pages are queued.
    pub async fn is_healthy(&self) -> Result<bool, OcrError> {
        self.engine.is_healthy().await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;

    /// Fake engine that records the maximum number of overlapping calls.
    #[derive(Default)]
    struct CountingEngine {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl OcrEngine for CountingEngine {
        async fn recognize(&self, _image: &[u8]) -> Result<OcrResult, OcrError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(OcrResult::default())
        }

        async fn is_healthy(&self) -> Result<bool, OcrError> {
            Ok(true)
        }
    }

    async fn max_concurrency(permits: usize) -> usize {
        let engine = Arc::new(CountingEngine::default());
        let gate = OcrGate::new(engine.clone(), permits);
        let tasks = (0..8)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.recognize(b"page").await })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        engine.max_in_flight.load(Ordering::SeqCst)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn serializes_requests_with_one_permit() {
        assert_eq!(max_concurrency(DEFAULT_OCR_PERMITS).await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn zero_permits_means_one() {
        assert_eq!(max_concurrency(0).await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn allows_more_permits_when_configured() {
        let max = max_concurrency(3).await;
        assert!((1..=3).contains(&max), "max in flight was {max}");
    }
}
