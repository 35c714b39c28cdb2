//! Asynchronous utilities for use with Tokio.

use std::pin::Pin;

use futures::Stream;
use tokio::task::JoinHandle;

use crate::prelude::*;

/// A boxed, sendable future.
pub type BoxedFuture<Output> = Pin<Box<dyn Future<Output = Output> + Send>>;

/// A boxed, sendable stream. Page sources hand these to the pipeline.
pub type BoxedStream<Item> = Pin<Box<dyn Stream<Item = Item> + Send>>;

/// A handle for a background worker, which can be awaited to wait for it to
/// finish. Panics and errors in the worker both come back as errors.
pub struct JoinWorker {
    future: BoxedFuture<Result<()>>,
}

impl JoinWorker {
    /// Wrap a spawned task.
    pub fn from_handle(handle: JoinHandle<Result<()>>) -> Self {
        Self {
            future: Box::pin(async move { handle.await.context("could not join worker")? }),
        }
    }

    /// Wait for the worker to finish.
    pub async fn join(self) -> Result<()> {
        self.future.await
    }

    /// Wait for every worker to finish, even if some fail, then return the
    /// first error.
    pub async fn join_all(workers: impl IntoIterator<Item = Self>) -> Result<()> {
        let mut first_err = None;
        for worker in workers {
            if let Err(err) = worker.join().await {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_reports_worker_errors_and_panics() {
        JoinWorker::from_handle(tokio::spawn(async { Ok(()) }))
            .join()
            .await
            .unwrap();

        let err = JoinWorker::from_handle(tokio::spawn(async { Err(anyhow!("boom")) }))
            .join()
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");

        let handle: JoinHandle<Result<()>> = tokio::spawn(async { panic!("oh no") });
        assert!(JoinWorker::from_handle(handle).join().await.is_err());
    }

    #[tokio::test]
    async fn join_all_waits_for_every_worker_after_a_failure() {
        use std::sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        };

        let finished = Arc::new(AtomicBool::new(false));
        let slow_finished = finished.clone();
        let workers = vec![
            JoinWorker::from_handle(tokio::spawn(async { Err(anyhow!("first")) })),
            JoinWorker::from_handle(tokio::spawn(async { panic!("second") })),
            JoinWorker::from_handle(tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                slow_finished.store(true, Ordering::SeqCst);
                Ok(())
            })),
        ];

        let err = JoinWorker::join_all(workers).await.unwrap_err();
        assert_eq!(err.to_string(), "first");
        assert!(finished.load(Ordering::SeqCst));
    }
}
