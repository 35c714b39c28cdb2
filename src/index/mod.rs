//! Publishing documents to the search index.

use thiserror::Error;

use crate::{document::Document, prelude::*};

pub mod opensearch;

pub use self::opensearch::OpenSearchIndex;

/// Errors talking to the search index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid search index URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("cannot reach search index")]
    Request(#[from] reqwest::Error),

    /// The index answered with a non-success status.
    #[error("search index returned {status}: {message}")]
    Rejected {
        status: reqwest::StatusCode,
        message: String,
    },
}

/// Interface to a document store with upsert-by-ID semantics.
#[async_trait]
pub trait SearchIndex: Send + Sync + 'static {
    /// Create the index if it doesn't exist yet. An existing index is fine.
    async fn ensure_index(&self) -> Result<(), IndexError>;

    /// Create or overwrite the document with ID `id`.
    async fn upsert(&self, id: &str, document: &Document) -> Result<(), IndexError>;

    /// Check that the index is reachable.
    async fn ping(&self) -> Result<(), IndexError>;
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory index for tests.

    use std::{
        collections::{BTreeMap, HashSet},
        sync::Mutex,
    };

    use super::*;

    #[derive(Default)]
    pub(crate) struct MemoryIndex {
        pub documents: Mutex<BTreeMap<String, Document>>,
        pub upserts: Mutex<Vec<String>>,
        /// IDs whose upserts we reject.
        pub failing_ids: HashSet<String>,
    }

    impl MemoryIndex {
        pub(crate) fn failing(ids: &[&str]) -> Self {
            Self {
                failing_ids: ids.iter().map(|id| (*id).to_owned()).collect(),
                ..Self::default()
            }
        }

        pub(crate) fn get(&self, id: &str) -> Option<Document> {
            self.documents.lock().unwrap().get(id).cloned()
        }

        pub(crate) fn len(&self) -> usize {
            self.documents.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SearchIndex for MemoryIndex {
        async fn ensure_index(&self) -> Result<(), IndexError> {
            Ok(())
        }

        async fn upsert(&self, id: &str, document: &Document) -> Result<(), IndexError> {
            self.upserts.lock().unwrap().push(id.to_owned());
            if self.failing_ids.contains(id) {
                return Err(IndexError::Rejected {
                    status: reqwest::StatusCode::BAD_REQUEST,
                    message: "mapper_parsing_exception".to_owned(),
                });
            }
            self.documents
                .lock()
                .unwrap()
                .insert(id.to_owned(), document.clone());
            Ok(())
        }

        async fn ping(&self) -> Result<(), IndexError> {
            Ok(())
        }
    }
}
