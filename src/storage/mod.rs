//! Archiving scanned pages.
//!
//! Every page is stored as one blob at `{scan_id}/{sequence_id}.jpg`, so that
//! we can re-run indexing later with better extraction rules.

use thiserror::Error;

use crate::{crypt::CryptError, document::ScannedPage, prelude::*};

pub mod fs;

pub use self::fs::FsPageStore;

/// Errors storing or retrieving pages.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The page or scan doesn't exist.
    #[error("{0} not found in storage")]
    NotFound(String),

    #[error("invalid scan ID {0:?}")]
    InvalidScanId(String),

    #[error("storage I/O error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decrypt or encrypt stored page")]
    Crypt(#[from] CryptError),
}

impl StorageError {
    /// Build an I/O error, mapping "not found" to [`StorageError::NotFound`].
    pub(crate) fn io(path: &Path, what: impl FnOnce() -> String, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(what())
        } else {
            Self::Io {
                path: path.to_owned(),
                source,
            }
        }
    }
}

/// A reference to a stored page.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct StoredPage {
    pub scan_id: String,
    pub sequence_id: u32,
}

/// Interface to page storage.
#[async_trait]
pub trait PageStore: Send + Sync + 'static {
    /// Store `page`, replacing any page with the same ID.
    async fn store(&self, page: &ScannedPage) -> Result<(), StorageError>;

    /// Fetch a page.
    async fn retrieve(&self, scan_id: &str, sequence_id: u32) -> Result<ScannedPage, StorageError>;

    /// List the pages of a scan, ordered by sequence ID.
    async fn list_pages(&self, scan_id: &str) -> Result<Vec<StoredPage>, StorageError>;
}

/// Scan IDs become directory names, so keep them boring.
pub(crate) fn check_scan_id(scan_id: &str) -> Result<(), StorageError> {
    let ok = !scan_id.is_empty()
        && scan_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidScanId(scan_id.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_ids_must_be_plain() {
        assert!(check_scan_id("5f0c6e1e-8a3b-4d0b-9d4e-2a8c1f0e9b7a").is_ok());
        for bad in ["", "..", "a/b", "a\\b", "scan id"] {
            assert!(matches!(check_scan_id(bad), Err(StorageError::InvalidScanId(_))));
        }
    }

    #[test]
    fn missing_files_are_not_found() {
        let err = std::io::Error::from(std::io::ErrorKind::NotFound);
        let err = StorageError::io(Path::new("/x"), || "page x_1".to_owned(), err);
        assert!(matches!(err, StorageError::NotFound(what) if what == "page x_1"));

        let err = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        let err = StorageError::io(Path::new("/x"), || "page x_1".to_owned(), err);
        assert!(matches!(err, StorageError::Io { .. }));
    }
}
