//! Local filesystem storage.

use std::time::SystemTime;

use chrono::{DateTime, Utc};
use futures::StreamExt as _;
use tokio::fs;
use tokio_stream::wrappers::ReadDirStream;

use crate::{
    crypt::PageCrypt,
    document::{ScannedPage, page_id},
    prelude::*,
};

use super::{PageStore, StorageError, StoredPage, check_scan_id};

const PAGE_EXTENSION: &str = "jpg";

/// Stores pages under a directory, optionally encrypted.
#[derive(Debug)]
pub struct FsPageStore {
    dir: PathBuf,
    crypt: Option<PageCrypt>,
}

impl FsPageStore {
    /// Open (and create, if needed) a storage directory.
    pub async fn open(dir: &Path, crypt: Option<PageCrypt>) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)
            .await
            .map_err(|source| StorageError::Io {
                path: dir.to_owned(),
                source,
            })?;
        Ok(Self {
            dir: dir.to_owned(),
            crypt,
        })
    }

    fn scan_dir(&self, scan_id: &str) -> Result<PathBuf, StorageError> {
        check_scan_id(scan_id)?;
        Ok(self.dir.join(scan_id))
    }

    fn page_path(&self, scan_id: &str, sequence_id: u32) -> Result<PathBuf, StorageError> {
        Ok(self
            .scan_dir(scan_id)?
            .join(format!("{sequence_id}.{PAGE_EXTENSION}")))
    }
}

#[async_trait]
impl PageStore for FsPageStore {
    #[instrument(level = "debug", skip_all, fields(id = %page.id()))]
    async fn store(&self, page: &ScannedPage) -> Result<(), StorageError> {
        let scan_dir = self.scan_dir(&page.scan_id)?;
        fs::create_dir_all(&scan_dir)
            .await
            .map_err(|source| StorageError::Io {
                path: scan_dir.clone(),
                source,
            })?;

        let data = match &self.crypt {
            Some(crypt) => crypt.encrypt(&page.image)?,
            None => page.image.clone(),
        };

        // Write to a temporary name and rename, so a crash never leaves a
        // truncated page behind.
        let path = self.page_path(&page.scan_id, page.sequence_id)?;
        let tmp_path = scan_dir.join(format!(".{}.{PAGE_EXTENSION}.tmp", page.sequence_id));
        let io_err = |path: &Path| {
            let path = path.to_owned();
            move |source| StorageError::Io { path, source }
        };
        fs::write(&tmp_path, &data).await.map_err(io_err(&tmp_path))?;
        let file = fs::OpenOptions::new()
            .write(true)
            .open(&tmp_path)
            .await
            .map_err(io_err(&tmp_path))?
            .into_std()
            .await;
        file.set_modified(SystemTime::from(page.scan_time))
            .map_err(io_err(&tmp_path))?;
        drop(file);
        fs::rename(&tmp_path, &path).await.map_err(io_err(&path))?;

        debug!(path = %path.display(), bytes = data.len(), "Stored page");
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn retrieve(&self, scan_id: &str, sequence_id: u32) -> Result<ScannedPage, StorageError> {
        let path = self.page_path(scan_id, sequence_id)?;
        let what = || format!("page {}", page_id(scan_id, sequence_id));
        let data = fs::read(&path)
            .await
            .map_err(|err| StorageError::io(&path, what, err))?;
        let scan_time = fs::metadata(&path)
            .await
            .and_then(|metadata| metadata.modified())
            .map(DateTime::<Utc>::from)
            .map_err(|err| StorageError::io(&path, what, err))?;

        let image = match &self.crypt {
            Some(crypt) => crypt.decrypt(&data)?,
            None => data,
        };
        Ok(ScannedPage {
            scan_id: scan_id.to_owned(),
            sequence_id,
            image,
            scan_time,
        })
    }

    #[instrument(level = "debug", skip(self))]
    async fn list_pages(&self, scan_id: &str) -> Result<Vec<StoredPage>, StorageError> {
        let scan_dir = self.scan_dir(scan_id)?;
        let what = || format!("scan {scan_id}");
        let read_dir = fs::read_dir(&scan_dir)
            .await
            .map_err(|err| StorageError::io(&scan_dir, what, err))?;

        let mut pages = vec![];
        let mut entries = ReadDirStream::new(read_dir);
        while let Some(entry) = entries.next().await {
            let entry = entry.map_err(|err| StorageError::io(&scan_dir, what, err))?;
            match sequence_id_from_file_name(&entry.file_name().to_string_lossy()) {
                Some(sequence_id) => pages.push(StoredPage {
                    scan_id: scan_id.to_owned(),
                    sequence_id,
                }),
                None => trace!(path = %entry.path().display(), "Skipping non-page file"),
            }
        }
        pages.sort();
        Ok(pages)
    }
}

/// Parse `{sequence_id}.jpg`.
fn sequence_id_from_file_name(name: &str) -> Option<u32> {
    let (stem, extension) = name.rsplit_once('.')?;
    if extension != PAGE_EXTENSION || stem.starts_with('+') {
        return None;
    }
    stem.parse::<u32>().ok().filter(|&id| id > 0)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;
    use pretty_assertions::assert_eq;

    use super::*;

    const SCAN: &str = "0d9c7a52-52cf-4f5e-9a35-6b1d38f2c2a1";

    fn page(sequence_id: u32, image: &[u8]) -> ScannedPage {
        ScannedPage {
            scan_id: SCAN.to_owned(),
            sequence_id,
            image: image.to_vec(),
            scan_time: Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn stores_and_retrieves_plain_pages() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPageStore::open(dir.path(), None).await.unwrap();
        store.store(&page(1, b"jpeg bytes")).await.unwrap();

        let on_disk = std::fs::read(dir.path().join(SCAN).join("1.jpg")).unwrap();
        assert_eq!(on_disk, b"jpeg bytes");

        let retrieved = store.retrieve(SCAN, 1).await.unwrap();
        assert_eq!(retrieved.image, b"jpeg bytes");
        assert_eq!(retrieved.id(), format!("{SCAN}_1"));
        assert_eq!(retrieved.scan_time, page(1, b"").scan_time);
    }

    #[tokio::test]
    async fn encrypts_pages_at_rest() {
        let dir = tempfile::tempdir().unwrap();
        let crypt = PageCrypt::new("hunter2").unwrap();
        let store = FsPageStore::open(dir.path(), Some(crypt)).await.unwrap();
        store.store(&page(2, b"secret page")).await.unwrap();

        let on_disk = std::fs::read(dir.path().join(SCAN).join("2.jpg")).unwrap();
        assert_ne!(on_disk, b"secret page");
        let decrypted = PageCrypt::new("hunter2").unwrap().decrypt(&on_disk).unwrap();
        assert_eq!(decrypted, b"secret page");

        assert_eq!(store.retrieve(SCAN, 2).await.unwrap().image, b"secret page");
    }

    #[tokio::test]
    async fn wrong_passphrase_cannot_retrieve() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPageStore::open(dir.path(), Some(PageCrypt::new("a").unwrap()))
            .await
            .unwrap();
        store.store(&page(1, b"x")).await.unwrap();

        let other = FsPageStore::open(dir.path(), Some(PageCrypt::new("b").unwrap()))
            .await
            .unwrap();
        assert!(matches!(
            other.retrieve(SCAN, 1).await,
            Err(StorageError::Crypt(_))
        ));
    }

    #[tokio::test]
    async fn missing_pages_and_scans_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPageStore::open(dir.path(), None).await.unwrap();
        assert!(matches!(
            store.retrieve(SCAN, 1).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            store.list_pages(SCAN).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn lists_pages_in_sequence_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPageStore::open(dir.path(), None).await.unwrap();
        for seq in [10, 2, 1] {
            store.store(&page(seq, b"page")).await.unwrap();
        }
        std::fs::write(dir.path().join(SCAN).join("notes.txt"), b"").unwrap();

        let pages = store.list_pages(SCAN).await.unwrap();
        let ids = pages.iter().map(|p| p.sequence_id).collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 2, 10]);
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPageStore::open(dir.path(), None).await.unwrap();
        assert!(matches!(
            store.retrieve("../etc", 1).await,
            Err(StorageError::InvalidScanId(_))
        ));
    }

    #[test]
    fn parses_page_file_names() {
        assert_eq!(sequence_id_from_file_name("12.jpg"), Some(12));
        assert_eq!(sequence_id_from_file_name("0.jpg"), None);
        assert_eq!(sequence_id_from_file_name("+1.jpg"), None);
        assert_eq!(sequence_id_from_file_name(".3.jpg.tmp"), None);
        assert_eq!(sequence_id_from_file_name("3.png"), None);
    }
}
