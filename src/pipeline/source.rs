//! Where page images come from.

use futures::StreamExt as _;
use tokio::fs;
use tokio_stream::wrappers::ReadDirStream;
use uuid::Uuid;

use crate::{async_utils::BoxedStream, prelude::*};

/// A fresh scan ID.
pub fn new_scan_id() -> String {
    Uuid::new_v4().to_string()
}

/// Read every regular file in `dir` as a page image, in file name order.
/// Subdirectories are ignored.
///
/// Files are read lazily. A file we can't read shows up as an `Err` in the
/// stream, and the caller decides what to do about it.
#[instrument(level = "debug")]
pub async fn read_dir_images(dir: &Path) -> Result<BoxedStream<Result<Vec<u8>>>> {
    let read_dir = fs::read_dir(dir)
        .await
        .with_context(|| format!("unable to read directory {}", dir.display()))?;

    let mut paths = vec![];
    let mut entries = ReadDirStream::new(read_dir);
    while let Some(entry) = entries.next().await {
        let entry =
            entry.with_context(|| format!("unable to read directory {}", dir.display()))?;
        let path = entry.path();
        match entry.file_type().await {
            Ok(file_type) if file_type.is_dir() => {
                trace!(path = %path.display(), "Skipping directory");
            }
            // Anything else, including files we can't stat, is a page. If we
            // can't read it, we'll find out below.
            _ => paths.push(path),
        }
    }
    paths.sort();
    debug!(count = paths.len(), "Found page images");

    Ok(futures::stream::iter(paths)
        .then(|path| async move {
            fs::read(&path)
                .await
                .with_context(|| format!("unable to read {}", path.display()))
        })
        .boxed())
}
