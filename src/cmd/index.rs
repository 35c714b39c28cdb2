//! The `index` subcommand.

use std::sync::Arc;

use clap::Args;

use crate::{
    pipeline::{
        DEFAULT_WORKERS,
        source::{new_scan_id, read_dir_images},
    },
    prelude::*,
    ui::{ProgressConfig, Ui},
};

use super::PipelineOpts;

/// Index a directory of scanned page images as one scan.
#[derive(Args, Debug)]
pub struct IndexOpts {
    /// Directory of page images. Files are read in name order; subdirectories
    /// are ignored.
    pub input_dir: PathBuf,

    /// Number of pages to process at once.
    #[clap(
        short = 'w',
        long,
        default_value_t = DEFAULT_WORKERS as i32,
        allow_negative_numbers = true
    )]
    pub workers: i32,

    #[clap(flatten)]
    pub pipeline: PipelineOpts,
}

/// The `index` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_index(ui: Ui, opts: &IndexOpts) -> Result<()> {
    let mut pipeline = opts.pipeline.pipeline().await?;
    if let Some(store) = opts.pipeline.storage.open().await? {
        pipeline = pipeline.with_archive(Arc::new(store));
    }

    let images = read_dir_images(&opts.input_dir).await?;
    let pb = ui.new_from_size_hint(
        &ProgressConfig {
            emoji: "📄",
            msg: "Indexing pages",
            done_msg: "Indexed pages",
        },
        images.size_hint(),
    );

    let scan_id = new_scan_id();
    info!(%scan_id, dir = %opts.input_dir.display(), "Starting scan");
    let summary = pipeline.run(&scan_id, images, opts.workers, pb).await?;

    summary.display(&ui);
    ui.display_message("🔖", &format!("Scan ID: {scan_id}"));
    summary.check()
}
