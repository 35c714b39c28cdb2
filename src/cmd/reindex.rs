//! The `reindex` subcommand.

use clap::Args;

use crate::{
    prelude::*,
    ui::{ProgressConfig, Ui},
};

use super::PipelineOpts;

/// Re-run OCR and extraction for an archived scan, overwriting its documents.
#[derive(Args, Debug)]
pub struct ReindexOpts {
    /// The scan to reindex, as printed by `index`.
    pub scan_id: String,

    #[clap(flatten)]
    pub pipeline: PipelineOpts,
}

/// The `reindex` subcommand.
#[instrument(level = "debug", skip_all, fields(scan_id = %opts.scan_id))]
pub async fn cmd_reindex(ui: Ui, opts: &ReindexOpts) -> Result<()> {
    let store = opts.pipeline.storage.open_required().await?;
    let pipeline = opts.pipeline.pipeline().await?;

    let spinner = ui.new_spinner(&ProgressConfig {
        emoji: "🔁",
        msg: "Reindexing scan",
        done_msg: "Reindexed scan",
    });
    let summary = pipeline.reindex(&store, &opts.scan_id).await?;
    spinner.set_position(summary.total as u64);
    spinner.finish_using_style();

    summary.display(&ui);
    summary.check()
}
