//! The `text` subcommand.

use clap::Args;
use tokio::io::AsyncWriteExt as _;

use crate::{layout::LayoutOpts, ocr::OcrResult, prelude::*};

/// Reconstruct page text from a saved OCR result (see `ocr --output-mode
/// json`).
#[derive(Args, Debug)]
pub struct TextOpts {
    /// The OCR result, as JSON.
    pub input: PathBuf,

    #[clap(flatten)]
    pub layout: LayoutOpts,
}

/// The `text` subcommand.
#[instrument(level = "debug", skip_all, fields(input = %opts.input.display()))]
pub async fn cmd_text(opts: &TextOpts) -> Result<()> {
    let json = tokio::fs::read_to_string(&opts.input)
        .await
        .with_context(|| format!("unable to read {}", opts.input.display()))?;
    let result = serde_json::from_str::<OcrResult>(&json)
        .with_context(|| format!("unable to parse OCR result in {}", opts.input.display()))?;
    debug!(blocks = result.text_blocks.len(), "Loaded OCR result");

    let text = result.text(&opts.layout.to_strategy());
    let mut stdout = tokio::io::stdout();
    stdout.write_all(text.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}
