//! The `ocr` subcommand.

use clap::{Args, ValueEnum};
use tokio::io::AsyncWriteExt as _;

use crate::{layout::LayoutOpts, prelude::*};

use super::OcrServiceOpts;

/// What to print.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Reconstructed page text.
    #[default]
    Text,

    /// The OCR service's response, as JSON. Feed this to `text` to try out
    /// layout settings without calling the OCR service again.
    Json,
}

/// OCR a single image and print the result.
#[derive(Args, Debug)]
pub struct OcrOpts {
    /// The image to OCR.
    pub image: PathBuf,

    #[clap(long, value_enum, default_value_t = OutputMode::default())]
    pub output_mode: OutputMode,

    #[clap(flatten)]
    pub ocr: OcrServiceOpts,

    #[clap(flatten)]
    pub layout: LayoutOpts,
}

/// The `ocr` subcommand.
#[instrument(level = "debug", skip_all, fields(image = %opts.image.display()))]
pub async fn cmd_ocr(opts: &OcrOpts) -> Result<()> {
    let image = tokio::fs::read(&opts.image)
        .await
        .with_context(|| format!("unable to read {}", opts.image.display()))?;
    let result = opts
        .ocr
        .gate()?
        .recognize(&image)
        .await
        .with_context(|| format!("unable to OCR {}", opts.image.display()))?;

    let output = match opts.output_mode {
        OutputMode::Text => result.text(&opts.layout.to_strategy()),
        OutputMode::Json => {
            let mut json = serde_json::to_string_pretty(&result)?;
            json.push('\n');
            json
        }
    };
    let mut stdout = tokio::io::stdout();
    stdout.write_all(output.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}
