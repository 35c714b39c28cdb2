use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod async_utils;
mod cmd;
mod crypt;
mod document;
mod extract;
mod geometry;
mod index;
mod layout;
mod ocr;
mod pipeline;
mod prelude;
mod storage;
mod ui;

/// OCR scanned pages, extract dates, companies and QR bills, and index them.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  - OCR_API_ADDR: Base URL of the OCR service.
  - OPENSEARCH_ADDR, OPENSEARCH_INDEX, OPENSEARCH_USERNAME,
    OPENSEARCH_PASSWORD: Where to index documents.
  - ZEFIX_URL, ZEFIX_USERNAME, ZEFIX_PASSWORD (optional): Company registry.
  - STORAGE_DIR (optional): Where to archive page images.
  - PASSPHRASE (optional): Encrypt archived page images.
  - RUST_LOG (optional): Log filter, for example `scan_indexer=debug`.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Index a directory of page images as a new scan.
    Index(cmd::index::IndexOpts),
    /// Re-index an archived scan.
    Reindex(cmd::reindex::ReindexOpts),
    /// OCR a single image and print the text or the raw OCR result.
    Ocr(cmd::ocr::OcrOpts),
    /// Reconstruct text from a saved OCR result.
    Text(cmd::text::TextOpts),
    /// Encrypt standard input in the page storage format.
    Encrypt(cmd::crypt::CryptOpts),
    /// Decrypt an archived page from standard input.
    Decrypt(cmd::crypt::CryptOpts),
}

impl Cmd {
    /// Are we using stdout for output?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::Index(_) | Cmd::Reindex(_) => false,
            Cmd::Ocr(_) | Cmd::Text(_) | Cmd::Encrypt(_) | Cmd::Decrypt(_) => true,
        }
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive = Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);
    tracing_subscriber::registry().with(subscriber).init();

    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    match &opts.subcmd {
        Cmd::Index(opts) => cmd::index::cmd_index(ui, opts).await,
        Cmd::Reindex(opts) => cmd::reindex::cmd_reindex(ui, opts).await,
        Cmd::Ocr(opts) => cmd::ocr::cmd_ocr(opts).await,
        Cmd::Text(opts) => cmd::text::cmd_text(opts).await,
        Cmd::Encrypt(opts) => cmd::crypt::cmd_crypt(opts, cmd::crypt::Direction::Encrypt).await,
        Cmd::Decrypt(opts) => cmd::crypt::cmd_crypt(opts, cmd::crypt::Direction::Decrypt).await,
    }
}
