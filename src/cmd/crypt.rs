//! The `encrypt` and `decrypt` subcommands. Both filter stdin to stdout, using
//! the same blob format as page storage.

use clap::Args;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

use crate::{crypt::PageCrypt, prelude::*};

#[derive(Args, Debug)]
pub struct CryptOpts {
    /// The passphrase pages are encrypted with.
    #[clap(long, env = "PASSPHRASE", hide_env_values = true)]
    pub passphrase: String,
}

/// Which way to go.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// The `encrypt` and `decrypt` subcommands.
#[instrument(level = "debug", skip(opts))]
pub async fn cmd_crypt(opts: &CryptOpts, direction: Direction) -> Result<()> {
    let crypt = PageCrypt::new(&opts.passphrase)?;

    let mut input = vec![];
    tokio::io::stdin()
        .read_to_end(&mut input)
        .await
        .context("unable to read standard input")?;

    let output = match direction {
        Direction::Encrypt => crypt.encrypt(&input)?,
        Direction::Decrypt => crypt
            .decrypt(&input)
            .context("unable to decrypt standard input")?,
    };

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&output).await?;
    stdout.flush().await?;
    Ok(())
}
