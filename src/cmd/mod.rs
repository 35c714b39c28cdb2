//! Command-line entry points, and the option groups they share.

use std::{sync::Arc, time::Duration};

use clap::Args;

use crate::{
    crypt::PageCrypt,
    extract::{CompanyRegistry, Extractor, ZefixClient},
    index::{OpenSearchIndex, SearchIndex, opensearch::DEFAULT_INDEX},
    layout::LayoutOpts,
    ocr::{HttpOcrClient, OcrGate, gate::DEFAULT_OCR_PERMITS},
    pipeline::Pipeline,
    prelude::*,
    storage::FsPageStore,
};

pub mod crypt;
pub mod index;
pub mod ocr;
pub mod reindex;
pub mod text;

/// How to reach the OCR service.
#[derive(Args, Clone, Debug)]
pub struct OcrServiceOpts {
    /// Base URL of the OCR service.
    #[clap(
        long = "ocr-endpoint",
        env = "OCR_API_ADDR",
        default_value = "http://localhost:8080"
    )]
    pub endpoint: String,

    /// An extra CA certificate (PEM) to trust when talking to the OCR service.
    #[clap(long = "ocr-ca-cert", env = "OCR_CA_CERT")]
    pub ca_cert: Option<PathBuf>,

    /// Timeout for each OCR request, in seconds. 0 disables the timeout.
    #[clap(long = "ocr-timeout", env = "OCR_TIMEOUT", default_value_t = 120)]
    pub timeout_secs: u64,

    /// How many OCR requests may be in flight at once.
    #[clap(long = "ocr-concurrency", default_value_t = DEFAULT_OCR_PERMITS)]
    pub concurrency: usize,
}

impl OcrServiceOpts {
    /// Build a gated OCR client.
    pub fn gate(&self) -> Result<OcrGate> {
        let timeout = (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs));
        let client = HttpOcrClient::new(&self.endpoint, self.ca_cert.as_deref(), timeout)
            .context("unable to create OCR client")?;
        Ok(OcrGate::new(Arc::new(client), self.concurrency))
    }
}

/// How to reach the search index.
#[derive(Args, Clone, Debug)]
pub struct SearchIndexOpts {
    /// Base URL of the OpenSearch cluster.
    #[clap(
        long = "opensearch-addr",
        env = "OPENSEARCH_ADDR",
        default_value = "https://localhost:9200"
    )]
    pub address: String,

    /// The index to write documents to.
    #[clap(long = "opensearch-index", env = "OPENSEARCH_INDEX", default_value = DEFAULT_INDEX)]
    pub index: String,

    #[clap(long = "opensearch-username", env = "OPENSEARCH_USERNAME")]
    pub username: Option<String>,

    #[clap(
        long = "opensearch-password",
        env = "OPENSEARCH_PASSWORD",
        hide_env_values = true
    )]
    pub password: Option<String>,

    /// Don't verify the cluster's TLS certificate.
    #[clap(long = "opensearch-insecure", env = "OPENSEARCH_INSECURE")]
    pub insecure: bool,
}

impl SearchIndexOpts {
    pub fn connect(&self) -> Result<Arc<dyn SearchIndex>> {
        let index = OpenSearchIndex::new(
            &self.address,
            &self.index,
            self.username.clone(),
            self.password.clone(),
            self.insecure,
        )
        .context("unable to create search index client")?;
        Ok(Arc::new(index))
    }
}

/// How to reach the company registry. Without a URL, we don't look up
/// companies at all.
#[derive(Args, Clone, Debug)]
pub struct RegistryOpts {
    /// Base URL of the Zefix REST API, for example
    /// `https://www.zefix.admin.ch/ZefixPublicREST/`.
    #[clap(long = "zefix-url", env = "ZEFIX_URL")]
    pub zefix_url: Option<String>,

    #[clap(long = "zefix-username", env = "ZEFIX_USERNAME")]
    pub zefix_username: Option<String>,

    #[clap(long = "zefix-password", env = "ZEFIX_PASSWORD", hide_env_values = true)]
    pub zefix_password: Option<String>,
}

impl RegistryOpts {
    /// Build an extractor, with a registry if we have one configured.
    pub fn extractor(&self) -> Result<Extractor> {
        let registry = match &self.zefix_url {
            Some(url) => {
                let client = ZefixClient::new(
                    url,
                    self.zefix_username.clone(),
                    self.zefix_password.clone(),
                    Some(Duration::from_secs(30)),
                )
                .context("unable to create company registry client")?;
                Some(Arc::new(client) as Arc<dyn CompanyRegistry>)
            }
            None => None,
        };
        Ok(Extractor::new(registry))
    }
}

/// Where we archive page images.
#[derive(Args, Clone, Debug)]
pub struct StorageOpts {
    /// Directory to archive page images in.
    #[clap(long = "storage-dir", env = "STORAGE_DIR")]
    pub dir: Option<PathBuf>,

    /// Encrypt archived pages with a key derived from this passphrase.
    #[clap(long = "passphrase", env = "PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,
}

impl StorageOpts {
    /// Open our storage, if we have a directory.
    pub async fn open(&self) -> Result<Option<FsPageStore>> {
        let Some(dir) = &self.dir else {
            if self.passphrase.is_some() {
                warn!("A passphrase was given, but no storage directory, so pages won't be archived");
            }
            return Ok(None);
        };
        let crypt = match &self.passphrase {
            Some(passphrase) => Some(PageCrypt::new(passphrase)?),
            None => {
                warn!("No passphrase given, archived pages will not be encrypted");
                None
            }
        };
        let store = FsPageStore::open(dir, crypt)
            .await
            .with_context(|| format!("unable to open storage directory {}", dir.display()))?;
        Ok(Some(store))
    }

    /// Open our storage, failing if we don't have a directory.
    pub async fn open_required(&self) -> Result<FsPageStore> {
        self.open()
            .await?
            .ok_or_else(|| anyhow!("--storage-dir (or STORAGE_DIR) is required"))
    }
}

/// Everything needed to build a [`Pipeline`].
#[derive(Args, Clone, Debug)]
pub struct PipelineOpts {
    #[clap(flatten)]
    pub ocr: OcrServiceOpts,

    #[clap(flatten)]
    pub index: SearchIndexOpts,

    #[clap(flatten)]
    pub registry: RegistryOpts,

    #[clap(flatten)]
    pub layout: LayoutOpts,

    #[clap(flatten)]
    pub storage: StorageOpts,
}

impl PipelineOpts {
    /// Build a pipeline and make sure its services are up.
    pub async fn pipeline(&self) -> Result<Pipeline> {
        let pipeline = Pipeline::new(
            self.ocr.gate()?,
            self.registry.extractor()?,
            self.index.connect()?,
            self.layout.to_strategy(),
        );
        pipeline.check_health().await?;
        Ok(pipeline)
    }
}
