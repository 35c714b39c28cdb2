//! HTTP client for the OCR service.

use std::time::Duration;

use reqwest::{Certificate, Client, StatusCode, Url, header::CONTENT_TYPE};

use crate::prelude::*;

use super::{OcrEngine, OcrError, OcrResult};

/// The content type we send when we can't sniff one from the image bytes.
/// Scanners give us JPEGs, so this is almost always right anyway.
const DEFAULT_IMAGE_TYPE: &str = "image/jpeg";

/// OCR engine backed by the OCR service's HTTP API.
#[derive(Clone, Debug)]
pub struct HttpOcrClient {
    client: Client,
    endpoint: Url,
}

impl HttpOcrClient {
    /// Create a new client for the service at `endpoint`.
    ///
    /// If `ca_path` is set, the PEM certificate there is trusted in addition
    /// to the system roots. `timeout` applies to each whole request.
    pub fn new(
        endpoint: &str,
        ca_path: Option<&Path>,
        timeout: Option<Duration>,
    ) -> Result<Self, OcrError> {
        let endpoint = parse_endpoint(endpoint)?;

        let mut builder = Client::builder();
        if let Some(path) = ca_path {
            let pem = std::fs::read(path).map_err(|source| OcrError::Certificate {
                path: path.to_owned(),
                source,
            })?;
            builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint,
        })
    }

    fn url(&self, path: &str) -> Result<Url, OcrError> {
        self.endpoint
            .join(path)
            .map_err(|err| OcrError::InvalidEndpoint {
                endpoint: self.endpoint.to_string(),
                reason: err.to_string(),
            })
    }
}

/// Parse and check an OCR endpoint URL.
fn parse_endpoint(endpoint: &str) -> Result<Url, OcrError> {
    let url = Url::parse(endpoint).map_err(|err| OcrError::InvalidEndpoint {
        endpoint: endpoint.to_owned(),
        reason: err.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(OcrError::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
            reason: format!("scheme {scheme} is not supported"),
        }),
    }
}

#[async_trait]
impl OcrEngine for HttpOcrClient {
    #[instrument(level = "debug", skip_all, fields(bytes = image.len()))]
    async fn recognize(&self, image: &[u8]) -> Result<OcrResult, OcrError> {
        let content_type = infer::get(image)
            .map(|kind| kind.mime_type())
            .filter(|mime| mime.starts_with("image/"))
            .unwrap_or(DEFAULT_IMAGE_TYPE);

        let res = self
            .client
            .post(self.url("/api/v1/ocr")?)
            .header(CONTENT_TYPE, content_type)
            .body(image.to_vec())
            .send()
            .await?;
        if res.status() != StatusCode::OK {
            return Err(OcrError::Status(res.status()));
        }

        let result = res.json::<OcrResult>().await?;
        trace!(?result, "OCR response");
        Ok(result)
    }

    #[instrument(level = "debug", skip_all)]
    async fn is_healthy(&self) -> Result<bool, OcrError> {
        let res = self.client.get(self.url("/healthz")?).send().await?;
        Ok(res.status() == StatusCode::OK)
    }
}
