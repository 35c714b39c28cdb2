//! Talking to the OCR service.
//!
//! The OCR service itself is a black box: we send it an image, and it sends
//! back a list of text blocks and barcodes, each with a bounding box. This
//! module contains the wire format, the [`OcrEngine`] trait that the pipeline
//! talks to, an HTTP implementation, and the [`OcrGate`] that limits how many
//! requests we have in flight.

use thiserror::Error;

use crate::{geometry::BoundingBox, layout::LayoutStrategy, prelude::*};

pub mod client;
pub mod gate;

pub use self::{client::HttpOcrClient, gate::OcrGate};

/// A single line inside a [`TextBlock`]. We don't use these for layout, but
/// we keep them so that `ocr --output-mode json` round-trips the service's
/// output.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextLine {
    pub text: String,
    pub angle: f64,
    pub confidence: f64,
    pub recognized_language: String,
}

/// A fragment of text detected by the OCR service.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBlock {
    /// The recognized text.
    pub text: String,

    /// Individual lines, when the service reports them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<TextLine>,

    /// Where the block is on the page.
    pub bounding_box: BoundingBox,

    /// Detected language code, if any.
    #[serde(default, rename = "lang")]
    pub language: String,
}

impl TextBlock {
    /// Build a block from text and a bounding box.
    #[cfg(test)]
    pub fn new(text: impl Into<String>, bounding_box: BoundingBox) -> Self {
        Self {
            text: text.into(),
            bounding_box,
            ..Self::default()
        }
    }
}

/// A barcode detected by the OCR service, before classification.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBarcode {
    #[serde(default)]
    pub bounding_box: BoundingBox,

    #[serde(default)]
    pub display_value: String,

    pub raw_value: String,
}

/// Everything the OCR service found on one page.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResult {
    #[serde(default)]
    pub text_blocks: Vec<TextBlock>,

    #[serde(default)]
    pub barcodes: Vec<RawBarcode>,
}

impl OcrResult {
    /// Reconstruct the page text using `strategy`.
    pub fn text(&self, strategy: &LayoutStrategy) -> String {
        strategy.reconstruct(&self.text_blocks)
    }
}

/// Errors talking to the OCR service.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("invalid OCR endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("cannot read OCR CA certificate {path:?}")]
    Certificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot reach OCR service")]
    Request(#[from] reqwest::Error),

    #[error("OCR service returned unexpected status {0}")]
    Status(reqwest::StatusCode),
}

/// Interface to an OCR service.
#[async_trait]
pub trait OcrEngine: Send + Sync + 'static {
    /// Recognize text and barcodes in a single page image.
    async fn recognize(&self, image: &[u8]) -> Result<OcrResult, OcrError>;

    /// Is the service up? `Ok(false)` means it answered, but not with a
    /// success status.
    async fn is_healthy(&self) -> Result<bool, OcrError>;
}
