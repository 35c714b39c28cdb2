//! Scanned pages and the documents we index for them.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    extract::{Barcode, Company, Extraction},
    prelude::*,
};

/// One scanned image, plus where it came from.
#[derive(Clone)]
pub struct ScannedPage {
    /// Groups the pages of one scan run. A UUID.
    pub scan_id: String,

    /// 1-based position within the scan.
    pub sequence_id: u32,

    /// The image bytes, normally a JPEG.
    pub image: Vec<u8>,

    /// When the page was scanned (or stored).
    pub scan_time: DateTime<Utc>,
}

impl ScannedPage {
    /// The page's document ID, `{scan_id}_{sequence_id}`. Indexing the same
    /// page twice overwrites the same document.
    pub fn id(&self) -> String {
        page_id(&self.scan_id, self.sequence_id)
    }
}

impl fmt::Debug for ScannedPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Don't dump the whole image into our logs.
        f.debug_struct("ScannedPage")
            .field("scan_id", &self.scan_id)
            .field("sequence_id", &self.sequence_id)
            .field("image_len", &self.image.len())
            .field("scan_time", &self.scan_time)
            .finish()
    }
}

/// Build a document ID.
pub fn page_id(scan_id: &str, sequence_id: u32) -> String {
    format!("{scan_id}_{sequence_id}")
}

/// The record we store in the search index for each page.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// The primary date: the first one in the text.
    #[serde(rename = "date", skip_serializing_if = "Option::is_none")]
    pub primary_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,

    /// The first barcode on the page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barcode: Option<Barcode>,

    /// Any other barcodes, in order.
    pub additional_barcodes: Vec<Barcode>,

    /// The primary company: the first one mentioned.
    #[serde(rename = "company", skip_serializing_if = "Option::is_none")]
    pub primary_company: Option<Company>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub companies: Vec<Company>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dates: Vec<NaiveDate>,

    pub indexed_at: DateTime<Utc>,

    pub scan_id: String,
    pub sequence_id: u32,
}

impl Document {
    /// Assemble the document for `page`.
    pub fn new(
        page: &ScannedPage,
        text: String,
        extraction: Extraction,
        indexed_at: DateTime<Utc>,
    ) -> Self {
        let Extraction {
            dates,
            companies,
            barcodes,
        } = extraction;
        let mut barcodes = barcodes.into_iter();
        Self {
            primary_date: dates.first().copied(),
            text,
            barcode: barcodes.next(),
            additional_barcodes: barcodes.collect(),
            primary_company: companies.first().cloned(),
            companies,
            dates,
            indexed_at,
            scan_id: page.scan_id.clone(),
            sequence_id: page.sequence_id,
        }
    }

    /// This document's ID in the index.
    pub fn id(&self) -> String {
        page_id(&self.scan_id, self.sequence_id)
    }
}
