//! Pulling structured data out of an OCRed page.
//!
//! Nothing in here fails a page. Bad barcodes, impossible dates and registry
//! outages are logged, and we index whatever we did manage to extract.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::{ocr::OcrResult, prelude::*};

pub mod barcodes;
pub mod companies;
pub mod dates;
pub mod qr_bill;
pub mod registry;

pub use self::{
    barcodes::Barcode,
    dates::{DateFinder, RegexDateFinder},
    registry::{Company, CompanyRegistry, ZefixClient},
};

/// Everything we extracted from one page.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Extraction {
    /// Dates in text order.
    pub dates: Vec<NaiveDate>,

    /// Known companies, in order of first mention.
    pub companies: Vec<Company>,

    /// Barcodes in the order the OCR service reported them.
    pub barcodes: Vec<Barcode>,
}

/// Runs all our extractors over a page. Cheap to clone.
#[derive(Clone)]
pub struct Extractor {
    registry: Option<Arc<dyn CompanyRegistry>>,
    date_finder: Arc<dyn DateFinder>,
}

impl Extractor {
    /// Create an extractor. Without a `registry`, we don't look for companies.
    pub fn new(registry: Option<Arc<dyn CompanyRegistry>>) -> Self {
        if registry.is_none() {
            warn!("No company registry configured, skipping company extraction");
        }
        Self {
            registry,
            date_finder: Arc::new(RegexDateFinder),
        }
    }

    /// Use a different date finder.
    #[allow(dead_code)]
    pub fn with_date_finder(mut self, date_finder: Arc<dyn DateFinder>) -> Self {
        self.date_finder = date_finder;
        self
    }

    /// Check that the company registry, if any, is reachable.
    pub async fn ping(&self) -> Result<()> {
        if let Some(registry) = &self.registry {
            registry
                .ping()
                .await
                .context("unable to ping company registry")?;
        }
        Ok(())
    }

    /// Extract dates and companies from `text`, which should be the
    /// reconstructed text of `ocr_result`, and classify its barcodes.
    #[instrument(level = "debug", skip_all)]
    pub async fn extract(&self, ocr_result: &OcrResult, text: &str) -> Extraction {
        let barcodes = barcodes::classify_barcodes(&ocr_result.barcodes);

        let (dates, date_errors) = self.date_finder.find_dates(text);
        for err in &date_errors {
            warn!(error = %err, "Ignoring date");
        }

        let companies = match &self.registry {
            Some(registry) => companies::find_companies(registry.as_ref(), text).await,
            None => vec![],
        };

        debug!(
            dates = dates.len(),
            companies = companies.len(),
            barcodes = barcodes.len(),
            "Extracted page data"
        );
        Extraction {
            dates,
            companies,
            barcodes,
        }
    }
}
