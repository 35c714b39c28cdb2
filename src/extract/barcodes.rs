//! Classifying barcodes.

use crate::{ocr::RawBarcode, prelude::*};

use super::qr_bill::{QR_TYPE, QrBill};

/// A classified barcode.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Barcode {
    /// The decoded payload, if this is a Swiss QR-bill.
    #[serde(rename = "qr_bill", skip_serializing_if = "Option::is_none")]
    pub qr_bill: Option<QrBill>,

    /// The raw barcode value. We keep this even for QR-bills, so that the
    /// reference and IBAN stay searchable as plain text.
    pub text: String,
}

/// Classify each raw barcode, preserving order. Undecodable QR-bills are
/// kept as plain text.
pub fn classify_barcodes(raw: &[RawBarcode]) -> Vec<Barcode> {
    raw.iter().map(|barcode| classify(&barcode.raw_value)).collect()
}

fn classify(raw_value: &str) -> Barcode {
    let qr_bill = if raw_value.starts_with(QR_TYPE) {
        match QrBill::decode(raw_value) {
            Ok(bill) => Some(bill),
            Err(err) => {
                warn!(error = %err, "Unable to decode Swiss QR-bill");
                None
            }
        }
    } else {
        None
    };
    Barcode {
        qr_bill,
        text: raw_value.to_owned(),
    }
}
