//! Swiss QR-bill payloads.
//!
//! A QR-bill is the payment slip at the bottom of most Swiss invoices. Its QR
//! code holds a newline-separated list of fields, starting with `SPC`. We
//! decode the fields we care about for search (who gets paid, how much, and
//! the payment reference), and check the parts that have checksums.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::prelude::*;

/// Marker on the first line of every QR-bill payload.
pub const QR_TYPE: &str = "SPC";

/// Marker ending the mandatory part of the payload.
const TRAILER: &str = "EPD";

/// Number of mandatory lines, up to and including the trailer.
const MANDATORY_LINES: usize = 31;

/// At most two alternative payment schemes may follow the billing information.
const MAX_ALTERNATIVE_SCHEMES: usize = 2;

static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,9}(?:\.\d{1,2})?$").expect("failed to compile regex")
});

/// Why a payload couldn't be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("not a QR-bill (first line is {0:?})")]
    NotQrBill(String),

    #[error("unsupported QR-bill version {0:?}")]
    UnsupportedVersion(String),

    #[error("unsupported character coding {0:?}")]
    UnsupportedCoding(String),

    #[error("QR-bill has {0} lines, expected at least {MANDATORY_LINES}")]
    TooFewLines(usize),

    #[error("QR-bill has too many alternative schemes ({0})")]
    TooManyLines(usize),

    #[error("invalid IBAN {0:?}")]
    InvalidIban(String),

    #[error("invalid {role} address: {reason}")]
    InvalidAddress { role: &'static str, reason: String },

    #[error("ultimate creditor fields must be empty")]
    UltimateCreditorNotEmpty,

    #[error("invalid amount {0:?}")]
    InvalidAmount(String),

    #[error("unsupported currency {0:?}")]
    InvalidCurrency(String),

    #[error("unknown reference type {0:?}")]
    UnknownReferenceType(String),

    #[error("invalid {kind} reference {reference:?}: {reason}")]
    InvalidReference {
        kind: &'static str,
        reference: String,
        reason: &'static str,
    },

    #[error("expected trailer {TRAILER:?}, found {0:?}")]
    MissingTrailer(String),
}

/// A decoded QR-bill.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrBill {
    /// Specification version, like `0200`.
    pub version: String,

    /// The creditor's IBAN (or QR-IBAN), without spaces.
    pub iban: String,

    /// Who gets paid.
    pub creditor: Address,

    /// The amount, if the bill specifies one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,

    pub currency: Currency,

    /// Who pays, if the bill says.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ultimate_debtor: Option<Address>,

    pub reference: Reference,

    /// Free-text message to the creditor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Structured billing information (`//S1/...`), undecoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_information: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternative_schemes: Vec<String>,
}

/// Address layout.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub enum AddressType {
    /// Street, building number, postal code and town in separate fields.
    #[serde(rename = "S")]
    Structured,

    /// Two free-form address lines.
    #[serde(rename = "K")]
    Combined,
}

/// A creditor or debtor address.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(rename = "type")]
    pub address_type: AddressType,
    pub name: String,

    /// Street name for [`AddressType::Structured`], else address line 1.
    pub street_or_line1: String,

    /// Building number for [`AddressType::Structured`], else address line 2.
    pub building_or_line2: String,
    pub postal_code: String,
    pub town: String,

    /// Two-letter ISO country code.
    pub country: String,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub enum Currency {
    #[serde(rename = "CHF")]
    Chf,
    #[serde(rename = "EUR")]
    Eur,
}

/// The payment reference.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum Reference {
    /// 27-digit QR reference, used with QR-IBANs.
    #[serde(rename = "QRR")]
    Qr(String),

    /// ISO 11649 creditor reference (`RF...`).
    #[serde(rename = "SCOR")]
    Creditor(String),

    #[serde(rename = "NON")]
    None,
}

impl QrBill {
    /// Decode a raw QR-bill payload.
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let mut lines = raw
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .collect::<Vec<_>>();
        // Scanners and generators disagree about trailing newlines.
        while lines.len() > MANDATORY_LINES && lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }

        let first = lines.first().copied().unwrap_or_default();
        if first != QR_TYPE {
            return Err(DecodeError::NotQrBill(first.to_owned()));
        }
        if lines.len() < MANDATORY_LINES {
            return Err(DecodeError::TooFewLines(lines.len()));
        }
        if lines.len() > MANDATORY_LINES + 1 + MAX_ALTERNATIVE_SCHEMES {
            return Err(DecodeError::TooManyLines(lines.len() - MANDATORY_LINES - 1));
        }

        let version = lines[1];
        if !(version.len() == 4 && version.starts_with("02")) {
            return Err(DecodeError::UnsupportedVersion(version.to_owned()));
        }
        if lines[2] != "1" {
            return Err(DecodeError::UnsupportedCoding(lines[2].to_owned()));
        }

        let iban = decode_iban(lines[3])?;
        let creditor = decode_address("creditor", &lines[4..11])?
            .ok_or_else(|| DecodeError::InvalidAddress {
                role: "creditor",
                reason: "address is missing".to_owned(),
            })?;
        if lines[11..18].iter().any(|field| !field.is_empty()) {
            return Err(DecodeError::UltimateCreditorNotEmpty);
        }
        let amount = decode_amount(lines[18])?;
        let currency = match lines[19] {
            "CHF" => Currency::Chf,
            "EUR" => Currency::Eur,
            other => return Err(DecodeError::InvalidCurrency(other.to_owned())),
        };
        let ultimate_debtor = decode_address("ultimate debtor", &lines[20..27])?;
        let reference = decode_reference(lines[27], lines[28])?;
        check_reference_matches_iban(&iban, &reference)?;
        let message = non_empty(lines[29]);
        if lines[30] != TRAILER {
            return Err(DecodeError::MissingTrailer(lines[30].to_owned()));
        }

        let billing_information = lines.get(31).and_then(|line| non_empty(line));
        let alternative_schemes = lines
            .iter()
            .skip(MANDATORY_LINES + 1)
            .filter(|line| !line.is_empty())
            .map(|line| (*line).to_owned())
            .collect();

        Ok(Self {
            version: version.to_owned(),
            iban,
            creditor,
            amount,
            currency,
            ultimate_debtor,
            reference,
            message,
            billing_information,
            alternative_schemes,
        })
    }
}

fn non_empty(field: &str) -> Option<String> {
    let field = field.trim();
    (!field.is_empty()).then(|| field.to_owned())
}

fn decode_iban(field: &str) -> Result<String, DecodeError> {
    let iban = field
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    let valid = iban.len() == 21
        && (iban.starts_with("CH") || iban.starts_with("LI"))
        && iban.chars().all(|c| c.is_ascii_alphanumeric())
        && mod97(&iban) == Some(1);
    if valid {
        Ok(iban)
    } else {
        Err(DecodeError::InvalidIban(field.to_owned()))
    }
}

/// Is this a QR-IBAN? These have an institution ID of 30000 to 31999.
fn is_qr_iban(iban: &str) -> bool {
    iban.get(4..9)
        .and_then(|iid| iid.parse::<u32>().ok())
        .is_some_and(|iid| (30000..=31999).contains(&iid))
}

fn decode_address(role: &'static str, fields: &[&str]) -> Result<Option<Address>, DecodeError> {
    if fields.iter().all(|field| field.is_empty()) {
        return Ok(None);
    }
    let invalid = |reason: &str| DecodeError::InvalidAddress {
        role,
        reason: reason.to_owned(),
    };

    let address_type = match fields[0] {
        "S" => AddressType::Structured,
        "K" => AddressType::Combined,
        other => return Err(invalid(&format!("unknown address type {other:?}"))),
    };
    let address = Address {
        address_type,
        name: fields[1].trim().to_owned(),
        street_or_line1: fields[2].trim().to_owned(),
        building_or_line2: fields[3].trim().to_owned(),
        postal_code: fields[4].trim().to_owned(),
        town: fields[5].trim().to_owned(),
        country: fields[6].trim().to_owned(),
    };

    if address.name.is_empty() {
        return Err(invalid("name is missing"));
    }
    if !(address.country.len() == 2 && address.country.chars().all(|c| c.is_ascii_uppercase())) {
        return Err(invalid(&format!("bad country code {:?}", address.country)));
    }
    match address_type {
        AddressType::Structured if address.postal_code.is_empty() || address.town.is_empty() => {
            Err(invalid("structured address needs a postal code and town"))
        }
        AddressType::Combined if address.building_or_line2.is_empty() => {
            Err(invalid("combined address needs a second address line"))
        }
        _ => Ok(Some(address)),
    }
}

fn decode_amount(field: &str) -> Result<Option<f64>, DecodeError> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(None);
    }
    if !AMOUNT_RE.is_match(field) {
        return Err(DecodeError::InvalidAmount(field.to_owned()));
    }
    field
        .parse::<f64>()
        .map(Some)
        .map_err(|_| DecodeError::InvalidAmount(field.to_owned()))
}

fn decode_reference(kind: &str, reference: &str) -> Result<Reference, DecodeError> {
    let reference = reference
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>();
    match kind {
        "QRR" => {
            let invalid = |reason| DecodeError::InvalidReference {
                kind: "QR",
                reference: reference.clone(),
                reason,
            };
            if reference.len() != 27 || !reference.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid("must be 27 digits"));
            }
            let (body, check) = reference.split_at(26);
            if mod10_recursive(body).to_string() != check {
                return Err(invalid("bad check digit"));
            }
            Ok(Reference::Qr(reference))
        }
        "SCOR" => {
            let reference = reference.to_ascii_uppercase();
            let valid = (5..=25).contains(&reference.len())
                && reference.starts_with("RF")
                && reference.chars().all(|c| c.is_ascii_alphanumeric())
                && mod97(&reference) == Some(1);
            if !valid {
                return Err(DecodeError::InvalidReference {
                    kind: "creditor",
                    reference,
                    reason: "bad ISO 11649 reference",
                });
            }
            Ok(Reference::Creditor(reference))
        }
        "NON" if reference.is_empty() => Ok(Reference::None),
        "NON" => Err(DecodeError::InvalidReference {
            kind: "NON",
            reference,
            reason: "must be empty",
        }),
        other => Err(DecodeError::UnknownReferenceType(other.to_owned())),
    }
}

/// QR-IBANs require a QR reference, and QR references require a QR-IBAN.
fn check_reference_matches_iban(iban: &str, reference: &Reference) -> Result<(), DecodeError> {
    let qr_iban = is_qr_iban(iban);
    match reference {
        Reference::Qr(_) if !qr_iban => Err(DecodeError::InvalidReference {
            kind: "QR",
            reference: iban.to_owned(),
            reason: "QR references need a QR-IBAN",
        }),
        Reference::Creditor(r) if qr_iban => Err(DecodeError::InvalidReference {
            kind: "creditor",
            reference: r.clone(),
            reason: "QR-IBANs need a QR reference",
        }),
        Reference::None if qr_iban => Err(DecodeError::InvalidReference {
            kind: "NON",
            reference: iban.to_owned(),
            reason: "QR-IBANs need a QR reference",
        }),
        _ => Ok(()),
    }
}

/// ISO 7064 MOD 97-10, as used by IBANs and creditor references: move the
/// first four characters to the end, map letters to 10..=35 and take the
/// remainder. Valid inputs give 1.
fn mod97(value: &str) -> Option<u32> {
    let (head, tail) = value.split_at_checked(4)?;
    let mut remainder = 0u32;
    for c in tail.chars().chain(head.chars()) {
        let digit = c.to_digit(36)?;
        remainder = if digit >= 10 {
            (remainder * 100 + digit) % 97
        } else {
            (remainder * 10 + digit) % 97
        };
    }
    Some(remainder)
}

/// The recursive modulo 10 check digit used by QR references.
fn mod10_recursive(digits: &str) -> u32 {
    const TABLE: [u32; 10] = [0, 9, 4, 6, 8, 2, 7, 1, 3, 5];
    let carry = digits
        .chars()
        .filter_map(|c| c.to_digit(10))
        .fold(0, |carry, digit| TABLE[((carry + digit) % 10) as usize]);
    (10 - carry) % 10
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const QR_IBAN: &str = "CH4431999123000889012";
    const IBAN: &str = "CH5800791123000889012";

    fn payload(iban: &str, reference_type: &str, reference: &str) -> Vec<String> {
        [
            "SPC",
            "0200",
            "1",
            iban,
            "S",
            "Robert Schneider AG",
            "Rue du Lac",
            "1268",
            "2501",
            "Biel",
            "CH",
            "",
            "",
            "",
            "",
            "",
            "",
            "",
            "1949.75",
            "CHF",
            "S",
            "Pia-Maria Rutschmann-Schnyder",
            "Grosse Marktgasse",
            "28",
            "9400",
            "Rorschach",
            "CH",
            reference_type,
            reference,
            "Order of 15 June 2020",
            "EPD",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect()
    }

    fn qr_payload() -> Vec<String> {
        payload(QR_IBAN, "QRR", "210000000003139471430009017")
    }

    #[test]
    fn decodes_qr_reference_bill() {
        let mut lines = qr_payload();
        lines.push("//S1/10/10201409/11/200701/20/140.000-53".to_owned());
        lines.push("Name AV1: UV;UltraPay005;12345".to_owned());
        let bill = QrBill::decode(&lines.join("\n")).unwrap();

        assert_eq!(bill.version, "0200");
        assert_eq!(bill.iban, QR_IBAN);
        assert_eq!(bill.creditor.name, "Robert Schneider AG");
        assert_eq!(bill.creditor.address_type, AddressType::Structured);
        assert_eq!(bill.creditor.town, "Biel");
        assert_eq!(bill.amount, Some(1949.75));
        assert_eq!(bill.currency, Currency::Chf);
        assert_eq!(
            bill.ultimate_debtor.as_ref().map(|d| d.name.as_str()),
            Some("Pia-Maria Rutschmann-Schnyder")
        );
        assert_eq!(
            bill.reference,
            Reference::Qr("210000000003139471430009017".to_owned())
        );
        assert_eq!(bill.message.as_deref(), Some("Order of 15 June 2020"));
        assert_eq!(
            bill.billing_information.as_deref(),
            Some("//S1/10/10201409/11/200701/20/140.000-53")
        );
        assert_eq!(bill.alternative_schemes, vec!["Name AV1: UV;UltraPay005;12345"]);
    }

    #[test]
    fn accepts_crlf_and_trailing_newline() {
        let raw = format!("{}\r\n", qr_payload().join("\r\n"));
        let bill = QrBill::decode(&raw).unwrap();
        assert_eq!(bill.creditor.country, "CH");
        assert!(bill.billing_information.is_none());
    }

    #[test]
    fn decodes_creditor_reference_and_no_reference() {
        let bill = QrBill::decode(&payload(IBAN, "SCOR", "RF18539007547034").join("\n")).unwrap();
        assert_eq!(bill.reference, Reference::Creditor("RF18539007547034".to_owned()));

        let mut lines = payload(IBAN, "NON", "");
        lines[18].clear();
        lines[20..27].iter_mut().for_each(String::clear);
        let bill = QrBill::decode(&lines.join("\n")).unwrap();
        assert_eq!(bill.reference, Reference::None);
        assert_eq!(bill.amount, None);
        assert_eq!(bill.ultimate_debtor, None);
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert_eq!(
            QrBill::decode("SPCmalformed"),
            Err(DecodeError::NotQrBill("SPCmalformed".to_owned()))
        );
        assert_eq!(QrBill::decode("SPC\n0200\n1"), Err(DecodeError::TooFewLines(3)));
    }

    #[test]
    fn checks_checksums() {
        let mut lines = qr_payload();
        lines[3] = "CH4431999123000889013".to_owned();
        assert!(matches!(
            QrBill::decode(&lines.join("\n")),
            Err(DecodeError::InvalidIban(_))
        ));

        let lines = payload(QR_IBAN, "QRR", "210000000003139471430009018");
        assert!(matches!(
            QrBill::decode(&lines.join("\n")),
            Err(DecodeError::InvalidReference { kind: "QR", .. })
        ));

        let lines = payload(IBAN, "SCOR", "RF19539007547034");
        assert!(matches!(
            QrBill::decode(&lines.join("\n")),
            Err(DecodeError::InvalidReference { .. })
        ));
    }

    #[test]
    fn qr_iban_requires_qr_reference() {
        let lines = payload(QR_IBAN, "NON", "");
        assert!(matches!(
            QrBill::decode(&lines.join("\n")),
            Err(DecodeError::InvalidReference { .. })
        ));
        let lines = payload(IBAN, "QRR", "210000000003139471430009017");
        assert!(matches!(
            QrBill::decode(&lines.join("\n")),
            Err(DecodeError::InvalidReference { .. })
        ));
    }

    #[test]
    fn rejects_bad_fields() {
        let mut lines = qr_payload();
        lines[19] = "USD".to_owned();
        assert_eq!(
            QrBill::decode(&lines.join("\n")),
            Err(DecodeError::InvalidCurrency("USD".to_owned()))
        );

        let mut lines = qr_payload();
        lines[18] = "12,50".to_owned();
        assert!(matches!(
            QrBill::decode(&lines.join("\n")),
            Err(DecodeError::InvalidAmount(_))
        ));

        let mut lines = qr_payload();
        lines[12] = "Someone Else".to_owned();
        assert_eq!(
            QrBill::decode(&lines.join("\n")),
            Err(DecodeError::UltimateCreditorNotEmpty)
        );

        let mut lines = qr_payload();
        lines[30] = "END".to_owned();
        assert_eq!(
            QrBill::decode(&lines.join("\n")),
            Err(DecodeError::MissingTrailer("END".to_owned()))
        );
    }

    #[test]
    fn serializes_reference_with_its_type() {
        let value = serde_json::to_value(Reference::Creditor("RF18539007547034".to_owned())).unwrap();
        assert_eq!(value, serde_json::json!({"type": "SCOR", "value": "RF18539007547034"}));
    }
}
