//! Finding dates in page text.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::{Captures, Regex};
use thiserror::Error;

/// Something that looked like a date, but wasn't one.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{text:?} is not a valid date")]
pub struct DateParseError {
    pub text: String,
}

/// Finds dates in text.
pub trait DateFinder: Send + Sync + 'static {
    /// Return every date in `text`, in the order they appear, along with
    /// anything that looked like a date but couldn't be parsed. The errors
    /// are informational.
    fn find_dates(&self, text: &str) -> (Vec<NaiveDate>, Vec<DateParseError>);
}

/// Matches the date formats we see on Swiss paperwork.
///
/// Each alternative uses its own group names, because the `regex` crate
/// doesn't allow duplicates.
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let months = MONTHS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(
        r"(?xi)
        \b(?P<d1>\d{{1,2}})[./](?P<m1>\d{{1,2}})[./](?P<y1>\d{{4}}|\d{{2}})\b
        | \b(?P<y2>\d{{4}})-(?P<m2>\d{{2}})-(?P<d2>\d{{2}})\b
        | \b(?P<d3>\d{{1,2}})\.?\s+(?P<name>{months})\s+(?P<y3>\d{{4}})\b
        "
    ))
    .expect("failed to compile regex")
});

/// Month names in German, French, Italian and English. Longer names come
/// before their prefixes.
const MONTHS: &[(&str, u32)] = &[
    ("january", 1),
    ("januar", 1),
    ("jänner", 1),
    ("janvier", 1),
    ("gennaio", 1),
    ("february", 2),
    ("februar", 2),
    ("février", 2),
    ("fevrier", 2),
    ("febbraio", 2),
    ("märz", 3),
    ("maerz", 3),
    ("mars", 3),
    ("marzo", 3),
    ("march", 3),
    ("aprile", 4),
    ("april", 4),
    ("avril", 4),
    ("maggio", 5),
    ("mai", 5),
    ("may", 5),
    ("juni", 6),
    ("juin", 6),
    ("giugno", 6),
    ("june", 6),
    ("juillet", 7),
    ("juli", 7),
    ("luglio", 7),
    ("july", 7),
    ("august", 8),
    ("août", 8),
    ("aout", 8),
    ("agosto", 8),
    ("september", 9),
    ("septembre", 9),
    ("settembre", 9),
    ("oktober", 10),
    ("octobre", 10),
    ("ottobre", 10),
    ("october", 10),
    ("november", 11),
    ("novembre", 11),
    ("dezember", 12),
    ("décembre", 12),
    ("decembre", 12),
    ("dicembre", 12),
    ("december", 12),
];

/// The built-in [`DateFinder`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RegexDateFinder;

impl DateFinder for RegexDateFinder {
    fn find_dates(&self, text: &str) -> (Vec<NaiveDate>, Vec<DateParseError>) {
        let mut dates = vec![];
        let mut errors = vec![];
        for caps in DATE_RE.captures_iter(text) {
            match date_from_captures(&caps) {
                Some(date) => dates.push(date),
                None => errors.push(DateParseError {
                    text: caps[0].to_owned(),
                }),
            }
        }
        (dates, errors)
    }
}

fn date_from_captures(caps: &Captures<'_>) -> Option<NaiveDate> {
    let number = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<u32>().ok());

    let (year, month, day) = if let Some(year) = caps.name("y1") {
        let year = match year.as_str().parse::<i32>().ok()? {
            // Two-digit years, the way `strptime` reads them.
            y @ 0..=68 if year.len() == 2 => 2000 + y,
            y if year.len() == 2 => 1900 + y,
            y => y,
        };
        (year, number("m1")?, number("d1")?)
    } else if caps.name("y2").is_some() {
        (number("y2")? as i32, number("m2")?, number("d2")?)
    } else {
        let name = caps.name("name")?.as_str().to_lowercase();
        let month = MONTHS
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, month)| *month)?;
        (number("y3")? as i32, month, number("d3")?)
    };
    NaiveDate::from_ymd_opt(year, month, day)
}
