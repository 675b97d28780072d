use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::snapshot::UploadDate;

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w{3} \d{1,2}, \d{4}\b").unwrap());

/// Find a `Mon D, YYYY` date anywhere in the text.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let found = DATE_RE.find(text.trim())?;
    NaiveDate::parse_from_str(found.as_str(), "%b %d, %Y").ok()
}

/// Decompose an upload-date cell into the stored shape. The raw text is
/// kept verbatim (trimmed); components are null when no date is found.
pub fn upload_date(text: &str) -> UploadDate {
    let parsed = parse_date(text);
    UploadDate {
        default: text.trim().to_string(),
        parsed: parsed.map(|d| d.format("%Y-%m-%d").to_string()),
        year: parsed.map(|d| d.year()),
        month: parsed.map(|d| d.month()),
        day: parsed.map(|d| d.day()),
    }
}
