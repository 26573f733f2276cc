//! Lenient date normalization.
//!
//! Every date that ends up in a document goes through [`normalize_date`],
//! which always returns a string in the canonical `Month DD, YYYY` form.
//! Unparseable input falls back to the processing date instead of failing,
//! so one malformed cell cannot abort a whole batch. Callers that need strict
//! validation should check values before they get here.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::clock::ProcessingStamp;

/// `chrono` format of the canonical display form, e.g. `January 05, 2024`.
pub const CANONICAL_FORMAT: &str = "%B %d, %Y";

/// A raw value that should become a date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DateInput<'a> {
    Missing,
    Instant(NaiveDateTime),
    Text(&'a str),
}

impl<'a> From<Option<&'a str>> for DateInput<'a> {
    fn from(value: Option<&'a str>) -> Self {
        match value {
            Some(text) => Self::Text(text),
            None => Self::Missing,
        }
    }
}

impl From<NaiveDateTime> for DateInput<'_> {
    fn from(value: NaiveDateTime) -> Self {
        Self::Instant(value)
    }
}

/// How a date was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateResolution {
    /// The input already was a date/time value.
    Native(NaiveDate),
    /// Text that parsed as a date.
    Parsed(NaiveDate),
    /// Missing, blank or unparseable input; holds the processing date.
    Defaulted(NaiveDate),
}

impl DateResolution {
    pub fn date(&self) -> NaiveDate {
        match *self {
            Self::Native(d) | Self::Parsed(d) | Self::Defaulted(d) => d,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Defaulted(_))
    }

    pub fn display(&self) -> String {
        format_canonical(self.date())
    }
}

/// Format a date in the canonical display form.
pub fn format_canonical(date: NaiveDate) -> String {
    date.format(CANONICAL_FORMAT).to_string()
}

/// Classify `input` without any side effects.
pub fn resolve_date(input: DateInput<'_>, stamp: &ProcessingStamp) -> DateResolution {
    match input {
        DateInput::Missing => DateResolution::Defaulted(stamp.today()),
        DateInput::Instant(instant) => DateResolution::Native(instant.date()),
        DateInput::Text(text) if text.trim().is_empty() => DateResolution::Defaulted(stamp.today()),
        DateInput::Text(text) => match parse_natural_date(text, stamp.today()) {
            Some(date) => DateResolution::Parsed(date),
            None => DateResolution::Defaulted(stamp.today()),
        },
    }
}

/// Canonical date string for `input`. Never fails.
pub fn normalize_date(input: DateInput<'_>, stamp: &ProcessingStamp) -> String {
    let resolution = resolve_date(input, stamp);
    if let (DateInput::Text(text), DateResolution::Defaulted(_)) = (input, resolution) {
        if !text.trim().is_empty() {
            debug!("Could not parse '{}' as date, using processing date", text);
        }
    }
    resolution.display()
}

// ---------------------------------------------------------------------------
// Best-effort parsing
// ---------------------------------------------------------------------------

static ORDINAL_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").expect("valid regex"));

static LEADING_WEEKDAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:mon|tue|wed|thu|fri|sat|sun)[a-z]*\.?,?\s+").expect("valid regex")
});

static TIME_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:\s*(?-i:T)\s*|\s+|\s*,\s*)(?:at\s+)?(?:\d{1,2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:\s*[ap]\.?m\.?)?|\d{1,2}\s*[ap]\.?m\.?)(?:\s*(?:z|utc|gmt|[+-]\d{2}:?\d{2}))?$",
    )
    .expect("valid regex")
});

static NUMERIC_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,4})\s*([-/.])\s*(\d{1,2})\s*([-/.])\s*(\d{1,4})$").expect("valid regex")
});

static COMPACT_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{8}$").expect("valid regex"));

static YEAR_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})\s*[-/.]\s*(\d{1,2})$").expect("valid regex"));

/// Month-name layouts, tried after commas and ordinals are stripped.
const NAMED_FORMATS: &[&str] = &[
    "%B %d %Y", // March 5 2024
    "%d %B %Y", // 5 March 2024
    "%Y %B %d", // 2024 March 5
    "%d-%B-%Y", // 05-Mar-2024
    "%Y-%B-%d", // 2024-Mar-05
    "%B-%d-%Y", // Mar-05-2024
];

/// Parse free-form text as a calendar date.
///
/// Times and zones are accepted and dropped; the date is taken as written.
/// A missing year or day is taken from `default` (`March 5` is March 5 of
/// the default year, `2024-03` is March 2024 on the default's day of month,
/// clamped to the month's length).
pub fn parse_natural_date(text: &str, default: NaiveDate) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.date_naive());
    }

    let cleaned = clean(trimmed);
    let date_part = TIME_SUFFIX.replace(&cleaned, "");
    let date_part = date_part.trim();

    parse_numeric(date_part)
        .or_else(|| parse_named(date_part))
        .or_else(|| parse_year_month(date_part, default.day()))
        .or_else(|| parse_month_day(date_part, default.year()))
}

/// Drop weekday prefixes, ordinal suffixes and commas; collapse whitespace.
fn clean(text: &str) -> String {
    let text = LEADING_WEEKDAY.replace(text, "");
    let text = ORDINAL_SUFFIX.replace_all(&text, "$1");
    let text = text.replace(',', " ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_numeric(text: &str) -> Option<NaiveDate> {
    if COMPACT_DATE.is_match(text) {
        let year: i32 = text[0..4].parse().ok()?;
        let month: u32 = text[4..6].parse().ok()?;
        let day: u32 = text[6..8].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    let caps = NUMERIC_DATE.captures(text)?;
    if caps[2] != caps[4] {
        return None;
    }
    let first = &caps[1];
    let second: u32 = caps[3].parse().ok()?;
    let third = &caps[5];

    if first.len() == 4 {
        // Year first: always Y-M-D.
        let year: i32 = first.parse().ok()?;
        let day: u32 = third.parse().ok()?;
        return NaiveDate::from_ymd_opt(year, second, day);
    }

    let first: u32 = first.parse().ok()?;
    let year = expand_year(third)?;
    NaiveDate::from_ymd_opt(year, first, second)
        .or_else(|| NaiveDate::from_ymd_opt(year, second, first))
}

/// Two-digit years pivot at 70, matching `%y`.
fn expand_year(text: &str) -> Option<i32> {
    let value: i32 = text.parse().ok()?;
    match text.len() {
        1 | 2 if value < 70 => Some(2000 + value),
        1 | 2 => Some(1900 + value),
        4 => Some(value),
        _ => None,
    }
}

// `%d` followed by `%Y` happily reads "March 2024" as March 20 of year 24,
// so anything without a four-digit year is rejected here.
fn parse_named(text: &str) -> Option<NaiveDate> {
    NAMED_FORMATS
        .iter()
        .find_map(|fmt| {
            NaiveDate::parse_from_str(text, fmt)
                .ok()
                .filter(|d| d.year() >= 1000)
        })
}

/// `March 2024`, `2024 March` or `2024-03`, on `day` of that month.
fn parse_year_month(text: &str, day: u32) -> Option<NaiveDate> {
    if let Some(caps) = YEAR_MONTH.captures(text) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        return clamped_date(year, month, day);
    }

    let padded = format!("{text} 1");
    let first = ["%B %Y %d", "%Y %B %d"].iter().find_map(|fmt| {
        NaiveDate::parse_from_str(&padded, fmt)
            .ok()
            .filter(|d| d.year() >= 1000)
    })?;
    clamped_date(first.year(), first.month(), day)
}

/// `March 5` or `5 March`, in `year`.
fn parse_month_day(text: &str, year: i32) -> Option<NaiveDate> {
    let padded = format!("{text} {year}");
    ["%B %d %Y", "%d %B %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&padded, fmt).ok())
}

/// `day` in the given month, pulled back to the month's last day if needed.
fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    (1..=day)
        .rev()
        .find_map(|d| NaiveDate::from_ymd_opt(year, month, d))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> ProcessingStamp {
        ProcessingStamp::at(
            NaiveDate::from_ymd_opt(2025, 6, 30)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        )
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn parse(text: &str) -> Option<NaiveDate> {
        parse_natural_date(text, stamp().today())
    }

    fn is_canonical(s: &str) -> bool {
        NaiveDate::parse_from_str(s, CANONICAL_FORMAT).is_ok()
            && s.split(' ').nth(1).is_some_and(|day| day.len() == 3)
    }

    #[test]
    fn test_format_canonical_zero_pads_day() {
        assert_eq!(format_canonical(ymd(2024, 1, 5)), "January 05, 2024");
        assert_eq!(format_canonical(ymd(2024, 12, 25)), "December 25, 2024");
    }

    #[test]
    fn test_normalize_never_fails_on_mixed_inputs() {
        let s = stamp();
        let instant = ymd(2023, 11, 2).and_hms_opt(8, 30, 0).unwrap();
        let outputs = [
            normalize_date(DateInput::Missing, &s),
            normalize_date(DateInput::Text(""), &s),
            normalize_date(DateInput::Text("not a date"), &s),
            normalize_date(DateInput::Instant(instant), &s),
            normalize_date(DateInput::Text("2024-03-05"), &s),
        ];
        for out in &outputs {
            assert!(is_canonical(out), "not canonical: {out}");
        }
        assert_eq!(outputs[0], "June 30, 2025");
        assert_eq!(outputs[1], "June 30, 2025");
        assert_eq!(outputs[2], "June 30, 2025");
        assert_eq!(outputs[3], "November 02, 2023");
        assert_eq!(outputs[4], "March 05, 2024");
    }

    #[test]
    fn test_resolution_distinguishes_parsed_from_defaulted() {
        let s = stamp();
        assert_eq!(
            resolve_date(DateInput::Text("2024-03-05"), &s),
            DateResolution::Parsed(ymd(2024, 3, 5))
        );
        let fallback = resolve_date(DateInput::Text("not a date"), &s);
        assert!(fallback.is_fallback());
        assert_eq!(fallback.date(), ymd(2025, 6, 30));
        assert!(resolve_date(DateInput::Text("   "), &s).is_fallback());
        assert!(resolve_date(DateInput::Missing, &s).is_fallback());
    }

    #[test]
    fn test_native_instant_is_not_fallback() {
        let instant = ymd(2020, 2, 29).and_hms_opt(23, 59, 59).unwrap();
        let r = resolve_date(instant.into(), &stamp());
        assert_eq!(r, DateResolution::Native(ymd(2020, 2, 29)));
        assert!(!r.is_fallback());
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(DateInput::from(None), DateInput::Missing);
        assert_eq!(DateInput::from(Some("x")), DateInput::Text("x"));
    }

    #[test]
    fn test_parse_iso_forms() {
        assert_eq!(parse("2024-03-05"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse("2024/03/05"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse("2024-03-05T14:30:00"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse("2024-03-05 14:30"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse("2024-03-05T23:30:00+05:00"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse("20240305"), Some(ymd(2024, 3, 5)));
    }

    #[test]
    fn test_parse_numeric_is_month_first() {
        assert_eq!(parse("03/05/2024"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse("3/5/24"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse("12-31-99"), Some(ymd(1999, 12, 31)));
        assert_eq!(parse("03.05.2024"), Some(ymd(2024, 3, 5)));
    }

    #[test]
    fn test_parse_numeric_falls_back_to_day_first() {
        assert_eq!(parse("25/12/2024"), Some(ymd(2024, 12, 25)));
        assert_eq!(parse("31.01.2024"), Some(ymd(2024, 1, 31)));
    }

    #[test]
    fn test_parse_numeric_rejects_mixed_separators() {
        assert_eq!(parse("03/05-2024"), None);
    }

    #[test]
    fn test_parse_month_names() {
        assert_eq!(parse("March 5, 2024"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse("March 5th, 2024"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse("5 March 2024"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse("Mar 5 2024"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse("05-Mar-2024"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse("Tuesday, March 5, 2024"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse("January 05, 2024"), Some(ymd(2024, 1, 5)));
    }

    #[test]
    fn test_parse_rfc2822() {
        assert_eq!(
            parse("Tue, 5 Mar 2024 10:00:00 +0000"),
            Some(ymd(2024, 3, 5))
        );
    }

    #[test]
    fn test_parse_month_name_with_time() {
        assert_eq!(parse("March 5, 2024 10:15 AM"), Some(ymd(2024, 3, 5)));
    }

    #[test]
    fn test_parse_month_year_takes_day_from_default() {
        // default is June 30, 2025
        assert_eq!(parse("March 2024"), Some(ymd(2024, 3, 30)));
        assert_eq!(parse("2024 March"), Some(ymd(2024, 3, 30)));
        assert_eq!(parse("February 2024"), Some(ymd(2024, 2, 29)));
        assert_eq!(parse("February 2023"), Some(ymd(2023, 2, 28)));
    }

    #[test]
    fn test_parse_iso_year_month() {
        assert_eq!(parse("2024-03"), Some(ymd(2024, 3, 30)));
        assert_eq!(parse("2024/04"), Some(ymd(2024, 4, 30)));
        assert_eq!(parse("2024-13"), None);
        let first = parse_natural_date("2024-03", ymd(2025, 1, 1));
        assert_eq!(first, Some(ymd(2024, 3, 1)));
    }

    #[test]
    fn test_parse_month_day_takes_year_from_default() {
        assert_eq!(parse("March 5"), Some(ymd(2025, 3, 5)));
        assert_eq!(parse("5 March"), Some(ymd(2025, 3, 5)));
        assert_eq!(parse("Mar 5th"), Some(ymd(2025, 3, 5)));
        assert_eq!(parse("Wednesday, March 5"), Some(ymd(2025, 3, 5)));
        assert_eq!(parse("February 29"), None);
    }

    #[test]
    fn test_parse_hour_only_meridiem_time() {
        assert_eq!(parse("March 5, 2024 3pm"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse("March 5, 2024 at 11 a.m."), Some(ymd(2024, 3, 5)));
        assert_eq!(parse("2024-03-05 9 PM"), Some(ymd(2024, 3, 5)));
    }

    #[test]
    fn test_partial_dates_resolve_as_parsed() {
        let s = stamp();
        assert_eq!(
            resolve_date(DateInput::Text("March 5"), &s),
            DateResolution::Parsed(ymd(2025, 3, 5))
        );
        assert_eq!(normalize_date(DateInput::Text("2024-03"), &s), "March 30, 2024");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse("not a date"), None);
        assert_eq!(parse("13/32/2024"), None);
        assert_eq!(parse("February 30, 2024"), None);
        assert_eq!(parse(""), None);
    }
}
