//! Key scheme for objects written by pipeline stages.
//!
//! Keys look like `{YYYY}/{MM}/{DD}/{runId}/{category}/{filename}`. The date
//! partition is the UTC calendar date the object was written. The filename
//! may itself contain `/`.

use super::Category;
use crate::errors::StateError;
use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

/// Minimum number of `/`-separated segments in a well-formed key.
const KEY_SEGMENTS: usize = 6;

fn date_prefix() -> &'static Regex {
    static DATE_PREFIX: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    DATE_PREFIX.get_or_init(|| {
        Regex::new(r"^(\d{4})/(\d{2})/(\d{2})(/|$)").expect("date prefix pattern is valid")
    })
}

fn year_segment() -> &'static Regex {
    static YEAR: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    YEAR.get_or_init(|| Regex::new(r"^\d{4}$").expect("year pattern is valid"))
}

/// The components recovered from a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedKey {
    /// Pipeline run identifier.
    pub run_id: String,
    /// Artifact category.
    pub category: Category,
    /// Artifact filename, possibly containing `/`.
    pub filename: String,
    /// Date partition the object was written under.
    pub date: NaiveDate,
}

impl ParsedKey {
    /// Returns the identity triple `(run_id, category, filename)`.
    #[must_use]
    pub fn identity(&self) -> (&str, Category, &str) {
        (&self.run_id, self.category, &self.filename)
    }
}

/// Generates the storage key for an artifact.
#[must_use]
pub fn generate_key(run_id: &str, category: Category, filename: &str, date: NaiveDate) -> String {
    format!("{}/{run_id}/{category}/{filename}", date_partition(date))
}

/// Formats the `YYYY/MM/DD` partition for a date.
#[must_use]
pub fn date_partition(date: NaiveDate) -> String {
    date.format("%Y/%m/%d").to_string()
}

/// Returns true if the path starts with a `YYYY/MM/DD` partition.
#[must_use]
pub fn is_date_path(path: &str) -> bool {
    date_prefix().is_match(path)
}

/// Parses a key back into its components.
///
/// Fails with [`StateError::MalformedKey`] when the path has too few
/// segments or the date partition is not a valid `YYYY/MM/DD`, and with
/// [`StateError::Category`] when the category segment is unknown.
pub fn parse_key(path: &str) -> Result<ParsedKey, StateError> {
    let segments: Vec<&str> = path.split('/').collect();

    if segments.len() < 4 {
        return Err(StateError::malformed_key(
            path,
            format!("expected at least 4 segments, found {}", segments.len()),
        ));
    }
    if !year_segment().is_match(segments[0]) {
        return Err(StateError::malformed_key(
            path,
            format!("date segment '{}' is not a 4-digit year", segments[0]),
        ));
    }
    if segments.len() < KEY_SEGMENTS {
        return Err(StateError::malformed_key(
            path,
            "expected {YYYY}/{MM}/{DD}/{runId}/{category}/{filename}",
        ));
    }

    let captures = date_prefix()
        .captures(path)
        .ok_or_else(|| StateError::malformed_key(path, "date partition must be YYYY/MM/DD"))?;
    let date = parse_date(&captures[1], &captures[2], &captures[3])
        .ok_or_else(|| StateError::malformed_key(path, "date partition is not a calendar date"))?;

    let run_id = segments[3];
    if run_id.is_empty() {
        return Err(StateError::malformed_key(path, "run id segment is empty"));
    }

    let category = segments[4].parse::<Category>().map_err(|_| {
        StateError::category("parse_key", format!("invalid category in key: {}", segments[4]))
    })?;

    let filename = segments[5..].join("/");
    if filename.is_empty() {
        return Err(StateError::malformed_key(path, "filename segment is empty"));
    }

    Ok(ParsedKey {
        run_id: run_id.to_string(),
        category,
        filename,
        date,
    })
}

/// Checks that a key follows the expected structure.
pub fn validate_key(path: &str) -> Result<(), StateError> {
    parse_key(path).map(|_| ())
}

fn parse_date(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_generate_key() {
        let key = generate_key("run-001", Category::Processing, "metadata.json", date(2025, 6, 1));
        assert_eq!(key, "2025/06/01/run-001/processing/metadata.json");
    }

    #[test]
    fn test_round_trip_all_categories() {
        let filenames = ["metadata.json", "turn1-prompt.json", "nested/dir/file.bin"];
        let dates = [date(2025, 6, 1), date(1999, 12, 31), date(2024, 2, 29)];

        for category in Category::all() {
            for filename in filenames {
                for day in dates {
                    let key = generate_key("verif-abc", category, filename, day);
                    let parsed = parse_key(&key).unwrap();
                    assert_eq!(parsed.identity(), ("verif-abc", category, filename));
                    assert_eq!(parsed.date, day);
                }
            }
        }
    }

    #[test]
    fn test_parse_rejects_short_path() {
        let err = parse_key("run-001/processing/metadata.json").unwrap_err();
        assert!(matches!(err, StateError::MalformedKey { .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_parse_rejects_non_year_date_segment() {
        let err = parse_key("run-001/06/01/x/processing/metadata.json").unwrap_err();
        assert!(matches!(err, StateError::MalformedKey { ref reason, .. } if reason.contains("4-digit year")));

        let err = parse_key("25/06/01/x/processing/metadata.json").unwrap_err();
        assert!(matches!(err, StateError::MalformedKey { .. }));
    }

    #[test]
    fn test_parse_rejects_missing_filename() {
        assert!(parse_key("2025/06/01/run-001/processing").is_err());
        assert!(parse_key("2025/06/01/run-001/processing/").is_err());
    }

    #[test]
    fn test_parse_rejects_invalid_calendar_date() {
        let err = parse_key("2025/02/30/run-001/processing/a.json").unwrap_err();
        assert!(matches!(err, StateError::MalformedKey { .. }));
    }

    #[test]
    fn test_parse_rejects_unknown_category() {
        let err = parse_key("2025/06/01/run-001/audio/a.json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Category);
    }

    #[test]
    fn test_is_date_path() {
        assert!(is_date_path("2025/05/20/verif-1/images/metadata.json"));
        assert!(is_date_path("2025/05/20"));
        assert!(!is_date_path("verif-1/images/metadata.json"));
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("2025/06/01/run-001/prompts/system-prompt.json").is_ok());
        assert!(validate_key("prompts/system-prompt.json").is_err());
    }
}
