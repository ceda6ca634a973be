use regex::Regex;
use std::sync::OnceLock;

use crate::backend::DriverError;

const IGNORED_QUOTED: [&str; 2] = ["series", "public"];
const IGNORED_CAPTURES: [&str; 2] = ["of", "series"];

fn quoted_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"'([^']+)'").expect("valid quoted token regex"))
}

fn column_patterns() -> &'static [Regex; 3] {
    static RES: OnceLock<[Regex; 3]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(r#"column\s+"([^"]+)""#).expect("valid double-quoted column regex"),
            Regex::new(r"'([^']+)'\s+column").expect("valid quoted-before-column regex"),
            Regex::new(r"column\s+([A-Za-z0-9_.]+)\s+of").expect("valid bare column regex"),
        ]
    })
}

/// Best guess at which column a failed insert tripped over. Heuristic: it
/// reads driver error phrasing, so `None` means "leave the schema guess alone".
pub fn extract_missing_column(err: &DriverError) -> Option<String> {
    [&err.message, &err.details, &err.hint]
        .into_iter()
        .flatten()
        .find_map(|text| column_in(text))
        .map(|column| strip_qualifier(&column))
        .filter(|column| !column.is_empty())
}

fn column_in(text: &str) -> Option<String> {
    let quoted = quoted_token()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|token| token.as_str().trim())
        .find(|token| !token.is_empty() && !IGNORED_QUOTED.contains(token));
    if let Some(token) = quoted {
        return Some(token.to_string());
    }

    column_patterns().iter().find_map(|pattern| {
        let capture = pattern.captures(text)?.get(1)?.as_str().trim();
        if capture.is_empty() || IGNORED_CAPTURES.contains(&capture) {
            None
        } else {
            Some(capture.to_string())
        }
    })
}

fn strip_qualifier(column: &str) -> String {
    column
        .strip_prefix("series.")
        .unwrap_or(column)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(text: &str) -> DriverError {
        DriverError {
            message: Some(text.to_string()),
            ..DriverError::default()
        }
    }

    #[test]
    fn single_quoted_message() {
        assert_eq!(
            extract_missing_column(&message("column 'foo' does not exist")),
            Some("foo".to_string())
        );
    }

    #[test]
    fn schema_cache_details_skip_table_name() {
        let err = DriverError {
            details: Some(
                "Could not find the 'bar' column of 'series' in the schema cache".to_string(),
            ),
            ..DriverError::default()
        };
        assert_eq!(extract_missing_column(&err), Some("bar".to_string()));
    }

    #[test]
    fn postgres_undefined_column_phrasing() {
        let err = message("column \"owner_id\" of relation \"series\" does not exist");
        assert_eq!(extract_missing_column(&err), Some("owner_id".to_string()));
    }

    #[test]
    fn not_null_phrasing() {
        let err = message(
            "null value in column \"title\" of relation \"series\" violates not-null constraint",
        );
        assert_eq!(extract_missing_column(&err), Some("title".to_string()));
    }

    #[test]
    fn bare_column_with_qualifier() {
        let err = message("column series.creator_id of table does not exist");
        assert_eq!(extract_missing_column(&err), Some("creator_id".to_string()));
    }

    #[test]
    fn only_ignored_words_yield_nothing() {
        let err = message("relation 'public' has no entry for 'series'");
        assert_eq!(extract_missing_column(&err), None);
    }

    #[test]
    fn hint_is_scanned_last() {
        let err = DriverError {
            message: Some("insert failed".to_string()),
            details: None,
            hint: Some("Perhaps you meant the 'title_raw' column".to_string()),
            ..DriverError::default()
        };
        assert_eq!(extract_missing_column(&err), Some("title_raw".to_string()));
    }

    #[test]
    fn empty_error_is_unclassified() {
        assert_eq!(extract_missing_column(&DriverError::default()), None);
        assert_eq!(extract_missing_column(&message("something broke")), None);
    }
}
