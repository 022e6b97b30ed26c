//! Date-journal identifier detection.
//!
//! Daily-note pages carry a calendar token as their identifier
//! (`MM-DD-YYYY`, one or two digits for month and day). They are excluded
//! from reconciliation. The check is purely syntactic: `13-40-2024` still
//! counts as a journal identifier.

use once_cell::sync::OnceCell;
use regex::Regex;

/// Anchored at both ends. `\d` is Unicode-aware, so any decimal digit counts.
const DATE_JOURNAL_PATTERN: &str = r"^\d{1,2}-\d{1,2}-\d{4}$";

/// Returns `true` if `key` is a date-journal identifier and must be skipped.
pub fn is_date_journal(key: &str) -> bool {
    static DATE_JOURNAL: OnceCell<Result<Regex, String>> = OnceCell::new();
    let regex = DATE_JOURNAL
        .get_or_init(|| Regex::new(DATE_JOURNAL_PATTERN).map_err(|err| err.to_string()));
    match regex {
        Ok(re) => re.is_match(key),
        Err(msg) => {
            tracing::error!(error = %msg, "date-journal regex init failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_identifiers_are_filtered() {
        assert!(is_date_journal("03-14-2024"));
        assert!(is_date_journal("3-4-2024"));
        assert!(is_date_journal("01-02-2023"));
    }

    #[test]
    fn no_calendar_validation() {
        assert!(is_date_journal("13-40-2024"));
        assert!(is_date_journal("00-00-0000"));
    }

    #[test]
    fn content_identifiers_pass() {
        assert!(!is_date_journal("my-project"));
        assert!(!is_date_journal("3-4-24"));
        assert!(!is_date_journal("123-4-2024"));
        assert!(!is_date_journal("03-14-20245"));
        assert!(!is_date_journal("03/14/2024"));
        assert!(!is_date_journal(""));
    }

    #[test]
    fn no_partial_matches() {
        assert!(!is_date_journal("x03-14-2024"));
        assert!(!is_date_journal("03-14-2024x"));
        assert!(!is_date_journal("03-14-2024\n"));
        assert!(!is_date_journal(" 03-14-2024"));
    }

    #[test]
    fn unicode_decimal_digits_are_filtered() {
        assert!(is_date_journal("٠٣-١٤-٢٠٢٤"));
        assert!(is_date_journal("３-４-２０２４"));
        assert!(!is_date_journal("٠٣-١٤-٢٠"));
    }
}
