//! Post-processing of recognized text

use once_cell::sync::Lazy;
use regex::Regex;

// "exam-\nple" -> "example"; only when the continuation starts lowercase
static HYPHEN_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\p{L})-[ \t]*\r?\n[ \t]*(\p{Ll})").expect("Invalid hyphen break regex")
});

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

/// Normalize OCR output into a single line of text
///
/// Rejoins words hyphenated across line breaks, then collapses every run of
/// whitespace (including newlines) into one space.
#[must_use]
pub fn normalize_text(raw: &str) -> String {
    let rejoined = HYPHEN_BREAK.replace_all(raw, "$1$2");
    WHITESPACE_RUN.replace_all(&rejoined, " ").trim().to_string()
}

/// Flatten table rows into text: cells separated by tabs, rows by newlines
#[must_use]
pub fn join_table_rows(rows: &[Vec<String>]) -> String {
    rows.iter()
        .map(|row| row.join("\t"))
        .collect::<Vec<_>>()
        .join("\n")
}
