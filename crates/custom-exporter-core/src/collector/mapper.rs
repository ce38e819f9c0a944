//! Row-to-sample mapping.
//!
//! Pure functions, no I/O. A row is a positional list of string fields: the
//! first `label_fields.len()` fields become label values, the last field is
//! always the numeric value, anything in between is dropped.

use crate::probe::DEFAULT_SEPARATOR;

/// Label values and numeric value extracted from one row.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRow {
    pub label_values: Vec<String>,
    pub value: f64,
}

/// Maps one row of fields onto the configured labels.
///
/// Returns `None` when the row cannot carry both every label and a value:
/// fewer than `label_fields.len() + 1` fields, or nothing but whitespace.
/// A value that does not parse as a float becomes `0.0`.
pub fn map_row<S: AsRef<str>>(fields: &[S], label_fields: &[String]) -> Option<MappedRow> {
    if fields.len() < label_fields.len() + 1 {
        return None;
    }
    if fields.iter().all(|f| f.as_ref().trim().is_empty()) {
        return None;
    }

    let label_values = fields[..label_fields.len()]
        .iter()
        .map(|f| f.as_ref().trim().to_string())
        .collect();
    let value = fields
        .last()
        .map(|f| parse_value(f.as_ref()))
        .unwrap_or_default();

    Some(MappedRow {
        label_values,
        value,
    })
}

/// Parses a numeric field, degrading to `0.0` on malformed input.
pub fn parse_value(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(0.0)
}

/// Splits one line of text output into fields.
///
/// Surrounding whitespace is removed first, then any leading or trailing
/// characters belonging to the separator, so a separator at a line boundary
/// never yields an empty first or last field. Inner empty fields keep their
/// position. An empty separator falls back to [`DEFAULT_SEPARATOR`].
pub fn split_line<'a>(line: &'a str, separator: &str) -> Vec<&'a str> {
    let sep = if separator.is_empty() {
        DEFAULT_SEPARATOR
    } else {
        separator
    };
    let line = line.trim().trim_matches(|c: char| sep.contains(c));
    if line.is_empty() {
        return Vec::new();
    }
    line.split(sep).collect()
}

/// Splits a whole text output into rows and maps each of them.
///
/// Lines that do not map (blank, too short) are skipped silently.
pub fn map_text(output: &str, separator: &str, label_fields: &[String]) -> Vec<MappedRow> {
    output
        .lines()
        .filter_map(|line| map_row(&split_line(line, separator), label_fields))
        .collect()
}
