//! JSON reply documents.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::KvError;
use crate::collector::mapper::{MappedRow, parse_value};

/// A flattened JSON object: every top-level value as text.
pub type Document = BTreeMap<String, String>;

/// Parses a reply holding a JSON object.
pub fn parse_document(raw: &str) -> Result<Document, serde_json::Error> {
    let object: Map<String, Value> = serde_json::from_str(raw)?;
    Ok(flatten(&object))
}

/// Numbers keep their textual form, booleans become `true`/`false`, strings
/// are kept, anything else (null, arrays, objects) becomes empty.
pub fn flatten(object: &Map<String, Value>) -> Document {
    object
        .iter()
        .map(|(key, value)| {
            let text = match value {
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::String(s) => s.clone(),
                Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
            };
            (key.clone(), text)
        })
        .collect()
}

/// Maps a document to one row: labels by key (missing keys are empty), value
/// under `value_field`.
pub fn map_document(
    doc: &Document,
    label_fields: &[String],
    value_field: &str,
) -> Result<MappedRow, KvError> {
    let raw = doc
        .get(value_field)
        .ok_or_else(|| KvError::MissingValue(value_field.to_string()))?;
    let label_values = label_fields
        .iter()
        .map(|name| doc.get(name).cloned().unwrap_or_default())
        .collect();
    Ok(MappedRow {
        label_values,
        value: parse_value(raw),
    })
}
