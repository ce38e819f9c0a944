//! Result-set column binding and row scanning.

use crate::collector::mapper::MappedRow;

/// Rows of the last query of a probe, as text.
///
/// `None` cells are SQL `NULL`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// What a column feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// Label at this position of `label_fields`.
    Label(usize),
    /// Read and dropped.
    Unmapped,
    /// The numeric sample value.
    Value,
}

/// Column roles of one result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    roles: Vec<ColumnRole>,
    label_count: usize,
}

impl ColumnBinding {
    /// Binds columns by exact name; the highest-ordinal column is always the value.
    pub fn bind(columns: &[String], label_fields: &[String]) -> Self {
        let last = columns.len().saturating_sub(1);
        let roles = columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                if i == last {
                    ColumnRole::Value
                } else {
                    label_fields
                        .iter()
                        .position(|l| l == name)
                        .map_or(ColumnRole::Unmapped, ColumnRole::Label)
                }
            })
            .collect();
        Self {
            roles,
            label_count: label_fields.len(),
        }
    }

    pub fn roles(&self) -> &[ColumnRole] {
        &self.roles
    }

    /// Maps one row. Labels with no matching column stay empty.
    pub fn scan(&self, row: &[Option<String>]) -> Result<MappedRow, ScanError> {
        let mut label_values = vec![String::new(); self.label_count];
        let mut value = None;

        for (i, role) in self.roles.iter().enumerate() {
            let cell = row.get(i).and_then(|c| c.as_deref());
            match role {
                ColumnRole::Label(pos) => {
                    label_values[*pos] = cell.unwrap_or_default().trim().to_string();
                }
                ColumnRole::Unmapped => {}
                ColumnRole::Value => {
                    let raw = cell.ok_or(ScanError::NullValue { column: i })?;
                    let parsed = raw
                        .trim()
                        .parse::<f64>()
                        .map_err(|_| ScanError::NotNumeric {
                            column: i,
                            raw: raw.to_string(),
                        })?;
                    value = Some(parsed);
                }
            }
        }

        let value = value.ok_or(ScanError::NoColumns)?;
        Ok(MappedRow {
            label_values,
            value,
        })
    }
}

/// A row whose value cell could not be read as a float.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScanError {
    #[error("value column {column} is NULL")]
    NullValue { column: usize },
    #[error("value column {column} is not numeric: '{raw}'")]
    NotNumeric { column: usize, raw: String },
    #[error("result set has no columns")]
    NoColumns,
}

/// Scans every row, keeping the good ones and the 1-based row number of each failure.
pub fn scan_rows(set: &ResultSet, label_fields: &[String]) -> (Vec<MappedRow>, Vec<(usize, ScanError)>) {
    let binding = ColumnBinding::bind(&set.columns, label_fields);
    let mut mapped = Vec::with_capacity(set.rows.len());
    let mut errors = Vec::new();
    for (i, row) in set.rows.iter().enumerate() {
        match binding.scan(row) {
            Ok(m) => mapped.push(m),
            Err(e) => errors.push((i + 1, e)),
        }
    }
    (mapped, errors)
}
