//! Core data types shared by the source, store and reconciler

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One raw row as returned by the spreadsheet, cell by cell
pub type Row = Vec<Value>;

/// A single person row as persisted in `person_data`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    pub age: i32,
    pub year_of_birth: i32,
}

impl Record {
    pub fn new(name: impl Into<String>, age: i32, year_of_birth: i32) -> Self {
        Self {
            name: name.into(),
            age,
            year_of_birth,
        }
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.name, self.age, self.year_of_birth)
    }
}

/// Error when a fetched row cannot be turned into a [`Record`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Row has fewer cells than the three required columns
    MissingCells { found: usize },
    /// Name cell is empty or not a scalar
    InvalidName { value: String },
    /// Numeric column does not hold an integer
    InvalidInteger { column: &'static str, value: String },
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::MissingCells { found } => {
                write!(f, "row has {} cells, expected at least 3", found)
            }
            RecordError::InvalidName { value } => write!(f, "invalid name cell: {}", value),
            RecordError::InvalidInteger { column, value } => {
                write!(f, "column '{}' is not an integer: {}", column, value)
            }
        }
    }
}

impl std::error::Error for RecordError {}

impl TryFrom<&[Value]> for Record {
    type Error = RecordError;

    fn try_from(row: &[Value]) -> Result<Self, Self::Error> {
        if row.len() < 3 {
            return Err(RecordError::MissingCells { found: row.len() });
        }

        let name = match &row[0] {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => {
                return Err(RecordError::InvalidName {
                    value: other.to_string(),
                });
            }
        };
        if name.trim().is_empty() {
            return Err(RecordError::InvalidName {
                value: row[0].to_string(),
            });
        }

        Ok(Record {
            name,
            age: parse_int_cell(&row[1], "age")?,
            year_of_birth: parse_int_cell(&row[2], "yob")?,
        })
    }
}

/// Parse a cell as `i32`, accepting JSON integers, whole floats and numeric strings
fn parse_int_cell(cell: &Value, column: &'static str) -> Result<i32, RecordError> {
    let invalid = || RecordError::InvalidInteger {
        column,
        value: cell.to_string(),
    };

    match cell {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i32::try_from(i).map_err(|_| invalid())
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f >= i32::MIN as f64 && f <= i32::MAX as f64 {
                    Ok(f as i32)
                } else {
                    Err(invalid())
                }
            } else {
                Err(invalid())
            }
        }
        Value::String(s) => s.trim().parse::<i32>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

/// The data rows of one fetch, header already removed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    rows: Vec<Row>,
}

impl Snapshot {
    /// Build a snapshot from a raw fetch. The first row is always a header
    /// and is dropped whatever it contains.
    pub fn from_fetched(mut fetched: Vec<Row>) -> Self {
        if !fetched.is_empty() {
            fetched.remove(0);
        }
        Self { rows: fetched }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
