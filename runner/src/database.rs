pub mod dataset;

pub use dataset::Dataset;

use std::{fmt, io, path::PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to access dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Row has {found} fields but the header of {path} has {expected}")]
    Arity {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
    #[error("Header of {path} is {found:?}, expected {expected:?}")]
    Header {
        path: PathBuf,
        expected: String,
        found: String,
    },
}

/// Column names of a dataset file, fixed for the lifetime of the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|column| column.to_string()).collect(),
        }
    }

    /// `<prefix>0` up to `<prefix>{count - 1}`
    pub fn numbered(prefix: &str, count: usize) -> Self {
        Self {
            columns: (0..count).map(|i| format!("{prefix}{i}")).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn header(&self) -> String {
        self.columns.join(",")
    }
}

/// One cell of a dataset row
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Text(String),
    Int(u64),
    /// rounded to `precision` decimals when written
    Float { value: f64, precision: u32 },
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float { value, precision } => {
                let factor = 10f64.powi(*precision as i32);

                write!(f, "{}", (value * factor).round() / factor)
            }
        }
    }
}

/// A comma separated record, built field by field in column order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(Vec<Field>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, value: impl fmt::Display) -> Self {
        self.0.push(Field::Text(value.to_string()));
        self
    }

    pub fn int(mut self, value: u64) -> Self {
        self.0.push(Field::Int(value));
        self
    }

    pub fn float(mut self, value: f64, precision: u32) -> Self {
        self.0.push(Field::Float { value, precision });
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<Field> for Row {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{field}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_are_rounded_per_column() {
        let row = Row::new()
            .text("CrkJoin")
            .int(4)
            .float(56.78123, 2)
            .float(20.123456, 4)
            .float(999.0, 2)
            .float(123.46, 1);

        assert_eq!(row.to_string(), "CrkJoin,4,56.78,20.1235,999,123.5");
        assert_eq!(row.len(), 6);
    }

    #[test]
    fn numbered_schema() {
        assert_eq!(Schema::numbered("p", 3).header(), "p0,p1,p2");
        assert_eq!(Schema::numbered("p", 256).len(), 256);
    }

    #[test]
    fn row_from_fields() {
        let row: Row = [3u64, 120, 4000].into_iter().map(Field::Int).collect();

        assert_eq!(row.to_string(), "3,120,4000");
    }
}
