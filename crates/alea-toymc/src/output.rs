//! Result tables and the result file.
//!
//! A result file is one JSON document holding file-level metadata and one table per
//! hypothesis. Cells that are not finite are stored as `null` (NaN) or the strings
//! `"inf"` / `"-inf"` so that they survive the round trip.

use alea_core::{write_atomic, Error, Result, ValueMap};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;

/// Columns appended after the fitted parameters
pub const FIXED_COLUMNS: [&str; 3] = ["ll", "dl", "ul"];

/// Column schema: sorted fittable parameters followed by `ll`, `dl`, `ul`.
pub fn result_columns(fittable: &[String]) -> Vec<String> {
    let mut columns = fittable.to_vec();
    columns.sort();
    columns.extend(FIXED_COLUMNS.iter().map(|c| c.to_string()));
    columns
}

/// Outcome of one fit under one hypothesis.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    /// Fitted value of every fittable parameter
    pub values: ValueMap,
    /// Maximum log-likelihood
    pub ll: f64,
    /// Lower confidence bound (NaN if not computed)
    pub dl: f64,
    /// Upper confidence bound (NaN if not computed)
    pub ul: f64,
}

impl ResultRecord {
    /// Value of a column
    pub fn get(&self, column: &str) -> Option<f64> {
        match column {
            "ll" => Some(self.ll),
            "dl" => Some(self.dl),
            "ul" => Some(self.ul),
            name => self.values.get(name).copied(),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Cell {
    Number(f64),
    Tag(Option<String>),
}

impl Cell {
    fn from_f64(v: f64) -> Self {
        if v.is_nan() {
            Cell::Tag(None)
        } else if v == f64::INFINITY {
            Cell::Tag(Some("inf".to_string()))
        } else if v == f64::NEG_INFINITY {
            Cell::Tag(Some("-inf".to_string()))
        } else {
            Cell::Number(v)
        }
    }

    fn into_f64(self) -> std::result::Result<f64, String> {
        match self {
            Cell::Number(v) => Ok(v),
            Cell::Tag(None) => Ok(f64::NAN),
            Cell::Tag(Some(tag)) => match tag.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "nan" => Ok(f64::NAN),
                other => Err(format!("invalid result cell '{}'", other)),
            },
        }
    }
}

fn serialize_rows<S: Serializer>(
    rows: &[Vec<f64>],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let cells: Vec<Vec<Cell>> =
        rows.iter().map(|row| row.iter().map(|&v| Cell::from_f64(v)).collect()).collect();
    cells.serialize(serializer)
}

fn deserialize_rows<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<Vec<f64>>, D::Error> {
    let cells = Vec::<Vec<Cell>>::deserialize(deserializer)?;
    cells
        .into_iter()
        .map(|row| row.into_iter().map(Cell::into_f64).collect())
        .collect::<std::result::Result<_, _>>()
        .map_err(serde::de::Error::custom)
}

/// Results of one hypothesis: one row per Monte Carlo repetition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    /// Table name (`free`, `null`, `true` or the hypothesis position)
    pub name: String,
    /// Resolved values fixed by the hypothesis
    pub hypotheses_values: ValueMap,
    /// Column names
    pub columns: Vec<String>,
    /// Rows in Monte Carlo order
    #[serde(serialize_with = "serialize_rows", deserialize_with = "deserialize_rows")]
    pub rows: Vec<Vec<f64>>,
}

impl ResultTable {
    /// Table of `n_rows` rows filled with NaN
    pub fn new(
        name: impl Into<String>,
        hypotheses_values: ValueMap,
        columns: Vec<String>,
        n_rows: usize,
    ) -> Self {
        let rows = vec![vec![f64::NAN; columns.len()]; n_rows];
        Self { name: name.into(), hypotheses_values, columns, rows }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fill row `index` from a record; every column must be present in it.
    pub fn set_row(&mut self, index: usize, record: &ResultRecord) -> Result<()> {
        let n_rows = self.rows.len();
        let row = self.rows.get_mut(index).ok_or_else(|| {
            Error::Validation(format!("row {} out of range for {} rows", index, n_rows))
        })?;
        for (cell, column) in row.iter_mut().zip(&self.columns) {
            *cell = record.get(column).ok_or_else(|| {
                Error::Validation(format!(
                    "result record misses column '{}', has {:?}",
                    column,
                    record.values.keys().collect::<Vec<_>>()
                ))
            })?;
        }
        Ok(())
    }

    /// All values of one column
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let j = self.columns.iter().position(|c| c == name)?;
        self.rows.iter().map(|row| row.get(j).copied()).collect()
    }

    /// One cell
    pub fn value(&self, row: usize, column: &str) -> Option<f64> {
        let j = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(j).copied()
    }

    /// Every row has one cell per column.
    pub fn validate(&self) -> Result<()> {
        match self.rows.iter().position(|row| row.len() != self.columns.len()) {
            Some(i) => Err(Error::Validation(format!(
                "table '{}' row {} has {} cells, expected one per column {:?}",
                self.name,
                i,
                self.rows[i].len(),
                self.columns
            ))),
            None => Ok(()),
        }
    }
}

/// One runner's output: file-level metadata and the hypothesis tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultFile {
    /// User metadata plus `date`, `poi`, `common_hypothesis`, `generate_values`, `seed`
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Tables in hypothesis order
    pub tables: Vec<ResultTable>,
}

impl ResultFile {
    /// Table by name
    pub fn table(&self, name: &str) -> Option<&ResultTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Table names in order
    pub fn names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    /// Write all-or-nothing.
    pub fn write(&self, path: &Path) -> Result<()> {
        write_atomic(path, &serde_json::to_vec_pretty(self)?)?;
        log::info!("Saving {}", path.display());
        Ok(())
    }

    /// Read a result file.
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read result file {}: {}", path.display(), e),
            ))
        })?;
        let file: Self = serde_json::from_slice(&bytes)?;
        for table in &file.tables {
            table.validate()?;
        }
        Ok(file)
    }
}
