//! Typed view of an observations CSV file.
//!
//! Column names come from the header row. Each column gets a single
//! [`ColumnKind`], inferred from its non-empty cells: integer if every value
//! parses as `i64`, float if every value parses as `f64`, boolean if every
//! value is `true`/`false`, text otherwise. Empty cells become
//! [`Cell::Missing`] and do not influence inference. Columns holding names
//! rather than values (such as image file names) can be pinned to text.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::LabError;

/// Inferred type of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Boolean,
    Text,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Float => "float",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Text => "text",
        };
        f.write_str(name)
    }
}

/// A column header with its inferred kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// A single typed value.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
    Missing,
}

impl Cell {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Numeric value, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Integer(value) => Some(*value as f64),
            Cell::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Cell::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Integer(value) => write!(f, "{value}"),
            Cell::Float(value) => write!(f, "{value}"),
            Cell::Boolean(value) => write!(f, "{value}"),
            Cell::Text(value) => f.write_str(value),
            Cell::Missing => Ok(()),
        }
    }
}

/// Row-oriented observations table.
#[derive(Clone, Debug, PartialEq)]
pub struct Observations {
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
}

impl Observations {
    /// Read and type the CSV file at `path`.
    pub fn read_csv(path: &Path) -> Result<Self, LabError> {
        Self::read_csv_with_text_columns(path, &[])
    }

    /// Like [`read_csv`](Self::read_csv), but the columns named in
    /// `text_columns` skip inference and keep their values verbatim.
    pub fn read_csv_with_text_columns(
        path: &Path,
        text_columns: &[&str],
    ) -> Result<Self, LabError> {
        let file = File::open(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                LabError::MissingResource {
                    what: "observations file",
                    path: path.to_path_buf(),
                }
            } else {
                LabError::Io(source)
            }
        })?;
        Self::from_reader(BufReader::new(file), path, text_columns)
    }

    /// Parse CSV from raw bytes.
    ///
    /// Useful for fuzzing and tests without file I/O.
    pub fn from_csv_slice(bytes: &[u8]) -> Result<Self, LabError> {
        Self::from_reader(bytes, Path::new("<bytes>"), &[])
    }

    fn from_reader<R: Read>(
        reader: R,
        path: &Path,
        text_columns: &[&str],
    ) -> Result<Self, LabError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let parse_error = |source| LabError::ObservationsParse {
            path: path.to_path_buf(),
            source,
        };

        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(parse_error)?
            .iter()
            .map(str::to_string)
            .collect();

        let mut raw_rows = Vec::new();
        for result in csv_reader.records() {
            let record = result.map_err(parse_error)?;
            raw_rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        let kinds: Vec<ColumnKind> = headers
            .iter()
            .enumerate()
            .map(|(index, name)| {
                if text_columns.contains(&name.as_str()) {
                    ColumnKind::Text
                } else {
                    infer_kind(raw_rows.iter().map(|row| row[index].as_str()))
                }
            })
            .collect();

        let rows = raw_rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&kinds)
                    .map(|(value, kind)| to_cell(value, *kind))
                    .collect()
            })
            .collect();

        let columns = headers
            .into_iter()
            .zip(kinds)
            .map(|(name, kind)| Column { name, kind })
            .collect();

        Ok(Self { columns, rows })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// All values of the column `name`, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }

    pub fn row(&self, index: usize) -> Option<&[Cell]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// Value at `row` in column `name`.
    pub fn get(&self, row: usize, name: &str) -> Option<&Cell> {
        let index = self.column_index(name)?;
        self.rows.get(row).map(|values| &values[index])
    }
}

fn infer_kind<'a>(values: impl Iterator<Item = &'a str>) -> ColumnKind {
    let mut integer = true;
    let mut float = true;
    let mut boolean = true;
    let mut seen = false;

    for value in values.filter(|value| !value.is_empty()) {
        seen = true;
        integer &= value.parse::<i64>().is_ok();
        float &= value.parse::<f64>().is_ok();
        boolean &= parse_bool(value).is_some();
        if !(integer || float || boolean) {
            break;
        }
    }

    if !seen {
        ColumnKind::Text
    } else if integer {
        ColumnKind::Integer
    } else if float {
        ColumnKind::Float
    } else if boolean {
        ColumnKind::Boolean
    } else {
        ColumnKind::Text
    }
}

fn to_cell(value: String, kind: ColumnKind) -> Cell {
    if value.is_empty() {
        return Cell::Missing;
    }
    // Kinds were inferred from these same values, so the parses succeed.
    match kind {
        ColumnKind::Integer => value.parse().map(Cell::Integer).unwrap_or(Cell::Text(value)),
        ColumnKind::Float => value.parse().map(Cell::Float).unwrap_or(Cell::Text(value)),
        ColumnKind::Boolean => parse_bool(&value)
            .map(Cell::Boolean)
            .unwrap_or(Cell::Text(value)),
        ColumnKind::Text => Cell::Text(value),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
