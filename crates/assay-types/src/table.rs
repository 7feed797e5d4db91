//! A small row-oriented table with a stable per-row index.
//!
//! Candidate sets, measurement logs and recommendations are all exchanged as
//! [`Table`]s. Every row carries an index that survives subsetting, which is
//! how recommendations and filters refer back to discrete candidates.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::errors::{AssayError, AssayResult};

/// A single table value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    /// `Null` or a NaN float.
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Float(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Whether the value is of a numeric kind (bool, integer or float).
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Bool(_) | Self::Int(_) | Self::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Equality where integers and floats compare by numeric value.
    pub fn loosely_equals(&self, other: &Cell) -> bool {
        match (self, other) {
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// One table row keyed by column name.
pub type Row = BTreeMap<String, Cell>;

/// Ordered columns plus indexed rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "TableRepr", into = "TableRepr")]
pub struct Table {
    columns: Vec<String>,
    index: Vec<usize>,
    rows: Vec<Vec<Cell>>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableRepr {
    columns: Vec<String>,
    index: Vec<usize>,
    rows: Vec<Vec<Cell>>,
}

impl TryFrom<TableRepr> for Table {
    type Error = AssayError;

    fn try_from(repr: TableRepr) -> Result<Self, Self::Error> {
        if repr.index.len() != repr.rows.len() {
            return Err(crate::validation_error!(
                "table has {} index entries for {} rows",
                repr.index.len(),
                repr.rows.len()
            ));
        }
        if let Some(bad) = repr.rows.iter().position(|r| r.len() != repr.columns.len()) {
            return Err(crate::validation_error!(
                "table row {bad} does not have {} values",
                repr.columns.len()
            ));
        }
        Ok(Self {
            columns: repr.columns,
            index: repr.index,
            rows: repr.rows,
        })
    }
}

impl From<Table> for TableRepr {
    fn from(table: Table) -> Self {
        Self {
            columns: table.columns,
            index: table.index,
            rows: table.rows,
        }
    }
}

impl Table {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            index: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Build a table from records. Columns are the union of all keys in
    /// first-seen order; absent keys become `Null`. Rows are indexed `0..n`.
    pub fn from_records(records: &[Row]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        let mut table = Self::new(columns);
        for (i, record) in records.iter().enumerate() {
            table.push_record(i, record);
        }
        table
    }

    pub fn to_records(&self) -> Vec<Row> {
        self.rows
            .iter()
            .map(|values| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(values.iter().cloned())
                    .collect()
            })
            .collect()
    }

    pub fn push_row(&mut self, index: usize, values: Vec<Cell>) -> AssayResult<()> {
        if values.len() != self.columns.len() {
            return Err(AssayError::InvalidArgument(format!(
                "row has {} values but the table has {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        self.index.push(index);
        self.rows.push(values);
        Ok(())
    }

    /// Push a record, picking values by column name.
    pub fn push_record(&mut self, index: usize, record: &Row) {
        let values = self
            .columns
            .iter()
            .map(|c| record.get(c).cloned().unwrap_or(Cell::Null))
            .collect();
        self.index.push(index);
        self.rows.push(values);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn index(&self) -> &[usize] {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_position(name).is_some()
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterate over the values of one column.
    pub fn column<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a Cell> + 'a> {
        let pos = self.column_position(name)?;
        Some(self.rows.iter().map(move |row| &row[pos]))
    }

    /// Value at row position `row` (not index) in column `column`.
    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let pos = self.column_position(column)?;
        self.rows.get(row).map(|r| &r[pos])
    }

    /// Iterate over `(index, values)` pairs in row order.
    pub fn rows(&self) -> impl Iterator<Item = (usize, &[Cell])> {
        self.index
            .iter()
            .copied()
            .zip(self.rows.iter().map(Vec::as_slice))
    }

    pub fn row_values(&self, position: usize) -> Option<&[Cell]> {
        self.rows.get(position).map(Vec::as_slice)
    }

    pub fn record(&self, position: usize) -> Option<Row> {
        let values = self.rows.get(position)?;
        Some(
            self.columns
                .iter()
                .cloned()
                .zip(values.iter().cloned())
                .collect(),
        )
    }

    /// Rows whose index is in `indices`, in the order given. Unknown indices
    /// are skipped.
    pub fn select(&self, indices: &[usize]) -> Table {
        let positions: HashMap<usize, usize> = self
            .index
            .iter()
            .enumerate()
            .map(|(pos, idx)| (*idx, pos))
            .collect();
        let picked: Vec<usize> = indices
            .iter()
            .filter_map(|idx| positions.get(idx).copied())
            .collect();
        self.select_positions(&picked)
    }

    pub fn select_positions(&self, positions: &[usize]) -> Table {
        let mut out = Table::new(self.columns.clone());
        for &pos in positions {
            if let Some(values) = self.rows.get(pos) {
                out.index.push(self.index[pos]);
                out.rows.push(values.clone());
            }
        }
        out
    }

    /// Keep the rows for which `keep(index, values)` holds.
    pub fn filter<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(usize, &[Cell]) -> bool,
    {
        let positions: Vec<usize> = self
            .rows()
            .enumerate()
            .filter(|(_, (idx, values))| keep(*idx, *values))
            .map(|(pos, _)| pos)
            .collect();
        self.select_positions(&positions)
    }

    /// Append all rows of `other`, matching columns by name. Columns unknown
    /// to `self` are added and back-filled with `Null`. The index is reset
    /// to `0..n` afterwards.
    pub fn append(&mut self, other: &Table) {
        for column in &other.columns {
            if !self.has_column(column) {
                self.columns.push(column.clone());
                for row in &mut self.rows {
                    row.push(Cell::Null);
                }
            }
        }
        let mapping: Vec<Option<usize>> = self
            .columns
            .iter()
            .map(|c| other.column_position(c))
            .collect();
        for values in &other.rows {
            let row = mapping
                .iter()
                .map(|pos| pos.map(|p| values[p].clone()).unwrap_or(Cell::Null))
                .collect();
            self.rows.push(row);
            self.index.push(0);
        }
        self.reset_index();
    }

    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<Cell>) -> AssayResult<()> {
        let name = name.into();
        if values.len() != self.rows.len() {
            return Err(AssayError::InvalidArgument(format!(
                "column '{name}' has {} values for {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        if self.has_column(&name) {
            return Err(AssayError::InvalidArgument(format!(
                "column '{name}' already exists"
            )));
        }
        self.columns.push(name);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Copy without the named columns. Unknown names are ignored.
    pub fn drop_columns(&self, names: &[&str]) -> Table {
        let keep: Vec<usize> = (0..self.columns.len())
            .filter(|&i| !names.contains(&self.columns[i].as_str()))
            .collect();
        Table {
            columns: keep.iter().map(|&i| self.columns[i].clone()).collect(),
            index: self.index.clone(),
            rows: self
                .rows
                .iter()
                .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        }
    }

    pub fn reset_index(&mut self) {
        self.index = (0..self.rows.len()).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, Cell)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn from_records_fills_missing_keys() {
        let table = Table::from_records(&[
            record(&[("x", Cell::Int(1)), ("y", Cell::from("a"))]),
            record(&[("x", Cell::Int(2))]),
        ]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.index(), &[0, 1]);
        assert_eq!(table.get(1, "y"), Some(&Cell::Null));
    }

    #[test]
    fn cells_deserialize_from_json_scalars() {
        let cells: Vec<Cell> = serde_json::from_str(r#"[null, true, 3, 2.5, "a"]"#).unwrap();
        assert_eq!(
            cells,
            vec![
                Cell::Null,
                Cell::Bool(true),
                Cell::Int(3),
                Cell::Float(2.5),
                Cell::from("a")
            ]
        );
        assert!(cells[0].is_missing());
        assert!(cells.iter().skip(1).take(3).all(Cell::is_numeric));
        assert!(!cells[4].is_numeric());
    }

    #[test]
    fn loose_equality_spans_int_and_float() {
        assert!(Cell::Int(2).loosely_equals(&Cell::Float(2.0)));
        assert!(!Cell::Int(2).loosely_equals(&Cell::from("2")));
        assert!(!Cell::Float(f64::NAN).loosely_equals(&Cell::Float(f64::NAN)));
    }

    #[test]
    fn select_keeps_original_index() {
        let mut table = Table::new(["x"]);
        for i in 0..5 {
            table.push_row(i * 10, vec![Cell::Int(i as i64)]).unwrap();
        }
        let picked = table.select(&[40, 10, 99]);
        assert_eq!(picked.index(), &[40, 10]);
        assert_eq!(picked.get(0, "x"), Some(&Cell::Int(4)));
    }

    #[test]
    fn append_unions_columns_and_resets_index() {
        let mut log = Table::from_records(&[record(&[("x", Cell::Int(1))])]);
        let mut extra = Table::new(["x", "y"]);
        extra
            .push_row(7, vec![Cell::Int(2), Cell::Float(0.5)])
            .unwrap();
        log.append(&extra);

        assert_eq!(log.columns(), &["x".to_string(), "y".to_string()]);
        assert_eq!(log.index(), &[0, 1]);
        assert_eq!(log.get(0, "y"), Some(&Cell::Null));
        assert_eq!(log.get(1, "y"), Some(&Cell::Float(0.5)));
    }

    #[test]
    fn drop_columns_keeps_index() {
        let mut table = Table::new(["a", "b", "c"]);
        table
            .push_row(4, vec![Cell::Int(1), Cell::Int(2), Cell::Int(3)])
            .unwrap();
        let dropped = table.drop_columns(&["b", "zzz"]);
        assert_eq!(dropped.columns(), &["a", "c"]);
        assert_eq!(dropped.index(), &[4]);
        assert_eq!(dropped.get(0, "c"), Some(&Cell::Int(3)));
    }

    #[test]
    fn push_row_rejects_wrong_width() {
        let mut table = Table::new(["a", "b"]);
        assert!(table.push_row(0, vec![Cell::Int(1)]).is_err());
    }

    #[test]
    fn deserialize_rejects_ragged_rows() {
        let json = r#"{"columns":["a"],"index":[0],"rows":[[1,2]]}"#;
        assert!(serde_json::from_str::<Table>(json).is_err());

        let json = r#"{"columns":["a"],"index":[0],"rows":[[1]],"extra":1}"#;
        assert!(serde_json::from_str::<Table>(json).is_err());
    }
}
