//! Append-only record of submitted measurements.

use serde::{Deserialize, Serialize};

use assay_types::{validation_error, AssayError, AssayResult, Cell, Table};

pub const BATCH_NR_COLUMN: &str = "BatchNr";
pub const FIT_NR_COLUMN: &str = "FitNr";

/// Submitted rows with their batch and fit numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MeasurementLogRepr")]
pub struct MeasurementLog {
    data: Table,
    batch_nr: Vec<usize>,
    fit_nr: Vec<Option<usize>>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MeasurementLogRepr {
    data: Table,
    batch_nr: Vec<usize>,
    fit_nr: Vec<Option<usize>>,
}

impl TryFrom<MeasurementLogRepr> for MeasurementLog {
    type Error = AssayError;

    fn try_from(repr: MeasurementLogRepr) -> Result<Self, Self::Error> {
        let rows = repr.data.len();
        if repr.batch_nr.len() != rows || repr.fit_nr.len() != rows {
            return Err(validation_error!(
                "measurement log has {rows} rows but {} batch and {} fit numbers",
                repr.batch_nr.len(),
                repr.fit_nr.len()
            ));
        }
        Ok(Self {
            data: repr.data,
            batch_nr: repr.batch_nr,
            fit_nr: repr.fit_nr,
        })
    }
}

impl MeasurementLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `rows` under `batch_nr`. Bookkeeping columns in `rows` are
    /// replaced by the log's own.
    pub fn append(&mut self, rows: &Table, batch_nr: usize) {
        self.data
            .append(&rows.drop_columns(&[BATCH_NR_COLUMN, FIT_NR_COLUMN]));
        self.batch_nr.extend(std::iter::repeat(batch_nr).take(rows.len()));
        self.fit_nr.extend(std::iter::repeat(None).take(rows.len()));
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw submitted values without bookkeeping columns.
    pub fn data(&self) -> &Table {
        &self.data
    }

    pub fn has_unfit(&self) -> bool {
        self.fit_nr.iter().any(Option::is_none)
    }

    /// Stamp every unfit row with `fit_nr`; returns how many were stamped.
    pub fn stamp_unfit(&mut self, fit_nr: usize) -> usize {
        let mut stamped = 0;
        for slot in self.fit_nr.iter_mut().filter(|s| s.is_none()) {
            *slot = Some(fit_nr);
            stamped += 1;
        }
        stamped
    }

    /// Submitted data plus `BatchNr` and `FitNr` columns.
    pub fn to_table(&self) -> AssayResult<Table> {
        let mut table = self.data.clone();
        table.add_column(
            BATCH_NR_COLUMN,
            self.batch_nr.iter().map(|b| Cell::Int(*b as i64)).collect(),
        )?;
        table.add_column(
            FIT_NR_COLUMN,
            self.fit_nr
                .iter()
                .map(|f| f.map_or(Cell::Null, |n| Cell::Int(n as i64)))
                .collect(),
        )?;
        Ok(table)
    }
}
