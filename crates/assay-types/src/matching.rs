//! Tolerance-aware matching of measurement rows to discrete candidates.

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::parameters::Parameter;
use crate::table::{Cell, Table};

struct ColumnMatcher {
    name: String,
    candidate_pos: usize,
    data_pos: Option<usize>,
    numerical: bool,
    tolerance: f64,
}

impl ColumnMatcher {
    fn matches(&self, candidate: &[Cell], row: &[Cell], within_tolerance: bool) -> bool {
        let Some(data_pos) = self.data_pos else {
            return false;
        };
        let (cand, value) = (&candidate[self.candidate_pos], &row[data_pos]);
        if !self.numerical {
            return cand.loosely_equals(value);
        }
        match (cand.as_f64(), value.as_f64()) {
            (Some(a), Some(b)) if within_tolerance => (a - b).abs() <= self.tolerance,
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// For every row of `data`, the candidate indices it matches.
///
/// Non-numerical parameters must be equal. Numerical parameters must lie
/// within the parameter tolerance when `within_tolerance` is set and be
/// exactly equal otherwise. Only parameters present as candidate columns
/// take part; a row may match zero, one or several candidates.
pub fn fuzzy_row_match_rows(
    candidates: &Table,
    data: &Table,
    parameters: &[Parameter],
    within_tolerance: bool,
) -> Vec<Vec<usize>> {
    let matchers: Vec<ColumnMatcher> = parameters
        .iter()
        .filter_map(|p| {
            Some(ColumnMatcher {
                name: p.name().to_string(),
                candidate_pos: candidates.column_position(p.name())?,
                data_pos: data.column_position(p.name()),
                numerical: p.is_numerical(),
                tolerance: p.tolerance(),
            })
        })
        .collect();

    let rows: Vec<(usize, &[Cell])> = data.rows().collect();
    rows.par_iter()
        .map(|(row_idx, row)| {
            let found: Vec<usize> = candidates
                .rows()
                .filter(|(_, cand)| {
                    matchers
                        .iter()
                        .all(|m| m.matches(cand, row, within_tolerance))
                })
                .map(|(idx, _)| idx)
                .collect();
            match found.len() {
                0 => warn!(
                    row = row_idx,
                    columns = ?matchers.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
                    "row matches no candidate"
                ),
                1 => {}
                n => debug!(row = row_idx, matches = n, "row matches several candidates"),
            }
            found
        })
        .collect()
}

/// All candidate indices matched by any row of `data`, sorted and unique.
pub fn fuzzy_row_match(
    candidates: &Table,
    data: &Table,
    parameters: &[Parameter],
    within_tolerance: bool,
) -> Vec<usize> {
    let mut matched: Vec<usize> =
        fuzzy_row_match_rows(candidates, data, parameters, within_tolerance)
            .into_iter()
            .flatten()
            .collect();
    matched.sort_unstable();
    matched.dedup();
    matched
}
