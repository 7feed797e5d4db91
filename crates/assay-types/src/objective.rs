//! Optimization objectives over one or more targets.

use serde::{Deserialize, Serialize};

use crate::errors::{AssayError, AssayResult, ColumnRole, ObjectiveError};
use crate::table::Table;
use crate::targets::NumericalTarget;

/// How weighted desirability values are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scalarizer {
    #[default]
    GeomMean,
    Mean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SingleTargetObjective {
    pub target: NumericalTarget,
}

/// Several normalized targets scalarized into a single desirability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesirabilityObjective {
    pub targets: Vec<NumericalTarget>,
    /// One strictly positive weight per target; empty means equal weights.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weights: Vec<f64>,
    #[serde(default)]
    pub scalarizer: Scalarizer,
}

impl DesirabilityObjective {
    /// Weights normalized to sum to one.
    pub fn normalized_weights(&self) -> Vec<f64> {
        if self.weights.is_empty() {
            let n = self.targets.len() as f64;
            return vec![1.0 / n; self.targets.len()];
        }
        let total: f64 = self.weights.iter().sum();
        self.weights.iter().map(|w| w / total).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Objective {
    #[serde(rename = "SingleTargetObjective")]
    SingleTarget(SingleTargetObjective),
    #[serde(rename = "DesirabilityObjective")]
    Desirability(DesirabilityObjective),
}

impl From<NumericalTarget> for Objective {
    fn from(target: NumericalTarget) -> Self {
        Self::SingleTarget(SingleTargetObjective { target })
    }
}

impl Objective {
    pub fn single(target: NumericalTarget) -> AssayResult<Self> {
        let objective = Self::from(target);
        objective.validate()?;
        Ok(objective)
    }

    pub fn desirability(
        targets: Vec<NumericalTarget>,
        weights: Option<Vec<f64>>,
        scalarizer: Scalarizer,
    ) -> AssayResult<Self> {
        let objective = Self::Desirability(DesirabilityObjective {
            targets,
            weights: weights.unwrap_or_default(),
            scalarizer,
        });
        objective.validate()?;
        Ok(objective)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::SingleTarget(_) => "SingleTargetObjective",
            Self::Desirability(_) => "DesirabilityObjective",
        }
    }

    pub fn targets(&self) -> &[NumericalTarget] {
        match self {
            Self::SingleTarget(o) => std::slice::from_ref(&o.target),
            Self::Desirability(o) => &o.targets,
        }
    }

    pub fn validate(&self) -> AssayResult<()> {
        for target in self.targets() {
            target.validate()?;
        }
        if let Self::Desirability(o) = self {
            if o.targets.len() < 2 {
                return Err(ObjectiveError::TooFewTargets {
                    count: o.targets.len(),
                }
                .into());
            }
            if let Some(t) = o.targets.iter().find(|t| !t.is_normalized()) {
                return Err(ObjectiveError::NotNormalized {
                    target: t.name.clone(),
                }
                .into());
            }
            if !o.weights.is_empty() {
                if o.weights.len() != o.targets.len() {
                    return Err(ObjectiveError::WeightMismatch {
                        targets: o.targets.len(),
                        weights: o.weights.len(),
                    }
                    .into());
                }
                if o.weights.iter().any(|w| !(w.is_finite() && *w > 0.0)) {
                    return Err(ObjectiveError::NonPositiveWeight.into());
                }
            }
        }
        Ok(())
    }

    /// Per-row utility (larger is better) of the target columns in `data`.
    pub fn transform(&self, data: &Table) -> AssayResult<Vec<f64>> {
        let mut columns: Vec<Vec<f64>> = Vec::with_capacity(self.targets().len());
        for target in self.targets() {
            let cells = data.column(&target.name).ok_or_else(|| AssayError::MissingValue {
                column: target.name.clone(),
                role: ColumnRole::Target,
            })?;
            let mut values = Vec::with_capacity(data.len());
            for cell in cells {
                if cell.is_missing() {
                    return Err(AssayError::MissingValue {
                        column: target.name.clone(),
                        role: ColumnRole::Target,
                    });
                }
                let raw = cell.as_f64().ok_or_else(|| AssayError::NonNumericValue {
                    column: target.name.clone(),
                    role: ColumnRole::Target,
                })?;
                values.push(target.transform(raw));
            }
            columns.push(values);
        }

        match self {
            Self::SingleTarget(_) => Ok(columns.pop().unwrap_or_default()),
            Self::Desirability(o) => {
                let rows: Vec<Vec<f64>> = (0..data.len())
                    .map(|i| columns.iter().map(|c| c[i]).collect())
                    .collect();
                Ok(scalarize(&rows, o.scalarizer, &o.normalized_weights()))
            }
        }
    }
}

/// Scalarize each row of `values` using weights that sum to one.
pub fn scalarize(values: &[Vec<f64>], scalarizer: Scalarizer, weights: &[f64]) -> Vec<f64> {
    values
        .iter()
        .map(|row| match scalarizer {
            Scalarizer::GeomMean => row
                .iter()
                .zip(weights)
                .map(|(x, w)| x.powf(*w))
                .product(),
            Scalarizer::Mean => row.iter().zip(weights).map(|(x, w)| x * w).sum(),
        })
        .collect()
}
