use serde::{Deserialize, Serialize};

use crate::errors::{AssayResult, ObjectiveError};
use crate::parameters::Interval;

/// Optimization direction of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TargetMode {
    Max,
    Min,
    /// Hit the center of the target bounds.
    Match,
}

/// A measured numeric quantity the campaign optimizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NumericalTarget {
    pub name: String,
    pub mode: TargetMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Interval>,
}

impl NumericalTarget {
    pub fn new(name: impl Into<String>, mode: TargetMode) -> Self {
        Self {
            name: name.into(),
            mode,
            bounds: None,
        }
    }

    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.bounds = Some(Interval::new(lower, upper));
        self
    }

    /// Normalized targets map onto `[0, 1]`.
    pub fn is_normalized(&self) -> bool {
        self.bounds.is_some()
    }

    pub fn validate(&self) -> AssayResult<()> {
        let invalid = |message: &str| ObjectiveError::InvalidTarget {
            target: self.name.clone(),
            message: message.to_string(),
        };
        if self.name.is_empty() {
            return Err(invalid("name must not be empty").into());
        }
        match self.bounds {
            Some(b) if !b.is_valid() => {
                Err(invalid("bounds must be finite with lower < upper").into())
            }
            None if self.mode == TargetMode::Match => {
                Err(invalid("MATCH mode requires bounds").into())
            }
            _ => Ok(()),
        }
    }

    /// Map a raw measurement to a utility where larger is better.
    pub fn transform(&self, value: f64) -> f64 {
        match (self.mode, self.bounds) {
            (TargetMode::Max, Some(b)) => ((value - b.lower) / b.width()).clamp(0.0, 1.0),
            (TargetMode::Min, Some(b)) => ((b.upper - value) / b.width()).clamp(0.0, 1.0),
            (TargetMode::Match, Some(b)) => {
                let half = b.width() / 2.0;
                (1.0 - (value - b.center()).abs() / half).clamp(0.0, 1.0)
            }
            (TargetMode::Max, None) => value,
            (TargetMode::Min, None) => -value,
            // Rejected by `validate`.
            (TargetMode::Match, None) => f64::NAN,
        }
    }
}
