//! Parameter definitions: the dimensions of a search space.

use serde::{Deserialize, Serialize};

use crate::errors::{AssayError, AssayResult, SearchSpaceError};
use crate::table::Cell;

/// Closed numeric interval `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn center(&self) -> f64 {
        (self.lower + self.upper) / 2.0
    }

    pub fn is_valid(&self) -> bool {
        self.lower.is_finite() && self.upper.is_finite() && self.lower < self.upper
    }
}

/// How categorical values are encoded for surrogate models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CategoricalEncoding {
    /// One-hot encoding.
    #[default]
    #[serde(rename = "OHE")]
    OneHot,
    /// Integer label encoding.
    #[serde(rename = "INT")]
    Integer,
}

/// Unordered set of labels; matched by exact equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoricalParameter {
    pub name: String,
    pub values: Vec<String>,
    #[serde(default)]
    pub encoding: CategoricalEncoding,
}

/// Finite set of numeric setpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NumericalDiscreteParameter {
    pub name: String,
    pub values: Vec<f64>,
    /// Allowed deviation when matching measured values back to setpoints.
    #[serde(default)]
    pub tolerance: f64,
}

/// Bounded real-valued dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NumericalContinuousParameter {
    pub name: String,
    pub bounds: Interval,
}

/// A single dimension of the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Parameter {
    #[serde(rename = "CategoricalParameter")]
    Categorical(CategoricalParameter),
    #[serde(rename = "NumericalDiscreteParameter")]
    NumericalDiscrete(NumericalDiscreteParameter),
    #[serde(rename = "NumericalContinuousParameter")]
    NumericalContinuous(NumericalContinuousParameter),
}

impl Parameter {
    pub fn categorical<I, S>(name: impl Into<String>, values: I) -> AssayResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let param = Self::Categorical(CategoricalParameter {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
            encoding: CategoricalEncoding::default(),
        });
        param.validate()?;
        Ok(param)
    }

    pub fn numerical_discrete(
        name: impl Into<String>,
        values: Vec<f64>,
        tolerance: f64,
    ) -> AssayResult<Self> {
        let param = Self::NumericalDiscrete(NumericalDiscreteParameter {
            name: name.into(),
            values,
            tolerance,
        });
        param.validate()?;
        Ok(param)
    }

    pub fn numerical_continuous(
        name: impl Into<String>,
        lower: f64,
        upper: f64,
    ) -> AssayResult<Self> {
        let param = Self::NumericalContinuous(NumericalContinuousParameter {
            name: name.into(),
            bounds: Interval::new(lower, upper),
        });
        param.validate()?;
        Ok(param)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Categorical(p) => &p.name,
            Self::NumericalDiscrete(p) => &p.name,
            Self::NumericalContinuous(p) => &p.name,
        }
    }

    pub fn is_numerical(&self) -> bool {
        !matches!(self, Self::Categorical(_))
    }

    pub fn is_discrete(&self) -> bool {
        !matches!(self, Self::NumericalContinuous(_))
    }

    /// Matching tolerance; zero for everything but numerical setpoints.
    pub fn tolerance(&self) -> f64 {
        match self {
            Self::NumericalDiscrete(p) => p.tolerance,
            _ => 0.0,
        }
    }

    /// All admissible values of a discrete parameter.
    pub fn discrete_values(&self) -> Option<Vec<Cell>> {
        match self {
            Self::Categorical(p) => Some(p.values.iter().map(|v| Cell::from(v.as_str())).collect()),
            Self::NumericalDiscrete(p) => Some(p.values.iter().copied().map(Cell::Float).collect()),
            Self::NumericalContinuous(_) => None,
        }
    }

    pub fn is_in_range(&self, value: &Cell) -> bool {
        match self {
            Self::Categorical(p) => value
                .as_str()
                .map(|s| p.values.iter().any(|v| v == s))
                .unwrap_or(false),
            Self::NumericalDiscrete(p) => match value.as_f64() {
                Some(x) if !x.is_nan() => p.values.iter().any(|v| (v - x).abs() <= p.tolerance),
                _ => false,
            },
            Self::NumericalContinuous(p) => value
                .as_f64()
                .map(|x| p.bounds.contains(x))
                .unwrap_or(false),
        }
    }

    pub fn validate(&self) -> AssayResult<()> {
        let invalid = |message: String| -> AssayError {
            SearchSpaceError::InvalidParameter {
                parameter: self.name().to_string(),
                message,
            }
            .into()
        };

        if self.name().is_empty() {
            return Err(invalid("name must not be empty".into()));
        }

        match self {
            Self::Categorical(p) => {
                if p.values.len() < 2 {
                    return Err(invalid("must have at least two values".into()));
                }
                for (i, v) in p.values.iter().enumerate() {
                    if p.values[..i].contains(v) {
                        return Err(invalid(format!("duplicate value '{v}'")));
                    }
                }
            }
            Self::NumericalDiscrete(p) => {
                if p.values.len() < 2 {
                    return Err(invalid("must have at least two values".into()));
                }
                if p.values.iter().any(|v| !v.is_finite()) {
                    return Err(invalid("values must be finite".into()));
                }
                let mut sorted = p.values.clone();
                sorted.sort_by(f64::total_cmp);
                let min_gap = sorted
                    .windows(2)
                    .map(|w| w[1] - w[0])
                    .fold(f64::INFINITY, f64::min);
                if min_gap == 0.0 {
                    return Err(invalid("values must be unique".into()));
                }
                if !p.tolerance.is_finite() || p.tolerance < 0.0 {
                    return Err(invalid(format!("tolerance {} is not allowed", p.tolerance)));
                }
                // Tolerance windows of neighbouring setpoints must not overlap.
                let max_tolerance = min_gap / 2.0;
                if p.tolerance >= max_tolerance {
                    return Err(invalid(format!(
                        "tolerance {} must be below {max_tolerance} for values {:?}",
                        p.tolerance, p.values
                    )));
                }
            }
            Self::NumericalContinuous(p) => {
                if !p.bounds.is_valid() {
                    return Err(invalid(format!(
                        "bounds [{}, {}] must be finite with lower < upper",
                        p.bounds.lower, p.bounds.upper
                    )));
                }
            }
        }
        Ok(())
    }

    /// Number of features produced by [`Parameter::encode`].
    pub fn encoded_width(&self) -> usize {
        match self {
            Self::Categorical(p) if p.encoding == CategoricalEncoding::OneHot => p.values.len(),
            _ => 1,
        }
    }

    /// Minimal computational representation used by surrogate models:
    /// numeric values scaled to the unit interval, categories one-hot or
    /// integer coded.
    pub fn encode(&self, value: &Cell) -> AssayResult<Vec<f64>> {
        let out_of_range = || {
            AssayError::InvalidArgument(format!(
                "value '{value}' is not valid for parameter '{}'",
                self.name()
            ))
        };
        match self {
            Self::Categorical(p) => {
                let label = value.as_str().ok_or_else(out_of_range)?;
                let pos = p.values.iter().position(|v| v == label).ok_or_else(out_of_range)?;
                Ok(match p.encoding {
                    CategoricalEncoding::OneHot => {
                        let mut features = vec![0.0; p.values.len()];
                        features[pos] = 1.0;
                        features
                    }
                    CategoricalEncoding::Integer => vec![pos as f64],
                })
            }
            Self::NumericalDiscrete(p) => {
                let x = value.as_f64().ok_or_else(out_of_range)?;
                let low = p.values.iter().copied().fold(f64::INFINITY, f64::min);
                let high = p.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                Ok(vec![(x - low) / (high - low)])
            }
            Self::NumericalContinuous(p) => {
                let x = value.as_f64().ok_or_else(out_of_range)?;
                Ok(vec![(x - p.bounds.lower) / p.bounds.width()])
            }
        }
    }
}
