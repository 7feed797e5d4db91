use std::fmt;

use thiserror::Error;

/// Which kind of column a validation error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Target,
    Parameter,
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Target => write!(f, "target"),
            Self::Parameter => write!(f, "parameter"),
        }
    }
}

/// Main error type for Assay campaigns
#[derive(Error, Debug)]
pub enum AssayError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("The {role} '{column}' has missing values in the provided data")]
    MissingValue { column: String, role: ColumnRole },

    #[error("The {role} '{column}' has non-numeric or non-finite entries in the provided data")]
    NonNumericValue { column: String, role: ColumnRole },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Recommender error: {0}")]
    Recommender(#[from] RecommenderError),

    #[error("Search space error: {0}")]
    SearchSpace(#[from] SearchSpaceError),

    #[error("Objective error: {0}")]
    Objective(#[from] ObjectiveError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised inside recommenders. The campaign propagates them unchanged.
#[derive(Error, Debug)]
pub enum RecommenderError {
    #[error("Requested {requested} recommendations but only {available} candidates are eligible")]
    NotEnoughCandidates { requested: usize, available: usize },

    #[error("Recommender '{recommender}' requires at least one measurement")]
    NoMeasurements { recommender: String },

    #[error("Recommender '{recommender}' requires an objective")]
    MissingObjective { recommender: String },

    #[error("Surrogate fit failed: {message}")]
    Fit { message: String },

    #[error("Recommender sequence exhausted after {used} recommenders")]
    SequenceExhausted { used: usize },
}

/// Search space and parameter definition errors
#[derive(Error, Debug)]
pub enum SearchSpaceError {
    #[error("Invalid parameter '{parameter}': {message}")]
    InvalidParameter { parameter: String, message: String },

    #[error("Duplicate parameter name: {name}")]
    DuplicateParameter { name: String },

    #[error("The search space has no parameters")]
    Empty,

    #[error("Candidate row {row} has an invalid value for parameter '{parameter}'")]
    InvalidCandidate { row: usize, parameter: String },
}

/// Objective and target definition errors
#[derive(Error, Debug)]
pub enum ObjectiveError {
    #[error("Invalid target '{target}': {message}")]
    InvalidTarget { target: String, message: String },

    #[error("Desirability objectives need at least two targets, got {count}")]
    TooFewTargets { count: usize },

    #[error("Expected one weight per target: {targets} targets, {weights} weights")]
    WeightMismatch { targets: usize, weights: usize },

    #[error("All weights must be strictly positive")]
    NonPositiveWeight,

    #[error("All targets must be normalized, which requires bounds on target '{target}'")]
    NotNormalized { target: String },
}

/// Result type alias for Assay operations
pub type AssayResult<T> = Result<T, AssayError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::AssayError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::AssayError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::AssayError::Config(format!($($arg)*))
    };
}

/// Macro for creating capability-mismatch errors
#[macro_export]
macro_rules! unsupported {
    ($($arg:tt)*) => {
        $crate::AssayError::Unsupported(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = AssayError::MissingValue {
            column: "yield".to_string(),
            role: ColumnRole::Target,
        };

        assert!(error.to_string().contains("target"));
        assert!(error.to_string().contains("yield"));
    }

    #[test]
    fn test_error_conversion() {
        let rec_error = RecommenderError::NotEnoughCandidates {
            requested: 5,
            available: 2,
        };
        let error: AssayError = rec_error.into();

        match error {
            AssayError::Recommender(RecommenderError::NotEnoughCandidates { .. }) => (),
            _ => panic!("Expected Recommender error"),
        }
    }

    #[test]
    fn test_macros() {
        let validation_err = validation_error!("Invalid value: {}", 42);
        assert!(matches!(validation_err, AssayError::Validation(_)));
        let _internal_err = internal_error!("Something went wrong");
        let _config_err = config_error!("Missing required field: {}", "searchspace");
        let unsupported_err = unsupported!("no objective");
        assert!(unsupported_err.to_string().contains("no objective"));
    }
}
