//! Search space definitions: the universe of candidate configurations.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::errors::{AssayResult, SearchSpaceError};
use crate::metadata::{CandidateFlags, SearchSpaceMetadata};
use crate::parameters::Parameter;
use crate::table::{Cell, Row, Table};

/// Which kinds of parameters a search space contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SearchSpaceType {
    Discrete,
    Continuous,
    Hybrid,
}

impl std::fmt::Display for SearchSpaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discrete => write!(f, "DISCRETE"),
            Self::Continuous => write!(f, "CONTINUOUS"),
            Self::Hybrid => write!(f, "HYBRID"),
        }
    }
}

// ---------------------------------------------------------------------------
// Discrete subspace
// ---------------------------------------------------------------------------

/// Enumerated candidate set over the discrete parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubspaceDiscrete {
    parameters: Vec<Parameter>,
    /// Experimental representation; one row per candidate.
    exp_rep: Table,
    /// Candidates excluded before any campaign activity.
    #[serde(default)]
    excluded: BTreeSet<usize>,
}

impl SubspaceDiscrete {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of rows [`SubspaceDiscrete::from_product`] would create, or
    /// `None` on overflow.
    pub fn product_size(parameters: &[Parameter]) -> Option<usize> {
        let mut total: usize = 1;
        for param in parameters {
            let dim_size = param.discrete_values()?.len();
            total = total.checked_mul(dim_size)?;
        }
        Some(total)
    }

    /// Cartesian product of all parameter values.
    pub fn from_product(parameters: Vec<Parameter>) -> AssayResult<Self> {
        check_parameters(&parameters, true)?;
        if Self::product_size(&parameters).is_none() {
            return Err(SearchSpaceError::InvalidParameter {
                parameter: parameters
                    .last()
                    .map(|p| p.name().to_string())
                    .unwrap_or_default(),
                message: "cartesian product is too large".into(),
            }
            .into());
        }

        let mut combos: Vec<Vec<Cell>> = vec![Vec::new()];
        for param in &parameters {
            let values = param.discrete_values().unwrap_or_default();
            let mut next = Vec::with_capacity(combos.len() * values.len());
            for existing in &combos {
                for value in &values {
                    let mut combo = existing.clone();
                    combo.push(value.clone());
                    next.push(combo);
                }
            }
            combos = next;
        }

        let mut exp_rep = Table::new(parameters.iter().map(|p| p.name().to_string()));
        if !parameters.is_empty() {
            for (i, combo) in combos.into_iter().enumerate() {
                exp_rep.push_row(i, combo)?;
            }
        }

        Ok(Self {
            parameters,
            exp_rep,
            excluded: BTreeSet::new(),
        })
    }

    /// Explicit candidate table. Every parameter needs a column and every
    /// value has to be in range. Extra columns are dropped.
    pub fn from_candidates(parameters: Vec<Parameter>, candidates: &Table) -> AssayResult<Self> {
        check_parameters(&parameters, true)?;
        validate_candidates(&parameters, candidates)?;

        let mut exp_rep = Table::new(parameters.iter().map(|p| p.name().to_string()));
        for (pos, _) in candidates.rows().enumerate() {
            let values = parameters
                .iter()
                .map(|p| candidates.get(pos, p.name()).cloned().unwrap_or(Cell::Null))
                .collect();
            exp_rep.push_row(pos, values)?;
        }

        Ok(Self {
            parameters,
            exp_rep,
            excluded: BTreeSet::new(),
        })
    }

    /// Set the exclusion defaults. Every index must name a candidate.
    pub fn with_excluded<I>(mut self, indices: I) -> AssayResult<Self>
    where
        I: IntoIterator<Item = usize>,
    {
        for idx in indices {
            if idx >= self.exp_rep.len() {
                return Err(crate::validation_error!(
                    "excluded index {idx} is out of range for {} candidates",
                    self.exp_rep.len()
                ));
            }
            self.excluded.insert(idx);
        }
        Ok(self)
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn exp_rep(&self) -> &Table {
        &self.exp_rep
    }

    pub fn len(&self) -> usize {
        self.exp_rep.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exp_rep.is_empty()
    }

    pub fn is_excluded_by_default(&self, index: usize) -> bool {
        self.excluded.contains(&index)
    }
}

// ---------------------------------------------------------------------------
// Continuous subspace
// ---------------------------------------------------------------------------

/// Box-bounded continuous parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubspaceContinuous {
    parameters: Vec<Parameter>,
}

impl SubspaceContinuous {
    pub fn new(parameters: Vec<Parameter>) -> AssayResult<Self> {
        check_parameters(&parameters, false)?;
        Ok(Self { parameters })
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// `n` points drawn uniformly within the bounds, indexed `0..n`.
    pub fn sample_uniform<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> AssayResult<Table> {
        let mut table = Table::new(self.parameters.iter().map(|p| p.name().to_string()));
        for i in 0..n {
            let row = self
                .parameters
                .iter()
                .map(|p| match p {
                    Parameter::NumericalContinuous(c) => {
                        Cell::Float(rng.gen_range(c.bounds.lower..=c.bounds.upper))
                    }
                    _ => Cell::Null,
                })
                .collect();
            table.push_row(i, row)?;
        }
        Ok(table)
    }
}

// ---------------------------------------------------------------------------
// Full search space
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchSpace {
    discrete: SubspaceDiscrete,
    continuous: SubspaceContinuous,
}

impl SearchSpace {
    pub fn new(discrete: SubspaceDiscrete, continuous: SubspaceContinuous) -> AssayResult<Self> {
        let all: Vec<Parameter> = discrete
            .parameters()
            .iter()
            .chain(continuous.parameters())
            .cloned()
            .collect();
        if all.is_empty() {
            return Err(SearchSpaceError::Empty.into());
        }
        check_unique_names(&all)?;
        Ok(Self {
            discrete,
            continuous,
        })
    }

    /// Discrete parameters enumerated as a product, continuous ones kept as
    /// bounds.
    pub fn from_product(parameters: Vec<Parameter>) -> AssayResult<Self> {
        let (discrete, continuous): (Vec<_>, Vec<_>) =
            parameters.into_iter().partition(Parameter::is_discrete);
        Self::new(
            SubspaceDiscrete::from_product(discrete)?,
            SubspaceContinuous::new(continuous)?,
        )
    }

    /// Discrete part given as an explicit candidate table.
    pub fn from_candidates(parameters: Vec<Parameter>, candidates: &Table) -> AssayResult<Self> {
        let (discrete, continuous): (Vec<_>, Vec<_>) =
            parameters.into_iter().partition(Parameter::is_discrete);
        Self::new(
            SubspaceDiscrete::from_candidates(discrete, candidates)?,
            SubspaceContinuous::new(continuous)?,
        )
    }

    pub fn discrete(&self) -> &SubspaceDiscrete {
        &self.discrete
    }

    pub fn continuous(&self) -> &SubspaceContinuous {
        &self.continuous
    }

    pub fn space_type(&self) -> SearchSpaceType {
        match (self.discrete.parameters.is_empty(), self.continuous.is_empty()) {
            (false, true) => SearchSpaceType::Discrete,
            (true, false) => SearchSpaceType::Continuous,
            _ => SearchSpaceType::Hybrid,
        }
    }

    /// Whether a discrete component exists (pure discrete or hybrid).
    pub fn has_discrete_part(&self) -> bool {
        matches!(
            self.space_type(),
            SearchSpaceType::Discrete | SearchSpaceType::Hybrid
        )
    }

    /// Discrete parameters first, then continuous ones.
    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.discrete
            .parameters
            .iter()
            .chain(self.continuous.parameters.iter())
    }

    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters().map(|p| p.name().to_string()).collect()
    }
}

// ---------------------------------------------------------------------------
// Construction from configuration
// ---------------------------------------------------------------------------

/// Declarative search space description as found in config documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "constructor", rename_all = "snake_case", deny_unknown_fields)]
pub enum SearchSpaceConfig {
    FromProduct {
        parameters: Vec<Parameter>,
    },
    FromCandidates {
        parameters: Vec<Parameter>,
        candidates: Vec<Row>,
        #[serde(default)]
        excluded: Vec<usize>,
    },
}

impl SearchSpaceConfig {
    pub fn build(&self) -> AssayResult<SearchSpace> {
        match self {
            Self::FromProduct { parameters } => SearchSpace::from_product(parameters.clone()),
            Self::FromCandidates {
                parameters,
                candidates,
                excluded,
            } => {
                let space = SearchSpace::from_candidates(
                    parameters.clone(),
                    &Table::from_records(candidates),
                )?;
                let discrete = space.discrete.with_excluded(excluded.iter().copied())?;
                Ok(SearchSpace {
                    discrete,
                    continuous: space.continuous,
                })
            }
        }
    }

    /// Same checks as [`SearchSpaceConfig::build`] without enumerating the
    /// discrete product.
    pub fn validate(&self) -> AssayResult<()> {
        let parameters = match self {
            Self::FromProduct { parameters } | Self::FromCandidates { parameters, .. } => {
                parameters
            }
        };
        if parameters.is_empty() {
            return Err(SearchSpaceError::Empty.into());
        }
        for param in parameters {
            param.validate()?;
        }
        check_unique_names(parameters)?;

        let discrete: Vec<Parameter> = parameters
            .iter()
            .filter(|p| p.is_discrete())
            .cloned()
            .collect();
        match self {
            Self::FromProduct { .. } => {
                if SubspaceDiscrete::product_size(&discrete).is_none() {
                    return Err(crate::validation_error!("cartesian product is too large"));
                }
            }
            Self::FromCandidates {
                candidates,
                excluded,
                ..
            } => {
                validate_candidates(&discrete, &Table::from_records(candidates))?;
                if let Some(bad) = excluded.iter().find(|&&i| i >= candidates.len()) {
                    return Err(crate::validation_error!(
                        "excluded index {bad} is out of range for {} candidates",
                        candidates.len()
                    ));
                }
            }
        }
        Ok(())
    }
}

fn check_parameters(parameters: &[Parameter], discrete: bool) -> AssayResult<()> {
    for param in parameters {
        param.validate()?;
        if param.is_discrete() != discrete {
            return Err(SearchSpaceError::InvalidParameter {
                parameter: param.name().to_string(),
                message: if discrete {
                    "continuous parameter in discrete subspace".into()
                } else {
                    "discrete parameter in continuous subspace".into()
                },
            }
            .into());
        }
    }
    check_unique_names(parameters)
}

fn check_unique_names(parameters: &[Parameter]) -> AssayResult<()> {
    let mut seen = HashSet::new();
    for param in parameters {
        if !seen.insert(param.name()) {
            return Err(SearchSpaceError::DuplicateParameter {
                name: param.name().to_string(),
            }
            .into());
        }
    }
    Ok(())
}

fn validate_candidates(parameters: &[Parameter], candidates: &Table) -> AssayResult<()> {
    for param in parameters {
        let mut cells = candidates
            .column(param.name())
            .ok_or_else(|| SearchSpaceError::InvalidParameter {
                parameter: param.name().to_string(),
                message: "missing from candidate table".into(),
            })?;
        if let Some(row) = cells.position(|c| !param.is_in_range(c)) {
            return Err(SearchSpaceError::InvalidCandidate {
                row,
                parameter: param.name().to_string(),
            }
            .into());
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Annotated view for a single recommend call
// ---------------------------------------------------------------------------

/// Read-only pairing of a search space with the campaign's candidate ledger.
#[derive(Debug, Clone, Copy)]
pub struct AnnotatedSearchSpace<'a> {
    searchspace: &'a SearchSpace,
    metadata: &'a SearchSpaceMetadata,
}

impl<'a> AnnotatedSearchSpace<'a> {
    pub fn new(searchspace: &'a SearchSpace, metadata: &'a SearchSpaceMetadata) -> Self {
        Self {
            searchspace,
            metadata,
        }
    }

    pub fn searchspace(&self) -> &'a SearchSpace {
        self.searchspace
    }

    pub fn metadata(&self) -> &'a SearchSpaceMetadata {
        self.metadata
    }

    pub fn discrete(&self) -> &'a SubspaceDiscrete {
        &self.searchspace.discrete
    }

    pub fn continuous(&self) -> &'a SubspaceContinuous {
        &self.searchspace.continuous
    }

    pub fn space_type(&self) -> SearchSpaceType {
        self.searchspace.space_type()
    }

    pub fn flags(&self, index: usize) -> CandidateFlags {
        self.metadata.get(index).unwrap_or_default()
    }

    /// Discrete indices a recommender may propose. Excluded candidates are
    /// always dropped; recommended-but-unmeasured and measured candidates
    /// are dropped unless the respective flag allows them.
    pub fn candidate_indices(&self, allow_repeated: bool, allow_measured: bool) -> Vec<usize> {
        self.discrete()
            .exp_rep()
            .index()
            .iter()
            .copied()
            .filter(|&idx| {
                let flags = self.flags(idx);
                if flags.excluded {
                    return false;
                }
                if !allow_repeated && flags.recommended && !flags.measured {
                    return false;
                }
                allow_measured || !flags.measured
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_params() -> Vec<Parameter> {
        vec![
            Parameter::numerical_discrete("x", vec![1.0, 2.0, 3.0], 0.1).unwrap(),
            Parameter::categorical("y", ["a", "b"]).unwrap(),
        ]
    }

    #[test]
    fn product_enumerates_all_combinations() {
        let space = SearchSpace::from_product(grid_params()).unwrap();
        assert_eq!(space.space_type(), SearchSpaceType::Discrete);
        assert_eq!(space.discrete().len(), 6);
        assert_eq!(space.discrete().exp_rep().index(), &[0, 1, 2, 3, 4, 5]);
        assert_eq!(space.discrete().exp_rep().get(1, "y"), Some(&Cell::from("b")));
        assert_eq!(SubspaceDiscrete::product_size(&grid_params()), Some(6));
    }

    #[test]
    fn hybrid_space_splits_parameters() {
        let mut params = grid_params();
        params.push(Parameter::numerical_continuous("temp", 20.0, 80.0).unwrap());
        let space = SearchSpace::from_product(params).unwrap();
        assert_eq!(space.space_type(), SearchSpaceType::Hybrid);
        assert_eq!(space.parameter_names(), vec!["x", "y", "temp"]);

        let continuous = SearchSpace::from_product(vec![
            Parameter::numerical_continuous("temp", 20.0, 80.0).unwrap(),
        ])
        .unwrap();
        assert_eq!(continuous.space_type(), SearchSpaceType::Continuous);
        assert!(!continuous.has_discrete_part());
    }

    #[test]
    fn duplicate_and_empty_spaces_are_rejected() {
        let dup = vec![
            Parameter::categorical("y", ["a", "b"]).unwrap(),
            Parameter::numerical_continuous("y", 0.0, 1.0).unwrap(),
        ];
        assert!(SearchSpace::from_product(dup).is_err());
        assert!(SearchSpace::from_product(Vec::new()).is_err());
    }

    #[test]
    fn continuous_samples_stay_in_bounds() {
        use rand::SeedableRng;
        let sub = SubspaceContinuous::new(vec![
            Parameter::numerical_continuous("temp", 20.0, 80.0).unwrap(),
        ])
        .unwrap();
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
        let samples = sub.sample_uniform(25, &mut rng).unwrap();
        assert_eq!(samples.len(), 25);
        for cell in samples.column("temp").unwrap() {
            let v = cell.as_f64().unwrap();
            assert!((20.0..=80.0).contains(&v));
        }
    }

    #[test]
    fn candidates_must_be_in_range() {
        let params = grid_params();
        let mut ok = Table::new(["x", "y", "note"]);
        ok.push_row(0, vec![Cell::Float(1.0), Cell::from("a"), Cell::from("n")])
            .unwrap();
        let space = SearchSpace::from_candidates(params.clone(), &ok).unwrap();
        assert_eq!(space.discrete().exp_rep().columns(), &["x", "y"]);

        let mut bad = Table::new(["x", "y"]);
        bad.push_row(0, vec![Cell::Float(5.0), Cell::from("a")]).unwrap();
        assert!(SearchSpace::from_candidates(params, &bad).is_err());
    }

    #[test]
    fn config_validation_matches_build() {
        let json = r#"{
            "constructor": "from_candidates",
            "parameters": [{"type": "CategoricalParameter", "name": "y", "values": ["a", "b"]}],
            "candidates": [{"y": "a"}, {"y": "b"}],
            "excluded": [1]
        }"#;
        let config: SearchSpaceConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();
        let space = config.build().unwrap();
        assert!(space.discrete().is_excluded_by_default(1));

        let bad = r#"{"constructor": "from_product", "parameters": [], "extra": true}"#;
        assert!(serde_json::from_str::<SearchSpaceConfig>(bad).is_err());

        let out_of_range = SearchSpaceConfig::FromCandidates {
            parameters: vec![Parameter::categorical("y", ["a", "b"]).unwrap()],
            candidates: vec![Row::from([("y".to_string(), Cell::from("c"))])],
            excluded: Vec::new(),
        };
        assert!(out_of_range.validate().is_err());
        assert!(out_of_range.build().is_err());
    }

    #[test]
    fn annotated_view_filters_by_policy() {
        let space = SearchSpace::from_product(grid_params()).unwrap();
        let mut ledger = SearchSpaceMetadata::from_discrete(space.discrete());
        ledger.set_excluded(0, true);
        ledger.mark_recommended(1);
        ledger.mark_recommended(2);
        ledger.mark_measured(2);
        ledger.mark_measured(3);

        let view = AnnotatedSearchSpace::new(&space, &ledger);
        assert_eq!(view.candidate_indices(false, false), vec![4, 5]);
        assert_eq!(view.candidate_indices(true, false), vec![1, 4, 5]);
        assert_eq!(view.candidate_indices(false, true), vec![2, 3, 4, 5]);
        assert_eq!(view.candidate_indices(true, true), vec![1, 2, 3, 4, 5]);
    }
}
