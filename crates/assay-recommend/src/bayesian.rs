//! Model-based recommendation: fit a surrogate, score candidates with an
//! acquisition function, keep the best.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use assay_types::{
    fuzzy_row_match, unsupported, AnnotatedSearchSpace, AssayResult, Objective, RecommenderError,
    SearchSpace, SearchSpaceType, Table,
};

use crate::recommender::{
    assemble, draw, eligible_candidates, rng_for_call, Recommender, SurrogateProvider,
};
use crate::surrogate::{Surrogate, SurrogateConfig};

/// How candidates are ranked from the surrogate's prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", deny_unknown_fields)]
pub enum Acquisition {
    /// `mean + sqrt(beta) * std`.
    UpperConfidenceBound {
        #[serde(default = "default_beta")]
        beta: f64,
    },
    PosteriorMean {},
}

fn default_beta() -> f64 {
    2.0
}

impl Default for Acquisition {
    fn default() -> Self {
        Self::UpperConfidenceBound {
            beta: default_beta(),
        }
    }
}

impl Acquisition {
    pub fn evaluate(&self, surrogate: &dyn Surrogate, candidates: &Table) -> AssayResult<Vec<f64>> {
        match self {
            Self::PosteriorMean {} => surrogate.predict(candidates),
            Self::UpperConfidenceBound { beta } => {
                let model = surrogate.as_posterior().ok_or_else(|| {
                    unsupported!(
                        "UpperConfidenceBound needs a posterior but {} does not provide one",
                        surrogate.name()
                    )
                })?;
                let posterior = model.posterior(candidates)?;
                let scale = beta.max(0.0).sqrt();
                Ok(posterior
                    .mean
                    .iter()
                    .zip(posterior.std_dev())
                    .map(|(m, s)| m + scale * s)
                    .collect())
            }
        }
    }
}

fn default_raw_samples() -> usize {
    256
}

/// Surrogate-driven recommender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BayesianRecommender {
    /// Model fitted on the measurement log at every call.
    #[serde(default)]
    pub surrogate: SurrogateConfig,
    /// Scoring rule applied to the surrogate's predictions.
    #[serde(default)]
    pub acquisition: Acquisition,
    /// Continuous samples scored per call.
    #[serde(default = "default_raw_samples")]
    pub n_raw_samples: usize,
    /// Seed for the raw candidate samples of continuous and hybrid spaces.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub allow_repeated_recommendations: bool,
    #[serde(default)]
    pub allow_recommending_already_measured: bool,
    #[serde(default)]
    calls: u64,
}

impl Default for BayesianRecommender {
    fn default() -> Self {
        Self {
            surrogate: SurrogateConfig::default(),
            acquisition: Acquisition::default(),
            n_raw_samples: default_raw_samples(),
            seed: None,
            allow_repeated_recommendations: false,
            allow_recommending_already_measured: false,
            calls: 0,
        }
    }
}

impl BayesianRecommender {
    pub fn new(surrogate: SurrogateConfig, acquisition: Acquisition) -> Self {
        Self {
            surrogate,
            acquisition,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Eligible discrete indices minus those matching pending experiments.
    fn eligible(
        &self,
        searchspace: &AnnotatedSearchSpace<'_>,
        batch_size: usize,
        pending_experiments: Option<&Table>,
    ) -> AssayResult<Vec<usize>> {
        let mut eligible = eligible_candidates(
            searchspace,
            batch_size,
            self.allow_repeated_recommendations,
            self.allow_recommending_already_measured,
        )?;
        let Some(pending) = pending_experiments.filter(|p| !p.is_empty()) else {
            return Ok(eligible);
        };
        if searchspace.space_type() == SearchSpaceType::Continuous {
            return Ok(eligible);
        }

        let discrete = searchspace.discrete();
        let taken = fuzzy_row_match(discrete.exp_rep(), pending, discrete.parameters(), true);
        eligible.retain(|idx| taken.binary_search(idx).is_err());
        debug!(dropped = taken.len(), "excluding candidates with pending experiments");

        let required = match searchspace.space_type() {
            SearchSpaceType::Discrete => batch_size,
            _ => 1,
        };
        if eligible.len() < required {
            return Err(RecommenderError::NotEnoughCandidates {
                requested: batch_size,
                available: eligible.len(),
            }
            .into());
        }
        Ok(eligible)
    }

    fn candidate_table(
        &self,
        space: &SearchSpace,
        eligible: &[usize],
        batch_size: usize,
    ) -> AssayResult<Table> {
        let n_raw = self.n_raw_samples.max(batch_size);
        let mut rng = rng_for_call(self.seed, self.calls);
        match space.space_type() {
            SearchSpaceType::Discrete => Ok(space.discrete().exp_rep().select(eligible)),
            SearchSpaceType::Continuous => {
                let samples = space.continuous().sample_uniform(n_raw, &mut rng)?;
                assemble(space, &[], Some(&samples))
            }
            SearchSpaceType::Hybrid => {
                let picks = draw(&mut rng, eligible, n_raw);
                let samples = space.continuous().sample_uniform(n_raw, &mut rng)?;
                assemble(space, &picks, Some(&samples))
            }
        }
    }
}

impl SurrogateProvider for BayesianRecommender {
    fn get_surrogate(
        &self,
        searchspace: &SearchSpace,
        objective: &Objective,
        measurements: &Table,
    ) -> AssayResult<Box<dyn Surrogate>> {
        self.surrogate.fit(searchspace, objective, measurements)
    }
}

impl Recommender for BayesianRecommender {
    fn recommend(
        &mut self,
        batch_size: usize,
        searchspace: AnnotatedSearchSpace<'_>,
        objective: Option<&Objective>,
        measurements: &Table,
        pending_experiments: Option<&Table>,
    ) -> AssayResult<Table> {
        let objective = objective.ok_or_else(|| RecommenderError::MissingObjective {
            recommender: self.name().to_string(),
        })?;
        if measurements.is_empty() {
            return Err(RecommenderError::NoMeasurements {
                recommender: self.name().to_string(),
            }
            .into());
        }

        let eligible = self.eligible(&searchspace, batch_size, pending_experiments)?;
        let space = searchspace.searchspace();
        let surrogate = self.get_surrogate(space, objective, measurements)?;
        let candidates = self.candidate_table(space, &eligible, batch_size)?;
        self.calls += 1;

        let scores = self.acquisition.evaluate(surrogate.as_ref(), &candidates)?;
        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]));
        order.truncate(batch_size);

        info!(
            surrogate = surrogate.name(),
            candidates = candidates.len(),
            batch_size,
            "scored candidates"
        );

        let mut batch = candidates.select_positions(&order);
        if space.space_type() == SearchSpaceType::Continuous {
            batch.reset_index();
        }
        Ok(batch)
    }

    fn name(&self) -> &str {
        "BayesianRecommender"
    }

    fn surrogate_provider(&self) -> Option<&dyn SurrogateProvider> {
        Some(self)
    }
}
