use serde::{Deserialize, Serialize};
use tracing::debug;

use assay_types::{AnnotatedSearchSpace, AssayResult, Objective, SearchSpaceType, Table};

use crate::recommender::{assemble, draw, eligible_candidates, rng_for_call, Recommender};

// ---- Random recommender ----

/// Uniform sampling over the eligible candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RandomRecommender {
    /// Base seed; `None` draws from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Allow candidates that were already recommended.
    #[serde(default)]
    pub allow_repeated_recommendations: bool,
    /// Allow candidates that were already measured.
    #[serde(default)]
    pub allow_recommending_already_measured: bool,
    /// Completed calls; offsets the seed so repeated calls differ.
    #[serde(default)]
    calls: u64,
}

impl RandomRecommender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }
}

impl Recommender for RandomRecommender {
    fn recommend(
        &mut self,
        batch_size: usize,
        searchspace: AnnotatedSearchSpace<'_>,
        _objective: Option<&Objective>,
        _measurements: &Table,
        pending_experiments: Option<&Table>,
    ) -> AssayResult<Table> {
        if let Some(pending) = pending_experiments {
            debug!(rows = pending.len(), "random recommender ignores pending experiments");
        }

        let eligible = eligible_candidates(
            &searchspace,
            batch_size,
            self.allow_repeated_recommendations,
            self.allow_recommending_already_measured,
        )?;
        let mut rng = rng_for_call(self.seed, self.calls);
        self.calls += 1;

        let space = searchspace.searchspace();
        let picks = match space.space_type() {
            SearchSpaceType::Continuous => Vec::new(),
            _ => draw(&mut rng, &eligible, batch_size),
        };
        let samples = match space.space_type() {
            SearchSpaceType::Discrete => None,
            _ => Some(space.continuous().sample_uniform(batch_size, &mut rng)?),
        };
        assemble(space, &picks, samples.as_ref())
    }

    fn name(&self) -> &str {
        "RandomRecommender"
    }
}
