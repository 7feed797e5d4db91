//! The recommender interface and helpers shared by its implementations.

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

use assay_types::{
    internal_error, AnnotatedSearchSpace, AssayResult, Objective, RecommenderError, SearchSpace,
    SearchSpaceType, Table,
};

use crate::surrogate::Surrogate;

/// A strategy producing the next batch of experiments.
pub trait Recommender: Send + Sync {
    /// Propose `batch_size` candidates in experimental representation.
    ///
    /// Rows carry the discrete candidate index for discrete and hybrid
    /// spaces and `0..batch_size` for purely continuous ones.
    fn recommend(
        &mut self,
        batch_size: usize,
        searchspace: AnnotatedSearchSpace<'_>,
        objective: Option<&Objective>,
        measurements: &Table,
        pending_experiments: Option<&Table>,
    ) -> AssayResult<Table>;

    /// Human-readable strategy name.
    fn name(&self) -> &str;

    /// The sub-recommender currently in charge. Only meta recommenders
    /// return `Some`.
    fn current_recommender(&self) -> Option<&dyn Recommender> {
        None
    }

    /// Access to surrogate fitting, for recommenders built on a model.
    fn surrogate_provider(&self) -> Option<&dyn SurrogateProvider> {
        None
    }
}

/// Capability of fitting a surrogate model to campaign data.
pub trait SurrogateProvider {
    fn get_surrogate(
        &self,
        searchspace: &SearchSpace,
        objective: &Objective,
        measurements: &Table,
    ) -> AssayResult<Box<dyn Surrogate>>;
}

/// Seeded RNG for the `call`-th invocation, or an entropy-seeded one.
pub(crate) fn rng_for_call(seed: Option<u64>, call: u64) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed.wrapping_add(call)),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Eligible discrete candidates, checked against the batch size.
///
/// Purely discrete spaces need `batch_size` distinct candidates; hybrid
/// spaces may reuse a candidate with different continuous values.
pub(crate) fn eligible_candidates(
    searchspace: &AnnotatedSearchSpace<'_>,
    batch_size: usize,
    allow_repeated: bool,
    allow_measured: bool,
) -> AssayResult<Vec<usize>> {
    let eligible = searchspace.candidate_indices(allow_repeated, allow_measured);
    let required = match searchspace.space_type() {
        SearchSpaceType::Discrete => batch_size,
        SearchSpaceType::Hybrid => 1,
        SearchSpaceType::Continuous => 0,
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

/// Draw `count` entries of `pool`, without replacement while the pool is
/// large enough and with replacement afterwards.
pub(crate) fn draw<R: Rng>(rng: &mut R, pool: &[usize], count: usize) -> Vec<usize> {
    if pool.is_empty() {
        return Vec::new();
    }
    if count <= pool.len() {
        return index::sample(rng, pool.len(), count)
            .into_iter()
            .map(|i| pool[i])
            .collect();
    }
    (0..count)
        .map(|_| pool[rng.gen_range(0..pool.len())])
        .collect()
}

/// Join discrete picks and continuous samples into one table over all
/// search space parameters.
pub(crate) fn assemble(
    space: &SearchSpace,
    picks: &[usize],
    continuous: Option<&Table>,
) -> AssayResult<Table> {
    match space.space_type() {
        SearchSpaceType::Discrete => Ok(space.discrete().exp_rep().select(picks)),
        SearchSpaceType::Continuous => {
            let mut table = continuous
                .cloned()
                .ok_or_else(|| internal_error!("continuous samples missing"))?;
            table.reset_index();
            Ok(table)
        }
        SearchSpaceType::Hybrid => {
            let continuous =
                continuous.ok_or_else(|| internal_error!("continuous samples missing"))?;
            let exp_rep = space.discrete().exp_rep();
            let positions: HashMap<usize, usize> = exp_rep
                .index()
                .iter()
                .enumerate()
                .map(|(pos, idx)| (*idx, pos))
                .collect();

            let mut out = Table::new(space.parameter_names());
            for (row, idx) in picks.iter().enumerate() {
                let discrete = positions
                    .get(idx)
                    .and_then(|pos| exp_rep.row_values(*pos))
                    .ok_or_else(|| internal_error!("unknown candidate index {idx}"))?;
                let sampled = continuous
                    .row_values(row)
                    .ok_or_else(|| internal_error!("missing continuous sample {row}"))?;
                let values = discrete.iter().chain(sampled).cloned().collect();
                out.push_row(*idx, values)?;
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assay_types::{Parameter, SearchSpaceMetadata};

    fn hybrid_space() -> SearchSpace {
        SearchSpace::from_product(vec![
            Parameter::categorical("y", ["a", "b"]).unwrap(),
            Parameter::numerical_continuous("t", 0.0, 1.0).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn draw_without_then_with_replacement() {
        let mut rng = rng_for_call(Some(1), 0);
        let mut picked = draw(&mut rng, &[3, 5, 7], 3);
        picked.sort_unstable();
        assert_eq!(picked, vec![3, 5, 7]);

        let many = draw(&mut rng, &[3, 5], 10);
        assert_eq!(many.len(), 10);
        assert!(many.iter().all(|i| *i == 3 || *i == 5));
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let a: u64 = rng_for_call(Some(9), 2).gen();
        let b: u64 = rng_for_call(Some(9), 2).gen();
        assert_eq!(a, b);
    }

    #[test]
    fn hybrid_assembly_carries_discrete_index() {
        let space = hybrid_space();
        let mut rng = rng_for_call(Some(0), 0);
        let samples = space.continuous().sample_uniform(2, &mut rng).unwrap();
        let table = assemble(&space, &[1, 1], Some(&samples)).unwrap();
        assert_eq!(table.columns(), &["y", "t"]);
        assert_eq!(table.index(), &[1, 1]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn discrete_shortage_is_reported() {
        let space = SearchSpace::from_product(vec![
            Parameter::categorical("y", ["a", "b"]).unwrap(),
        ])
        .unwrap();
        let ledger = SearchSpaceMetadata::from_discrete(space.discrete());
        let view = AnnotatedSearchSpace::new(&space, &ledger);
        let err = eligible_candidates(&view, 3, false, false).unwrap_err();
        assert!(err.to_string().contains("only 2 candidates"));
    }
}
