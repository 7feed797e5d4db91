//! # assay-recommend
//!
//! Recommendation strategies for Assay campaigns.
//!
//! Provides the [`Recommender`] interface, random and surrogate-based
//! recommenders, Gaussian-process and mean surrogates, and meta recommenders
//! that switch between strategies as measurements accumulate.

mod bayesian;
mod meta;
mod random;
mod recommender;
mod surrogate;

pub use bayesian::{Acquisition, BayesianRecommender};
pub use meta::{
    PureRecommender, RecommenderKind, SequenceMode, SequentialMetaRecommender,
    TwoPhaseMetaRecommender,
};
pub use random::RandomRecommender;
pub use recommender::{Recommender, SurrogateProvider};
pub use surrogate::{
    GaussianProcess, MeanSurrogate, Posterior, PosteriorModel, Surrogate, SurrogateConfig,
};
