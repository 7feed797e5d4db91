//! Meta recommenders that delegate to one of several pure recommenders.

use serde::{Deserialize, Serialize};
use tracing::info;

use assay_types::{
    validation_error, AnnotatedSearchSpace, AssayResult, Objective, RecommenderError, Table,
};

use crate::bayesian::BayesianRecommender;
use crate::random::RandomRecommender;
use crate::recommender::{Recommender, SurrogateProvider};

/// A recommender that produces candidates itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PureRecommender {
    #[serde(rename = "RandomRecommender")]
    Random(RandomRecommender),
    #[serde(rename = "BayesianRecommender")]
    Bayesian(BayesianRecommender),
}

impl From<RandomRecommender> for PureRecommender {
    fn from(rec: RandomRecommender) -> Self {
        Self::Random(rec)
    }
}

impl From<BayesianRecommender> for PureRecommender {
    fn from(rec: BayesianRecommender) -> Self {
        Self::Bayesian(rec)
    }
}

impl PureRecommender {
    fn inner(&self) -> &dyn Recommender {
        match self {
            Self::Random(r) => r,
            Self::Bayesian(r) => r,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Recommender {
        match self {
            Self::Random(r) => r,
            Self::Bayesian(r) => r,
        }
    }
}

impl Recommender for PureRecommender {
    fn recommend(
        &mut self,
        batch_size: usize,
        searchspace: AnnotatedSearchSpace<'_>,
        objective: Option<&Objective>,
        measurements: &Table,
        pending_experiments: Option<&Table>,
    ) -> AssayResult<Table> {
        self.inner_mut().recommend(
            batch_size,
            searchspace,
            objective,
            measurements,
            pending_experiments,
        )
    }

    fn name(&self) -> &str {
        self.inner().name()
    }

    fn surrogate_provider(&self) -> Option<&dyn SurrogateProvider> {
        self.inner().surrogate_provider()
    }
}

// ---- Two-phase ----

fn default_switch_after() -> usize {
    1
}

/// Runs `initial_recommender` until `switch_after` measurements exist, then
/// `recommender`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TwoPhaseMetaRecommender {
    /// Used while fewer than `switch_after` measurements exist.
    #[serde(default = "default_initial")]
    pub initial_recommender: PureRecommender,
    /// Used from `switch_after` measurements on.
    #[serde(default = "default_main")]
    pub recommender: PureRecommender,
    #[serde(default = "default_switch_after")]
    pub switch_after: usize,
    /// Stay on `recommender` once switched, even if measurements drop
    /// below the threshold again.
    #[serde(default)]
    pub remain_switched: bool,
    #[serde(default)]
    has_switched: bool,
    /// Whether the last call selected `recommender`.
    #[serde(default)]
    in_second_phase: bool,
}

fn default_initial() -> PureRecommender {
    RandomRecommender::default().into()
}

fn default_main() -> PureRecommender {
    BayesianRecommender::default().into()
}

impl Default for TwoPhaseMetaRecommender {
    fn default() -> Self {
        Self::new(default_initial(), default_main())
    }
}

impl TwoPhaseMetaRecommender {
    pub fn new(initial_recommender: PureRecommender, recommender: PureRecommender) -> Self {
        Self {
            initial_recommender,
            recommender,
            switch_after: default_switch_after(),
            remain_switched: false,
            has_switched: false,
            in_second_phase: false,
        }
    }

    fn select(&mut self, n_measurements: usize) -> &mut PureRecommender {
        let second =
            n_measurements >= self.switch_after || (self.remain_switched && self.has_switched);
        if second && !self.has_switched {
            info!(
                from = self.initial_recommender.name(),
                to = self.recommender.name(),
                n_measurements,
                "switching recommender"
            );
            self.has_switched = true;
        }
        self.in_second_phase = second;
        if second {
            &mut self.recommender
        } else {
            &mut self.initial_recommender
        }
    }
}

impl Recommender for TwoPhaseMetaRecommender {
    fn recommend(
        &mut self,
        batch_size: usize,
        searchspace: AnnotatedSearchSpace<'_>,
        objective: Option<&Objective>,
        measurements: &Table,
        pending_experiments: Option<&Table>,
    ) -> AssayResult<Table> {
        self.select(measurements.len()).recommend(
            batch_size,
            searchspace,
            objective,
            measurements,
            pending_experiments,
        )
    }

    fn name(&self) -> &str {
        "TwoPhaseMetaRecommender"
    }

    fn current_recommender(&self) -> Option<&dyn Recommender> {
        if self.in_second_phase {
            Some(&self.recommender)
        } else {
            Some(&self.initial_recommender)
        }
    }

    fn surrogate_provider(&self) -> Option<&dyn SurrogateProvider> {
        self.current_recommender()?.surrogate_provider()
    }
}

// ---- Sequential ----

/// What happens once every recommender in a sequence has been used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceMode {
    #[default]
    Raise,
    ReuseLast,
    Cyclic,
}

/// Walks through a list of recommenders, moving on whenever new
/// measurements arrived since the previous call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SequentialMetaRecommender {
    /// Used in order, one step per batch of new measurements.
    pub recommenders: Vec<PureRecommender>,
    /// What happens after the last recommender.
    #[serde(default)]
    pub mode: SequenceMode,
    #[serde(default)]
    step: usize,
    /// Measurement count seen by the previous call.
    #[serde(default)]
    last_seen: Option<usize>,
}

impl SequentialMetaRecommender {
    pub fn new(recommenders: Vec<PureRecommender>, mode: SequenceMode) -> Self {
        Self {
            recommenders,
            mode,
            step: 0,
            last_seen: None,
        }
    }

    fn position(&self, step: usize) -> AssayResult<usize> {
        let len = self.recommenders.len();
        if len == 0 {
            return Err(validation_error!("sequential recommender has no recommenders"));
        }
        match self.mode {
            SequenceMode::Raise if step >= len => {
                Err(RecommenderError::SequenceExhausted { used: len }.into())
            }
            SequenceMode::Raise => Ok(step),
            SequenceMode::ReuseLast => Ok(step.min(len - 1)),
            SequenceMode::Cyclic => Ok(step % len),
        }
    }
}

impl Recommender for SequentialMetaRecommender {
    fn recommend(
        &mut self,
        batch_size: usize,
        searchspace: AnnotatedSearchSpace<'_>,
        objective: Option<&Objective>,
        measurements: &Table,
        pending_experiments: Option<&Table>,
    ) -> AssayResult<Table> {
        let n = measurements.len();
        let step = match self.last_seen {
            Some(seen) if n > seen => self.step + 1,
            _ => self.step,
        };
        let pos = self.position(step)?;
        if step != self.step {
            info!(step, recommender = self.recommenders[pos].name(), "advancing sequence");
        }
        self.step = step;
        self.last_seen = Some(n);
        self.recommenders[pos].recommend(
            batch_size,
            searchspace,
            objective,
            measurements,
            pending_experiments,
        )
    }

    fn name(&self) -> &str {
        "SequentialMetaRecommender"
    }

    fn current_recommender(&self) -> Option<&dyn Recommender> {
        let pos = self.position(self.step).ok()?;
        Some(&self.recommenders[pos])
    }

    fn surrogate_provider(&self) -> Option<&dyn SurrogateProvider> {
        self.current_recommender()?.surrogate_provider()
    }
}

// ---- Serializable union ----

/// Any recommender a campaign can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RecommenderKind {
    #[serde(rename = "RandomRecommender")]
    Random(RandomRecommender),
    #[serde(rename = "BayesianRecommender")]
    Bayesian(BayesianRecommender),
    #[serde(rename = "TwoPhaseMetaRecommender")]
    TwoPhase(TwoPhaseMetaRecommender),
    #[serde(rename = "SequentialMetaRecommender")]
    Sequential(SequentialMetaRecommender),
}

impl Default for RecommenderKind {
    fn default() -> Self {
        Self::TwoPhase(TwoPhaseMetaRecommender::default())
    }
}

impl From<PureRecommender> for RecommenderKind {
    fn from(rec: PureRecommender) -> Self {
        match rec {
            PureRecommender::Random(r) => Self::Random(r),
            PureRecommender::Bayesian(r) => Self::Bayesian(r),
        }
    }
}

impl RecommenderKind {
    fn inner(&self) -> &dyn Recommender {
        match self {
            Self::Random(r) => r,
            Self::Bayesian(r) => r,
            Self::TwoPhase(r) => r,
            Self::Sequential(r) => r,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Recommender {
        match self {
            Self::Random(r) => r,
            Self::Bayesian(r) => r,
            Self::TwoPhase(r) => r,
            Self::Sequential(r) => r,
        }
    }
}

impl Recommender for RecommenderKind {
    fn recommend(
        &mut self,
        batch_size: usize,
        searchspace: AnnotatedSearchSpace<'_>,
        objective: Option<&Objective>,
        measurements: &Table,
        pending_experiments: Option<&Table>,
    ) -> AssayResult<Table> {
        self.inner_mut().recommend(
            batch_size,
            searchspace,
            objective,
            measurements,
            pending_experiments,
        )
    }

    fn name(&self) -> &str {
        self.inner().name()
    }

    fn current_recommender(&self) -> Option<&dyn Recommender> {
        self.inner().current_recommender()
    }

    fn surrogate_provider(&self) -> Option<&dyn SurrogateProvider> {
        self.inner().surrogate_provider()
    }
}
