//! The campaign state machine: recommend, measure, update.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use assay_recommend::{Posterior, Recommender, RecommenderKind, Surrogate};
use assay_types::{
    fuzzy_row_match, fuzzy_row_match_rows, unsupported, AnnotatedSearchSpace, AssayError,
    AssayResult, Cell, ColumnRole, NumericalTarget, Objective, Parameter, SearchSpace,
    SearchSpaceMetadata, Table,
};

use crate::log::MeasurementLog;
use crate::telemetry::{Telemetry, TelemetryLabel, TelemetryReporter};

/// Unique campaign identifier.
pub type CampaignId = Uuid;

/// An experimentation campaign over one search space.
///
/// The campaign owns the search space, the measurement log and the ledger of
/// per-candidate flags, and asks its recommender for new batches. The last
/// batch is cached until its size changes or new information arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Campaign<R = RecommenderKind> {
    id: CampaignId,
    searchspace: SearchSpace,
    #[serde(default)]
    objective: Option<Objective>,
    recommender: R,
    searchspace_metadata: SearchSpaceMetadata,
    #[serde(default)]
    measurement_log: MeasurementLog,
    #[serde(default)]
    cached_recommendation: Option<Table>,
    #[serde(default)]
    n_batches_done: usize,
    #[serde(default)]
    n_fits_done: usize,
    #[serde(skip)]
    telemetry: Telemetry,
}

impl Campaign<RecommenderKind> {
    /// Campaign with the default two-phase recommender.
    pub fn with_default_recommender(
        searchspace: SearchSpace,
        objective: Option<Objective>,
    ) -> AssayResult<Self> {
        Self::new(searchspace, objective, RecommenderKind::default())
    }
}

impl<R: Recommender> Campaign<R> {
    pub fn new(
        searchspace: SearchSpace,
        objective: Option<Objective>,
        recommender: R,
    ) -> AssayResult<Self> {
        if let Some(objective) = &objective {
            objective.validate()?;
        }
        let searchspace_metadata = SearchSpaceMetadata::from_discrete(searchspace.discrete());
        let campaign = Self {
            id: Uuid::new_v4(),
            searchspace,
            objective,
            recommender,
            searchspace_metadata,
            measurement_log: MeasurementLog::new(),
            cached_recommendation: None,
            n_batches_done: 0,
            n_fits_done: 0,
            telemetry: Telemetry::default(),
        };
        info!(
            campaign = %campaign.id,
            space = %campaign.searchspace.space_type(),
            candidates = campaign.searchspace_metadata.len(),
            recommender = campaign.recommender.name(),
            "created campaign"
        );
        Ok(campaign)
    }

    /// Route telemetry to `reporter`, gated by `ASSAY_TELEMETRY_ENABLED`.
    pub fn with_reporter(mut self, reporter: Arc<dyn TelemetryReporter>) -> Self {
        self.telemetry = Telemetry::from_env(reporter);
        self
    }

    pub fn set_telemetry(&mut self, telemetry: Telemetry) {
        self.telemetry = telemetry;
    }

    // ---- Read-only views ----

    pub fn id(&self) -> CampaignId {
        self.id
    }

    pub fn searchspace(&self) -> &SearchSpace {
        &self.searchspace
    }

    pub fn objective(&self) -> Option<&Objective> {
        self.objective.as_ref()
    }

    pub fn recommender(&self) -> &R {
        &self.recommender
    }

    /// Measurement log with `BatchNr` and `FitNr` columns.
    pub fn measurements(&self) -> AssayResult<Table> {
        self.measurement_log.to_table()
    }

    pub fn measurement_log(&self) -> &MeasurementLog {
        &self.measurement_log
    }

    pub fn parameters(&self) -> Vec<&Parameter> {
        self.searchspace.parameters().collect()
    }

    /// Objective targets; empty without an objective.
    pub fn targets(&self) -> &[NumericalTarget] {
        self.objective
            .as_ref()
            .map(Objective::targets)
            .unwrap_or_default()
    }

    pub fn n_batches_done(&self) -> usize {
        self.n_batches_done
    }

    pub fn n_fits_done(&self) -> usize {
        self.n_fits_done
    }

    pub fn searchspace_metadata(&self) -> &SearchSpaceMetadata {
        &self.searchspace_metadata
    }

    pub fn cached_recommendation(&self) -> Option<&Table> {
        self.cached_recommendation.as_ref()
    }

    // ---- Core cycle ----

    /// Propose the next `batch_size` experiments.
    ///
    /// A cached batch of the same size is returned unchanged. Non-empty
    /// `pending_experiments` always force a fresh recommendation.
    pub fn recommend(
        &mut self,
        batch_size: usize,
        pending_experiments: Option<&Table>,
    ) -> AssayResult<Table> {
        if batch_size < 1 {
            return Err(AssayError::InvalidArgument(format!(
                "batch_size must be at least 1, got {batch_size}"
            )));
        }

        let pending = pending_experiments.filter(|p| !p.is_empty());
        if pending.is_some() {
            self.cached_recommendation = None;
        }
        if let Some(cached) = &self.cached_recommendation {
            if cached.len() == batch_size {
                debug!(campaign = %self.id, batch_size, "returning cached recommendation");
                return Ok(cached.clone());
            }
        }

        if self.measurement_log.has_unfit() {
            self.n_fits_done += 1;
            let stamped = self.measurement_log.stamp_unfit(self.n_fits_done);
            info!(
                campaign = %self.id,
                fit_nr = self.n_fits_done,
                rows = stamped,
                "stamped fit number"
            );
        }

        let measurements = self.measurement_log.to_table()?;
        let annotated = AnnotatedSearchSpace::new(&self.searchspace, &self.searchspace_metadata);
        let batch = self.recommender.recommend(
            batch_size,
            annotated,
            self.objective.as_ref(),
            &measurements,
            pending,
        )?;

        if self.searchspace.has_discrete_part() {
            for idx in batch.index() {
                if !self.searchspace_metadata.mark_recommended(*idx) {
                    warn!(
                        campaign = %self.id,
                        index = idx,
                        "recommended index has no ledger entry"
                    );
                }
            }
        }
        info!(
            campaign = %self.id,
            batch_size,
            recommender = self.recommender.name(),
            "recommended batch"
        );
        self.cached_recommendation = Some(batch.clone());

        self.telemetry.record(self.id, TelemetryLabel::CountRecommend, 1.0);
        self.telemetry.record(self.id, TelemetryLabel::BatchSize, batch_size as f64);
        Ok(batch)
    }

    /// Record measured rows.
    ///
    /// Every target and parameter column is validated before anything is
    /// changed. Rows are matched back to discrete candidates, which are then
    /// flagged as measured. `data` is not modified.
    pub fn add_measurements(
        &mut self,
        data: &Table,
        numerical_measurements_must_be_within_tolerance: bool,
    ) -> AssayResult<()> {
        let previous_batch = self.cached_recommendation.take();

        self.validate_measurements(data)?;

        self.n_batches_done += 1;
        self.measurement_log.append(data, self.n_batches_done);

        if self.searchspace.has_discrete_part() {
            let discrete = self.searchspace.discrete();
            let matched = fuzzy_row_match(
                discrete.exp_rep(),
                data,
                discrete.parameters(),
                numerical_measurements_must_be_within_tolerance,
            );
            for idx in &matched {
                self.searchspace_metadata.mark_measured(*idx);
            }
            debug!(
                campaign = %self.id,
                matched = matched.len(),
                "matched measurements to candidates"
            );
        }
        info!(
            campaign = %self.id,
            batch_nr = self.n_batches_done,
            rows = data.len(),
            "added measurements"
        );

        self.telemetry.record(self.id, TelemetryLabel::CountAddResults, 1.0);
        if let Some(previous) = previous_batch.filter(|_| self.telemetry.is_enabled()) {
            if !data.is_empty() {
                let parameters: Vec<Parameter> = self.searchspace.parameters().cloned().collect();
                let hits = fuzzy_row_match_rows(
                    &previous,
                    data,
                    &parameters,
                    numerical_measurements_must_be_within_tolerance,
                )
                .iter()
                .filter(|m| !m.is_empty())
                .count();
                let percentage = 100.0 * hits as f64 / data.len() as f64;
                self.telemetry.record(
                    self.id,
                    TelemetryLabel::RecommendedMeasurementPercentage,
                    percentage,
                );
            }
        }
        Ok(())
    }

    fn validate_measurements(&self, data: &Table) -> AssayResult<()> {
        for target in self.targets() {
            check_column(data, &target.name, ColumnRole::Target, true)?;
        }
        for param in self.searchspace.parameters() {
            check_column(data, param.name(), ColumnRole::Parameter, param.is_numerical())?;
        }
        Ok(())
    }

    /// Include or exclude discrete candidates.
    ///
    /// The affected rows are those equal to at least one `filter` row on all
    /// filter columns, or their complement when `anti` is set. With `dry_run`
    /// nothing changes. Returns the affected rows with their candidate
    /// indices.
    pub fn toggle_discrete_candidates(
        &mut self,
        filter: &Table,
        exclude: bool,
        anti: bool,
        dry_run: bool,
    ) -> AssayResult<Table> {
        let discrete = self.searchspace.discrete();
        if filter.columns().is_empty() {
            return Err(AssayError::InvalidArgument(
                "filter must name at least one discrete parameter".into(),
            ));
        }
        let exp_rep = discrete.exp_rep();
        let mut pairs = Vec::with_capacity(filter.columns().len());
        for (filter_pos, column) in filter.columns().iter().enumerate() {
            let is_discrete = discrete.parameters().iter().any(|p| p.name() == column);
            let rep_pos = exp_rep.column_position(column).filter(|_| is_discrete).ok_or_else(|| {
                AssayError::InvalidArgument(format!(
                    "filter column '{column}' is not a discrete parameter"
                ))
            })?;
            pairs.push((filter_pos, rep_pos));
        }

        let subset = exp_rep.filter(|_, values| {
            let hit = filter.rows().any(|(_, wanted)| {
                pairs
                    .iter()
                    .all(|(f, r)| values[*r].loosely_equals(&wanted[*f]))
            });
            hit != anti
        });

        if dry_run {
            debug!(campaign = %self.id, rows = subset.len(), "toggle dry run");
            return Ok(subset);
        }
        for idx in subset.index() {
            self.searchspace_metadata.set_excluded(*idx, exclude);
        }
        info!(
            campaign = %self.id,
            rows = subset.len(),
            exclude,
            anti,
            "toggled discrete candidates"
        );
        Ok(subset)
    }

    // ---- Surrogate access ----

    /// Fit the surrogate of the active recommender on all measurements.
    pub fn get_surrogate(&self) -> AssayResult<Box<dyn Surrogate>> {
        let objective = self
            .objective
            .as_ref()
            .ok_or_else(|| unsupported!("a surrogate needs an objective"))?;
        let active: &dyn Recommender = self
            .recommender
            .current_recommender()
            .unwrap_or(&self.recommender);
        let provider = active.surrogate_provider().ok_or_else(|| {
            unsupported!("{} does not provide a surrogate model", active.name())
        })?;
        provider.get_surrogate(&self.searchspace, objective, &self.measurement_log.to_table()?)
    }

    /// Posterior mean and variance of the fitted surrogate at `candidates`.
    pub fn posterior(&self, candidates: &Table) -> AssayResult<Posterior> {
        let surrogate = self.get_surrogate()?;
        let model = surrogate.as_posterior().ok_or_else(|| {
            unsupported!("{} does not provide a posterior", surrogate.name())
        })?;
        model.posterior(candidates)
    }
}

fn check_column(data: &Table, column: &str, role: ColumnRole, numeric: bool) -> AssayResult<()> {
    let missing = || AssayError::MissingValue {
        column: column.to_string(),
        role,
    };
    let cells: Vec<&Cell> = data.column(column).ok_or_else(missing)?.collect();
    if cells.iter().any(|c| c.is_missing()) {
        return Err(missing());
    }
    // Non-finite values would not survive a JSON round trip.
    if numeric && cells.iter().any(|c| !c.as_f64().is_some_and(f64::is_finite)) {
        return Err(AssayError::NonNumericValue {
            column: column.to_string(),
            role,
        });
    }
    Ok(())
}

impl<R: PartialEq> PartialEq for Campaign<R> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.searchspace == other.searchspace
            && self.objective == other.objective
            && self.recommender == other.recommender
            && self.searchspace_metadata == other.searchspace_metadata
            && self.measurement_log == other.measurement_log
            && self.cached_recommendation == other.cached_recommendation
            && self.n_batches_done == other.n_batches_done
            && self.n_fits_done == other.n_fits_done
    }
}

impl<R: Recommender> fmt::Display for Campaign<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ledger = &self.searchspace_metadata;
        writeln!(f, "Campaign {}", self.id)?;
        writeln!(f, "  search space:  {}", self.searchspace.space_type())?;
        writeln!(
            f,
            "  objective:     {}",
            self.objective.as_ref().map_or("none", Objective::name)
        )?;
        writeln!(f, "  recommender:   {}", self.recommender.name())?;
        writeln!(f, "  candidates:    {}", ledger.len())?;
        writeln!(f, "    recommended: {}", ledger.count_recommended())?;
        writeln!(f, "    measured:    {}", ledger.count_measured())?;
        writeln!(f, "    excluded:    {}", ledger.count_excluded())?;
        writeln!(f, "  batches done:  {}", self.n_batches_done)?;
        write!(f, "  fits done:     {}", self.n_fits_done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{MemoryReporter, TelemetryConfig};
    use assay_recommend::{
        Acquisition, BayesianRecommender, PureRecommender, RandomRecommender, SurrogateConfig,
        TwoPhaseMetaRecommender,
    };
    use assay_types::{RecommenderError, Row, TargetMode};
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn grid() -> SearchSpace {
        SearchSpace::from_product(vec![
            Parameter::numerical_discrete("x", vec![1.0, 2.0, 3.0], 0.1).unwrap(),
            Parameter::categorical("y", ["a", "b"]).unwrap(),
        ])
        .unwrap()
    }

    fn objective() -> Objective {
        Objective::single(NumericalTarget::new("t", TargetMode::Max)).unwrap()
    }

    fn random_campaign(seed: u64) -> Campaign<RecommenderKind> {
        Campaign::new(
            grid(),
            Some(objective()),
            RecommenderKind::Random(RandomRecommender::with_seed(seed)),
        )
        .unwrap()
    }

    /// Copy the batch and attach a target value per row.
    fn measured(batch: &Table, value: f64) -> Table {
        let mut data = batch.clone();
        data.add_column("t", vec![Cell::Float(value); batch.len()]).unwrap();
        data
    }

    fn filter(column: &str, values: &[Cell]) -> Table {
        let mut table = Table::new([column]);
        for (i, v) in values.iter().enumerate() {
            table.push_row(i, vec![v.clone()]).unwrap();
        }
        table
    }

    #[derive(Debug)]
    struct FailingRecommender;

    impl Recommender for FailingRecommender {
        fn recommend(
            &mut self,
            _batch_size: usize,
            _searchspace: AnnotatedSearchSpace<'_>,
            _objective: Option<&Objective>,
            _measurements: &Table,
            _pending: Option<&Table>,
        ) -> AssayResult<Table> {
            Err(RecommenderError::Fit {
                message: "boom".into(),
            }
            .into())
        }

        fn name(&self) -> &str {
            "FailingRecommender"
        }
    }

    #[test]
    fn grid_campaign_end_to_end() {
        let mut campaign = random_campaign(1);
        let batch = campaign.recommend(2, None).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(campaign.searchspace_metadata().count_recommended(), 2);

        campaign.add_measurements(&measured(&batch, 1.5), true).unwrap();
        assert_eq!(campaign.n_batches_done(), 1);
        assert_eq!(campaign.searchspace_metadata().count_measured(), 2);
        assert!(campaign.cached_recommendation().is_none());

        let next = campaign.recommend(2, None).unwrap();
        assert_eq!(campaign.n_fits_done(), 1);
        let first: HashSet<usize> = batch.index().iter().copied().collect();
        assert!(next.index().iter().all(|i| !first.contains(i)));

        let log = campaign.measurements().unwrap();
        assert_eq!(log.len(), 2);
        assert!(log.column("FitNr").unwrap().all(|c| *c == Cell::Int(1)));
    }

    #[test]
    fn cached_recommendation_is_idempotent() {
        let mut campaign = random_campaign(2);
        let first = campaign.recommend(3, None).unwrap();
        let ledger = campaign.searchspace_metadata().clone();
        let again = campaign.recommend(3, None).unwrap();
        assert_eq!(first, again);
        assert_eq!(&ledger, campaign.searchspace_metadata());

        let smaller = campaign.recommend(1, None).unwrap();
        assert_eq!(smaller.len(), 1);
    }

    #[test]
    fn pending_experiments_invalidate_cache() {
        let mut campaign = random_campaign(3);
        campaign.recommend(2, None).unwrap();
        let pending = filter("x", &[Cell::Float(1.0)]);
        campaign.recommend(2, Some(&pending)).unwrap();
        assert_eq!(campaign.searchspace_metadata().count_recommended(), 4);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut campaign = random_campaign(0);
        let err = campaign.recommend(0, None).unwrap_err();
        assert!(matches!(err, AssayError::InvalidArgument(_)));
        assert_eq!(campaign.n_fits_done(), 0);
    }

    #[test]
    fn invalid_measurements_change_nothing() {
        let mut campaign = random_campaign(4);
        campaign.recommend(1, None).unwrap();
        let before = campaign.clone();

        let mut no_target = Table::new(["x", "y"]);
        no_target
            .push_row(0, vec![Cell::Float(1.0), Cell::from("a")])
            .unwrap();
        let err = campaign.add_measurements(&no_target, true).unwrap_err();
        assert!(matches!(
            err,
            AssayError::MissingValue {
                role: ColumnRole::Target,
                ..
            }
        ));

        let mut text_param = Table::new(["x", "y", "t"]);
        text_param
            .push_row(0, vec![Cell::from("one"), Cell::from("a"), Cell::Float(1.0)])
            .unwrap();
        let err = campaign.add_measurements(&text_param, true).unwrap_err();
        assert!(matches!(
            err,
            AssayError::NonNumericValue {
                role: ColumnRole::Parameter,
                ..
            }
        ));

        let mut null_param = Table::new(["x", "y", "t"]);
        null_param
            .push_row(0, vec![Cell::Float(1.0), Cell::Null, Cell::Float(1.0)])
            .unwrap();
        assert!(campaign.add_measurements(&null_param, true).is_err());

        assert_eq!(campaign.n_batches_done(), before.n_batches_done());
        assert_eq!(campaign.measurement_log(), before.measurement_log());
        assert_eq!(campaign.searchspace_metadata(), before.searchspace_metadata());
        // the cache is dropped even on failure
        assert!(campaign.cached_recommendation().is_none());
    }

    #[test]
    fn non_finite_measurements_are_rejected() {
        let mut campaign = random_campaign(14);
        let before = campaign.clone();
        for bad in [f64::INFINITY, f64::NEG_INFINITY] {
            let mut data = Table::new(["x", "y", "t"]);
            data.push_row(0, vec![Cell::Float(1.0), Cell::from("a"), Cell::Float(bad)])
                .unwrap();
            let err = campaign.add_measurements(&data, true).unwrap_err();
            assert!(matches!(
                err,
                AssayError::NonNumericValue {
                    role: ColumnRole::Target,
                    ..
                }
            ));

            let mut data = Table::new(["x", "y", "t"]);
            data.push_row(0, vec![Cell::Float(bad), Cell::from("a"), Cell::Float(1.0)])
                .unwrap();
            let err = campaign.add_measurements(&data, true).unwrap_err();
            assert!(matches!(
                err,
                AssayError::NonNumericValue {
                    role: ColumnRole::Parameter,
                    ..
                }
            ));
        }
        assert_eq!(campaign, before);

        let mut data = Table::new(["x", "y", "t"]);
        data.push_row(0, vec![Cell::Float(1.0), Cell::from("a"), Cell::Float(1e300)])
            .unwrap();
        campaign.add_measurements(&data, true).unwrap();
        let json = campaign.to_json().unwrap();
        let restored = Campaign::<RecommenderKind>::from_json(&json).unwrap();
        assert_eq!(campaign, restored);
    }

    #[test]
    fn unknown_labels_do_not_block_the_surrogate() {
        let mut campaign = Campaign::with_default_recommender(grid(), Some(objective())).unwrap();
        let batch = campaign.recommend(2, None).unwrap();
        let mut data = measured(&batch, 1.0);
        data.push_row(99, vec![Cell::Float(2.0), Cell::from("c"), Cell::Float(7.0)])
            .unwrap();
        campaign.add_measurements(&data, true).unwrap();
        assert_eq!(campaign.measurement_log().len(), 3);

        let next = campaign.recommend(1, None).unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(
            campaign.recommender().current_recommender().unwrap().name(),
            "BayesianRecommender"
        );
        let candidates = campaign.searchspace().discrete().exp_rep().clone();
        assert_eq!(campaign.posterior(&candidates).unwrap().len(), 6);
    }

    #[test]
    fn hybrid_campaign_tracks_only_the_discrete_part() {
        let mut params = vec![Parameter::numerical_continuous("z", 0.0, 1.0).unwrap()];
        params.extend(grid().parameters().cloned());
        let space = SearchSpace::from_product(params).unwrap();
        let mut campaign = Campaign::with_default_recommender(space, Some(objective())).unwrap();
        assert_eq!(campaign.searchspace_metadata().len(), 6);

        let batch = campaign.recommend(2, None).unwrap();
        assert_eq!(batch.len(), 2);
        let picked: HashSet<usize> = batch.index().iter().copied().collect();
        assert_eq!(campaign.searchspace_metadata().count_recommended(), picked.len());

        // continuous columns play no part in matching
        let mut data = Table::new(["x", "y", "z", "t"]);
        let rows = [
            vec![Cell::Float(1.0), Cell::from("a"), Cell::Float(0.9), Cell::Float(1.0)],
            vec![Cell::Int(3), Cell::from("b"), Cell::Float(0.1), Cell::Float(2.0)],
        ];
        for (i, row) in rows.into_iter().enumerate() {
            data.push_row(i, row).unwrap();
        }
        campaign.add_measurements(&data, true).unwrap();
        let ledger = campaign.searchspace_metadata();
        assert_eq!(ledger.count_measured(), 2);
        assert!(ledger.get(0).unwrap().measured);
        assert!(ledger.get(5).unwrap().measured);

        let next = campaign.recommend(3, None).unwrap();
        assert_eq!(next.len(), 3);
        assert!(next.index().iter().all(|idx| *idx < 6));
        for cell in next.column("z").unwrap() {
            assert!((0.0..=1.0).contains(&cell.as_f64().unwrap()));
        }
        assert_eq!(campaign.n_fits_done(), 1);
        assert_eq!(campaign.posterior(&next).unwrap().len(), 3);
    }

    #[test]
    fn continuous_campaign_keeps_an_empty_ledger() {
        let z = Parameter::numerical_continuous("z", 0.0, 1.0).unwrap();
        let space = SearchSpace::from_product(vec![z]).unwrap();
        let mut campaign = Campaign::new(
            space,
            Some(objective()),
            RecommenderKind::Random(RandomRecommender::with_seed(15)),
        )
        .unwrap();
        assert!(campaign.searchspace_metadata().is_empty());

        let batch = campaign.recommend(3, None).unwrap();
        assert_eq!(batch.index(), &[0, 1, 2]);
        campaign.add_measurements(&measured(&batch, 0.5), true).unwrap();
        assert_eq!(campaign.n_batches_done(), 1);
        assert!(campaign.searchspace_metadata().is_empty());
        assert_eq!(campaign.measurement_log().len(), 3);

        let next = campaign.recommend(2, None).unwrap();
        assert_eq!(next.len(), 2);
        assert_eq!(campaign.n_fits_done(), 1);
        assert!(campaign.to_string().contains("CONTINUOUS"));
    }

    #[test]
    fn measurements_outside_tolerance_do_not_mark() {
        let mut campaign = random_campaign(5);
        let mut data = Table::new(["x", "y", "t"]);
        data.push_row(0, vec![Cell::Float(2.05), Cell::from("a"), Cell::Float(0.0)])
            .unwrap();

        campaign.add_measurements(&data, false).unwrap();
        assert_eq!(campaign.searchspace_metadata().count_measured(), 0);
        campaign.add_measurements(&data, true).unwrap();
        assert_eq!(campaign.searchspace_metadata().count_measured(), 1);
        assert_eq!(campaign.n_batches_done(), 2);
        assert_eq!(campaign.measurement_log().len(), 2);
    }

    #[test]
    fn excluded_candidates_are_never_recommended() {
        let mut campaign = random_campaign(6);
        let subset = campaign
            .toggle_discrete_candidates(&filter("y", &[Cell::from("a")]), true, false, false)
            .unwrap();
        assert_eq!(subset.index(), &[0, 2, 4]);

        let batch = campaign.recommend(3, None).unwrap();
        let mut index = batch.index().to_vec();
        index.sort_unstable();
        assert_eq!(index, vec![1, 3, 5]);
        assert!(campaign.recommend(4, None).is_err());
    }

    #[test]
    fn toggle_dry_run_matches_real_run() {
        let mut campaign = random_campaign(7);
        let f = filter("x", &[Cell::Float(1.0), Cell::Int(3)]);
        let ledger = campaign.searchspace_metadata().clone();
        let dry = campaign.toggle_discrete_candidates(&f, true, false, true).unwrap();
        assert_eq!(&ledger, campaign.searchspace_metadata());

        let real = campaign.toggle_discrete_candidates(&f, true, false, false).unwrap();
        assert_eq!(dry, real);
        assert_eq!(campaign.searchspace_metadata().count_excluded(), 4);

        campaign.toggle_discrete_candidates(&f, false, false, false).unwrap();
        assert_eq!(campaign.searchspace_metadata().count_excluded(), 0);
    }

    #[test]
    fn toggle_rejects_unknown_filter_columns() {
        let mut campaign = random_campaign(8);
        let err = campaign
            .toggle_discrete_candidates(&filter("t", &[Cell::Float(1.0)]), true, false, false)
            .unwrap_err();
        assert!(matches!(err, AssayError::InvalidArgument(_)));
        let err = campaign
            .toggle_discrete_candidates(&Table::default(), true, false, false)
            .unwrap_err();
        assert!(matches!(err, AssayError::InvalidArgument(_)));
    }

    #[test]
    fn recommender_failure_keeps_fit_stamp() {
        let mut campaign = Campaign::new(grid(), Some(objective()), FailingRecommender).unwrap();
        let mut data = Table::new(["x", "y", "t"]);
        data.push_row(0, vec![Cell::Float(1.0), Cell::from("a"), Cell::Float(0.0)])
            .unwrap();
        campaign.add_measurements(&data, true).unwrap();

        let err = campaign.recommend(1, None).unwrap_err();
        assert!(matches!(
            err,
            AssayError::Recommender(RecommenderError::Fit { .. })
        ));
        assert_eq!(campaign.n_fits_done(), 1);
        assert!(campaign.cached_recommendation().is_none());
        assert_eq!(campaign.searchspace_metadata().count_recommended(), 0);
    }

    #[test]
    fn surrogate_access_follows_active_recommender() {
        let mut campaign = Campaign::with_default_recommender(grid(), Some(objective())).unwrap();
        let err = campaign.get_surrogate().unwrap_err();
        assert!(matches!(err, AssayError::Unsupported(_)));

        let batch = campaign.recommend(2, None).unwrap();
        campaign.add_measurements(&measured(&batch, 1.0), true).unwrap();
        campaign.recommend(1, None).unwrap();

        let current = campaign.recommender().current_recommender().unwrap();
        assert_eq!(current.name(), "BayesianRecommender");
        let candidates = campaign.searchspace().discrete().exp_rep().clone();
        let posterior = campaign.posterior(&candidates).unwrap();
        assert_eq!(posterior.mean.len(), 6);
        assert_eq!(posterior.variance.len(), 6);
    }

    #[test]
    fn surrogate_without_objective_or_posterior() {
        let campaign = Campaign::with_default_recommender(grid(), None).unwrap();
        assert!(matches!(
            campaign.get_surrogate().unwrap_err(),
            AssayError::Unsupported(_)
        ));
        assert!(campaign.targets().is_empty());

        let mean =
            BayesianRecommender::new(SurrogateConfig::Mean {}, Acquisition::PosteriorMean {});
        let mut campaign = Campaign::new(
            grid(),
            Some(objective()),
            RecommenderKind::TwoPhase(TwoPhaseMetaRecommender::new(
                PureRecommender::Bayesian(mean.clone()),
                PureRecommender::Bayesian(mean),
            )),
        )
        .unwrap();
        let mut data = Table::new(["x", "y", "t"]);
        data.push_row(0, vec![Cell::Float(2.0), Cell::from("b"), Cell::Float(3.0)])
            .unwrap();
        campaign.add_measurements(&data, true).unwrap();
        campaign.recommend(1, None).unwrap();
        assert!(campaign.get_surrogate().is_ok());
        let err = campaign.posterior(&data).unwrap_err();
        assert!(matches!(err, AssayError::Unsupported(_)));
    }

    #[test]
    fn telemetry_reports_usage() {
        let memory = Arc::new(MemoryReporter::new());
        let mut campaign = random_campaign(9);
        campaign.set_telemetry(Telemetry::new(TelemetryConfig::default(), memory.clone()));

        let batch = campaign.recommend(2, None).unwrap();
        let mut data = measured(&batch, 1.0);
        let off_grid = vec![Cell::Float(9.0), Cell::from("a"), Cell::Float(0.0)];
        data.push_row(99, off_grid).unwrap();
        campaign.add_measurements(&data, true).unwrap();

        assert_eq!(memory.values(TelemetryLabel::CountRecommend), vec![1.0]);
        assert_eq!(memory.values(TelemetryLabel::BatchSize), vec![2.0]);
        assert_eq!(memory.values(TelemetryLabel::CountAddResults), vec![1.0]);
        let pct = memory.values(TelemetryLabel::RecommendedMeasurementPercentage);
        assert_eq!(pct.len(), 1);
        assert!((pct[0] - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn summary_lists_counts() {
        let mut campaign = random_campaign(10);
        campaign.recommend(2, None).unwrap();
        let summary = campaign.to_string();
        assert!(summary.contains("recommended: 2"));
        assert!(summary.contains("DISCRETE"));
        assert!(summary.contains("RandomRecommender"));
    }

    #[test]
    fn caller_data_is_untouched() {
        let mut campaign = random_campaign(11);
        let mut data = Table::new(["x", "y", "t"]);
        data.push_row(0, vec![Cell::Float(1.0), Cell::from("a"), Cell::Float(0.0)])
            .unwrap();
        let copy = data.clone();
        campaign.add_measurements(&data, true).unwrap();
        assert_eq!(data, copy);
        let _: Vec<Row> = campaign.measurements().unwrap().to_records();
    }

    proptest! {
        #[test]
        fn anti_filter_is_the_complement(mask in proptest::collection::vec(any::<bool>(), 3)) {
            let mut campaign = random_campaign(12);
            let values: Vec<Cell> = [1.0, 2.0, 3.0]
                .iter()
                .zip(&mask)
                .filter(|(_, keep)| **keep)
                .map(|(v, _)| Cell::Float(*v))
                .collect();
            let f = filter("x", &values);
            let hit = campaign.toggle_discrete_candidates(&f, true, false, true).unwrap();
            let miss = campaign.toggle_discrete_candidates(&f, true, true, true).unwrap();

            let hit: HashSet<usize> = hit.index().iter().copied().collect();
            let miss: HashSet<usize> = miss.index().iter().copied().collect();
            prop_assert!(hit.is_disjoint(&miss));
            prop_assert_eq!(hit.len() + miss.len(), 6);
        }

        #[test]
        fn recommend_accepts_any_feasible_batch(batch_size in 1usize..=6) {
            let mut campaign = random_campaign(13);
            let batch = campaign.recommend(batch_size, None).unwrap();
            prop_assert_eq!(batch.len(), batch_size);
            prop_assert_eq!(campaign.searchspace_metadata().count_recommended(), batch_size);
        }
    }
}
