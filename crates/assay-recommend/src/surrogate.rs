//! Surrogate models mapping parameter configurations to predicted utility.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use assay_types::{
    internal_error, AssayError, AssayResult, Objective, Parameter, RecommenderError, SearchSpace,
    Table,
};

/// Predictive distribution over a set of candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posterior {
    pub mean: Vec<f64>,
    pub variance: Vec<f64>,
}

impl Posterior {
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    pub fn std_dev(&self) -> Vec<f64> {
        self.variance.iter().map(|v| v.sqrt()).collect()
    }
}

/// A fitted model over the campaign's utility.
pub trait Surrogate: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Point predictions for the candidate rows.
    fn predict(&self, candidates: &Table) -> AssayResult<Vec<f64>>;

    /// Models that can quantify uncertainty expose it here.
    fn as_posterior(&self) -> Option<&dyn PosteriorModel> {
        None
    }
}

/// Inference-only access to the predictive distribution. Evaluation never
/// touches the fitted state.
pub trait PosteriorModel {
    fn posterior(&self, candidates: &Table) -> AssayResult<Posterior>;
}

/// Which surrogate a Bayesian recommender fits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", deny_unknown_fields)]
pub enum SurrogateConfig {
    GaussianProcess {
        #[serde(default = "default_lengthscale")]
        lengthscale: f64,
        #[serde(default = "default_noise")]
        noise: f64,
    },
    /// Predicts the mean of the observed utility everywhere.
    Mean {},
}

fn default_lengthscale() -> f64 {
    0.5
}

fn default_noise() -> f64 {
    1e-4
}

impl Default for SurrogateConfig {
    fn default() -> Self {
        Self::GaussianProcess {
            lengthscale: default_lengthscale(),
            noise: default_noise(),
        }
    }
}

impl SurrogateConfig {
    pub fn fit(
        &self,
        searchspace: &SearchSpace,
        objective: &Objective,
        measurements: &Table,
    ) -> AssayResult<Box<dyn Surrogate>> {
        if measurements.is_empty() {
            return Err(RecommenderError::Fit {
                message: "no training data".into(),
            }
            .into());
        }
        let y = objective.transform(measurements)?;
        match self {
            Self::GaussianProcess { lengthscale, noise } => {
                let encoder = Encoder::new(searchspace);
                let (x, kept) = encoder.encode_known(measurements)?;
                if kept.is_empty() {
                    return Err(RecommenderError::Fit {
                        message: "no measurement lies inside the search space".into(),
                    }
                    .into());
                }
                let y: Vec<f64> = kept.iter().map(|&pos| y[pos]).collect();
                Ok(Box::new(GaussianProcess::fit(
                    encoder,
                    x,
                    &y,
                    *lengthscale,
                    *noise,
                )?))
            }
            Self::Mean {} => Ok(Box::new(MeanSurrogate::fit(&y))),
        }
    }
}

/// Turns experimental rows into numeric feature vectors.
#[derive(Debug, Clone)]
pub(crate) struct Encoder {
    parameters: Vec<Parameter>,
}

impl Encoder {
    pub(crate) fn new(searchspace: &SearchSpace) -> Self {
        Self {
            parameters: searchspace.parameters().cloned().collect(),
        }
    }

    fn width(&self) -> usize {
        self.parameters.iter().map(Parameter::encoded_width).sum()
    }

    fn check_columns(&self, rows: &Table) -> AssayResult<()> {
        for param in &self.parameters {
            if !rows.has_column(param.name()) {
                return Err(AssayError::InvalidArgument(format!(
                    "column '{}' is required for the surrogate",
                    param.name()
                )));
            }
        }
        Ok(())
    }

    fn encode_row(&self, rows: &Table, pos: usize) -> AssayResult<Vec<f64>> {
        let mut features = Vec::with_capacity(self.width());
        for param in &self.parameters {
            let cell = rows
                .get(pos, param.name())
                .ok_or_else(|| internal_error!("row {pos} has no '{}' cell", param.name()))?;
            features.extend(param.encode(cell)?);
        }
        Ok(features)
    }

    /// Encode every row; any value outside the search space is an error.
    pub(crate) fn encode(&self, rows: &Table) -> AssayResult<DMatrix<f64>> {
        self.check_columns(rows)?;
        let mut data = Vec::with_capacity(rows.len() * self.width());
        for pos in 0..rows.len() {
            data.extend(self.encode_row(rows, pos)?);
        }
        Ok(DMatrix::from_row_slice(rows.len(), self.width(), &data))
    }

    /// Encode training rows, skipping rows whose values the search space
    /// cannot represent (e.g. an unknown categorical label). Returns the
    /// features and the positions of the kept rows.
    pub(crate) fn encode_known(&self, rows: &Table) -> AssayResult<(DMatrix<f64>, Vec<usize>)> {
        self.check_columns(rows)?;
        let mut data = Vec::with_capacity(rows.len() * self.width());
        let mut kept = Vec::with_capacity(rows.len());
        for pos in 0..rows.len() {
            match self.encode_row(rows, pos) {
                Ok(features) => {
                    data.extend(features);
                    kept.push(pos);
                }
                Err(AssayError::InvalidArgument(reason)) => {
                    warn!(
                        row = rows.index()[pos],
                        %reason,
                        "skipping measurement for the surrogate"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok((DMatrix::from_row_slice(kept.len(), self.width(), &data), kept))
    }
}

// ---- Gaussian process ----

/// Exact GP regression with an RBF kernel on standardized outputs.
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    encoder: Encoder,
    x_train: DMatrix<f64>,
    alpha: DVector<f64>,
    /// Lower Cholesky factor of the training covariance.
    chol_l: DMatrix<f64>,
    lengthscale: f64,
    y_mean: f64,
    y_std: f64,
}

impl GaussianProcess {
    fn fit(
        encoder: Encoder,
        x_train: DMatrix<f64>,
        y: &[f64],
        lengthscale: f64,
        noise: f64,
    ) -> AssayResult<Self> {
        if !(lengthscale > 0.0) || !(noise > 0.0) {
            return Err(RecommenderError::Fit {
                message: format!("lengthscale {lengthscale} and noise {noise} must be positive"),
            }
            .into());
        }
        let n = y.len() as f64;
        let y_mean = y.iter().sum::<f64>() / n;
        let var = y.iter().map(|v| (v - y_mean).powi(2)).sum::<f64>() / n;
        let y_std = if var > 1e-12 { var.sqrt() } else { 1.0 };
        let y_scaled = DVector::from_iterator(y.len(), y.iter().map(|v| (v - y_mean) / y_std));

        let mut k = kernel(&x_train, &x_train, lengthscale);
        for i in 0..k.nrows() {
            k[(i, i)] += noise;
        }
        let chol = k.cholesky().ok_or_else(|| RecommenderError::Fit {
            message: "training covariance is not positive definite".into(),
        })?;
        let alpha = chol.solve(&y_scaled);

        Ok(Self {
            encoder,
            x_train,
            alpha,
            chol_l: chol.l(),
            lengthscale,
            y_mean,
            y_std,
        })
    }
}

fn kernel(a: &DMatrix<f64>, b: &DMatrix<f64>, lengthscale: f64) -> DMatrix<f64> {
    let denom = 2.0 * lengthscale * lengthscale;
    DMatrix::from_fn(a.nrows(), b.nrows(), |i, j| {
        let sq: f64 = a
            .row(i)
            .iter()
            .zip(b.row(j).iter())
            .map(|(x, y)| (x - y).powi(2))
            .sum();
        (-sq / denom).exp()
    })
}

impl Surrogate for GaussianProcess {
    fn name(&self) -> &str {
        "GaussianProcess"
    }

    fn predict(&self, candidates: &Table) -> AssayResult<Vec<f64>> {
        Ok(self.posterior(candidates)?.mean)
    }

    fn as_posterior(&self) -> Option<&dyn PosteriorModel> {
        Some(self)
    }
}

impl PosteriorModel for GaussianProcess {
    fn posterior(&self, candidates: &Table) -> AssayResult<Posterior> {
        let x = self.encoder.encode(candidates)?;
        let k_star = kernel(&x, &self.x_train, self.lengthscale);
        let mean_scaled = &k_star * &self.alpha;
        let v = self
            .chol_l
            .solve_lower_triangular(&k_star.transpose())
            .ok_or_else(|| RecommenderError::Fit {
                message: "singular Cholesky factor".into(),
            })?;

        let mean = mean_scaled
            .iter()
            .map(|m| m * self.y_std + self.y_mean)
            .collect();
        let variance = (0..x.nrows())
            .map(|j| {
                let explained: f64 = v.column(j).iter().map(|e| e * e).sum();
                (1.0 - explained).max(1e-12) * self.y_std * self.y_std
            })
            .collect();
        Ok(Posterior { mean, variance })
    }
}

// ---- Mean predictor ----

/// Constant predictor; offers no uncertainty estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanSurrogate {
    mean: f64,
}

impl MeanSurrogate {
    fn fit(y: &[f64]) -> Self {
        Self {
            mean: y.iter().sum::<f64>() / y.len() as f64,
        }
    }
}

impl Surrogate for MeanSurrogate {
    fn name(&self) -> &str {
        "MeanSurrogate"
    }

    fn predict(&self, candidates: &Table) -> AssayResult<Vec<f64>> {
        Ok(vec![self.mean; candidates.len()])
    }
}
