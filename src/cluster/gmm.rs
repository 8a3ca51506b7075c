//! Gaussian Mixture Model clustering.
//!
//! GMM provides **soft clustering** with probabilistic assignments,
//! allowing items to belong to multiple clusters with different probabilities.
//!
//! # The Probabilistic Model
//!
//! ```text
//! P(x) = Σₖ πₖ × N(x | μₖ, Σₖ)
//! ```
//!
//! # The EM Algorithm
//!
//! **E-step**: responsibilities
//! ```text
//! γₙₖ = πₖ × N(xₙ | μₖ, Σₖ) / Σⱼ πⱼ × N(xₙ | μⱼ, Σⱼ)
//! ```
//!
//! **M-step**: weighted means, covariances, and mixing weights.
//!
//! Iteration stops once the mean log-likelihood changes by less than `tol`.
//! Initial responsibilities come from a k-means partition.
//!
//! # Model Selection
//!
//! [`FittedGmm::bic`] scores a fit as
//!
//! ```text
//! BIC = -2 · log L + p · ln(n)
//! ```
//!
//! where `p` counts free parameters (means, covariances, k-1 weights).
//! Lower is better; [`ClusterCountSelector`](super::ClusterCountSelector)
//! scans component counts and keeps the argmin.
//!
//! # Failure Modes
//!
//! - **Local optima**: EM converges to local maxima; initialization matters
//! - **Singular covariance**: duplicate points collapse a component; `reg_covar`
//!   is added to every diagonal, and a Cholesky failure is reported as
//!   [`Error::DegenerateModel`]

use super::data::to_array;
use super::kmeans::Kmeans;
use super::traits::{Clustering, SoftClustering};
use crate::error::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Shape of each component's covariance matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceType {
    /// Full covariance per component.
    #[default]
    Full,
    /// Diagonal covariance per component (features independent).
    Diag,
}

impl CovarianceType {
    /// Number of free covariance parameters for one component in `d` dimensions.
    fn params_per_component(self, d: usize) -> usize {
        match self {
            CovarianceType::Full => d * (d + 1) / 2,
            CovarianceType::Diag => d,
        }
    }
}

/// Gaussian Mixture Model clustering.
#[derive(Debug, Clone)]
pub struct Gmm {
    /// Number of components (clusters).
    n_components: usize,
    /// Covariance parameterisation.
    covariance_type: CovarianceType,
    /// Maximum EM iterations.
    max_iter: usize,
    /// Convergence tolerance on the mean log-likelihood.
    tol: f64,
    /// Random seed.
    seed: Option<u64>,
    /// Regularization added to covariance diagonals.
    reg_covar: f64,
}

/// Covariance of a single fitted component.
#[derive(Debug, Clone)]
enum Covariance {
    /// Lower Cholesky factor of the covariance matrix.
    Full(Array2<f64>),
    /// Per-feature variances.
    Diag(Array1<f64>),
}

impl Covariance {
    fn log_det(&self) -> f64 {
        match self {
            Covariance::Full(chol) => 2.0 * chol.diag().iter().map(|v| v.ln()).sum::<f64>(),
            Covariance::Diag(var) => var.iter().map(|v| v.ln()).sum(),
        }
    }

    /// Squared Mahalanobis distance of `diff` under this covariance.
    fn mahalanobis(&self, diff: &ArrayView1<'_, f64>) -> f64 {
        match self {
            Covariance::Full(chol) => {
                let d = diff.len();
                let mut y = vec![0.0; d];
                for i in 0..d {
                    let mut acc = diff[i];
                    for j in 0..i {
                        acc -= chol[[i, j]] * y[j];
                    }
                    y[i] = acc / chol[[i, i]];
                }
                y.iter().map(|v| v * v).sum()
            }
            Covariance::Diag(var) => diff
                .iter()
                .zip(var.iter())
                .map(|(x, v)| x * x / v)
                .sum(),
        }
    }
}

/// A fitted Gaussian mixture.
#[derive(Debug, Clone)]
pub struct FittedGmm {
    weights: Array1<f64>,
    means: Array2<f64>,
    covariances: Vec<Covariance>,
    log_dets: Vec<f64>,
    covariance_type: CovarianceType,
    converged: bool,
    n_iter: usize,
    lower_bound: f64,
}

impl Gmm {
    /// Create a new GMM with default settings (8 components, full covariance).
    pub fn new() -> Self {
        Self {
            n_components: 8,
            covariance_type: CovarianceType::Full,
            max_iter: 100,
            tol: 1e-3,
            seed: None,
            reg_covar: 1e-6,
        }
    }

    /// Set number of components.
    pub fn with_n_components(mut self, n: usize) -> Self {
        self.n_components = n;
        self
    }

    /// Set covariance type.
    pub fn with_covariance_type(mut self, covariance_type: CovarianceType) -> Self {
        self.covariance_type = covariance_type;
        self
    }

    /// Set maximum iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set convergence tolerance.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set covariance regularization.
    pub fn with_reg_covar(mut self, reg_covar: f64) -> Self {
        self.reg_covar = reg_covar;
        self
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Fit the mixture to `data`.
    pub fn fit(&self, data: &[Vec<f32>]) -> Result<FittedGmm> {
        let x = to_array(data)?;
        self.fit_array(&x)
    }

    pub(crate) fn fit_array(&self, x: &Array2<f64>) -> Result<FittedGmm> {
        let n = x.nrows();
        let k = self.n_components;
        if k == 0 || k > n {
            return Err(Error::InvalidClusterCount {
                requested: k,
                n_items: n,
            });
        }

        let mut kmeans = Kmeans::new(k);
        if let Some(seed) = self.seed {
            kmeans = kmeans.with_seed(seed);
        }
        let init = kmeans.fit(x)?;

        let mut resp = Array2::zeros((n, k));
        for (i, &label) in init.labels.iter().enumerate() {
            resp[[i, label]] = 1.0;
        }

        let mut model = self.m_step(x, &resp)?;
        let mut lower_bound = f64::NEG_INFINITY;

        for iter in 1..=self.max_iter {
            let prev = lower_bound;
            let (mean_log_prob, new_resp) = model.e_step(x);
            lower_bound = mean_log_prob;
            model = self.m_step(x, &new_resp)?;
            model.n_iter = iter;

            if (lower_bound - prev).abs() < self.tol {
                model.converged = true;
                break;
            }
        }

        if !lower_bound.is_finite() {
            return Err(Error::DegenerateModel(format!(
                "non-finite log-likelihood with {k} components"
            )));
        }
        if !model.converged {
            tracing::debug!(
                components = k,
                max_iter = self.max_iter,
                "GMM did not converge"
            );
        }
        model.lower_bound = lower_bound;
        Ok(model)
    }

    fn m_step(&self, x: &Array2<f64>, resp: &Array2<f64>) -> Result<FittedGmm> {
        let (n, d) = x.dim();
        let k = resp.ncols();

        let nk = resp.sum_axis(Axis(0)) + 10.0 * f64::EPSILON;
        let mut means = resp.t().dot(x);
        for (c, mut row) in means.rows_mut().into_iter().enumerate() {
            row /= nk[c];
        }

        let mut covariances = Vec::with_capacity(k);
        for c in 0..k {
            let mean = means.row(c);
            let col = resp.column(c);
            let cov = match self.covariance_type {
                CovarianceType::Full => {
                    let mut cov = Array2::<f64>::zeros((d, d));
                    for (i, point) in x.rows().into_iter().enumerate() {
                        let w = col[i];
                        if w == 0.0 {
                            continue;
                        }
                        let diff = &point - &mean;
                        for a in 0..d {
                            for b in 0..=a {
                                cov[[a, b]] += w * diff[a] * diff[b];
                            }
                        }
                    }
                    for a in 0..d {
                        for b in 0..=a {
                            let v = cov[[a, b]] / nk[c];
                            cov[[a, b]] = v;
                            cov[[b, a]] = v;
                        }
                        cov[[a, a]] += self.reg_covar;
                    }
                    Covariance::Full(cholesky(&cov)?)
                }
                CovarianceType::Diag => {
                    let mut var = Array1::<f64>::from_elem(d, 0.0);
                    for (i, point) in x.rows().into_iter().enumerate() {
                        let w = col[i];
                        for j in 0..d {
                            let diff = point[j] - mean[j];
                            var[j] += w * diff * diff;
                        }
                    }
                    var.mapv_inplace(|v| v / nk[c] + self.reg_covar);
                    if var.iter().any(|v| !v.is_finite() || *v <= 0.0) {
                        return Err(Error::DegenerateModel(format!(
                            "non-positive variance in component {c}"
                        )));
                    }
                    Covariance::Diag(var)
                }
            };
            covariances.push(cov);
        }

        let weights = &nk / n as f64;
        let log_dets = covariances.iter().map(Covariance::log_det).collect();

        Ok(FittedGmm {
            weights,
            means,
            covariances,
            log_dets,
            covariance_type: self.covariance_type,
            converged: false,
            n_iter: 0,
            lower_bound: f64::NEG_INFINITY,
        })
    }
}

impl Default for Gmm {
    fn default() -> Self {
        Self::new()
    }
}

impl FittedGmm {
    /// Number of mixture components.
    pub fn n_components(&self) -> usize {
        self.weights.len()
    }

    /// Dimension of the space the model was fitted in.
    pub fn dim(&self) -> usize {
        self.means.ncols()
    }

    /// Mixing weights.
    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    /// Component means (`k x d`).
    pub fn means(&self) -> &Array2<f64> {
        &self.means
    }

    /// Whether EM stopped on the tolerance rather than the iteration cap.
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// EM iterations run.
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Mean log-likelihood reached during training.
    pub fn lower_bound(&self) -> f64 {
        self.lower_bound
    }

    /// Number of free parameters.
    pub fn n_parameters(&self) -> usize {
        let k = self.n_components();
        let d = self.dim();
        k * d + k * self.covariance_type.params_per_component(d) + k - 1
    }

    /// `ln πₖ + ln N(x | μₖ, Σₖ)` for every point and component.
    fn weighted_log_prob(&self, x: &Array2<f64>) -> Array2<f64> {
        let (n, d) = x.dim();
        let k = self.n_components();
        let mut out = Array2::zeros((n, k));
        for (i, point) in x.rows().into_iter().enumerate() {
            for c in 0..k {
                let diff = &point - &self.means.row(c);
                let maha = self.covariances[c].mahalanobis(&diff.view());
                out[[i, c]] = self.weights[c].ln()
                    - 0.5 * (d as f64 * LN_2PI + self.log_dets[c] + maha);
            }
        }
        out
    }

    /// Returns (mean log-likelihood, responsibilities).
    fn e_step(&self, x: &Array2<f64>) -> (f64, Array2<f64>) {
        let mut resp = self.weighted_log_prob(x);
        let mut total = 0.0;
        for mut row in resp.rows_mut() {
            let norm = logsumexp(&row.to_vec());
            total += norm;
            row.mapv_inplace(|v| (v - norm).exp());
        }
        (total / x.nrows() as f64, resp)
    }

    /// Per-sample log-likelihood averaged over `x`.
    pub(crate) fn score_array(&self, x: &Array2<f64>) -> f64 {
        let log_prob = self.weighted_log_prob(x);
        let total: f64 = log_prob
            .rows()
            .into_iter()
            .map(|row| logsumexp(&row.to_vec()))
            .sum();
        total / x.nrows() as f64
    }

    /// Mean log-likelihood of `data` under the model.
    pub fn score(&self, data: &[Vec<f32>]) -> Result<f64> {
        let x = self.checked_array(data)?;
        Ok(self.score_array(&x))
    }

    /// Total log-likelihood of `data` under the model.
    pub fn log_likelihood(&self, data: &[Vec<f32>]) -> Result<f64> {
        let x = self.checked_array(data)?;
        Ok(self.score_array(&x) * x.nrows() as f64)
    }

    pub(crate) fn bic_array(&self, x: &Array2<f64>) -> f64 {
        let n = x.nrows() as f64;
        -2.0 * self.score_array(x) * n + self.n_parameters() as f64 * n.ln()
    }

    /// Bayesian Information Criterion of the model on `data`; lower is better.
    pub fn bic(&self, data: &[Vec<f32>]) -> Result<f64> {
        let x = self.checked_array(data)?;
        Ok(self.bic_array(&x))
    }

    pub(crate) fn predict_proba_array(&self, x: &Array2<f64>) -> Vec<Vec<f64>> {
        let (_, resp) = self.e_step(x);
        resp.rows().into_iter().map(|row| row.to_vec()).collect()
    }

    /// Posterior membership probability of every point in every component.
    pub fn predict_proba(&self, data: &[Vec<f32>]) -> Result<Vec<Vec<f64>>> {
        let x = self.checked_array(data)?;
        Ok(self.predict_proba_array(&x))
    }

    fn checked_array(&self, data: &[Vec<f32>]) -> Result<Array2<f64>> {
        let x = to_array(data)?;
        if x.ncols() != self.dim() {
            return Err(Error::DimensionMismatch {
                expected: self.dim(),
                found: x.ncols(),
            });
        }
        Ok(x)
    }
}

/// Lower Cholesky factor of a symmetric positive-definite matrix.
fn cholesky(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for p in 0..j {
                sum -= l[[i, p]] * l[[j, p]];
            }
            if i == j {
                if !sum.is_finite() || sum <= 0.0 {
                    return Err(Error::DegenerateModel(
                        "covariance is not positive definite".into(),
                    ));
                }
                l[[i, i]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    Ok(l)
}

/// Log-sum-exp for numerical stability.
fn logsumexp(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NEG_INFINITY;
    }
    let max_val = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max_val.is_infinite() {
        return max_val;
    }
    max_val
        + values
            .iter()
            .map(|&v| (v - max_val).exp())
            .sum::<f64>()
            .ln()
}

impl Clustering for Gmm {
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<usize>> {
        let probs = self.fit_predict_proba(data)?;

        // Hard assignment: argmax
        Ok(probs
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(i, _)| i)
                    .unwrap_or(0)
            })
            .collect())
    }

    fn n_clusters(&self) -> usize {
        self.n_components
    }
}

impl SoftClustering for Gmm {
    fn fit_predict_proba(&self, data: &[Vec<f32>]) -> Result<Vec<Vec<f64>>> {
        let x = to_array(data)?;
        let model = self.fit_array(&x)?;
        Ok(model.predict_proba_array(&x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Vec<Vec<f32>> {
        vec![
            vec![0.0, 0.0],
            vec![0.2, 0.1],
            vec![0.1, 0.3],
            vec![0.3, 0.2],
            vec![10.0, 10.0],
            vec![10.2, 10.1],
            vec![10.1, 10.3],
            vec![10.3, 10.2],
        ]
    }

    #[test]
    fn test_gmm_basic() {
        let gmm = Gmm::new().with_n_components(2).with_seed(42);
        let labels = gmm.fit_predict(&blobs()).unwrap();

        assert!(labels[..4].iter().all(|&l| l == labels[0]));
        assert!(labels[4..].iter().all(|&l| l == labels[4]));
        assert_ne!(labels[0], labels[4]);
    }

    #[test]
    fn test_gmm_soft_assignments_sum_to_one() {
        for cov in [CovarianceType::Full, CovarianceType::Diag] {
            let gmm = Gmm::new()
                .with_n_components(2)
                .with_covariance_type(cov)
                .with_seed(42);
            let probs = gmm.fit_predict_proba(&blobs()).unwrap();

            for row in &probs {
                let sum: f64 = row.iter().sum();
                assert!((sum - 1.0).abs() < 1e-6, "{cov:?}: row sums to {sum}");
            }
        }
    }

    #[test]
    fn test_bic_prefers_two_components_for_two_blobs() {
        let data = blobs();
        let one = Gmm::new().with_n_components(1).with_seed(0).fit(&data).unwrap();
        let two = Gmm::new().with_n_components(2).with_seed(0).fit(&data).unwrap();
        assert!(two.bic(&data).unwrap() < one.bic(&data).unwrap());
    }

    #[test]
    fn test_log_likelihood_is_score_times_n() {
        let data = blobs();
        let model = Gmm::new().with_n_components(2).with_seed(0).fit(&data).unwrap();
        let total = model.log_likelihood(&data).unwrap();
        let mean = model.score(&data).unwrap();
        assert!((total - mean * data.len() as f64).abs() < 1e-9);
    }

    #[test]
    fn test_parameter_count() {
        let data = blobs();
        let full = Gmm::new().with_n_components(2).with_seed(0).fit(&data).unwrap();
        // 2 means * 2 dims + 2 * 3 covariance terms + 1 free weight
        assert_eq!(full.n_parameters(), 4 + 6 + 1);

        let diag = Gmm::new()
            .with_n_components(2)
            .with_covariance_type(CovarianceType::Diag)
            .with_seed(0)
            .fit(&data)
            .unwrap();
        assert_eq!(diag.n_parameters(), 4 + 4 + 1);
    }

    #[test]
    fn test_duplicate_points_survive_via_regularization() {
        let data = vec![vec![1.0, 1.0]; 6];
        let model = Gmm::new().with_n_components(1).with_seed(3).fit(&data).unwrap();
        let probs = model.predict_proba(&data).unwrap();
        assert!(probs.iter().all(|row| (row[0] - 1.0).abs() < 1e-9));
    }

    #[test]
    fn test_same_seed_same_probabilities() {
        let data = blobs();
        let a = Gmm::new().with_n_components(3).with_seed(9).fit_predict_proba(&data).unwrap();
        let b = Gmm::new().with_n_components(3).with_seed(9).fit_predict_proba(&data).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_too_many_components_is_rejected() {
        let data = vec![vec![0.0], vec![1.0]];
        let err = Gmm::new().with_n_components(3).fit(&data).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidClusterCount {
                requested: 3,
                n_items: 2
            }
        );
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let mut a = Array2::<f64>::zeros((2, 2));
        a[[0, 0]] = 1.0;
        a[[1, 1]] = -1.0;
        assert!(matches!(cholesky(&a), Err(Error::DegenerateModel(_))));
    }

    #[test]
    fn test_predict_dimension_mismatch() {
        let model = Gmm::new().with_n_components(1).with_seed(0).fit(&blobs()).unwrap();
        let err = model.predict_proba(&[vec![1.0, 2.0, 3.0]]).unwrap_err();
        assert_eq!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                found: 3
            }
        );
    }
}
