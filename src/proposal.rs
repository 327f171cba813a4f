/*!
# Adaptive proposal engine

This module implements the proposal side of an adaptive Metropolis–Hastings
sampler. [`AdaptiveProposal`] keeps a running estimate of the posterior mean
and covariance, caches the Cholesky factor of the covariance, and scales a
global step width toward a target acceptance rate. Individual dimensions can
be overridden to draw from a uniform distribution instead of the correlated
Gaussian step.

[`SimpleProposal`] is the non-adaptive fallback: an isotropic Gaussian step
of fixed width.

## Example

```rust
use adaptive_mh::distributions::DiagonalGaussian;
use adaptive_mh::proposal::AdaptiveProposal;
use adaptive_mh::sampler::Sampler;

let target = DiagonalGaussian::standard(2);
let mut sampler = Sampler::new(target, AdaptiveProposal::new()).set_seed(42);
sampler.start(&[0.0, 0.0], false);
for _ in 0..1000 {
    sampler.step(false).unwrap();
}
assert!(sampler.proposal().sigma() > 0.0);
```
*/

use nalgebra as na;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::core::{McmcError, Proposal};

/// The distribution a single dimension draws its trial value from.
///
/// The default for every dimension is `Gaussian` with no width hint; the
/// engine then seeds that dimension's variance with 1. A positive hint seeds
/// the initial covariance diagonal and anchors the variance floor used when
/// the covariance estimate needs repair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DimProposal {
    /// Correlated Gaussian step; `variance` is the width hint squared, with
    /// 0 meaning "no hint".
    Gaussian { variance: f64 },
    /// Independent draw from `[min, max)`, replacing the Gaussian step for
    /// this dimension.
    Uniform { min: f64, max: f64 },
}

impl Default for DimProposal {
    fn default() -> Self {
        DimProposal::Gaussian { variance: 0.0 }
    }
}

impl DimProposal {
    fn is_uniform(&self) -> bool {
        matches!(self, DimProposal::Uniform { .. })
    }

    /// The variance this dimension is expected to have, used as the anchor
    /// for the variance floor when the covariance estimate degenerates.
    fn expected_variance(&self) -> f64 {
        match *self {
            DimProposal::Gaussian { variance } if variance > 0.0 => variance,
            DimProposal::Gaussian { .. } => 1.0,
            DimProposal::Uniform { min, max } => {
                let width = max - min;
                width * width / 12.0
            }
        }
    }
}

// Correlations at or above this value are clipped before retrying a failed
// Cholesky decomposition.
const MAX_CORRELATION: f64 = 0.95;

/// An adaptive Metropolis–Hastings step proposal.
///
/// The engine learns the posterior covariance from the chain itself: every
/// call to [`Proposal::propose`] first folds the current point into running
/// mean and covariance estimates, then draws the trial step as
/// `sigma * U^T r` where `U` is the cached upper-triangular Cholesky factor
/// of the estimated covariance and `r` is a standard-normal vector. The
/// global width `sigma` is nudged every step so the chain's acceptance rate
/// approaches [`target_acceptance`](Self::set_target_acceptance).
///
/// The estimate is refreshed only at adaptation checkpoints, so the chain is
/// not strictly Markovian. With a posterior that is roughly Gaussian this is
/// harmless in practice, but ergodicity should be checked when in doubt.
///
/// All configuration is optional. An engine built with [`new`](Self::new)
/// infers its dimensionality from the first proposed point and adapts from
/// an identity covariance seed.
#[derive(Debug, Clone)]
pub struct AdaptiveProposal {
    /// The most recent current point, used to detect whether the chain moved.
    last_point: Vec<f64>,
    /// Log-density at `last_point`.
    last_value: f64,
    /// Running estimate of the posterior center.
    central_point: Vec<f64>,
    /// Effective number of samples behind `central_point`.
    central_trials: f64,
    /// Running estimate of the posterior covariance.
    current_cov: na::DMatrix<f64>,
    /// Effective number of samples behind `current_cov`.
    covariance_trials: f64,
    /// Upper-triangular Cholesky factor of `current_cov`, refreshed at
    /// adaptation checkpoints rather than every step.
    decomposition: na::DMatrix<f64>,
    /// Per-dimension proposal overrides.
    dim_proposals: Vec<DimProposal>,
    /// Global width of the correlated Gaussian step.
    sigma: f64,
    /// Exponential moving acceptance rate.
    acceptance: f64,
    /// Effective number of samples behind `acceptance`.
    acceptance_trials: f64,
    /// The acceptance rate the width control steers toward.
    target_acceptance: f64,
    /// Trial points generated since the last reset.
    trials: u64,
    /// Accepted steps seen since the last reset.
    successes: u64,
    /// Steps remaining until the next decomposition refresh.
    next_update: f64,
    /// Memory of the acceptance estimate, in samples.
    acceptance_window: f64,
    /// Memory of the mean and covariance estimates, in samples.
    covariance_window: f64,
    state_initialized: bool,
}

impl Default for AdaptiveProposal {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptiveProposal {
    /// Creates an engine with no dimensionality fixed yet. The first
    /// proposed point determines the dimension unless [`set_dim`] is called
    /// beforehand.
    ///
    /// [`set_dim`]: Self::set_dim
    pub fn new() -> Self {
        AdaptiveProposal {
            last_point: Vec::new(),
            last_value: 0.0,
            central_point: Vec::new(),
            central_trials: 0.0,
            current_cov: na::DMatrix::zeros(0, 0),
            covariance_trials: 0.0,
            decomposition: na::DMatrix::zeros(0, 0),
            dim_proposals: Vec::new(),
            sigma: 0.0,
            // The first step of a chain is always accepted.
            acceptance: 1.0,
            acceptance_trials: 0.0,
            target_acceptance: 0.44,
            trials: 0,
            successes: 0,
            next_update: 0.0,
            acceptance_window: 0.0,
            // 0 marks "not set"; a usable default is chosen on reset.
            covariance_window: 0.0,
            state_initialized: false,
        }
    }

    /// Fixes the number of dimensions. Usually unnecessary since the
    /// dimensionality is inferred from the first proposed point; fails if a
    /// dimensionality has already been established.
    pub fn set_dim(&mut self, dim: usize) -> Result<(), McmcError> {
        if !self.dim_proposals.is_empty() {
            return Err(McmcError::DimAlreadySet);
        }
        if dim == 0 {
            return Err(McmcError::DimOutOfRange(0));
        }
        self.allocate(dim);
        Ok(())
    }

    /// Declares dimension `dim` Gaussian with a width hint. The hint seeds
    /// the initial covariance diagonal with `sigma_hint^2`; use it when a
    /// dimension is known to be much wider or narrower than the rest.
    pub fn set_gaussian(&mut self, dim: usize, sigma_hint: f64) -> Result<(), McmcError> {
        if dim >= self.dim_proposals.len() {
            return Err(McmcError::DimOutOfRange(dim));
        }
        self.dim_proposals[dim] = DimProposal::Gaussian {
            variance: sigma_hint * sigma_hint,
        };
        Ok(())
    }

    /// Overrides dimension `dim` to draw uniformly from `[min, max)`,
    /// independent of every other dimension.
    pub fn set_uniform(&mut self, dim: usize, min: f64, max: f64) -> Result<(), McmcError> {
        if dim >= self.dim_proposals.len() {
            return Err(McmcError::DimOutOfRange(dim));
        }
        if !(min < max) {
            return Err(McmcError::InvalidBounds { min, max });
        }
        self.dim_proposals[dim] = DimProposal::Uniform { min, max };
        Ok(())
    }

    /// Sets the window, in samples, over which the running mean and
    /// covariance keep memory. The default is effectively unbounded; a
    /// smaller window can help on pathological posteriors.
    pub fn set_covariance_window(&mut self, window: usize) {
        self.covariance_window = window as f64;
    }

    /// Sets the acceptance rate the width control steers toward. The default
    /// of 0.44 is the usual choice from the literature.
    pub fn set_target_acceptance(&mut self, target: f64) -> Result<(), McmcError> {
        if !(target > 0.0 && target < 1.0) {
            return Err(McmcError::InvalidTargetAcceptance(target));
        }
        self.target_acceptance = target;
        Ok(())
    }

    /// The number of dimensions, or 0 while still undetermined.
    pub fn dim(&self) -> usize {
        self.dim_proposals.len()
    }

    /// The current global step width.
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// The exponential moving acceptance rate seen by the engine.
    pub fn acceptance(&self) -> f64 {
        self.acceptance
    }

    /// The running estimate of the posterior center. Empty until the first
    /// proposal.
    pub fn estimated_center(&self) -> &[f64] {
        &self.central_point
    }

    /// Forces a refresh of the Cholesky factor from the current covariance
    /// estimate. This runs automatically at adaptation checkpoints and
    /// rarely needs to be called by users.
    ///
    /// A covariance estimate that is not positive definite is repaired in
    /// place: collapsed diagonal entries are floored relative to the
    /// expected variance of their dimension, and near-perfect correlations
    /// are clipped. If the repaired matrix still fails to decompose the
    /// proposal is reset.
    pub fn update_proposal(&mut self) {
        if !self.state_initialized {
            return;
        }
        if self.refresh_decomposition() {
            self.deweight();
        } else {
            // Something is going badly wrong. Starting over from the seed
            // covariance at least keeps the chain running.
            self.reset_proposal();
        }
    }

    /// Discards the accumulated covariance information and rebases the
    /// running estimates on the most recent point. Useful after burn-in to
    /// forget the path to stochastic equilibrium.
    pub fn reset_proposal(&mut self) {
        if !self.state_initialized {
            return;
        }
        let d = self.dim();
        self.trials = 0;
        self.successes = 0;

        // Reseed the width if the adaptation drove it somewhere unusable.
        let seed_sigma = (1.0 / d as f64).sqrt();
        if self.sigma < 0.01 * seed_sigma {
            self.sigma = seed_sigma;
        }

        self.current_cov = na::DMatrix::zeros(d, d);
        for i in 0..d {
            self.current_cov[(i, i)] = match self.dim_proposals[i] {
                DimProposal::Gaussian { variance } if variance > 0.0 => variance,
                _ => 1.0,
            };
        }
        self.decomposition = na::DMatrix::zeros(d, d);

        if self.covariance_window < 1000.0 {
            self.covariance_window = 10_000_000.0;
        }

        self.acceptance = self.target_acceptance;
        self.acceptance_trials = 10f64.min(self.acceptance_window / 2.0);

        self.central_point.clear();
        self.central_point.extend_from_slice(&self.last_point);
        self.central_trials = 10f64.min(self.covariance_window / 10.0);

        self.update_proposal();
    }

    fn allocate(&mut self, dim: usize) {
        self.last_point = vec![0.0; dim];
        self.dim_proposals = vec![DimProposal::default(); dim];
    }

    fn initialize_state(&mut self, current: &[f64], value: f64) {
        if self.dim_proposals.is_empty() {
            self.allocate(current.len());
        }
        assert_eq!(
            current.len(),
            self.dim_proposals.len(),
            "mismatch in the dimensionality of the current point"
        );
        self.last_value = value;
        self.last_point.copy_from_slice(current);
        let d = current.len() as f64;
        self.acceptance_window = d * d + 1000.0;
        self.next_update = self.acceptance_window;
        self.state_initialized = true;
        self.reset_proposal();
    }

    /// Folds the most recent current point into the running estimates and
    /// triggers a decomposition refresh when one is due.
    fn update_state(&mut self, current: &[f64], value: f64) {
        if !self.state_initialized {
            self.initialize_state(current, value);
        }
        assert_eq!(
            current.len(),
            self.dim_proposals.len(),
            "mismatch in the dimensionality of the current point"
        );
        self.trials += 1;

        // The driver does not tell us whether its last step was accepted, so
        // detect movement by comparing against the point we saw last time.
        let accepted = value != self.last_value || current != self.last_point.as_slice();
        if accepted {
            self.successes += 1;
        }

        self.acceptance = (self.acceptance * self.acceptance_trials
            + if accepted { 1.0 } else { 0.0 })
            / (self.acceptance_trials + 1.0);
        self.acceptance_trials = (self.acceptance_trials + 1.0).min(self.acceptance_window);

        // Nudge the step width toward the target acceptance. The exponent is
        // small enough that the width is stationary once the acceptance
        // settles at the target.
        let exponent = 0.001f64.min(0.5 / self.acceptance_window);
        self.sigma *= (self.acceptance / self.target_acceptance).powf(exponent);

        // The mean update runs before the covariance update below uses it.
        // The resulting covariance estimator is slightly biased but
        // consistent, and the ordering is relied upon.
        for (m, &x) in self.central_point.iter_mut().zip(current) {
            *m = (*m * self.central_trials + x) / (self.central_trials + 1.0);
        }
        self.central_trials = (self.central_trials + 1.0).min(self.covariance_window);

        for i in 0..current.len() {
            for j in 0..=i {
                let r = (current[i] - self.central_point[i]) * (current[j] - self.central_point[j]);
                let v = (self.current_cov[(i, j)] * self.covariance_trials + r)
                    / (self.covariance_trials + 1.0);
                self.current_cov[(i, j)] = v;
                self.current_cov[(j, i)] = v;
            }
        }
        self.covariance_trials = (self.covariance_trials + 1.0).min(self.covariance_window);

        self.next_update -= 1.0;
        if accepted && self.next_update < 1.0 {
            self.next_update = self.acceptance_window + (self.successes / 2) as f64;
            self.update_proposal();
        }

        self.last_point.copy_from_slice(current);
        self.last_value = value;
    }

    /// Attempts to recompute the upper-triangular factor, repairing the
    /// covariance estimate once if the first attempt fails. Returns whether
    /// a valid factor is in place.
    fn refresh_decomposition(&mut self) -> bool {
        if let Some(chol) = na::Cholesky::new(self.current_cov.clone()) {
            self.decomposition = chol.l().transpose();
            return true;
        }
        self.repair_covariance();
        if let Some(chol) = na::Cholesky::new(self.current_cov.clone()) {
            self.decomposition = chol.l().transpose();
            return true;
        }
        false
    }

    /// Pushes the covariance estimate back toward something decomposable:
    /// floor collapsed variances, then clip runaway correlations.
    fn repair_covariance(&mut self) {
        let d = self.dim();
        let floor = f64::EPSILON.sqrt();
        for i in 0..d {
            let least = floor * self.dim_proposals[i].expected_variance();
            if self.current_cov[(i, i)] < least {
                self.current_cov[(i, i)] = least;
            }
        }
        for i in 0..d {
            for j in (i + 1)..d {
                let scale = (self.current_cov[(i, i)] * self.current_cov[(j, j)]).sqrt();
                if self.current_cov[(i, j)] >= MAX_CORRELATION * scale {
                    let clipped = MAX_CORRELATION * MAX_CORRELATION * scale;
                    self.current_cov[(i, j)] = clipped;
                    self.current_cov[(j, i)] = clipped;
                }
            }
        }
    }

    /// After a refresh the history is partially forgotten so that newer
    /// observations carry more weight in the updated estimates.
    fn deweight(&mut self) {
        self.covariance_trials = 1000f64
            .max(0.1 * self.covariance_trials)
            .min(0.1 * self.covariance_window);
        self.acceptance_trials = 1000f64
            .max(0.1 * self.acceptance_trials)
            .min(0.1 * self.acceptance_window);
    }
}

impl Proposal for AdaptiveProposal {
    /// Generates the next trial point.
    ///
    /// Uniform-typed dimensions are drawn independently from their bounds.
    /// The remaining dimensions receive the correlated step `sigma * U^T r`:
    /// one standard-normal variate is drawn per row of the factor and shared
    /// across that row's entries.
    fn propose<R: Rng>(
        &mut self,
        proposal: &mut [f64],
        current: &[f64],
        current_log_prob: f64,
        rng: &mut R,
    ) {
        assert_eq!(
            proposal.len(),
            current.len(),
            "proposal and current vectors must have the same length"
        );
        self.update_state(current, current_log_prob);

        proposal.copy_from_slice(current);
        let d = current.len();
        for i in 0..d {
            if let DimProposal::Uniform { min, max } = self.dim_proposals[i] {
                proposal[i] = rng.gen_range(min..max);
                continue;
            }
            let r: f64 = rng.sample(StandardNormal);
            for j in 0..d {
                if self.dim_proposals[j].is_uniform() {
                    continue;
                }
                proposal[j] += self.sigma * r * self.decomposition[(i, j)];
            }
        }
    }
}

/// A fixed-width isotropic Gaussian step. Not adaptive; mainly useful as a
/// baseline and for runs where the proposal must stay strictly Markovian.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleProposal {
    sigma: Option<f64>,
}

impl SimpleProposal {
    /// A step of the given width in every dimension.
    pub fn new(sigma: f64) -> Self {
        assert!(sigma > 0.0, "step width must be positive");
        SimpleProposal { sigma: Some(sigma) }
    }

    /// With no width configured, fall back to a crude guess based on the
    /// dimensionality alone.
    fn width(&self, dim: usize) -> f64 {
        self.sigma.unwrap_or_else(|| (1.0 / dim as f64).sqrt())
    }
}

impl Proposal for SimpleProposal {
    fn propose<R: Rng>(
        &mut self,
        proposal: &mut [f64],
        current: &[f64],
        _current_log_prob: f64,
        rng: &mut R,
    ) {
        assert_eq!(
            proposal.len(),
            current.len(),
            "proposal and current vectors must have the same length"
        );
        let sigma = self.width(current.len());
        for (p, &c) in proposal.iter_mut().zip(current) {
            let r: f64 = rng.sample(StandardNormal);
            *p = c + sigma * r;
        }
    }
}
