use indicatif::ProgressBar;
use indicatif::{MultiProgress, ProgressStyle};
use nalgebra as na;
use rand::Rng;
use rayon::prelude::*;
use thiserror::Error;

use crate::sampler::Sampler;

/// Errors reported at the configuration boundary of the sampler and the
/// proposal engine. Numerical trouble inside the proposal engine is repaired
/// internally and never surfaces here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum McmcError {
    #[error("dimensionality has already been set")]
    DimAlreadySet,
    #[error("dimension {0} is out of range")]
    DimOutOfRange(usize),
    #[error("invalid uniform bounds [{min}, {max})")]
    InvalidBounds { min: f64, max: f64 },
    #[error("target acceptance {0} must lie strictly between 0 and 1")]
    InvalidTargetAcceptance(f64),
    #[error("sampler must be started before stepping")]
    NotStarted,
}

/// A target distribution given as an unnormalized log-density over a
/// fixed-dimensional parameter vector.
///
/// Returning `f64::NEG_INFINITY` marks a point with zero probability; such
/// proposals are always rejected. A `NaN` return is treated like negative
/// infinity.
pub trait Target {
    /// Returns the log of the unnormalized density at `position`.
    fn unnorm_log_prob(&self, position: &[f64]) -> f64;
}

/// Adapter turning a plain closure over a parameter slice into a [`Target`].
///
/// ```rust
/// use adaptive_mh::core::{LogProbFn, Target};
///
/// let target = LogProbFn(|x: &[f64]| -0.5 * x[0] * x[0]);
/// assert_eq!(target.unnorm_log_prob(&[2.0]), -2.0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct LogProbFn<F>(pub F);

impl<F: Fn(&[f64]) -> f64> Target for LogProbFn<F> {
    fn unnorm_log_prob(&self, position: &[f64]) -> f64 {
        (self.0)(position)
    }
}

/// Generates the next trial point of a Markov chain.
pub trait Proposal {
    /// Fills `proposal` with a trial point derived from `current`, the most
    /// recently accepted point, and `current_log_prob`, its log-density.
    ///
    /// `proposal` and `current` must have the same length.
    fn propose<R: Rng>(
        &mut self,
        proposal: &mut [f64],
        current: &[f64],
        current_log_prob: f64,
        rng: &mut R,
    );
}

/// One emitted chain record: the accepted state after a step, together with
/// the trial step that was attempted to reach it.
#[derive(Debug, Clone, Copy)]
pub struct StepRecord<'a> {
    /// Log-density at the accepted point.
    pub log_likelihood: f64,
    /// The accepted point after the step.
    pub point: &'a [f64],
    /// Difference between the proposed point and the previously accepted one.
    pub trial_step: &'a [f64],
    /// Whether the step moved to the proposed point.
    pub accepted: bool,
}

/// Consumes chain records as they are produced. Implementations must not
/// fail from `record`; sinks with fallible backends buffer their first error
/// and surface it when finished.
pub trait ChainSink {
    fn record(&mut self, record: &StepRecord<'_>);
}

/// A sink that drops every record. Stands in for "no sink configured".
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ChainSink for NoopSink {
    fn record(&mut self, _record: &StepRecord<'_>) {}
}

/// An in-memory sink keeping the full chain, mainly for tests and small runs.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    dim: usize,
    log_likelihoods: Vec<f64>,
    accepted: Vec<bool>,
    points: Vec<f64>,
    trial_steps: Vec<f64>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.log_likelihoods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log_likelihoods.is_empty()
    }

    /// The accepted point recorded at step `index`.
    pub fn point(&self, index: usize) -> &[f64] {
        &self.points[index * self.dim..(index + 1) * self.dim]
    }

    /// The trial step recorded at step `index`.
    pub fn trial_step(&self, index: usize) -> &[f64] {
        &self.trial_steps[index * self.dim..(index + 1) * self.dim]
    }

    pub fn log_likelihoods(&self) -> &[f64] {
        &self.log_likelihoods
    }

    pub fn accepted(&self) -> &[bool] {
        &self.accepted
    }

    /// Fraction of recorded steps that moved.
    pub fn acceptance_rate(&self) -> f64 {
        if self.accepted.is_empty() {
            return 0.0;
        }
        let moved = self.accepted.iter().filter(|&&a| a).count();
        moved as f64 / self.accepted.len() as f64
    }

    /// All recorded points as an `n_steps x dim` matrix.
    pub fn points(&self) -> na::DMatrix<f64> {
        na::DMatrix::from_row_slice(self.len(), self.dim, &self.points)
    }
}

impl ChainSink for Trace {
    fn record(&mut self, record: &StepRecord<'_>) {
        if self.dim == 0 {
            self.dim = record.point.len();
        }
        self.log_likelihoods.push(record.log_likelihood);
        self.accepted.push(record.accepted);
        self.points.extend_from_slice(record.point);
        self.trial_steps.extend_from_slice(record.trial_step);
    }
}

/// Runs a started sampler for `n_steps` iterations, discarding the first
/// `discard` of them (burn-in) instead of recording them to the sink.
pub fn run_chain<D, Q, S>(
    sampler: &mut Sampler<D, Q, S>,
    n_steps: usize,
    discard: usize,
) -> Result<(), McmcError>
where
    D: Target,
    Q: Proposal,
    S: ChainSink,
{
    for _ in 0..discard.min(n_steps) {
        sampler.step(false)?;
    }
    for _ in discard.min(n_steps)..n_steps {
        sampler.step(true)?;
    }
    Ok(())
}

pub fn run_chain_with_progress<D, Q, S>(
    sampler: &mut Sampler<D, Q, S>,
    n_steps: usize,
    discard: usize,
    pb: &ProgressBar,
) -> Result<(), McmcError>
where
    D: Target,
    Q: Proposal,
    S: ChainSink,
{
    pb.set_length(n_steps as u64);
    for i in 0..n_steps {
        sampler.step(i >= discard)?;
        pb.inc(1);
    }
    Ok(())
}

/// Runs several independent samplers in parallel. Each sampler owns its own
/// random number generator, so the chains never share random state.
pub fn run_chains<D, Q, S>(
    samplers: &mut [Sampler<D, Q, S>],
    n_steps: usize,
    discard: usize,
) -> Result<(), McmcError>
where
    D: Target + Send,
    Q: Proposal + Send,
    S: ChainSink + Send,
{
    samplers
        .par_iter_mut()
        .try_for_each(|sampler| run_chain(sampler, n_steps, discard))
}

pub fn run_chains_with_progress<D, Q, S>(
    samplers: &mut [Sampler<D, Q, S>],
    n_steps: usize,
    discard: usize,
) -> Result<(), McmcError>
where
    D: Target + Send,
    Q: Proposal + Send,
    S: ChainSink + Send,
{
    let multi = MultiProgress::new();
    let pb_style = ProgressStyle::default_bar()
        .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap()
        .progress_chars("##-");

    samplers
        .par_iter_mut()
        .enumerate()
        .try_for_each(|(i, sampler)| {
            let pb = multi.add(ProgressBar::new(n_steps as u64));
            pb.set_prefix(format!("Chain {i}"));
            pb.set_style(pb_style.clone());
            let result = run_chain_with_progress(sampler, n_steps, discard, &pb);
            pb.finish_with_message("Done!");
            result
        })
}
