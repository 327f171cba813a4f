/*!
# Metropolis–Hastings driver

[`Sampler`] runs the accept/reject loop of a Markov-Chain Monte Carlo run:
ask the proposal for a trial point, evaluate the target's log-density there,
apply the Metropolis–Hastings rule, and hand the outcome to an optional
[`ChainSink`].

The sampler is generic over the target, the proposal and the sink, so the
inner loop is fully statically dispatched. It owns a [`SmallRng`] seeded
through the [`set_seed`](Sampler::set_seed) builder; runs with the same seed
are bit-for-bit reproducible.

## Example

```rust
use adaptive_mh::core::Trace;
use adaptive_mh::distributions::DiagonalGaussian;
use adaptive_mh::proposal::AdaptiveProposal;
use adaptive_mh::sampler::Sampler;

let target = DiagonalGaussian::standard(2);
let mut sampler = Sampler::new(target, AdaptiveProposal::new())
    .with_sink(Trace::new())
    .set_seed(42);

sampler.start(&[0.0, 0.0], true);
for _ in 0..100 {
    sampler.step(true).unwrap();
}

let trace = sampler.into_sink().unwrap();
assert_eq!(trace.len(), 101);
```
*/

use rand::rngs::SmallRng;
use rand::{thread_rng, Rng, SeedableRng};

use crate::core::{ChainSink, McmcError, NoopSink, Proposal, StepRecord, Target};

/// A single-chain Metropolis–Hastings sampler.
///
/// The sampler owns its target distribution and proposal; the sink is
/// optional and can be recovered with [`into_sink`](Self::into_sink) once
/// the run is over. [`start`](Self::start) must be called before
/// [`step`](Self::step).
#[derive(Debug, Clone)]
pub struct Sampler<D, Q, S = NoopSink> {
    /// The target distribution to sample from.
    target: D,
    /// The proposal used to generate candidate states.
    proposal: Q,
    /// Optional consumer of per-step records.
    sink: Option<S>,
    /// The random seed.
    seed: u64,
    /// The random number generator driving both the proposal and the
    /// accept/reject test.
    rng: SmallRng,
    /// The last accepted point. Equal to `proposed` whenever the most recent
    /// step was accepted.
    accepted: Vec<f64>,
    accepted_log_prob: f64,
    /// The most recently proposed point.
    proposed: Vec<f64>,
    proposed_log_prob: f64,
    /// The difference between the proposed point and the previously accepted
    /// one, captured before the accept/reject decision.
    trial_step: Vec<f64>,
}

impl<D, Q> Sampler<D, Q>
where
    D: Target,
    Q: Proposal,
{
    /// Creates a sampler with no sink attached, seeded from entropy.
    pub fn new(target: D, proposal: Q) -> Self {
        let seed = thread_rng().gen::<u64>();
        Sampler {
            target,
            proposal,
            sink: None,
            seed,
            rng: SmallRng::seed_from_u64(seed),
            accepted: Vec::new(),
            accepted_log_prob: 0.0,
            proposed: Vec::new(),
            proposed_log_prob: 0.0,
            trial_step: Vec::new(),
        }
    }
}

impl<D, Q, S> Sampler<D, Q, S>
where
    D: Target,
    Q: Proposal,
    S: ChainSink,
{
    /// Attaches a sink that will receive one record per saved step.
    pub fn with_sink<S2: ChainSink>(self, sink: S2) -> Sampler<D, Q, S2> {
        Sampler {
            target: self.target,
            proposal: self.proposal,
            sink: Some(sink),
            seed: self.seed,
            rng: self.rng,
            accepted: self.accepted,
            accepted_log_prob: self.accepted_log_prob,
            proposed: self.proposed,
            proposed_log_prob: self.proposed_log_prob,
            trial_step: self.trial_step,
        }
    }

    /// Reseeds the sampler for a reproducible run.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// Sets the starting point. The target is evaluated once, and the point
    /// becomes both the accepted and the proposed state. With `save` the
    /// start is emitted to the sink as a single accepted record.
    pub fn start(&mut self, start: &[f64], save: bool) {
        self.proposed = start.to_vec();
        self.accepted = start.to_vec();
        self.trial_step = vec![0.0; start.len()];
        self.proposed_log_prob = self.target.unnorm_log_prob(start);
        self.accepted_log_prob = self.proposed_log_prob;
        if save {
            self.save_step(true);
        }
    }

    /// Takes one Metropolis–Hastings step. Returns whether the proposed
    /// point was accepted. With `save` the outcome is emitted to the sink
    /// either way.
    ///
    /// The target is evaluated exactly once per step; the log-density at the
    /// accepted point is cached.
    pub fn step(&mut self, save: bool) -> Result<bool, McmcError> {
        if self.accepted.is_empty() {
            return Err(McmcError::NotStarted);
        }

        self.proposal.propose(
            &mut self.proposed,
            &self.accepted,
            self.accepted_log_prob,
            &mut self.rng,
        );

        // The trial step has to be captured before the accepted point is
        // overwritten below.
        for ((step, &proposed), &accepted) in self
            .trial_step
            .iter_mut()
            .zip(self.proposed.iter())
            .zip(self.accepted.iter())
        {
            *step = proposed - accepted;
        }

        self.proposed_log_prob = self.target.unnorm_log_prob(&self.proposed);
        let delta = self.proposed_log_prob - self.accepted_log_prob;

        // An improvement is always kept. Otherwise draw u and keep the step
        // when log(u) <= delta; IEEE semantics make log(0) negative infinity,
        // so a u of exactly zero accepts. A NaN log-density fails both
        // comparisons and is rejected.
        let accept = if delta >= 0.0 {
            true
        } else {
            self.rng.gen::<f64>().ln() <= delta
        };

        if accept {
            self.accepted.copy_from_slice(&self.proposed);
            self.accepted_log_prob = self.proposed_log_prob;
        }
        if save {
            self.save_step(accept);
        }
        Ok(accept)
    }

    /// The most recently accepted point. Empty before [`start`](Self::start).
    pub fn accepted(&self) -> &[f64] {
        &self.accepted
    }

    /// Log-density at the most recently accepted point.
    pub fn accepted_log_prob(&self) -> f64 {
        self.accepted_log_prob
    }

    /// The most recently proposed point.
    pub fn proposed(&self) -> &[f64] {
        &self.proposed
    }

    /// Log-density at the most recently proposed point.
    pub fn proposed_log_prob(&self) -> f64 {
        self.proposed_log_prob
    }

    /// The seed this sampler's generator was built from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn target(&self) -> &D {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut D {
        &mut self.target
    }

    /// Read access to the proposal, e.g. to inspect the adaptive state.
    pub fn proposal(&self) -> &Q {
        &self.proposal
    }

    /// Write access to the proposal, e.g. to configure per-dimension
    /// overrides before starting.
    pub fn proposal_mut(&mut self) -> &mut Q {
        &mut self.proposal
    }

    pub fn sink(&self) -> Option<&S> {
        self.sink.as_ref()
    }

    pub fn sink_mut(&mut self) -> Option<&mut S> {
        self.sink.as_mut()
    }

    /// Consumes the sampler and hands back the sink.
    pub fn into_sink(self) -> Option<S> {
        self.sink
    }

    fn save_step(&mut self, accepted: bool) {
        if let Some(sink) = self.sink.as_mut() {
            sink.record(&StepRecord {
                log_likelihood: self.accepted_log_prob,
                point: &self.accepted,
                trial_step: &self.trial_step,
                accepted,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LogProbFn, Trace};
    use crate::distributions::DiagonalGaussian;
    use crate::proposal::{AdaptiveProposal, SimpleProposal};
    use std::cell::Cell;

    #[test]
    fn step_before_start_errors() {
        let target = DiagonalGaussian::standard(2);
        let mut sampler = Sampler::new(target, SimpleProposal::new(1.0));
        assert_eq!(sampler.step(true), Err(McmcError::NotStarted));
    }

    #[test]
    fn start_saves_exactly_one_record() {
        let target = DiagonalGaussian::standard(2);
        let mut sampler = Sampler::new(target, SimpleProposal::new(1.0))
            .with_sink(Trace::new())
            .set_seed(1);
        sampler.start(&[0.5, -0.5], true);
        let lp = sampler.accepted_log_prob();
        let trace = sampler.into_sink().unwrap();
        assert_eq!(trace.len(), 1);
        assert_eq!(trace.point(0), &[0.5, -0.5]);
        assert_eq!(trace.trial_step(0), &[0.0, 0.0]);
        assert_eq!(trace.accepted(), &[true]);
        assert_eq!(trace.log_likelihoods()[0], lp);
    }

    #[test]
    fn start_sets_both_points() {
        let target = DiagonalGaussian::standard(3);
        let mut sampler = Sampler::new(target, SimpleProposal::new(1.0)).set_seed(2);
        sampler.start(&[1.0, 2.0, 3.0], false);
        assert_eq!(sampler.accepted(), &[1.0, 2.0, 3.0]);
        assert_eq!(sampler.proposed(), &[1.0, 2.0, 3.0]);
        assert_eq!(sampler.accepted_log_prob(), sampler.proposed_log_prob());
        assert_eq!(sampler.accepted_log_prob(), -0.5 * (1.0 + 4.0 + 9.0));
    }

    #[test]
    fn improvements_are_always_accepted() {
        // A target whose value grows on every evaluation, so every proposal
        // is an improvement over the cached value.
        let calls = Cell::new(0u64);
        let target = LogProbFn(|_: &[f64]| {
            calls.set(calls.get() + 1);
            calls.get() as f64
        });
        let mut sampler = Sampler::new(target, SimpleProposal::new(1.0)).set_seed(3);
        sampler.start(&[0.0], false);
        assert_eq!(calls.get(), 1);
        for _ in 0..200 {
            assert!(sampler.step(false).unwrap());
        }
        // Exactly one evaluation per step.
        assert_eq!(calls.get(), 201);
    }

    #[test]
    fn zero_probability_proposals_are_rejected() {
        let target = LogProbFn(|position: &[f64]| {
            if position[0] == 0.0 {
                0.0
            } else {
                f64::NEG_INFINITY
            }
        });
        let mut sampler = Sampler::new(target, SimpleProposal::new(1.0)).set_seed(4);
        sampler.start(&[0.0], false);
        for _ in 0..100 {
            assert!(!sampler.step(false).unwrap());
        }
        assert_eq!(sampler.accepted(), &[0.0]);
        assert_eq!(sampler.accepted_log_prob(), 0.0);
    }

    #[test]
    fn nan_log_density_is_rejected() {
        let target = LogProbFn(|position: &[f64]| {
            if position[0] == 0.0 {
                0.0
            } else {
                f64::NAN
            }
        });
        let mut sampler = Sampler::new(target, SimpleProposal::new(1.0)).set_seed(5);
        sampler.start(&[0.0], false);
        for _ in 0..100 {
            assert!(!sampler.step(false).unwrap());
        }
        assert_eq!(sampler.accepted(), &[0.0]);
    }

    #[test]
    fn trial_step_connects_consecutive_records() {
        let target = DiagonalGaussian::standard(2);
        let mut sampler = Sampler::new(target, SimpleProposal::new(0.8))
            .with_sink(Trace::new())
            .set_seed(6);
        sampler.start(&[0.0, 0.0], true);
        for _ in 0..50 {
            sampler.step(true).unwrap();
        }
        let trace = sampler.into_sink().unwrap();
        for i in 1..trace.len() {
            if trace.accepted()[i] {
                for j in 0..2 {
                    let reconstructed = trace.point(i - 1)[j] + trace.trial_step(i)[j];
                    assert!((reconstructed - trace.point(i)[j]).abs() < 1e-12);
                }
            } else {
                assert_eq!(trace.point(i), trace.point(i - 1));
            }
        }
    }

    #[test]
    fn same_seed_reproduces_the_chain() {
        let run = || {
            let target = DiagonalGaussian::standard(2);
            let mut sampler = Sampler::new(target, AdaptiveProposal::new())
                .with_sink(Trace::new())
                .set_seed(42);
            sampler.start(&[1.0, -1.0], true);
            for _ in 0..500 {
                sampler.step(true).unwrap();
            }
            sampler.into_sink().unwrap()
        };
        let a = run();
        let b = run();
        assert_eq!(a.len(), b.len());
        for i in 0..a.len() {
            assert_eq!(a.point(i), b.point(i));
        }
        assert_eq!(a.accepted(), b.accepted());
    }

    #[test]
    fn dimensionality_is_inferred_by_the_proposal() {
        let target = DiagonalGaussian::standard(3);
        let mut sampler = Sampler::new(target, AdaptiveProposal::new()).set_seed(7);
        sampler.start(&[0.0, 0.0, 0.0], false);
        sampler.step(false).unwrap();
        assert_eq!(sampler.proposal().dim(), 3);
    }
}
