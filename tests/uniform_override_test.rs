//! A dimension overridden to a uniform proposal draws independently from its
//! bounds on every step, untouched by the correlated Gaussian update.

use adaptive_mh::distributions::DiagonalGaussian;
use adaptive_mh::proposal::AdaptiveProposal;
use adaptive_mh::sampler::Sampler;
use adaptive_mh::stats::{cov, RunningMoments};
use nalgebra as na;

#[test]
fn uniform_dimension_draws_from_bounds() {
    const STEPS: usize = 20_000;
    const SEED: u64 = 42;

    let target = DiagonalGaussian::standard(2);
    let mut proposal = AdaptiveProposal::new();
    proposal.set_dim(2).unwrap();
    proposal.set_uniform(0, -5.0, 5.0).unwrap();

    let mut sampler = Sampler::new(target, proposal).set_seed(SEED);
    sampler.start(&[0.0, 0.0], false);

    let mut proposed_first = RunningMoments::new(1);
    let mut pairs = Vec::with_capacity(2 * STEPS);
    for _ in 0..STEPS {
        let before = sampler.accepted()[1];
        sampler.step(false).unwrap();
        let proposed = sampler.proposed();
        assert!(
            (-5.0..5.0).contains(&proposed[0]),
            "uniform dimension left its bounds: {}",
            proposed[0]
        );
        proposed_first.push(&proposed[..1]);
        // Pair each uniform draw with the Gaussian dimension's trial step.
        pairs.push(proposed[0]);
        pairs.push(proposed[1] - before);
    }

    // The proposed values in the overridden dimension should look like
    // independent U(-5, 5) draws: mean 0, variance 100 / 12.
    let mean = proposed_first.mean()[0];
    let variance = proposed_first.variance()[0];
    assert!(mean.abs() < 0.2, "uniform proposals off-center: {mean}");
    assert!(
        (7.5..9.2).contains(&variance),
        "uniform proposals have the wrong spread: {variance}"
    );

    // The correlated update must skip the overridden dimension entirely, so
    // the uniform draws and the Gaussian trial steps are uncorrelated even
    // once the engine has built up a covariance estimate.
    let samples = na::DMatrix::from_row_slice(STEPS, 2, &pairs);
    let c = cov(&samples).expect("covariance estimate failed");
    let correlation = c[(0, 1)] / (c[(0, 0)] * c[(1, 1)]).sqrt();
    assert!(
        correlation.abs() < 0.05,
        "uniform draws correlate with gaussian steps: {correlation}"
    );
}
