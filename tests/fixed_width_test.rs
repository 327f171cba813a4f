//! With a fixed-width proposal the chain is a plain Metropolis–Hastings
//! walk, so the empirical distribution must converge to the target without
//! any help from adaptation.

use adaptive_mh::core::{run_chain, Trace};
use adaptive_mh::distributions::DiagonalGaussian;
use adaptive_mh::proposal::SimpleProposal;
use adaptive_mh::sampler::Sampler;
use adaptive_mh::stats::cov;

#[test]
fn fixed_width_walk_matches_target_moments() {
    const BURNIN: usize = 5_000;
    const SAMPLES: usize = 40_000;
    const SEED: u64 = 42;

    // Independent components with distinct widths.
    let target = DiagonalGaussian::new(vec![0.0, 1.0], vec![2.0, 1.5]);
    let mut sampler = Sampler::new(target, SimpleProposal::new(1.0))
        .with_sink(Trace::new())
        .set_seed(SEED);

    sampler.start(&[10.0, 12.0], false);
    run_chain(&mut sampler, BURNIN + SAMPLES, BURNIN).unwrap();

    let trace = sampler.into_sink().unwrap();
    let samples = trace.points();
    let mean = samples.row_mean();
    let covariance = cov(&samples).expect("covariance estimate failed");

    assert!(
        (mean[0] - 0.0).abs() < 0.5,
        "first mean off target: {}",
        mean[0]
    );
    assert!(
        (mean[1] - 1.0).abs() < 0.5,
        "second mean off target: {}",
        mean[1]
    );
    assert!(
        (covariance[(0, 0)] - 4.0).abs() < 0.6,
        "first variance off target: {}",
        covariance[(0, 0)]
    );
    assert!(
        (covariance[(1, 1)] - 2.25).abs() < 0.5,
        "second variance off target: {}",
        covariance[(1, 1)]
    );
    assert!(
        covariance[(0, 1)].abs() < 0.3,
        "spurious correlation between independent dimensions: {}",
        covariance[(0, 1)]
    );
}
