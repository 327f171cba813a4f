//! The multi-chain runners: parallel chains must stay independent (each
//! sampler owns its generator), and the progress-bar wrappers must not
//! change what gets sampled or saved.

use adaptive_mh::core::{
    run_chain, run_chain_with_progress, run_chains, run_chains_with_progress, Trace,
};
use adaptive_mh::distributions::DiagonalGaussian;
use adaptive_mh::proposal::AdaptiveProposal;
use adaptive_mh::sampler::Sampler;
use indicatif::ProgressBar;

fn started_sampler(seed: u64) -> Sampler<DiagonalGaussian, AdaptiveProposal, Trace> {
    let mut sampler = Sampler::new(DiagonalGaussian::standard(2), AdaptiveProposal::new())
        .with_sink(Trace::new())
        .set_seed(seed);
    sampler.start(&[0.0, 0.0], false);
    sampler
}

#[test]
fn parallel_chains_are_independent() {
    const N_STEPS: usize = 500;
    const DISCARD: usize = 100;

    let mut samplers: Vec<_> = (0..4).map(|i| started_sampler(42 + i)).collect();
    run_chains(&mut samplers, N_STEPS, DISCARD).unwrap();

    let traces: Vec<Trace> = samplers
        .into_iter()
        .map(|sampler| sampler.into_sink().unwrap())
        .collect();
    for trace in &traces {
        assert_eq!(trace.len(), N_STEPS - DISCARD);
    }
    // Distinct seeds mean distinct random streams, so no two chains should
    // ever retrace each other.
    for i in 0..traces.len() {
        for j in (i + 1)..traces.len() {
            assert_ne!(
                traces[i].points(),
                traces[j].points(),
                "chains {i} and {j} produced identical paths"
            );
        }
    }
}

#[test]
fn progress_runner_matches_plain_runner() {
    const N_STEPS: usize = 300;
    const DISCARD: usize = 50;

    let mut plain = started_sampler(7);
    run_chain(&mut plain, N_STEPS, DISCARD).unwrap();

    let mut with_progress = started_sampler(7);
    let pb = ProgressBar::hidden();
    run_chain_with_progress(&mut with_progress, N_STEPS, DISCARD, &pb).unwrap();

    let a = plain.into_sink().unwrap();
    let b = with_progress.into_sink().unwrap();
    assert_eq!(a.len(), N_STEPS - DISCARD);
    assert_eq!(a.len(), b.len());
    // Same seed, so the progress wrapper must reproduce the chain exactly.
    assert_eq!(a.points(), b.points());
    assert_eq!(a.accepted(), b.accepted());
}

#[test]
fn progress_chains_runner_saves_every_chain() {
    const N_STEPS: usize = 200;
    const DISCARD: usize = 50;

    let mut samplers: Vec<_> = (0..2).map(|i| started_sampler(100 + i)).collect();
    run_chains_with_progress(&mut samplers, N_STEPS, DISCARD).unwrap();

    for sampler in samplers {
        let trace = sampler.into_sink().unwrap();
        assert_eq!(trace.len(), N_STEPS - DISCARD);
    }
}
