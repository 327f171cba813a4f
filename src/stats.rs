//! Online moment tracking and sample covariance helpers.

use nalgebra as na;
use std::error::Error;

/// Counted per-coordinate mean and mean-square, updated one sample at a
/// time. Useful for summarizing long chains without storing them.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningMoments {
    n: u64,
    mean: Vec<f64>,
    mean_sq: Vec<f64>,
}

impl RunningMoments {
    pub fn new(dim: usize) -> Self {
        RunningMoments {
            n: 0,
            mean: vec![0.0; dim],
            mean_sq: vec![0.0; dim],
        }
    }

    /// Folds one sample into the moments. The sample length must match the
    /// tracker's dimensionality.
    pub fn push(&mut self, sample: &[f64]) {
        assert_eq!(sample.len(), self.mean.len(), "sample length mismatch");
        self.n += 1;
        let n = self.n as f64;
        for ((mean, mean_sq), &x) in self.mean.iter_mut().zip(&mut self.mean_sq).zip(sample) {
            *mean = (*mean * (n - 1.0) + x) / n;
            *mean_sq = (*mean_sq * (n - 1.0) + x * x) / n;
        }
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Per-coordinate sample variance (with the `n / (n - 1)` correction).
    pub fn variance(&self) -> Vec<f64> {
        let n = self.n as f64;
        self.mean
            .iter()
            .zip(&self.mean_sq)
            .map(|(&m, &m2)| (m2 - m * m) * n / (n - 1.0))
            .collect()
    }
}

/// Sample covariance of row-wise observations in an `n x d` matrix.
pub fn cov(samples: &na::DMatrix<f64>) -> Result<na::DMatrix<f64>, Box<dyn Error>> {
    let n = samples.nrows();
    if n < 2 {
        return Err("need at least two samples to estimate a covariance".into());
    }
    let mean = samples.row_mean();
    let mut centered = samples.clone();
    for mut row in centered.row_iter_mut() {
        row -= &mean;
    }
    Ok(centered.transpose() * centered / (n as f64 - 1.0))
}
