/*!
Example target distributions.

These are users of the sampler rather than part of its machinery: a diagonal
Gaussian for smoke tests and calibration, and a Gaussian posterior with a
soft constraint on the parameter sum, the kind of setup that shows up in
histogram fits with correlated systematics. Plain closures work as targets
too, through [`LogProbFn`](crate::core::LogProbFn).
*/

use crate::core::Target;

/// A Gaussian with independent components, given per-axis means and widths.
#[derive(Debug, Clone)]
pub struct DiagonalGaussian {
    mean: Vec<f64>,
    sigma: Vec<f64>,
}

impl DiagonalGaussian {
    /// Creates a diagonal Gaussian. `mean` and `sigma` must have the same
    /// length and every width must be positive.
    pub fn new(mean: Vec<f64>, sigma: Vec<f64>) -> Self {
        assert_eq!(mean.len(), sigma.len(), "mean and sigma lengths differ");
        assert!(
            sigma.iter().all(|&s| s > 0.0),
            "all widths must be positive"
        );
        DiagonalGaussian { mean, sigma }
    }

    /// The standard normal in `dim` dimensions.
    pub fn standard(dim: usize) -> Self {
        DiagonalGaussian {
            mean: vec![0.0; dim],
            sigma: vec![1.0; dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }
}

impl Target for DiagonalGaussian {
    fn unnorm_log_prob(&self, position: &[f64]) -> f64 {
        let mut sum = 0.0;
        for ((&x, &m), &s) in position.iter().zip(&self.mean).zip(&self.sigma) {
            let z = (x - m) / s;
            sum += z * z;
        }
        -0.5 * sum
    }
}

/// Independent Gaussian priors on each component plus a soft Gaussian
/// constraint on the component sum.
///
/// The log-density is
/// `-((Σx - sum_value) / sum_sigma)^2 / 2 - Σ ((x_i - expected_i) / sigma_i)^2 / 2`.
#[derive(Debug, Clone)]
pub struct ConstrainedSumGaussian {
    expected: Vec<f64>,
    sigma: Vec<f64>,
    sum_value: f64,
    sum_sigma: f64,
}

impl ConstrainedSumGaussian {
    pub fn new(expected: Vec<f64>, sigma: Vec<f64>, sum_value: f64, sum_sigma: f64) -> Self {
        assert_eq!(
            expected.len(),
            sigma.len(),
            "expected and sigma lengths differ"
        );
        assert!(
            sigma.iter().all(|&s| s > 0.0) && sum_sigma > 0.0,
            "all widths must be positive"
        );
        ConstrainedSumGaussian {
            expected,
            sigma,
            sum_value,
            sum_sigma,
        }
    }

    pub fn dim(&self) -> usize {
        self.expected.len()
    }
}

impl Target for ConstrainedSumGaussian {
    fn unnorm_log_prob(&self, position: &[f64]) -> f64 {
        let sum: f64 = position.iter().sum();
        let z = (sum - self.sum_value) / self.sum_sigma;
        let mut log_prob = -0.5 * z * z;

        for ((&x, &e), &s) in position.iter().zip(&self.expected).zip(&self.sigma) {
            let v = (x - e) / s;
            log_prob -= 0.5 * v * v;
        }
        log_prob
    }
}
