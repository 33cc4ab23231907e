use super::BaselineCorrection;
use super::banded::{BandMatrix, BandedSolver, DefaultBandedSolver};
use crate::error::{RamanError, Result};

/// Penalty matrices shared by every iteration of one smoothing call.
#[derive(Debug, Clone)]
pub struct Penalties {
    /// `λ·D₂ᵀD₂`, the curvature penalty.
    pub curvature: BandMatrix,
    /// `D₁ᵀD₁`, unscaled; policies that need a slope penalty scale it themselves.
    pub slope: BandMatrix,
}

impl Penalties {
    pub fn new(n: usize, lam: f64) -> Self {
        let mut curvature = BandMatrix::difference_penalty(n, 2);
        curvature.scale_rows(&vec![lam; n]);
        Self {
            curvature,
            slope: BandMatrix::difference_penalty(n, 1),
        }
    }
}

/// Result of one weight update.
#[derive(Debug, Clone)]
pub struct WeightUpdate {
    pub weights: Vec<f64>,
    pub converged: bool,
    /// The quantity the policy compares against its stopping threshold.
    pub criterion: f64,
}

/// How an IRPLS baseline method turns the current residual into new weights.
///
/// The default system is `(W + λDᵀD) z = W y`; policies that mix extra terms
/// into the system matrix override [`WeightPolicy::system`].
pub trait WeightPolicy {
    fn name(&self) -> &'static str;

    fn max_iter(&self) -> usize;

    /// Policies that always run `max_iter` iterations never report
    /// non-convergence.
    fn fixed_iterations(&self) -> bool {
        false
    }

    fn initial_weights(&self, y: &[f64]) -> Vec<f64> {
        vec![1.0; y.len()]
    }

    fn system(&self, penalties: &Penalties, weights: &[f64], y: &[f64]) -> (BandMatrix, Vec<f64>) {
        let mut a = penalties.curvature.clone();
        a.add_diagonal(weights);
        let b = weights.iter().zip(y).map(|(w, y)| w * y).collect();
        (a, b)
    }

    fn update(&self, y: &[f64], z: &[f64], weights: &[f64], iteration: usize) -> WeightUpdate;
}

/// The iteratively reweighted penalized least-squares loop.
#[derive(Debug, Clone)]
pub struct PenalizedSmoother<S: BandedSolver = DefaultBandedSolver> {
    lam: f64,
    solver: S,
}

impl PenalizedSmoother {
    pub fn new(lam: f64) -> Self {
        Self {
            lam,
            solver: DefaultBandedSolver,
        }
    }
}

impl<S: BandedSolver> PenalizedSmoother<S> {
    pub fn with_solver(lam: f64, solver: S) -> Self {
        Self { lam, solver }
    }

    pub fn lam(&self) -> f64 {
        self.lam
    }

    pub fn run<P: WeightPolicy + ?Sized>(&self, y: &[f64], policy: &P) -> Result<BaselineCorrection> {
        let n = y.len();
        let method = policy.name();
        let max_iter = policy.max_iter().max(1);
        let penalties = Penalties::new(n, self.lam);

        log::info!(
            "Running {method} baseline on {n} points (lambda {:e}, max_iter {max_iter})",
            self.lam
        );

        let mut weights = policy.initial_weights(y);
        let mut baseline = Vec::new();

        for iteration in 1..=max_iter {
            let (a, b) = policy.system(&penalties, &weights, y);
            baseline = self
                .solver
                .solve(&a, &b)
                .map_err(|e| RamanError::IllConditioned {
                    method: method.to_owned(),
                    iteration,
                    detail: e.to_string(),
                })?;

            let update = policy.update(y, &baseline, &weights, iteration);
            log::debug!(
                "{method} iteration {iteration}: criterion {:e}",
                update.criterion
            );
            weights = update.weights;

            if update.converged {
                log::info!("{method} converged after {iteration} iterations");
                return Ok(BaselineCorrection::new(y, baseline, iteration));
            }
        }

        let correction = BaselineCorrection::new(y, baseline, max_iter);
        if policy.fixed_iterations() {
            return Ok(correction);
        }

        let residual_norm = correction.corrected.iter().map(|r| r * r).sum::<f64>().sqrt();
        log::warn!("{method} reached {max_iter} iterations without converging");
        Err(RamanError::NotConverged {
            method: method.to_owned(),
            iterations: max_iter,
            residual_norm,
            last: Box::new(correction),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::banded::SolveError;
    use crate::error::ErrorKind;

    struct Uniform {
        max_iter: usize,
        converge_at: Option<usize>,
    }

    impl WeightPolicy for Uniform {
        fn name(&self) -> &'static str {
            "uniform"
        }

        fn max_iter(&self) -> usize {
            self.max_iter
        }

        fn update(&self, _y: &[f64], _z: &[f64], weights: &[f64], iteration: usize) -> WeightUpdate {
            WeightUpdate {
                weights: weights.to_vec(),
                converged: self.converge_at == Some(iteration),
                criterion: 0.0,
            }
        }
    }

    struct Failing;

    impl BandedSolver for Failing {
        fn solve(&self, _a: &BandMatrix, _b: &[f64]) -> std::result::Result<Vec<f64>, SolveError> {
            Err(SolveError::Singular { row: 0 })
        }
    }

    #[test]
    fn test_smooths_towards_a_line() {
        let y: Vec<f64> = (0..50)
            .map(|i| 1.0 + 0.5 * i as f64 + if i % 2 == 0 { 0.3 } else { -0.3 })
            .collect();
        let policy = Uniform {
            max_iter: 3,
            converge_at: Some(1),
        };
        let result = PenalizedSmoother::new(1e8).run(&y, &policy).unwrap();
        assert_eq!(result.iterations, 1, "converged on the first iteration");
        for (i, z) in result.baseline.iter().enumerate() {
            assert!((z - (1.0 + 0.5 * i as f64)).abs() < 0.05, "heavy smoothing leaves the line");
        }
    }

    #[test]
    fn test_reports_non_convergence_with_last_iterate() {
        let y = vec![1.0; 10];
        let policy = Uniform {
            max_iter: 4,
            converge_at: None,
        };
        let err = PenalizedSmoother::new(10.0).run(&y, &policy).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Numerical, "{err}");
        match &err {
            RamanError::NotConverged {
                method, iterations, ..
            } => {
                assert_eq!(method, "uniform", "policy name is reported");
                assert_eq!(*iterations, 4, "all iterations were run");
            }
            other => panic!("unexpected error {other}"),
        }
        let last = err.last_iterate().unwrap();
        assert!(last.baseline.iter().all(|z| (z - 1.0).abs() < 1e-9), "last iterate is kept");
    }

    #[test]
    fn test_solver_failure_is_ill_conditioned() {
        let policy = Uniform {
            max_iter: 2,
            converge_at: None,
        };
        let err = PenalizedSmoother::with_solver(1.0, Failing)
            .run(&[1.0, 2.0, 3.0], &policy)
            .unwrap_err();
        assert!(
            matches!(
                err,
                RamanError::IllConditioned { iteration: 1, .. }
            ),
            "{err}",
        );
    }
}
