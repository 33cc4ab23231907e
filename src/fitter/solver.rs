//! Bounded nonlinear least squares.
//!
//! [`LevenbergMarquardt`] handles box constraints the way MINUIT and lmfit do:
//! each bounded parameter is mapped to an unbounded internal variable, the
//! `levenberg_marquardt` crate minimizes over the internal variables, and the
//! covariance is reported for the external (user) parameters.

use std::cell::Cell;

use levenberg_marquardt::{self as lm, LeastSquaresProblem, TerminationReason};
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn};

use super::fit_settings::FitSettings;
use crate::error::{RamanError, Result};

/// Residual vector as a function of the free parameters.
pub type ResidualFn<'a> = dyn Fn(&[f64]) -> Vec<f64> + 'a;

#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutcome {
    pub params: Vec<f64>,
    pub covariance: Option<Vec<Vec<f64>>>,
    /// Half the sum of squared residuals at `params`.
    pub cost: f64,
    /// Number of Jacobians evaluated, one per outer iteration.
    pub iterations: usize,
    pub evaluations: usize,
    pub success: bool,
    pub message: String,
}

pub trait LeastSquaresSolver {
    /// Minimizes `½‖residual(p)‖²` subject to `lower ≤ p ≤ upper`.
    fn least_squares(
        &self,
        residual: &ResidualFn<'_>,
        p0: &[f64],
        lower: &[f64],
        upper: &[f64],
    ) -> Result<SolverOutcome>;
}

/// Mapping between an external bounded parameter and its internal variable.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Bound {
    Free,
    Lower(f64),
    Upper(f64),
    Both(f64, f64),
}

impl Bound {
    fn new(lower: f64, upper: f64) -> Self {
        match (lower.is_finite(), upper.is_finite()) {
            (true, true) => Self::Both(lower, upper),
            (true, false) => Self::Lower(lower),
            (false, true) => Self::Upper(upper),
            (false, false) => Self::Free,
        }
    }

    fn to_internal(self, p: f64) -> f64 {
        match self {
            Self::Free => p,
            Self::Lower(lo) => ((p - lo + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
            Self::Upper(hi) => ((hi - p + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
            Self::Both(lo, hi) => (2.0 * (p - lo) / (hi - lo) - 1.0).clamp(-1.0, 1.0).asin(),
        }
    }

    fn to_external(self, q: f64) -> f64 {
        match self {
            Self::Free => q,
            Self::Lower(lo) => lo - 1.0 + (q * q + 1.0).sqrt(),
            Self::Upper(hi) => hi + 1.0 - (q * q + 1.0).sqrt(),
            Self::Both(lo, hi) => lo + 0.5 * (q.sin() + 1.0) * (hi - lo),
        }
    }
}

/// The residuals as a function of the internal variables, with a
/// forward-difference Jacobian. Refuses to build more than `max_jacobians`
/// Jacobians, which ends the minimization.
struct BoundedProblem<'r, 'a> {
    residual: &'r ResidualFn<'a>,
    bounds: Vec<Bound>,
    internal: DVector<f64>,
    current: DVector<f64>,
    max_jacobians: usize,
    evaluations: Cell<usize>,
    jacobians: Cell<usize>,
}

impl<'r, 'a> BoundedProblem<'r, 'a> {
    fn new(
        residual: &'r ResidualFn<'a>,
        p0: &[f64],
        lower: &[f64],
        upper: &[f64],
        max_jacobians: usize,
    ) -> Self {
        let bounds: Vec<Bound> = lower
            .iter()
            .zip(upper)
            .map(|(&lo, &hi)| Bound::new(lo, hi))
            .collect();
        let internal = DVector::from_iterator(
            p0.len(),
            bounds.iter().zip(p0).map(|(b, &p)| b.to_internal(p)),
        );
        let mut problem = Self {
            residual,
            bounds,
            internal: DVector::zeros(p0.len()),
            current: DVector::zeros(0),
            max_jacobians,
            evaluations: Cell::new(0),
            jacobians: Cell::new(0),
        };
        problem.set_params(&internal);
        problem
    }

    fn external(&self, q: &DVector<f64>) -> Vec<f64> {
        self.bounds
            .iter()
            .zip(q.iter())
            .map(|(b, &q)| b.to_external(q))
            .collect()
    }

    fn eval_external(&self, p: &[f64]) -> DVector<f64> {
        self.evaluations.set(self.evaluations.get() + 1);
        DVector::from_vec((self.residual)(p))
    }

    fn eval(&self, q: &DVector<f64>) -> DVector<f64> {
        self.eval_external(&self.external(q))
    }

    fn cost(&self) -> f64 {
        0.5 * self.current.norm_squared()
    }

    /// Jacobian with respect to the external parameters at `p`, stepping
    /// inward at an upper bound.
    fn external_jacobian(&self, p: &[f64], upper: &[f64], r: &DVector<f64>) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(r.len(), p.len());
        for j in 0..p.len() {
            let mut h = f64::EPSILON.sqrt() * p[j].abs().max(1.0);
            if p[j] + h > upper[j] {
                h = -h;
            }
            let mut shifted = p.to_vec();
            shifted[j] += h;
            jac.set_column(j, &((self.eval_external(&shifted) - r) / h));
        }
        jac
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for BoundedProblem<'_, '_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, q: &DVector<f64>) {
        self.internal = q.clone();
        self.current = self.eval(q);
    }

    fn params(&self) -> DVector<f64> {
        self.internal.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.current.clone())
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        if self.jacobians.get() >= self.max_jacobians {
            return None;
        }
        self.jacobians.set(self.jacobians.get() + 1);

        let (q, r) = (&self.internal, &self.current);
        let mut jac = DMatrix::zeros(r.len(), q.len());
        for j in 0..q.len() {
            let h = f64::EPSILON.sqrt() * q[j].abs().max(1.0);
            let mut shifted = q.clone();
            shifted[j] += h;
            jac.set_column(j, &((self.eval(&shifted) - r) / h));
        }
        Some(jac)
    }
}

/// `s² (JᵀJ)⁻¹` with `s² = ‖r‖² / (m − n)`.
fn covariance(jac: &DMatrix<f64>, cost: f64) -> Option<Vec<Vec<f64>>> {
    let (m, n) = jac.shape();
    if m <= n {
        return None;
    }
    let s2 = 2.0 * cost / (m - n) as f64;
    let inverse = (jac.transpose() * jac).cholesky()?.inverse();
    if inverse.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(
        (0..n)
            .map(|i| (0..n).map(|j| s2 * inverse[(i, j)]).collect())
            .collect(),
    )
}

fn describe(termination: &TerminationReason, max_iterations: usize) -> String {
    match termination {
        TerminationReason::User(_) => {
            format!("maximum number of iterations ({max_iterations}) reached")
        }
        TerminationReason::LostPatience => "residual evaluation budget exhausted".to_owned(),
        TerminationReason::NoImprovementPossible(what) => {
            format!("no further reduction possible ({what})")
        }
        other => format!("{other:?}"),
    }
}

/// Levenberg-Marquardt over the internal variables of a box-constrained
/// problem.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevenbergMarquardt {
    pub settings: FitSettings,
}

impl LevenbergMarquardt {
    pub fn new(settings: FitSettings) -> Self {
        Self { settings }
    }

    fn driver(&self) -> lm::LevenbergMarquardt<f64> {
        let settings = &self.settings;
        lm::LevenbergMarquardt::new()
            .with_ftol(settings.ftol)
            .with_xtol(settings.xtol)
            .with_gtol(settings.gtol)
            .with_stepbound(settings.step_bound)
            .with_patience(settings.max_iterations.max(1))
    }

    /// Maps the minimizer back to external parameters and attaches the
    /// covariance there.
    fn outcome(
        problem: &BoundedProblem<'_, '_>,
        upper: &[f64],
        success: bool,
        message: String,
    ) -> Result<SolverOutcome> {
        let params = problem.external(&problem.internal);
        let r = problem.eval_external(&params);
        let cost = 0.5 * r.norm_squared();
        if !cost.is_finite() {
            return Err(RamanError::SolverFailed {
                message: format!("residuals are not finite at the solution ({message})"),
                evaluations: problem.evaluations.get(),
            });
        }
        let covariance = covariance(&problem.external_jacobian(&params, upper, &r), cost);

        Ok(SolverOutcome {
            params,
            covariance,
            cost,
            iterations: problem.jacobians.get(),
            evaluations: problem.evaluations.get(),
            success,
            message,
        })
    }
}

impl LeastSquaresSolver for LevenbergMarquardt {
    fn least_squares(
        &self,
        residual: &ResidualFn<'_>,
        p0: &[f64],
        lower: &[f64],
        upper: &[f64],
    ) -> Result<SolverOutcome> {
        assert!(
            p0.len() == lower.len() && p0.len() == upper.len(),
            "p0 and bounds must have the same length"
        );
        let max_iterations = self.settings.max_iterations;
        let problem = BoundedProblem::new(residual, p0, lower, upper, max_iterations);
        if !problem.cost().is_finite() {
            return Err(RamanError::SolverFailed {
                message: "residuals are not finite at the initial guess".to_owned(),
                evaluations: problem.evaluations.get(),
            });
        }

        let (problem, report) = self.driver().minimize(problem);
        let success = report.termination.was_successful();
        let message = describe(&report.termination, max_iterations);
        log::debug!(
            "Levenberg-Marquardt report: {:?} after {} evaluations, cost {:e}",
            report.termination,
            report.number_of_evaluations,
            report.objective_function
        );

        let outcome = Self::outcome(&problem, upper, success, message)?;
        if success {
            log::info!(
                "Levenberg-Marquardt finished after {} iterations: {}",
                outcome.iterations,
                outcome.message
            );
        } else {
            log::warn!("Levenberg-Marquardt stopped: {}", outcome.message);
        }
        Ok(outcome)
    }
}
