use nalgebra::{DMatrix, DVector};

use super::BaselineCorrection;
use super::banded::BandMatrix;
use super::config::{Roi, select_regions};
use crate::error::{RamanError, Result};
use crate::spectrum::require_ascending;

/// Uniform cubic B-spline basis over `[x_min, x_max]` split into `segments`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicBasis {
    x_min: f64,
    x_max: f64,
    segments: usize,
}

impl CubicBasis {
    pub fn new(x_min: f64, x_max: f64, segments: usize) -> Self {
        Self {
            x_min,
            x_max,
            segments: segments.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.segments + 3
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Index of the first non-zero basis function at `x` and the four
    /// non-zero values.
    pub fn evaluate(&self, x: f64) -> (usize, [f64; 4]) {
        let span = (self.x_max - self.x_min).max(f64::MIN_POSITIVE);
        let t = ((x - self.x_min) / span * self.segments as f64).clamp(0.0, self.segments as f64);
        let segment = (t.floor() as usize).min(self.segments - 1);
        let u = t - segment as f64;
        let v = 1.0 - u;
        (
            segment,
            [
                v * v * v / 6.0,
                (3.0 * u * u * u - 6.0 * u * u + 4.0) / 6.0,
                (-3.0 * u * u * u + 3.0 * u * u + 3.0 * u + 1.0) / 6.0,
                u * u * u / 6.0,
            ],
        )
    }
}

/// Penalized cubic B-spline regression: minimises
/// `‖y − Bc‖² + smoothing·‖D₂c‖²` over the regions of interest and
/// evaluates the spline on every `x`.
pub fn spline_baseline(
    x: &[f64],
    y: &[f64],
    knots: usize,
    smoothing: f64,
    regions: &[Roi],
) -> Result<BaselineCorrection> {
    require_ascending(x, "spline")?;
    let (xs, ys) = select_regions(x, y, regions);
    if xs.len() < 2 {
        return Err(RamanError::DegenerateFitRegion {
            points: xs.len(),
            free_parameters: knots + 3,
        });
    }

    let basis = CubicBasis::new(x[0], x[x.len() - 1], knots);
    let m = basis.len();
    let penalty = BandMatrix::difference_penalty(m, 2);

    let mut normal = DMatrix::from_fn(m, m, |i, j| smoothing * penalty.get(i, j));
    let mut rhs = DVector::zeros(m);
    for (&xi, &yi) in xs.iter().zip(&ys) {
        let (first, values) = basis.evaluate(xi);
        for (a, va) in values.iter().enumerate() {
            rhs[first + a] += va * yi;
            for (b, vb) in values.iter().enumerate() {
                normal[(first + a, first + b)] += va * vb;
            }
        }
    }

    let coefficients = normal
        .cholesky()
        .ok_or_else(|| RamanError::IllConditioned {
            method: "spline".to_owned(),
            iteration: 1,
            detail: format!("{m} coefficients are not determined by {} points", xs.len()),
        })?
        .solve(&rhs);

    log::info!(
        "Spline baseline with {knots} segments fitted on {} points",
        xs.len()
    );

    let baseline = x
        .iter()
        .map(|&xi| {
            let (first, values) = basis.evaluate(xi);
            values
                .iter()
                .enumerate()
                .map(|(a, v)| v * coefficients[first + a])
                .sum()
        })
        .collect();
    Ok(BaselineCorrection::new(y, baseline, 1))
}
