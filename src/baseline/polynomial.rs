use nalgebra::{DMatrix, DVector};

use super::BaselineCorrection;
use super::config::{Roi, select_regions};
use crate::error::{RamanError, Result};

/// A least-squares polynomial in `t = (x - center) / half_span`. Fitting on
/// the rescaled axis keeps the Vandermonde matrix well conditioned for
/// wavenumbers in the thousands.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Polynomial {
    pub coefficients: Vec<f64>,
    center: f64,
    half_span: f64,
}

impl Polynomial {
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let t = (x - self.center) / self.half_span;
        self.coefficients.iter().rev().fold(0.0, |acc, c| acc * t + c)
    }

    pub fn evaluate_all(&self, x: &[f64]) -> Vec<f64> {
        x.iter().map(|&x| self.evaluate(x)).collect()
    }
}

pub fn polyfit(x: &[f64], y: &[f64], degree: usize) -> Result<Polynomial> {
    let terms = degree + 1;
    if x.len() < terms {
        log::error!("Not enough data points to fit polynomial of degree {degree}");
        return Err(RamanError::DegenerateFitRegion {
            points: x.len(),
            free_parameters: terms,
        });
    }

    let (x_min, x_max) = x
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &x| {
            (min.min(x), max.max(x))
        });
    let center = 0.5 * (x_min + x_max);
    let half_span = if x_max > x_min {
        0.5 * (x_max - x_min)
    } else {
        1.0
    };

    let vandermonde = DMatrix::from_fn(x.len(), terms, |i, j| {
        ((x[i] - center) / half_span).powi(j as i32)
    });
    let rhs = DVector::from_column_slice(y);
    let coefficients = vandermonde
        .svd(true, true)
        .solve(&rhs, 1e-12)
        .map_err(|e| RamanError::IllConditioned {
            method: "polynomial".to_owned(),
            iteration: 1,
            detail: e.to_owned(),
        })?;

    Ok(Polynomial {
        coefficients: coefficients.iter().copied().collect(),
        center,
        half_span,
    })
}

/// Polynomial baseline fitted over the regions of interest (the whole
/// spectrum when none are given) and evaluated on every `x`.
pub fn polynomial_baseline(
    x: &[f64],
    y: &[f64],
    degree: usize,
    regions: &[Roi],
) -> Result<BaselineCorrection> {
    let (xs, ys) = select_regions(x, y, regions);
    let polynomial = polyfit(&xs, &ys, degree)?;
    log::info!(
        "Polynomial baseline of degree {degree} fitted on {} points: {:?}",
        xs.len(),
        polynomial.coefficients
    );
    Ok(BaselineCorrection::new(y, polynomial.evaluate_all(x), 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::linspace;

    #[test]
    fn test_recovers_cubic() {
        let x = linspace(100.0, 3000.0, 200);
        let y: Vec<f64> = x
            .iter()
            .map(|&x| 5.0 + 1e-2 * x - 3e-6 * x * x + 4e-10 * x * x * x)
            .collect();
        let poly = polyfit(&x, &y, 3).unwrap();
        assert_eq!(poly.degree(), 3, "requested degree");
        for (xi, yi) in x.iter().zip(&y) {
            assert!((poly.evaluate(*xi) - yi).abs() < 1e-8, "cubic data is reproduced exactly");
        }
    }

    #[test]
    fn test_too_few_points() {
        let err = polyfit(&[0.0, 1.0, 2.0], &[1.0, 2.0, 3.0], 3).unwrap_err();
        assert!(
            matches!(
                err,
                RamanError::DegenerateFitRegion {
                    points: 3,
                    free_parameters: 4
                }
            ),
            "{err}",
        );
    }

    #[test]
    fn test_baseline_from_regions_ignores_peak() {
        let x = linspace(0.0, 100.0, 101);
        let y: Vec<f64> = x
            .iter()
            .map(|&x| 2.0 + 0.1 * x + 50.0 * (-((x - 50.0) / 5.0).powi(2)).exp())
            .collect();
        let regions = [Roi::new(0.0, 25.0), Roi::new(75.0, 100.0)];
        let result = polynomial_baseline(&x, &y, 1, &regions).unwrap();
        for (xi, zi) in x.iter().zip(&result.baseline) {
            assert!(
                (zi - (2.0 + 0.1 * xi)).abs() < 1e-3,
                "baseline follows the line outside the peak",
            );
        }
        assert!((result.corrected[50] - 50.0).abs() < 1e-2, "peak survives the correction");
    }
}
