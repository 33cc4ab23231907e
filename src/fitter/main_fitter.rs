use super::common::Value;
use super::composite::{CompositeSpectrumModel, PackedParameters};
use super::fit_settings::FitSettings;
use super::solver::{LeastSquaresSolver, LevenbergMarquardt};
use crate::error::{RamanError, Result};
use crate::spectrum::{Spectrum, validate};

/// Outcome of fitting a [`CompositeSpectrumModel`]. Vectors are indexed like
/// the model's flat parameter vector; fixed parameters keep their value and
/// get zero uncertainty.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FitResult {
    pub parameter_names: Vec<String>,
    pub params: Vec<f64>,
    /// Standard errors, `None` when the covariance could not be estimated
    /// (singular Jacobian, or no more points than free parameters).
    pub uncertainties: Option<Vec<f64>>,
    pub covariance: Option<Vec<Vec<f64>>>,
    /// Unweighted sum of squared residuals.
    pub ss_res: f64,
    pub r_squared: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub success: bool,
    pub message: String,
}

impl FitResult {
    pub fn uncertainty(&self, index: usize) -> Option<f64> {
        self.uncertainties.as_ref().map(|u| u[index])
    }

    pub fn values(&self) -> Vec<Value> {
        (0..self.params.len())
            .map(|i| Value {
                value: self.params[i],
                uncertainty: self.uncertainty(i),
            })
            .collect()
    }

    pub fn value(&self, name: &str) -> Option<Value> {
        let i = self.parameter_names.iter().position(|n| n == name)?;
        Some(Value {
            value: self.params[i],
            uncertainty: self.uncertainty(i),
        })
    }

    pub fn fitted_model(&self, model: &CompositeSpectrumModel) -> CompositeSpectrumModel {
        model.with_values(&self.params)
    }
}

/// `1 − ss_res / ss_tot`; a constant `y` scores 1 only when reproduced
/// exactly.
fn r_squared(y: &[f64], ss_res: f64) -> f64 {
    let mean = y.iter().sum::<f64>() / y.len() as f64;
    let ss_tot: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();
    if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    }
}

fn check_initial_guess(packed: &PackedParameters, names: &[String]) -> Result<()> {
    for (i, name) in names.iter().enumerate() {
        let (value, lower, upper) = (packed.values[i], packed.lower[i], packed.upper[i]);
        if !(value >= lower && value <= upper) {
            log::error!("Initial guess for {name} is outside its bounds");
            return Err(RamanError::InitialGuessOutOfBounds {
                name: name.clone(),
                value,
                lower,
                upper,
            });
        }
    }
    Ok(())
}

/// `values` with the entries at `free` replaced by `p_free`.
fn expand(values: &[f64], free: &[usize], p_free: &[f64]) -> Vec<f64> {
    let mut full = values.to_vec();
    for (&i, &v) in free.iter().zip(p_free) {
        full[i] = v;
    }
    full
}

fn weighted_residuals(fitted: &[f64], y: &[f64], y_err: Option<&[f64]>) -> Vec<f64> {
    match y_err {
        Some(err) => fitted
            .iter()
            .zip(y)
            .zip(err)
            .map(|((f, y), e)| (f - y) / e)
            .collect(),
        None => fitted.iter().zip(y).map(|(f, y)| f - y).collect(),
    }
}

/// Places the covariance of the free parameters into an `n × n` matrix that
/// is zero in the rows and columns of fixed parameters.
fn embed_covariance(cov: &[Vec<f64>], free: &[usize], n: usize) -> Vec<Vec<f64>> {
    let mut full = vec![vec![0.0; n]; n];
    for (a, &i) in free.iter().enumerate() {
        for (b, &j) in free.iter().enumerate() {
            full[i][j] = cov[a][b];
        }
    }
    full
}

/// Square roots of the covariance diagonal. Without free parameters every
/// value is exact; a missing covariance leaves the errors unknown.
fn standard_errors(covariance: Option<&[Vec<f64>]>, n: usize, any_free: bool) -> Option<Vec<f64>> {
    match covariance {
        Some(cov) => Some((0..n).map(|i| cov[i][i].max(0.0).sqrt()).collect()),
        None if any_free => {
            log::warn!("Covariance unavailable; parameter uncertainties are unknown");
            None
        }
        None => Some(vec![0.0; n]),
    }
}

/// Solver output lifted back to the full parameter vector.
struct Solution {
    params: Vec<f64>,
    covariance: Option<Vec<Vec<f64>>>,
    iterations: usize,
    evaluations: usize,
    success: bool,
    message: String,
}

impl Solution {
    fn fixed(packed: &PackedParameters) -> Self {
        Self {
            params: packed.values.clone(),
            covariance: None,
            iterations: 0,
            evaluations: 0,
            success: true,
            message: "no free parameters".to_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Fitter<S: LeastSquaresSolver = LevenbergMarquardt> {
    solver: S,
}

impl Fitter {
    pub fn new(settings: FitSettings) -> Self {
        Self {
            solver: LevenbergMarquardt::new(settings),
        }
    }
}

impl Default for Fitter {
    fn default() -> Self {
        Self::new(FitSettings::default())
    }
}

impl<S: LeastSquaresSolver> Fitter<S> {
    pub fn with_solver(solver: S) -> Self {
        Self { solver }
    }

    /// Fits `model` to `(x, y)`. A fit that stops before converging is
    /// returned as [`RamanError::FitNotConverged`] carrying the last iterate.
    pub fn fit(&self, x: &[f64], y: &[f64], model: &CompositeSpectrumModel) -> Result<FitResult> {
        self.fit_weighted(x, y, None, model)
    }

    /// Fits `spectrum`, weighting residuals by `1 / y_err` when errors are
    /// attached.
    pub fn fit_spectrum(
        &self,
        spectrum: &Spectrum,
        model: &CompositeSpectrumModel,
    ) -> Result<FitResult> {
        self.fit_weighted(spectrum.x(), spectrum.y(), spectrum.y_err(), model)
    }

    fn fit_weighted(
        &self,
        x: &[f64],
        y: &[f64],
        y_err: Option<&[f64]>,
        model: &CompositeSpectrumModel,
    ) -> Result<FitResult> {
        validate(x, y)?;
        let packed = model.pack();
        let names = model.parameter_names();
        check_initial_guess(&packed, &names)?;

        let free: Vec<usize> = (0..packed.values.len())
            .filter(|&i| packed.vary[i])
            .collect();
        if x.len() < free.len() {
            return Err(RamanError::DegenerateFitRegion {
                points: x.len(),
                free_parameters: free.len(),
            });
        }

        log::info!(
            "Fitting {} peaks ({} free parameters) to {} points",
            model.len(),
            free.len(),
            x.len()
        );

        let solution = if free.is_empty() {
            Solution::fixed(&packed)
        } else {
            self.solve(x, y, y_err, model, &packed, &free)?
        };

        let uncertainties = standard_errors(
            solution.covariance.as_deref(),
            packed.values.len(),
            !free.is_empty(),
        );
        let ss_res: f64 = model
            .evaluate(x, &solution.params)
            .iter()
            .zip(y)
            .map(|(f, y)| (f - y).powi(2))
            .sum();

        let result = FitResult {
            parameter_names: names,
            params: solution.params,
            uncertainties,
            covariance: solution.covariance,
            ss_res,
            r_squared: r_squared(y, ss_res),
            iterations: solution.iterations,
            evaluations: solution.evaluations,
            success: solution.success,
            message: solution.message,
        };

        if !result.success {
            log::warn!("Fit did not converge: {}", result.message);
            return Err(RamanError::FitNotConverged {
                message: result.message.clone(),
                iterations: result.iterations,
                residual_norm: ss_res.sqrt(),
                last: Box::new(result),
            });
        }
        log::info!(
            "Fit finished: R² = {:.5}, {} iterations",
            result.r_squared,
            result.iterations
        );
        Ok(result)
    }

    fn solve(
        &self,
        x: &[f64],
        y: &[f64],
        y_err: Option<&[f64]>,
        model: &CompositeSpectrumModel,
        packed: &PackedParameters,
        free: &[usize],
    ) -> Result<Solution> {
        let residual = |p_free: &[f64]| -> Vec<f64> {
            let fitted = model.evaluate(x, &expand(&packed.values, free, p_free));
            weighted_residuals(&fitted, y, y_err)
        };
        let pick = |v: &[f64]| -> Vec<f64> { free.iter().map(|&i| v[i]).collect() };

        let outcome = self.solver.least_squares(
            &residual,
            &pick(&packed.values),
            &pick(&packed.lower),
            &pick(&packed.upper),
        )?;
        let n = packed.values.len();
        Ok(Solution {
            params: expand(&packed.values, free, &outcome.params),
            covariance: outcome
                .covariance
                .map(|cov| embed_covariance(&cov, free, n)),
            iterations: outcome.iterations,
            evaluations: outcome.evaluations,
            success: outcome.success,
            message: outcome.message,
        })
    }
}

/// Fits `model` to `(x, y)` with the default solver settings.
pub fn fit(x: &[f64], y: &[f64], model: &CompositeSpectrumModel) -> Result<FitResult> {
    Fitter::new(FitSettings::default()).fit(x, y, model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fitter::analytics::analyze;
    use crate::fitter::models::PeakShapeKind;
    use crate::spectrum::linspace;
    use crate::test_utils::gaussian_noise;

    fn scenario() -> (Vec<f64>, Vec<f64>) {
        let x = linspace(0.0, 2000.0, 2000);
        let noise = gaussian_noise(x.len(), 1.0, 7);
        let y = x
            .iter()
            .zip(&noise)
            .map(|(&x, n)| {
                10.0 + PeakShapeKind::Lorentz.value(x, &[1350.0, 150.0, 30.0])
                    + PeakShapeKind::BreitWignerFano.value(x, &[1590.0, 200.0, 30.0, -10.0])
                    + n
            })
            .collect();
        (x, y)
    }

    #[test]
    fn test_lorentz_plus_bwf_scenario() {
        crate::test_utils::init_logger();
        let (x, y) = scenario();
        let mut model = CompositeSpectrumModel::new().with_background(5.0);
        model
            .add_peak(PeakShapeKind::Lorentz, Some(&[1340.0, 120.0, 25.0]))
            .unwrap();
        model
            .add_peak(PeakShapeKind::BreitWignerFano, Some(&[1600.0, 180.0, 35.0, -8.0]))
            .unwrap();

        let result = fit(&x, &y, &model).unwrap();
        assert!(result.success, "{}", result.message);
        assert!(result.r_squared > 0.95, "R² = {}", result.r_squared);

        let unpacked = model.unpack(&result.params);
        let lorentz = unpacked.peaks[0].get("position").unwrap();
        let bwf = unpacked.peaks[1].get("position").unwrap();
        assert!((lorentz - 1350.0).abs() < 2.0, "{lorentz}");
        assert!((bwf - 1590.0).abs() < 2.0, "{bwf}");
        assert!((unpacked.background - 10.0).abs() < 1.0, "{}", unpacked.background);

        let q = result.value("p1_q").unwrap();
        assert!(q.uncertainty.is_some_and(|e| e > 0.0), "{q:?}");
        assert!(result.covariance.is_some(), "2000 points leave plenty of dof");
    }

    #[test]
    fn test_iteration_cap_is_an_error() {
        let x = linspace(1000.0, 1700.0, 701);
        let y: Vec<f64> = x
            .iter()
            .map(|&x| 10.0 + PeakShapeKind::Lorentz.value(x, &[1350.0, 150.0, 30.0]))
            .collect();
        let mut model = CompositeSpectrumModel::new();
        model
            .add_peak(PeakShapeKind::Lorentz, Some(&[1300.0, 50.0, 80.0]))
            .unwrap();

        let err = Fitter::new(FitSettings::default().with_max_iterations(1))
            .fit(&x, &y, &model)
            .unwrap_err();
        assert!(
            matches!(err, RamanError::FitNotConverged { residual_norm, .. } if residual_norm > 0.0),
            "{err}"
        );
        assert_eq!(err.kind(), ErrorKind::Numerical, "non-convergence is numerical");
        let last = err.last_fit().unwrap();
        assert!(!last.success, "{}", last.message);
        assert!(last.iterations <= 1, "{} iterations", last.iterations);
        assert_eq!(last.params.len(), model.n_params(), "last iterate covers every parameter");
    }

    #[test]
    fn test_exactly_determined_fit_has_unknown_errors() {
        let x = vec![1300.0, 1340.0, 1360.0, 1400.0];
        let y: Vec<f64> = x
            .iter()
            .map(|&x| 10.0 + PeakShapeKind::Lorentz.value(x, &[1350.0, 150.0, 30.0]))
            .collect();
        let mut model = CompositeSpectrumModel::new().with_background(9.0);
        model
            .add_peak(PeakShapeKind::Lorentz, Some(&[1348.0, 140.0, 32.0]))
            .unwrap();

        let result = fit(&x, &y, &model).unwrap();
        assert!(result.covariance.is_none(), "4 points for 4 free parameters");
        assert!(result.uncertainties.is_none(), "{:?}", result.uncertainties);
        assert_eq!(result.value("p0_intensity").unwrap().uncertainty, None, "unknown error");

        let report = analyze(&model, &result, (1000.0, 1700.0)).unwrap();
        let area = report.peaks[0].area;
        assert!(area.value > 0.0, "{area:?}");
        assert_eq!(area.uncertainty, None, "area error is unknown, not zero");
    }

    #[test]
    fn test_noisy_round_trip() {
        let x = linspace(500.0, 1500.0, 1000);
        let noise = gaussian_noise(x.len(), 1.0, 11);
        let truth = [1000.0, 100.0, 40.0];
        let y: Vec<f64> = x
            .iter()
            .zip(&noise)
            .map(|(&x, n)| 5.0 + PeakShapeKind::Gauss.value(x, &truth) + n)
            .collect();

        let mut model = CompositeSpectrumModel::new();
        model
            .add_peak(PeakShapeKind::Gauss, Some(&[990.0, 80.0, 50.0]))
            .unwrap();
        let result = fit(&x, &y, &model).unwrap();
        assert!(result.r_squared > 0.98, "R² = {}", result.r_squared);
        for (fitted, expected) in result.params[1..].iter().zip(truth) {
            assert!((fitted - expected).abs() < 0.02 * expected, "{fitted} vs {expected}");
        }
        let position_error = result.uncertainty(1).unwrap();
        assert!(position_error > 0.0 && position_error < 1.0, "{position_error}");
    }

    #[test]
    fn test_fixed_parameters_stay_put() {
        let x = linspace(0.0, 100.0, 200);
        let y = PeakShapeKind::Lorentz.evaluate(&x, &[50.0, 10.0, 8.0]);
        let mut model = CompositeSpectrumModel::new();
        model
            .add_peak(PeakShapeKind::Lorentz, Some(&[48.0, 8.0, 8.0]))
            .unwrap();
        model.set_vary(0, "fwhm", false).unwrap();
        model.background_mut().vary = false;

        let result = fit(&x, &y, &model).unwrap();
        assert_eq!(result.params[0], 0.0, "fixed background");
        assert_eq!(result.params[3], 8.0, "fixed fwhm");
        assert!((result.params[1] - 50.0).abs() < 1e-4, "{}", result.params[1]);
        if let Some(cov) = &result.covariance {
            assert!(cov[3].iter().all(|&c| c == 0.0), "fixed row is zero");
            assert_eq!(result.uncertainty(3), Some(0.0), "fixed fwhm is exact");
        }
    }

    #[test]
    fn test_no_free_parameters() {
        let x = linspace(0.0, 10.0, 11);
        let y = vec![2.0; 11];
        let mut model = CompositeSpectrumModel::new().with_background(2.0);
        model.background_mut().vary = false;
        let result = fit(&x, &y, &model).unwrap();
        assert!(result.success, "{}", result.message);
        assert_eq!(result.ss_res, 0.0, "constant reproduced");
        assert_eq!(result.r_squared, 1.0, "constant reproduced");
        assert!(result.covariance.is_none(), "nothing was estimated");
        assert_eq!(result.uncertainties, Some(vec![0.0]), "fixed values are exact");
    }

    #[test]
    fn test_initial_guess_outside_bounds() {
        let x = linspace(0.0, 10.0, 20);
        let y = vec![0.0; 20];
        let mut model = CompositeSpectrumModel::new();
        model.add_peak(PeakShapeKind::Gauss, None).unwrap();
        model.set_bounds(0, "position", 3.0, 7.0).unwrap();
        let err = fit(&x, &y, &model).unwrap_err();
        assert!(
            matches!(err, RamanError::InitialGuessOutOfBounds { ref name, .. } if name == "p0_position"),
            "{err}"
        );
        assert_eq!(err.kind(), ErrorKind::Configuration, "bad start is configuration");
    }

    #[test]
    fn test_too_few_points() {
        let x = linspace(0.0, 10.0, 4);
        let y = vec![1.0; 4];
        let mut model = CompositeSpectrumModel::new();
        model.add_peak(PeakShapeKind::PseudoVoigt, None).unwrap();
        let result = fit(&x, &y, &model);
        assert!(
            matches!(
                result,
                Err(RamanError::DegenerateFitRegion {
                    points: 4,
                    free_parameters: 6
                })
            ),
            "{result:?}"
        );
    }

    #[test]
    fn test_weighted_spectrum_fit() {
        let x = linspace(0.0, 200.0, 400);
        let y: Vec<f64> = x
            .iter()
            .map(|&x| 3.0 + PeakShapeKind::Lorentz.value(x, &[100.0, 40.0, 12.0]))
            .collect();
        let spectrum = Spectrum::new(x, y)
            .unwrap()
            .with_errors(vec![2.0; 400])
            .unwrap();
        let mut model = CompositeSpectrumModel::new();
        model
            .add_peak(PeakShapeKind::Lorentz, Some(&[95.0, 30.0, 15.0]))
            .unwrap();
        let result = Fitter::new(FitSettings::default())
            .fit_spectrum(&spectrum, &model)
            .unwrap();
        assert!((result.params[0] - 3.0).abs() < 1e-4, "{}", result.params[0]);
        assert!((result.params[1] - 100.0).abs() < 1e-4, "{}", result.params[1]);
        assert!(result.ss_res < 1e-6, "{}", result.ss_res);
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let model = CompositeSpectrumModel::new();
        let result = fit(&[1.0, 2.0, 3.0], &[1.0, 2.0], &model);
        assert!(
            matches!(result, Err(RamanError::LengthMismatch { .. })),
            "{result:?}"
        );
    }
}
