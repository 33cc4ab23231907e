//! Baseline estimation: the IRPLS family built on [`smoother::PenalizedSmoother`]
//! plus the one-shot rubberband, rolling-ball, polynomial and spline methods.
//!
//! Every method shares the contract `(x, y, params) -> BaselineCorrection` and
//! is selected by name through [`BaselineConfig`].

pub mod banded;
pub mod config;
pub mod polynomial;
pub mod rolling_ball;
pub mod rubberband;
pub mod smoother;
pub mod spline;
pub mod weighting;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;

pub use config::{BaselineConfig, ParameterSpec, ResolvedParams, Roi};
use smoother::{PenalizedSmoother, WeightPolicy};
use weighting::{AirPls, Als, ArPls, DerpsAls, DrPls, Iasls};

use crate::error::{RamanError, Result};
use crate::spectrum::{Spectrum, validate};

/// `corrected = y − baseline`.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct BaselineCorrection {
    pub corrected: Vec<f64>,
    pub baseline: Vec<f64>,
    pub iterations: usize,
}

impl BaselineCorrection {
    pub fn new(y: &[f64], baseline: Vec<f64>, iterations: usize) -> Self {
        Self {
            corrected: y.iter().zip(&baseline).map(|(y, z)| y - z).collect(),
            baseline,
            iterations,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaselineMethod {
    Als,
    Iasls,
    AirPls,
    ArPls,
    DrPls,
    DerpsAls,
    Rubberband,
    RollingBall,
    Polynomial,
    Spline,
}

const UNBOUNDED: f64 = f64::INFINITY;
const MAX_ITERATIONS: f64 = 100_000.0;

const POSITIVE: f64 = f64::MIN_POSITIVE;

// asymmetry weights `p` and `1 − p` must both stay positive
const P_MIN: f64 = f64::EPSILON;
const P_MAX: f64 = 1.0 - f64::EPSILON;

static ALS_PARAMS: &[ParameterSpec] = &[
    ParameterSpec::real("lam", 1e5, POSITIVE, UNBOUNDED),
    ParameterSpec::real("p", 0.01, P_MIN, P_MAX),
    ParameterSpec::count("max_iter", 10.0, 1.0, MAX_ITERATIONS),
];

static IASLS_PARAMS: &[ParameterSpec] = &[
    ParameterSpec::real("lam", 1e6, POSITIVE, UNBOUNDED),
    ParameterSpec::real("p", 0.01, P_MIN, P_MAX),
    ParameterSpec::real("lam_1", 1e-4, 0.0, UNBOUNDED),
    ParameterSpec::count("max_iter", 50.0, 1.0, MAX_ITERATIONS),
    ParameterSpec::real("ratio", 1e-3, 0.0, 1.0),
];

static AIRPLS_PARAMS: &[ParameterSpec] = &[
    ParameterSpec::real("lam", 1e5, POSITIVE, UNBOUNDED),
    ParameterSpec::count("max_iter", 15.0, 1.0, MAX_ITERATIONS),
    ParameterSpec::real("ratio", 1e-3, 0.0, 1.0),
];

static ARPLS_PARAMS: &[ParameterSpec] = &[
    ParameterSpec::real("lam", 1e5, POSITIVE, UNBOUNDED),
    ParameterSpec::count("max_iter", 50.0, 1.0, MAX_ITERATIONS),
    ParameterSpec::real("ratio", 1e-3, 0.0, 1.0),
];

static DRPLS_PARAMS: &[ParameterSpec] = &[
    ParameterSpec::real("lam", 1e5, POSITIVE, UNBOUNDED),
    ParameterSpec::real("eta", 0.5, 0.0, 1.0),
    ParameterSpec::count("max_iter", 50.0, 1.0, MAX_ITERATIONS),
    ParameterSpec::real("ratio", 1e-3, 0.0, 1.0),
];

static DERPSALS_PARAMS: &[ParameterSpec] = &[
    ParameterSpec::real("lam", 1e6, POSITIVE, UNBOUNDED),
    ParameterSpec::real("p", 0.01, P_MIN, P_MAX),
    ParameterSpec::real("k", 0.0, f64::NEG_INFINITY, UNBOUNDED),
    ParameterSpec::count("smooth_half_window", 0.0, 0.0, 1e6),
    ParameterSpec::count("max_iter", 50.0, 1.0, MAX_ITERATIONS),
    ParameterSpec::real("ratio", 1e-3, 0.0, 1.0),
];

static ROLLING_BALL_PARAMS: &[ParameterSpec] = &[
    ParameterSpec::count("half_window", 50.0, 1.0, 1e6),
    ParameterSpec::count("smooth_half_window", 0.0, 0.0, 1e6),
];

static POLYNOMIAL_PARAMS: &[ParameterSpec] = &[ParameterSpec::count("degree", 3.0, 0.0, 15.0)];

static SPLINE_PARAMS: &[ParameterSpec] = &[
    ParameterSpec::count("knots", 10.0, 1.0, 10_000.0),
    ParameterSpec::real("smoothing", 1e-2, 0.0, UNBOUNDED),
];

impl BaselineMethod {
    pub const ALL: [BaselineMethod; 10] = [
        Self::Als,
        Self::Iasls,
        Self::AirPls,
        Self::ArPls,
        Self::DrPls,
        Self::DerpsAls,
        Self::Rubberband,
        Self::RollingBall,
        Self::Polynomial,
        Self::Spline,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Als => "als",
            Self::Iasls => "iasls",
            Self::AirPls => "airpls",
            Self::ArPls => "arpls",
            Self::DrPls => "drpls",
            Self::DerpsAls => "derpsals",
            Self::Rubberband => "rubberband",
            Self::RollingBall => "rolling_ball",
            Self::Polynomial => "polynomial",
            Self::Spline => "spline",
        }
    }

    /// Parameter schema with documented defaults and inclusive ranges.
    pub fn parameters(&self) -> &'static [ParameterSpec] {
        match self {
            Self::Als => ALS_PARAMS,
            Self::Iasls => IASLS_PARAMS,
            Self::AirPls => AIRPLS_PARAMS,
            Self::ArPls => ARPLS_PARAMS,
            Self::DrPls => DRPLS_PARAMS,
            Self::DerpsAls => DERPSALS_PARAMS,
            Self::Rubberband => &[],
            Self::RollingBall => ROLLING_BALL_PARAMS,
            Self::Polynomial => POLYNOMIAL_PARAMS,
            Self::Spline => SPLINE_PARAMS,
        }
    }

    pub fn accepts_regions(&self) -> bool {
        matches!(self, Self::Polynomial | Self::Spline)
    }

    pub fn is_iterative(&self) -> bool {
        matches!(
            self,
            Self::Als | Self::Iasls | Self::AirPls | Self::ArPls | Self::DrPls | Self::DerpsAls
        )
    }

    pub fn resolve_params(&self, given: &BTreeMap<String, f64>) -> Result<ResolvedParams> {
        ResolvedParams::resolve(self.name(), self.parameters(), given)
    }

    /// The reweighting rule of an IRPLS method.
    pub fn weight_policy(
        &self,
        x: &[f64],
        y: &[f64],
        params: &ResolvedParams,
    ) -> Result<Box<dyn WeightPolicy>> {
        let max_iter = params.count("max_iter");
        let policy: Box<dyn WeightPolicy> = match self {
            Self::Als => Box::new(Als {
                p: params.get("p"),
                max_iter,
            }),
            Self::Iasls => Box::new(Iasls::new(
                x,
                y,
                params.get("p"),
                params.get("lam_1"),
                max_iter,
                params.get("ratio"),
            )?),
            Self::AirPls => Box::new(AirPls {
                max_iter,
                ratio: params.get("ratio"),
            }),
            Self::ArPls => Box::new(ArPls {
                max_iter,
                ratio: params.get("ratio"),
            }),
            Self::DrPls => Box::new(DrPls {
                eta: params.get("eta"),
                max_iter,
                ratio: params.get("ratio"),
            }),
            Self::DerpsAls => Box::new(DerpsAls::new(
                x,
                y,
                params.get("p"),
                params.get("k"),
                params.count("smooth_half_window"),
                max_iter,
                params.get("ratio"),
            )?),
            Self::Rubberband | Self::RollingBall | Self::Polynomial | Self::Spline => {
                return Err(RamanError::NotIterative(self.name().to_owned()));
            }
        };
        Ok(policy)
    }
}

impl fmt::Display for BaselineMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BaselineMethod {
    type Err = RamanError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|method| method.name() == wanted)
            .ok_or_else(|| RamanError::UnknownMethod(s.to_owned()))
    }
}

impl BaselineConfig {
    /// Runs the configured method. Never modifies `y`.
    pub fn apply(&self, x: &[f64], y: &[f64]) -> Result<BaselineCorrection> {
        validate(x, y)?;
        let (method, params) = self.resolve()?;
        log::debug!("Baseline {method} with {:?}", params.iter().collect::<Vec<_>>());

        match method {
            BaselineMethod::Rubberband => rubberband::rubberband(x, y),
            BaselineMethod::RollingBall => rolling_ball::rolling_ball(
                x,
                y,
                params.count("half_window"),
                params.count("smooth_half_window"),
            ),
            BaselineMethod::Polynomial => {
                polynomial::polynomial_baseline(x, y, params.count("degree"), &self.regions)
            }
            BaselineMethod::Spline => spline::spline_baseline(
                x,
                y,
                params.count("knots"),
                params.get("smoothing"),
                &self.regions,
            ),
            BaselineMethod::Als
            | BaselineMethod::Iasls
            | BaselineMethod::AirPls
            | BaselineMethod::ArPls
            | BaselineMethod::DrPls
            | BaselineMethod::DerpsAls => {
                let policy = method.weight_policy(x, y, &params)?;
                PenalizedSmoother::new(params.get("lam")).run(y, policy.as_ref())
            }
        }
    }

    pub fn apply_to(&self, spectrum: &Spectrum) -> Result<BaselineCorrection> {
        self.apply(spectrum.x(), spectrum.y())
    }
}

/// Estimates and subtracts a baseline with the method named `method`.
pub fn baseline_correct(
    method: &str,
    x: &[f64],
    y: &[f64],
    params: &BTreeMap<String, f64>,
) -> Result<BaselineCorrection> {
    BaselineConfig {
        method: method.to_owned(),
        params: params.clone(),
        regions: Vec::new(),
    }
    .apply(x, y)
}

/// Corrects many spectra with one configuration, in parallel. Results keep
/// the order of `spectra`.
pub fn baseline_correct_batch(
    config: &BaselineConfig,
    spectra: &[Spectrum],
) -> Vec<Result<BaselineCorrection>> {
    log::info!(
        "Batch {} baseline over {} spectra",
        config.method,
        spectra.len()
    );
    spectra
        .par_iter()
        .map(|spectrum| config.apply_to(spectrum))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::spectrum::linspace;
    use crate::test_utils::{gaussian_noise, init_logger};

    /// Quadratic background plus a Gaussian peak of height 100.
    fn synthetic(noise: f64, seed: u64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let x = linspace(0.0, 1000.0, 1000);
        let background: Vec<f64> = x
            .iter()
            .map(|&x| 50.0 + 0.02 * x + 2e-5 * (x - 400.0).powi(2))
            .collect();
        let noise = gaussian_noise(x.len(), noise, seed);
        let y = x
            .iter()
            .zip(&background)
            .zip(&noise)
            .map(|((&x, b), e)| b + 100.0 * (-0.5 * ((x - 500.0) / 15.0).powi(2)).exp() + e)
            .collect();
        (x, y, background)
    }

    fn rms(a: &[f64], b: &[f64]) -> f64 {
        (a.iter().zip(b).map(|(a, b)| (a - b).powi(2)).sum::<f64>() / a.len() as f64).sqrt()
    }

    fn params(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_method_names_round_trip() {
        for method in BaselineMethod::ALL {
            assert_eq!(method.name().parse::<BaselineMethod>().unwrap(), method, "{method}");
            assert_eq!(method.to_string(), method.name(), "{method}");
        }
        assert_eq!(
            "ArPLS".parse::<BaselineMethod>().unwrap(),
            BaselineMethod::ArPls,
            "names are case-insensitive"
        );
        assert!("asls2".parse::<BaselineMethod>().is_err(), "unknown name");
    }

    #[test]
    fn test_schemas_have_valid_defaults() {
        for method in BaselineMethod::ALL {
            for spec in method.parameters() {
                assert!(spec.min < spec.max, "{method}.{}", spec.name);
                assert!(
                    spec.default >= spec.min && spec.default <= spec.max,
                    "{method}.{}",
                    spec.name
                );
            }
        }
    }

    #[test]
    fn test_als_recovers_quadratic_background() {
        init_logger();
        let (x, y, background) = synthetic(0.5, 7);
        let result =
            baseline_correct("als", &x, &y, &params(&[("p", 0.001), ("lam", 1e7)])).unwrap();
        assert_eq!(result.iterations, 10, "als always runs max_iter iterations");
        let error = rms(&result.baseline, &background);
        assert!(error < 5.0, "rms {error}");
        for ((c, z), yi) in result.corrected.iter().zip(&result.baseline).zip(&y) {
            assert!((c + z - yi).abs() < 1e-9, "corrected + baseline must equal y");
        }
    }

    #[test]
    fn test_iterative_methods_meet_their_stop_criteria() {
        init_logger();
        let (x, y, background) = synthetic(0.0, 11);
        let max_iter = 500;
        for method in [
            BaselineMethod::Iasls,
            BaselineMethod::AirPls,
            BaselineMethod::ArPls,
            BaselineMethod::DrPls,
            BaselineMethod::DerpsAls,
        ] {
            let config = BaselineConfig::new(method.name()).with_param("max_iter", max_iter as f64);
            let result = config
                .apply(&x, &y)
                .unwrap_or_else(|err| panic!("{method} did not converge: {err}"));
            let (_, resolved) = config.resolve().unwrap();
            let ratio = resolved.get("ratio");
            let k = result.iterations;
            assert!(k < max_iter, "{method} stopped at the cap");
            let error = rms(&result.baseline, &background);
            assert!(error < 10.0, "{method}: rms {error}");

            if method == BaselineMethod::AirPls {
                let dssn: f64 = y
                    .iter()
                    .zip(&result.baseline)
                    .map(|(y, z)| (y - z).min(0.0).abs())
                    .sum();
                let scale: f64 = y.iter().map(|v| v.abs()).sum();
                assert!(
                    dssn < ratio * scale || dssn == 0.0,
                    "airpls: dssn {dssn} vs {}",
                    ratio * scale
                );
                continue;
            }

            // the weights of the final solve come from the previous iterate
            let policy = method.weight_policy(&x, &y, &resolved).unwrap();
            let weights = if k == 1 {
                policy.initial_weights(&y)
            } else {
                let previous = BaselineConfig::new(method.name())
                    .with_param("max_iter", (k - 1) as f64)
                    .apply(&x, &y)
                    .unwrap_err();
                let previous = previous.last_iterate().unwrap();
                policy
                    .update(&y, &previous.baseline, &policy.initial_weights(&y), k - 1)
                    .weights
            };
            let stop = policy.update(&y, &result.baseline, &weights, k);
            assert!(
                stop.converged && stop.criterion < ratio,
                "{method}: weight change {} vs ratio {ratio}",
                stop.criterion
            );
        }
    }

    #[test]
    fn test_weight_policy_only_for_iterative_methods() {
        let (x, y, _) = synthetic(0.0, 1);
        for method in BaselineMethod::ALL {
            let resolved = method.resolve_params(&BTreeMap::new()).unwrap();
            let policy = method.weight_policy(&x, &y, &resolved);
            assert_eq!(policy.is_ok(), method.is_iterative(), "{method}");
            if let Ok(policy) = policy {
                assert_eq!(policy.name(), method.name(), "policy matches method");
            }
        }
    }

    #[test]
    fn test_spline_without_smoothing_on_a_narrow_region_is_ill_conditioned() {
        let (x, y, _) = synthetic(0.0, 5);
        // three points inside the first of ten segments leave most of the
        // thirteen coefficients undetermined
        let err = BaselineConfig::new("spline")
            .with_param("smoothing", 0.0)
            .with_param("knots", 10.0)
            .with_regions(vec![Roi::new(0.0, 2.5)])
            .apply(&x, &y)
            .unwrap_err();
        assert!(
            matches!(err, RamanError::IllConditioned { ref method, .. } if method == "spline"),
            "{err}"
        );
        assert_eq!(err.kind(), ErrorKind::Numerical, "singular systems are numerical");
    }

    #[test]
    fn test_non_convergence_carries_last_iterate() {
        let (x, y, _) = synthetic(0.5, 3);
        let err = baseline_correct("arpls", &x, &y, &params(&[("max_iter", 1.0), ("ratio", 0.0)]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Numerical, "{err}");
        let last = err.last_iterate().unwrap();
        assert_eq!(last.iterations, 1, "one iteration was run");
        assert_eq!(last.baseline.len(), x.len(), "full-length baseline");
    }

    #[test]
    fn test_input_is_validated() {
        let err = baseline_correct("als", &[0.0, 1.0], &[1.0, 2.0], &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, RamanError::TooShort { .. }), "{err}");

        let err = baseline_correct(
            "rolling_ball",
            &[0.0, 1.0, 2.0],
            &[1.0, f64::INFINITY, 2.0],
            &BTreeMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, RamanError::NonFinite("y")), "{err}");
    }

    #[test]
    fn test_batch_matches_single_runs() {
        let spectra: Vec<Spectrum> = (0..4)
            .map(|seed| {
                let (x, y, _) = synthetic(0.5, seed);
                Spectrum::new(x, y).unwrap()
            })
            .collect();
        let config = BaselineConfig::new("rolling_ball").with_param("half_window", 40.0);
        let batch = baseline_correct_batch(&config, &spectra);
        assert_eq!(batch.len(), 4, "one result per spectrum");
        for (spectrum, result) in spectra.iter().zip(batch) {
            assert_eq!(result.unwrap(), config.apply_to(spectrum).unwrap(), "batch order kept");
        }
    }
}
