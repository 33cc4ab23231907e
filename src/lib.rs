//! Baseline correction and multi-peak fitting for Raman spectra.
//!
//! A typical pipeline corrects the baseline of a [`Spectrum`] with one of the
//! [`baseline::BaselineMethod`]s, builds a [`fitter::CompositeSpectrumModel`]
//! (by hand or with [`fitter::guess_model`]), fits it with [`fitter::fit`] and
//! turns the result into a [`fitter::FitReport`] with [`fitter::analyze`].

#![warn(clippy::all, rust_2018_idioms)]

pub mod baseline;
pub mod error;
pub mod fitter;
pub mod spectrum;

pub use baseline::{BaselineConfig, BaselineCorrection, BaselineMethod, baseline_correct};
pub use error::{ErrorKind, RamanError, Result};
pub use fitter::{CompositeSpectrumModel, FitResult, PeakShapeKind, fit, peak_area};
pub use spectrum::Spectrum;

#[cfg(test)]
pub(crate) mod test_utils {
    use rand::rngs::StdRng;
    use rand::{Rng as _, SeedableRng as _};

    /// `n` samples of `N(0, sigma²)` from a seeded generator (Box-Muller).
    pub fn gaussian_noise(n: usize, sigma: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let u1: f64 = rng.random_range(f64::EPSILON..1.0);
                let u2: f64 = rng.random();
                sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
            })
            .collect()
    }

    /// Installs `env_logger` once so `RUST_LOG=debug` shows solver traces.
    pub fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }
}
