use find_peaks::Peak;
use find_peaks::PeakFinder;

use super::composite::CompositeSpectrumModel;
use super::models::PeakShapeKind;
use crate::error::{RamanError, Result};
use crate::spectrum::{Spectrum, require_ascending};

/// Thresholds handed to [`PeakFinder`]; a threshold is only applied when its
/// `enable_*` flag is set.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PeakFindingSettings {
    pub min_height: f64,
    pub max_height: f64,
    pub min_prominence: f64,
    pub max_prominence: f64,
    pub min_difference: f64,
    pub max_difference: f64,
    pub min_plateau_size: usize,
    pub max_plateau_size: usize,
    pub min_distance: usize,
    pub max_distance: usize,

    pub enable_min_height: bool,
    pub enable_max_height: bool,
    pub enable_min_prominence: bool,
    pub enable_max_prominence: bool,
    pub enable_min_difference: bool,
    pub enable_max_difference: bool,
    pub enable_min_plateau_size: bool,
    pub enable_max_plateau_size: bool,
    pub enable_min_distance: bool,
    pub enable_max_distance: bool,
}

impl Default for PeakFindingSettings {
    fn default() -> Self {
        PeakFindingSettings {
            min_height: 0.0,
            max_height: 0.0,
            min_prominence: 0.0,
            max_prominence: 0.0,
            min_difference: 1.0,
            max_difference: 1.0,
            min_plateau_size: 1,
            max_plateau_size: 1,
            min_distance: 1,
            max_distance: 1,

            enable_min_height: false,
            enable_max_height: false,
            enable_min_prominence: false,
            enable_max_prominence: false,
            enable_min_difference: false,
            enable_max_difference: false,
            enable_min_plateau_size: false,
            enable_max_plateau_size: false,
            enable_min_distance: false,
            enable_max_distance: false,
        }
    }
}

impl PeakFindingSettings {
    pub fn with_min_prominence(mut self, prominence: f64) -> Self {
        self.min_prominence = prominence;
        self.enable_min_prominence = true;
        self
    }

    pub fn with_min_height(mut self, height: f64) -> Self {
        self.min_height = height;
        self.enable_min_height = true;
        self
    }

    /// Minimum separation between peaks, in samples.
    pub fn with_min_distance(mut self, distance: usize) -> Self {
        self.min_distance = distance;
        self.enable_min_distance = true;
        self
    }

    pub fn find_peaks(&self, y_data: &[f64]) -> Vec<Peak<f64>> {
        let mut peak_finder = PeakFinder::new(y_data);

        if self.enable_min_height {
            peak_finder.with_min_height(self.min_height);
        }

        if self.enable_max_height {
            peak_finder.with_max_height(self.max_height);
        }

        if self.enable_min_prominence {
            peak_finder.with_min_prominence(self.min_prominence);
        }

        if self.enable_max_prominence {
            peak_finder.with_max_prominence(self.max_prominence);
        }

        if self.enable_min_difference {
            peak_finder.with_min_difference(self.min_difference);
        }

        if self.enable_max_difference {
            peak_finder.with_max_difference(self.max_difference);
        }

        if self.enable_min_plateau_size {
            peak_finder.with_min_plateau_size(self.min_plateau_size);
        }

        if self.enable_max_plateau_size {
            peak_finder.with_max_plateau_size(self.max_plateau_size);
        }

        if self.enable_min_distance {
            peak_finder.with_min_distance(self.min_distance);
        }

        if self.enable_max_distance {
            peak_finder.with_max_distance(self.max_distance);
        }

        peak_finder.find_peaks()
    }
}

/// Starting values for one detected peak.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakGuess {
    pub position: f64,
    /// Height above the estimated background.
    pub height: f64,
    pub fwhm: f64,
}

/// Where `y` crosses `level` walking away from `center` in `direction`,
/// linearly interpolated. Falls back to the last sample.
fn half_maximum_crossing(x: &[f64], y: &[f64], center: usize, level: f64, forward: bool) -> f64 {
    let mut i = center;
    loop {
        let next = if forward {
            if i + 1 >= x.len() {
                return x[i];
            }
            i + 1
        } else {
            if i == 0 {
                return x[0];
            }
            i - 1
        };
        if y[next] <= level {
            let t = (y[i] - level) / (y[i] - y[next]);
            return x[i] + t * (x[next] - x[i]);
        }
        i = next;
    }
}

/// The `max_peaks` most prominent peaks of `spectrum`, highest first.
pub fn guess_peaks(
    spectrum: &Spectrum,
    settings: &PeakFindingSettings,
    max_peaks: usize,
) -> Result<(f64, Vec<PeakGuess>)> {
    let (x, y) = (spectrum.x(), spectrum.y());
    require_ascending(x, "peak finder")?;

    let background = y.iter().copied().fold(f64::INFINITY, f64::min);
    let mut peaks = settings.find_peaks(y);
    peaks.sort_by(|a, b| {
        b.prominence
            .unwrap_or(0.0)
            .total_cmp(&a.prominence.unwrap_or(0.0))
    });

    let min_width = 2.0 * (x[x.len() - 1] - x[0]) / (x.len() - 1) as f64;
    let guesses = peaks
        .iter()
        .take(max_peaks)
        .map(|peak| {
            let center = peak.middle_position();
            let height = y[center] - background;
            let level = background + 0.5 * height;
            let left = half_maximum_crossing(x, y, center, level, false);
            let right = half_maximum_crossing(x, y, center, level, true);
            PeakGuess {
                position: x[center],
                height: height.max(0.0),
                fwhm: (right - left).max(min_width),
            }
        })
        .collect();
    Ok((background, guesses))
}

/// A model of `kind` peaks seeded from the most prominent peaks, ordered by
/// position. Every FWHM parameter starts at the half-maximum width.
pub fn guess_model(
    spectrum: &Spectrum,
    kind: PeakShapeKind,
    settings: &PeakFindingSettings,
    max_peaks: usize,
) -> Result<CompositeSpectrumModel> {
    if !kind.is_peak() {
        return Err(RamanError::UnknownShapeParameter {
            shape: kind.name().to_owned(),
            name: "position".to_owned(),
        });
    }

    let (background, mut guesses) = guess_peaks(spectrum, settings, max_peaks)?;
    guesses.sort_by(|a, b| a.position.total_cmp(&b.position));
    log::info!("Peak finder seeded {} {kind} peaks", guesses.len());

    let mut model = CompositeSpectrumModel::new().with_background(background);
    for guess in guesses {
        let values: Vec<f64> = kind
            .parameters()
            .iter()
            .map(|spec| match spec.name {
                "position" => guess.position,
                "intensity" => guess.height,
                name if name.starts_with("fwhm") => guess.fwhm,
                _ => spec.default,
            })
            .collect();
        model.add_peak(kind, Some(&values))?;
    }
    Ok(model)
}
