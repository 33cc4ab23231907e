use crate::error::{RamanError, Result};

/// Smallest spectrum any routine in the crate will accept.
pub const MIN_POINTS: usize = 3;

/// An ordered set of `(x, y[, y_err])` samples, typically Raman shift in
/// cm⁻¹ against counts. Routines never modify a spectrum in place.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Spectrum {
    x: Vec<f64>,
    y: Vec<f64>,
    y_err: Option<Vec<f64>>,
}

impl Spectrum {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        validate(&x, &y)?;
        Ok(Self { x, y, y_err: None })
    }

    /// Attaches per-sample standard deviations, used to weight fit residuals.
    pub fn with_errors(mut self, y_err: Vec<f64>) -> Result<Self> {
        if y_err.len() != self.x.len() {
            return Err(RamanError::LengthMismatch {
                name: "y_err",
                x: self.x.len(),
                other: y_err.len(),
            });
        }
        if y_err.iter().any(|e| !e.is_finite()) {
            return Err(RamanError::NonFinite("y_err"));
        }
        if y_err.iter().any(|&e| e <= 0.0) {
            return Err(RamanError::InvalidSpectrum(
                "y_err must be strictly positive".to_owned(),
            ));
        }
        self.y_err = Some(y_err);
        Ok(self)
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn y_err(&self) -> Option<&[f64]> {
        self.y_err.as_deref()
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn is_ascending(&self) -> bool {
        is_ascending(&self.x)
    }

    pub fn x_range(&self) -> (f64, f64) {
        self.x
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &x| {
                (min.min(x), max.max(x))
            })
    }

    /// Returns a copy ordered by ascending `x`.
    pub fn sorted(&self) -> Self {
        let mut order: Vec<usize> = (0..self.x.len()).collect();
        order.sort_by(|&a, &b| self.x[a].total_cmp(&self.x[b]));

        Self {
            x: order.iter().map(|&i| self.x[i]).collect(),
            y: order.iter().map(|&i| self.y[i]).collect(),
            y_err: self
                .y_err
                .as_ref()
                .map(|err| order.iter().map(|&i| err[i]).collect()),
        }
    }

    /// Crops to the samples with `x_min <= x <= x_max`.
    pub fn window(&self, x_min: f64, x_max: f64) -> Result<Self> {
        let (lo, hi) = if x_min <= x_max {
            (x_min, x_max)
        } else {
            (x_max, x_min)
        };
        let keep: Vec<usize> = (0..self.x.len())
            .filter(|&i| self.x[i] >= lo && self.x[i] <= hi)
            .collect();

        if keep.len() < MIN_POINTS {
            return Err(RamanError::TooShort {
                len: keep.len(),
                min: MIN_POINTS,
            });
        }

        Ok(Self {
            x: keep.iter().map(|&i| self.x[i]).collect(),
            y: keep.iter().map(|&i| self.y[i]).collect(),
            y_err: self
                .y_err
                .as_ref()
                .map(|err| keep.iter().map(|&i| err[i]).collect()),
        })
    }

    /// A new spectrum on the same axis with `y` replaced, e.g. after
    /// baseline subtraction.
    pub fn with_y(&self, y: Vec<f64>) -> Result<Self> {
        validate(&self.x, &y)?;
        Ok(Self {
            x: self.x.clone(),
            y,
            y_err: self.y_err.clone(),
        })
    }
}

/// Entry checks shared by every routine that accepts raw `x`/`y` slices.
pub fn validate(x: &[f64], y: &[f64]) -> Result<()> {
    if x.len() != y.len() {
        return Err(RamanError::LengthMismatch {
            name: "y",
            x: x.len(),
            other: y.len(),
        });
    }
    if x.len() < MIN_POINTS {
        return Err(RamanError::TooShort {
            len: x.len(),
            min: MIN_POINTS,
        });
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(RamanError::NonFinite("x"));
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(RamanError::NonFinite("y"));
    }
    Ok(())
}

pub fn is_ascending(x: &[f64]) -> bool {
    x.windows(2).all(|w| w[1] > w[0])
}

pub fn require_ascending(x: &[f64], method: &str) -> Result<()> {
    if is_ascending(x) {
        Ok(())
    } else {
        Err(RamanError::NotAscending(method.to_owned()))
    }
}

/// `n` evenly spaced samples over `[start, end]`, both ends included.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}
