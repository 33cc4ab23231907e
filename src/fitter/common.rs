use std::fmt;

use super::models::ShapeParameter;
use crate::error::{RamanError, Result};

/// A value with its one-sigma error. `uncertainty` is `None` when the error
/// could not be estimated, which is different from an exact value.
#[derive(PartialEq, Default, Debug, Clone, Copy, serde::Deserialize, serde::Serialize)]
pub struct Value {
    pub value: f64,
    pub uncertainty: Option<f64>,
}

impl Value {
    pub fn new(value: f64, uncertainty: f64) -> Self {
        Self {
            value,
            uncertainty: Some(uncertainty),
        }
    }

    pub fn exact(value: f64) -> Self {
        Self::new(value, 0.0)
    }

    pub fn unknown(value: f64) -> Self {
        Self {
            value,
            uncertainty: None,
        }
    }

    pub fn relative_uncertainty(&self) -> Option<f64> {
        let uncertainty = self.uncertainty?;
        Some(if self.value == 0.0 {
            f64::INFINITY
        } else {
            (uncertainty / self.value).abs()
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.uncertainty {
            Some(uncertainty) => write!(f, "{:.3} ± {uncertainty:.3}", self.value),
            None => write!(f, "{:.3} ± ?", self.value),
        }
    }
}

/// One named model parameter with its bounds. `vary = false` keeps it fixed
/// during a fit.
#[derive(PartialEq, Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct Parameter {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub value: f64,
    pub vary: bool,
}

impl Default for Parameter {
    fn default() -> Self {
        Self {
            name: String::new(),
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            value: 0.0,
            vary: true,
        }
    }
}

impl Parameter {
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_owned(),
            value,
            ..Default::default()
        }
    }

    pub fn from_shape(spec: &ShapeParameter) -> Self {
        Self {
            name: spec.name.to_owned(),
            min: spec.lower,
            max: spec.upper,
            value: spec.default,
            vary: true,
        }
    }

    pub fn in_bounds(&self) -> bool {
        self.value >= self.min && self.value <= self.max
    }

    /// Replaces the bounds; `lower` must be strictly below `upper`.
    pub fn set_bounds(&mut self, lower: f64, upper: f64) -> Result<()> {
        if lower.is_nan() || upper.is_nan() || lower >= upper {
            return Err(RamanError::MalformedBounds {
                name: self.name.clone(),
                lower,
                upper,
            });
        }
        self.min = lower;
        self.max = upper;
        Ok(())
    }

    pub fn check_initial_guess(&self) -> Result<()> {
        if self.in_bounds() {
            Ok(())
        } else {
            Err(RamanError::InitialGuessOutOfBounds {
                name: self.name.clone(),
                value: self.value,
                lower: self.min,
                upper: self.max,
            })
        }
    }
}
