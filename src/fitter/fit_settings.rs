use std::path::Path;

use crate::error::Result;

/// Tolerances and caps for the least-squares solver.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct FitSettings {
    /// Relative reduction of the cost below which the fit stops.
    pub ftol: f64,
    /// Relative step size below which the fit stops.
    pub xtol: f64,
    /// Largest cosine between the residuals and a Jacobian column at which
    /// the fit stops.
    pub gtol: f64,
    /// Cap on Jacobian evaluations. Residual evaluations are also capped at
    /// `max_iterations · (n + 1)` for `n` free parameters.
    pub max_iterations: usize,
    /// Factor for the initial step bound.
    pub step_bound: f64,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
            max_iterations: 200,
            step_bound: 100.0,
        }
    }
}

impl FitSettings {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads JSON for `.json` files, YAML otherwise.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            _ => Self::from_yaml(&text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let settings = FitSettings::from_yaml("max_iterations: 50\nftol: 1.0e-10\n").unwrap();
        assert_eq!(settings.max_iterations, 50, "explicit key");
        assert_eq!(settings.ftol, 1e-10, "explicit key");
        assert_eq!(settings.gtol, FitSettings::default().gtol, "missing key keeps default");
    }

    #[test]
    fn test_json_round_trip() {
        let settings = FitSettings::default().with_max_iterations(7);
        let text = serde_json::to_string(&settings).unwrap();
        assert_eq!(FitSettings::from_json(&text).unwrap(), settings, "{text}");
    }
}
