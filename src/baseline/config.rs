use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use super::BaselineMethod;
use crate::error::{RamanError, Result};

/// A region of interest on the `x` axis, bounds inclusive and unordered.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Roi {
    pub start: f64,
    pub end: f64,
}

impl Roi {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.start.min(self.end) && x <= self.start.max(self.end)
    }
}

/// Samples falling inside any region; everything when `regions` is empty.
pub fn select_regions(x: &[f64], y: &[f64], regions: &[Roi]) -> (Vec<f64>, Vec<f64>) {
    if regions.is_empty() {
        return (x.to_vec(), y.to_vec());
    }
    x.iter()
        .zip(y)
        .filter(|(x, _)| regions.iter().any(|roi| roi.contains(**x)))
        .map(|(x, y)| (*x, *y))
        .unzip()
}

/// Which baseline to run and how. Missing parameters take the method's
/// documented default.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub method: String,
    pub params: BTreeMap<String, f64>,
    pub regions: Vec<Roi>,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            method: BaselineMethod::Als.name().to_owned(),
            params: BTreeMap::new(),
            regions: Vec::new(),
        }
    }
}

impl BaselineConfig {
    pub fn new(method: &str) -> Self {
        Self {
            method: method.to_owned(),
            ..Default::default()
        }
    }

    pub fn with_param(mut self, key: &str, value: f64) -> Self {
        self.params.insert(key.to_owned(), value);
        self
    }

    pub fn with_regions(mut self, regions: Vec<Roi>) -> Self {
        self.regions = regions;
        self
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads a `.json` file as JSON and anything else as YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_reader(reader)?
        } else {
            serde_yaml::from_reader(reader)?
        };
        log::info!("Loaded baseline configuration from {}", path.display());
        Ok(config)
    }

    pub fn save_yaml(&self, path: &Path) -> Result<()> {
        let serialized = serde_yaml::to_string(self)?;
        let mut file = File::create(path)?;
        file.write_all(serialized.as_bytes())?;
        Ok(())
    }

    /// Parses the method name and checks every parameter and region.
    pub fn resolve(&self) -> Result<(BaselineMethod, ResolvedParams)> {
        let method: BaselineMethod = self.method.parse()?;
        let params = method.resolve_params(&self.params)?;

        if !self.regions.is_empty() && !method.accepts_regions() {
            return Err(RamanError::RegionsNotSupported(method.name().to_owned()));
        }
        for roi in &self.regions {
            if !roi.start.is_finite() || !roi.end.is_finite() || roi.start == roi.end {
                return Err(RamanError::MalformedBounds {
                    name: "region".to_owned(),
                    lower: roi.start,
                    upper: roi.end,
                });
            }
        }
        Ok((method, params))
    }
}

/// Documented name, default and inclusive range of one method parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub default: f64,
    pub min: f64,
    pub max: f64,
    pub integer: bool,
}

impl ParameterSpec {
    pub const fn real(name: &'static str, default: f64, min: f64, max: f64) -> Self {
        Self {
            name,
            default,
            min,
            max,
            integer: false,
        }
    }

    pub const fn count(name: &'static str, default: f64, min: f64, max: f64) -> Self {
        Self {
            name,
            default,
            min,
            max,
            integer: true,
        }
    }

    fn check(&self, value: f64) -> Result<f64> {
        let in_range = value >= self.min && value <= self.max;
        if !in_range || (self.integer && value.fract() != 0.0) {
            return Err(RamanError::ParameterOutOfRange {
                name: self.name.to_owned(),
                value,
                min: self.min,
                max: self.max,
            });
        }
        Ok(value)
    }
}

/// Every parameter of one method with defaults filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParams {
    values: BTreeMap<&'static str, f64>,
}

impl ResolvedParams {
    pub(super) fn resolve(
        method: &str,
        specs: &[ParameterSpec],
        given: &BTreeMap<String, f64>,
    ) -> Result<Self> {
        if let Some(key) = given
            .keys()
            .find(|key| !specs.iter().any(|spec| spec.name == key.as_str()))
        {
            return Err(RamanError::UnknownParameter {
                method: method.to_owned(),
                key: key.clone(),
            });
        }

        let mut values = BTreeMap::new();
        for spec in specs {
            let value = match given.get(spec.name) {
                Some(&value) => spec.check(value)?,
                None => spec.default,
            };
            values.insert(spec.name, value);
        }
        Ok(Self { values })
    }

    /// Looks up a parameter declared in the method's schema.
    pub fn get(&self, name: &str) -> f64 {
        self.values.get(name).copied().unwrap_or_else(|| {
            panic!("parameter `{name}` is not part of this method's schema")
        })
    }

    pub fn count(&self, name: &str) -> usize {
        self.get(name) as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }
}
