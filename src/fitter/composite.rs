//! Multi-peak model: a constant background plus an ordered list of peaks,
//! flattened to `[background] ++ peak_0 ++ peak_1 ++ ...` for the solver.

use super::common::Parameter;
use super::models::PeakShapeKind;
use crate::error::{RamanError, Result};

#[derive(PartialEq, Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct PeakInstance {
    pub kind: PeakShapeKind,
    pub parameters: Vec<Parameter>,
}

impl PeakInstance {
    /// A peak with the kind's defaults, or with `values` in schema order.
    pub fn new(kind: PeakShapeKind, values: Option<&[f64]>) -> Result<Self> {
        let schema = kind.parameters();
        if let Some(values) = values
            && values.len() != schema.len()
        {
            return Err(RamanError::ParameterCount {
                kind: kind.name().to_owned(),
                expected: schema.len(),
                got: values.len(),
            });
        }

        let parameters = schema
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let mut parameter = Parameter::from_shape(spec);
                if let Some(values) = values {
                    parameter.value = values[i];
                }
                parameter
            })
            .collect();
        Ok(Self { kind, parameters })
    }

    pub fn values(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.value).collect()
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    fn parameter_mut(&mut self, name: &str) -> Result<&mut Parameter> {
        let kind = self.kind;
        self.parameters
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| RamanError::UnknownShapeParameter {
                shape: kind.name().to_owned(),
                name: name.to_owned(),
            })
    }

    pub fn position(&self) -> Option<f64> {
        self.parameter("position").map(|p| p.value)
    }
}

/// Where a flat-vector entry lives in the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterLocation {
    Background,
    Peak { index: usize, name: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackedParameters {
    pub values: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub vary: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnpackedPeak {
    pub kind: PeakShapeKind,
    pub values: Vec<(&'static str, f64)>,
}

impl UnpackedPeak {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    pub fn raw(&self) -> Vec<f64> {
        self.values.iter().map(|(_, v)| *v).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnpackedParameters {
    pub background: f64,
    pub peaks: Vec<UnpackedPeak>,
}

#[derive(PartialEq, Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct CompositeSpectrumModel {
    background: Parameter,
    peaks: Vec<PeakInstance>,
}

impl Default for CompositeSpectrumModel {
    fn default() -> Self {
        Self {
            background: Parameter::new("background", 0.0),
            peaks: Vec::new(),
        }
    }
}

impl CompositeSpectrumModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_background(mut self, value: f64) -> Self {
        self.background.value = value;
        self
    }

    pub fn background(&self) -> &Parameter {
        &self.background
    }

    pub fn background_mut(&mut self) -> &mut Parameter {
        &mut self.background
    }

    pub fn peaks(&self) -> &[PeakInstance] {
        &self.peaks
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    /// Length of the flat parameter vector.
    pub fn n_params(&self) -> usize {
        1 + self.peaks.iter().map(|p| p.parameters.len()).sum::<usize>()
    }

    /// Appends a peak and returns its index.
    pub fn add_peak(&mut self, kind: PeakShapeKind, initial: Option<&[f64]>) -> Result<usize> {
        self.peaks.push(PeakInstance::new(kind, initial)?);
        Ok(self.peaks.len() - 1)
    }

    pub fn remove_peak(&mut self, index: usize) -> Result<PeakInstance> {
        if index >= self.peaks.len() {
            return Err(RamanError::PeakIndexOutOfRange {
                index,
                len: self.peaks.len(),
            });
        }
        Ok(self.peaks.remove(index))
    }

    fn peak_mut(&mut self, index: usize) -> Result<&mut PeakInstance> {
        let len = self.peaks.len();
        self.peaks
            .get_mut(index)
            .ok_or(RamanError::PeakIndexOutOfRange { index, len })
    }

    pub fn set_value(&mut self, peak: usize, name: &str, value: f64) -> Result<()> {
        self.peak_mut(peak)?.parameter_mut(name)?.value = value;
        Ok(())
    }

    /// Replaces the bounds of one peak parameter. The BWF coupling `q`
    /// divides the profile, so its interval must not contain zero.
    pub fn set_bounds(&mut self, peak: usize, name: &str, lower: f64, upper: f64) -> Result<()> {
        let instance = self.peak_mut(peak)?;
        if instance.kind == PeakShapeKind::BreitWignerFano
            && name == "q"
            && lower <= 0.0
            && upper >= 0.0
        {
            return Err(RamanError::MalformedBounds {
                name: name.to_owned(),
                lower,
                upper,
            });
        }
        instance.parameter_mut(name)?.set_bounds(lower, upper)
    }

    pub fn set_vary(&mut self, peak: usize, name: &str, vary: bool) -> Result<()> {
        self.peak_mut(peak)?.parameter_mut(name)?.vary = vary;
        Ok(())
    }

    fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        std::iter::once(&self.background).chain(self.peaks.iter().flat_map(|p| &p.parameters))
    }

    pub fn pack(&self) -> PackedParameters {
        let mut packed = PackedParameters {
            values: Vec::with_capacity(self.n_params()),
            lower: Vec::with_capacity(self.n_params()),
            upper: Vec::with_capacity(self.n_params()),
            vary: Vec::with_capacity(self.n_params()),
        };
        for parameter in self.parameters() {
            packed.values.push(parameter.value);
            packed.lower.push(parameter.min);
            packed.upper.push(parameter.max);
            packed.vary.push(parameter.vary);
        }
        packed
    }

    pub fn free_mask(&self) -> Vec<bool> {
        self.parameters().map(|p| p.vary).collect()
    }

    /// Flat names such as `background` or `p1_fwhm`.
    pub fn parameter_names(&self) -> Vec<String> {
        (0..self.n_params())
            .map(|i| match self.locate(i) {
                Some(ParameterLocation::Peak { index, name }) => format!("p{index}_{name}"),
                _ => self.background.name.clone(),
            })
            .collect()
    }

    fn check_len(&self, flat: &[f64]) {
        assert_eq!(
            flat.len(),
            self.n_params(),
            "flat parameter vector does not match the model"
        );
    }

    /// Splits a flat vector into background and named per-peak values.
    pub fn unpack(&self, flat: &[f64]) -> UnpackedParameters {
        self.check_len(flat);
        let mut offset = 1;
        let peaks = self
            .peaks
            .iter()
            .map(|peak| {
                let n = peak.kind.parameter_count();
                let values = peak
                    .kind
                    .parameters()
                    .iter()
                    .zip(&flat[offset..offset + n])
                    .map(|(spec, &v)| (spec.name, v))
                    .collect();
                offset += n;
                UnpackedPeak {
                    kind: peak.kind,
                    values,
                }
            })
            .collect();
        UnpackedParameters {
            background: flat[0],
            peaks,
        }
    }

    /// Slices of `flat` belonging to each peak, in order.
    pub fn peak_slices<'a>(&self, flat: &'a [f64]) -> Vec<&'a [f64]> {
        self.check_len(flat);
        let mut offset = 1;
        self.peaks
            .iter()
            .map(|peak| {
                let n = peak.kind.parameter_count();
                let slice = &flat[offset..offset + n];
                offset += n;
                slice
            })
            .collect()
    }

    pub fn evaluate(&self, x: &[f64], flat: &[f64]) -> Vec<f64> {
        let slices = self.peak_slices(flat);
        x.iter()
            .map(|&xi| {
                flat[0]
                    + self
                        .peaks
                        .iter()
                        .zip(&slices)
                        .map(|(peak, p)| peak.kind.value(xi, p))
                        .sum::<f64>()
            })
            .collect()
    }

    /// One curve per peak, background excluded.
    pub fn components(&self, x: &[f64], flat: &[f64]) -> Vec<Vec<f64>> {
        self.peaks
            .iter()
            .zip(self.peak_slices(flat))
            .map(|(peak, p)| peak.kind.evaluate(x, p))
            .collect()
    }

    pub fn locate(&self, flat_index: usize) -> Option<ParameterLocation> {
        if flat_index == 0 {
            return Some(ParameterLocation::Background);
        }
        let mut offset = 1;
        for (index, peak) in self.peaks.iter().enumerate() {
            let n = peak.kind.parameter_count();
            if flat_index < offset + n {
                return Some(ParameterLocation::Peak {
                    index,
                    name: peak.kind.parameters()[flat_index - offset].name,
                });
            }
            offset += n;
        }
        None
    }

    pub fn index_of(&self, peak: usize, name: &str) -> Result<usize> {
        let instance = self.peaks.get(peak).ok_or(RamanError::PeakIndexOutOfRange {
            index: peak,
            len: self.peaks.len(),
        })?;
        let within = instance.kind.parameter_index(name).ok_or_else(|| {
            RamanError::UnknownShapeParameter {
                shape: instance.kind.name().to_owned(),
                name: name.to_owned(),
            }
        })?;
        let offset: usize = 1 + self.peaks[..peak]
            .iter()
            .map(|p| p.kind.parameter_count())
            .sum::<usize>();
        Ok(offset + within)
    }

    /// A copy of the model holding `flat` as its parameter values.
    pub fn with_values(&self, flat: &[f64]) -> Self {
        self.check_len(flat);
        let mut model = self.clone();
        model.background.value = flat[0];
        for (parameter, &value) in model
            .peaks
            .iter_mut()
            .flat_map(|p| p.parameters.iter_mut())
            .zip(&flat[1..])
        {
            parameter.value = value;
        }
        model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_peaks() -> CompositeSpectrumModel {
        let mut model = CompositeSpectrumModel::new().with_background(10.0);
        model
            .add_peak(PeakShapeKind::Lorentz, Some(&[1350.0, 150.0, 30.0]))
            .unwrap();
        model
            .add_peak(PeakShapeKind::BreitWignerFano, Some(&[1590.0, 200.0, 30.0, -10.0]))
            .unwrap();
        model
    }

    #[test]
    fn test_pack_unpack_round_trip() {
        let model = two_peaks();
        let packed = model.pack();
        assert_eq!(packed.values.len(), 8, "background plus 3 + 4 peak parameters");
        assert_eq!(
            packed.values,
            vec![10.0, 1350.0, 150.0, 30.0, 1590.0, 200.0, 30.0, -10.0],
            "flat vector layout",
        );
        assert_eq!(packed.lower[7], -1e4, "BWF q lower bound");
        assert_eq!(packed.upper[7], -1e-2, "BWF q upper bound");

        let unpacked = model.unpack(&packed.values);
        assert_eq!(unpacked.background, 10.0, "background unpacked");
        assert_eq!(unpacked.peaks[1].get("q"), Some(-10.0), "q unpacked");
        let repacked: Vec<f64> = std::iter::once(unpacked.background)
            .chain(unpacked.peaks.iter().flat_map(|p| p.raw()))
            .collect();
        assert_eq!(repacked, packed.values, "unpack then pack is the identity");
        assert_eq!(model.with_values(&packed.values), model, "with_values keeps the model");
    }

    #[test]
    fn test_defaults_and_wrong_lengths() {
        let mut model = CompositeSpectrumModel::new();
        model.add_peak(PeakShapeKind::PseudoVoigt, None).unwrap();
        assert_eq!(model.pack().values, vec![0.0, 0.0, 1.0, 10.0, 10.0, 0.5], "shape defaults");

        let err = model
            .add_peak(PeakShapeKind::Gauss, Some(&[1.0, 2.0]))
            .unwrap_err();
        assert!(
            matches!(
                err,
                RamanError::ParameterCount {
                    expected: 3,
                    got: 2,
                    ..
                }
            ),
            "{err}",
        );
        assert_eq!(model.len(), 1, "one peak added");
    }

    #[test]
    fn test_remove_peak_and_bad_index() {
        let mut model = two_peaks();
        let removed = model.remove_peak(0).unwrap();
        assert_eq!(removed.kind, PeakShapeKind::Lorentz, "removed peak returned");
        assert_eq!(model.n_params(), 5, "background plus Gauss");
        assert!(
            matches!(
                model.remove_peak(3),
                Err(RamanError::PeakIndexOutOfRange { index: 3, len: 1 })
            ),
            "index past the end",
        );
    }

    #[test]
    fn test_locate_and_index_of() {
        let model = two_peaks();
        assert_eq!(
            model.locate(0),
            Some(ParameterLocation::Background),
            "index 0 is the background",
        );
        assert_eq!(
            model.locate(6),
            Some(ParameterLocation::Peak {
                index: 1,
                name: "fwhm"
            }),
            "second peak fwhm",
        );
        assert_eq!(model.locate(8), None, "past the end");
        assert_eq!(model.index_of(1, "q").unwrap(), 7, "flat index of q");
        assert_eq!(model.index_of(0, "position").unwrap(), 1, "flat index of the first position");
        assert!(model.index_of(0, "q").is_err(), "Lorentz has no q");
        assert_eq!(model.parameter_names()[4], "p1_position", "flat parameter name");
    }

    #[test]
    fn test_evaluate_is_background_plus_components() {
        let model = two_peaks();
        let flat = model.pack().values;
        let x = [1300.0, 1350.0, 1590.0, 1800.0];
        let total = model.evaluate(&x, &flat);
        let parts = model.components(&x, &flat);
        for (i, t) in total.iter().enumerate() {
            let sum: f64 = 10.0 + parts.iter().map(|c| c[i]).sum::<f64>();
            assert!((t - sum).abs() < 1e-12, "total is the sum of components");
        }
    }

    #[test]
    fn test_bounds_and_vary() {
        let mut model = two_peaks();
        model.set_bounds(0, "position", 1300.0, 1400.0).unwrap();
        model.set_vary(1, "q", false).unwrap();
        model.set_value(1, "q", -20.0).unwrap();
        let packed = model.pack();
        assert_eq!((packed.lower[1], packed.upper[1]), (1300.0, 1400.0), "position bounds");
        assert_eq!(packed.values[7], -20.0, "q value");
        assert_eq!(model.free_mask().iter().filter(|v| !**v).count(), 1, "one fixed parameter");

        assert!(
            matches!(
                model.set_bounds(0, "fwhm", 5.0, 1.0),
                Err(RamanError::MalformedBounds { .. })
            ),
            "lower above upper",
        );
        assert!(
            matches!(
                model.set_vary(0, "fraction", false),
                Err(RamanError::UnknownShapeParameter { .. })
            ),
            "Lorentz has no fraction",
        );
    }

    #[test]
    fn test_bwf_q_bounds_stay_off_zero() {
        let mut model = two_peaks();
        for (lower, upper) in [(-5.0, 5.0), (-5.0, 0.0), (0.0, 5.0)] {
            let err = model.set_bounds(1, "q", lower, upper).unwrap_err();
            assert!(
                matches!(err, RamanError::MalformedBounds { ref name, .. } if name == "q"),
                "[{lower}, {upper}]: {err}"
            );
        }
        let packed = model.pack();
        assert_eq!(
            (packed.lower[7], packed.upper[7]),
            (-1e4, -1e-2),
            "rejected bounds are not stored"
        );

        model.set_bounds(1, "q", -50.0, -1.0).unwrap();
        model.set_value(1, "q", 5.0).unwrap();
        model.set_bounds(1, "q", 0.5, 50.0).unwrap();
        let packed = model.pack();
        assert_eq!((packed.lower[7], packed.upper[7]), (0.5, 50.0), "positive q is allowed");
        // the position of a BWF peak may still span zero
        assert!(model.set_bounds(1, "position", -10.0, 10.0).is_ok(), "only q is restricted");
    }

    #[test]
    #[should_panic(expected = "flat parameter vector does not match the model")]
    fn test_unpack_length_mismatch_panics() {
        two_peaks().unpack(&[1.0, 2.0]);
    }
}
