//! Peak-shape library. Each kind has a fixed, ordered parameter schema;
//! evaluation and areas take parameter values in that order.

pub mod bwf;
pub mod gaussian;
pub mod linear;
pub mod lorentz;
pub mod pseudo_voigt;
pub mod voigt;

use std::fmt;
use std::str::FromStr;

use crate::error::RamanError;

/// Lower bound shared by every FWHM parameter.
pub const FWHM_MIN: f64 = 1e-3;

/// Static description of one shape parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeParameter {
    pub name: &'static str,
    pub default: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ShapeParameter {
    pub const fn new(name: &'static str, default: f64, lower: f64, upper: f64) -> Self {
        Self {
            name,
            default,
            lower,
            upper,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub enum PeakShapeKind {
    Linear,
    Lorentz,
    Gauss,
    Voigt,
    PseudoVoigt,
    BreitWignerFano,
}

impl PeakShapeKind {
    pub const ALL: [PeakShapeKind; 6] = [
        Self::Linear,
        Self::Lorentz,
        Self::Gauss,
        Self::Voigt,
        Self::PseudoVoigt,
        Self::BreitWignerFano,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Lorentz => "lorentz",
            Self::Gauss => "gauss",
            Self::Voigt => "voigt",
            Self::PseudoVoigt => "pseudo_voigt",
            Self::BreitWignerFano => "bwf",
        }
    }

    pub fn parameters(&self) -> &'static [ShapeParameter] {
        match self {
            Self::Linear => &linear::PARAMETERS,
            Self::Lorentz => &lorentz::PARAMETERS,
            Self::Gauss => &gaussian::PARAMETERS,
            Self::Voigt => &voigt::PARAMETERS,
            Self::PseudoVoigt => &pseudo_voigt::PARAMETERS,
            Self::BreitWignerFano => &bwf::PARAMETERS,
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters().len()
    }

    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameters().iter().position(|p| p.name == name)
    }

    /// Whether the shape is a peak with a `position`, as opposed to a
    /// background term.
    pub fn is_peak(&self) -> bool {
        !matches!(self, Self::Linear)
    }

    fn check_len(&self, params: &[f64]) {
        assert_eq!(
            params.len(),
            self.parameter_count(),
            "{} takes {} parameters",
            self.name(),
            self.parameter_count()
        );
    }

    pub fn value(&self, x: f64, p: &[f64]) -> f64 {
        self.check_len(p);
        match self {
            Self::Linear => linear::value(x, p[0], p[1]),
            Self::Lorentz => lorentz::value(x, p[0], p[1], p[2]),
            Self::Gauss => gaussian::value(x, p[0], p[1], p[2]),
            Self::Voigt => voigt::value(x, p[0], p[1], p[2], p[3]),
            Self::PseudoVoigt => pseudo_voigt::value(x, p[0], p[1], p[2], p[3], p[4]),
            Self::BreitWignerFano => bwf::value(x, p[0], p[1], p[2], p[3]),
        }
    }

    pub fn evaluate(&self, x: &[f64], params: &[f64]) -> Vec<f64> {
        x.iter().map(|&x| self.value(x, params)).collect()
    }

    /// Area over `window` and its gradient with respect to the parameters.
    pub fn area(&self, p: &[f64], window: (f64, f64)) -> (f64, Vec<f64>) {
        self.check_len(p);
        match self {
            Self::Linear => {
                let (a, g) = linear::area(p[0], p[1], window);
                (a, g.to_vec())
            }
            Self::Lorentz => {
                let (a, g) = lorentz::area(p[0], p[1], p[2], window);
                (a, g.to_vec())
            }
            Self::Gauss => {
                let (a, g) = gaussian::area(p[0], p[1], p[2], window);
                (a, g.to_vec())
            }
            Self::Voigt => {
                let (a, g) = voigt::area([p[0], p[1], p[2], p[3]], window);
                (a, g.to_vec())
            }
            Self::PseudoVoigt => {
                let (a, g) = pseudo_voigt::area([p[0], p[1], p[2], p[3], p[4]], window);
                (a, g.to_vec())
            }
            Self::BreitWignerFano => {
                let (a, g) = bwf::area(p[0], p[1], p[2], p[3], window);
                (a, g.to_vec())
            }
        }
    }
}

impl fmt::Display for PeakShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PeakShapeKind {
    type Err = RamanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "linear" => Ok(Self::Linear),
            "lorentz" | "lorentzian" => Ok(Self::Lorentz),
            "gauss" | "gaussian" => Ok(Self::Gauss),
            "voigt" => Ok(Self::Voigt),
            "pseudo_voigt" | "pseudovoigt" => Ok(Self::PseudoVoigt),
            "bwf" | "breit_wigner_fano" | "breitwignerfano" => Ok(Self::BreitWignerFano),
            _ => Err(RamanError::UnknownShape(s.to_owned())),
        }
    }
}

/// Composite Simpson rule with `intervals` (rounded up to even) panels.
pub fn simpson<F: Fn(f64) -> f64>(f: F, a: f64, b: f64, intervals: usize) -> f64 {
    let n = (intervals.max(2) + 1) / 2 * 2;
    let h = (b - a) / n as f64;
    let inner: f64 = (1..n)
        .map(|i| {
            let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
            weight * f(a + h * i as f64)
        })
        .sum();
    h / 3.0 * (f(a) + inner + f(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::linspace;

    fn example(kind: PeakShapeKind) -> Vec<f64> {
        match kind {
            PeakShapeKind::Linear => vec![0.01, 2.0],
            PeakShapeKind::Lorentz | PeakShapeKind::Gauss => vec![1350.0, 150.0, 30.0],
            PeakShapeKind::Voigt => vec![1350.0, 150.0, 20.0, 25.0],
            PeakShapeKind::PseudoVoigt => vec![1350.0, 150.0, 20.0, 25.0, 0.3],
            PeakShapeKind::BreitWignerFano => vec![1590.0, 200.0, 30.0, -10.0],
        }
    }

    #[test]
    fn test_schemas_are_well_formed() {
        for kind in PeakShapeKind::ALL {
            for p in kind.parameters() {
                assert!(p.lower < p.upper, "{kind}.{}", p.name);
                assert!(p.default >= p.lower && p.default <= p.upper, "{kind}.{}", p.name);
                if p.name.starts_with("fwhm") {
                    assert_eq!(p.lower, FWHM_MIN, "fwhm lower bound");
                }
            }
            assert_eq!(kind.name().parse::<PeakShapeKind>().unwrap(), kind, "name round trip");
        }
        assert_eq!(
            "Breit-Wigner-Fano".parse::<PeakShapeKind>().unwrap(),
            PeakShapeKind::BreitWignerFano,
            "display name parses",
        );
        assert!(
            matches!(
                "sinc".parse::<PeakShapeKind>(),
                Err(RamanError::UnknownShape(_))
            ),
            "unknown shape",
        );
    }

    #[test]
    fn test_maximum_at_position_equals_intensity() {
        let x = linspace(1200.0, 1500.0, 3001);
        for kind in [
            PeakShapeKind::Lorentz,
            PeakShapeKind::Gauss,
            PeakShapeKind::Voigt,
            PeakShapeKind::PseudoVoigt,
        ] {
            let p = example(kind);
            let y = kind.evaluate(&x, &p);
            let (imax, ymax) = y
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });
            assert!((x[imax] - 1350.0).abs() < 1e-9, "{kind}");
            assert!((ymax - 150.0).abs() < 1e-9, "{kind}");
        }
        let p = example(PeakShapeKind::BreitWignerFano);
        assert!(
            (PeakShapeKind::BreitWignerFano.value(1590.0, &p) - 200.0).abs() < 1e-12,
            "BWF peak height at the position",
        );
    }

    #[test]
    fn test_bwf_approaches_lorentz_for_large_q() {
        let x = linspace(1000.0, 2000.0, 1000);
        let lorentz = PeakShapeKind::Lorentz.evaluate(&x, &[1500.0, 100.0, 30.0]);
        let bwf = PeakShapeKind::BreitWignerFano.evaluate(&x, &[1500.0, 100.0, 30.0, 1e6]);
        for (l, b) in lorentz.iter().zip(&bwf) {
            assert!((l - b).abs() / l < 1e-3, "large |q| approaches a Lorentzian");
        }
    }

    #[test]
    fn test_closed_form_areas_match_quadrature() {
        for kind in PeakShapeKind::ALL {
            let p = example(kind);
            let (center, width) = if kind.is_peak() { (p[0], p[2]) } else { (1000.0, 10.0) };
            let window = (center - 50.0 * width, center + 50.0 * width);
            let (a, _) = kind.area(&p, window);
            let numeric = simpson(|x| kind.value(x, &p), window.0, window.1, 200_000);
            assert!(((a - numeric) / numeric).abs() < 1e-4, "{kind}: {a} vs {numeric}");
        }
    }

    #[test]
    fn test_area_gradients_match_finite_differences() {
        let window = (1250.0, 1700.0);
        for kind in PeakShapeKind::ALL {
            let p = example(kind);
            let (_, grad) = kind.area(&p, window);
            for k in 0..p.len() {
                let step = 1e-6 * p[k].abs().max(1.0);
                let mut up = p.clone();
                let mut down = p.clone();
                up[k] += step;
                down[k] -= step;
                let numeric = (kind.area(&up, window).0 - kind.area(&down, window).0) / (2.0 * step);
                let scale = numeric.abs().max(1.0);
                assert!((grad[k] - numeric).abs() < 1e-3 * scale, "{kind}[{k}]");
            }
        }
    }

    #[test]
    fn test_simpson_is_exact_for_cubics() {
        let integral = simpson(|x| x * x * x - 2.0 * x, 0.0, 2.0, 3);
        assert!((integral - 0.0).abs() < 1e-12, "odd integrand");
    }

    #[test]
    #[should_panic(expected = "lorentz takes 3 parameters")]
    fn test_wrong_parameter_count_panics() {
        PeakShapeKind::Lorentz.value(1.0, &[1.0, 2.0]);
    }
}
