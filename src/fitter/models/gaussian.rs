use std::f64::consts::{LN_2, PI};

use super::{FWHM_MIN, ShapeParameter};

pub const PARAMETERS: [ShapeParameter; 3] = [
    ShapeParameter::new("position", 0.0, f64::NEG_INFINITY, f64::INFINITY),
    ShapeParameter::new("intensity", 1.0, 0.0, f64::INFINITY),
    ShapeParameter::new("fwhm", 10.0, FWHM_MIN, f64::INFINITY),
];

pub fn value(x: f64, position: f64, intensity: f64, fwhm: f64) -> f64 {
    let t = (x - position) / fwhm;
    intensity * (-4.0 * LN_2 * t * t).exp()
}

/// FWHM of a Gaussian with standard deviation `sigma`.
pub fn fwhm_from_sigma(sigma: f64) -> f64 {
    2.0 * (2.0 * LN_2).sqrt() * sigma
}

/// Closed-form area over `[x1, x2]` (via `erf`) and its partials with
/// respect to `(position, intensity, fwhm)`.
pub fn area(position: f64, intensity: f64, fwhm: f64, (x1, x2): (f64, f64)) -> (f64, [f64; 3]) {
    let root_ln2 = LN_2.sqrt();
    let k = PI.sqrt() / (4.0 * root_ln2);
    let v1 = 2.0 * root_ln2 * (x1 - position) / fwhm;
    let v2 = 2.0 * root_ln2 * (x2 - position) / fwhm;
    let derf = libm::erf(v2) - libm::erf(v1);
    let e1 = (-v1 * v1).exp();
    let e2 = (-v2 * v2).exp();

    let a = intensity * fwhm * k * derf;
    let d_position = intensity * (e1 - e2);
    let d_intensity = fwhm * k * derf;
    let d_fwhm = intensity * k * derf - intensity / (2.0 * root_ln2) * (v2 * e2 - v1 * e1);
    (a, [d_position, d_intensity, d_fwhm])
}
