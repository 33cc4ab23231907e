use super::{FWHM_MIN, ShapeParameter};

pub const PARAMETERS: [ShapeParameter; 3] = [
    ShapeParameter::new("position", 0.0, f64::NEG_INFINITY, f64::INFINITY),
    ShapeParameter::new("intensity", 1.0, 0.0, f64::INFINITY),
    ShapeParameter::new("fwhm", 10.0, FWHM_MIN, f64::INFINITY),
];

pub fn value(x: f64, position: f64, intensity: f64, fwhm: f64) -> f64 {
    let u = 2.0 * (x - position) / fwhm;
    intensity / (1.0 + u * u)
}

/// Closed-form area over `[x1, x2]` and its partials with respect to
/// `(position, intensity, fwhm)`.
pub fn area(position: f64, intensity: f64, fwhm: f64, (x1, x2): (f64, f64)) -> (f64, [f64; 3]) {
    let u1 = 2.0 * (x1 - position) / fwhm;
    let u2 = 2.0 * (x2 - position) / fwhm;
    let datan = u2.atan() - u1.atan();

    let a = 0.5 * intensity * fwhm * datan;
    let d_position = intensity * (1.0 / (1.0 + u1 * u1) - 1.0 / (1.0 + u2 * u2));
    let d_intensity = 0.5 * fwhm * datan;
    let d_fwhm =
        0.5 * intensity * datan + 0.5 * intensity * (u1 / (1.0 + u1 * u1) - u2 / (1.0 + u2 * u2));
    (a, [d_position, d_intensity, d_fwhm])
}
