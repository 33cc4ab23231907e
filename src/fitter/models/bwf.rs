//! Breit-Wigner-Fano line: a Lorentzian skewed by the coupling `q`. As
//! `|q| → ∞` the shape becomes a Lorentzian of the same FWHM.
//!
//! `q < 0` puts the tail on the low-wavenumber side, as for the G band of
//! disordered carbon. Bounds on `q` stay on one side of zero.

use super::{FWHM_MIN, ShapeParameter};

pub const PARAMETERS: [ShapeParameter; 4] = [
    ShapeParameter::new("position", 0.0, f64::NEG_INFINITY, f64::INFINITY),
    ShapeParameter::new("intensity", 1.0, 0.0, f64::INFINITY),
    ShapeParameter::new("fwhm", 10.0, FWHM_MIN, f64::INFINITY),
    ShapeParameter::new("q", -10.0, -1e4, -1e-2),
];

pub fn value(x: f64, position: f64, intensity: f64, fwhm: f64, q: f64) -> f64 {
    let u = 2.0 * (x - position) / fwhm;
    let skew = 1.0 + u / q;
    intensity * skew * skew / (1.0 + u * u)
}

fn antiderivative(u: f64, q: f64) -> f64 {
    let q2 = q * q;
    u / q2 + (1.0 - 1.0 / q2) * u.atan() + (1.0 + u * u).ln() / q
}

fn antiderivative_dq(u: f64, q: f64) -> f64 {
    let q2 = q * q;
    let q3 = q2 * q;
    -2.0 * u / q3 + 2.0 * u.atan() / q3 - (1.0 + u * u).ln() / q2
}

fn profile(u: f64, q: f64) -> f64 {
    let skew = 1.0 + u / q;
    skew * skew / (1.0 + u * u)
}

/// Closed-form area over `[x1, x2]` and its partials with respect to
/// `(position, intensity, fwhm, q)`.
pub fn area(
    position: f64,
    intensity: f64,
    fwhm: f64,
    q: f64,
    (x1, x2): (f64, f64),
) -> (f64, [f64; 4]) {
    let u1 = 2.0 * (x1 - position) / fwhm;
    let u2 = 2.0 * (x2 - position) / fwhm;
    let df = antiderivative(u2, q) - antiderivative(u1, q);
    let (g1, g2) = (profile(u1, q), profile(u2, q));

    let a = 0.5 * intensity * fwhm * df;
    let d_position = intensity * (g1 - g2);
    let d_intensity = 0.5 * fwhm * df;
    let d_fwhm = 0.5 * intensity * df - 0.5 * intensity * (u2 * g2 - u1 * g1);
    let d_q = 0.5 * intensity * fwhm * (antiderivative_dq(u2, q) - antiderivative_dq(u1, q));
    (a, [d_position, d_intensity, d_fwhm, d_q])
}
