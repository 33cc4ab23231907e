use super::{FWHM_MIN, ShapeParameter, gaussian, lorentz};

pub const PARAMETERS: [ShapeParameter; 5] = [
    ShapeParameter::new("position", 0.0, f64::NEG_INFINITY, f64::INFINITY),
    ShapeParameter::new("intensity", 1.0, 0.0, f64::INFINITY),
    ShapeParameter::new("fwhm_gauss", 10.0, FWHM_MIN, f64::INFINITY),
    ShapeParameter::new("fwhm_lorentz", 10.0, FWHM_MIN, f64::INFINITY),
    ShapeParameter::new("fraction", 0.5, 0.0, 1.0),
];

/// `fraction · Lorentz(fwhm_lorentz) + (1 − fraction) · Gauss(fwhm_gauss)`.
pub fn value(
    x: f64,
    position: f64,
    intensity: f64,
    fwhm_gauss: f64,
    fwhm_lorentz: f64,
    fraction: f64,
) -> f64 {
    fraction * lorentz::value(x, position, intensity, fwhm_lorentz)
        + (1.0 - fraction) * gaussian::value(x, position, intensity, fwhm_gauss)
}

/// Weighted sum of the closed-form Lorentz and Gauss areas, partials with
/// respect to `(position, intensity, fwhm_gauss, fwhm_lorentz, fraction)`.
pub fn area(params: [f64; 5], window: (f64, f64)) -> (f64, [f64; 5]) {
    let [position, intensity, fwhm_gauss, fwhm_lorentz, fraction] = params;
    let (a_l, g_l) = lorentz::area(position, intensity, fwhm_lorentz, window);
    let (a_g, g_g) = gaussian::area(position, intensity, fwhm_gauss, window);
    let nu = fraction;

    let a = nu * a_l + (1.0 - nu) * a_g;
    (
        a,
        [
            nu * g_l[0] + (1.0 - nu) * g_g[0],
            nu * g_l[1] + (1.0 - nu) * g_g[1],
            (1.0 - nu) * g_g[2],
            nu * g_l[2],
            a_l - a_g,
        ],
    )
}
