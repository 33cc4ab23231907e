use std::f64::consts::{LN_2, SQRT_2};

use num_complex::Complex64;

use super::{FWHM_MIN, ShapeParameter, simpson};

pub const PARAMETERS: [ShapeParameter; 4] = [
    ShapeParameter::new("position", 0.0, f64::NEG_INFINITY, f64::INFINITY),
    ShapeParameter::new("intensity", 1.0, 0.0, f64::INFINITY),
    ShapeParameter::new("fwhm_gauss", 10.0, FWHM_MIN, f64::INFINITY),
    ShapeParameter::new("fwhm_lorentz", 10.0, FWHM_MIN, f64::INFINITY),
];

// Simpson intervals used for the area; even.
const QUADRATURE_INTERVALS: usize = 4000;

/// Faddeeva function `w(z)` for `Im z >= 0`, Humlíček's W4 rational
/// approximation (relative accuracy about 1e-4).
pub fn faddeeva(z: Complex64) -> Complex64 {
    let (x, y) = (z.re, z.im);
    let t = Complex64::new(y, -x);
    let s = x.abs() + y;

    if s >= 15.0 {
        t * 0.5641896 / (0.5 + t * t)
    } else if s >= 5.5 {
        let u = t * t;
        t * (1.410474 + u * 0.5641896) / (0.75 + u * (3.0 + u))
    } else if y >= 0.195 * x.abs() - 0.176 {
        let num = 16.4955 + t * (20.20933 + t * (11.96482 + t * (3.778987 + t * 0.5642236)));
        let den = 16.4955 + t * (38.82363 + t * (39.27121 + t * (21.69274 + t * (6.699398 + t))));
        num / den
    } else {
        let u = t * t;
        let num = t
            * (36183.31
                - u * (3321.9905
                    - u * (1540.787 - u * (219.0313 - u * (35.76683 - u * (1.320522 - u * 0.56419))))));
        let den = 32066.6
            - u * (24322.84
                - u * (9022.228
                    - u * (2186.181 - u * (364.2191 - u * (61.57037 - u * (1.841439 - u))))));
        u.exp() - num / den
    }
}

fn sigma(fwhm_gauss: f64) -> f64 {
    fwhm_gauss / (2.0 * (2.0 * LN_2).sqrt())
}

/// Voigt profile scaled so that its value at `position` is `intensity`.
pub fn value(x: f64, position: f64, intensity: f64, fwhm_gauss: f64, fwhm_lorentz: f64) -> f64 {
    let scale = sigma(fwhm_gauss) * SQRT_2;
    let gamma = 0.5 * fwhm_lorentz;
    let peak = faddeeva(Complex64::new(0.0, gamma / scale)).re;
    let w = faddeeva(Complex64::new((x - position) / scale, gamma / scale)).re;
    intensity * w / peak
}

/// Area over `[x1, x2]` by composite Simpson quadrature, partials by central
/// differences of the quadrature.
pub fn area(params: [f64; 4], window: (f64, f64)) -> (f64, [f64; 4]) {
    let integrate = |p: [f64; 4]| {
        simpson(
            |x| value(x, p[0], p[1], p[2], p[3]),
            window.0,
            window.1,
            QUADRATURE_INTERVALS,
        )
    };

    let a = integrate(params);
    let mut grad = [0.0; 4];
    for (k, g) in grad.iter_mut().enumerate() {
        let step = 1e-5 * params[k].abs().max(1e-2);
        let mut up = params;
        let mut down = params;
        up[k] += step;
        down[k] -= step;
        *g = (integrate(up) - integrate(down)) / (2.0 * step);
    }
    (a, grad)
}
