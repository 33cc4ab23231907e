use super::ShapeParameter;

pub const PARAMETERS: [ShapeParameter; 2] = [
    ShapeParameter::new("slope", 0.0, f64::NEG_INFINITY, f64::INFINITY),
    ShapeParameter::new("intercept", 0.0, f64::NEG_INFINITY, f64::INFINITY),
];

pub fn value(x: f64, slope: f64, intercept: f64) -> f64 {
    slope * x + intercept
}

/// Area over `[x1, x2]` and its partials with respect to `(slope, intercept)`.
pub fn area(slope: f64, intercept: f64, (x1, x2): (f64, f64)) -> (f64, [f64; 2]) {
    let d_slope = 0.5 * (x2 * x2 - x1 * x1);
    let d_intercept = x2 - x1;
    (slope * d_slope + intercept * d_intercept, [d_slope, d_intercept])
}
