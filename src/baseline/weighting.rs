//! Weight policies for the penalized smoother, one per IRPLS method.

use super::banded::BandMatrix;
use super::polynomial::polyfit;
use super::smoother::{Penalties, WeightPolicy, WeightUpdate};
use crate::error::Result;
use crate::spectrum::require_ascending;

// e^t is evaluated for the iteration count t; anything past this overflows.
const MAX_EXPONENT: f64 = 700.0;

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// `‖new − old‖ / ‖old‖`.
fn relative_change(old: &[f64], new: &[f64]) -> f64 {
    let diff: f64 = old
        .iter()
        .zip(new)
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f64>()
        .sqrt();
    diff / norm(old).max(f64::MIN_POSITIVE)
}

fn residuals(y: &[f64], z: &[f64]) -> Vec<f64> {
    y.iter().zip(z).map(|(y, z)| y - z).collect()
}

/// Mean and population standard deviation of the negative residuals, or
/// `None` when fewer than two are negative.
fn negative_stats(d: &[f64]) -> Option<(f64, f64)> {
    let negative: Vec<f64> = d.iter().copied().filter(|&v| v < 0.0).collect();
    if negative.len() < 2 {
        return None;
    }
    let count = negative.len() as f64;
    let mean = negative.iter().sum::<f64>() / count;
    let var = negative.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count;
    Some((mean, var.sqrt()))
}

fn asymmetric_weights(y: &[f64], z: &[f64], p: f64) -> Vec<f64> {
    y.iter()
        .zip(z)
        .map(|(y, z)| if y > z { p } else { 1.0 - p })
        .collect()
}

/// Asymmetric least squares (Eilers & Boelens 2005).
#[derive(Debug, Clone)]
pub struct Als {
    pub p: f64,
    pub max_iter: usize,
}

impl WeightPolicy for Als {
    fn name(&self) -> &'static str {
        "als"
    }

    fn max_iter(&self) -> usize {
        self.max_iter
    }

    fn fixed_iterations(&self) -> bool {
        true
    }

    fn update(&self, y: &[f64], z: &[f64], weights: &[f64], _iteration: usize) -> WeightUpdate {
        let new = asymmetric_weights(y, z, self.p);
        WeightUpdate {
            criterion: relative_change(weights, &new),
            weights: new,
            converged: false,
        }
    }
}

/// Improved asymmetric least squares (He et al. 2014). Adds a first-order
/// penalty and squares the weights; starts from a quadratic fit.
#[derive(Debug, Clone)]
pub struct Iasls {
    p: f64,
    lam_1: f64,
    max_iter: usize,
    ratio: f64,
    initial: Vec<f64>,
}

impl Iasls {
    pub fn new(x: &[f64], y: &[f64], p: f64, lam_1: f64, max_iter: usize, ratio: f64) -> Result<Self> {
        let trend = polyfit(x, y, 2)?.evaluate_all(x);
        Ok(Self {
            p,
            lam_1,
            max_iter,
            ratio,
            initial: asymmetric_weights(y, &trend, p),
        })
    }
}

impl WeightPolicy for Iasls {
    fn name(&self) -> &'static str {
        "iasls"
    }

    fn max_iter(&self) -> usize {
        self.max_iter
    }

    fn initial_weights(&self, _y: &[f64]) -> Vec<f64> {
        self.initial.clone()
    }

    fn system(&self, penalties: &Penalties, weights: &[f64], y: &[f64]) -> (BandMatrix, Vec<f64>) {
        let w2: Vec<f64> = weights.iter().map(|w| w * w).collect();
        let mut a = penalties.curvature.plus_scaled(&penalties.slope, self.lam_1);
        a.add_diagonal(&w2);

        let slope_y = penalties.slope.mul_vec(y);
        let b = w2
            .iter()
            .zip(y)
            .zip(&slope_y)
            .map(|((w2, y), sy)| w2 * y + self.lam_1 * sy)
            .collect();
        (a, b)
    }

    fn update(&self, y: &[f64], z: &[f64], weights: &[f64], _iteration: usize) -> WeightUpdate {
        let new = asymmetric_weights(y, z, self.p);
        let criterion = relative_change(weights, &new);
        WeightUpdate {
            weights: new,
            converged: criterion < self.ratio,
            criterion,
        }
    }
}

/// Adaptive iteratively reweighted penalized least squares (Zhang et al. 2010).
#[derive(Debug, Clone)]
pub struct AirPls {
    pub max_iter: usize,
    pub ratio: f64,
}

impl WeightPolicy for AirPls {
    fn name(&self) -> &'static str {
        "airpls"
    }

    fn max_iter(&self) -> usize {
        self.max_iter
    }

    fn update(&self, y: &[f64], z: &[f64], weights: &[f64], iteration: usize) -> WeightUpdate {
        let d = residuals(y, z);
        let dssn: f64 = d.iter().filter(|&&v| v < 0.0).map(|v| v.abs()).sum();
        let scale: f64 = y.iter().map(|v| v.abs()).sum();

        if dssn < self.ratio * scale || dssn == 0.0 {
            return WeightUpdate {
                weights: weights.to_vec(),
                converged: true,
                criterion: dssn,
            };
        }

        let t = iteration as f64;
        let mut new: Vec<f64> = d
            .iter()
            .map(|&v| if v >= 0.0 { 0.0 } else { (t * v / dssn).exp() })
            .collect();

        // the negative residual closest to zero keeps both ends anchored
        let closest = d
            .iter()
            .copied()
            .filter(|&v| v < 0.0)
            .fold(f64::NEG_INFINITY, f64::max);
        let end_weight = (t * closest / dssn).exp();
        let last = new.len() - 1;
        new[0] = end_weight;
        new[last] = end_weight;

        WeightUpdate {
            weights: new,
            converged: false,
            criterion: dssn,
        }
    }
}

/// Asymmetrically reweighted penalized least squares (Baek et al. 2015).
#[derive(Debug, Clone)]
pub struct ArPls {
    pub max_iter: usize,
    pub ratio: f64,
}

impl WeightPolicy for ArPls {
    fn name(&self) -> &'static str {
        "arpls"
    }

    fn max_iter(&self) -> usize {
        self.max_iter
    }

    fn update(&self, y: &[f64], z: &[f64], weights: &[f64], _iteration: usize) -> WeightUpdate {
        let d = residuals(y, z);
        let Some((mean, std)) = negative_stats(&d).filter(|&(_, std)| std > 0.0) else {
            return WeightUpdate {
                weights: weights.to_vec(),
                converged: true,
                criterion: 0.0,
            };
        };

        let new: Vec<f64> = d
            .iter()
            .map(|&v| {
                let exponent = (2.0 * (v - (2.0 * std - mean)) / std).min(MAX_EXPONENT);
                1.0 / (1.0 + exponent.exp())
            })
            .collect();
        let criterion = relative_change(weights, &new);
        WeightUpdate {
            weights: new,
            converged: criterion < self.ratio,
            criterion,
        }
    }
}

/// Doubly reweighted penalized least squares (Xu et al. 2019). The
/// `(I − ηW)` factor makes the system non-symmetric.
#[derive(Debug, Clone)]
pub struct DrPls {
    pub eta: f64,
    pub max_iter: usize,
    pub ratio: f64,
}

impl WeightPolicy for DrPls {
    fn name(&self) -> &'static str {
        "drpls"
    }

    fn max_iter(&self) -> usize {
        self.max_iter
    }

    fn system(&self, penalties: &Penalties, weights: &[f64], y: &[f64]) -> (BandMatrix, Vec<f64>) {
        let factors: Vec<f64> = weights.iter().map(|w| 1.0 - self.eta * w).collect();
        let mut curvature = penalties.curvature.clone();
        curvature.scale_rows(&factors);
        let mut a = curvature.plus_scaled(&penalties.slope, 1.0);
        a.add_diagonal(weights);
        let b = weights.iter().zip(y).map(|(w, y)| w * y).collect();
        (a, b)
    }

    fn update(&self, y: &[f64], z: &[f64], weights: &[f64], iteration: usize) -> WeightUpdate {
        let d = residuals(y, z);
        let Some((mean, std)) = negative_stats(&d).filter(|&(_, std)| std > 0.0) else {
            return WeightUpdate {
                weights: weights.to_vec(),
                converged: true,
                criterion: 0.0,
            };
        };

        let growth = (iteration as f64).min(MAX_EXPONENT).exp();
        let new: Vec<f64> = d
            .iter()
            .map(|&v| {
                let inner = growth * (v - (2.0 * std - mean)) / std;
                let logistic = if inner.is_finite() {
                    inner / (1.0 + inner.abs())
                } else {
                    inner.signum()
                };
                0.5 * (1.0 - logistic)
            })
            .collect();
        let criterion = relative_change(weights, &new);
        WeightUpdate {
            weights: new,
            converged: criterion < self.ratio,
            criterion,
        }
    }
}

/// Derivative peak-screening asymmetric least squares (Korepanov 2020).
#[derive(Debug, Clone)]
pub struct DerpsAls {
    p: f64,
    k: f64,
    max_iter: usize,
    ratio: f64,
    screening: Vec<f64>,
}

impl DerpsAls {
    /// `k <= 0` selects `std(y) / 10`; `smooth_half_window == 0` selects
    /// `max(1, n / 200)`.
    pub fn new(
        x: &[f64],
        y: &[f64],
        p: f64,
        k: f64,
        smooth_half_window: usize,
        max_iter: usize,
        ratio: f64,
    ) -> Result<Self> {
        require_ascending(x, "derpsals")?;
        let n = y.len();
        let half_window = if smooth_half_window == 0 {
            (n / 200).max(1)
        } else {
            smooth_half_window
        };
        let k = if k > 0.0 {
            k
        } else {
            let mean = y.iter().sum::<f64>() / n as f64;
            let std = (y.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64).sqrt();
            (std / 10.0).max(f64::MIN_POSITIVE)
        };

        let smoothed = gaussian_smooth(y, half_window);
        let first = gradient(&smoothed, x);
        let second = gradient(&first, x);
        let screening = screen(&first)
            .iter()
            .zip(screen(&second))
            .map(|(a, b)| a * b)
            .collect();

        Ok(Self {
            p,
            k,
            max_iter,
            ratio,
            screening,
        })
    }

    pub fn screening(&self) -> &[f64] {
        &self.screening
    }
}

impl WeightPolicy for DerpsAls {
    fn name(&self) -> &'static str {
        "derpsals"
    }

    fn max_iter(&self) -> usize {
        self.max_iter
    }

    fn update(&self, y: &[f64], z: &[f64], weights: &[f64], _iteration: usize) -> WeightUpdate {
        let new: Vec<f64> = y
            .iter()
            .zip(z)
            .zip(&self.screening)
            .map(|((y, z), s)| {
                let r = y - z;
                let w = if r > 0.0 {
                    self.p * (-0.5 * (r / self.k).powi(2)).exp()
                } else {
                    1.0 - self.p
                };
                s * w
            })
            .collect();
        let criterion = relative_change(weights, &new);
        WeightUpdate {
            weights: new,
            converged: criterion < self.ratio,
            criterion,
        }
    }
}

/// `exp(−½(v / rms v)²)`; all ones for a flat input.
fn screen(v: &[f64]) -> Vec<f64> {
    let rms = (v.iter().map(|x| x * x).sum::<f64>() / v.len() as f64).sqrt();
    if rms == 0.0 {
        return vec![1.0; v.len()];
    }
    v.iter().map(|x| (-0.5 * (x / rms).powi(2)).exp()).collect()
}

/// Gaussian kernel smoothing with edge samples repeated past the ends.
fn gaussian_smooth(y: &[f64], half_window: usize) -> Vec<f64> {
    let sigma = (half_window as f64 / 2.0).max(0.5);
    let kernel: Vec<f64> = (0..=2 * half_window)
        .map(|k| {
            let offset = k as f64 - half_window as f64;
            (-0.5 * (offset / sigma).powi(2)).exp()
        })
        .collect();
    let total: f64 = kernel.iter().sum();
    let n = y.len() as isize;

    (0..n)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, w)| {
                    let j = (i + k as isize - half_window as isize).clamp(0, n - 1);
                    w * y[j as usize]
                })
                .sum::<f64>()
                / total
        })
        .collect()
}

/// Central differences in the interior, one-sided at the ends.
fn gradient(y: &[f64], x: &[f64]) -> Vec<f64> {
    let n = y.len();
    (0..n)
        .map(|i| {
            let (lo, hi) = match i {
                0 => (0, 1),
                _ if i == n - 1 => (n - 2, n - 1),
                _ => (i - 1, i + 1),
            };
            (y[hi] - y[lo]) / (x[hi] - x[lo])
        })
        .collect()
}
