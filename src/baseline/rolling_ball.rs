use super::BaselineCorrection;
use crate::error::Result;
use crate::spectrum::require_ascending;

fn window(i: usize, half_window: usize, n: usize) -> std::ops::RangeInclusive<usize> {
    i.saturating_sub(half_window)..=(i + half_window).min(n - 1)
}

fn min_filter(y: &[f64], half_window: usize) -> Vec<f64> {
    (0..y.len())
        .map(|i| window(i, half_window, y.len()).map(|j| y[j]).fold(f64::INFINITY, f64::min))
        .collect()
}

fn max_filter(y: &[f64], half_window: usize) -> Vec<f64> {
    (0..y.len())
        .map(|i| {
            window(i, half_window, y.len())
                .map(|j| y[j])
                .fold(f64::NEG_INFINITY, f64::max)
        })
        .collect()
}

/// Centred moving average; the window shrinks at the edges.
pub fn moving_average(y: &[f64], half_window: usize) -> Vec<f64> {
    (0..y.len())
        .map(|i| {
            let range = window(i, half_window, y.len());
            let count = range.clone().count() as f64;
            range.map(|j| y[j]).sum::<f64>() / count
        })
        .collect()
}

/// Morphological opening (erosion then dilation) of the spectrum, then an
/// optional moving-average pass when `smooth_half_window > 0`.
pub fn rolling_ball(
    x: &[f64],
    y: &[f64],
    half_window: usize,
    smooth_half_window: usize,
) -> Result<BaselineCorrection> {
    require_ascending(x, "rolling_ball")?;
    log::info!(
        "Rolling ball baseline with half window {half_window} (smoothing {smooth_half_window})"
    );

    let opened = max_filter(&min_filter(y, half_window), half_window);
    let baseline = if smooth_half_window > 0 {
        moving_average(&opened, smooth_half_window)
    } else {
        opened
    };
    Ok(BaselineCorrection::new(y, baseline, 1))
}
