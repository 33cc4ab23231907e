use geo::{ConvexHull, MultiPoint};

use super::BaselineCorrection;
use crate::error::Result;
use crate::spectrum::require_ascending;

/// Vertices of the lower convex hull of `(x, y)`, ordered by `x`.
pub fn lower_hull(x: &[f64], y: &[f64]) -> Vec<(f64, f64)> {
    let points: Vec<(f64, f64)> = x.iter().copied().zip(y.iter().copied()).collect();
    let hull = MultiPoint::from(points).convex_hull();

    let mut vertices: Vec<(f64, f64)> = hull.exterior().coords().map(|c| (c.x, c.y)).collect();
    // the end samples always anchor the baseline, even for degenerate hulls
    if let (Some(&first), Some(&last)) = (x.first(), x.last()) {
        vertices.push((first, y[0]));
        vertices.push((last, y[y.len() - 1]));
    }
    vertices.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    vertices.dedup_by(|a, b| a.0 == b.0);

    // monotone chain over the hull vertices keeps the lower part only
    let mut lower: Vec<(f64, f64)> = Vec::with_capacity(vertices.len());
    for p in vertices {
        while lower.len() >= 2 {
            let a = lower[lower.len() - 2];
            let b = lower[lower.len() - 1];
            let cross = (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0);
            if cross <= 0.0 {
                lower.pop();
            } else {
                break;
            }
        }
        lower.push(p);
    }
    lower
}

/// Piecewise-linear interpolation through `nodes` (sorted by `x`).
pub fn interpolate(nodes: &[(f64, f64)], x: &[f64]) -> Vec<f64> {
    x.iter()
        .map(|&xi| {
            let k = nodes.partition_point(|node| node.0 < xi);
            match k {
                0 => nodes[0].1,
                _ if k >= nodes.len() => nodes[nodes.len() - 1].1,
                _ => {
                    let (x0, y0) = nodes[k - 1];
                    let (x1, y1) = nodes[k];
                    y0 + (y1 - y0) * (xi - x0) / (x1 - x0)
                }
            }
        })
        .collect()
}

pub fn rubberband(x: &[f64], y: &[f64]) -> Result<BaselineCorrection> {
    require_ascending(x, "rubberband")?;
    let hull = lower_hull(x, y);
    log::info!("Rubberband baseline through {} hull vertices", hull.len());
    Ok(BaselineCorrection::new(y, interpolate(&hull, x), 1))
}
