//! Integrated peak areas with propagated uncertainties, and the intensity
//! ratios used to estimate graphitic crystallite sizes.

use super::common::Value;
use super::composite::CompositeSpectrumModel;
use super::main_fitter::FitResult;
use super::models::PeakShapeKind;
use super::report::{FitReport, PeakReport};
use crate::error::{RamanError, Result};

pub type Area = Value;

/// Ferrari-Robertson `C'` for 514 nm excitation, in nm⁻².
pub const FERRARI_ROBERTSON_C_514: f64 = 0.0055;

/// Area of one peak over `window` with `ΔA = Σ |∂A/∂p_k| σ_k`.
/// Cross-covariances are neglected. The area error is unknown when any
/// parameter error is.
pub fn peak_area(kind: PeakShapeKind, params: &[Value], window: (f64, f64)) -> Result<Area> {
    if params.len() != kind.parameter_count() {
        return Err(RamanError::ParameterCount {
            kind: kind.name().to_owned(),
            expected: kind.parameter_count(),
            got: params.len(),
        });
    }
    let values: Vec<f64> = params.iter().map(|p| p.value).collect();
    let (area, gradient) = kind.area(&values, window);
    let uncertainty = gradient
        .iter()
        .zip(params)
        .map(|(g, p)| p.uncertainty.map(|sigma| (g * sigma).abs()))
        .sum::<Option<f64>>();
    Ok(Area {
        value: area,
        uncertainty,
    })
}

/// Per-peak parameters and areas of a converged fit.
pub fn analyze(
    model: &CompositeSpectrumModel,
    fit: &FitResult,
    window: (f64, f64),
) -> Result<FitReport> {
    if !fit.success {
        return Err(RamanError::FitNotConverged {
            message: fit.message.clone(),
            iterations: fit.iterations,
            residual_norm: fit.ss_res.sqrt(),
            last: Box::new(fit.clone()),
        });
    }
    let values = fit.values();
    if values.len() != model.n_params() {
        return Err(RamanError::ParameterCount {
            kind: "fit result".to_owned(),
            expected: model.n_params(),
            got: values.len(),
        });
    }

    let mut offset = 1;
    let mut peaks = Vec::with_capacity(model.len());
    for (index, peak) in model.peaks().iter().enumerate() {
        let n = peak.kind.parameter_count();
        let params = &values[offset..offset + n];
        let area = peak_area(peak.kind, params, window)?;
        log::debug!("peak {index} ({}): area {area}", peak.kind);
        peaks.push(PeakReport {
            index,
            kind: peak.kind,
            parameters: peak
                .kind
                .parameters()
                .iter()
                .zip(params)
                .map(|(spec, &v)| (spec.name.to_owned(), v))
                .collect(),
            area,
        });
        offset += n;
    }

    Ok(FitReport {
        background: values[0],
        peaks,
        window,
        r_squared: fit.r_squared,
        ss_res: fit.ss_res,
        success: fit.success,
    })
}

/// `a / b` with first-order error propagation.
pub fn ratio(a: Value, b: Value) -> Value {
    let r = a.value / b.value;
    let uncertainty = a.uncertainty.zip(b.uncertainty).map(|(da, db)| {
        let relative = ((da / a.value).powi(2) + (db / b.value).powi(2)).sqrt();
        (r * relative).abs()
    });
    Value {
        value: r,
        uncertainty,
    }
}

/// Crystallite size `L_a` in nm from `I_D/I_G` (Cançado et al. 2006):
/// `L_a = 2.4e-10 · λ⁴ / (I_D/I_G)` with `λ` in nm.
pub fn tuinstra_koenig_size(id_ig: Value, laser_nm: f64) -> Value {
    let size = 2.4e-10 * laser_nm.powi(4) / id_ig.value;
    Value {
        value: size,
        uncertainty: id_ig.uncertainty.map(|e| (size * e / id_ig.value).abs()),
    }
}

/// Crystallite size `L_a` in nm for small, disordered domains (Ferrari and
/// Robertson 2000): `I_D/I_G = C' · L_a²`.
pub fn ferrari_robertson_size(id_ig: Value, c_prime: f64) -> Value {
    let size = (id_ig.value / c_prime).sqrt();
    Value {
        value: size,
        uncertainty: id_ig.uncertainty.map(|e| (0.5 * size * e / id_ig.value).abs()),
    }
}
