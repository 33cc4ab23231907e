use crate::baseline::BaselineCorrection;
use crate::fitter::FitResult;
use thiserror::Error;

/// Broad classification of a [`RamanError`], used by callers to decide
/// whether to fix the input, adjust parameters and retry, or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Numerical,
    Domain,
    Io,
}

#[derive(Debug, Error)]
pub enum RamanError {
    #[error("unknown baseline method `{0}`")]
    UnknownMethod(String),

    #[error("unknown peak shape `{0}`")]
    UnknownShape(String),

    #[error("baseline method `{method}` has no parameter `{key}`")]
    UnknownParameter { method: String, key: String },

    #[error("parameter `{name}` = {value} is outside the allowed range [{min}, {max}]")]
    ParameterOutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("malformed bounds [{lower}, {upper}] for `{name}`")]
    MalformedBounds { name: String, lower: f64, upper: f64 },

    #[error("peak shape `{shape}` has no parameter `{name}`")]
    UnknownShapeParameter { shape: String, name: String },

    #[error("{kind} expects {expected} parameters, got {got}")]
    ParameterCount {
        kind: String,
        expected: usize,
        got: usize,
    },

    #[error("baseline method `{0}` does not take regions of interest")]
    RegionsNotSupported(String),

    #[error("baseline method `{0}` is not iteratively reweighted")]
    NotIterative(String),

    #[error("`{method}` hit an ill-conditioned system at iteration {iteration}: {detail}")]
    IllConditioned {
        method: String,
        iteration: usize,
        detail: String,
    },

    #[error(
        "`{method}` did not converge after {iterations} iterations (residual norm {residual_norm:e})"
    )]
    NotConverged {
        method: String,
        iterations: usize,
        residual_norm: f64,
        last: Box<BaselineCorrection>,
    },

    #[error(
        "fit did not converge after {iterations} iterations (residual norm {residual_norm:e}): {message}"
    )]
    FitNotConverged {
        message: String,
        iterations: usize,
        residual_norm: f64,
        last: Box<FitResult>,
    },

    #[error("least-squares solver failed after {evaluations} evaluations: {message}")]
    SolverFailed { message: String, evaluations: usize },

    #[error("degenerate fit region: {points} data points for {free_parameters} free parameters")]
    DegenerateFitRegion {
        points: usize,
        free_parameters: usize,
    },

    #[error("initial guess for `{name}` = {value} violates bounds [{lower}, {upper}]")]
    InitialGuessOutOfBounds {
        name: String,
        value: f64,
        lower: f64,
        upper: f64,
    },

    #[error("peak index {index} out of range for a model with {len} peaks")]
    PeakIndexOutOfRange { index: usize, len: usize },

    #[error("spectrum needs at least {min} points, got {len}")]
    TooShort { len: usize, min: usize },

    #[error("x has {x} points but {name} has {other}")]
    LengthMismatch {
        name: &'static str,
        x: usize,
        other: usize,
    },

    #[error("{0} contains non-finite values")]
    NonFinite(&'static str),

    #[error("`{0}` requires x sorted in strictly ascending order")]
    NotAscending(String),

    #[error("invalid spectrum: {0}")]
    InvalidSpectrum(String),

    #[error("file I/O error: {0}")]
    File(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl RamanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownMethod(_)
            | Self::UnknownShape(_)
            | Self::UnknownParameter { .. }
            | Self::UnknownShapeParameter { .. }
            | Self::ParameterOutOfRange { .. }
            | Self::MalformedBounds { .. }
            | Self::ParameterCount { .. }
            | Self::RegionsNotSupported(_)
            | Self::NotIterative(_)
            | Self::InitialGuessOutOfBounds { .. } => ErrorKind::Configuration,
            Self::IllConditioned { .. }
            | Self::NotConverged { .. }
            | Self::FitNotConverged { .. }
            | Self::SolverFailed { .. }
            | Self::DegenerateFitRegion { .. } => ErrorKind::Numerical,
            Self::PeakIndexOutOfRange { .. }
            | Self::TooShort { .. }
            | Self::LengthMismatch { .. }
            | Self::NonFinite(_)
            | Self::NotAscending(_)
            | Self::InvalidSpectrum(_) => ErrorKind::Domain,
            Self::File(_) | Self::Json(_) | Self::Yaml(_) => ErrorKind::Io,
        }
    }

    /// The last baseline iterate of a correction that ran out of iterations.
    pub fn last_iterate(&self) -> Option<&BaselineCorrection> {
        match self {
            Self::NotConverged { last, .. } => Some(last),
            _ => None,
        }
    }

    /// The last solver iterate of a fit that stopped before converging.
    pub fn last_fit(&self) -> Option<&FitResult> {
        match self {
            Self::FitNotConverged { last, .. } => Some(last),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RamanError>;
