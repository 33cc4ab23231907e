//! Multi-peak fitting: peak shapes, the composite model, the bounded
//! least-squares solver, and peak areas.

pub mod analytics;
pub mod common;
pub mod composite;
pub mod fit_settings;
pub mod main_fitter;
pub mod models;
pub mod peak_finder;
pub mod report;
pub mod solver;

pub use analytics::{Area, analyze, ferrari_robertson_size, peak_area, ratio, tuinstra_koenig_size};
pub use common::{Parameter, Value};
pub use composite::{CompositeSpectrumModel, PackedParameters, PeakInstance, UnpackedParameters};
pub use fit_settings::FitSettings;
pub use main_fitter::{FitResult, Fitter, fit};
pub use models::PeakShapeKind;
pub use peak_finder::{PeakFindingSettings, guess_model};
pub use report::{FitReport, PeakReport};
pub use solver::{LeastSquaresSolver, LevenbergMarquardt, SolverOutcome};
