//! Core localization algorithms

pub mod geo_projection;
pub mod gcc_phat;
pub mod multilateration;

pub use geo_projection::{derive_scale_factors, to_geo, to_local_meters, ScaleFactors};
pub use gcc_phat::{estimate_delay, DelayEstimate, DelayEstimator};
pub use multilateration::{solve_position, MultilaterationSolver, SolverOutcome};
