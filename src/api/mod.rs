//! Localization entry points
//!
//! The [`Localizer`] orchestrates validation, delay estimation, multilateration
//! and projection; [`formatting`] renders its results.

pub mod localizer;
pub mod formatting;

pub use localizer::Localizer;
pub use formatting::{CsvFormatter, JsonFormatter, TextFormatter};
