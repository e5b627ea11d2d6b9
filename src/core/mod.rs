//! Core types and constants for the acoustic localization system

pub mod types;
pub mod constants;

pub use types::*;
pub use constants::*;
