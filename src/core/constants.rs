//! Physical constants and system parameters

/// Speed of sound in air at roughly 20°C (m/s)
pub const SPEED_OF_SOUND_AIR: f64 = 343.0;

/// Meters per degree of latitude used by the equirectangular projection
pub const METERS_PER_DEG_LAT: f64 = 110_540.0;

/// Meters per degree of longitude at the equator (scaled by cos(latitude))
pub const METERS_PER_DEG_LON: f64 = 111_320.0;

/// Maximum Newton-Raphson iterations for the multilateration solver
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Absolute residual tolerance, in layout units
pub const DEFAULT_RESIDUAL_TOLERANCE: f64 = 0.001;

/// Residual scale used for the gradient fallback step near singularities
pub const DEFAULT_FALLBACK_STEP: f64 = 0.1;

/// Minimum number of sensors a TDOA fix in the plane can be computed from
pub const MIN_SENSORS: usize = 3;
