//! Equirectangular projection between the local sensor frame and lat/lng
//!
//! Treats small displacements in latitude and longitude as linear distances.
//! Longitude degrees are scaled by the cosine of the reference latitude, so the
//! approximation holds for displacements of a few kilometers around the
//! reference point and degrades beyond that. No ellipsoidal correction is made.

use crate::core::{
    GeoCoordinate, LocalPoint, LocalSensorLayout, SensorId, SensorSurvey, METERS_PER_DEG_LAT,
    METERS_PER_DEG_LON,
};
use crate::validation::error::{Axis, LocalizationError, LocalizationOutcome};
use crate::validation::readings::validate_sensor_set;
use serde::{Deserialize, Serialize};

/// Smallest layout displacement accepted as an axis calibration baseline
pub const MIN_CALIBRATION_DISPLACEMENT: f64 = 1e-9;

/// Convert the displacement from a reference point to planar meters (east, north)
pub fn to_local_meters(ref_lat: f64, ref_lng: f64, lat: f64, lng: f64) -> (f64, f64) {
    let meters_per_deg_lon = METERS_PER_DEG_LON * ref_lat.to_radians().cos();

    let x = (lng - ref_lng) * meters_per_deg_lon;
    let y = (lat - ref_lat) * METERS_PER_DEG_LAT;
    (x, y)
}

/// Inverse of [`to_local_meters`] under the same linear approximation
pub fn to_geo(ref_lat: f64, ref_lng: f64, x: f64, y: f64) -> (f64, f64) {
    let meters_per_deg_lon = METERS_PER_DEG_LON * ref_lat.to_radians().cos();

    let lat = ref_lat + y / METERS_PER_DEG_LAT;
    let lng = ref_lng + x / meters_per_deg_lon;
    (lat, lng)
}

/// Check a coordinate is usable as a projection reference
pub fn validate_coordinate(coordinate: &GeoCoordinate) -> Result<(), &'static str> {
    if !coordinate.latitude.is_finite() || !coordinate.longitude.is_finite() {
        return Err("Coordinate is not finite");
    }
    // cos(lat) vanishes at the poles and the longitude scale blows up
    if coordinate.latitude.abs() >= 89.0 {
        return Err("Latitude too close to a pole for equirectangular projection");
    }
    if !(-180.0..=180.0).contains(&coordinate.longitude) {
        return Err("Longitude out of range [-180, 180]");
    }
    Ok(())
}

/// Per-axis ratio between real meters and local layout units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactors {
    pub x: f64,
    pub y: f64,
}

impl ScaleFactors {
    /// Scale a layout position into real meters relative to the reference sensor
    pub fn to_meters(&self, local: &LocalPoint, origin: &LocalPoint) -> (f64, f64) {
        ((local.x - origin.x) * self.x, (local.y - origin.y) * self.y)
    }
}

/// Derive axis scale factors from the survey and the local layout
///
/// Each axis is calibrated by the non-reference sensor lying furthest from the
/// reference along that axis in the layout. For the reference deployment this is
/// mic2 for x and mic3 for y.
pub fn derive_scale_factors(
    survey: &SensorSurvey,
    layout: &LocalSensorLayout,
    reference: SensorId,
) -> LocalizationOutcome<ScaleFactors> {
    validate_sensor_set(&survey.ids(), &layout.ids())?;
    let (ref_geo, ref_local) = match (survey.get(reference), layout.get(reference)) {
        (Some(geo), Some(local)) => (*geo, *local),
        _ => {
            return Err(LocalizationError::MissingSensor {
                missing: vec![reference],
                unexpected: vec![],
                duplicated: vec![],
            })
        }
    };

    let x = calibrate_axis(survey, layout, reference, &ref_geo, &ref_local, Axis::X)?;
    let y = calibrate_axis(survey, layout, reference, &ref_geo, &ref_local, Axis::Y)?;
    Ok(ScaleFactors { x, y })
}

fn calibrate_axis(
    survey: &SensorSurvey,
    layout: &LocalSensorLayout,
    reference: SensorId,
    ref_geo: &GeoCoordinate,
    ref_local: &LocalPoint,
    axis: Axis,
) -> LocalizationOutcome<f64> {
    let component = |dx: f64, dy: f64| match axis {
        Axis::X => dx,
        Axis::Y => dy,
    };

    let calibration = layout
        .0
        .iter()
        .filter(|(id, _)| **id != reference)
        .map(|(id, p)| (*id, component(p.x - ref_local.x, p.y - ref_local.y)))
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()));

    let (id, local_displacement) = match calibration {
        Some(c) => c,
        None => {
            return Err(LocalizationError::DegenerateGeometry {
                axis,
                displacement: 0.0,
            })
        }
    };
    if local_displacement.is_nan() || local_displacement.abs() <= MIN_CALIBRATION_DISPLACEMENT {
        return Err(LocalizationError::DegenerateGeometry {
            axis,
            displacement: local_displacement,
        });
    }

    // Present in the survey: key sets were checked equal above
    let geo = survey.get(id).copied().unwrap_or(*ref_geo);
    let (real_x, real_y) = to_local_meters(ref_geo.latitude, ref_geo.longitude, geo.latitude, geo.longitude);
    let real_displacement = component(real_x, real_y);

    let scale = real_displacement / local_displacement;
    if !scale.is_finite() || scale.abs() < MIN_CALIBRATION_DISPLACEMENT {
        return Err(LocalizationError::DegenerateGeometry {
            axis,
            displacement: real_displacement,
        });
    }
    Ok(scale)
}
