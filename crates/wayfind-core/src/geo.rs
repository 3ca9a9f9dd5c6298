//! Great-circle helpers used to annotate results with a distance.

use crate::address::{BBox, LatLon};

/// Mean Earth radius. A sphere is accurate enough for ranking hints.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Approximate length of one degree of latitude.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Haversine distance between two points.
#[must_use]
pub fn distance_meters(a: LatLon, b: LatLon) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// Render a distance for display: whole meters below 1 km, kilometers
/// above (one decimal below 10 km). Non-finite input renders as `""`.
#[must_use]
pub fn format_distance_meters(meters: f64) -> String {
    if !meters.is_finite() {
        return String::new();
    }
    if meters < 1000.0 {
        return format!("{:.0} m", meters.round());
    }
    let km = meters / 1000.0;
    if km < 10.0 {
        format!("{km:.1} km")
    } else {
        format!("{km:.0} km")
    }
}

/// Bounding box of a circle, using a flat-Earth approximation.
#[must_use]
pub fn bbox_around(center: LatLon, radius_meters: f64) -> BBox {
    let dlat = radius_meters / METERS_PER_DEGREE;
    let dlon = radius_meters / (METERS_PER_DEGREE * center.lat.to_radians().cos());
    BBox {
        west: center.lon - dlon,
        south: center.lat - dlat,
        east: center.lon + dlon,
        north: center.lat + dlat,
    }
}
