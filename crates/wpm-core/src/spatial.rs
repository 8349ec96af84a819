//! Geodesy helpers for geofence checks and route summaries.

use crate::models::{GeoPoint, Waypoint};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points in meters.
///
/// # Arguments
/// * `lat1`, `lon1` - First point coordinates in decimal degrees
/// * `lat2`, `lon2` - Second point coordinates in decimal degrees
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Distance between two coordinates in meters.
pub fn distance_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    haversine_distance(a.lat, a.lon, b.lat, b.lon)
}

/// Offset a position by meters in the north and east directions.
pub fn offset_position(origin: &GeoPoint, north_m: f64, east_m: f64) -> GeoPoint {
    let distance_m = (north_m * north_m + east_m * east_m).sqrt();
    if distance_m <= f64::EPSILON {
        return *origin;
    }
    let bearing_rad = east_m.atan2(north_m);
    offset_by_bearing(origin, distance_m, bearing_rad)
}

/// Offset a position by distance and bearing (0 = north, π/2 = east).
pub fn offset_by_bearing(origin: &GeoPoint, distance_m: f64, bearing_rad: f64) -> GeoPoint {
    let lat1 = origin.lat.to_radians();
    let lon1 = origin.lon.to_radians();
    let angular_distance = distance_m / EARTH_RADIUS_M;

    let sin_lat2 =
        lat1.sin() * angular_distance.cos() + lat1.cos() * angular_distance.sin() * bearing_rad.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();
    let lon2 = lon1
        + (bearing_rad.sin() * angular_distance.sin() * lat1.cos())
            .atan2(angular_distance.cos() - lat1.sin() * sin_lat2);

    GeoPoint::new(lat2.to_degrees(), normalize_lon(lon2.to_degrees()))
}

fn normalize_lon(lon: f64) -> f64 {
    let mut lon = (lon + 180.0) % 360.0;
    if lon < 0.0 {
        lon += 360.0;
    }
    lon - 180.0
}

/// Length of the route through all waypoints, including altitude changes.
pub fn route_length_m(waypoints: &[Waypoint]) -> f64 {
    waypoints
        .windows(2)
        .map(|pair| {
            let horizontal = distance_m(&pair[0].coordinate, &pair[1].coordinate);
            let vertical = pair[1].altitude_m - pair[0].altitude_m;
            (horizontal * horizontal + vertical * vertical).sqrt()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        // ~111km between these points (1 degree latitude)
        let dist = haversine_distance(0.0, 0.0, 1.0, 0.0);
        assert!((dist - 111_194.0).abs() < 100.0);
    }

    #[test]
    fn test_haversine_same_point() {
        let dist = haversine_distance(33.6209929, 130.6265251, 33.6209929, 130.6265251);
        assert!(dist < 0.001);
    }

    #[test]
    fn offset_position_round_trips_distance() {
        let home = GeoPoint::new(33.6209929, 130.6265251);
        let moved = offset_position(&home, 300.0, 400.0);
        assert!((distance_m(&home, &moved) - 500.0).abs() < 0.5);
    }

    #[test]
    fn route_length_includes_climb() {
        let home = GeoPoint::new(33.0, 130.0);
        let north = offset_position(&home, 30.0, 0.0);
        let route = vec![
            Waypoint::new(home.lat, home.lon, 10.0),
            Waypoint::new(north.lat, north.lon, 50.0),
        ];
        assert!((route_length_m(&route) - 50.0).abs() < 0.1);
    }
}
