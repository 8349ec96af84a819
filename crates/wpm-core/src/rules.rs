//! Operational limits enforced when assembling a mission.

use crate::models::GeoPoint;
use serde::{Deserialize, Serialize};

/// Highest auto/max flight speed a mission may request, in m/s.
pub const MAX_MISSION_SPEED_MPS: f64 = 15.0;

/// Geofence the mission must stay inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalLimits {
    /// Center of the radius check
    pub home: GeoPoint,
    /// Maximum horizontal distance from home in meters (None = unlimited)
    #[serde(default)]
    pub max_radius_m: Option<f64>,
    /// Maximum altitude above takeoff in meters
    pub max_height_m: f64,
}

impl OperationalLimits {
    /// Limits matching the default preflight settings.
    pub fn around(home: GeoPoint) -> Self {
        Self {
            home,
            max_radius_m: Some(1000.0),
            max_height_m: 200.0,
        }
    }
}
