//! Core data models for waypoint missions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Check whether the coordinate can be sent to the vehicle.
    /// The vehicle treats a zero latitude or longitude as "unset".
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && self.lat != 0.0
            && self.lon != 0.0
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.7}, {:.7})", self.lat, self.lon)
    }
}

/// How the aircraft points its nose between waypoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadingMode {
    /// Nose follows the direction of travel
    #[default]
    Auto,
    /// Heading is fixed to the waypoint's heading
    Fixed,
    /// Pilot controls the heading
    Manual,
    /// Nose points at the point of interest
    TowardPointOfInterest,
}

/// A single point of the flight route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub coordinate: GeoPoint,
    pub altitude_m: f64,
    #[serde(default)]
    pub heading_deg: f64,
    #[serde(default)]
    pub heading_mode: HeadingMode,
    /// Speed used for the leg leaving this waypoint when `use_waypoint_speed` is set
    #[serde(default)]
    pub auto_flight_speed_mps: Option<f64>,
    /// Override the mission auto speed with `auto_flight_speed_mps`
    #[serde(default)]
    pub use_waypoint_speed: bool,
}

impl Waypoint {
    /// Create a waypoint with only the required fields.
    pub fn new(lat: f64, lon: f64, altitude_m: f64) -> Self {
        Self {
            coordinate: GeoPoint::new(lat, lon),
            altitude_m,
            heading_deg: 0.0,
            heading_mode: HeadingMode::Auto,
            auto_flight_speed_mps: None,
            use_waypoint_speed: false,
        }
    }

    /// Fix the heading at this waypoint.
    pub fn with_fixed_heading(mut self, heading_deg: f64) -> Self {
        self.heading_deg = heading_deg;
        self.heading_mode = HeadingMode::Fixed;
        self
    }

    /// Fly the next leg at `speed_mps` instead of the mission speed.
    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.auto_flight_speed_mps = Some(speed_mps);
        self.use_waypoint_speed = true;
        self
    }
}

/// Sequential identifier of an action within a mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub u32);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ========== TRIGGERS ==========

/// When an associated action fires relative to the action it follows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociatedTiming {
    #[default]
    AfterFinished,
    Simultaneously,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalType {
    /// Interval measured in seconds
    #[default]
    Time,
    /// Interval measured in meters travelled
    Distance,
}

/// Condition that fires an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionTrigger {
    /// Fires when the aircraft reaches a waypoint
    ReachPoint {
        start_index: usize,
        waypoint_count_to_terminate: usize,
    },
    /// Fires after another action (or mission start when `associated_action` is None)
    Associated {
        associated_action: Option<ActionId>,
        timing: AssociatedTiming,
        wait_secs: u32,
    },
    /// Fires repeatedly starting at a waypoint
    Interval {
        interval_type: IntervalType,
        interval: f64,
        start_index: usize,
    },
}

impl ActionTrigger {
    /// Waypoint indexes this trigger refers to.
    pub fn waypoint_indexes(&self) -> Vec<usize> {
        match self {
            ActionTrigger::ReachPoint {
                start_index,
                waypoint_count_to_terminate,
            } => vec![*start_index, *waypoint_count_to_terminate],
            ActionTrigger::Interval { start_index, .. } => vec![*start_index],
            ActionTrigger::Associated { .. } => Vec::new(),
        }
    }
}

// ========== ACTUATORS ==========

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum CameraOperation {
    TakePhoto,
    StartRecordVideo,
    StopRecordVideo,
    Zoom { focal_length: u32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationMode {
    #[default]
    AbsoluteAngle,
    RelativeAngle,
}

/// Target attitude for the gimbal. Axes left as None are not moved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GimbalRotation {
    pub pitch_deg: Option<f64>,
    pub roll_deg: f64,
    pub yaw_deg: Option<f64>,
    pub duration_secs: f64,
    pub mode: RotationMode,
    pub ignore_other_axes: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationDirection {
    #[default]
    Clockwise,
    CounterClockwise,
}

/// Aircraft yaw rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YawRotation {
    pub heading_deg: f64,
    pub relative: bool,
    pub direction: RotationDirection,
}

/// Effect an action performs once triggered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionActuator {
    /// Start or stop flying along the route
    Motion { start_flying: bool },
    Camera(CameraOperation),
    Gimbal(GimbalRotation),
    Yaw(YawRotation),
}

/// A trigger/actuator pair attached to a mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub trigger: ActionTrigger,
    pub actuator: ActionActuator,
}

// ========== MISSION ==========

/// What the aircraft does after the last waypoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishedAction {
    #[default]
    NoAction,
    GoHome,
    AutoLand,
    GoToFirstWaypoint,
}

/// How the aircraft flies to the first waypoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GotoFirstWaypointMode {
    /// Climb to the waypoint altitude before flying horizontally
    #[default]
    Safely,
    PointToPoint,
}

/// Global flight parameters of a mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionParameters {
    pub auto_flight_speed_mps: f64,
    pub max_flight_speed_mps: f64,
    pub repeat_times: u32,
    #[serde(default)]
    pub finished_action: FinishedAction,
    #[serde(default)]
    pub goto_first_waypoint: GotoFirstWaypointMode,
    /// Exit the mission when the remote controller signal is lost
    #[serde(default)]
    pub exit_on_signal_lost: bool,
}

impl Default for MissionParameters {
    fn default() -> Self {
        Self {
            auto_flight_speed_mps: 5.0,
            max_flight_speed_mps: 5.0,
            repeat_times: 1,
            finished_action: FinishedAction::NoAction,
            goto_first_waypoint: GotoFirstWaypointMode::Safely,
            exit_on_signal_lost: false,
        }
    }
}

/// A mission ready to be loaded onto a vehicle.
///
/// Build missions with [`crate::MissionAssembler`]; deserialized documents
/// should go through [`crate::MissionAssembler::from_mission`] before upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub mission_id: u32,
    pub waypoints: Vec<Waypoint>,
    pub actions: Vec<Action>,
    pub parameters: MissionParameters,
}

impl Mission {
    pub fn waypoint_count(&self) -> usize {
        self.waypoints.len()
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }
}
