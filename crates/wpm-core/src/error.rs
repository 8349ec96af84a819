//! Error types shared by mission planning and execution.

use crate::action::ActionKind;
use crate::lifecycle::LifecycleState;
use crate::models::{ActionId, GeoPoint};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result alias used across the mission crates.
pub type Result<T> = std::result::Result<T, MissionError>;

/// Upload stage that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStage {
    Load,
    Mission,
    Actions,
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadStage::Load => "load",
            UploadStage::Mission => "mission",
            UploadStage::Actions => "actions",
        };
        f.write_str(name)
    }
}

/// Individual preflight setting, in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreflightSetting {
    HomeLocation,
    GoHomeHeight,
    MaxRadiusEnabled,
    MaxRadius,
    MaxHeight,
    FocusMode,
    CameraMode,
    PhotoFormat { lens: u8 },
}

impl fmt::Display for PreflightSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreflightSetting::HomeLocation => f.write_str("home location"),
            PreflightSetting::GoHomeHeight => f.write_str("go-home height"),
            PreflightSetting::MaxRadiusEnabled => f.write_str("max radius enabled"),
            PreflightSetting::MaxRadius => f.write_str("max radius"),
            PreflightSetting::MaxHeight => f.write_str("max height"),
            PreflightSetting::FocusMode => f.write_str("focus mode"),
            PreflightSetting::CameraMode => f.write_str("camera mode"),
            PreflightSetting::PhotoFormat { lens } => write!(f, "photo format (lens {})", lens),
        }
    }
}

/// A single problem found while validating a mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    InvalidCoordinate { waypoint: usize, coordinate: GeoPoint },
    OutsideRadius { waypoint: usize, distance_m: f64, max_radius_m: f64 },
    AboveMaxHeight { waypoint: usize, altitude_m: f64, max_height_m: f64 },
    WaypointIndexOutOfRange { action: ActionId, index: usize, waypoint_count: usize },
    NonSequentialActionId { position: usize, found: ActionId },
    UnknownAssociatedAction { action: ActionId, associated: ActionId },
    InvalidSpeed { reason: String },
    InvalidRepeatCount { repeat_times: u32 },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::InvalidCoordinate { waypoint, coordinate } => {
                write!(f, "waypoint {} has invalid coordinate {}", waypoint, coordinate)
            }
            Violation::OutsideRadius { waypoint, distance_m, max_radius_m } => write!(
                f,
                "waypoint {} is {:.0}m from home (max {:.0}m)",
                waypoint, distance_m, max_radius_m
            ),
            Violation::AboveMaxHeight { waypoint, altitude_m, max_height_m } => write!(
                f,
                "waypoint {} altitude {:.1}m exceeds max height {:.1}m",
                waypoint, altitude_m, max_height_m
            ),
            Violation::WaypointIndexOutOfRange { action, index, waypoint_count } => write!(
                f,
                "action {} references waypoint {} but mission has {} waypoint(s)",
                action, index, waypoint_count
            ),
            Violation::NonSequentialActionId { position, found } => {
                write!(f, "action at position {} has id {}", position, found)
            }
            Violation::UnknownAssociatedAction { action, associated } => write!(
                f,
                "action {} is associated with {} which does not precede it",
                action, associated
            ),
            Violation::InvalidSpeed { reason } => write!(f, "invalid speed: {}", reason),
            Violation::InvalidRepeatCount { repeat_times } => {
                write!(f, "repeat count must be at least 1 (got {})", repeat_times)
            }
        }
    }
}

/// Mission validation failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("mission has no waypoints")]
    NoWaypoints,

    #[error("{}", format_violations(.0))]
    Invalid(Vec<Violation>),
}

impl ValidationError {
    /// Violations carried by this error (empty for `NoWaypoints`).
    pub fn violations(&self) -> &[Violation] {
        match self {
            ValidationError::NoWaypoints => &[],
            ValidationError::Invalid(violations) => violations,
        }
    }
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors surfaced by mission planning and the mission lifecycle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MissionError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("preflight setting {setting} failed: {reason}")]
    Preflight { setting: PreflightSetting, reason: String },

    #[error("{stage} upload failed: {reason}")]
    Upload { stage: UploadStage, reason: String },

    #[error("execution error at waypoint {}: {reason}", display_waypoint(.waypoint))]
    Execution { waypoint: Option<usize>, reason: String },

    #[error("action kind {0} is not supported")]
    UnsupportedAction(ActionKind),

    #[error("no action id left after {0}")]
    ActionIdsExhausted(ActionId),

    #[error("a mission is already in progress")]
    Busy,

    #[error("cannot {operation} while mission is {state}")]
    InvalidState { state: LifecycleState, operation: &'static str },

    #[error("vehicle rejected {operation}: {reason}")]
    Vehicle { operation: &'static str, reason: String },

    #[error("invalid mission plan: {0}")]
    Plan(String),
}

fn display_waypoint(waypoint: &Option<usize>) -> String {
    match waypoint {
        Some(index) => index.to_string(),
        None => "unknown".to_string(),
    }
}

impl From<serde_json::Error> for MissionError {
    fn from(err: serde_json::Error) -> Self {
        MissionError::Plan(err.to_string())
    }
}
