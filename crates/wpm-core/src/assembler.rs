//! Mission assembler: packages waypoints, actions and global parameters into
//! a validated [`Mission`].

use crate::error::{ValidationError, Violation};
use crate::models::{Action, ActionId, ActionTrigger, Mission, MissionParameters, Waypoint};
use crate::rules::{OperationalLimits, MAX_MISSION_SPEED_MPS};
use crate::spatial::distance_m;
use std::collections::HashSet;

/// Builder for a [`Mission`].
#[derive(Debug, Clone, Default)]
pub struct MissionAssembler {
    mission_id: u32,
    waypoints: Vec<Waypoint>,
    actions: Vec<Action>,
    parameters: MissionParameters,
    limits: Option<OperationalLimits>,
}

impl MissionAssembler {
    pub fn new(parameters: MissionParameters) -> Self {
        Self {
            parameters,
            ..Default::default()
        }
    }

    pub fn with_mission_id(mut self, mission_id: u32) -> Self {
        self.mission_id = mission_id;
        self
    }

    /// Reject waypoints outside the given geofence.
    pub fn with_limits(mut self, limits: OperationalLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn waypoint(mut self, waypoint: Waypoint) -> Self {
        self.waypoints.push(waypoint);
        self
    }

    pub fn waypoints(mut self, waypoints: impl IntoIterator<Item = Waypoint>) -> Self {
        self.waypoints.extend(waypoints);
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions.extend(actions);
        self
    }

    /// Validate and build the mission.
    pub fn assemble(self) -> Result<Mission, ValidationError> {
        let mission = Mission {
            mission_id: self.mission_id,
            waypoints: self.waypoints,
            actions: self.actions,
            parameters: self.parameters,
        };
        validate_mission(&mission, self.limits.as_ref())?;
        Ok(mission)
    }

    /// Re-validate a mission that was not built by the assembler (e.g. loaded from JSON).
    pub fn from_mission(
        mission: Mission,
        limits: Option<&OperationalLimits>,
    ) -> Result<Mission, ValidationError> {
        validate_mission(&mission, limits)?;
        Ok(mission)
    }
}

/// Check every mission invariant, collecting all violations.
pub fn validate_mission(
    mission: &Mission,
    limits: Option<&OperationalLimits>,
) -> Result<(), ValidationError> {
    if mission.waypoints.is_empty() {
        return Err(ValidationError::NoWaypoints);
    }

    let mut violations = Vec::new();
    check_waypoints(mission, limits, &mut violations);
    check_parameters(mission, &mut violations);
    check_actions(mission, &mut violations);

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::Invalid(violations))
    }
}

fn check_waypoints(
    mission: &Mission,
    limits: Option<&OperationalLimits>,
    violations: &mut Vec<Violation>,
) {
    for (index, wp) in mission.waypoints.iter().enumerate() {
        if !wp.coordinate.is_valid() {
            violations.push(Violation::InvalidCoordinate {
                waypoint: index,
                coordinate: wp.coordinate,
            });
            continue;
        }

        let Some(limits) = limits else { continue };

        if let Some(max_radius_m) = limits.max_radius_m {
            let distance = distance_m(&limits.home, &wp.coordinate);
            if distance > max_radius_m {
                violations.push(Violation::OutsideRadius {
                    waypoint: index,
                    distance_m: distance,
                    max_radius_m,
                });
            }
        }

        if wp.altitude_m > limits.max_height_m {
            violations.push(Violation::AboveMaxHeight {
                waypoint: index,
                altitude_m: wp.altitude_m,
                max_height_m: limits.max_height_m,
            });
        }
    }
}

fn check_parameters(mission: &Mission, violations: &mut Vec<Violation>) {
    let params = &mission.parameters;
    let max = params.max_flight_speed_mps;
    let auto = params.auto_flight_speed_mps;

    if !(max > 0.0 && max <= MAX_MISSION_SPEED_MPS) {
        violations.push(Violation::InvalidSpeed {
            reason: format!(
                "max speed {} must be in (0, {}] m/s",
                max, MAX_MISSION_SPEED_MPS
            ),
        });
    }
    if !(auto > 0.0 && auto <= max) {
        violations.push(Violation::InvalidSpeed {
            reason: format!("auto speed {} must be in (0, {}] m/s", auto, max),
        });
    }

    for (index, wp) in mission.waypoints.iter().enumerate() {
        if !wp.use_waypoint_speed {
            continue;
        }
        match wp.auto_flight_speed_mps {
            Some(speed) if speed > 0.0 && speed <= max => {}
            Some(speed) => violations.push(Violation::InvalidSpeed {
                reason: format!(
                    "waypoint {} speed {} must be in (0, {}] m/s",
                    index, speed, max
                ),
            }),
            None => violations.push(Violation::InvalidSpeed {
                reason: format!("waypoint {} overrides speed but sets none", index),
            }),
        }
    }

    if params.repeat_times < 1 {
        violations.push(Violation::InvalidRepeatCount {
            repeat_times: params.repeat_times,
        });
    }
}

fn check_actions(mission: &Mission, violations: &mut Vec<Violation>) {
    let waypoint_count = mission.waypoints.len();
    let mut seen: HashSet<ActionId> = HashSet::new();

    for (position, action) in mission.actions.iter().enumerate() {
        if action.id != ActionId(position as u32) {
            violations.push(Violation::NonSequentialActionId {
                position,
                found: action.id,
            });
        }

        for index in action.trigger.waypoint_indexes() {
            if index >= waypoint_count {
                violations.push(Violation::WaypointIndexOutOfRange {
                    action: action.id,
                    index,
                    waypoint_count,
                });
                break;
            }
        }

        if let ActionTrigger::Associated {
            associated_action: Some(associated),
            ..
        } = action.trigger
        {
            if !seen.contains(&associated) {
                violations.push(Violation::UnknownAssociatedAction {
                    action: action.id,
                    associated,
                });
            }
        }

        seen.insert(action.id);
    }
}
