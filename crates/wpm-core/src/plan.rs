//! Mission plan files.
//!
//! A plan is the human-editable JSON form of a mission: waypoints with the
//! semantic actions attached to each of them. Assembling a plan runs every
//! action request through the action builder and the mission assembler.

use crate::action::{ActionKind, ActionParams, ActionSequence};
use crate::assembler::MissionAssembler;
use crate::error::{MissionError, Result};
use crate::models::{Mission, MissionParameters, Waypoint};
use crate::rules::OperationalLimits;
use serde::{Deserialize, Serialize};

/// Action attached to a planned waypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub kind: ActionKind,
    /// Waypoint the action targets; defaults to the waypoint it is attached to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waypoint_index: Option<usize>,
    #[serde(default)]
    pub heading_deg: f64,
    #[serde(default)]
    pub gimbal_deg: f64,
    #[serde(default)]
    pub stay_secs: f64,
    #[serde(default)]
    pub interval_secs: f64,
    #[serde(default)]
    pub zoom_focal_length: f64,
}

impl ActionRequest {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            waypoint_index: None,
            heading_deg: 0.0,
            gimbal_deg: 0.0,
            stay_secs: 0.0,
            interval_secs: 0.0,
            zoom_focal_length: 0.0,
        }
    }

    /// Builder parameters for a request attached to waypoint `owner`.
    pub fn params(&self, owner: usize) -> ActionParams {
        ActionParams {
            waypoint_index: self.waypoint_index.unwrap_or(owner),
            heading_deg: self.heading_deg,
            gimbal_deg: self.gimbal_deg,
            stay_secs: self.stay_secs,
            interval_secs: self.interval_secs,
            zoom_focal_length: self.zoom_focal_length,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedWaypoint {
    #[serde(flatten)]
    pub waypoint: Waypoint,
    #[serde(default)]
    pub actions: Vec<ActionRequest>,
}

/// JSON mission plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionPlan {
    #[serde(default)]
    pub mission_id: u32,
    #[serde(default)]
    pub parameters: MissionParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<OperationalLimits>,
    pub waypoints: Vec<PlannedWaypoint>,
}

impl MissionPlan {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Total number of action requests across all waypoints.
    pub fn action_count(&self) -> usize {
        self.waypoints.iter().map(|wp| wp.actions.len()).sum()
    }

    /// Build every action and assemble the mission.
    pub fn assemble(&self) -> Result<Mission> {
        let mut sequence = ActionSequence::new();
        for (owner, planned) in self.waypoints.iter().enumerate() {
            for request in &planned.actions {
                sequence.push(request.kind, &request.params(owner))?;
            }
        }

        let mut assembler = MissionAssembler::new(self.parameters.clone())
            .with_mission_id(self.mission_id)
            .waypoints(self.waypoints.iter().map(|wp| wp.waypoint.clone()))
            .actions(sequence.into_actions());
        if let Some(limits) = &self.limits {
            assembler = assembler.with_limits(limits.clone());
        }

        assembler.assemble().map_err(MissionError::from)
    }

    /// Two fixed-heading waypoints, each with reach-point then start-moving,
    /// flown twice.
    pub fn sample() -> Self {
        let stop_then_go = vec![
            ActionRequest::new(ActionKind::ReachPoint),
            ActionRequest::new(ActionKind::StartMoving),
        ];

        Self {
            mission_id: 1,
            parameters: MissionParameters {
                auto_flight_speed_mps: 5.0,
                max_flight_speed_mps: 5.0,
                repeat_times: 2,
                ..Default::default()
            },
            limits: None,
            waypoints: vec![
                PlannedWaypoint {
                    waypoint: Waypoint::new(33.6209929, 130.6265251, 20.0)
                        .with_fixed_heading(30.0)
                        .with_speed(3.0),
                    actions: stop_then_go.clone(),
                },
                PlannedWaypoint {
                    waypoint: Waypoint::new(33.6211096, 130.6265459, 60.0)
                        .with_fixed_heading(90.0)
                        .with_speed(3.0),
                    actions: stop_then_go,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ValidationError, Violation};
    use crate::models::{ActionActuator, ActionId, ActionTrigger};

    #[test]
    fn sample_plan_builds_four_actions() {
        let mission = MissionPlan::sample().assemble().unwrap();
        assert_eq!(mission.waypoint_count(), 2);
        let ids: Vec<u32> = mission.actions.iter().map(|a| a.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);

        assert_eq!(
            mission.actions[2].trigger,
            ActionTrigger::ReachPoint {
                start_index: 1,
                waypoint_count_to_terminate: 1
            }
        );
        assert_eq!(
            mission.actions[3].actuator,
            ActionActuator::Motion { start_flying: true }
        );
        match &mission.actions[3].trigger {
            ActionTrigger::Associated {
                associated_action, ..
            } => assert_eq!(*associated_action, Some(ActionId(2))),
            other => panic!("unexpected trigger {:?}", other),
        }
    }

    #[test]
    fn bundled_plan_file_matches_sample() {
        let json = include_str!("../../../plans/two_waypoints.json");
        let plan = MissionPlan::from_json(json).unwrap();
        assert_eq!(plan.assemble().unwrap(), MissionPlan::sample().assemble().unwrap());
    }

    #[test]
    fn survey_plan_assembles_within_limits() {
        let json = include_str!("../../../plans/survey_photos.json");
        let plan = MissionPlan::from_json(json).unwrap();
        assert_eq!(plan.action_count(), 12);

        let mission = plan.assemble().unwrap();
        assert_eq!(mission.mission_id, 7);
        let ids: Vec<u32> = mission.actions.iter().map(|a| a.id.0).collect();
        assert_eq!(ids, (0..12).collect::<Vec<u32>>());
        assert!(matches!(
            mission.actions[2].trigger,
            ActionTrigger::Interval { start_index: 0, .. }
        ));
        assert!(matches!(
            mission.actions[9].actuator,
            ActionActuator::Camera(crate::models::CameraOperation::Zoom { focal_length: 72 })
        ));
    }

    #[test]
    fn explicit_waypoint_index_is_validated() {
        let mut plan = MissionPlan::sample();
        plan.waypoints.truncate(1);
        let mut request = ActionRequest::new(ActionKind::ReachPoint);
        request.waypoint_index = Some(5);
        plan.waypoints[0].actions = vec![request];

        match plan.assemble() {
            Err(MissionError::Validation(ValidationError::Invalid(violations))) => {
                assert!(violations
                    .iter()
                    .any(|v| matches!(v, Violation::WaypointIndexOutOfRange { index: 5, .. })));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn unsupported_action_in_plan_fails_before_assembly() {
        let mut plan = MissionPlan::sample();
        plan.waypoints[0]
            .actions
            .push(ActionRequest::new(ActionKind::StopIntervalShooting));

        assert_eq!(
            plan.assemble().unwrap_err(),
            MissionError::UnsupportedAction(ActionKind::StopIntervalShooting)
        );
    }

    #[test]
    fn malformed_json_is_a_plan_error() {
        let err = MissionPlan::from_json("{\"waypoints\": 3}").unwrap_err();
        assert!(matches!(err, MissionError::Plan(_)));
    }
}
