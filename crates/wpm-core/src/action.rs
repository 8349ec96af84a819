//! Action builder: turns semantic action requests into trigger/actuator pairs.
//!
//! Action ids follow the vehicle's numbering rule: the first action of a
//! mission is `#0` and every later action is the previous id plus one,
//! whatever its kind.

use crate::error::{MissionError, Result};
use crate::models::{
    Action, ActionActuator, ActionId, ActionTrigger, AssociatedTiming, CameraOperation,
    GimbalRotation, IntervalType, RotationDirection, RotationMode, YawRotation,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wait before motion and heading changes
const MOTION_WAIT_SECS: u32 = 5;
/// Wait before camera and gimbal operations
const PAYLOAD_WAIT_SECS: u32 = 3;
/// Duration of a gimbal rotation
const GIMBAL_ROTATION_SECS: f64 = 3.0;
const GIMBAL_NADIR_DEG: f64 = -90.0;

/// Semantic action kinds understood by the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    ReachPoint,
    StartMoving,
    Stay,
    TakePhoto,
    StartRecord,
    StopRecord,
    RotateHeading,
    RotateGimbal,
    RotateGimbalPan,
    StartIntervalShooting,
    StopIntervalShooting,
    Zoom,
}

impl ActionKind {
    pub const ALL: [ActionKind; 12] = [
        ActionKind::ReachPoint,
        ActionKind::StartMoving,
        ActionKind::Stay,
        ActionKind::TakePhoto,
        ActionKind::StartRecord,
        ActionKind::StopRecord,
        ActionKind::RotateHeading,
        ActionKind::RotateGimbal,
        ActionKind::RotateGimbalPan,
        ActionKind::StartIntervalShooting,
        ActionKind::StopIntervalShooting,
        ActionKind::Zoom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::ReachPoint => "reach-point",
            ActionKind::StartMoving => "start-moving",
            ActionKind::Stay => "stay",
            ActionKind::TakePhoto => "take-photo",
            ActionKind::StartRecord => "start-record",
            ActionKind::StopRecord => "stop-record",
            ActionKind::RotateHeading => "rotate-heading",
            ActionKind::RotateGimbal => "rotate-gimbal",
            ActionKind::RotateGimbalPan => "rotate-gimbal-pan",
            ActionKind::StartIntervalShooting => "start-interval-shooting",
            ActionKind::StopIntervalShooting => "stop-interval-shooting",
            ActionKind::Zoom => "zoom",
        }
    }

    /// Whether the builder can turn this kind into an action.
    pub fn is_supported(&self) -> bool {
        !matches!(self, ActionKind::StopIntervalShooting)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = MissionError;

    fn from_str(s: &str) -> Result<Self> {
        ActionKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| MissionError::Plan(format!("unknown action kind '{}'", s)))
    }
}

/// Named parameters for an action request. Each kind reads only the fields it needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionParams {
    pub waypoint_index: usize,
    pub heading_deg: f64,
    pub gimbal_deg: f64,
    pub stay_secs: f64,
    pub interval_secs: f64,
    pub zoom_focal_length: f64,
}

impl ActionParams {
    pub fn at_waypoint(waypoint_index: usize) -> Self {
        Self {
            waypoint_index,
            ..Default::default()
        }
    }
}

/// Build a single action.
///
/// `previous` is the id of the last action already built for this mission,
/// or None when this is the first one. Returns the action; its id is the
/// "previous" value for the next call.
pub fn build_action(
    kind: ActionKind,
    params: &ActionParams,
    previous: Option<ActionId>,
) -> Result<Action> {
    let id = match previous {
        None => ActionId(0),
        Some(ActionId(prev)) => ActionId(
            prev.checked_add(1)
                .ok_or(MissionError::ActionIdsExhausted(ActionId(prev)))?,
        ),
    };

    let (trigger, actuator) = match kind {
        ActionKind::ReachPoint => (
            ActionTrigger::ReachPoint {
                start_index: params.waypoint_index,
                waypoint_count_to_terminate: params.waypoint_index,
            },
            ActionActuator::Motion { start_flying: false },
        ),
        ActionKind::StartMoving => (
            after_previous(previous, MOTION_WAIT_SECS),
            ActionActuator::Motion { start_flying: true },
        ),
        ActionKind::Stay => (
            after_previous(previous, whole_secs(params.stay_secs)),
            ActionActuator::Motion { start_flying: false },
        ),
        ActionKind::TakePhoto => (
            after_previous(previous, PAYLOAD_WAIT_SECS),
            ActionActuator::Camera(CameraOperation::TakePhoto),
        ),
        ActionKind::StartRecord => (
            after_previous(previous, PAYLOAD_WAIT_SECS),
            ActionActuator::Camera(CameraOperation::StartRecordVideo),
        ),
        ActionKind::StopRecord => (
            after_previous(previous, PAYLOAD_WAIT_SECS),
            ActionActuator::Camera(CameraOperation::StopRecordVideo),
        ),
        ActionKind::RotateHeading => (
            after_previous(previous, MOTION_WAIT_SECS),
            ActionActuator::Yaw(YawRotation {
                heading_deg: params.heading_deg,
                relative: false,
                direction: RotationDirection::Clockwise,
            }),
        ),
        ActionKind::RotateGimbal => {
            // Either straight-down request means nadir.
            let pitch = if params.gimbal_deg.abs() == 90.0 {
                GIMBAL_NADIR_DEG
            } else {
                params.gimbal_deg
            };
            (
                after_previous(previous, PAYLOAD_WAIT_SECS),
                ActionActuator::Gimbal(gimbal_rotation(Some(pitch), None)),
            )
        }
        ActionKind::RotateGimbalPan => (
            after_previous(previous, PAYLOAD_WAIT_SECS),
            ActionActuator::Gimbal(gimbal_rotation(None, Some(params.gimbal_deg))),
        ),
        ActionKind::StartIntervalShooting => (
            ActionTrigger::Interval {
                interval_type: IntervalType::Time,
                interval: params.interval_secs,
                start_index: params.waypoint_index,
            },
            ActionActuator::Camera(CameraOperation::TakePhoto),
        ),
        ActionKind::Zoom => (
            after_previous(previous, PAYLOAD_WAIT_SECS),
            ActionActuator::Camera(CameraOperation::Zoom {
                focal_length: params.zoom_focal_length.max(0.0) as u32,
            }),
        ),
        ActionKind::StopIntervalShooting => return Err(MissionError::UnsupportedAction(kind)),
    };

    Ok(Action {
        id,
        trigger,
        actuator,
    })
}

fn after_previous(previous: Option<ActionId>, wait_secs: u32) -> ActionTrigger {
    ActionTrigger::Associated {
        associated_action: previous,
        timing: AssociatedTiming::AfterFinished,
        wait_secs,
    }
}

fn whole_secs(secs: f64) -> u32 {
    if secs.is_finite() && secs > 0.0 {
        secs as u32
    } else {
        0
    }
}

fn gimbal_rotation(pitch_deg: Option<f64>, yaw_deg: Option<f64>) -> GimbalRotation {
    GimbalRotation {
        pitch_deg,
        roll_deg: 0.0,
        yaw_deg,
        duration_secs: GIMBAL_ROTATION_SECS,
        mode: RotationMode::AbsoluteAngle,
        ignore_other_axes: true,
    }
}

/// Ordered list of actions for one mission, threading ids between builds.
#[derive(Debug, Clone, Default)]
pub struct ActionSequence {
    actions: Vec<Action>,
}

impl ActionSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the most recently built action.
    pub fn last_id(&self) -> Option<ActionId> {
        self.actions.last().map(|a| a.id)
    }

    /// Build and append an action. Nothing is appended on error.
    pub fn push(&mut self, kind: ActionKind, params: &ActionParams) -> Result<ActionId> {
        let action = build_action(kind, params, self.last_id())?;
        let id = action.id;
        self.actions.push(action);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn into_actions(self) -> Vec<Action> {
        self.actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential_for_every_supported_kind() {
        let mut seq = ActionSequence::new();
        let supported: Vec<_> = ActionKind::ALL.iter().filter(|k| k.is_supported()).collect();

        for kind in &supported {
            seq.push(**kind, &ActionParams::default()).unwrap();
        }

        let ids: Vec<u32> = seq.actions().iter().map(|a| a.id.0).collect();
        let expected: Vec<u32> = (0..supported.len() as u32).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn id_overflow_is_an_error() {
        let last = Some(ActionId(u32::MAX));
        assert_eq!(
            build_action(ActionKind::TakePhoto, &ActionParams::default(), last).unwrap_err(),
            MissionError::ActionIdsExhausted(ActionId(u32::MAX))
        );
        let penultimate = Some(ActionId(u32::MAX - 1));
        let action = build_action(ActionKind::TakePhoto, &ActionParams::default(), penultimate).unwrap();
        assert_eq!(action.id, ActionId(u32::MAX));
    }

    #[test]
    fn first_action_keeps_index_zero_regardless_of_kind() {
        for kind in ActionKind::ALL.iter().filter(|k| k.is_supported()) {
            let action = build_action(*kind, &ActionParams::default(), None).unwrap();
            assert_eq!(action.id, ActionId(0), "kind {}", kind);
        }
    }

    #[test]
    fn stop_interval_shooting_is_unsupported() {
        let err = build_action(
            ActionKind::StopIntervalShooting,
            &ActionParams::default(),
            Some(ActionId(3)),
        )
        .unwrap_err();
        assert_eq!(err, MissionError::UnsupportedAction(ActionKind::StopIntervalShooting));

        let mut seq = ActionSequence::new();
        seq.push(ActionKind::ReachPoint, &ActionParams::default()).unwrap();
        assert!(seq
            .push(ActionKind::StopIntervalShooting, &ActionParams::default())
            .is_err());
        assert_eq!(seq.len(), 1);
        assert_eq!(seq.last_id(), Some(ActionId(0)));
    }

    #[test]
    fn reach_point_targets_waypoint() {
        let action = build_action(ActionKind::ReachPoint, &ActionParams::at_waypoint(2), None).unwrap();
        assert_eq!(
            action.trigger,
            ActionTrigger::ReachPoint {
                start_index: 2,
                waypoint_count_to_terminate: 2
            }
        );
        assert_eq!(action.actuator, ActionActuator::Motion { start_flying: false });
    }

    #[test]
    fn associated_actions_follow_previous_with_table_waits() {
        let prev = Some(ActionId(4));
        let cases = [
            (ActionKind::StartMoving, 5),
            (ActionKind::TakePhoto, 3),
            (ActionKind::StartRecord, 3),
            (ActionKind::StopRecord, 3),
            (ActionKind::RotateHeading, 5),
            (ActionKind::RotateGimbal, 3),
            (ActionKind::RotateGimbalPan, 3),
            (ActionKind::Zoom, 3),
        ];

        for (kind, wait) in cases {
            let action = build_action(kind, &ActionParams::default(), prev).unwrap();
            assert_eq!(action.id, ActionId(5));
            assert_eq!(
                action.trigger,
                ActionTrigger::Associated {
                    associated_action: prev,
                    timing: AssociatedTiming::AfterFinished,
                    wait_secs: wait,
                },
                "kind {}",
                kind
            );
        }
    }

    #[test]
    fn stay_waits_for_whole_seconds() {
        let params = ActionParams {
            stay_secs: 3.7,
            ..Default::default()
        };
        let action = build_action(ActionKind::Stay, &params, Some(ActionId(0))).unwrap();
        match action.trigger {
            ActionTrigger::Associated { wait_secs, .. } => assert_eq!(wait_secs, 3),
            other => panic!("unexpected trigger {:?}", other),
        }
        assert_eq!(action.actuator, ActionActuator::Motion { start_flying: false });
    }

    #[test]
    fn gimbal_straight_down_normalises_to_nadir() {
        for angle in [90.0, -90.0] {
            let params = ActionParams {
                gimbal_deg: angle,
                ..Default::default()
            };
            let action = build_action(ActionKind::RotateGimbal, &params, None).unwrap();
            match action.actuator {
                ActionActuator::Gimbal(rot) => {
                    assert_eq!(rot.pitch_deg, Some(-90.0));
                    assert_eq!(rot.yaw_deg, None);
                }
                other => panic!("unexpected actuator {:?}", other),
            }
        }

        let params = ActionParams {
            gimbal_deg: -45.0,
            ..Default::default()
        };
        let action = build_action(ActionKind::RotateGimbal, &params, None).unwrap();
        assert!(matches!(
            action.actuator,
            ActionActuator::Gimbal(GimbalRotation { pitch_deg: Some(p), .. }) if p == -45.0
        ));
    }

    #[test]
    fn gimbal_pan_moves_only_yaw() {
        let params = ActionParams {
            gimbal_deg: 120.0,
            ..Default::default()
        };
        let action = build_action(ActionKind::RotateGimbalPan, &params, None).unwrap();
        match action.actuator {
            ActionActuator::Gimbal(rot) => {
                assert_eq!(rot.pitch_deg, None);
                assert_eq!(rot.yaw_deg, Some(120.0));
                assert_eq!(rot.mode, RotationMode::AbsoluteAngle);
            }
            other => panic!("unexpected actuator {:?}", other),
        }
    }

    #[test]
    fn interval_shooting_starts_at_waypoint() {
        let params = ActionParams {
            waypoint_index: 1,
            interval_secs: 2.5,
            ..Default::default()
        };
        let action = build_action(ActionKind::StartIntervalShooting, &params, None).unwrap();
        assert_eq!(
            action.trigger,
            ActionTrigger::Interval {
                interval_type: IntervalType::Time,
                interval: 2.5,
                start_index: 1
            }
        );
        assert_eq!(action.actuator, ActionActuator::Camera(CameraOperation::TakePhoto));
    }

    #[test]
    fn zoom_truncates_focal_length() {
        let params = ActionParams {
            zoom_focal_length: 72.9,
            ..Default::default()
        };
        let action = build_action(ActionKind::Zoom, &params, None).unwrap();
        assert_eq!(
            action.actuator,
            ActionActuator::Camera(CameraOperation::Zoom { focal_length: 72 })
        );
    }

    #[test]
    fn kind_parses_from_kebab_case() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.as_str().parse::<ActionKind>().unwrap(), kind);
        }
        assert!("hover".parse::<ActionKind>().is_err());
    }
}
