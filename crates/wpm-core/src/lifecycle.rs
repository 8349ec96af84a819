//! Mission lifecycle state machine.
//!
//! The machine is driven only by inputs: load/start results, vehicle events
//! and explicit abort requests. It performs no I/O; every side effect is
//! returned as a [`Directive`] for the caller to execute against the vehicle.
//!
//! ```text
//! Idle -> Loaded -> UploadingMission -> UploadingActions -> ReadyToExecute -> Executing -> Finished
//!   \________\____________\___________________\__________________\______________\-> Aborted
//! ```

use crate::error::{MissionError, Result, UploadStage};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Controller-side lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Idle,
    Loaded,
    UploadingMission,
    UploadingActions,
    ReadyToExecute,
    Executing,
    Finished,
    Aborted,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Finished | LifecycleState::Aborted)
    }

    /// A mission attempt is in flight.
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != LifecycleState::Idle
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Loaded => "loaded",
            LifecycleState::UploadingMission => "uploading mission",
            LifecycleState::UploadingActions => "uploading actions",
            LifecycleState::ReadyToExecute => "ready to execute",
            LifecycleState::Executing => "executing",
            LifecycleState::Finished => "finished",
            LifecycleState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Mission state reported by the vehicle's mission operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorState {
    Disconnected,
    NotSupported,
    Recovering,
    ReadyToUpload,
    Uploading,
    ReadyToExecute,
    Executing,
    Interrupted,
}

/// Action-upload state reported by the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionUploadState {
    Disconnected,
    NotSupported,
    ReadyToUpload,
    Uploading,
    ReadyToExecute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionUploadProgress {
    pub total_action_count: usize,
    pub last_uploaded_action_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionProgress {
    pub target_waypoint_index: usize,
    pub is_waypoint_reached: bool,
}

/// Event stream a mission attempt can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTopic {
    MissionState,
    ActionUpload,
    Execution,
    Finished,
}

impl EventTopic {
    pub const ALL: [EventTopic; 4] = [
        EventTopic::MissionState,
        EventTopic::ActionUpload,
        EventTopic::Execution,
        EventTopic::Finished,
    ];
}

/// Event delivered by the vehicle subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VehicleEvent {
    MissionState {
        previous: Option<OperatorState>,
        current: OperatorState,
    },
    ActionUpload {
        previous: Option<ActionUploadState>,
        current: ActionUploadState,
        progress: Option<ActionUploadProgress>,
    },
    Execution {
        progress: ExecutionProgress,
        error: Option<String>,
    },
    Finished {
        error: Option<String>,
    },
}

impl VehicleEvent {
    pub fn topic(&self) -> EventTopic {
        match self {
            VehicleEvent::MissionState { .. } => EventTopic::MissionState,
            VehicleEvent::ActionUpload { .. } => EventTopic::ActionUpload,
            VehicleEvent::Execution { .. } => EventTopic::Execution,
            VehicleEvent::Finished { .. } => EventTopic::Finished,
        }
    }
}

/// Side effect requested by the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    UploadMission,
    UploadActions,
    /// Unregister every subscription of the current attempt
    ReleaseSubscriptions,
    /// Surface an error to the caller without changing course
    Report(MissionError),
}

/// How a mission attempt ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum MissionOutcome {
    Completed,
    Failed(String),
    Aborted,
}

/// Observable execution state of the current attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionStatus {
    pub target_waypoint: Option<usize>,
    pub waypoint_reached: bool,
    /// Number of waypoint arrivals seen (counts repeats)
    pub arrivals: usize,
    pub uploaded_actions: Option<ActionUploadProgress>,
    pub last_error: Option<MissionError>,
    pub outcome: Option<MissionOutcome>,
}

/// Pure mission lifecycle state machine for one mission attempt.
#[derive(Debug, Clone, Default)]
pub struct LifecycleMachine {
    state: LifecycleState,
    mission_upload_issued: bool,
    actions_upload_issued: bool,
    subscriptions_released: bool,
    failed_stage: Option<UploadStage>,
    status: ExecutionStatus,
}

impl LifecycleMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn status(&self) -> &ExecutionStatus {
        &self.status
    }

    /// Stage whose upload failed and has not been retried yet.
    pub fn failed_stage(&self) -> Option<UploadStage> {
        self.failed_stage
    }

    pub fn subscriptions_released(&self) -> bool {
        self.subscriptions_released
    }

    /// The vehicle accepted the mission.
    pub fn on_loaded(&mut self) -> Result<()> {
        if self.state != LifecycleState::Idle {
            return Err(MissionError::InvalidState {
                state: self.state,
                operation: "load",
            });
        }
        self.state = LifecycleState::Loaded;
        Ok(())
    }

    /// Check that the mission may be started now.
    pub fn check_start(&self) -> Result<()> {
        match self.state {
            LifecycleState::ReadyToExecute | LifecycleState::Executing => Ok(()),
            state => Err(MissionError::InvalidState {
                state,
                operation: "start",
            }),
        }
    }

    /// The vehicle accepted the start command.
    pub fn on_started(&mut self) {
        if self.state == LifecycleState::ReadyToExecute {
            self.state = LifecycleState::Executing;
        }
    }

    /// An upload command returned an error. The stage is not retried until
    /// [`LifecycleMachine::retry_upload`] is called.
    pub fn on_upload_failed(&mut self, stage: UploadStage, reason: impl Into<String>) -> Vec<Directive> {
        let err = MissionError::Upload {
            stage,
            reason: reason.into(),
        };
        self.failed_stage = Some(stage);
        self.status.last_error = Some(err.clone());
        vec![Directive::Report(err)]
    }

    /// Re-arm the failed upload stage. The caller should then feed the
    /// vehicle's current states back in through [`LifecycleMachine::on_event`].
    pub fn retry_upload(&mut self) -> Result<UploadStage> {
        let stage = self.failed_stage.take().ok_or(MissionError::InvalidState {
            state: self.state,
            operation: "retry upload",
        })?;

        match stage {
            UploadStage::Load => {}
            UploadStage::Mission => {
                self.mission_upload_issued = false;
                self.state = LifecycleState::Loaded;
            }
            UploadStage::Actions => {
                self.actions_upload_issued = false;
                self.state = LifecycleState::UploadingMission;
            }
        }
        Ok(stage)
    }

    /// Abort the attempt from any non-terminal state.
    pub fn abort(&mut self) -> Result<Vec<Directive>> {
        if self.state.is_terminal() {
            return Err(MissionError::InvalidState {
                state: self.state,
                operation: "abort",
            });
        }
        self.state = LifecycleState::Aborted;
        self.status.outcome = Some(MissionOutcome::Aborted);
        let mut directives = Vec::new();
        self.release(&mut directives);
        Ok(directives)
    }

    /// Apply a vehicle event.
    pub fn on_event(&mut self, event: &VehicleEvent) -> Vec<Directive> {
        let mut directives = Vec::new();
        if self.state.is_terminal() {
            return directives;
        }

        match event {
            VehicleEvent::MissionState { current, .. } => {
                self.on_mission_state(*current, &mut directives)
            }
            VehicleEvent::ActionUpload {
                previous,
                current,
                progress,
            } => {
                if progress.is_some() {
                    self.status.uploaded_actions = *progress;
                }
                self.on_action_upload_state(*previous, *current, &mut directives);
            }
            VehicleEvent::Execution { progress, error } => {
                self.on_execution(progress, error.as_deref(), &mut directives)
            }
            VehicleEvent::Finished { error } => self.on_finished(error.as_deref(), &mut directives),
        }

        directives
    }

    fn on_mission_state(&mut self, current: OperatorState, directives: &mut Vec<Directive>) {
        match (self.state, current) {
            (LifecycleState::Loaded, OperatorState::ReadyToUpload)
                if !self.mission_upload_issued && self.failed_stage.is_none() =>
            {
                self.mission_upload_issued = true;
                self.state = LifecycleState::UploadingMission;
                directives.push(Directive::UploadMission);
            }
            (LifecycleState::ReadyToExecute, OperatorState::Executing) => {
                self.state = LifecycleState::Executing;
            }
            (state, OperatorState::Disconnected) if state.is_active() => {
                directives.push(Directive::Report(MissionError::Vehicle {
                    operation: "mission",
                    reason: "vehicle disconnected".to_string(),
                }));
            }
            _ => {}
        }
    }

    fn on_action_upload_state(
        &mut self,
        previous: Option<ActionUploadState>,
        current: ActionUploadState,
        directives: &mut Vec<Directive>,
    ) {
        match (self.state, current) {
            (LifecycleState::UploadingMission, ActionUploadState::ReadyToUpload)
                if self.mission_upload_issued
                    && !self.actions_upload_issued
                    && self.failed_stage.is_none() =>
            {
                self.actions_upload_issued = true;
                self.state = LifecycleState::UploadingActions;
                directives.push(Directive::UploadActions);
            }
            (LifecycleState::UploadingActions, ActionUploadState::ReadyToExecute)
                if previous == Some(ActionUploadState::Uploading) =>
            {
                self.state = LifecycleState::ReadyToExecute;
            }
            _ => {}
        }
    }

    fn on_execution(
        &mut self,
        progress: &ExecutionProgress,
        error: Option<&str>,
        directives: &mut Vec<Directive>,
    ) {
        match self.state {
            LifecycleState::ReadyToExecute => self.state = LifecycleState::Executing,
            LifecycleState::Executing => {}
            _ => return,
        }

        let newly_reached = progress.is_waypoint_reached
            && !(self.status.waypoint_reached
                && self.status.target_waypoint == Some(progress.target_waypoint_index));
        if newly_reached {
            self.status.arrivals += 1;
        }
        self.status.target_waypoint = Some(progress.target_waypoint_index);
        self.status.waypoint_reached = progress.is_waypoint_reached;

        if let Some(reason) = error {
            let err = MissionError::Execution {
                waypoint: Some(progress.target_waypoint_index),
                reason: reason.to_string(),
            };
            self.status.last_error = Some(err.clone());
            directives.push(Directive::Report(err));
        }
    }

    fn on_finished(&mut self, error: Option<&str>, directives: &mut Vec<Directive>) {
        if self.state == LifecycleState::Idle {
            return;
        }

        self.state = LifecycleState::Finished;
        match error {
            Some(reason) => {
                let err = MissionError::Execution {
                    waypoint: self.status.target_waypoint,
                    reason: reason.to_string(),
                };
                self.status.last_error = Some(err.clone());
                self.status.outcome = Some(MissionOutcome::Failed(reason.to_string()));
                directives.push(Directive::Report(err));
            }
            None => self.status.outcome = Some(MissionOutcome::Completed),
        }
        self.release(directives);
    }

    fn release(&mut self, directives: &mut Vec<Directive>) {
        if !self.subscriptions_released {
            self.subscriptions_released = true;
            directives.push(Directive::ReleaseSubscriptions);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mission_state(current: OperatorState) -> VehicleEvent {
        VehicleEvent::MissionState {
            previous: None,
            current,
        }
    }

    fn action_state(previous: Option<ActionUploadState>, current: ActionUploadState) -> VehicleEvent {
        VehicleEvent::ActionUpload {
            previous,
            current,
            progress: None,
        }
    }

    fn execution(target: usize, reached: bool, error: Option<&str>) -> VehicleEvent {
        VehicleEvent::Execution {
            progress: ExecutionProgress {
                target_waypoint_index: target,
                is_waypoint_reached: reached,
            },
            error: error.map(str::to_string),
        }
    }

    fn release_count(directives: &[Directive]) -> usize {
        directives
            .iter()
            .filter(|d| matches!(d, Directive::ReleaseSubscriptions))
            .count()
    }

    /// Drive a fresh machine into `target`.
    fn machine_in(target: LifecycleState) -> LifecycleMachine {
        let mut m = LifecycleMachine::new();
        if target == LifecycleState::Idle {
            return m;
        }
        m.on_loaded().unwrap();
        if target == LifecycleState::Loaded {
            return m;
        }
        m.on_event(&mission_state(OperatorState::ReadyToUpload));
        if target == LifecycleState::UploadingMission {
            return m;
        }
        m.on_event(&action_state(None, ActionUploadState::ReadyToUpload));
        if target == LifecycleState::UploadingActions {
            return m;
        }
        m.on_event(&action_state(
            Some(ActionUploadState::Uploading),
            ActionUploadState::ReadyToExecute,
        ));
        if target == LifecycleState::ReadyToExecute {
            return m;
        }
        m.on_started();
        assert_eq!(m.state(), target);
        m
    }

    #[test]
    fn happy_path_reaches_finished() {
        let mut m = LifecycleMachine::new();
        m.on_loaded().unwrap();
        assert_eq!(m.state(), LifecycleState::Loaded);

        let d = m.on_event(&mission_state(OperatorState::ReadyToUpload));
        assert_eq!(d, vec![Directive::UploadMission]);
        assert_eq!(m.state(), LifecycleState::UploadingMission);

        let d = m.on_event(&action_state(None, ActionUploadState::ReadyToUpload));
        assert_eq!(d, vec![Directive::UploadActions]);
        assert_eq!(m.state(), LifecycleState::UploadingActions);

        m.on_event(&action_state(
            Some(ActionUploadState::ReadyToUpload),
            ActionUploadState::Uploading,
        ));
        assert_eq!(m.state(), LifecycleState::UploadingActions);

        m.on_event(&action_state(
            Some(ActionUploadState::Uploading),
            ActionUploadState::ReadyToExecute,
        ));
        assert_eq!(m.state(), LifecycleState::ReadyToExecute);

        m.check_start().unwrap();
        m.on_started();
        assert_eq!(m.state(), LifecycleState::Executing);

        m.on_event(&execution(0, true, None));
        m.on_event(&execution(1, false, None));
        m.on_event(&execution(1, true, None));
        assert_eq!(m.status().arrivals, 2);
        assert_eq!(m.status().target_waypoint, Some(1));

        let d = m.on_event(&VehicleEvent::Finished { error: None });
        assert_eq!(d, vec![Directive::ReleaseSubscriptions]);
        assert_eq!(m.state(), LifecycleState::Finished);
        assert_eq!(m.status().outcome, Some(MissionOutcome::Completed));
    }

    #[test]
    fn actions_never_upload_before_mission_ready_to_upload() {
        let mut m = LifecycleMachine::new();
        m.on_loaded().unwrap();

        // Action stream reports ready while the mission itself is not uploaded.
        let d = m.on_event(&action_state(None, ActionUploadState::ReadyToUpload));
        assert!(d.is_empty());
        assert_eq!(m.state(), LifecycleState::Loaded);

        let d = m.on_event(&mission_state(OperatorState::Uploading));
        assert!(d.is_empty());

        let d = m.on_event(&mission_state(OperatorState::ReadyToUpload));
        assert_eq!(d, vec![Directive::UploadMission]);

        let d = m.on_event(&action_state(None, ActionUploadState::ReadyToUpload));
        assert_eq!(d, vec![Directive::UploadActions]);
    }

    #[test]
    fn uploads_are_issued_once() {
        let mut m = machine_in(LifecycleState::UploadingActions);
        assert!(m.on_event(&mission_state(OperatorState::ReadyToUpload)).is_empty());
        assert!(m
            .on_event(&action_state(None, ActionUploadState::ReadyToUpload))
            .is_empty());
    }

    #[test]
    fn ready_to_execute_requires_uploading_transition() {
        let mut m = machine_in(LifecycleState::UploadingActions);
        m.on_event(&action_state(None, ActionUploadState::ReadyToExecute));
        assert_eq!(m.state(), LifecycleState::UploadingActions);
    }

    #[test]
    fn abort_from_active_states_releases_exactly_once() {
        for state in [
            LifecycleState::Loaded,
            LifecycleState::UploadingMission,
            LifecycleState::UploadingActions,
            LifecycleState::Executing,
        ] {
            let mut m = machine_in(state);
            let d = m.abort().unwrap();
            assert_eq!(release_count(&d), 1, "from {}", state);
            assert_eq!(m.state(), LifecycleState::Aborted);
            assert_eq!(m.status().outcome, Some(MissionOutcome::Aborted));

            assert!(m.abort().is_err());
            let d = m.on_event(&VehicleEvent::Finished { error: None });
            assert!(d.is_empty());
            assert_eq!(m.state(), LifecycleState::Aborted);
        }
    }

    #[test]
    fn finished_with_error_reports_and_releases_once() {
        let mut m = machine_in(LifecycleState::Executing);
        m.on_event(&execution(1, false, None));
        let d = m.on_event(&VehicleEvent::Finished {
            error: Some("low battery".to_string()),
        });
        assert_eq!(release_count(&d), 1);
        assert!(d.iter().any(|d| matches!(
            d,
            Directive::Report(MissionError::Execution { waypoint: Some(1), .. })
        )));
        assert_eq!(
            m.status().outcome,
            Some(MissionOutcome::Failed("low battery".to_string()))
        );

        let d = m.on_event(&VehicleEvent::Finished { error: None });
        assert_eq!(release_count(&d), 0);
    }

    #[test]
    fn execution_errors_do_not_abort() {
        let mut m = machine_in(LifecycleState::Executing);
        let d = m.on_event(&execution(0, true, Some("photo failed")));
        assert_eq!(d.len(), 1);
        assert_eq!(m.state(), LifecycleState::Executing);
        assert!(m.status().last_error.is_some());
    }

    #[test]
    fn start_only_allowed_when_ready() {
        let m = machine_in(LifecycleState::UploadingActions);
        assert!(matches!(
            m.check_start(),
            Err(MissionError::InvalidState { operation: "start", .. })
        ));
        let m = machine_in(LifecycleState::ReadyToExecute);
        assert!(m.check_start().is_ok());
    }

    #[test]
    fn upload_failure_waits_for_explicit_retry() {
        let mut m = machine_in(LifecycleState::UploadingMission);
        let d = m.on_upload_failed(UploadStage::Mission, "link busy");
        assert!(matches!(
            d.as_slice(),
            [Directive::Report(MissionError::Upload { stage: UploadStage::Mission, .. })]
        ));
        assert_eq!(m.state(), LifecycleState::UploadingMission);
        assert!(m.on_event(&mission_state(OperatorState::ReadyToUpload)).is_empty());

        assert_eq!(m.retry_upload().unwrap(), UploadStage::Mission);
        assert_eq!(m.state(), LifecycleState::Loaded);
        let d = m.on_event(&mission_state(OperatorState::ReadyToUpload));
        assert_eq!(d, vec![Directive::UploadMission]);

        assert!(m.retry_upload().is_err());
    }

    #[test]
    fn failed_mission_upload_blocks_action_upload_until_retry() {
        let mut m = machine_in(LifecycleState::UploadingMission);
        m.on_upload_failed(UploadStage::Mission, "link busy");

        let d = m.on_event(&action_state(None, ActionUploadState::ReadyToUpload));
        assert!(d.is_empty());
        assert_eq!(m.state(), LifecycleState::UploadingMission);

        m.retry_upload().unwrap();
        assert_eq!(m.on_event(&mission_state(OperatorState::ReadyToUpload)), vec![Directive::UploadMission]);
        assert_eq!(
            m.on_event(&action_state(None, ActionUploadState::ReadyToUpload)),
            vec![Directive::UploadActions]
        );
    }

    #[test]
    fn failed_load_blocks_mission_upload_until_retry() {
        let mut m = machine_in(LifecycleState::Loaded);
        m.on_upload_failed(UploadStage::Load, "rejected");
        assert!(m.on_event(&mission_state(OperatorState::ReadyToUpload)).is_empty());

        assert_eq!(m.retry_upload().unwrap(), UploadStage::Load);
        assert_eq!(m.on_event(&mission_state(OperatorState::ReadyToUpload)), vec![Directive::UploadMission]);
    }

    #[test]
    fn load_twice_is_rejected() {
        let mut m = machine_in(LifecycleState::Loaded);
        assert!(m.on_loaded().is_err());
    }
}
