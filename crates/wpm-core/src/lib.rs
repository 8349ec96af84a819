//! Waypoint mission core: mission models, action builder, mission assembler
//! and the I/O-free mission lifecycle state machine.

pub mod action;
pub mod assembler;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod plan;
pub mod rules;
pub mod spatial;

pub use action::{build_action, ActionKind, ActionParams, ActionSequence};
pub use assembler::{validate_mission, MissionAssembler};
pub use error::{
    MissionError, PreflightSetting, Result, UploadStage, ValidationError, Violation,
};
pub use lifecycle::{
    ActionUploadProgress, ActionUploadState, Directive, EventTopic, ExecutionProgress,
    ExecutionStatus, LifecycleMachine, LifecycleState, MissionOutcome, OperatorState,
    VehicleEvent,
};
pub use models::{
    Action, ActionActuator, ActionId, ActionTrigger, CameraOperation, FinishedAction, GeoPoint,
    HeadingMode, Mission, MissionParameters, Waypoint,
};
pub use plan::{ActionRequest, MissionPlan, PlannedWaypoint};
pub use rules::OperationalLimits;
pub use spatial::haversine_distance;
