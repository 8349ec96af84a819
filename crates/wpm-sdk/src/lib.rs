//! Vehicle integration for waypoint missions.
//!
//! Connects the planning types in `wpm-core` to an aircraft: the vehicle
//! traits, the event-driven lifecycle controller, preflight configuration
//! and an in-memory simulated vehicle.

pub mod control;
pub mod controller;
pub mod preflight;
pub mod sim;
pub mod vehicle;

pub use control::{MissionControl, PreparedMission};
pub use controller::{
    AttemptReservation, LifecycleController, LifecycleNotice, LifecycleSnapshot, NoticeKind,
};
pub use preflight::{MaxRadius, PreflightConfigurator, PreflightReport, PreflightSettings};
pub use sim::{CommandKind, SimConfig, SimulatedVehicle, VehicleCommand};
pub use vehicle::{
    Camera, CameraMode, FlightController, FocusMode, LensId, MediaFile, MediaSubscription,
    MissionOperator, PhotoFileFormat, Subscription, SubscriptionId, VehicleError, VehicleHandles,
    VehicleResult,
};
