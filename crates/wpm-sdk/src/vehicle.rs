//! Vehicle subsystem boundary.
//!
//! The mission controller talks to the aircraft only through these traits.
//! Implementations deliver events on per-subscription channels; dropping the
//! sender side (on unsubscribe) ends the stream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use wpm_core::{Action, ActionUploadState, EventTopic, GeoPoint, Mission, OperatorState, VehicleEvent};

/// Error returned by a vehicle command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VehicleError {
    #[error("command rejected: {0}")]
    Rejected(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("vehicle disconnected")]
    Disconnected,

    #[error("not supported: {0}")]
    NotSupported(&'static str),
}

pub type VehicleResult<T> = Result<T, VehicleError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// A registered event listener.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub topic: EventTopic,
    pub events: mpsc::UnboundedReceiver<VehicleEvent>,
}

/// Mission upload and execution on the aircraft.
#[async_trait]
pub trait MissionOperator: Send + Sync {
    async fn load_mission(&self, mission: &Mission) -> VehicleResult<()>;

    /// Upload the loaded mission. Progress is reported as mission-state events.
    async fn upload_mission(&self) -> VehicleResult<()>;

    /// Upload the action list. Progress is reported as action-upload events.
    async fn upload_actions(&self, actions: &[Action]) -> VehicleResult<()>;

    async fn start_mission(&self) -> VehicleResult<()>;

    async fn stop_mission(&self) -> VehicleResult<()>;

    fn current_state(&self) -> OperatorState;

    fn current_action_state(&self) -> ActionUploadState;

    fn subscribe(&self, topic: EventTopic) -> Subscription;

    /// Remove a listener. Returns false if it was not registered.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    fn listener_count(&self) -> usize;
}

/// Flight controller settings and commands.
#[async_trait]
pub trait FlightController: Send + Sync {
    async fn set_home_location(&self, home: GeoPoint) -> VehicleResult<()>;

    async fn set_go_home_height(&self, height_m: u32) -> VehicleResult<()>;

    async fn set_max_flight_radius_enabled(&self, enabled: bool) -> VehicleResult<()>;

    async fn set_max_flight_radius(&self, radius_m: u32) -> VehicleResult<()>;

    async fn set_max_flight_height(&self, height_m: u32) -> VehicleResult<()>;

    /// Current aircraft position, if the aircraft has a fix.
    async fn aircraft_location(&self) -> VehicleResult<Option<GeoPoint>>;

    async fn start_landing(&self) -> VehicleResult<()>;
}

/// Index of a camera lens. Single-lens cameras expose lens 0 only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LensId(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusMode {
    Manual,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraMode {
    ShootPhoto,
    RecordVideo,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoFileFormat {
    #[default]
    Jpeg,
    Raw,
    RawAndJpeg,
}

impl fmt::Display for PhotoFileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhotoFileFormat::Jpeg => "jpeg",
            PhotoFileFormat::Raw => "raw",
            PhotoFileFormat::RawAndJpeg => "raw+jpeg",
        };
        f.write_str(name)
    }
}

impl FromStr for PhotoFileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(PhotoFileFormat::Jpeg),
            "raw" => Ok(PhotoFileFormat::Raw),
            "raw+jpeg" | "raw_and_jpeg" => Ok(PhotoFileFormat::RawAndJpeg),
            other => Err(format!("unknown photo format '{}'", other)),
        }
    }
}

/// A file the camera wrote to its storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    pub file_name: String,
    pub lens: LensId,
    pub format: PhotoFileFormat,
    /// Waypoint the aircraft was at when the file was captured, if known
    pub waypoint: Option<usize>,
}

/// A registered new-media listener.
#[derive(Debug)]
pub struct MediaSubscription {
    pub id: SubscriptionId,
    pub files: mpsc::UnboundedReceiver<MediaFile>,
}

/// Camera settings used before flight, plus new-media notifications.
#[async_trait]
pub trait Camera: Send + Sync {
    fn display_name(&self) -> String;

    fn lenses(&self) -> Vec<LensId>;

    async fn set_focus_mode(&self, mode: FocusMode) -> VehicleResult<()>;

    async fn set_mode(&self, mode: CameraMode) -> VehicleResult<()>;

    async fn photo_file_format(&self, lens: LensId) -> VehicleResult<PhotoFileFormat>;

    async fn set_photo_file_format(&self, lens: LensId, format: PhotoFileFormat) -> VehicleResult<()>;

    /// Register for every media file the camera generates.
    fn subscribe_media(&self) -> MediaSubscription;

    /// Remove a media listener. Returns false if it was not registered.
    fn unsubscribe_media(&self, id: SubscriptionId) -> bool;
}

/// Handles to the vehicle subsystems, injected at construction.
#[derive(Clone)]
pub struct VehicleHandles {
    pub operator: Arc<dyn MissionOperator>,
    pub flight_controller: Arc<dyn FlightController>,
    pub camera: Arc<dyn Camera>,
}

impl VehicleHandles {
    /// Use one object for every subsystem (e.g. a simulator).
    pub fn from_vehicle<V>(vehicle: Arc<V>) -> Self
    where
        V: MissionOperator + FlightController + Camera + 'static,
    {
        Self {
            operator: vehicle.clone(),
            flight_controller: vehicle.clone(),
            camera: vehicle,
        }
    }
}
