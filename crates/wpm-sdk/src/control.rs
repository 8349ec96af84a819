//! Mission control facade.
//!
//! The entry points an application calls: prepare, fly, end and land. Each is
//! a thin trigger into the preflight configurator or the lifecycle
//! controller.

use tokio::sync::broadcast;
use wpm_core::{validate_mission, Mission, MissionError, Result, UploadStage};

use crate::controller::{LifecycleController, LifecycleNotice, LifecycleSnapshot};
use crate::preflight::{PreflightConfigurator, PreflightReport, PreflightSettings};
use crate::vehicle::VehicleHandles;

/// Result of [`MissionControl::prepare_mission`].
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedMission {
    pub attempt_id: String,
    pub preflight: PreflightReport,
}

#[derive(Clone)]
pub struct MissionControl {
    handles: VehicleHandles,
    controller: LifecycleController,
    preflight: PreflightConfigurator,
    settings: PreflightSettings,
}

impl MissionControl {
    pub fn new(handles: VehicleHandles, settings: PreflightSettings) -> Self {
        let controller =
            LifecycleController::new(handles.operator.clone()).with_camera(handles.camera.clone());
        let preflight =
            PreflightConfigurator::new(handles.flight_controller.clone(), handles.camera.clone());
        Self {
            handles,
            controller,
            preflight,
            settings,
        }
    }

    pub fn settings(&self) -> &PreflightSettings {
        &self.settings
    }

    pub fn controller(&self) -> &LifecycleController {
        &self.controller
    }

    /// Validate the mission, apply preflight settings, then load it.
    ///
    /// Validation runs before anything is sent to the vehicle. Preflight
    /// failures are returned in the report and do not block the load. The
    /// attempt is reserved first, so a concurrent call fails with `Busy`
    /// without touching the vehicle.
    pub async fn prepare_mission(&self, mission: Mission) -> Result<PreparedMission> {
        let reservation = self.controller.reserve()?;
        validate_mission(&mission, self.settings.limits().as_ref())?;

        let preflight = self.preflight.apply(&self.settings).await;
        if !preflight.is_clean() {
            tracing::warn!(failures = preflight.failures.len(), "Preflight finished with failures");
        }

        let attempt_id = self.controller.load_reserved(mission, reservation).await?;
        Ok(PreparedMission {
            attempt_id,
            preflight,
        })
    }

    pub async fn fly_mission(&self) -> Result<()> {
        self.controller.start().await
    }

    pub async fn end_mission(&self) -> Result<()> {
        self.controller.abort().await
    }

    pub async fn land(&self) -> Result<()> {
        tracing::info!("Landing requested");
        self.handles
            .flight_controller
            .start_landing()
            .await
            .map_err(|e| MissionError::Vehicle {
                operation: "start landing",
                reason: e.to_string(),
            })
    }

    pub async fn retry_upload(&self) -> Result<UploadStage> {
        self.controller.retry_upload().await
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        self.controller.snapshot()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<LifecycleNotice> {
        self.controller.subscribe_notices()
    }

    pub async fn wait_until_terminal(&self) -> LifecycleSnapshot {
        self.controller.wait_until_terminal().await
    }
}
