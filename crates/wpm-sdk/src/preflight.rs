//! Preflight configuration.
//!
//! Applies flight safety limits and camera capture settings before a mission
//! is loaded. Settings are independent: a failure is recorded in the report
//! and the remaining settings are still attempted.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use wpm_core::{GeoPoint, MissionError, OperationalLimits, PreflightSetting};

use crate::vehicle::{
    Camera, CameraMode, FlightController, FocusMode, PhotoFileFormat, VehicleError,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaxRadius {
    pub enabled: bool,
    pub radius_m: u32,
}

/// Settings applied before every mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreflightSettings {
    /// Home point; falls back to the aircraft's location when absent or 0/0
    pub home: Option<GeoPoint>,
    pub go_home_height_m: u32,
    pub max_radius: MaxRadius,
    pub max_height_m: u32,
    /// Format every camera lens must capture in
    pub photo_format: PhotoFileFormat,
}

impl Default for PreflightSettings {
    fn default() -> Self {
        Self {
            home: None,
            go_home_height_m: 70,
            max_radius: MaxRadius {
                enabled: true,
                radius_m: 1000,
            },
            max_height_m: 200,
            photo_format: PhotoFileFormat::Jpeg,
        }
    }
}

impl PreflightSettings {
    /// Geofence implied by these settings. Needs a valid configured home.
    pub fn limits(&self) -> Option<OperationalLimits> {
        let home = self.home.filter(GeoPoint::is_valid)?;
        Some(OperationalLimits {
            home,
            max_radius_m: self
                .max_radius
                .enabled
                .then_some(self.max_radius.radius_m as f64),
            max_height_m: self.max_height_m as f64,
        })
    }
}

/// What a preflight run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreflightReport {
    pub applied: Vec<PreflightSetting>,
    pub failures: Vec<MissionError>,
    /// Home point actually sent to the aircraft
    pub home: Option<GeoPoint>,
}

impl PreflightReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, setting: PreflightSetting, result: Result<(), VehicleError>) {
        match result {
            Ok(()) => {
                tracing::debug!(%setting, "Preflight setting applied");
                self.applied.push(setting);
            }
            Err(e) => self.fail(setting, e.to_string()),
        }
    }

    fn fail(&mut self, setting: PreflightSetting, reason: String) {
        tracing::warn!(%setting, reason = %reason, "Preflight setting failed");
        self.failures.push(MissionError::Preflight { setting, reason });
    }
}

/// Applies [`PreflightSettings`] to the aircraft.
#[derive(Clone)]
pub struct PreflightConfigurator {
    flight_controller: Arc<dyn FlightController>,
    camera: Arc<dyn Camera>,
}

impl PreflightConfigurator {
    pub fn new(flight_controller: Arc<dyn FlightController>, camera: Arc<dyn Camera>) -> Self {
        Self {
            flight_controller,
            camera,
        }
    }

    /// Apply every setting in order and report the outcome of each.
    pub async fn apply(&self, settings: &PreflightSettings) -> PreflightReport {
        let mut report = PreflightReport::default();
        let fc = &self.flight_controller;

        match self.resolve_home(settings.home).await {
            Ok(home) => {
                let result = fc.set_home_location(home).await;
                if result.is_ok() {
                    report.home = Some(home);
                }
                report.record(PreflightSetting::HomeLocation, result);
            }
            Err(reason) => report.fail(PreflightSetting::HomeLocation, reason),
        }

        report.record(
            PreflightSetting::GoHomeHeight,
            fc.set_go_home_height(settings.go_home_height_m).await,
        );

        let radius = settings.max_radius;
        report.record(
            PreflightSetting::MaxRadiusEnabled,
            fc.set_max_flight_radius_enabled(radius.enabled).await,
        );
        if radius.enabled {
            report.record(
                PreflightSetting::MaxRadius,
                fc.set_max_flight_radius(radius.radius_m).await,
            );
        }

        report.record(
            PreflightSetting::MaxHeight,
            fc.set_max_flight_height(settings.max_height_m).await,
        );

        self.configure_camera(settings.photo_format, &mut report).await;

        tracing::info!(
            applied = report.applied.len(),
            failed = report.failures.len(),
            camera = %self.camera.display_name(),
            "Preflight complete"
        );
        report
    }

    async fn resolve_home(&self, configured: Option<GeoPoint>) -> Result<GeoPoint, String> {
        if let Some(home) = configured.filter(GeoPoint::is_valid) {
            return Ok(home);
        }
        match self.flight_controller.aircraft_location().await {
            Ok(Some(location)) if location.is_valid() => {
                tracing::info!(%location, "Using aircraft location as home");
                Ok(location)
            }
            Ok(_) => Err("no valid home configured and aircraft has no location".to_string()),
            Err(e) => Err(format!("no valid home configured and location query failed: {}", e)),
        }
    }

    async fn configure_camera(&self, format: PhotoFileFormat, report: &mut PreflightReport) {
        let camera = &self.camera;

        report.record(
            PreflightSetting::FocusMode,
            camera.set_focus_mode(FocusMode::Auto).await,
        );
        report.record(
            PreflightSetting::CameraMode,
            camera.set_mode(CameraMode::ShootPhoto).await,
        );

        let lenses = camera.lenses();
        if lenses.is_empty() {
            report.fail(
                PreflightSetting::PhotoFormat { lens: 0 },
                "camera reports no lenses".to_string(),
            );
            return;
        }

        for lens in lenses {
            let setting = PreflightSetting::PhotoFormat { lens: lens.0 };
            match camera.photo_file_format(lens).await {
                Ok(current) if current == format => report.applied.push(setting),
                Ok(current) => {
                    tracing::info!(lens = lens.0, from = %current, to = %format, "Correcting photo format");
                    report.record(setting, camera.set_photo_file_format(lens, format).await);
                }
                Err(e) => report.fail(setting, format!("could not read format: {}", e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings() {
        let settings = PreflightSettings::default();
        assert_eq!(settings.go_home_height_m, 70);
        assert!(settings.max_radius.enabled);
        assert_eq!(settings.max_radius.radius_m, 1000);
        assert_eq!(settings.max_height_m, 200);
        assert_eq!(settings.photo_format, PhotoFileFormat::Jpeg);
    }

    #[test]
    fn limits_require_valid_home() {
        let mut settings = PreflightSettings::default();
        assert!(settings.limits().is_none());

        settings.home = Some(GeoPoint::new(0.0, 0.0));
        assert!(settings.limits().is_none());

        settings.home = Some(GeoPoint::new(33.6209929, 130.6265251));
        let limits = settings.limits().unwrap();
        assert_eq!(limits.max_radius_m, Some(1000.0));
        assert_eq!(limits.max_height_m, 200.0);

        settings.max_radius.enabled = false;
        assert_eq!(settings.limits().unwrap().max_radius_m, None);
    }
}
