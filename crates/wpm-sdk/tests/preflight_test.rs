//! Preflight configuration tests against the simulated vehicle.

use std::sync::Arc;
use wpm_core::{GeoPoint, MissionError, PreflightSetting};
use wpm_sdk::{
    CameraMode, CommandKind, FocusMode, LensId, MaxRadius, PhotoFileFormat, PreflightConfigurator,
    PreflightSettings, SimConfig, SimulatedVehicle, VehicleCommand,
};

fn configurator(sim: &SimulatedVehicle) -> PreflightConfigurator {
    PreflightConfigurator::new(Arc::new(sim.clone()), Arc::new(sim.clone()))
}

#[tokio::test]
async fn test_default_settings_applied_in_order() {
    let sim = SimulatedVehicle::default();
    let report = configurator(&sim).apply(&PreflightSettings::default()).await;

    assert!(report.is_clean());
    let aircraft = GeoPoint::new(33.6209929, 130.6265251);
    assert_eq!(report.home, Some(aircraft));
    assert_eq!(
        sim.commands(),
        vec![
            VehicleCommand::SetHomeLocation(aircraft),
            VehicleCommand::SetGoHomeHeight(70),
            VehicleCommand::SetMaxRadiusEnabled(true),
            VehicleCommand::SetMaxRadius(1000),
            VehicleCommand::SetMaxHeight(200),
            VehicleCommand::SetFocusMode(FocusMode::Auto),
            VehicleCommand::SetCameraMode(CameraMode::ShootPhoto),
            VehicleCommand::GetPhotoFormat(LensId(0)),
        ]
    );
    assert_eq!(
        report.applied.last(),
        Some(&PreflightSetting::PhotoFormat { lens: 0 })
    );
}

#[tokio::test]
async fn test_disabled_radius_is_never_sent() {
    let sim = SimulatedVehicle::default();
    let home = GeoPoint::new(35.0, 139.0);
    let settings = PreflightSettings {
        home: Some(home),
        max_radius: MaxRadius {
            enabled: false,
            radius_m: 1000,
        },
        ..Default::default()
    };

    let report = configurator(&sim).apply(&settings).await;
    assert!(report.is_clean());

    let commands = sim.commands();
    assert_eq!(sim.count(CommandKind::SetMaxRadius), 0);
    assert!(commands.contains(&VehicleCommand::SetMaxRadiusEnabled(false)));
    assert!(commands.contains(&VehicleCommand::SetHomeLocation(home)));
    assert!(commands.contains(&VehicleCommand::SetMaxHeight(200)));
    assert!(!report.applied.contains(&PreflightSetting::MaxRadius));
}

#[tokio::test]
async fn test_multi_lens_corrects_only_wrong_lens() {
    let sim = SimulatedVehicle::new(SimConfig {
        lens_formats: vec![
            PhotoFileFormat::Jpeg,
            PhotoFileFormat::Raw,
            PhotoFileFormat::Jpeg,
        ],
        camera_name: "Zenmuse H20T".to_string(),
        ..Default::default()
    });

    let report = configurator(&sim).apply(&PreflightSettings::default()).await;
    assert!(report.is_clean());

    let writes: Vec<VehicleCommand> = sim
        .commands()
        .into_iter()
        .filter(|c| c.kind() == CommandKind::SetPhotoFormat)
        .collect();
    assert_eq!(
        writes,
        vec![VehicleCommand::SetPhotoFormat(LensId(1), PhotoFileFormat::Jpeg)]
    );
    assert_eq!(sim.count(CommandKind::GetPhotoFormat), 3);
    assert_eq!(sim.photo_formats(), vec![PhotoFileFormat::Jpeg; 3]);
}

#[tokio::test]
async fn test_failing_setting_does_not_block_the_rest() {
    let sim = SimulatedVehicle::new(SimConfig {
        lens_formats: vec![PhotoFileFormat::Raw, PhotoFileFormat::Raw],
        ..Default::default()
    });
    sim.fail_next(CommandKind::SetGoHomeHeight);
    sim.fail_next(CommandKind::SetPhotoFormat);

    let report = configurator(&sim).apply(&PreflightSettings::default()).await;
    assert!(!report.is_clean());
    assert_eq!(report.failures.len(), 2);
    assert!(matches!(
        report.failures[0],
        MissionError::Preflight {
            setting: PreflightSetting::GoHomeHeight,
            ..
        }
    ));
    assert!(matches!(
        report.failures[1],
        MissionError::Preflight {
            setting: PreflightSetting::PhotoFormat { lens: 0 },
            ..
        }
    ));

    for setting in [
        PreflightSetting::HomeLocation,
        PreflightSetting::MaxRadiusEnabled,
        PreflightSetting::MaxRadius,
        PreflightSetting::MaxHeight,
        PreflightSetting::FocusMode,
        PreflightSetting::CameraMode,
        PreflightSetting::PhotoFormat { lens: 1 },
    ] {
        assert!(report.applied.contains(&setting), "{} not applied", setting);
    }
    assert_eq!(sim.photo_formats(), vec![PhotoFileFormat::Raw, PhotoFileFormat::Jpeg]);
}

#[tokio::test]
async fn test_missing_home_is_reported() {
    let sim = SimulatedVehicle::new(SimConfig {
        aircraft_location: None,
        ..Default::default()
    });
    let settings = PreflightSettings {
        home: Some(GeoPoint::new(0.0, 0.0)),
        ..Default::default()
    };

    let report = configurator(&sim).apply(&settings).await;
    assert_eq!(report.home, None);
    assert_eq!(sim.count(CommandKind::SetHomeLocation), 0);
    assert!(matches!(
        report.failures.as_slice(),
        [MissionError::Preflight {
            setting: PreflightSetting::HomeLocation,
            ..
        }]
    ));
    assert!(report.applied.contains(&PreflightSetting::MaxHeight));
}
