//! Fly a mission plan against the simulated vehicle.
//!
//! Runs preflight, uploads the mission and its actions, flies it and logs
//! every lifecycle notice. Preflight settings come from `WPM_*` variables.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wpm_cli::Config;
use wpm_core::{LifecycleState, MissionOutcome, MissionPlan};
use wpm_sdk::{
    LifecycleNotice, MissionControl, NoticeKind, SimConfig, SimulatedVehicle, VehicleHandles,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Mission plan JSON file (defaults to the built-in two-waypoint sample)
    #[arg(long)]
    plan: Option<PathBuf>,

    /// Simulated time per flight step in milliseconds
    #[arg(long, default_value_t = 200)]
    step_ms: u64,

    /// End the mission once this waypoint has been reached
    #[arg(long)]
    abort_after_waypoint: Option<usize>,

    /// Land after the mission ends
    #[arg(long)]
    land: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wpm_sdk=info".parse()?)
                .add_directive("fly_mission=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env();

    let plan = match &args.plan {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            MissionPlan::from_json(&json)?
        }
        None => MissionPlan::sample(),
    };
    let mission = plan.assemble().context("mission plan rejected")?;

    let vehicle = Arc::new(SimulatedVehicle::new(SimConfig {
        step_delay: Duration::from_millis(args.step_ms),
        ..Default::default()
    }));
    let control = MissionControl::new(
        VehicleHandles::from_vehicle(vehicle.clone()),
        config.preflight_settings(),
    );

    let notices = control.subscribe_notices();
    let watcher = tokio::spawn(watch_notices(notices, control.clone(), args.abort_after_waypoint));

    let prepared = control.prepare_mission(mission).await?;
    for failure in &prepared.preflight.failures {
        tracing::warn!(error = %failure, "Preflight");
    }
    tracing::info!(attempt_id = %prepared.attempt_id, "Mission prepared");

    let mut snapshots = control.controller().watch_snapshot();
    let ready = snapshots
        .wait_for(|s| s.state == LifecycleState::ReadyToExecute || !s.state.is_active())
        .await?
        .state;
    if ready != LifecycleState::ReadyToExecute {
        bail!("mission never became ready (state: {})", ready);
    }

    control.fly_mission().await?;
    let finished = control.wait_until_terminal().await;
    watcher.abort();

    if args.land {
        control.land().await?;
    }

    match finished.status.outcome {
        Some(MissionOutcome::Completed) => {
            tracing::info!(arrivals = finished.status.arrivals, "Mission completed");
            Ok(())
        }
        Some(MissionOutcome::Aborted) => {
            tracing::info!("Mission aborted");
            Ok(())
        }
        Some(MissionOutcome::Failed(reason)) => bail!("mission failed: {}", reason),
        None => bail!("mission ended in state {}", finished.state),
    }
}

async fn watch_notices(
    mut notices: tokio::sync::broadcast::Receiver<LifecycleNotice>,
    control: MissionControl,
    abort_after: Option<usize>,
) {
    loop {
        let notice = match notices.recv().await {
            Ok(notice) => notice,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Notice stream lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match notice.kind {
            NoticeKind::StateChanged { from, to } => {
                tracing::info!(attempt_id = %notice.attempt_id, %from, %to, "State changed");
            }
            NoticeKind::ActionUpload(progress) => {
                tracing::debug!(
                    total = progress.total_action_count,
                    last = ?progress.last_uploaded_action_index,
                    "Action upload"
                );
            }
            NoticeKind::Progress {
                target_waypoint,
                reached,
            } => {
                tracing::info!(waypoint = target_waypoint, reached, "Progress");
                if reached && abort_after == Some(target_waypoint) {
                    tracing::info!(waypoint = target_waypoint, "Ending mission early");
                    if let Err(e) = control.end_mission().await {
                        tracing::error!(error = %e, "Failed to end mission");
                    }
                }
            }
            NoticeKind::MediaFile(file) => {
                tracing::info!(file = %file.file_name, waypoint = ?file.waypoint, "New media file");
            }
            NoticeKind::Error(e) => tracing::warn!(error = %e, "Mission error"),
            NoticeKind::Finished(outcome) => {
                tracing::info!(?outcome, at = %notice.at, "Mission over");
            }
        }
    }
}
