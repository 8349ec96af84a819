//! Validate a mission plan and print the assembled mission as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use wpm_core::{spatial::route_length_m, MissionError, MissionPlan};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Mission plan JSON file
    #[arg(long)]
    plan: PathBuf,

    /// Pretty-print the mission
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let json = std::fs::read_to_string(&args.plan)
        .with_context(|| format!("failed to read {}", args.plan.display()))?;
    let plan = MissionPlan::from_json(&json)
        .with_context(|| format!("failed to parse {}", args.plan.display()))?;

    let mission = match plan.assemble() {
        Ok(mission) => mission,
        Err(MissionError::Validation(err)) => {
            eprintln!("Mission rejected: {}", err);
            for violation in err.violations() {
                eprintln!("  - {}", violation);
            }
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e).context("failed to build mission"),
    };

    eprintln!(
        "Mission {}: {} waypoints, {} actions, {:.0} m per pass, {} pass(es)",
        mission.mission_id,
        mission.waypoint_count(),
        mission.action_count(),
        route_length_m(&mission.waypoints),
        mission.parameters.repeat_times,
    );

    let output = if args.pretty {
        serde_json::to_string_pretty(&mission)?
    } else {
        serde_json::to_string(&mission)?
    };
    println!("{}", output);

    Ok(ExitCode::SUCCESS)
}
