#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs a headless Quarry Rig site.

mod report;
mod scenario;
mod snapshot_transfer;

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use quarry_rig_core::{Command, EnvelopeSize, RigId, RigTuning};
use quarry_rig_world::{self as world, query};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{report::Tally, scenario::ScenarioSpec};

/// Runs a seeded excavation scenario and reports what every rig did.
#[derive(Debug, Parser)]
#[command(name = "quarry-rig", version, about)]
struct CliArgs {
    /// TOML file overriding the default tuning.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Number of rigs placed side by side.
    #[arg(long, default_value_t = 4)]
    rigs: u32,
    /// Envelope extent perpendicular to the facing.
    #[arg(long, default_value_t = 7)]
    width: u32,
    /// Envelope extent along the facing.
    #[arg(long, default_value_t = 7)]
    length: u32,
    /// Envelope height including floor and ceiling.
    #[arg(long, default_value_t = 10)]
    height: u32,
    /// Number of layers each rig excavates.
    #[arg(long, default_value_t = 3)]
    layers: u32,
    /// Maximum number of steps to simulate.
    #[arg(long, default_value_t = 20_000)]
    steps: u64,
    /// Seed for terrain generation.
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Probability that an envelope cell above the floor holds an obstacle.
    #[arg(long, default_value_t = 0.04)]
    obstacle_density: f64,
    /// Simulated wall-clock duration of every step, in microseconds.
    #[arg(long, default_value_t = 25_000)]
    step_micros: u64,
    /// Energy each rig's battery gains per step.
    #[arg(long, default_value_t = 40.0)]
    recharge: f64,
    /// Give each rig a hopper of this capacity instead of ejecting output.
    #[arg(long, value_name = "RECORDS")]
    hopper: Option<usize>,
    /// Write the JSON report to this file instead of stdout.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
    /// Print the transfer string of this rig after the run.
    #[arg(long, value_name = "RIG")]
    snapshot: Option<u32>,
    /// Decode a rig transfer string, print its summary and exit.
    #[arg(long, value_name = "STRING", conflicts_with = "snapshot")]
    inspect: Option<String>,
}

/// Entry point for the Quarry Rig command-line interface.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    if let Some(value) = args.inspect.as_deref() {
        return inspect(value);
    }

    let tuning = load_tuning(args.config.as_deref())?;
    let spec = ScenarioSpec {
        rigs: args.rigs,
        size: EnvelopeSize::new(args.width, args.length, args.height),
        layers: args.layers,
        seed: args.seed,
        obstacle_density: args.obstacle_density,
        recharge: args.recharge,
        hopper: args.hopper,
    };
    let (mut world, placed) = scenario::build(&spec, tuning);

    let mut tally = Tally::default();
    tally.record(&placed);

    let measured = Duration::from_micros(args.step_micros);
    let mut events = Vec::new();
    for _ in 0..args.steps {
        events.clear();
        world::apply(&mut world, Command::Step { measured }, &mut events);
        tally.record(&events);
        if tally.all_finished() {
            break;
        }
    }
    if !tally.all_finished() {
        warn!(steps = args.steps, "step limit reached before every rig finished");
    }
    info!(steps = query::step_index(&world), "run complete");

    if let Some(rig) = args.snapshot {
        let rig = RigId::new(rig);
        let state = query::rig(&world, rig).with_context(|| format!("{rig} is not active"))?;
        let encoded = snapshot_transfer::encode(state).context("failed to encode rig snapshot")?;
        println!("{encoded}");
    }

    let report = tally.into_report(args.seed, query::rig_view(&world));
    let json = serde_json::to_string_pretty(&report).context("failed to serialise report")?;
    match args.report {
        Some(path) => {
            fs::write(&path, json)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn load_tuning(path: Option<&Path>) -> Result<RigTuning> {
    let Some(path) = path else {
        return Ok(RigTuning::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let tuning = toml::from_str(&text)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    info!(path = %path.display(), "tuning loaded");
    Ok(tuning)
}

fn inspect(value: &str) -> Result<()> {
    let rig = snapshot_transfer::decode(value).context("failed to decode rig snapshot")?;
    let placement = rig.placement();
    println!("{}", rig.id());
    println!("  anchor {:?} facing {:?}", placement.anchor, placement.facing);
    println!("  bounds {:?} .. {:?}", rig.bounds().min(), rig.bounds().max());
    println!(
        "  layer {} ({:?}), lowest {}",
        rig.mining().layer_y(),
        rig.mining().phase(),
        rig.mining().lowest_layer_y()
    );
    println!(
        "  movement {:?} at {:?}, target {:?}",
        rig.gantry().state().kind(),
        rig.gantry().position(),
        rig.gantry().target()
    );
    println!(
        "  speed {:.3}, queued {}, powered {}",
        rig.speed().current(),
        rig.output().len(),
        rig.is_powered()
    );
    Ok(())
}
