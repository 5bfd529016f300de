//! Rally vehicle core CLI.
//!
//! - `headless`: drive the vehicle on a generated planet and print a summary
//! - `info`: print the resolved configuration as TOML

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use bevy::log::LogPlugin;
use bevy::prelude::*;
use clap::{Parser, Subcommand};

use rally_core::prelude::*;
use rally_physics::terrain::TerrainMesh;
use rally_sim::prelude::*;

/// Planet tessellation. An odd ring count keeps a vertex row off the equator.
const PLANET_RINGS: u32 = 63;
const PLANET_SEGMENTS: u32 = 128;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Rally vehicle dynamics and recovery core.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// TOML configuration file. Defaults are used for missing values.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the vehicle headless and print statistics.
    Headless {
        /// Simulated seconds to run.
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,

        /// Random seed (overrides the configuration).
        #[arg(short, long)]
        seed: Option<u64>,

        /// Constant throttle input in [-1, 1].
        #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
        throttle: f32,

        /// Constant steering input in [-1, 1].
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        steer: f32,

        /// Planet radius in metres.
        #[arg(long, default_value_t = 50.0)]
        radius: f32,

        /// Frame rate the loop is driven at.
        #[arg(long, default_value_t = 60.0)]
        fps: f64,
    },

    /// Print the resolved configuration.
    Info,
}

// ---------------------------------------------------------------------------
// Mode implementations
// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<RallyConfig, RallyError> {
    Ok(match path {
        Some(path) => RallyConfig::from_file(path)?,
        None => RallyConfig::default(),
    })
}

struct HeadlessRun {
    seconds: f64,
    throttle: f32,
    steer: f32,
    radius: f32,
    fps: f64,
}

fn run_headless(config: RallyConfig, run: &HeadlessRun) -> Result<(), RallyError> {
    // The plugin only logs a bad config; fail loudly here instead.
    config.validate()?;
    let planet = Arc::new(TerrainMesh::uv_sphere(
        run.radius,
        PLANET_RINGS,
        PLANET_SEGMENTS,
    )?);

    let mut app = App::new();
    app.add_plugins(LogPlugin::default())
        .add_plugins(RallySimPlugin::new(config));
    app.finish();
    app.cleanup();

    let spawn = app
        .world_mut()
        .resource_mut::<Game>()
        .load_terrain(planet)?;
    println!(
        "spawned at ({:.2}, {:.2}, {:.2})",
        spawn.translation.x, spawn.translation.y, spawn.translation.z
    );
    app.world_mut()
        .resource_mut::<DriveInput>()
        .set(run.throttle, run.steer);

    let frame = Duration::from_secs_f64(1.0 / run.fps.max(1.0));
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let frames = (run.seconds.max(0.0) * run.fps.max(1.0)).ceil() as u64;
    for _ in 0..frames {
        app.world_mut().resource_mut::<Time>().advance_by(frame);
        app.update();
    }

    let game = app.world().resource::<Game>();
    let stats = game.stats();
    let chassis = game.rig().chassis_pose();
    let published = app.world().resource::<LatestSnapshot>().published;
    println!("sim time:   {}", game.time());
    println!("steps:      {}", stats.steps);
    println!("distance:   {:.2} m", stats.distance);
    println!("altitude:   {:.2} m", chassis.translation.norm());
    println!("recoveries: {}", stats.recoveries);
    println!("respawns:   {}", stats.respawns);
    println!("snapshots:  {} produced, {published} published", stats.snapshots);
    Ok(())
}

fn run_info(config: &RallyConfig) -> Result<(), RallyError> {
    println!("rally v{}", env!("CARGO_PKG_VERSION"));
    println!();
    print!("{}", config.to_toml_string()?);
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = load_config(cli.config.as_deref()).and_then(|mut config| match cli.command {
        Some(Commands::Headless {
            seconds,
            seed,
            throttle,
            steer,
            radius,
            fps,
        }) => {
            if let Some(seed) = seed {
                config.seed = seed;
            }
            run_headless(
                config,
                &HeadlessRun {
                    seconds,
                    throttle,
                    steer,
                    radius,
                    fps,
                },
            )
        }
        Some(Commands::Info) => run_info(&config),
        None => run_headless(
            config,
            &HeadlessRun {
                seconds: 10.0,
                throttle: 1.0,
                steer: 0.0,
                radius: 50.0,
                fps: 60.0,
            },
        ),
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
