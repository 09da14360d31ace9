use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use env_logger::Env;
use log::info;

use vanet_sim::simulation::{build_scenario, CommKind, MobilityKind, ModelParams, ScenarioConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Protocol {
    Simple,
    Adaptive,
    Groove,
}

impl From<Protocol> for CommKind {
    fn from(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Simple => CommKind::Simple,
            Protocol::Adaptive => CommKind::Adaptive,
            Protocol::Groove => CommKind::Groove,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mobility {
    RandomWalk,
    Trip,
    CarFollowing,
}

impl From<Mobility> for MobilityKind {
    fn from(mobility: Mobility) -> Self {
        match mobility {
            Mobility::RandomWalk => MobilityKind::RandomWalk,
            Mobility::Trip => MobilityKind::Trip,
            Mobility::CarFollowing => MobilityKind::CarFollowing,
        }
    }
}

#[derive(Parser)]
#[command(name = "vanet_sim")]
#[command(about = "Vehicular network flooding simulation on a street grid")]
struct Cli {
    /// Simulated seconds to run
    #[arg(long, default_value = "60")]
    duration: f64,

    /// Seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Number of cars
    #[arg(long, default_value = "20")]
    cars: usize,

    /// Vertices per side of the street grid
    #[arg(long, default_value = "5")]
    grid: usize,

    /// Rebroadcast protocol used by every node
    #[arg(long, value_enum, default_value = "groove")]
    protocol: Protocol,

    /// How cars pick their way through the grid
    #[arg(long, value_enum, default_value = "random-walk")]
    mobility: Mobility,

    /// Suppress rebroadcasts already covered from farther away
    #[arg(long)]
    location_suppression: bool,

    /// Use a short fixed window for the first rebroadcast
    #[arg(long)]
    fast_first_hop: bool,

    /// Cars that also reach every infrastructure node
    #[arg(long, default_value = "0")]
    gateways: usize,

    /// Roadside infrastructure nodes
    #[arg(long, default_value = "2")]
    infrastructure: usize,

    /// Cars that originate safety messages
    #[arg(long, default_value = "1")]
    originators: usize,

    /// Seconds between originated messages
    #[arg(long, default_value = "5")]
    message_interval: f64,

    /// Run without traffic lights
    #[arg(long)]
    no_lights: bool,

    /// Extra comm model parameter, KEY=VALUE (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Print a summary every this many simulated seconds
    #[arg(long, default_value = "10")]
    report_interval: f64,
}

fn comm_params(cli: &Cli) -> Result<ModelParams> {
    let mut params = ModelParams::new();
    if cli.location_suppression {
        params.set("LOCATION_SUPPRESSION", "Y");
    }
    if cli.fast_first_hop {
        params.set("FAST_FIRST_HOP", "Y");
    }
    for pair in &cli.params {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Expected KEY=VALUE, got '{}'", pair);
        };
        params.set(key, value.trim());
    }
    Ok(params)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if cli.duration <= 0.0 || cli.report_interval <= 0.0 {
        bail!("Duration and report interval must be positive");
    }

    let config = ScenarioConfig {
        grid_rows: cli.grid,
        grid_cols: cli.grid,
        cars: cli.cars,
        infrastructure: cli.infrastructure,
        gateways: cli.gateways,
        originators: cli.originators,
        message_interval: cli.message_interval,
        protocol: cli.protocol.into(),
        mobility: cli.mobility.into(),
        traffic_lights: !cli.no_lights,
        comm_params: comm_params(&cli)?,
        seed: cli.seed,
        ..ScenarioConfig::default()
    };
    run_headless(&config, cli.duration, cli.report_interval)
}

/// Run the simulation in headless mode (no graphics)
fn run_headless(config: &ScenarioConfig, duration: f64, report_interval: f64) -> Result<()> {
    println!("Running VANET simulation in headless mode...");
    println!(
        "Duration: {}s, Cars: {}, Protocol: {:?}, Mobility: {:?}",
        duration, config.cars, config.protocol, config.mobility
    );
    println!();

    let mut world = build_scenario(config).context("building the scenario")?;
    world.start();

    println!("Initial state:");
    world.print_summary();
    println!();

    let mut elapsed = 0.0;
    while elapsed < duration {
        let step = report_interval.min(duration - elapsed);
        let dispatched = world.run_for_secs(step);
        elapsed += step;
        info!("Dispatched {} events up to {}", dispatched, world.now());

        println!("--- After {:.1}s simulated time ---", elapsed);
        world.print_summary();
        println!();
    }

    world.finish();
    println!("=== Final State ===");
    world.print_summary();
    Ok(())
}
