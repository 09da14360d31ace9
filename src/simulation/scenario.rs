//! Ready-made scenarios on a street grid
//!
//! Used by the headless binary and by tests that need a populated world.

use anyhow::{Context, Result};
use log::info;

use super::comm::CommKind;
use super::mobility::MobilityKind;
use super::params::ModelParams;
use super::registry::{ModelSpec, ModelType};
use super::road_network::RoadNetwork;
use super::types::{Address, Coords};
use super::world::SimWorld;

/// First car address, 10.0.0.1
const CAR_ADDRESS_BASE: u32 = 0x0A00_0001;
/// First infrastructure address, 10.1.0.1
const INFRASTRUCTURE_ADDRESS_BASE: u32 = 0x0A01_0001;

#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub grid_rows: usize,
    pub grid_cols: usize,
    /// Degrees between neighbouring grid vertices
    pub spacing_degrees: f64,
    pub origin: Coords,
    pub cars: usize,
    pub infrastructure: usize,
    /// The first `gateways` cars also reach every infrastructure node
    pub gateways: usize,
    /// The first `originators` cars generate safety messages periodically
    pub originators: usize,
    /// Seconds between generated messages
    pub message_interval: f64,
    pub protocol: CommKind,
    pub mobility: MobilityKind,
    pub traffic_lights: bool,
    /// Applied to every comm model on top of its defaults
    pub comm_params: ModelParams,
    pub seed: Option<u64>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            grid_rows: 5,
            grid_cols: 5,
            spacing_degrees: 0.003,
            origin: Coords::from_degrees(40.44, -79.99),
            cars: 20,
            infrastructure: 2,
            gateways: 0,
            originators: 1,
            message_interval: 5.0,
            protocol: CommKind::Groove,
            mobility: MobilityKind::RandomWalk,
            traffic_lights: true,
            comm_params: ModelParams::new(),
            seed: None,
        }
    }
}

fn comm_type(kind: CommKind) -> ModelType {
    match kind {
        CommKind::Simple => ModelType::SimpleComm,
        CommKind::Adaptive => ModelType::AdaptiveComm,
        CommKind::Groove => ModelType::GrooveComm,
    }
}

fn mobility_type(kind: MobilityKind) -> ModelType {
    match kind {
        MobilityKind::RandomWalk => ModelType::RandomWalkMobility,
        MobilityKind::Trip => ModelType::TripMobility,
        MobilityKind::CarFollowing => ModelType::CarFollowingMobility,
        MobilityKind::Gps => ModelType::GpsMobility,
    }
}

/// Model specs for one car with its mobility, trip and comm models
fn car_specs(config: &ScenarioConfig, index: usize) -> Vec<ModelSpec> {
    let mut comm = ModelSpec::new(format!("comm{}", index), comm_type(config.protocol))
        .params(&config.comm_params);
    if index < config.gateways {
        comm = comm.param("GATEWAY", "Y");
    }
    if index < config.originators {
        comm = comm.param("MESSAGE_INTERVAL", config.message_interval.to_string());
    }

    let mut mobility = ModelSpec::new(format!("mob{}", index), mobility_type(config.mobility));
    let mut specs = Vec::with_capacity(4);
    if matches!(config.mobility, MobilityKind::Trip | MobilityKind::CarFollowing) {
        let trip = format!("trip{}", index);
        mobility = mobility.param("TRIP", trip.clone());
        specs.push(ModelSpec::new(trip, ModelType::RandomWaypointTrip));
    }

    let address = Address(CAR_ADDRESS_BASE + index as u32);
    specs.push(
        ModelSpec::new(format!("car{}", index), ModelType::Car)
            .param("ADDRESS", address.to_string())
            .param("MOBILITY", format!("mob{}", index))
            .param("COMM", format!("comm{}", index)),
    );
    specs.push(mobility);
    specs.push(comm);
    specs
}

/// Build a street grid and populate it per `config`
pub fn build_scenario(config: &ScenarioConfig) -> Result<SimWorld> {
    let map = RoadNetwork::grid(
        config.grid_rows,
        config.grid_cols,
        config.spacing_degrees,
        config.origin,
    )
    .context("building the street grid")?;
    let vertices: Vec<Coords> = map.vertices().iter().map(|vertex| vertex.position).collect();

    let mut world = match config.seed {
        Some(seed) => SimWorld::new_with_seed(map, seed),
        None => SimWorld::new(map),
    };

    let mut specs = Vec::new();
    if config.traffic_lights {
        specs.push(ModelSpec::new("lights", ModelType::TrafficLights));
    }
    for index in 0..config.cars {
        specs.extend(car_specs(config, index));
    }

    // Roadside units spread evenly over the grid vertices
    for index in 0..config.infrastructure {
        let vertex = vertices[index * vertices.len() / config.infrastructure];
        let address = Address(INFRASTRUCTURE_ADDRESS_BASE + index as u32);
        specs.push(
            ModelSpec::new(format!("rsu{}", index), ModelType::Infrastructure)
                .param("ADDRESS", address.to_string())
                .param(
                    "LOCATION",
                    format!("{:.6}, {:.6}", vertex.lat_degrees(), vertex.lon_degrees()),
                )
                .param("COMM", format!("rsu_comm{}", index)),
        );
        specs.push(
            ModelSpec::new(format!("rsu_comm{}", index), comm_type(config.protocol))
                .params(&config.comm_params),
        );
    }

    world
        .add_models(specs)
        .context("adding scenario models")?;
    info!(
        "Scenario ready: {} cars, {} infrastructure nodes on a {}x{} grid",
        config.cars, config.infrastructure, config.grid_rows, config.grid_cols
    );
    Ok(world)
}
