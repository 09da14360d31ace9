//! Vehicle node model
//!
//! A car owns its network address and the handles of the mobility, trip and
//! comm models it drives. Each update event it runs its mobility model, then
//! republishes its position in the node table so neighbour queries see it.

use anyhow::{Context, Result};
use log::{debug, warn};
use rand::Rng;

use super::error::ModelError;
use super::event::{Event, EventKind};
use super::mobility::MobilityEnv;
use super::nodes::NodeState;
use super::params::{ParamKind, ParamReader, ParamSpec};
use super::registry::{InitContext, Model, ModelCategory, ModelType, SimModel};
use super::types::{Address, Coords, ModelHandle, NodeKind, RoadLocation};
use super::world::SimContext;

const ADDRESS: ParamSpec = ParamSpec::new("ADDRESS", ParamKind::Address, "");
const MOBILITY: ParamSpec = ParamSpec::new("MOBILITY", ParamKind::ModelRef, "");
const COMM: ParamSpec = ParamSpec::new("COMM", ParamKind::ModelRef, "");
/// Seconds between position updates
const UPDATE_INTERVAL: ParamSpec =
    ParamSpec::bounded("UPDATE_INTERVAL", ParamKind::Float, "0.1", 0.001, 60.0);
const ACTIVE: ParamSpec = ParamSpec::new("ACTIVE", ParamKind::Boolean, "Y");

pub const CAR_PARAMS: &[ParamSpec] = &[ADDRESS, MOBILITY, COMM, UPDATE_INTERVAL, ACTIVE];

#[derive(Debug, Clone, Default)]
pub struct CarModel {
    address: Address,
    mobility: Option<ModelHandle>,
    trip: Option<ModelHandle>,
    comm: Option<ModelHandle>,
    update_interval: f64,
    /// Inactive cars keep driving but neither hear nor relay messages
    pub active: bool,

    position: Coords,
    speed: f64,
    heading: f64,
    location: Option<RoadLocation>,
    lane: u8,
    pub updates: u64,
}

impl CarModel {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn mobility(&self) -> Option<ModelHandle> {
        self.mobility
    }

    pub fn comm(&self) -> Option<ModelHandle> {
        self.comm
    }

    pub fn position(&self) -> Coords {
        self.position
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn location(&self) -> Option<RoadLocation> {
        self.location
    }

    /// Run the mobility model for one update interval and publish the result
    fn update(&mut self, ctx: &mut SimContext<'_>) -> Result<()> {
        let Some(mobility_handle) = self.mobility else {
            return Ok(());
        };
        let mut mobility_model = ctx
            .registry
            .take(mobility_handle)
            .with_context(|| format!("car {}: mobility model is unavailable", self.address))?;
        let mut trip_model = self.trip.and_then(|handle| ctx.registry.take(handle));

        let report = {
            let nodes = ctx.registry.nodes();
            match mobility_model.as_mobility_mut() {
                Some(mobility) => {
                    let mut env = MobilityEnv {
                        map: &mut *ctx.map,
                        nodes: &nodes,
                        trip: trip_model.as_mut().and_then(Model::as_trip_mut),
                        rng: &mut *ctx.rng,
                        me: self.address,
                    };
                    let report = mobility.advance(&mut env, self.update_interval);
                    self.position = mobility.position();
                    self.speed = mobility.speed();
                    self.heading = mobility.heading();
                    self.location = mobility.location();
                    self.lane = mobility.lane();
                    Some((report, mobility.is_parked()))
                }
                None => None,
            }
        };

        let parked = report.as_ref().is_some_and(|(_, parked)| *parked);
        if let Some((report, _)) = report {
            if report.blocked {
                ctx.stats.vehicles_blocked += 1;
            }
            ctx.stats.trips_completed += u64::from(report.arrivals);
        }
        ctx.registry.restore(mobility_handle, mobility_model);
        if let (Some(handle), Some(trip)) = (self.trip, trip_model) {
            ctx.registry.restore(handle, trip);
        }

        self.updates += 1;
        if let Some(state) = self.node_state(ctx.me) {
            ctx.registry.nodes_mut().update(state);
        }

        if parked {
            debug!("Car {} parked, no further updates", self.address);
        } else {
            let next = ctx.now.after(self.update_interval);
            ctx.schedule_self(next, EventKind::CarUpdate);
        }
        Ok(())
    }
}

impl SimModel for CarModel {
    fn model_type(&self) -> ModelType {
        ModelType::Car
    }

    fn init(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ModelError> {
        let (address, mobility, comm) = {
            let reader = ParamReader::new(ctx.name, ctx.params);
            reader.warn_unknown(CAR_PARAMS);
            self.update_interval = reader.float(&UPDATE_INTERVAL)?;
            self.active = reader.boolean(&ACTIVE);
            (
                reader.address(&ADDRESS)?,
                reader.model_ref(&MOBILITY),
                reader.model_ref(&COMM),
            )
        };
        self.address = address.ok_or_else(|| ModelError::UnparseableAddress(String::new()))?;

        let mobility = mobility.ok_or_else(|| ModelError::MissingDependency(MOBILITY.key.to_string()))?;
        let mobility = ctx.require(&mobility, ModelCategory::Mobility)?;
        self.mobility = Some(mobility);
        self.comm = comm
            .map(|name| ctx.require(&name, ModelCategory::Comm))
            .transpose()?;

        let model = ctx
            .registry
            .get(mobility)
            .and_then(Model::as_mobility)
            .ok_or_else(|| ModelError::InitFailed {
                name: ctx.name.to_string(),
                reason: "mobility model is not available".to_string(),
            })?;
        self.trip = model.trip_handle();
        self.position = model.position();
        self.speed = model.speed();
        self.heading = model.heading();
        self.location = model.location();
        self.lane = model.lane();
        Ok(())
    }

    fn pre_run(&mut self, ctx: &mut SimContext<'_>) -> Result<()> {
        let first = ctx.now.after(ctx.rng.random_range(0.0..self.update_interval));
        ctx.schedule_self(first, EventKind::CarUpdate);
        Ok(())
    }

    fn process_event(&mut self, ctx: &mut SimContext<'_>, event: Event) -> Result<()> {
        match event.kind {
            EventKind::CarUpdate => self.update(ctx)?,
            other => warn!("Car {} ignoring unexpected event {}", self.address, other),
        }
        Ok(())
    }

    fn post_run(&mut self, _ctx: &mut SimContext<'_>) -> Result<()> {
        debug!(
            "Car {}: {} updates, ended at {} ({:.1} mph)",
            self.address, self.updates, self.position, self.speed
        );
        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut SimContext<'_>) {
        ctx.registry.nodes_mut().remove(self.address);
    }

    fn node_state(&self, handle: ModelHandle) -> Option<NodeState> {
        Some(NodeState {
            address: self.address,
            kind: NodeKind::Car,
            handle,
            comm: self.comm,
            position: self.position,
            speed: self.speed,
            heading: self.heading,
            location: self.location,
            lane: self.lane,
            active: self.active,
        })
    }
}
