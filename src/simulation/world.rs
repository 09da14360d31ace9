//! Main simulation world that ties everything together
//!
//! The world owns the road map, the model registry and the event queue.
//! Dispatch is single threaded: the earliest event is popped, its model is
//! checked out of the registry, handed a [`SimContext`] and put back.

use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;

use super::error::ModelError;
use super::event::{Event, EventKind};
use super::gps::GpsFeed;
use super::packet::SequenceId;
use super::registry::{Model, ModelRegistry, ModelSpec, SimModel};
use super::road_network::RoadNetwork;
use super::scheduler::EventScheduler;
use super::stats::SimStats;
use super::types::{Address, ModelHandle, NodeKind, SimTime};

/// Everything a model may touch while it handles one call
pub struct SimContext<'a> {
    /// Handle of the model being called
    pub me: ModelHandle,
    pub now: SimTime,
    pub scheduler: &'a mut EventScheduler,
    pub registry: &'a mut ModelRegistry,
    pub map: &'a mut RoadNetwork,
    pub rng: &'a mut StdRng,
    pub stats: &'a mut SimStats,
}

impl SimContext<'_> {
    pub fn schedule(&mut self, event: Event) {
        self.scheduler.add_event(event);
    }

    /// Schedule `kind` for `dest`, sent by the current model
    pub fn schedule_at(&mut self, at: SimTime, dest: ModelHandle, kind: EventKind) {
        let event = Event::new(at, dest, kind).from_model(self.me);
        self.schedule(event);
    }

    pub fn schedule_self(&mut self, at: SimTime, kind: EventKind) {
        self.schedule_at(at, self.me, kind);
    }
}

/// The main simulation world
pub struct SimWorld {
    /// Road map for routing and positions
    pub road_network: RoadNetwork,

    /// Every model, by handle and name
    pub registry: ModelRegistry,

    scheduler: EventScheduler,

    rng: StdRng,

    /// Run-wide counters
    pub stats: SimStats,

    started: bool,

    finished: bool,
}

impl SimWorld {
    fn new_internal(road_network: RoadNetwork, rng: StdRng) -> Self {
        Self {
            road_network,
            registry: ModelRegistry::new(),
            scheduler: EventScheduler::new(),
            rng,
            stats: SimStats::new(),
            started: false,
            finished: false,
        }
    }

    pub fn new(road_network: RoadNetwork) -> Self {
        Self::new_internal(road_network, StdRng::from_rng(&mut rand::rng()))
    }

    /// Create a new SimWorld with a seeded RNG for reproducible simulations
    pub fn new_with_seed(road_network: RoadNetwork, seed: u64) -> Self {
        Self::new_internal(road_network, StdRng::seed_from_u64(seed))
    }

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    pub fn pending_events(&self) -> usize {
        self.scheduler.len()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Check `handle` out, run `f` on it with a context, and put it back
    ///
    /// None if the handle is stale or the model is already checked out.
    fn with_model<R>(
        &mut self,
        handle: ModelHandle,
        f: impl FnOnce(&mut Model, &mut SimContext<'_>) -> R,
    ) -> Option<R> {
        let mut model = self.registry.take(handle)?;
        let result = {
            let mut ctx = SimContext {
                me: handle,
                now: self.scheduler.now(),
                scheduler: &mut self.scheduler,
                registry: &mut self.registry,
                map: &mut self.road_network,
                rng: &mut self.rng,
                stats: &mut self.stats,
            };
            f(&mut model, &mut ctx)
        };
        self.registry.restore(handle, model);
        Some(result)
    }

    fn model_label(&self, handle: ModelHandle) -> String {
        self.registry
            .name_of(handle)
            .map_or_else(|| format!("{:?}", handle), str::to_string)
    }

    pub fn add_model(&mut self, spec: ModelSpec) -> Result<ModelHandle, ModelError> {
        let name = spec.name.clone();
        self.add_models(vec![spec])?
            .pop()
            .ok_or(ModelError::NotFound(name))
    }

    /// Add a batch of models; once the run has started they are pre-run
    /// straight away, dependencies first
    pub fn add_models(&mut self, specs: Vec<ModelSpec>) -> Result<Vec<ModelHandle>, ModelError> {
        let handles = self
            .registry
            .add_models(specs, &self.road_network, &mut self.rng)?;
        if self.started {
            let added: HashSet<ModelHandle> = handles.iter().copied().collect();
            let order: Vec<ModelHandle> = self
                .registry
                .dependency_order()
                .into_iter()
                .filter(|handle| added.contains(handle))
                .collect();
            for handle in order {
                self.pre_run_model(handle);
            }
        }
        Ok(handles)
    }

    /// Clean up and unregister a model nothing depends on
    ///
    /// Events still queued for it are discarded when they come due.
    pub fn remove_model(&mut self, name: &str) -> Result<(), ModelError> {
        let handle = self
            .registry
            .handle(name)
            .ok_or_else(|| ModelError::NotFound(name.to_string()))?;
        let dependents = self.registry.dependents(handle);
        if !dependents.is_empty() {
            return Err(ModelError::StillRequired {
                name: name.to_string(),
                dependents,
            });
        }
        self.with_model(handle, |model, ctx| model.cleanup(ctx));
        self.registry.remove_model(name)?;
        Ok(())
    }

    fn pre_run_model(&mut self, handle: ModelHandle) {
        if let Some(Err(err)) = self.with_model(handle, |model, ctx| model.pre_run(ctx)) {
            self.stats.event_errors += 1;
            warn!("Model {} failed to start: {:#}", self.model_label(handle), err);
        }
    }

    /// Pre-run every model, dependencies first; later calls do nothing
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        let order = self.registry.dependency_order();
        info!(
            "Starting simulation: {} models, {} records, {} vertices",
            order.len(),
            self.road_network.record_count(),
            self.road_network.vertex_count()
        );
        for handle in order {
            self.pre_run_model(handle);
        }
    }

    /// Queue an event from outside any model
    pub fn add_event(&mut self, event: Event) {
        self.scheduler.add_event(event);
    }

    fn dispatch(&mut self, event: Event) {
        if matches!(event.kind, EventKind::VisualizerRefresh) {
            trace!("Ignoring visualizer refresh at {}", event.time);
            return;
        }
        let handle = event.dest;
        if !self.registry.contains(handle) {
            debug!("Discarding {} for a removed model", event.kind);
            self.stats.events_discarded += 1;
            return;
        }
        match self.with_model(handle, |model, ctx| model.process_event(ctx, event)) {
            Some(Ok(())) => self.stats.events_dispatched += 1,
            Some(Err(err)) => {
                self.stats.events_dispatched += 1;
                self.stats.event_errors += 1;
                warn!("Model {} failed to process an event: {:#}", self.model_label(handle), err);
            }
            None => {
                debug!("Model {} is busy, discarding event", self.model_label(handle));
                self.stats.events_discarded += 1;
            }
        }
    }

    /// Dispatch the earliest event; false when the queue is empty
    pub fn step(&mut self) -> bool {
        self.start();
        match self.scheduler.pop_next() {
            Some(event) => {
                self.dispatch(event);
                true
            }
            None => false,
        }
    }

    /// Dispatch every event up to and including `end`, then move the clock
    /// to `end`; returns how many events were popped
    pub fn run_until(&mut self, end: SimTime) -> usize {
        self.start();
        let mut count = 0;
        while self.scheduler.peek_time().is_some_and(|time| time <= end) {
            if !self.step() {
                break;
            }
            count += 1;
        }
        self.scheduler.advance_to(end);
        count
    }

    /// Run for `secs` of simulated time from now
    pub fn run_for_secs(&mut self, secs: f64) -> usize {
        let end = self.now().after(secs);
        self.run_until(end)
    }

    /// Dispatch at most `max_events` events
    pub fn run_for(&mut self, max_events: usize) -> usize {
        let mut count = 0;
        while count < max_events && self.step() {
            count += 1;
        }
        count
    }

    /// Post-run every model, dependents first, and log the run summary
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        for handle in self.registry.dependency_order().into_iter().rev() {
            if let Some(Err(err)) = self.with_model(handle, |model, ctx| model.post_run(ctx)) {
                warn!("Model {} failed to finish: {:#}", self.model_label(handle), err);
            }
        }
        self.stats.log_summary(self.now().as_secs());
    }

    /// Have the node at `address` originate a safety message now
    pub fn inject_message(&mut self, address: Address) -> Option<SequenceId> {
        let comm = self.registry.nodes().get(address)?.comm?;
        self.with_model(comm, |model, ctx| {
            model.as_comm_mut().and_then(|comm| comm.originate(ctx))
        })
        .flatten()
    }

    /// Feed a GPS-driven mobility model from `feed`
    pub fn attach_gps_feed(&mut self, mobility: &str, feed: GpsFeed) -> Result<(), ModelError> {
        let model = self
            .registry
            .get_model_mut(mobility)
            .ok_or_else(|| ModelError::NotFound(mobility.to_string()))?;
        match model.as_mobility_mut() {
            Some(mobility) => {
                mobility.attach_gps(feed);
                Ok(())
            }
            None => Err(ModelError::WrongType {
                name: mobility.to_string(),
                expected: "mobility model",
            }),
        }
    }

    /// Turn a car on or off the network; false if no car has the address
    pub fn set_car_active(&mut self, address: Address, active: bool) -> bool {
        self.registry.set_car_active(address, active)
    }

    pub fn print_summary(&self) {
        let nodes = self.registry.nodes();
        let active = nodes
            .iter()
            .filter(|node| node.kind == NodeKind::Car && node.active)
            .count();
        println!("=== VANET Simulation Summary ===");
        println!("Time: {:.2}s", self.now().as_secs());
        println!(
            "Vertices: {}, Records: {}",
            self.road_network.vertex_count(),
            self.road_network.record_count()
        );
        println!(
            "Cars: {} ({} active), Infrastructure: {}",
            nodes.car_count(),
            active,
            nodes.infrastructure_count()
        );
        println!(
            "Models: {}, Pending events: {}",
            self.registry.len(),
            self.scheduler.len()
        );
        println!();

        println!("--- Messages ---");
        println!(
            "  originated={}, transmissions={}, receptions={}, duplicates={}",
            self.stats.messages_originated,
            self.stats.transmissions,
            self.stats.receptions,
            self.stats.duplicates
        );
        println!(
            "  suppressed={}, expired={}, mean reach={:.1}",
            self.stats.rebroadcasts_suppressed,
            self.stats.messages_expired,
            self.stats.mean_reach()
        );

        println!("--- Traffic ---");
        println!(
            "  held at lights={}, trips completed={}",
            self.stats.vehicles_blocked, self.stats.trips_completed
        );
        println!(
            "  events dispatched={}, discarded={}, failed={}",
            self.stats.events_dispatched, self.stats.events_discarded, self.stats.event_errors
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::registry::ModelType;
    use crate::simulation::types::Coords;

    fn world() -> SimWorld {
        let map = RoadNetwork::grid(3, 3, 0.005, Coords::from_degrees(40.0, -80.0)).unwrap();
        SimWorld::new_with_seed(map, 7)
    }

    fn car(world: &mut SimWorld, index: u32) -> ModelHandle {
        let handles = world
            .add_models(vec![
                ModelSpec::new(format!("car{}", index), ModelType::Car)
                    .param("ADDRESS", Address(index).to_string())
                    .param("MOBILITY", format!("mob{}", index))
                    .param("COMM", format!("comm{}", index)),
                ModelSpec::new(format!("mob{}", index), ModelType::RandomWalkMobility),
                ModelSpec::new(format!("comm{}", index), ModelType::SimpleComm),
            ])
            .unwrap();
        handles[0]
    }

    fn phases(world: &SimWorld) -> u64 {
        match world.registry.get_model("lights") {
            Some(Model::TrafficLights(lights)) => lights.phases_advanced,
            _ => 0,
        }
    }

    #[test]
    fn test_lights_advance_each_period() {
        let mut world = world();
        world
            .add_model(
                ModelSpec::new("lights", ModelType::TrafficLights)
                    .param("PERIOD", "10")
                    .param("BUCKETS", "1"),
            )
            .unwrap();
        world.run_until(SimTime::from_secs(25.0));
        // Centre plus four edge midpoints carry signals in a 3x3 grid
        assert_eq!(phases(&world), 10);
        assert_eq!(world.now(), SimTime::from_secs(25.0));
        assert!(world.road_network.lights_enabled());

        world.remove_model("lights").unwrap();
        assert!(!world.road_network.lights_enabled());
    }

    #[test]
    fn test_min_signal_edges_signals_corners() {
        let mut world = world();
        world
            .add_model(
                ModelSpec::new("lights", ModelType::TrafficLights)
                    .param("PERIOD", "10")
                    .param("BUCKETS", "1")
                    .param("MIN_SIGNAL_EDGES", "2"),
            )
            .unwrap();
        world.run_until(SimTime::from_secs(25.0));
        // All nine vertices join two records or more
        assert_eq!(phases(&world), 18);
        assert_eq!(world.road_network.min_signal_edges(), 2);
    }

    #[test]
    fn test_events_for_removed_model_are_discarded() {
        let mut world = world();
        let handle = world
            .add_model(ModelSpec::new("lights", ModelType::TrafficLights))
            .unwrap();
        world.start();
        world.remove_model("lights").unwrap();

        world.add_event(Event::new(SimTime::from_secs(1.0), handle, EventKind::CarUpdate));
        world.add_event(Event::new(SimTime::from_secs(1.0), handle, EventKind::VisualizerRefresh));
        world.run_until(SimTime::from_secs(100.0));
        assert_eq!(world.stats.events_dispatched, 0);
        // Eight pending bucket events plus the car update
        assert_eq!(world.stats.events_discarded, 9);
    }

    #[test]
    fn test_cars_move_and_publish_positions() {
        let mut world = world();
        let handle = car(&mut world, 1);
        let before = world.registry.nodes().car(Address(1)).unwrap().position;

        world.run_until(SimTime::from_secs(30.0));
        let node = world.registry.nodes().car(Address(1)).unwrap().clone();
        assert_eq!(node.handle, handle);
        assert_ne!(node.position, before);
        assert!(node.location.is_some());
        assert!(world.stats.events_dispatched >= 299);
        assert_eq!(world.stats.event_errors, 0);
    }

    #[test]
    fn test_model_added_mid_run_is_started() {
        let mut world = world();
        car(&mut world, 1);
        world.run_until(SimTime::from_secs(1.0));
        car(&mut world, 2);
        let updates_before = world.stats.events_dispatched;
        world.run_until(SimTime::from_secs(2.0));
        // Both cars update ten times a second
        assert!(world.stats.events_dispatched - updates_before >= 19);
    }

    #[test]
    fn test_remove_refuses_required_model() {
        let mut world = world();
        car(&mut world, 1);
        assert_eq!(world.remove_model("mob1").unwrap_err().code(), 7);
        assert_eq!(world.remove_model("nothing").unwrap_err().code(), 8);
        world.remove_model("car1").unwrap();
        assert!(world.registry.nodes().is_empty());
        world.remove_model("mob1").unwrap();
    }

    #[test]
    fn test_inject_message_reaches_neighbour() {
        let mut world = world();
        car(&mut world, 1);
        car(&mut world, 2);
        // Put both cars on top of each other
        let position = world.registry.nodes().car(Address(1)).unwrap().position;
        {
            let mut nodes = world.registry.nodes_mut();
            let mut other = nodes.car(Address(2)).unwrap().clone();
            other.position = position;
            nodes.update(other);
        }
        let id = world.inject_message(Address(1)).unwrap();
        assert_eq!(id.source, Address(1));
        world.run_until(SimTime::from_secs(0.01));
        assert_eq!(world.stats.reach_of(&id), 1);
        assert!(world.inject_message(Address(99)).is_none());
    }
}
