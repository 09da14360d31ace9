//! Model registry
//!
//! Owns every model in the simulation, keyed by a versioned handle and by
//! name. Dependencies between models form a DAG; batches of new models are
//! initialized in topological order and the whole registry is started in
//! that order and shut down in reverse.

use log::{debug, warn};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction::{Incoming, Outgoing};
use rand::rngs::StdRng;
use slotmap::SlotMap;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::car::CarModel;
use super::comm::{CommKind, CommModel};
use super::error::ModelError;
use super::event::Event;
use super::infrastructure::InfrastructureNodeModel;
use super::intersection::TrafficLightModel;
use super::mobility::{MobilityKind, MobilityModel};
use super::nodes::{read_nodes, write_nodes, NodeState, NodeTable, SharedNodeTable};
use super::params::{parse_dependencies, ModelParams};
use super::road_network::RoadNetwork;
use super::trip::{TripKind, TripModel};
use super::types::{Address, Coords, ModelHandle};
use super::world::SimContext;

/// Broad role a model plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelCategory {
    Node,
    Mobility,
    Trip,
    Comm,
    Signal,
}

impl ModelCategory {
    pub fn label(self) -> &'static str {
        match self {
            ModelCategory::Node => "node model",
            ModelCategory::Mobility => "mobility model",
            ModelCategory::Trip => "trip model",
            ModelCategory::Comm => "comm model",
            ModelCategory::Signal => "signal model",
        }
    }
}

/// Concrete model types known to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelType {
    Car,
    Infrastructure,
    RandomWalkMobility,
    TripMobility,
    CarFollowingMobility,
    GpsMobility,
    DijkstraTrip,
    RandomWaypointTrip,
    SightseeingTrip,
    SimpleComm,
    AdaptiveComm,
    GrooveComm,
    TrafficLights,
}

impl ModelType {
    pub const ALL: [ModelType; 13] = [
        ModelType::Car,
        ModelType::Infrastructure,
        ModelType::RandomWalkMobility,
        ModelType::TripMobility,
        ModelType::CarFollowingMobility,
        ModelType::GpsMobility,
        ModelType::DijkstraTrip,
        ModelType::RandomWaypointTrip,
        ModelType::SightseeingTrip,
        ModelType::SimpleComm,
        ModelType::AdaptiveComm,
        ModelType::GrooveComm,
        ModelType::TrafficLights,
    ];

    /// Name used in model specs
    pub fn name(self) -> &'static str {
        match self {
            ModelType::Car => "CarModel",
            ModelType::Infrastructure => "InfrastructureNodeModel",
            ModelType::RandomWalkMobility => "RandomWalkModel",
            ModelType::TripMobility => "TripMobilityModel",
            ModelType::CarFollowingMobility => "CarFollowingModel",
            ModelType::GpsMobility => "GpsMobilityModel",
            ModelType::DijkstraTrip => "DijkstraTripModel",
            ModelType::RandomWaypointTrip => "RandomWaypointTripModel",
            ModelType::SightseeingTrip => "SightseeingTripModel",
            ModelType::SimpleComm => "SimpleCommModel",
            ModelType::AdaptiveComm => "AdaptiveCommModel",
            ModelType::GrooveComm => "GrooveCommModel",
            ModelType::TrafficLights => "TrafficLightModel",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name.trim()))
    }

    /// The type this one specializes, if any
    pub fn parent(self) -> Option<ModelType> {
        match self {
            ModelType::TripMobility => Some(ModelType::RandomWalkMobility),
            ModelType::CarFollowingMobility => Some(ModelType::TripMobility),
            ModelType::AdaptiveComm => Some(ModelType::SimpleComm),
            ModelType::GrooveComm => Some(ModelType::AdaptiveComm),
            _ => None,
        }
    }

    /// True if this type is `ancestor` or specializes it
    pub fn is_a(self, ancestor: ModelType) -> bool {
        let mut current = Some(self);
        while let Some(t) = current {
            if t == ancestor {
                return true;
            }
            current = t.parent();
        }
        false
    }

    pub fn category(self) -> ModelCategory {
        match self {
            ModelType::Car | ModelType::Infrastructure => ModelCategory::Node,
            ModelType::RandomWalkMobility
            | ModelType::TripMobility
            | ModelType::CarFollowingMobility
            | ModelType::GpsMobility => ModelCategory::Mobility,
            ModelType::DijkstraTrip | ModelType::RandomWaypointTrip | ModelType::SightseeingTrip => {
                ModelCategory::Trip
            }
            ModelType::SimpleComm | ModelType::AdaptiveComm | ModelType::GrooveComm => ModelCategory::Comm,
            ModelType::TrafficLights => ModelCategory::Signal,
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a model sees while it is being initialized
pub struct InitContext<'a> {
    pub name: &'a str,
    pub params: &'a ModelParams,
    /// Models registered so far, read only
    pub registry: &'a ModelRegistry,
    pub map: &'a RoadNetwork,
    pub rng: &'a mut StdRng,
    required: Vec<ModelHandle>,
}

impl InitContext<'_> {
    /// Resolve a referenced model and record it as a dependency
    pub fn require(&mut self, name: &str, category: ModelCategory) -> Result<ModelHandle, ModelError> {
        let handle = self
            .registry
            .handle(name)
            .ok_or_else(|| ModelError::MissingDependency(name.to_string()))?;
        let actual = self
            .registry
            .entry(handle)
            .map(|entry| entry.model_type.category());
        if actual != Some(category) {
            return Err(ModelError::WrongType {
                name: name.to_string(),
                expected: category.label(),
            });
        }
        self.required.push(handle);
        Ok(handle)
    }
}

/// Lifecycle every simulation model implements
pub trait SimModel {
    fn model_type(&self) -> ModelType;

    /// Parse parameters and resolve references to other models
    fn init(&mut self, _ctx: &mut InitContext<'_>) -> Result<(), ModelError> {
        Ok(())
    }

    /// Called once, in dependency order, before the first event
    fn pre_run(&mut self, _ctx: &mut SimContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn process_event(&mut self, ctx: &mut SimContext<'_>, event: Event) -> anyhow::Result<()>;

    /// Called once, in reverse dependency order, after the last event
    fn post_run(&mut self, _ctx: &mut SimContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release anything the model published; runs before removal
    fn cleanup(&mut self, _ctx: &mut SimContext<'_>) {}

    /// State to publish in the address table when the model is registered
    fn node_state(&self, _handle: ModelHandle) -> Option<NodeState> {
        None
    }
}

/// Any model the registry can hold
#[derive(Debug)]
pub enum Model {
    Car(CarModel),
    Infrastructure(InfrastructureNodeModel),
    Mobility(MobilityModel),
    Trip(TripModel),
    Comm(CommModel),
    TrafficLights(TrafficLightModel),
}

impl Model {
    fn inner(&self) -> &dyn SimModel {
        match self {
            Model::Car(m) => m,
            Model::Infrastructure(m) => m,
            Model::Mobility(m) => m,
            Model::Trip(m) => m,
            Model::Comm(m) => m,
            Model::TrafficLights(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn SimModel {
        match self {
            Model::Car(m) => m,
            Model::Infrastructure(m) => m,
            Model::Mobility(m) => m,
            Model::Trip(m) => m,
            Model::Comm(m) => m,
            Model::TrafficLights(m) => m,
        }
    }

    pub fn as_car(&self) -> Option<&CarModel> {
        match self {
            Model::Car(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_car_mut(&mut self) -> Option<&mut CarModel> {
        match self {
            Model::Car(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_infrastructure(&self) -> Option<&InfrastructureNodeModel> {
        match self {
            Model::Infrastructure(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mobility(&self) -> Option<&MobilityModel> {
        match self {
            Model::Mobility(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mobility_mut(&mut self) -> Option<&mut MobilityModel> {
        match self {
            Model::Mobility(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_trip(&self) -> Option<&TripModel> {
        match self {
            Model::Trip(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_trip_mut(&mut self) -> Option<&mut TripModel> {
        match self {
            Model::Trip(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_comm(&self) -> Option<&CommModel> {
        match self {
            Model::Comm(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_comm_mut(&mut self) -> Option<&mut CommModel> {
        match self {
            Model::Comm(m) => Some(m),
            _ => None,
        }
    }
}

impl SimModel for Model {
    fn model_type(&self) -> ModelType {
        self.inner().model_type()
    }

    fn init(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ModelError> {
        self.inner_mut().init(ctx)
    }

    fn pre_run(&mut self, ctx: &mut SimContext<'_>) -> anyhow::Result<()> {
        self.inner_mut().pre_run(ctx)
    }

    fn process_event(&mut self, ctx: &mut SimContext<'_>, event: Event) -> anyhow::Result<()> {
        self.inner_mut().process_event(ctx, event)
    }

    fn post_run(&mut self, ctx: &mut SimContext<'_>) -> anyhow::Result<()> {
        self.inner_mut().post_run(ctx)
    }

    fn cleanup(&mut self, ctx: &mut SimContext<'_>) {
        self.inner_mut().cleanup(ctx)
    }

    fn node_state(&self, handle: ModelHandle) -> Option<NodeState> {
        self.inner().node_state(handle)
    }
}

/// Builds a fresh, uninitialized model
pub type ModelConstructor = fn() -> Model;

/// Request to create one model
#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub name: String,
    pub type_name: String,
    pub params: ModelParams,
    /// Models that must exist, and be initialized, first
    pub depends: Vec<String>,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>, model_type: impl fmt::Display) -> Self {
        Self {
            name: name.into(),
            type_name: model_type.to_string(),
            params: ModelParams::new(),
            depends: Vec::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.set(key, value);
        self
    }

    pub fn params(mut self, params: &ModelParams) -> Self {
        self.params.merge(params);
        self
    }

    /// Add semicolon-separated dependency names
    pub fn depends_on(mut self, names: &str) -> Self {
        self.depends.extend(parse_dependencies(names));
        self
    }
}

/// A registered model and its bookkeeping
#[derive(Debug)]
pub struct ModelEntry {
    pub name: String,
    pub model_type: ModelType,
    /// Empty while the model is checked out for dispatch
    model: Option<Model>,
}

pub struct ModelRegistry {
    constructors: HashMap<String, ModelConstructor>,

    models: SlotMap<ModelHandle, ModelEntry>,

    names: HashMap<String, ModelHandle>,

    /// Edges run from a dependency to the models that need it
    deps: StableDiGraph<ModelHandle, ()>,

    dep_nodes: HashMap<ModelHandle, NodeIndex>,

    nodes: SharedNodeTable,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            constructors: HashMap::new(),
            models: SlotMap::with_key(),
            names: HashMap::new(),
            deps: StableDiGraph::new(),
            dep_nodes: HashMap::new(),
            nodes: Arc::new(RwLock::new(NodeTable::new())),
        };

        registry.register_type(ModelType::Car.name(), || Model::Car(CarModel::default()));
        registry.register_type(ModelType::Infrastructure.name(), || {
            Model::Infrastructure(InfrastructureNodeModel::default())
        });
        registry.register_type(ModelType::RandomWalkMobility.name(), || {
            Model::Mobility(MobilityModel::new(MobilityKind::RandomWalk))
        });
        registry.register_type(ModelType::TripMobility.name(), || {
            Model::Mobility(MobilityModel::new(MobilityKind::Trip))
        });
        registry.register_type(ModelType::CarFollowingMobility.name(), || {
            Model::Mobility(MobilityModel::new(MobilityKind::CarFollowing))
        });
        registry.register_type(ModelType::GpsMobility.name(), || {
            Model::Mobility(MobilityModel::new(MobilityKind::Gps))
        });
        registry.register_type(ModelType::DijkstraTrip.name(), || {
            Model::Trip(TripModel::new(TripKind::Dijkstra))
        });
        registry.register_type(ModelType::RandomWaypointTrip.name(), || {
            Model::Trip(TripModel::new(TripKind::RandomWaypoint))
        });
        registry.register_type(ModelType::SightseeingTrip.name(), || {
            Model::Trip(TripModel::new(TripKind::Sightseeing))
        });
        registry.register_type(ModelType::SimpleComm.name(), || {
            Model::Comm(CommModel::new(CommKind::Simple))
        });
        registry.register_type(ModelType::AdaptiveComm.name(), || {
            Model::Comm(CommModel::new(CommKind::Adaptive))
        });
        registry.register_type(ModelType::GrooveComm.name(), || {
            Model::Comm(CommModel::new(CommKind::Groove))
        });
        registry.register_type(ModelType::TrafficLights.name(), || {
            Model::TrafficLights(TrafficLightModel::default())
        });
        registry
    }

    /// Add or replace the constructor for a type name
    pub fn register_type(&mut self, type_name: &str, constructor: ModelConstructor) {
        self.constructors
            .insert(type_name.trim().to_ascii_uppercase(), constructor);
    }

    pub fn knows_type(&self, type_name: &str) -> bool {
        self.constructors
            .contains_key(&type_name.trim().to_ascii_uppercase())
    }

    pub fn add_model(
        &mut self,
        spec: ModelSpec,
        map: &RoadNetwork,
        rng: &mut StdRng,
    ) -> Result<ModelHandle, ModelError> {
        let name = spec.name.clone();
        self.add_models(vec![spec], map, rng)?
            .pop()
            .ok_or(ModelError::NotFound(name))
    }

    /// Create and initialize a batch of models in dependency order
    ///
    /// A parameter whose value names another model in the batch counts as a
    /// dependency on it. If any model fails, every model already added from
    /// the batch is removed again. Handles come back in `specs` order.
    pub fn add_models(
        &mut self,
        specs: Vec<ModelSpec>,
        map: &RoadNetwork,
        rng: &mut StdRng,
    ) -> Result<Vec<ModelHandle>, ModelError> {
        let mut seen = HashSet::new();
        for spec in &specs {
            if self.names.contains_key(&spec.name) || !seen.insert(spec.name.as_str()) {
                return Err(ModelError::DuplicateName(spec.name.clone()));
            }
            if !self.knows_type(&spec.type_name) {
                return Err(ModelError::UnknownType(spec.type_name.clone()));
            }
        }

        let order = self.batch_order(&specs)?;
        let mut added: Vec<(usize, ModelHandle)> = Vec::with_capacity(specs.len());
        for index in order {
            match self.instantiate(&specs[index], map, rng) {
                Ok(handle) => added.push((index, handle)),
                Err(err) => {
                    warn!("Failed to add model {}: {}", specs[index].name, err);
                    for (_, handle) in added.into_iter().rev() {
                        self.discard(handle);
                    }
                    return Err(err);
                }
            }
        }

        added.sort_by_key(|(index, _)| *index);
        Ok(added.into_iter().map(|(_, handle)| handle).collect())
    }

    /// Initialization order for a batch, as indices into `specs`
    fn batch_order(&self, specs: &[ModelSpec]) -> Result<Vec<usize>, ModelError> {
        let index: HashMap<&str, usize> = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.name.as_str(), i))
            .collect();

        let mut graph: StableDiGraph<usize, ()> = StableDiGraph::with_capacity(specs.len(), 0);
        let nodes: Vec<NodeIndex> = (0..specs.len()).map(|i| graph.add_node(i)).collect();

        for (i, spec) in specs.iter().enumerate() {
            for dep in &spec.depends {
                match index.get(dep.as_str()) {
                    Some(&j) => {
                        graph.add_edge(nodes[j], nodes[i], ());
                    }
                    None if self.names.contains_key(dep) => {}
                    None => return Err(ModelError::MissingDependency(dep.clone())),
                }
            }
            for (_, value) in spec.params.iter() {
                if let Some(&j) = index.get(value.trim()) {
                    if j != i {
                        graph.add_edge(nodes[j], nodes[i], ());
                    }
                }
            }
        }

        match kahn_order(&graph) {
            Ok(order) => Ok(order.into_iter().map(|node| graph[node]).collect()),
            Err(stuck) => Err(ModelError::DependencyCycle(
                stuck
                    .into_iter()
                    .map(|node| specs[graph[node]].name.clone())
                    .collect(),
            )),
        }
    }

    fn instantiate(
        &mut self,
        spec: &ModelSpec,
        map: &RoadNetwork,
        rng: &mut StdRng,
    ) -> Result<ModelHandle, ModelError> {
        let constructor = *self
            .constructors
            .get(&spec.type_name.trim().to_ascii_uppercase())
            .ok_or_else(|| ModelError::UnknownType(spec.type_name.clone()))?;

        let mut model = constructor();
        let mut ctx = InitContext {
            name: &spec.name,
            params: &spec.params,
            registry: self,
            map,
            rng,
            required: Vec::new(),
        };
        model.init(&mut ctx)?;
        let required = ctx.required;

        let model_type = model.model_type();
        let handle = self.models.insert(ModelEntry {
            name: spec.name.clone(),
            model_type,
            model: None,
        });

        let published = model.node_state(handle);
        if let Some(state) = &published {
            if let Err(err) = write_nodes(&self.nodes).insert(state.clone()) {
                self.models.remove(handle);
                return Err(err);
            }
        }
        if let Some(entry) = self.models.get_mut(handle) {
            entry.model = Some(model);
        }
        if let Some(state) = published {
            if let Some(comm) = state.comm.and_then(|h| self.get_mut(h)).and_then(Model::as_comm_mut) {
                comm.attach(state.address, state.kind);
            }
        }

        self.names.insert(spec.name.clone(), handle);
        let node = self.deps.add_node(handle);
        self.dep_nodes.insert(handle, node);
        let explicit: Vec<ModelHandle> = spec
            .depends
            .iter()
            .filter_map(|dep| self.names.get(dep).copied())
            .collect();
        for dep in explicit.into_iter().chain(required) {
            if let Some(&dep_node) = self.dep_nodes.get(&dep) {
                self.deps.update_edge(dep_node, node, ());
            }
        }

        debug!("Added model {} ({})", spec.name, model_type);
        Ok(handle)
    }

    /// Forget a model entirely, including its address table entry
    fn discard(&mut self, handle: ModelHandle) -> Option<Model> {
        let entry = self.models.remove(handle)?;
        self.names.remove(&entry.name);
        if let Some(node) = self.dep_nodes.remove(&handle) {
            self.deps.remove_node(node);
        }
        if let Some(state) = entry.model.as_ref().and_then(|m| m.node_state(handle)) {
            write_nodes(&self.nodes).remove(state.address);
            if let Some(comm) = state.comm.and_then(|h| self.get_mut(h)).and_then(Model::as_comm_mut) {
                comm.detach();
            }
        }
        entry.model
    }

    /// Names of the models that depend directly on `handle`
    pub fn dependents(&self, handle: ModelHandle) -> Vec<String> {
        let Some(&node) = self.dep_nodes.get(&handle) else {
            return Vec::new();
        };
        let mut names: Vec<String> = self
            .deps
            .neighbors_directed(node, Outgoing)
            .filter_map(|dependent| self.name_of(self.deps[dependent]))
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Unregister a model that nothing depends on
    ///
    /// The caller gets the model back so it can run its cleanup.
    pub fn remove_model(&mut self, name: &str) -> Result<Model, ModelError> {
        let handle = self
            .handle(name)
            .ok_or_else(|| ModelError::NotFound(name.to_string()))?;
        let dependents = self.dependents(handle);
        if !dependents.is_empty() {
            return Err(ModelError::StillRequired {
                name: name.to_string(),
                dependents,
            });
        }
        let has_model = self.models.get(handle).is_some_and(|e| e.model.is_some());
        if !has_model {
            return Err(ModelError::NotFound(name.to_string()));
        }
        let model = self.discard(handle);
        debug!("Removed model {}", name);
        model.ok_or_else(|| ModelError::NotFound(name.to_string()))
    }

    /// Every model, dependencies before dependents
    pub fn dependency_order(&self) -> Vec<ModelHandle> {
        match kahn_order(&self.deps) {
            Ok(order) => order.into_iter().map(|node| self.deps[node]).collect(),
            Err(_) => {
                // Edges only ever point at newer models, so this is unreachable
                // in practice; fall back to registration order
                warn!("Dependency graph has a cycle, using registration order");
                self.deps.node_indices().map(|node| self.deps[node]).collect()
            }
        }
    }

    pub fn handle(&self, name: &str) -> Option<ModelHandle> {
        self.names.get(name).copied()
    }

    pub fn entry(&self, handle: ModelHandle) -> Option<&ModelEntry> {
        self.models.get(handle)
    }

    pub fn name_of(&self, handle: ModelHandle) -> Option<&str> {
        self.models.get(handle).map(|entry| entry.name.as_str())
    }

    pub fn contains(&self, handle: ModelHandle) -> bool {
        self.models.contains_key(handle)
    }

    /// None if the handle is stale or the model is checked out
    pub fn get(&self, handle: ModelHandle) -> Option<&Model> {
        self.models.get(handle).and_then(|entry| entry.model.as_ref())
    }

    pub fn get_mut(&mut self, handle: ModelHandle) -> Option<&mut Model> {
        self.models
            .get_mut(handle)
            .and_then(|entry| entry.model.as_mut())
    }

    pub fn get_model(&self, name: &str) -> Option<&Model> {
        self.handle(name).and_then(|handle| self.get(handle))
    }

    pub fn get_model_mut(&mut self, name: &str) -> Option<&mut Model> {
        let handle = self.handle(name)?;
        self.get_mut(handle)
    }

    /// Check a model out of the registry
    ///
    /// The entry stays registered; [`restore`](Self::restore) puts it back.
    pub fn take(&mut self, handle: ModelHandle) -> Option<Model> {
        self.models
            .get_mut(handle)
            .and_then(|entry| entry.model.take())
    }

    pub fn restore(&mut self, handle: ModelHandle, model: Model) {
        match self.models.get_mut(handle) {
            Some(entry) => entry.model = Some(model),
            None => debug!("Dropping model restored to a removed handle"),
        }
    }

    /// Handles of every model of `model_type` or a specialization of it
    pub fn handles_of_type(&self, model_type: ModelType) -> Vec<ModelHandle> {
        self.models
            .iter()
            .filter(|(_, entry)| entry.model_type.is_a(model_type))
            .map(|(handle, _)| handle)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Read guard on the address table
    pub fn nodes(&self) -> RwLockReadGuard<'_, NodeTable> {
        read_nodes(&self.nodes)
    }

    pub fn nodes_mut(&self) -> RwLockWriteGuard<'_, NodeTable> {
        write_nodes(&self.nodes)
    }

    /// Shared handle to the address table for observers on other threads
    pub fn shared_nodes(&self) -> SharedNodeTable {
        Arc::clone(&self.nodes)
    }

    pub fn get_cars_in_range(&self, center: &Coords, range_feet: f64) -> Vec<Address> {
        self.nodes().cars_in_range(center, range_feet)
    }

    pub fn car_handle(&self, address: Address) -> Option<ModelHandle> {
        self.nodes().car(address).map(|node| node.handle)
    }

    pub fn infrastructure_handle(&self, address: Address) -> Option<ModelHandle> {
        self.nodes().infrastructure(address).map(|node| node.handle)
    }

    /// Turn a car on or off the network; false if no car has the address
    pub fn set_car_active(&mut self, address: Address, active: bool) -> bool {
        let handle = {
            let mut nodes = self.nodes_mut();
            let Some(handle) = nodes.car(address).map(|node| node.handle) else {
                return false;
            };
            nodes.set_active(address, active);
            handle
        };
        if let Some(car) = self.get_mut(handle).and_then(Model::as_car_mut) {
            car.active = active;
        }
        true
    }
}

/// Kahn's algorithm, always taking the node with the fewest unmet
/// dependencies next and breaking ties by node index
///
/// On a cycle, returns the nodes that could not be ordered.
fn kahn_order<N>(graph: &StableDiGraph<N, ()>) -> Result<Vec<NodeIndex>, Vec<NodeIndex>> {
    let mut in_degree: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|node| (node, graph.neighbors_directed(node, Incoming).count()))
        .collect();
    let mut heap: BinaryHeap<Reverse<(usize, NodeIndex)>> = in_degree
        .iter()
        .map(|(&node, &degree)| Reverse((degree, node)))
        .collect();

    let mut order = Vec::with_capacity(in_degree.len());
    let mut done = HashSet::new();
    while let Some(Reverse((degree, node))) = heap.pop() {
        if done.contains(&node) || in_degree.get(&node) != Some(&degree) {
            continue;
        }
        if degree > 0 {
            break;
        }
        done.insert(node);
        order.push(node);
        for next in graph.neighbors_directed(node, Outgoing) {
            if let Some(remaining) = in_degree.get_mut(&next) {
                *remaining = remaining.saturating_sub(1);
                heap.push(Reverse((*remaining, next)));
            }
        }
    }

    if order.len() == in_degree.len() {
        Ok(order)
    } else {
        Err(graph
            .node_indices()
            .filter(|node| !done.contains(node))
            .collect())
    }
}
