//! Discrete-event VANET simulation core
//!
//! Vehicles and roadside nodes move over a road map and flood safety
//! messages to each other over a simulated wireless channel. Everything is
//! driven by one event queue; see [`SimWorld`].

mod car;
mod comm;
mod error;
mod event;
mod gps;
mod history;
mod infrastructure;
mod intersection;
mod mobility;
mod nodes;
mod packet;
mod params;
mod registry;
mod road_network;
mod scenario;
mod scheduler;
mod stats;
mod trip;
mod types;
mod world;

// Re-export public types for external use
pub use car::CarModel;
pub use comm::{
    backoff_multiplier, distance_shaped_interval, CommConfig, CommCounters, CommKind, CommModel,
    RebroadcastMessage, MAX_BACKOFF_EXPONENT,
};
pub use error::ModelError;
pub use event::{priority, Event, EventKind};
pub use gps::{GpsFeed, GpsReader, GpsSample};
pub use history::{HistoryTable, MessageHistory, ReceivedCopy};
pub use infrastructure::InfrastructureNodeModel;
pub use intersection::{SimIntersection, TrafficLightModel};
pub use mobility::{MobilityEnv, MobilityKind, MobilityModel, MoveReport, SpeedPolicy};
pub use nodes::{read_nodes, write_nodes, NodeState, NodeTable, SharedNodeTable};
pub use packet::{PacketError, PacketStamp, SafetyPacket, SequenceId, PACKET_LEN, WIRE_VERSION};
pub use params::{parse_bool, parse_dependencies, parse_number, ModelParams, ParamKind, ParamSpec};
pub use registry::{
    InitContext, Model, ModelCategory, ModelRegistry, ModelSpec, ModelType, SimModel,
};
pub use road_network::{MapRecord, NewRecord, RoadClass, RoadNetwork, Route, RouteLeg};
pub use scenario::{build_scenario, ScenarioConfig};
pub use scheduler::EventScheduler;
pub use stats::SimStats;
pub use trip::{TripKind, TripModel, TripPlan};
pub use types::{
    Address, AddressParseError, Coords, ModelHandle, NodeKind, RecordId, RoadLocation, SimTime,
    VertexId, FEET_PER_MILE,
};
pub use world::{SimContext, SimWorld};
