//! Trip models decide where a vehicle drives next
//!
//! A trip hands its mobility model one planned route at a time. Dijkstra
//! trips drive a fixed list of waypoints once; random waypoint trips pick a
//! fresh random destination forever; sightseeing trips loop over their
//! waypoints.

use anyhow::Result;
use log::{debug, warn};
use rand::Rng;

use super::error::ModelError;
use super::event::Event;
use super::params::{ParamKind, ParamReader, ParamSpec};
use super::registry::{InitContext, ModelType, SimModel};
use super::road_network::{RoadNetwork, Route};
use super::types::RoadLocation;
use super::world::SimContext;

const SOURCE: ParamSpec = ParamSpec::new("SOURCE", ParamKind::Text, "random");
const DESTINATION: ParamSpec = ParamSpec::new("DESTINATION", ParamKind::Text, "");
/// Locations separated by `|`
const WAYPOINTS: ParamSpec = ParamSpec::new("WAYPOINTS", ParamKind::Text, "");

pub const TRIP_PARAMS: &[ParamSpec] = &[SOURCE, DESTINATION, WAYPOINTS];

/// Random destinations tried before a trip gives up on one planning request
const PLAN_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripKind {
    Dijkstra,
    RandomWaypoint,
    Sightseeing,
}

/// A route to drive and the point on its last record to stop at
#[derive(Debug, Clone, PartialEq)]
pub struct TripPlan {
    pub route: Route,
    pub destination: RoadLocation,
}

#[derive(Debug, Clone)]
pub struct TripModel {
    kind: TripKind,
    source: Option<RoadLocation>,
    waypoints: Vec<RoadLocation>,
    next_waypoint: usize,
    pub plans_made: u64,
}

impl TripModel {
    pub fn new(kind: TripKind) -> Self {
        Self {
            kind,
            source: None,
            waypoints: Vec::new(),
            next_waypoint: 0,
            plans_made: 0,
        }
    }

    pub fn kind(&self) -> TripKind {
        self.kind
    }

    /// Where the vehicle should start, if the trip pins it
    pub fn start_location(&self) -> Option<RoadLocation> {
        self.source
    }

    pub fn waypoints(&self) -> &[RoadLocation] {
        &self.waypoints
    }

    /// Replace the stops and start the trip over
    pub fn set_waypoints(&mut self, waypoints: Vec<RoadLocation>) {
        self.waypoints = waypoints;
        self.next_waypoint = 0;
    }

    /// True once a one-shot trip has handed out its only plan
    pub fn is_finished(&self) -> bool {
        self.kind == TripKind::Dijkstra && self.next_waypoint >= self.waypoints.len()
    }

    /// Route from `current` to the next destination, or None once the trip
    /// is over. An unreachable destination yields an empty route.
    pub fn next_plan(&mut self, current: &RoadLocation, map: &mut RoadNetwork, rng: &mut impl Rng) -> Option<TripPlan> {
        let plan = match self.kind {
            TripKind::Dijkstra => {
                if self.is_finished() {
                    return None;
                }
                let mut stops = Vec::with_capacity(self.waypoints.len() + 1);
                stops.push(*current);
                stops.extend_from_slice(&self.waypoints[self.next_waypoint..]);
                self.next_waypoint = self.waypoints.len();
                let destination = *stops.last()?;
                let mut route = map.route_through(&stops, Some(current.forwards));
                if route.is_empty() {
                    route = map.route_through(&stops, None);
                }
                TripPlan { route, destination }
            }
            TripKind::Sightseeing => {
                if self.waypoints.is_empty() {
                    return None;
                }
                let destination = self.waypoints[self.next_waypoint % self.waypoints.len()];
                self.next_waypoint = (self.next_waypoint + 1) % self.waypoints.len();
                TripPlan {
                    route: route_between(map, current, &destination),
                    destination,
                }
            }
            TripKind::RandomWaypoint => {
                let mut plan = None;
                for _ in 0..PLAN_ATTEMPTS {
                    let destination = map.random_location(rng)?;
                    let route = route_between(map, current, &destination);
                    if !route.is_empty() {
                        plan = Some(TripPlan { route, destination });
                        break;
                    }
                }
                plan.unwrap_or(TripPlan {
                    route: Route::default(),
                    destination: *current,
                })
            }
        };
        self.plans_made += 1;
        debug!(
            "Trip plan {}: {} legs to {}",
            self.plans_made,
            plan.route.len(),
            plan.destination.record
        );
        Some(plan)
    }
}

/// Shortest route keeping the current direction, or turning around if that
/// is the only way
fn route_between(map: &mut RoadNetwork, from: &RoadLocation, to: &RoadLocation) -> Route {
    let route = map.shortest_path(from, to, Some(from.forwards));
    if route.is_empty() {
        map.shortest_path(from, to, None)
    } else {
        route
    }
}

fn resolve(ctx: &mut InitContext<'_>, spec: &ParamSpec, text: &str) -> Result<RoadLocation, ModelError> {
    ctx.map
        .locate(text, &mut *ctx.rng)
        .ok_or_else(|| ModelError::InvalidParameter {
            key: spec.key.to_string(),
            value: text.to_string(),
            reason: "no matching road location".to_string(),
        })
}

impl SimModel for TripModel {
    fn model_type(&self) -> ModelType {
        match self.kind {
            TripKind::Dijkstra => ModelType::DijkstraTrip,
            TripKind::RandomWaypoint => ModelType::RandomWaypointTrip,
            TripKind::Sightseeing => ModelType::SightseeingTrip,
        }
    }

    fn init(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ModelError> {
        let (source, destination, waypoints) = {
            let reader = ParamReader::new(ctx.name, ctx.params);
            reader.warn_unknown(TRIP_PARAMS);
            (reader.text(&SOURCE), reader.text(&DESTINATION), reader.text(&WAYPOINTS))
        };

        let pinned = !source.eq_ignore_ascii_case("random");
        self.source = match (self.kind, pinned) {
            (TripKind::RandomWaypoint, false) => None,
            _ => Some(resolve(ctx, &SOURCE, &source)?),
        };

        self.waypoints.clear();
        for stop in waypoints.split('|').map(str::trim).filter(|s| !s.is_empty()) {
            let location = resolve(ctx, &WAYPOINTS, stop)?;
            self.waypoints.push(location);
        }
        if self.kind == TripKind::Dijkstra {
            if destination.is_empty() {
                return Err(ModelError::InvalidParameter {
                    key: DESTINATION.key.to_string(),
                    value: destination,
                    reason: "a Dijkstra trip needs a destination".to_string(),
                });
            }
            let location = resolve(ctx, &DESTINATION, &destination)?;
            self.waypoints.push(location);
        } else if !destination.is_empty() {
            warn!("Model {}: DESTINATION is only used by Dijkstra trips", ctx.name);
        }
        if self.kind == TripKind::Sightseeing && self.waypoints.is_empty() {
            return Err(ModelError::InvalidParameter {
                key: WAYPOINTS.key.to_string(),
                value: waypoints,
                reason: "a sightseeing trip needs at least one waypoint".to_string(),
            });
        }
        self.next_waypoint = 0;
        Ok(())
    }

    fn process_event(&mut self, _ctx: &mut SimContext<'_>, event: Event) -> Result<()> {
        warn!("Trip model ignoring unexpected event {}", event.kind);
        Ok(())
    }
}
