//! Vehicle movement along the road map
//!
//! A mobility model owns a vehicle's cursor on the map. Each update moves
//! the cursor `speed * elapsed` miles, crossing shape points and vertices as
//! needed. At a vertex the vehicle waits for a green light, then takes the
//! next leg of its route or, with no route, a random successor record.

use anyhow::Result;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::Rng;
use std::collections::VecDeque;

use super::error::ModelError;
use super::event::Event;
use super::gps::GpsFeed;
use super::nodes::NodeTable;
use super::params::{ParamKind, ParamReader, ParamSpec};
use super::registry::{InitContext, Model, ModelCategory, ModelType, SimModel};
use super::road_network::{RoadNetwork, RouteLeg};
use super::trip::TripModel;
use super::types::{Address, Coords, ModelHandle, RoadLocation, VertexId, FEET_PER_MILE};
use super::world::SimContext;

const START: ParamSpec = ParamSpec::new("START", ParamKind::Text, "random");
const SPEED_MODEL: ParamSpec = ParamSpec::new(
    "SPEED_MODEL",
    ParamKind::Enumeration(&["street", "uniform"]),
    "street",
);
const MIN_SPEED: ParamSpec = ParamSpec::bounded("MIN_SPEED", ParamKind::Float, "20", 0.0, 200.0);
const MAX_SPEED: ParamSpec = ParamSpec::bounded("MAX_SPEED", ParamKind::Float, "40", 0.0, 200.0);
const TRIP: ParamSpec = ParamSpec::new("TRIP", ParamKind::ModelRef, "");
/// Feet along the record; cars farther ahead do not slow a follower.
/// Zero means every car ahead on the record counts.
const FOLLOWING_DISTANCE: ParamSpec =
    ParamSpec::bounded("FOLLOWING_DISTANCE", ParamKind::Float, "0", 0.0, 1e5);

pub const MOBILITY_PARAMS: &[ParamSpec] = &[
    START,
    SPEED_MODEL,
    MIN_SPEED,
    MAX_SPEED,
    TRIP,
    FOLLOWING_DISTANCE,
];

/// Upper bound on cursor steps in one update
const MAX_STEPS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MobilityKind {
    RandomWalk,
    Trip,
    CarFollowing,
    Gps,
}

/// How a vehicle picks its cruising speed on each record
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpeedPolicy {
    /// Drive at the record's speed limit
    Street,
    /// Draw uniformly in `[min, max)` mph on entering each record
    Uniform { min: f64, max: f64 },
}

impl SpeedPolicy {
    pub fn draw(&self, speed_limit: f64, rng: &mut impl Rng) -> f64 {
        match *self {
            SpeedPolicy::Street => speed_limit,
            SpeedPolicy::Uniform { min, max } if max > min => rng.random_range(min..max),
            SpeedPolicy::Uniform { min, .. } => min,
        }
    }
}

/// Borrowed world state a mobility model needs for one update
pub struct MobilityEnv<'a> {
    pub map: &'a mut RoadNetwork,
    pub nodes: &'a NodeTable,
    pub trip: Option<&'a mut TripModel>,
    pub rng: &'a mut StdRng,
    /// Address of the vehicle being moved
    pub me: Address,
}

/// What happened during one update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveReport {
    /// Miles travelled
    pub distance: f64,
    /// Held at a red light
    pub blocked: bool,
    /// Destinations reached
    pub arrivals: u32,
    /// The trip has no more destinations
    pub finished: bool,
}

#[derive(Debug, Clone)]
pub struct MobilityModel {
    kind: MobilityKind,
    speed_policy: SpeedPolicy,
    following_distance: f64,
    trip: Option<ModelHandle>,
    gps: Option<GpsFeed>,

    location: Option<RoadLocation>,
    position: Coords,
    /// Degrees clockwise from north
    heading: f64,
    /// Current speed in mph
    speed: f64,
    lane: u8,
    /// Cruising speed drawn for the current record
    record_speed: f64,

    route: VecDeque<RouteLeg>,
    destination: Option<RoadLocation>,
    parked: bool,
    /// Total miles driven
    pub odometer: f64,
}

impl MobilityModel {
    pub fn new(kind: MobilityKind) -> Self {
        Self {
            kind,
            speed_policy: SpeedPolicy::Street,
            following_distance: 0.0,
            trip: None,
            gps: None,
            location: None,
            position: Coords::default(),
            heading: 0.0,
            speed: 0.0,
            lane: 0,
            record_speed: 0.0,
            route: VecDeque::new(),
            destination: None,
            parked: false,
            odometer: 0.0,
        }
    }

    pub fn kind(&self) -> MobilityKind {
        self.kind
    }

    pub fn location(&self) -> Option<RoadLocation> {
        self.location
    }

    pub fn position(&self) -> Coords {
        self.position
    }

    pub fn heading(&self) -> f64 {
        self.heading
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn lane(&self) -> u8 {
        self.lane
    }

    pub fn trip_handle(&self) -> Option<ModelHandle> {
        self.trip
    }

    pub fn destination(&self) -> Option<RoadLocation> {
        self.destination
    }

    pub fn remaining_legs(&self) -> usize {
        self.route.len()
    }

    pub fn is_parked(&self) -> bool {
        self.parked
    }

    pub fn set_speed_policy(&mut self, policy: SpeedPolicy) {
        self.speed_policy = policy;
    }

    /// Take positions from a GPS receiver instead of the road map
    pub fn attach_gps(&mut self, feed: GpsFeed) {
        self.gps = Some(feed);
    }

    /// Put the vehicle at `loc`, drawing lane and speed for its record
    pub fn place(&mut self, loc: RoadLocation, map: &RoadNetwork, rng: &mut impl Rng) {
        self.location = Some(loc);
        if let Some(record) = map.record(loc.record) {
            self.lane = if record.lanes > 1 {
                rng.random_range(0..record.lanes)
            } else {
                0
            };
            self.record_speed = self.speed_policy.draw(record.speed_limit(), rng);
        }
        self.refresh_pose(map);
    }

    fn refresh_pose(&mut self, map: &RoadNetwork) {
        if let Some(loc) = self.location {
            if let Some(position) = map.position_at(&loc) {
                self.position = position;
            }
            if let Some(heading) = map.heading_at(&loc) {
                self.heading = heading;
            }
        }
    }

    /// Move the vehicle forward by `elapsed` seconds
    pub fn advance(&mut self, env: &mut MobilityEnv<'_>, elapsed: f64) -> MoveReport {
        let mut report = MoveReport::default();
        if self.kind == MobilityKind::Gps {
            self.apply_gps_fix(env.map);
            return report;
        }
        if self.location.is_none() || self.parked {
            self.speed = 0.0;
            return report;
        }

        if self.trip.is_some() && self.route.is_empty() && self.destination.is_none() {
            self.plan_next(env, &mut report);
            if self.parked {
                self.speed = 0.0;
                return report;
            }
        }

        let desired = self.desired_speed(env);
        self.speed = desired;
        let mut remaining = elapsed;
        let mut steps = 0;
        while self.set_progress(&mut remaining, desired, env, &mut report) {
            steps += 1;
            if steps >= MAX_STEPS {
                warn!("Vehicle {} stuck after {} steps, stopping this update", env.me, steps);
                break;
            }
        }
        self.refresh_pose(env.map);
        report
    }

    /// Cruising speed, held down to the slowest car ahead on the same
    /// record, direction and lane when following is enabled
    fn desired_speed(&self, env: &MobilityEnv<'_>) -> f64 {
        let mut speed = self.record_speed;
        if self.kind != MobilityKind::CarFollowing {
            return speed;
        }
        let Some(loc) = self.location else {
            return speed;
        };
        let Some(record) = env.map.record(loc.record) else {
            return speed;
        };
        let lane = (record.lanes > 1).then_some(self.lane);
        let here = record.offset_of(&loc);
        let within_reach = |ahead: &RoadLocation| {
            self.following_distance <= 0.0
                || (record.offset_of(ahead) - here).abs() * FEET_PER_MILE <= self.following_distance
        };
        let leader = env
            .nodes
            .cars_ahead(&loc, lane, env.me)
            .into_iter()
            .filter(|car| car.location.as_ref().is_none_or(|ahead| within_reach(ahead)))
            .map(|car| car.speed)
            .min_by(f64::total_cmp);
        if let Some(leader_speed) = leader {
            speed = speed.min(leader_speed.max(0.0));
        }
        speed
    }

    /// Advance the cursor to the next shape point, vertex or stop point
    ///
    /// Consumes travel time from `remaining` and returns true while there is
    /// time left to spend.
    fn set_progress(
        &mut self,
        remaining: &mut f64,
        speed: f64,
        env: &mut MobilityEnv<'_>,
        report: &mut MoveReport,
    ) -> bool {
        let Some(loc) = self.location else {
            return false;
        };
        if *remaining <= 0.0 || speed <= 0.0 {
            *remaining = 0.0;
            return false;
        }
        let Some(record) = env.map.record(loc.record) else {
            *remaining = 0.0;
            return false;
        };
        let segment = record.segment_length(loc.shape_point);
        let last_shape_point = record.segment_count().saturating_sub(1);
        let exit = record.exit_vertex(loc.forwards);

        // The stop point counts only once the final leg is being driven
        let stop = self.destination.filter(|dest| {
            self.route.is_empty()
                && dest.record == loc.record
                && dest.shape_point == loc.shape_point
                && if loc.forwards {
                    dest.progress >= loc.progress
                } else {
                    dest.progress <= loc.progress
                }
        });
        let target = match stop {
            Some(dest) => dest.progress,
            None if loc.forwards => 1.0,
            None => 0.0,
        };

        let gap = (target - loc.progress).abs() * segment;
        let travel = speed * *remaining / 3600.0;
        if travel < gap {
            let step = travel / segment;
            let progress = if loc.forwards {
                loc.progress + step
            } else {
                loc.progress - step
            };
            self.location = Some(RoadLocation::new(loc.record, loc.shape_point, progress, loc.forwards));
            self.odometer += travel;
            report.distance += travel;
            *remaining = 0.0;
            return false;
        }

        self.odometer += gap;
        report.distance += gap;
        *remaining = (*remaining - gap / speed * 3600.0).max(0.0);
        self.location = Some(RoadLocation::new(loc.record, loc.shape_point, target, loc.forwards));

        if stop.is_some() {
            self.arrive(env, report);
            return *remaining > 0.0 && !self.parked;
        }

        if loc.forwards && loc.shape_point < last_shape_point {
            self.location = Some(RoadLocation::new(loc.record, loc.shape_point + 1, 0.0, true));
            return true;
        }
        if !loc.forwards && loc.shape_point > 0 {
            self.location = Some(RoadLocation::new(loc.record, loc.shape_point - 1, 1.0, false));
            return true;
        }

        if !env.map.can_car_go_through(exit, loc.record) {
            *remaining = 0.0;
            self.speed = 0.0;
            report.blocked = true;
            return false;
        }

        match self.next_leg(exit, env, report) {
            Some(leg) => {
                self.enter(leg, env);
                true
            }
            None => {
                *remaining = 0.0;
                self.speed = 0.0;
                false
            }
        }
    }

    fn arrive(&mut self, env: &mut MobilityEnv<'_>, report: &mut MoveReport) {
        report.arrivals += 1;
        debug!("Vehicle {} reached its destination", env.me);
        self.destination = None;
        self.route.clear();
        self.plan_next(env, report);
    }

    /// Ask the trip for the next destination and adopt its route
    ///
    /// The route's first leg is the record the vehicle is on; if it runs the
    /// other way the vehicle turns around in place.
    fn plan_next(&mut self, env: &mut MobilityEnv<'_>, report: &mut MoveReport) {
        let Some(loc) = self.location else {
            return;
        };
        let Some(trip) = env.trip.as_deref_mut() else {
            return;
        };
        let Some(plan) = trip.next_plan(&loc, env.map, env.rng) else {
            debug!("Vehicle {} finished its trip, parking", env.me);
            self.parked = true;
            self.speed = 0.0;
            report.finished = true;
            return;
        };

        let mut legs: VecDeque<RouteLeg> = plan.route.legs.into();
        if legs.is_empty() {
            debug!("Vehicle {} cannot reach its next destination", env.me);
            self.route.clear();
            self.destination = None;
            return;
        }
        if let Some(first) = legs.front().copied().filter(|leg| leg.record == loc.record) {
            legs.pop_front();
            if first.forwards != loc.forwards {
                self.location = Some(loc.reversed());
            }
        }
        self.route = legs;
        self.destination = Some(plan.destination);
    }

    /// The record to take out of `vertex`
    fn next_leg(
        &mut self,
        vertex: VertexId,
        env: &mut MobilityEnv<'_>,
        report: &mut MoveReport,
    ) -> Option<RouteLeg> {
        let current = self.location?;
        if self.trip.is_some() {
            if self.route.is_empty() {
                self.destination = None;
                self.plan_next(env, report);
                if self.parked {
                    return None;
                }
                if let Some(turned) = self.location.filter(|loc| loc.forwards != current.forwards) {
                    return Some(RouteLeg {
                        record: turned.record,
                        forwards: turned.forwards,
                    });
                }
            }
            if let Some(leg) = self.route.pop_front() {
                let connects = env
                    .map
                    .record(leg.record)
                    .is_some_and(|record| record.entry_vertex(leg.forwards) == vertex);
                if connects {
                    return Some(leg);
                }
                debug!("Vehicle {} is off its route at {}, dropping it", env.me, vertex);
                self.route.clear();
                self.destination = None;
            }
        }
        self.random_successor(vertex, &current, env)
    }

    /// A random record out of `vertex`, turning around only at a dead end
    fn random_successor(
        &self,
        vertex: VertexId,
        current: &RoadLocation,
        env: &mut MobilityEnv<'_>,
    ) -> Option<RouteLeg> {
        let options = env.map.successors(vertex, current.record);
        if let Some(leg) = options.choose(env.rng) {
            return Some(*leg);
        }
        let back = !current.forwards;
        env.map
            .record(current.record)
            .filter(|record| record.allows(back))
            .map(|record| RouteLeg {
                record: record.id,
                forwards: back,
            })
    }

    fn enter(&mut self, leg: RouteLeg, env: &mut MobilityEnv<'_>) {
        let Some(record) = env.map.record(leg.record) else {
            return;
        };
        self.lane = if record.lanes > 1 {
            env.rng.random_range(0..record.lanes)
        } else {
            0
        };
        self.record_speed = self.speed_policy.draw(record.speed_limit(), env.rng);
        self.location = Some(record.entry_location(leg.forwards));
    }

    /// Take the newest GPS fix, if one arrived since the last update
    fn apply_gps_fix(&mut self, map: &RoadNetwork) {
        let Some(sample) = self.gps.as_ref().and_then(GpsFeed::take) else {
            return;
        };
        self.position = sample.position;
        self.speed = sample.speed;
        self.heading = sample.heading;
        if let Some((loc, _)) = map.coords_to_record(&sample.position) {
            self.location = Some(loc);
        }
    }
}

impl SimModel for MobilityModel {
    fn model_type(&self) -> ModelType {
        match self.kind {
            MobilityKind::RandomWalk => ModelType::RandomWalkMobility,
            MobilityKind::Trip => ModelType::TripMobility,
            MobilityKind::CarFollowing => ModelType::CarFollowingMobility,
            MobilityKind::Gps => ModelType::GpsMobility,
        }
    }

    fn init(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ModelError> {
        let (start, trip) = {
            let reader = ParamReader::new(ctx.name, ctx.params);
            reader.warn_unknown(MOBILITY_PARAMS);
            self.speed_policy = match reader.choice(&SPEED_MODEL) {
                "uniform" => SpeedPolicy::Uniform {
                    min: reader.float(&MIN_SPEED)?,
                    max: reader.float(&MAX_SPEED)?,
                },
                _ => SpeedPolicy::Street,
            };
            self.following_distance = reader.float(&FOLLOWING_DISTANCE)?;
            (reader.text(&START), reader.model_ref(&TRIP))
        };

        match (self.kind, trip) {
            (MobilityKind::Trip, None) => {
                return Err(ModelError::InvalidParameter {
                    key: TRIP.key.to_string(),
                    value: String::new(),
                    reason: "trip mobility needs a TRIP model".to_string(),
                });
            }
            (MobilityKind::Trip | MobilityKind::CarFollowing, Some(name)) => {
                self.trip = Some(ctx.require(&name, ModelCategory::Trip)?);
            }
            (_, Some(_)) => warn!("Model {}: TRIP is ignored by {:?} mobility", ctx.name, self.kind),
            (_, None) => {}
        }

        let pinned = self
            .trip
            .and_then(|handle| ctx.registry.get(handle))
            .and_then(Model::as_trip)
            .and_then(TripModel::start_location);
        let start = match pinned {
            Some(loc) => loc,
            None => ctx
                .map
                .locate(&start, &mut *ctx.rng)
                .ok_or_else(|| ModelError::InvalidParameter {
                    key: START.key.to_string(),
                    value: start.clone(),
                    reason: "no matching road location".to_string(),
                })?,
        };
        self.place(start, ctx.map, &mut *ctx.rng);
        Ok(())
    }

    fn process_event(&mut self, _ctx: &mut SimContext<'_>, event: Event) -> Result<()> {
        warn!("Mobility model ignoring unexpected event {}", event.kind);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::road_network::NewRecord;
    use crate::simulation::trip::TripKind;
    use rand::SeedableRng;

    /// a --(1 mile east)-- b --(1 mile east)-- c
    fn line() -> RoadNetwork {
        let mut map = RoadNetwork::new();
        let a = map.add_vertex(Coords::from_degrees(40.0, -80.0));
        let per_mile = 1.0 / Coords::from_degrees(40.0, -80.0).distance_miles(&Coords::from_degrees(40.0, -79.0));
        let b = map.add_vertex(Coords::from_degrees(40.0, -80.0 + per_mile));
        let c = map.add_vertex(Coords::from_degrees(40.0, -80.0 + 2.0 * per_mile));
        map.add_record(NewRecord::new("First St", a, b)).unwrap();
        map.add_record(NewRecord::new("First St", b, c)).unwrap();
        map
    }

    fn env<'a>(map: &'a mut RoadNetwork, nodes: &'a NodeTable, rng: &'a mut StdRng) -> MobilityEnv<'a> {
        MobilityEnv {
            map,
            nodes,
            trip: None,
            rng,
            me: Address(1),
        }
    }

    #[test]
    fn test_progress_within_record() {
        let mut map = line();
        let nodes = NodeTable::new();
        let mut rng = StdRng::seed_from_u64(1);
        let mut mobility = MobilityModel::new(MobilityKind::RandomWalk);
        let first = map.records()[0].id;
        mobility.place(RoadLocation::new(first, 0, 0.0, true), &map, &mut rng);
        assert_eq!(mobility.record_speed, 25.0);

        // 25 mph for 36 s is a quarter mile
        let report = mobility.advance(&mut env(&mut map, &nodes, &mut rng), 36.0);
        assert!((report.distance - 0.25).abs() < 1e-3, "moved {}", report.distance);
        let loc = mobility.location().unwrap();
        assert_eq!(loc.record, first);
        assert!((loc.progress - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_crosses_vertex_onto_next_record() {
        let mut map = line();
        let nodes = NodeTable::new();
        let mut rng = StdRng::seed_from_u64(1);
        let mut mobility = MobilityModel::new(MobilityKind::RandomWalk);
        let [first, second] = [map.records()[0].id, map.records()[1].id];
        mobility.place(RoadLocation::new(first, 0, 0.5, true), &map, &mut rng);

        // Three quarters of a mile: half a mile to b, a quarter onto b-c
        let report = mobility.advance(&mut env(&mut map, &nodes, &mut rng), 108.0);
        assert!((report.distance - 0.75).abs() < 1e-3);
        let loc = mobility.location().unwrap();
        assert_eq!(loc.record, second);
        assert!(loc.forwards);
        assert!((loc.progress - 0.25).abs() < 1e-2);
    }

    #[test]
    fn test_dead_end_turns_around() {
        let mut map = line();
        let nodes = NodeTable::new();
        let mut rng = StdRng::seed_from_u64(1);
        let mut mobility = MobilityModel::new(MobilityKind::RandomWalk);
        let second = map.records()[1].id;
        mobility.place(RoadLocation::new(second, 0, 0.9, true), &map, &mut rng);

        mobility.advance(&mut env(&mut map, &nodes, &mut rng), 36.0);
        let loc = mobility.location().unwrap();
        assert_eq!(loc.record, second);
        assert!(!loc.forwards);
        assert!(loc.progress < 1.0);
    }

    #[test]
    fn test_red_light_blocks() {
        let mut map = RoadNetwork::grid(3, 3, 0.005, Coords::from_degrees(40.0, -80.0)).unwrap();
        let nodes = NodeTable::new();
        let mut rng = StdRng::seed_from_u64(1);
        map.set_lights_enabled(true);

        // Street 1, first block, heading into the four-way centre vertex
        let block = map.address_to_location(10, "Street 1").unwrap();
        let record = map.record(block.record).unwrap().clone();
        let centre = record.exit_vertex(true);
        let vertex = map.vertex_mut(centre).unwrap();
        while vertex.permitted_edge() == Some(record.id) {
            vertex.advance_phase();
        }

        let mut mobility = MobilityModel::new(MobilityKind::RandomWalk);
        mobility.place(RoadLocation::new(record.id, record.segment_count() - 1, 0.9, true), &map, &mut rng);
        let report = mobility.advance(&mut env(&mut map, &nodes, &mut rng), 60.0);
        assert!(report.blocked);
        assert_eq!(mobility.speed(), 0.0);
        let loc = mobility.location().unwrap();
        assert_eq!((loc.record, loc.progress), (record.id, 1.0));
    }

    #[test]
    fn test_trip_reaches_destination_and_parks() {
        let mut map = line();
        let nodes = NodeTable::new();
        let mut rng = StdRng::seed_from_u64(1);
        let [first, second] = [map.records()[0].id, map.records()[1].id];
        let mut trip = TripModel::new(TripKind::Dijkstra);
        let finish = RoadLocation::new(second, 0, 0.5, true);
        trip.set_waypoints(vec![finish]);

        let mut mobility = MobilityModel::new(MobilityKind::Trip);
        mobility.trip = Some(ModelHandle::default());
        mobility.place(RoadLocation::new(first, 0, 0.5, true), &map, &mut rng);

        let mut env = MobilityEnv {
            trip: Some(&mut trip),
            ..env(&mut map, &nodes, &mut rng)
        };
        // A full mile of travel, but the stop point is only one mile away
        let report = mobility.advance(&mut env, 200.0);
        assert_eq!(report.arrivals, 1);
        assert!(report.finished);
        assert!(mobility.is_parked());
        let loc = mobility.location().unwrap();
        assert_eq!(loc.record, second);
        assert!((loc.progress - 0.5).abs() < 1e-9);
        assert!((mobility.odometer - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_car_following_matches_leader() {
        use crate::simulation::nodes::NodeState;
        use crate::simulation::types::NodeKind;
        use slotmap::SlotMap;

        let mut map = line();
        let mut rng = StdRng::seed_from_u64(1);
        let first = map.records()[0].id;
        let mut handles: SlotMap<ModelHandle, ()> = SlotMap::with_key();

        let mut follower = MobilityModel::new(MobilityKind::CarFollowing);
        follower.place(RoadLocation::new(first, 0, 0.10, true), &map, &mut rng);

        let leader_loc = RoadLocation::new(first, 0, 0.12, true);
        let mut nodes = NodeTable::new();
        nodes
            .insert(NodeState {
                address: Address(2),
                kind: NodeKind::Car,
                handle: handles.insert(()),
                comm: None,
                position: map.position_at(&leader_loc).unwrap(),
                speed: 10.0,
                heading: 90.0,
                location: Some(leader_loc),
                lane: 0,
                active: true,
            })
            .unwrap();

        follower.advance(&mut env(&mut map, &nodes, &mut rng), 1.0);
        assert_eq!(follower.speed(), 10.0);
    }

    fn lone_leader(map: &RoadNetwork, loc: RoadLocation, speed: f64) -> NodeTable {
        use crate::simulation::nodes::NodeState;
        use crate::simulation::types::NodeKind;
        use slotmap::SlotMap;

        let mut handles: SlotMap<ModelHandle, ()> = SlotMap::with_key();
        let mut nodes = NodeTable::new();
        nodes
            .insert(NodeState {
                address: Address(2),
                kind: NodeKind::Car,
                handle: handles.insert(()),
                comm: None,
                position: map.position_at(&loc).unwrap(),
                speed,
                heading: 90.0,
                location: Some(loc),
                lane: 0,
                active: true,
            })
            .unwrap();
        nodes
    }

    #[test]
    fn test_car_following_has_no_default_distance_limit() {
        let mut map = line();
        let mut rng = StdRng::seed_from_u64(1);
        let first = map.records()[0].id;
        // A tenth of a mile ahead, well past 300 ft
        let nodes = lone_leader(&map, RoadLocation::new(first, 0, 0.20, true), 5.0);

        let mut follower = MobilityModel::new(MobilityKind::CarFollowing);
        follower.place(RoadLocation::new(first, 0, 0.10, true), &map, &mut rng);
        follower.advance(&mut env(&mut map, &nodes, &mut rng), 0.1);
        assert_eq!(follower.speed(), 5.0);
    }

    #[test]
    fn test_following_distance_limits_leaders_along_the_record() {
        let mut map = line();
        let mut rng = StdRng::seed_from_u64(1);
        let first = map.records()[0].id;
        let nodes = lone_leader(&map, RoadLocation::new(first, 0, 0.20, true), 5.0);

        let mut follower = MobilityModel::new(MobilityKind::CarFollowing);
        follower.following_distance = 300.0;
        follower.place(RoadLocation::new(first, 0, 0.10, true), &map, &mut rng);
        follower.advance(&mut env(&mut map, &nodes, &mut rng), 0.1);
        assert_eq!(follower.speed(), 25.0);

        follower.following_distance = 600.0;
        follower.advance(&mut env(&mut map, &nodes, &mut rng), 0.1);
        assert_eq!(follower.speed(), 5.0);
    }
}
