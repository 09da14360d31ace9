//! Road map graph for routing
//!
//! Records (road segments with shape points) connect vertices
//! (intersections). Routing runs Dijkstra over a petgraph directed graph
//! holding one edge per permitted travel direction of each record.

use anyhow::{bail, Context, Result};
use petgraph::algo::astar;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rand::seq::IndexedRandom;
use rand::Rng;
use std::collections::HashMap;

use super::intersection::{SimIntersection, DEFAULT_MIN_SIGNAL_EDGES};
use super::types::{Coords, RecordId, RoadLocation, VertexId, FEET_PER_MILE};

/// Census-style road class, used for the default speed on a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoadClass {
    Highway,
    Primary,
    Secondary,
    Local,
}

impl RoadClass {
    /// Default speed in miles per hour
    pub fn speed_limit(self) -> f64 {
        match self {
            RoadClass::Highway => 65.0,
            RoadClass::Primary => 45.0,
            RoadClass::Secondary => 35.0,
            RoadClass::Local => 25.0,
        }
    }
}

/// Description of a record to add to the map
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub name: String,
    pub start: VertexId,
    pub end: VertexId,
    /// Shape points strictly between the two end vertices
    pub interior: Vec<Coords>,
    pub class: RoadClass,
    pub county: u32,
    pub lanes: u8,
    pub one_way: bool,
    /// House numbers at the start and end vertex
    pub address_range: Option<(u32, u32)>,
}

impl NewRecord {
    pub fn new(name: impl Into<String>, start: VertexId, end: VertexId) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            interior: Vec::new(),
            class: RoadClass::Local,
            county: 0,
            lanes: 1,
            one_way: false,
            address_range: None,
        }
    }
}

/// A road segment between two vertices
#[derive(Debug, Clone)]
pub struct MapRecord {
    pub id: RecordId,
    pub name: String,
    pub start: VertexId,
    pub end: VertexId,
    pub shape: Vec<Coords>,
    pub class: RoadClass,
    pub county: u32,
    pub lanes: u8,
    pub one_way: bool,
    pub address_range: Option<(u32, u32)>,
    /// Length in miles of each shape segment
    segment_lengths: Vec<f64>,
    /// Distance in miles from the start vertex to each shape point
    cumulative: Vec<f64>,
}

impl MapRecord {
    pub fn length(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    pub fn segment_count(&self) -> usize {
        self.segment_lengths.len()
    }

    pub fn segment_length(&self, shape_point: usize) -> f64 {
        self.segment_lengths.get(shape_point).copied().unwrap_or(0.0)
    }

    pub fn speed_limit(&self) -> f64 {
        self.class.speed_limit()
    }

    /// Distance in miles from the start vertex to `loc`
    pub fn offset_of(&self, loc: &RoadLocation) -> f64 {
        let sp = loc.shape_point.min(self.segment_count().saturating_sub(1));
        self.cumulative[sp] + loc.progress * self.segment_length(sp)
    }

    /// Distance left to the vertex the location is heading for
    pub fn distance_to_exit(&self, loc: &RoadLocation) -> f64 {
        if loc.forwards {
            self.length() - self.offset_of(loc)
        } else {
            self.offset_of(loc)
        }
    }

    /// The vertex reached by travelling along the record in `forwards` direction
    pub fn exit_vertex(&self, forwards: bool) -> VertexId {
        if forwards {
            self.end
        } else {
            self.start
        }
    }

    pub fn entry_vertex(&self, forwards: bool) -> VertexId {
        self.exit_vertex(!forwards)
    }

    /// Location just inside the record when entering it in `forwards` direction
    pub fn entry_location(&self, forwards: bool) -> RoadLocation {
        if forwards {
            RoadLocation::new(self.id, 0, 0.0, true)
        } else {
            RoadLocation::new(self.id, self.segment_count() - 1, 1.0, false)
        }
    }

    /// Location `offset` miles from the start vertex
    pub fn location_at_offset(&self, offset: f64, forwards: bool) -> RoadLocation {
        let offset = offset.clamp(0.0, self.length());
        let last = self.segment_count() - 1;
        let sp = (0..=last)
            .find(|&sp| offset <= self.cumulative[sp + 1])
            .unwrap_or(last);
        let seg = self.segment_length(sp);
        let progress = if seg > 0.0 {
            (offset - self.cumulative[sp]) / seg
        } else {
            0.0
        };
        RoadLocation::new(self.id, sp, progress, forwards)
    }

    pub fn position_at(&self, loc: &RoadLocation) -> Coords {
        let sp = loc.shape_point.min(self.segment_count() - 1);
        self.shape[sp].lerp(&self.shape[sp + 1], loc.progress)
    }

    /// Heading of travel at `loc`
    pub fn heading_at(&self, loc: &RoadLocation) -> f64 {
        let sp = loc.shape_point.min(self.segment_count() - 1);
        let (from, to) = if loc.forwards {
            (&self.shape[sp], &self.shape[sp + 1])
        } else {
            (&self.shape[sp + 1], &self.shape[sp])
        };
        from.heading_to(to)
    }

    pub fn allows(&self, forwards: bool) -> bool {
        forwards || !self.one_way
    }
}

/// One record traversed in one direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteLeg {
    pub record: RecordId,
    pub forwards: bool,
}

/// Ordered list of records to drive along
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Route {
    pub legs: Vec<RouteLeg>,
}

impl Route {
    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn records(&self) -> Vec<RecordId> {
        self.legs.iter().map(|leg| leg.record).collect()
    }

    /// Concatenate `next`, merging the shared leg at the join
    pub fn append(&mut self, next: Route) {
        let mut legs = next.legs.into_iter().peekable();
        if let (Some(last), Some(first)) = (self.legs.last(), legs.peek()) {
            if last == first {
                legs.next();
            }
        }
        self.legs.extend(legs);
    }
}

/// Edge data for the routing graph
#[derive(Debug, Clone, Copy)]
pub struct RoadEdge {
    pub record: RecordId,
    pub forwards: bool,
    /// Record length in feet, at least 1
    pub weight: u32,
}

/// Parse "123 Main St" into a house number and street name
pub fn parse_street_address(text: &str) -> Option<(u32, String)> {
    let text = text.trim();
    let (number, street) = text.split_once(char::is_whitespace)?;
    let number = number.parse().ok()?;
    let street = street.trim();
    (!street.is_empty()).then(|| (number, street.to_string()))
}

/// Parse "40.44, -79.94" into coordinates
pub fn parse_coords(text: &str) -> Option<Coords> {
    let (lat, lon) = text.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    ((-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon))
        .then(|| Coords::from_degrees(lat, lon))
}

type CachedRoute = Option<(u32, Vec<RouteLeg>)>;

/// The road map with routing and signal state
#[derive(Default)]
pub struct RoadNetwork {
    /// Directed routing graph, one edge per travel direction
    graph: DiGraph<VertexId, RoadEdge>,

    /// Node index of each vertex, indexed by vertex id
    vertex_nodes: Vec<NodeIndex>,

    vertices: Vec<SimIntersection>,

    records: Vec<MapRecord>,

    /// Cached vertex-to-vertex routes
    path_cache: HashMap<(VertexId, VertexId), CachedRoute>,

    /// Whether traffic signals are in force
    lights_enabled: bool,

    /// Edge count from which a vertex is signalled; None for the default
    min_signal_edges: Option<usize>,
}

impl RoadNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an intersection to the map
    pub fn add_vertex(&mut self, position: Coords) -> VertexId {
        let id = VertexId(self.vertices.len() as u32);
        let node = self.graph.add_node(id);
        self.vertex_nodes.push(node);
        self.vertices.push(SimIntersection::new(id, position));
        self.path_cache.clear();
        id
    }

    /// Adds a record and its travel directions to the routing graph
    pub fn add_record(&mut self, spec: NewRecord) -> Result<RecordId> {
        let start_pos = self
            .vertex(spec.start)
            .with_context(|| format!("Start vertex {} not found", spec.start))?
            .position;
        let end_pos = self
            .vertex(spec.end)
            .with_context(|| format!("End vertex {} not found", spec.end))?
            .position;
        if spec.start == spec.end {
            bail!("Record '{}' starts and ends at {}", spec.name, spec.start);
        }
        if spec.lanes == 0 {
            bail!("Record '{}' has no lanes", spec.name);
        }

        let mut shape = Vec::with_capacity(spec.interior.len() + 2);
        shape.push(start_pos);
        shape.extend(spec.interior);
        shape.push(end_pos);

        let segment_lengths: Vec<f64> = shape
            .windows(2)
            .map(|pair| pair[0].distance_miles(&pair[1]))
            .collect();
        let mut cumulative = Vec::with_capacity(shape.len());
        cumulative.push(0.0);
        for length in &segment_lengths {
            let last = cumulative.last().copied().unwrap_or(0.0);
            cumulative.push(last + length);
        }

        let id = RecordId(self.records.len() as u32);
        let record = MapRecord {
            id,
            name: spec.name,
            start: spec.start,
            end: spec.end,
            shape,
            class: spec.class,
            county: spec.county,
            lanes: spec.lanes,
            one_way: spec.one_way,
            address_range: spec.address_range,
            segment_lengths,
            cumulative,
        };

        let weight = ((record.length() * FEET_PER_MILE) as u32).max(1);
        let start_node = self.vertex_nodes[spec.start.0 as usize];
        let end_node = self.vertex_nodes[spec.end.0 as usize];
        self.graph.add_edge(
            start_node,
            end_node,
            RoadEdge {
                record: id,
                forwards: true,
                weight,
            },
        );
        if !record.one_way {
            self.graph.add_edge(
                end_node,
                start_node,
                RoadEdge {
                    record: id,
                    forwards: false,
                    weight,
                },
            );
        }

        self.vertices[spec.start.0 as usize].edges.push(id);
        self.vertices[spec.end.0 as usize].edges.push(id);
        self.records.push(record);
        self.path_cache.clear();
        Ok(id)
    }

    pub fn record(&self, id: RecordId) -> Option<&MapRecord> {
        self.records.get(id.0 as usize)
    }

    pub fn vertex(&self, id: VertexId) -> Option<&SimIntersection> {
        self.vertices.get(id.0 as usize)
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> Option<&mut SimIntersection> {
        self.vertices.get_mut(id.0 as usize)
    }

    pub fn records(&self) -> &[MapRecord] {
        &self.records
    }

    pub fn vertices(&self) -> &[SimIntersection] {
        &self.vertices
    }

    pub fn vertices_mut(&mut self) -> &mut [SimIntersection] {
        &mut self.vertices
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn lights_enabled(&self) -> bool {
        self.lights_enabled
    }

    pub fn set_lights_enabled(&mut self, enabled: bool) {
        self.lights_enabled = enabled;
    }

    /// Vertices with at least this many records carry a signal
    pub fn min_signal_edges(&self) -> usize {
        self.min_signal_edges.unwrap_or(DEFAULT_MIN_SIGNAL_EDGES)
    }

    pub fn set_min_signal_edges(&mut self, edges: usize) {
        self.min_signal_edges = Some(edges.max(1));
    }

    /// True if a car arriving on `from_record` may pass through `vertex`
    pub fn can_car_go_through(&self, vertex: VertexId, from_record: RecordId) -> bool {
        if !self.lights_enabled {
            return true;
        }
        let min_edges = self.min_signal_edges();
        self.vertex(vertex)
            .map(|v| v.can_proceed(from_record, min_edges))
            .unwrap_or(true)
    }

    pub fn position_at(&self, loc: &RoadLocation) -> Option<Coords> {
        self.record(loc.record).map(|r| r.position_at(loc))
    }

    pub fn heading_at(&self, loc: &RoadLocation) -> Option<f64> {
        self.record(loc.record).map(|r| r.heading_at(loc))
    }

    /// Records a car may take out of `vertex`, as (record, forwards)
    ///
    /// `from_record` is excluded so the caller decides about U-turns.
    pub fn successors(&self, vertex: VertexId, from_record: RecordId) -> Vec<RouteLeg> {
        let Some(v) = self.vertex(vertex) else {
            return Vec::new();
        };
        v.edges
            .iter()
            .filter(|&&id| id != from_record)
            .filter_map(|&id| self.record(id))
            .filter_map(|r| {
                let forwards = r.start == vertex;
                r.allows(forwards).then_some(RouteLeg {
                    record: r.id,
                    forwards,
                })
            })
            .collect()
    }

    /// Dijkstra between two vertices; (cost in feet, legs)
    fn vertex_route(&mut self, start: VertexId, end: VertexId) -> CachedRoute {
        if start == end {
            return Some((0, Vec::new()));
        }
        if let Some(cached) = self.path_cache.get(&(start, end)) {
            return cached.clone();
        }

        let start_node = *self.vertex_nodes.get(start.0 as usize)?;
        let end_node = *self.vertex_nodes.get(end.0 as usize)?;

        let result = astar(
            &self.graph,
            start_node,
            |node| node == end_node,
            |edge| edge.weight().weight,
            |_| 0, // Null heuristic = Dijkstra
        )
        .map(|(cost, nodes)| {
            let legs = nodes
                .windows(2)
                .filter_map(|pair| {
                    self.graph
                        .edges(pair[0])
                        .filter(|edge| edge.target() == pair[1])
                        .min_by_key(|edge| edge.weight().weight)
                        .map(|edge| RouteLeg {
                            record: edge.weight().record,
                            forwards: edge.weight().forwards,
                        })
                })
                .collect();
            (cost, legs)
        });

        self.path_cache.insert((start, end), result.clone());
        result
    }

    /// Records on the shortest path between two vertices; empty when the
    /// vertices coincide or no path exists
    pub fn vertex_path(&mut self, start: VertexId, end: VertexId) -> Vec<RecordId> {
        self.vertex_route(start, end)
            .map(|(_, legs)| legs.into_iter().map(|leg| leg.record).collect())
            .unwrap_or_default()
    }

    /// Shortest route from one road location to another
    ///
    /// The first leg is the start record and the last leg the finish record.
    /// `forwards_hint` pins the direction of travel on the start record.
    /// Returns an empty route when the locations coincide or no path exists.
    pub fn shortest_path(
        &mut self,
        start: &RoadLocation,
        finish: &RoadLocation,
        forwards_hint: Option<bool>,
    ) -> Route {
        let (Some(start_rec), Some(finish_rec)) =
            (self.record(start.record).cloned(), self.record(finish.record).cloned())
        else {
            return Route::default();
        };
        if start.record == finish.record && (start.ordinal() - finish.ordinal()).abs() < 1e-9 {
            return Route::default();
        }

        let directions: Vec<bool> = match forwards_hint {
            Some(forwards) => vec![forwards],
            None => vec![true, false],
        };

        let mut best: Option<(f64, Route)> = None;
        let mut consider = |cost: f64, legs: Vec<RouteLeg>| {
            if best.as_ref().is_none_or(|(best_cost, _)| cost < *best_cost) {
                best = Some((cost, Route { legs }));
            }
        };

        for forwards in directions.into_iter().filter(|&f| start_rec.allows(f)) {
            let start_leg = RouteLeg {
                record: start.record,
                forwards,
            };
            let start_offset = start_rec.offset_of(start);

            if start.record == finish.record {
                let finish_offset = finish_rec.offset_of(finish);
                let ahead = if forwards {
                    finish_offset > start_offset
                } else {
                    finish_offset < start_offset
                };
                if ahead {
                    consider((finish_offset - start_offset).abs(), vec![start_leg]);
                }
            }

            let exit = start_rec.exit_vertex(forwards);
            let to_exit = if forwards {
                start_rec.length() - start_offset
            } else {
                start_offset
            };

            for arrive_forwards in [true, false] {
                if !finish_rec.allows(arrive_forwards) {
                    continue;
                }
                let entry = finish_rec.entry_vertex(arrive_forwards);
                let finish_offset = finish_rec.offset_of(finish);
                let from_entry = if arrive_forwards {
                    finish_offset
                } else {
                    finish_rec.length() - finish_offset
                };
                let Some((middle_feet, middle)) = self.vertex_route(exit, entry) else {
                    continue;
                };

                let mut legs = Vec::with_capacity(middle.len() + 2);
                legs.push(start_leg);
                legs.extend(middle);
                legs.push(RouteLeg {
                    record: finish.record,
                    forwards: arrive_forwards,
                });
                let cost = to_exit + middle_feet as f64 / FEET_PER_MILE + from_entry;
                consider(cost, legs);
            }
        }

        best.map(|(_, route)| route).unwrap_or_default()
    }

    /// Concatenated shortest routes through each waypoint in turn
    ///
    /// The direction at the end of each leg is carried into the next search.
    /// Returns an empty route if any pair of waypoints is unreachable.
    pub fn route_through(&mut self, waypoints: &[RoadLocation], forwards_hint: Option<bool>) -> Route {
        let mut route = Route::default();
        let mut hint = forwards_hint;
        for pair in waypoints.windows(2) {
            let part = self.shortest_path(&pair[0], &pair[1], hint);
            if part.is_empty() {
                if pair[0].record == pair[1].record && (pair[0].ordinal() - pair[1].ordinal()).abs() < 1e-9 {
                    continue;
                }
                return Route::default();
            }
            hint = part.legs.last().map(|leg| leg.forwards);
            route.append(part);
        }
        route
    }

    /// Map a street address such as "120 Street 2" to a road location
    pub fn address_to_location(&self, number: u32, street: &str) -> Option<RoadLocation> {
        self.records.iter().find_map(|record| {
            let (from, to) = record.address_range?;
            if !record.name.eq_ignore_ascii_case(street.trim()) {
                return None;
            }
            let (low, high) = (from.min(to), from.max(to));
            if number < low || number > high {
                return None;
            }
            let fraction = if from == to {
                0.0
            } else {
                (number as f64 - from as f64) / (to as f64 - from as f64)
            };
            Some(record.location_at_offset(fraction * record.length(), true))
        })
    }

    /// Snap a coordinate onto the nearest record; returns the location and
    /// the snapping distance in miles
    pub fn coords_to_record(&self, position: &Coords) -> Option<(RoadLocation, f64)> {
        let mut closest: Option<(RoadLocation, f64)> = None;

        for record in &self.records {
            for (sp, pair) in record.shape.windows(2).enumerate() {
                let (a, b) = (&pair[0], &pair[1]);
                let scale = a.lat_degrees().to_radians().cos();
                let seg_x = (b.lon - a.lon) as f64 * scale;
                let seg_y = (b.lat - a.lat) as f64;
                let len_sq = seg_x * seg_x + seg_y * seg_y;
                let t = if len_sq < 1e-9 {
                    0.0
                } else {
                    let pos_x = (position.lon - a.lon) as f64 * scale;
                    let pos_y = (position.lat - a.lat) as f64;
                    ((pos_x * seg_x + pos_y * seg_y) / len_sq).clamp(0.0, 1.0)
                };
                let distance = position.distance_miles(&a.lerp(b, t));
                if closest.as_ref().is_none_or(|(_, best)| distance < *best) {
                    closest = Some((RoadLocation::new(record.id, sp, t, true), distance));
                }
            }
        }

        closest
    }

    /// Resolve a textual location: a street address, "lat, lon", or
    /// "random"
    pub fn locate(&self, text: &str, rng: &mut impl Rng) -> Option<RoadLocation> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("random") || text.is_empty() {
            return self.random_location(rng);
        }
        if let Some((number, street)) = parse_street_address(text) {
            if let Some(loc) = self.address_to_location(number, &street) {
                return Some(loc);
            }
        }
        parse_coords(text)
            .and_then(|coords| self.coords_to_record(&coords))
            .map(|(loc, _)| loc)
    }

    /// A uniformly chosen record, shape segment, progress and direction
    pub fn random_location(&self, rng: &mut impl Rng) -> Option<RoadLocation> {
        let record = self.records.choose(rng)?;
        let sp = rng.random_range(0..record.segment_count());
        let forwards = record.one_way || rng.random_bool(0.5);
        Some(RoadLocation::new(record.id, sp, rng.random_range(0.0..1.0), forwards))
    }

    /// A rectangular street grid for tests and demos
    ///
    /// Rows run east-west ("Street r"), columns north-south ("Avenue c").
    /// Each block gets one interior shape point and a 100-number address
    /// range. The middle row and column are two-lane primary roads.
    pub fn grid(rows: usize, cols: usize, spacing_degrees: f64, origin: Coords) -> Result<Self> {
        if rows < 1 || cols < 1 || rows * cols < 2 {
            bail!("Grid needs at least two vertices, got {}x{}", rows, cols);
        }
        let mut network = RoadNetwork::new();
        let mut ids = vec![vec![VertexId(0); cols]; rows];
        for (r, row) in ids.iter_mut().enumerate() {
            for (c, slot) in row.iter_mut().enumerate() {
                *slot = network.add_vertex(Coords::from_degrees(
                    origin.lat_degrees() + r as f64 * spacing_degrees,
                    origin.lon_degrees() + c as f64 * spacing_degrees,
                ));
            }
        }

        let add_block = |network: &mut RoadNetwork, name: String, a: VertexId, b: VertexId, block: usize, major: bool| -> Result<RecordId> {
            let mid = {
                let pa = network.vertex(a).context("grid vertex")?.position;
                let pb = network.vertex(b).context("grid vertex")?.position;
                pa.lerp(&pb, 0.5)
            };
            let base = block as u32 * 100;
            network.add_record(NewRecord {
                interior: vec![mid],
                class: if major { RoadClass::Primary } else { RoadClass::Local },
                county: 42003,
                lanes: if major { 2 } else { 1 },
                address_range: Some((base, base + 98)),
                ..NewRecord::new(name, a, b)
            })
        };

        for r in 0..rows {
            for c in 0..cols.saturating_sub(1) {
                add_block(&mut network, format!("Street {}", r), ids[r][c], ids[r][c + 1], c, r == rows / 2)?;
            }
        }
        for c in 0..cols {
            for r in 0..rows.saturating_sub(1) {
                add_block(&mut network, format!("Avenue {}", c), ids[r][c], ids[r + 1][c], r, c == cols / 2)?;
            }
        }

        Ok(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn origin() -> Coords {
        Coords::from_degrees(40.0, -80.0)
    }

    /// Three vertices in a line plus one isolated vertex
    fn line_map() -> (RoadNetwork, [VertexId; 4], [RecordId; 2]) {
        let mut net = RoadNetwork::new();
        let a = net.add_vertex(Coords::from_degrees(40.0, -80.0));
        let b = net.add_vertex(Coords::from_degrees(40.0, -79.99));
        let c = net.add_vertex(Coords::from_degrees(40.0, -79.98));
        let lonely = net.add_vertex(Coords::from_degrees(41.0, -79.0));
        let ab = net
            .add_record(NewRecord {
                interior: vec![Coords::from_degrees(40.0, -79.995)],
                address_range: Some((100, 198)),
                ..NewRecord::new("Main St", a, b)
            })
            .unwrap();
        let bc = net.add_record(NewRecord::new("Main St", b, c)).unwrap();
        (net, [a, b, c, lonely], [ab, bc])
    }

    #[test]
    fn test_vertex_path_same_and_disconnected() {
        let (mut net, [a, _, c, lonely], [ab, bc]) = line_map();
        assert!(net.vertex_path(a, a).is_empty());
        assert!(net.vertex_path(a, lonely).is_empty());
        assert_eq!(net.vertex_path(a, c), vec![ab, bc]);
        assert_eq!(net.vertex_path(c, a), vec![bc, ab]);
    }

    #[test]
    fn test_record_geometry() {
        let (net, _, [ab, _]) = line_map();
        let record = net.record(ab).unwrap();
        assert_eq!(record.segment_count(), 2);
        let half = record.location_at_offset(record.length() / 2.0, true);
        assert!((record.offset_of(&half) - record.length() / 2.0).abs() < 1e-9);
        let quarter = record.location_at_offset(record.length() * 0.75, true);
        assert_eq!(quarter.shape_point, 1);
        assert!((quarter.progress - 0.5).abs() < 1e-6);
        assert!((record.heading_at(&half) - 90.0).abs() < 1e-3);
        assert!((record.heading_at(&half.reversed()) - 270.0).abs() < 1e-3);
        assert!((record.distance_to_exit(&half) - record.length() / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_shortest_path_between_locations() {
        let (mut net, _, [ab, bc]) = line_map();
        let start = RoadLocation::new(ab, 0, 0.5, true);
        let finish = RoadLocation::new(bc, 0, 0.5, true);

        let route = net.shortest_path(&start, &finish, None);
        assert_eq!(route.records(), vec![ab, bc]);
        assert!(route.legs.iter().all(|leg| leg.forwards));

        // Same record, finish behind: turning around beats driving away
        let behind = RoadLocation::new(ab, 0, 0.1, true);
        let route = net.shortest_path(&start, &behind, None);
        assert_eq!(route.legs, vec![RouteLeg { record: ab, forwards: false }]);

        assert!(net.shortest_path(&start, &start, None).is_empty());
    }

    #[test]
    fn test_route_through_waypoints_tracks_direction() {
        let (mut net, _, [ab, bc]) = line_map();
        let onward = [
            RoadLocation::new(ab, 0, 0.2, true),
            RoadLocation::new(ab, 1, 0.5, true),
            RoadLocation::new(bc, 0, 0.5, true),
        ];
        let route = net.route_through(&onward, Some(true));
        assert_eq!(route.records(), vec![ab, bc]);
        assert!(route.legs.iter().all(|leg| leg.forwards));

        // Arriving forwards on bc pins the next search forwards, so the
        // vehicle runs out to the dead end and turns around there
        let back = [
            RoadLocation::new(ab, 0, 0.2, true),
            RoadLocation::new(bc, 0, 0.5, true),
            RoadLocation::new(ab, 1, 0.5, true),
        ];
        let route = net.route_through(&back, Some(true));
        assert_eq!(route.records(), vec![ab, bc, bc, ab]);
        assert_eq!(
            route.legs.iter().map(|leg| leg.forwards).collect::<Vec<_>>(),
            vec![true, true, false, false]
        );
    }

    #[test]
    fn test_one_way_records_route_only_forwards() {
        let mut net = RoadNetwork::new();
        let a = net.add_vertex(origin());
        let b = net.add_vertex(Coords::from_degrees(40.0, -79.99));
        net.add_record(NewRecord {
            one_way: true,
            ..NewRecord::new("One Way", a, b)
        })
        .unwrap();
        assert_eq!(net.vertex_path(a, b).len(), 1);
        assert!(net.vertex_path(b, a).is_empty());
        assert!(net.successors(b, RecordId::INVALID).is_empty());
    }

    #[test]
    fn test_address_and_coordinate_lookup() {
        let (net, _, [ab, _]) = line_map();
        let loc = net.address_to_location(149, "main st").unwrap();
        assert_eq!(loc.record, ab);
        let record = net.record(ab).unwrap();
        assert!((record.offset_of(&loc) / record.length() - 0.5).abs() < 1e-6);
        assert!(net.address_to_location(500, "Main St").is_none());

        let near = Coords::from_degrees(40.0001, -79.9975);
        let (snapped, distance) = net.coords_to_record(&near).unwrap();
        assert_eq!(snapped.record, ab);
        assert_eq!(snapped.shape_point, 0);
        assert!(distance < 0.01);

        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(net.locate("149 Main St", &mut rng), Some(loc));
        assert_eq!(net.locate("40.0001, -79.9975", &mut rng).map(|l| l.record), Some(ab));
    }

    #[test]
    fn test_grid_shape() {
        let net = RoadNetwork::grid(3, 4, 0.002, origin()).unwrap();
        assert_eq!(net.vertex_count(), 12);
        // 3 rows * 3 blocks + 4 columns * 2 blocks
        assert_eq!(net.record_count(), 17);
        assert!(net.records().iter().any(|r| r.lanes == 2));
        assert!(RoadNetwork::grid(1, 1, 0.002, origin()).is_err());
    }

    #[test]
    fn test_add_record_validates_vertices() {
        let mut net = RoadNetwork::new();
        let a = net.add_vertex(origin());
        assert!(net.add_record(NewRecord::new("Loop", a, a)).is_err());
        assert!(net.add_record(NewRecord::new("Nowhere", a, VertexId(9))).is_err());
    }
}
