//! Intersections and traffic signal phases
//!
//! Each vertex permits one incoming record at a time. The traffic light model
//! advances the permitted record round-robin, one stagger bucket of vertices
//! per event, so that neighbouring signals do not all switch together.

use anyhow::Result;
use log::{debug, warn};

use super::error::ModelError;
use super::event::{Event, EventKind};
use super::params::{ParamKind, ParamReader, ParamSpec};
use super::registry::{InitContext, ModelType, SimModel};
use super::types::{Coords, RecordId, VertexId};
use super::world::SimContext;

/// An intersection in the road map
#[derive(Debug, Clone)]
pub struct SimIntersection {
    pub id: VertexId,
    pub position: Coords,
    /// Records meeting at this vertex
    pub edges: Vec<RecordId>,
    /// Index into `edges` of the record currently given a green light
    permitted: usize,
}

impl SimIntersection {
    pub fn new(id: VertexId, position: Coords) -> Self {
        Self {
            id,
            position,
            edges: Vec::new(),
            permitted: 0,
        }
    }

    /// Whether the vertex is signalled when signals need `min_edges` records
    pub fn has_signal(&self, min_edges: usize) -> bool {
        !self.edges.is_empty() && self.edges.len() >= min_edges
    }

    pub fn permitted_edge(&self) -> Option<RecordId> {
        self.edges.get(self.permitted).copied()
    }

    pub fn permitted_index(&self) -> usize {
        self.permitted
    }

    /// Move the green light to the next record
    pub fn advance_phase(&mut self) {
        if !self.edges.is_empty() {
            self.permitted = (self.permitted + 1) % self.edges.len();
        }
    }

    /// Check if a car arriving on `from_record` can proceed
    pub fn can_proceed(&self, from_record: RecordId, min_edges: usize) -> bool {
        !self.has_signal(min_edges) || self.permitted_edge() == Some(from_record)
    }
}

/// Plain through-roads and dead ends are unsignalled unless configured
pub const DEFAULT_MIN_SIGNAL_EDGES: usize = 3;

const PERIOD: ParamSpec = ParamSpec::bounded("PERIOD", ParamKind::Float, "10", 0.01, 3600.0);
const BUCKETS: ParamSpec = ParamSpec::bounded("BUCKETS", ParamKind::Int, "8", 1.0, 1000.0);
/// 1 signals every vertex
const MIN_SIGNAL_EDGES: ParamSpec = ParamSpec::bounded("MIN_SIGNAL_EDGES", ParamKind::Int, "3", 1.0, 64.0);

pub const TRAFFIC_LIGHT_PARAMS: &[ParamSpec] = &[PERIOD, BUCKETS, MIN_SIGNAL_EDGES];

/// Drives signal phases for every vertex in the map
#[derive(Debug, Clone)]
pub struct TrafficLightModel {
    /// Seconds each phase lasts
    pub period: f64,
    /// Number of stagger buckets the vertices are split into
    pub buckets: usize,
    pub min_signal_edges: usize,
    pub phases_advanced: u64,
}

impl Default for TrafficLightModel {
    fn default() -> Self {
        Self {
            period: 10.0,
            buckets: 8,
            min_signal_edges: DEFAULT_MIN_SIGNAL_EDGES,
            phases_advanced: 0,
        }
    }
}

impl TrafficLightModel {
    fn advance_bucket(&mut self, ctx: &mut SimContext<'_>, bucket: usize) {
        let buckets = self.buckets;
        let min_edges = ctx.map.min_signal_edges();
        let mut advanced = 0;
        for vertex in ctx
            .map
            .vertices_mut()
            .iter_mut()
            .filter(|v| v.id.0 as usize % buckets == bucket && v.has_signal(min_edges))
        {
            vertex.advance_phase();
            advanced += 1;
        }
        self.phases_advanced += advanced;
        debug!(
            "Advanced {} signals in bucket {} at {}",
            advanced, bucket, ctx.now
        );
    }
}

impl SimModel for TrafficLightModel {
    fn model_type(&self) -> ModelType {
        ModelType::TrafficLights
    }

    fn init(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ModelError> {
        let reader = ParamReader::new(ctx.name, ctx.params);
        reader.warn_unknown(TRAFFIC_LIGHT_PARAMS);
        self.period = reader.float(&PERIOD)?;
        self.buckets = reader.int(&BUCKETS)? as usize;
        self.min_signal_edges = reader.int(&MIN_SIGNAL_EDGES)? as usize;
        Ok(())
    }

    fn pre_run(&mut self, ctx: &mut SimContext<'_>) -> Result<()> {
        ctx.map.set_lights_enabled(true);
        ctx.map.set_min_signal_edges(self.min_signal_edges);
        let stagger = self.period / self.buckets as f64;
        for bucket in 0..self.buckets {
            let at = ctx.now.after(stagger * (bucket + 1) as f64);
            ctx.schedule_self(at, EventKind::TrafficLightAdvance { bucket });
        }
        Ok(())
    }

    fn process_event(&mut self, ctx: &mut SimContext<'_>, event: Event) -> Result<()> {
        match event.kind {
            EventKind::TrafficLightAdvance { bucket } => {
                self.advance_bucket(ctx, bucket);
                let next = ctx.now.after(self.period);
                ctx.schedule_self(next, EventKind::TrafficLightAdvance { bucket });
            }
            other => warn!("Traffic lights ignoring unexpected event {}", other),
        }
        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut SimContext<'_>) {
        ctx.map.set_lights_enabled(false);
    }
}
