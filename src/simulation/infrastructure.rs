//! Fixed roadside node model

use anyhow::Result;
use log::warn;

use super::error::ModelError;
use super::event::Event;
use super::nodes::NodeState;
use super::params::{ParamKind, ParamReader, ParamSpec};
use super::registry::{InitContext, ModelCategory, ModelType, SimModel};
use super::road_network::parse_coords;
use super::types::{Address, Coords, ModelHandle, NodeKind, RoadLocation};
use super::world::SimContext;

const ADDRESS: ParamSpec = ParamSpec::new("ADDRESS", ParamKind::Address, "");
/// "lat, lon" or a street address
const LOCATION: ParamSpec = ParamSpec::new("LOCATION", ParamKind::Text, "");
const COMM: ParamSpec = ParamSpec::new("COMM", ParamKind::ModelRef, "");

pub const INFRASTRUCTURE_PARAMS: &[ParamSpec] = &[ADDRESS, LOCATION, COMM];

#[derive(Debug, Clone, Default)]
pub struct InfrastructureNodeModel {
    address: Address,
    position: Coords,
    /// Nearest road point, when the node sits on a mapped road
    location: Option<RoadLocation>,
    comm: Option<ModelHandle>,
}

impl InfrastructureNodeModel {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn position(&self) -> Coords {
        self.position
    }

    pub fn comm(&self) -> Option<ModelHandle> {
        self.comm
    }
}

impl SimModel for InfrastructureNodeModel {
    fn model_type(&self) -> ModelType {
        ModelType::Infrastructure
    }

    fn init(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ModelError> {
        let (address, location, comm) = {
            let reader = ParamReader::new(ctx.name, ctx.params);
            reader.warn_unknown(INFRASTRUCTURE_PARAMS);
            (
                reader.address(&ADDRESS)?,
                reader.text(&LOCATION),
                reader.model_ref(&COMM),
            )
        };
        self.address = address.ok_or_else(|| ModelError::UnparseableAddress(String::new()))?;

        // Raw coordinates are used as given; anything else is looked up on the map
        let invalid = |reason: &str| ModelError::InvalidParameter {
            key: LOCATION.key.to_string(),
            value: location.clone(),
            reason: reason.to_string(),
        };
        if location.is_empty() || location.eq_ignore_ascii_case("random") {
            return Err(invalid("an infrastructure node needs a fixed location"));
        }
        match parse_coords(&location) {
            Some(position) => {
                self.position = position;
                self.location = ctx.map.coords_to_record(&position).map(|(loc, _)| loc);
            }
            None => {
                let loc = ctx
                    .map
                    .locate(&location, &mut *ctx.rng)
                    .ok_or_else(|| invalid("no matching road location"))?;
                self.position = ctx
                    .map
                    .position_at(&loc)
                    .ok_or_else(|| invalid("no matching road location"))?;
                self.location = Some(loc);
            }
        }

        self.comm = comm
            .map(|name| ctx.require(&name, ModelCategory::Comm))
            .transpose()?;
        Ok(())
    }

    fn process_event(&mut self, _ctx: &mut SimContext<'_>, event: Event) -> Result<()> {
        warn!("Infrastructure node {} ignoring unexpected event {}", self.address, event.kind);
        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut SimContext<'_>) {
        ctx.registry.nodes_mut().remove(self.address);
    }

    fn node_state(&self, handle: ModelHandle) -> Option<NodeState> {
        Some(NodeState {
            address: self.address,
            kind: NodeKind::Infrastructure,
            handle,
            comm: self.comm,
            position: self.position,
            speed: 0.0,
            heading: 0.0,
            location: self.location,
            lane: 0,
            active: true,
        })
    }
}
