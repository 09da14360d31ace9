//! Address-keyed table of cars and infrastructure nodes
//!
//! The table mirrors the state every node last published. It sits behind an
//! `Arc<RwLock<_>>` so an observer thread can read it while the simulation
//! runs; any enumeration holds the guard for its whole duration. Cars on a
//! road are also indexed per (record, direction), ordered by position along
//! the record, for car-following queries.

use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::error::ModelError;
use super::types::{Address, Coords, ModelHandle, NodeKind, RecordId, RoadLocation};

/// Last published state of a car or infrastructure node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeState {
    pub address: Address,
    pub kind: NodeKind,
    /// The car or infrastructure model itself
    pub handle: ModelHandle,
    /// The node's comm model, if it has one
    pub comm: Option<ModelHandle>,
    pub position: Coords,
    /// Miles per hour
    pub speed: f64,
    /// Degrees clockwise from north
    pub heading: f64,
    pub location: Option<RoadLocation>,
    pub lane: u8,
    pub active: bool,
}

type OccupancyKey = (OrderedFloat<f64>, Address);

#[derive(Debug, Default)]
pub struct NodeTable {
    nodes: BTreeMap<Address, NodeState>,

    /// Maps (record, forwards) to cars ordered by position along the record
    occupancy: HashMap<(RecordId, bool), BTreeMap<OccupancyKey, u8>>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, state: NodeState) -> Result<(), ModelError> {
        if self.nodes.contains_key(&state.address) {
            return Err(ModelError::DuplicateAddress(state.address));
        }
        self.index(&state);
        self.nodes.insert(state.address, state);
        Ok(())
    }

    /// Replace a node's published state, re-indexing its road position
    pub fn update(&mut self, state: NodeState) {
        if let Some(previous) = self.nodes.remove(&state.address) {
            self.unindex(&previous);
        }
        self.index(&state);
        self.nodes.insert(state.address, state);
    }

    pub fn remove(&mut self, address: Address) -> Option<NodeState> {
        let state = self.nodes.remove(&address)?;
        self.unindex(&state);
        Some(state)
    }

    fn index(&mut self, state: &NodeState) {
        if let (NodeKind::Car, Some(loc)) = (state.kind, state.location) {
            self.occupancy
                .entry((loc.record, loc.forwards))
                .or_default()
                .insert((OrderedFloat(loc.ordinal()), state.address), state.lane);
        }
    }

    fn unindex(&mut self, state: &NodeState) {
        if let (NodeKind::Car, Some(loc)) = (state.kind, state.location) {
            if let Some(cars) = self.occupancy.get_mut(&(loc.record, loc.forwards)) {
                cars.remove(&(OrderedFloat(loc.ordinal()), state.address));
                if cars.is_empty() {
                    self.occupancy.remove(&(loc.record, loc.forwards));
                }
            }
        }
    }

    pub fn get(&self, address: Address) -> Option<&NodeState> {
        self.nodes.get(&address)
    }

    pub fn car(&self, address: Address) -> Option<&NodeState> {
        self.get(address).filter(|n| n.kind == NodeKind::Car)
    }

    pub fn infrastructure(&self, address: Address) -> Option<&NodeState> {
        self.get(address).filter(|n| n.kind == NodeKind::Infrastructure)
    }

    /// Returns false if no node has that address
    pub fn set_active(&mut self, address: Address, active: bool) -> bool {
        match self.nodes.get_mut(&address) {
            Some(node) => {
                node.active = active;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeState> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn car_count(&self) -> usize {
        self.iter().filter(|n| n.kind == NodeKind::Car).count()
    }

    pub fn infrastructure_count(&self) -> usize {
        self.iter().filter(|n| n.kind == NodeKind::Infrastructure).count()
    }

    /// Addresses of active cars within `range_feet` of `center`
    pub fn cars_in_range(&self, center: &Coords, range_feet: f64) -> Vec<Address> {
        self.iter()
            .filter(|n| n.kind == NodeKind::Car && n.active)
            .filter(|n| n.position.distance_feet(center) <= range_feet)
            .map(|n| n.address)
            .collect()
    }

    /// Every reachable node (active cars and infrastructure) within range
    pub fn nodes_in_range(&self, center: &Coords, range_feet: f64) -> Vec<&NodeState> {
        self.iter()
            .filter(|n| n.active || n.kind == NodeKind::Infrastructure)
            .filter(|n| n.position.distance_feet(center) <= range_feet)
            .collect()
    }

    /// Cars on the same record and direction strictly ahead of `loc`
    ///
    /// When `lane` is given only cars in that lane count.
    pub fn cars_ahead(&self, loc: &RoadLocation, lane: Option<u8>, exclude: Address) -> Vec<&NodeState> {
        let Some(cars) = self.occupancy.get(&(loc.record, loc.forwards)) else {
            return Vec::new();
        };
        let here = OrderedFloat(loc.ordinal());
        let ahead: Box<dyn Iterator<Item = (&OccupancyKey, &u8)>> = if loc.forwards {
            Box::new(cars.range((Bound::Excluded((here, Address(u32::MAX))), Bound::Unbounded)))
        } else {
            Box::new(cars.range((Bound::Unbounded, Bound::Excluded((here, Address(0))))))
        };
        ahead
            .filter(|(_, &car_lane)| lane.is_none_or(|l| l == car_lane))
            .filter(|((_, address), _)| *address != exclude)
            .filter_map(|((_, address), _)| self.nodes.get(address))
            .collect()
    }
}

/// Node table shared between the simulation and observers
pub type SharedNodeTable = Arc<RwLock<NodeTable>>;

/// Read access; a poisoned lock still yields the data
pub fn read_nodes(table: &SharedNodeTable) -> RwLockReadGuard<'_, NodeTable> {
    table.read().unwrap_or_else(PoisonError::into_inner)
}

pub fn write_nodes(table: &SharedNodeTable) -> RwLockWriteGuard<'_, NodeTable> {
    table.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn car(handles: &mut SlotMap<ModelHandle, ()>, address: u32, lon: f64, loc: Option<RoadLocation>, speed: f64) -> NodeState {
        NodeState {
            address: Address(address),
            kind: NodeKind::Car,
            handle: handles.insert(()),
            comm: None,
            position: Coords::from_degrees(40.0, lon),
            speed,
            heading: 90.0,
            location: loc,
            lane: 0,
            active: true,
        }
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let mut handles = SlotMap::with_key();
        let mut table = NodeTable::new();
        table.insert(car(&mut handles, 1, -80.0, None, 0.0)).unwrap();
        let err = table.insert(car(&mut handles, 1, -80.0, None, 0.0)).unwrap_err();
        assert_eq!(err.code(), 10);
    }

    #[test]
    fn test_cars_in_range_skips_inactive() {
        let mut handles = SlotMap::with_key();
        let mut table = NodeTable::new();
        table.insert(car(&mut handles, 1, -80.0, None, 0.0)).unwrap();
        table.insert(car(&mut handles, 2, -79.999, None, 0.0)).unwrap();
        table.insert(car(&mut handles, 3, -79.9, None, 0.0)).unwrap();

        let center = Coords::from_degrees(40.0, -80.0);
        assert_eq!(table.cars_in_range(&center, 1000.0), vec![Address(1), Address(2)]);
        table.set_active(Address(2), false);
        assert_eq!(table.cars_in_range(&center, 1000.0), vec![Address(1)]);
        assert!(!table.set_active(Address(9), false));
    }

    #[test]
    fn test_cars_ahead_by_direction() {
        let mut handles = SlotMap::with_key();
        let mut table = NodeTable::new();
        let record = RecordId(5);
        let at = |ordinal: f64, forwards: bool| {
            Some(RoadLocation::new(record, ordinal as usize, ordinal.fract(), forwards))
        };
        table.insert(car(&mut handles, 1, -80.0, at(0.2, true), 30.0)).unwrap();
        table.insert(car(&mut handles, 2, -80.0, at(0.6, true), 10.0)).unwrap();
        table.insert(car(&mut handles, 3, -80.0, at(1.5, true), 20.0)).unwrap();
        table.insert(car(&mut handles, 4, -80.0, at(0.9, false), 5.0)).unwrap();

        let me = RoadLocation::new(record, 0, 0.5, true);
        let ahead: Vec<Address> = table.cars_ahead(&me, None, Address(99)).iter().map(|n| n.address).collect();
        assert_eq!(ahead, vec![Address(2), Address(3)]);

        let back = RoadLocation::new(record, 1, 0.0, false);
        let ahead: Vec<Address> = table.cars_ahead(&back, None, Address(99)).iter().map(|n| n.address).collect();
        assert_eq!(ahead, vec![Address(4)]);

        // Moving a car re-indexes it
        let mut moved = table.get(Address(2)).unwrap().clone();
        moved.location = at(0.1, true);
        table.update(moved);
        let ahead: Vec<Address> = table.cars_ahead(&me, None, Address(99)).iter().map(|n| n.address).collect();
        assert_eq!(ahead, vec![Address(3)]);

        table.remove(Address(3));
        assert!(table.cars_ahead(&me, None, Address(99)).is_empty());
        assert!(table.cars_ahead(&me, Some(1), Address(99)).is_empty());
    }
}
