//! Simulation events
//!
//! An event is addressed to one model and carries its payload by value, so
//! a payload is dropped exactly once whether the event is dispatched,
//! discarded because its model is gone, or left in the queue at shutdown.

use std::cmp::Ordering;
use std::fmt;

use super::comm::RebroadcastMessage;
use super::packet::{SafetyPacket, SequenceId};
use super::types::{ModelHandle, SimTime};

/// Dispatch priorities; lower values run first at equal timestamps
pub mod priority {
    pub const TRAFFIC_LIGHT: u8 = 0;
    pub const CAR_UPDATE: u8 = 10;
    pub const PACKET_RECEIVED: u8 = 20;
    pub const REBROADCAST: u8 = 30;
    pub const MESSAGE_GENERATION: u8 = 40;
    pub const VISUALIZER: u8 = 90;
}

/// What an event asks its destination model to do
#[derive(Debug, Clone)]
pub enum EventKind {
    /// Periodic per-car position update
    CarUpdate,
    /// A copy of a message arrived over the wireless channel
    PacketReceived(SafetyPacket),
    /// A scheduled retransmission is due
    Rebroadcast(RebroadcastMessage),
    /// Time to originate the next safety message
    GenerateMessage,
    /// A message's lifetime has run out; forget what was heard of it
    HistoryExpired(SequenceId),
    /// Advance signal phases for one stagger bucket of vertices
    TrafficLightAdvance { bucket: usize },
    /// Presentation refresh; the core ignores it
    VisualizerRefresh,
}

impl EventKind {
    pub fn default_priority(&self) -> u8 {
        match self {
            EventKind::CarUpdate => priority::CAR_UPDATE,
            EventKind::PacketReceived(_) => priority::PACKET_RECEIVED,
            EventKind::Rebroadcast(_) => priority::REBROADCAST,
            EventKind::GenerateMessage => priority::MESSAGE_GENERATION,
            EventKind::HistoryExpired(_) => priority::REBROADCAST,
            EventKind::TrafficLightAdvance { .. } => priority::TRAFFIC_LIGHT,
            EventKind::VisualizerRefresh => priority::VISUALIZER,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::CarUpdate => write!(f, "CarUpdate"),
            EventKind::PacketReceived(packet) => {
                write!(f, "PacketReceived({} from {})", packet.id, packet.tx.address)
            }
            EventKind::Rebroadcast(pending) => write!(f, "Rebroadcast({})", pending.packet.id),
            EventKind::GenerateMessage => write!(f, "GenerateMessage"),
            EventKind::HistoryExpired(id) => write!(f, "HistoryExpired({})", id),
            EventKind::TrafficLightAdvance { bucket } => {
                write!(f, "TrafficLightAdvance(bucket {})", bucket)
            }
            EventKind::VisualizerRefresh => write!(f, "VisualizerRefresh"),
        }
    }
}

/// A single scheduled event
#[derive(Debug, Clone)]
pub struct Event {
    pub time: SimTime,
    pub priority: u8,
    /// Insertion sequence, assigned by the scheduler
    pub seq: u64,
    pub source: Option<ModelHandle>,
    pub dest: ModelHandle,
    pub kind: EventKind,
}

impl Event {
    /// An event at `time` using the kind's default priority
    pub fn new(time: SimTime, dest: ModelHandle, kind: EventKind) -> Self {
        Self {
            time,
            priority: kind.default_priority(),
            seq: 0,
            source: None,
            dest,
            kind,
        }
    }

    pub fn from_model(mut self, source: ModelHandle) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    fn key(&self) -> (SimTime, u8, u64) {
        (self.time, self.priority, self.seq)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Event {}

/// Reversed so `BinaryHeap` pops the smallest (time, priority, seq) first
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_event_ordering_by_time_then_priority() {
        let mut handles: SlotMap<ModelHandle, ()> = SlotMap::with_key();
        let dest = handles.insert(());

        let early = Event::new(SimTime::from_secs(1.0), dest, EventKind::VisualizerRefresh);
        let late = Event::new(SimTime::from_secs(2.0), dest, EventKind::TrafficLightAdvance { bucket: 0 });
        // Reversed ordering: the earlier event compares greater
        assert!(early > late);

        let light = Event::new(SimTime::from_secs(1.0), dest, EventKind::TrafficLightAdvance { bucket: 0 });
        let update = Event::new(SimTime::from_secs(1.0), dest, EventKind::CarUpdate);
        assert!(light > update);
    }

    #[test]
    fn test_builder_helpers() {
        let mut handles: SlotMap<ModelHandle, ()> = SlotMap::with_key();
        let dest = handles.insert(());
        let source = handles.insert(());
        let event = Event::new(SimTime::ZERO, dest, EventKind::CarUpdate)
            .from_model(source)
            .with_priority(3);
        assert_eq!(event.source, Some(source));
        assert_eq!(event.priority, 3);
        assert_eq!(event.kind.to_string(), "CarUpdate");
    }
}
