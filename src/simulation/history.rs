//! Per-message reception history kept by each comm model

use sorted_vec::SortedVec;
use std::collections::{BTreeSet, HashMap};

use super::packet::{SafetyPacket, SequenceId};
use super::types::{Address, Coords, SimTime};

/// One received copy of a message
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReceivedCopy {
    pub rx_time: SimTime,
    /// Where the transmitting node was when it sent this copy
    pub tx_position: Coords,
    pub tx_address: Address,
}

/// Everything a node has heard of one sequence id
#[derive(Debug, Clone)]
pub struct MessageHistory {
    /// Copies received before this time no longer count for suppression
    pub relevant_cutoff: SimTime,
    pub expires_at: SimTime,
    /// (rx time, transmitter) ordered by time
    tx_log: SortedVec<(SimTime, Address)>,
    copies: Vec<ReceivedCopy>,
}

impl MessageHistory {
    pub fn new(expires_at: SimTime) -> Self {
        Self {
            relevant_cutoff: SimTime::ZERO,
            expires_at,
            tx_log: SortedVec::new(),
            copies: Vec::new(),
        }
    }

    pub fn record(&mut self, rx_time: SimTime, tx_address: Address, tx_position: Coords) {
        self.tx_log.insert((rx_time, tx_address));
        self.copies.push(ReceivedCopy {
            rx_time,
            tx_position,
            tx_address,
        });
    }

    pub fn copies(&self) -> &[ReceivedCopy] {
        &self.copies
    }

    pub fn is_relevant(&self, copy: &ReceivedCopy) -> bool {
        copy.rx_time >= self.relevant_cutoff
    }

    /// Distinct transmitters heard at or after `since`, not counting `own`
    pub fn distinct_transmitters_since(&self, since: SimTime, own: Address) -> usize {
        let start = self.tx_log.partition_point(|&(time, _)| time < since);
        self.tx_log[start..]
            .iter()
            .map(|&(_, address)| address)
            .filter(|&address| address != own)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// True if a relevant copy was sent from farther than `distance_feet`
    /// from `reference`
    pub fn farther_copy_exists(&self, reference: &Coords, distance_feet: f64) -> bool {
        self.copies
            .iter()
            .filter(|copy| self.is_relevant(copy))
            .any(|copy| copy.tx_position.distance_feet(reference) > distance_feet)
    }

    pub fn is_expired(&self, now: SimTime) -> bool {
        now >= self.expires_at
    }
}

/// Histories for every message a node has heard, by sequence id
#[derive(Debug, Clone, Default)]
pub struct HistoryTable {
    entries: HashMap<SequenceId, MessageHistory>,
}

impl HistoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &SequenceId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &SequenceId) -> Option<&MessageHistory> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &SequenceId) -> Option<&mut MessageHistory> {
        self.entries.get_mut(id)
    }

    /// Record a received copy, creating the history on first sighting
    pub fn record_reception(&mut self, packet: &SafetyPacket, now: SimTime) -> &mut MessageHistory {
        let history = self
            .entries
            .entry(packet.id)
            .or_insert_with(|| MessageHistory::new(packet.expires_at()));
        history.record(now, packet.tx.address, packet.tx.position);
        history
    }

    /// Create an empty history for a message this node originated
    pub fn track(&mut self, packet: &SafetyPacket) -> &mut MessageHistory {
        self.entries
            .entry(packet.id)
            .or_insert_with(|| MessageHistory::new(packet.expires_at()))
    }

    /// Drop histories whose message has expired; returns how many
    pub fn prune(&mut self, now: SimTime) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, history| !history.is_expired(now));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
