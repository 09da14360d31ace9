//! Run-wide counters

use log::info;
use std::collections::HashMap;

use super::packet::SequenceId;

/// Counters updated by models as the simulation runs
#[derive(Debug, Clone, Default)]
pub struct SimStats {
    pub events_dispatched: u64,
    /// Events whose destination model no longer exists
    pub events_discarded: u64,
    pub event_errors: u64,
    pub messages_originated: u64,
    pub transmissions: u64,
    pub receptions: u64,
    pub duplicates: u64,
    pub rebroadcasts_suppressed: u64,
    pub messages_expired: u64,
    /// Times a vehicle was held at a red light
    pub vehicles_blocked: u64,
    pub trips_completed: u64,
    /// Nodes that heard each message at least once
    reach: HashMap<SequenceId, u64>,
}

impl SimStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_first_reception(&mut self, id: SequenceId) {
        *self.reach.entry(id).or_default() += 1;
    }

    /// Nodes reached by `id`, not counting its originator
    pub fn reach_of(&self, id: &SequenceId) -> u64 {
        self.reach.get(id).copied().unwrap_or(0)
    }

    /// Mean number of nodes reached per originated message
    pub fn mean_reach(&self) -> f64 {
        if self.messages_originated == 0 {
            return 0.0;
        }
        self.reach.values().sum::<u64>() as f64 / self.messages_originated as f64
    }

    /// Receptions that were not the first copy a node heard
    pub fn redundancy(&self) -> f64 {
        if self.receptions == 0 {
            0.0
        } else {
            self.duplicates as f64 / self.receptions as f64
        }
    }

    pub fn log_summary(&self, elapsed_secs: f64) {
        info!("=== SIMULATION COMPLETE ===");
        info!("Simulated time: {:.2}s", elapsed_secs);
        info!(
            "Events dispatched: {} (discarded {}, failed {})",
            self.events_dispatched, self.events_discarded, self.event_errors
        );
        info!("Messages originated: {}", self.messages_originated);
        info!("Transmissions: {}", self.transmissions);
        info!(
            "Receptions: {} ({:.1}% duplicates)",
            self.receptions,
            self.redundancy() * 100.0
        );
        info!("Mean reach per message: {:.1} nodes", self.mean_reach());
        info!("Rebroadcasts suppressed: {}", self.rebroadcasts_suppressed);
        info!("Messages expired in queue: {}", self.messages_expired);
        info!(
            "Vehicles held at lights: {}, trips completed: {}",
            self.vehicles_blocked, self.trips_completed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::types::Address;

    #[test]
    fn test_reach_and_redundancy() {
        let mut stats = SimStats::new();
        assert_eq!(stats.mean_reach(), 0.0);
        assert_eq!(stats.redundancy(), 0.0);

        let a = SequenceId { source: Address(1), counter: 0 };
        let b = SequenceId { source: Address(1), counter: 1 };
        stats.messages_originated = 2;
        stats.note_first_reception(a);
        stats.note_first_reception(a);
        stats.note_first_reception(a);
        stats.note_first_reception(b);
        stats.receptions = 8;
        stats.duplicates = 4;

        assert_eq!(stats.reach_of(&a), 3);
        assert_eq!(stats.mean_reach(), 2.0);
        assert_eq!(stats.redundancy(), 0.5);
    }
}
