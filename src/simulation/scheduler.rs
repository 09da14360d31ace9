//! Time/priority ordered event queue
//!
//! A `BinaryHeap` with reversed `Ord` on [`Event`] acts as a min-heap keyed by
//! `(time, priority, seq)`. The sequence number is assigned on insertion, so
//! events with equal time and priority dispatch in insertion order.

use log::warn;
use std::collections::BinaryHeap;

use super::event::Event;
use super::types::SimTime;

#[derive(Debug, Default)]
pub struct EventScheduler {
    queue: BinaryHeap<Event>,
    next_seq: u64,
    now: SimTime,
}

impl EventScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulation clock
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Insert an event in heap order
    ///
    /// Events stamped before the current clock are moved up to `now`, so the
    /// clock never runs backwards.
    pub fn add_event(&mut self, mut event: Event) {
        if event.time < self.now {
            warn!(
                "Event {} scheduled in the past ({} < {}), running it now",
                event.kind, event.time, self.now
            );
            event.time = self.now;
        }
        event.seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(event);
    }

    /// Pop the earliest event and advance the clock to its timestamp
    pub fn pop_next(&mut self) -> Option<Event> {
        let event = self.queue.pop()?;
        debug_assert!(event.time >= self.now, "clock moved backwards");
        self.now = self.now.max(event.time);
        Some(event)
    }

    /// Timestamp of the next event, if any
    pub fn peek_time(&self) -> Option<SimTime> {
        self.queue.peek().map(|event| event.time)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Move the clock forward without dispatching anything
    pub fn advance_to(&mut self, time: SimTime) {
        self.now = self.now.max(time);
    }

    /// Drop every pending event
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::event::EventKind;
    use crate::simulation::types::ModelHandle;
    use slotmap::SlotMap;

    fn dest() -> ModelHandle {
        let mut handles: SlotMap<ModelHandle, ()> = SlotMap::with_key();
        handles.insert(())
    }

    #[test]
    fn test_time_ordering() {
        let dest = dest();
        let mut sched = EventScheduler::new();
        for secs in [3.0, 1.0, 2.0] {
            sched.add_event(Event::new(SimTime::from_secs(secs), dest, EventKind::CarUpdate));
        }

        let times: Vec<f64> = std::iter::from_fn(|| sched.pop_next())
            .map(|e| e.time.as_secs())
            .collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
        assert_eq!(sched.now(), SimTime::from_secs(3.0));
    }

    #[test]
    fn test_insertion_order_on_ties() {
        let dest = dest();
        let mut sched = EventScheduler::new();
        for bucket in 0..4 {
            sched.add_event(Event::new(
                SimTime::from_secs(1.0),
                dest,
                EventKind::TrafficLightAdvance { bucket },
            ));
        }
        let buckets: Vec<usize> = std::iter::from_fn(|| sched.pop_next())
            .map(|e| match e.kind {
                EventKind::TrafficLightAdvance { bucket } => bucket,
                _ => usize::MAX,
            })
            .collect();
        assert_eq!(buckets, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_past_events_are_clamped_to_now() {
        let dest = dest();
        let mut sched = EventScheduler::new();
        sched.add_event(Event::new(SimTime::from_secs(5.0), dest, EventKind::CarUpdate));
        sched.pop_next();
        sched.add_event(Event::new(SimTime::from_secs(1.0), dest, EventKind::CarUpdate));
        assert_eq!(sched.peek_time(), Some(SimTime::from_secs(5.0)));
        sched.pop_next();
        assert_eq!(sched.now(), SimTime::from_secs(5.0));
        assert!(sched.is_empty());
    }
}
