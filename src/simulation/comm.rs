//! Flooding protocols for safety messages
//!
//! Every node that hears a message for the first time queues it for
//! periodic rebroadcast until it expires. The simple protocol uses a fixed
//! interval; the adaptive protocols stretch the interval with distance from
//! the event and back off when neighbours are already relaying, and can
//! suppress a relay entirely when a node farther from the event has
//! already sent it.

use anyhow::Result;
use log::{debug, trace, warn};
use rand::Rng;

use super::error::ModelError;
use super::event::{Event, EventKind};
use super::history::HistoryTable;
use super::packet::{PacketStamp, SafetyPacket, SequenceId};
use super::params::{ParamKind, ParamReader, ParamSpec};
use super::registry::{InitContext, ModelType, SimModel};
use super::types::{Address, Coords, ModelHandle, NodeKind, SimTime};
use super::world::SimContext;

/// Backoff doubles the interval per distinct neighbour, up to this many times
pub const MAX_BACKOFF_EXPONENT: u32 = 5;

const REBROADCAST_INTERVAL: ParamSpec =
    ParamSpec::bounded("REBROADCAST_INTERVAL", ParamKind::Float, "1", 0.001, 3600.0);
const MAX_REBROADCAST_INTERVAL: ParamSpec =
    ParamSpec::bounded("MAX_REBROADCAST_INTERVAL", ParamKind::Float, "10", 0.001, 3600.0);
const DISTANCE_LOW: ParamSpec = ParamSpec::bounded("DISTANCE_LOW", ParamKind::Float, "500", 0.0, 1e7);
const DISTANCE_HIGH: ParamSpec = ParamSpec::bounded("DISTANCE_HIGH", ParamKind::Float, "5000", 0.0, 1e7);
const BACKOFF_WINDOW: ParamSpec = ParamSpec::bounded("BACKOFF_WINDOW", ParamKind::Float, "1", 0.0, 3600.0);
const JITTER: ParamSpec = ParamSpec::new("JITTER", ParamKind::Boolean, "Y");
const FAST_FIRST_HOP: ParamSpec = ParamSpec::new("FAST_FIRST_HOP", ParamKind::Boolean, "N");
const FIRST_HOP_WINDOW: ParamSpec =
    ParamSpec::bounded("FIRST_HOP_WINDOW", ParamKind::Float, "10m", 1e-6, 3600.0);
const ADAPTIVE_BACKOFF: ParamSpec = ParamSpec::new("ADAPTIVE_BACKOFF", ParamKind::Boolean, "Y");
const DISTANCE_RATE: ParamSpec = ParamSpec::new("DISTANCE_RATE", ParamKind::Boolean, "Y");
const LOCATION_SUPPRESSION: ParamSpec = ParamSpec::new("LOCATION_SUPPRESSION", ParamKind::Boolean, "N");
const RANGE: ParamSpec = ParamSpec::bounded("RANGE", ParamKind::Float, "1000", 0.0, 1e7);
const MESSAGE_INTERVAL: ParamSpec = ParamSpec::bounded("MESSAGE_INTERVAL", ParamKind::Float, "0", 0.0, 86400.0);
const MESSAGE_LIFETIME: ParamSpec =
    ParamSpec::bounded("MESSAGE_LIFETIME", ParamKind::Float, "10", 0.001, 86400.0);
const TX_DELAY: ParamSpec = ParamSpec::bounded("TX_DELAY", ParamKind::Float, "1m", 0.0, 60.0);
const GATEWAY: ParamSpec = ParamSpec::new("GATEWAY", ParamKind::Boolean, "N");

pub const COMM_PARAMS: &[ParamSpec] = &[
    REBROADCAST_INTERVAL,
    MAX_REBROADCAST_INTERVAL,
    DISTANCE_LOW,
    DISTANCE_HIGH,
    BACKOFF_WINDOW,
    JITTER,
    FAST_FIRST_HOP,
    FIRST_HOP_WINDOW,
    ADAPTIVE_BACKOFF,
    DISTANCE_RATE,
    LOCATION_SUPPRESSION,
    RANGE,
    MESSAGE_INTERVAL,
    MESSAGE_LIFETIME,
    TX_DELAY,
    GATEWAY,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommKind {
    Simple,
    Adaptive,
    Groove,
}

/// Protocol settings; intervals in seconds, distances in feet
#[derive(Debug, Clone, PartialEq)]
pub struct CommConfig {
    pub rebroadcast_interval: f64,
    pub max_rebroadcast_interval: f64,
    pub distance_low: f64,
    pub distance_high: f64,
    pub backoff_window: f64,
    pub jitter: bool,
    pub fast_first_hop: bool,
    pub first_hop_window: f64,
    pub adaptive_backoff: bool,
    pub distance_rate: bool,
    pub location_suppression: bool,
    pub range: f64,
    /// Zero disables periodic origination
    pub message_interval: f64,
    pub message_lifetime: f64,
    pub tx_delay: f64,
    /// Also deliver to every infrastructure node regardless of range
    pub gateway: bool,
}

impl Default for CommConfig {
    fn default() -> Self {
        Self {
            rebroadcast_interval: 1.0,
            max_rebroadcast_interval: 10.0,
            distance_low: 500.0,
            distance_high: 5000.0,
            backoff_window: 1.0,
            jitter: true,
            fast_first_hop: false,
            first_hop_window: 0.01,
            adaptive_backoff: true,
            distance_rate: true,
            location_suppression: false,
            range: 1000.0,
            message_interval: 0.0,
            message_lifetime: 10.0,
            tx_delay: 0.001,
            gateway: false,
        }
    }
}

/// Interval for a node `distance` feet from the event
///
/// Between the two thresholds the rebroadcast frequency falls linearly from
/// `1 / base` to `1 / max`. A max interval shorter than the base is treated
/// as equal to it.
pub fn distance_shaped_interval(distance: f64, config: &CommConfig) -> f64 {
    let base = config.rebroadcast_interval;
    if distance <= config.distance_low {
        return base;
    }
    if distance >= config.distance_high {
        return config.max_rebroadcast_interval.max(base);
    }
    let f_high = 1.0 / base;
    let f_low = (1.0 / config.max_rebroadcast_interval).min(f_high);
    let fraction = (distance - config.distance_low) / (config.distance_high - config.distance_low);
    1.0 / (f_high - (f_high - f_low) * fraction)
}

/// `2^min(neighbours, 5)`
pub fn backoff_multiplier(neighbours: usize) -> f64 {
    let exponent = (neighbours as u32).min(MAX_BACKOFF_EXPONENT);
    f64::from(1u32 << exponent)
}

/// A message waiting for its next transmission window
#[derive(Debug, Clone, PartialEq)]
pub struct RebroadcastMessage {
    pub packet: SafetyPacket,
    pub window_low: SimTime,
    pub window_high: SimTime,
    /// Transmissions made from this queue entry so far
    pub transmissions: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommCounters {
    pub originated: u64,
    pub transmitted: u64,
    pub received: u64,
    pub duplicates: u64,
    pub suppressed: u64,
    pub expired: u64,
}

#[derive(Debug, Clone)]
pub struct CommModel {
    kind: CommKind,
    config: CommConfig,
    /// The node this model transmits for
    owner: Option<(Address, NodeKind)>,
    next_counter: u32,
    history: HistoryTable,
    counters: CommCounters,
}

impl CommModel {
    pub fn new(kind: CommKind) -> Self {
        Self {
            kind,
            config: CommConfig::default(),
            owner: None,
            next_counter: 0,
            history: HistoryTable::new(),
            counters: CommCounters::default(),
        }
    }

    pub fn kind(&self) -> CommKind {
        self.kind
    }

    pub fn config(&self) -> &CommConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut CommConfig {
        &mut self.config
    }

    pub fn counters(&self) -> &CommCounters {
        &self.counters
    }

    pub fn history(&self) -> &HistoryTable {
        &self.history
    }

    pub fn attach(&mut self, address: Address, kind: NodeKind) {
        self.owner = Some((address, kind));
    }

    pub fn detach(&mut self) {
        self.owner = None;
    }

    pub fn owner(&self) -> Option<Address> {
        self.owner.map(|(address, _)| address)
    }

    /// How far back copies count for location suppression
    fn relevant_window(&self) -> f64 {
        match self.kind {
            CommKind::Groove => self.config.rebroadcast_interval,
            CommKind::Simple | CommKind::Adaptive => self.config.max_rebroadcast_interval,
        }
    }

    fn own_position(&self, ctx: &SimContext<'_>) -> Option<Coords> {
        let address = self.owner()?;
        ctx.registry.nodes().get(address).map(|node| node.position)
    }

    /// Length of the next rebroadcast window in seconds
    pub fn rebroadcast_interval(&self, ctx: &SimContext<'_>, packet: &SafetyPacket, first: bool) -> f64 {
        let config = &self.config;
        if self.kind == CommKind::Simple {
            return config.rebroadcast_interval;
        }
        if first && config.fast_first_hop {
            return config.first_hop_window;
        }
        let Some(own) = self.owner() else {
            return config.rebroadcast_interval;
        };

        // Without a known position only the distance shaping is skipped
        let mut interval = config.rebroadcast_interval;
        if config.distance_rate {
            if let Some(position) = self.own_position(ctx) {
                let distance = position.distance_feet(&packet.reference_position());
                interval = distance_shaped_interval(distance, config);
            }
        }
        if config.adaptive_backoff {
            let since = ctx.now.before(config.backoff_window);
            let neighbours = self
                .history
                .get(&packet.id)
                .map_or(0, |history| history.distinct_transmitters_since(since, own));
            interval *= backoff_multiplier(neighbours);
        }
        interval
    }

    /// Whether this node should transmit `packet` now
    fn should_rebroadcast(&mut self, ctx: &SimContext<'_>, packet: &SafetyPacket) -> bool {
        let Some(own) = self.owner() else {
            return false;
        };
        let position = {
            let nodes = ctx.registry.nodes();
            match nodes.get(own) {
                Some(node) if node.kind == NodeKind::Infrastructure || node.active => node.position,
                _ => return false,
            }
        };
        if self.kind == CommKind::Simple || !self.config.location_suppression {
            return true;
        }

        let reference = packet.reference_position();
        let own_distance = position.distance_feet(&reference);
        let cutoff = ctx.now.before(self.relevant_window());
        match self.history.get_mut(&packet.id) {
            Some(history) => {
                history.relevant_cutoff = cutoff;
                !history.farther_copy_exists(&reference, own_distance)
            }
            None => true,
        }
    }

    fn own_stamp(&self, ctx: &SimContext<'_>) -> Option<PacketStamp> {
        let address = self.owner()?;
        let nodes = ctx.registry.nodes();
        let node = nodes.get(address)?;
        let mut stamp = PacketStamp::fixed(ctx.now, node.position, address);
        stamp.speed = node.speed;
        stamp.heading = node.heading;
        if let Some(loc) = node.location {
            stamp.record = loc.record;
            stamp.forwards = loc.forwards;
            stamp.shape_point = loc.shape_point as u32;
            stamp.progress = loc.progress;
            stamp.county = ctx.map.record(loc.record).map_or(0, |record| record.county);
        }
        Some(stamp)
    }

    /// Send a restamped copy to every node in range; false if this node has
    /// no published position
    fn transmit(&mut self, ctx: &mut SimContext<'_>, packet: &SafetyPacket) -> bool {
        let Some(stamp) = self.own_stamp(ctx) else {
            debug!("Comm for {:?} has no position, not transmitting {}", self.owner(), packet.id);
            return false;
        };
        let outgoing = packet.restamped(stamp);

        let receivers: Vec<ModelHandle> = {
            let nodes = ctx.registry.nodes();
            let mut receivers: Vec<ModelHandle> = nodes
                .nodes_in_range(&stamp.position, self.config.range)
                .into_iter()
                .filter(|node| node.address != stamp.address)
                .filter_map(|node| node.comm)
                .collect();
            if self.config.gateway {
                for node in nodes.iter() {
                    if node.kind != NodeKind::Infrastructure || node.address == stamp.address {
                        continue;
                    }
                    if let Some(comm) = node.comm.filter(|comm| !receivers.contains(comm)) {
                        receivers.push(comm);
                    }
                }
            }
            receivers
        };

        let me = ctx.me;
        let arrival = ctx.now.after(self.config.tx_delay);
        for receiver in receivers {
            ctx.schedule(
                Event::new(arrival, receiver, EventKind::PacketReceived(outgoing.clone())).from_model(me),
            );
        }
        self.counters.transmitted += 1;
        ctx.stats.transmissions += 1;
        true
    }

    /// Pick a send time inside the window, or drop the message if that time
    /// falls at or after its expiry
    fn schedule_pending(&mut self, ctx: &mut SimContext<'_>, pending: RebroadcastMessage) {
        let at = if self.config.jitter && pending.window_high > pending.window_low {
            SimTime(ctx.rng.random_range(pending.window_low.0..pending.window_high.0))
        } else {
            pending.window_high
        };
        let expires_at = pending.packet.expires_at();
        if at >= expires_at {
            debug!("{} expires before its next window, dropping", pending.packet.id);
            self.counters.expired += 1;
            ctx.stats.messages_expired += 1;
            self.history.prune(ctx.now);
            ctx.schedule_self(expires_at, EventKind::HistoryExpired(pending.packet.id));
            return;
        }
        ctx.schedule_self(at, EventKind::Rebroadcast(pending));
    }

    fn queue_rebroadcast(&mut self, ctx: &mut SimContext<'_>, packet: SafetyPacket) {
        let interval = self.rebroadcast_interval(ctx, &packet, true);
        let pending = RebroadcastMessage {
            packet,
            window_low: ctx.now,
            window_high: ctx.now.after(interval),
            transmissions: 0,
        };
        self.schedule_pending(ctx, pending);
    }

    fn on_receive(&mut self, ctx: &mut SimContext<'_>, packet: SafetyPacket) {
        let Some(own) = self.owner() else {
            debug!("Unattached comm model dropping {}", packet.id);
            return;
        };
        if packet.tx.address == own {
            return;
        }
        self.counters.received += 1;
        ctx.stats.receptions += 1;

        self.history.prune(ctx.now);
        if packet.is_expired(ctx.now) {
            return;
        }
        let first = !self.history.contains(&packet.id);
        self.history.record_reception(&packet, ctx.now);
        if first && packet.id.source != own {
            ctx.stats.note_first_reception(packet.id);
            self.queue_rebroadcast(ctx, packet);
        } else {
            self.counters.duplicates += 1;
            ctx.stats.duplicates += 1;
        }
    }

    fn on_rebroadcast_due(&mut self, ctx: &mut SimContext<'_>, mut pending: RebroadcastMessage) {
        self.history.prune(ctx.now);
        if pending.packet.is_expired(ctx.now) {
            self.counters.expired += 1;
            ctx.stats.messages_expired += 1;
            return;
        }

        if self.should_rebroadcast(ctx, &pending.packet) {
            if self.transmit(ctx, &pending.packet) {
                pending.transmissions += 1;
            }
        } else {
            debug!("{} suppressed at {:?}", pending.packet.id, self.owner());
            self.counters.suppressed += 1;
            ctx.stats.rebroadcasts_suppressed += 1;
        }

        let cutoff = ctx.now.before(self.relevant_window());
        if let Some(history) = self.history.get_mut(&pending.packet.id) {
            history.relevant_cutoff = cutoff;
        }

        let interval = self.rebroadcast_interval(ctx, &pending.packet, false);
        pending.window_low = pending.window_high;
        pending.window_high = pending.window_low.after(interval);
        self.schedule_pending(ctx, pending);
    }

    /// Create a new message at this node's current position, send it and
    /// queue it for rebroadcast
    pub fn originate(&mut self, ctx: &mut SimContext<'_>) -> Option<SequenceId> {
        let stamp = self.own_stamp(ctx)?;
        let active = ctx
            .registry
            .nodes()
            .get(stamp.address)
            .is_some_and(|node| node.kind == NodeKind::Infrastructure || node.active);
        if !active {
            return None;
        }

        let id = SequenceId {
            source: stamp.address,
            counter: self.next_counter,
        };
        self.next_counter = self.next_counter.wrapping_add(1);
        let packet = SafetyPacket::new(id, self.config.message_lifetime, stamp);
        self.history.track(&packet);
        self.counters.originated += 1;
        ctx.stats.messages_originated += 1;
        debug!("{} originated at {} ({})", id, stamp.position, ctx.now);

        self.transmit(ctx, &packet);
        self.queue_rebroadcast(ctx, packet);
        Some(id)
    }
}

impl SimModel for CommModel {
    fn model_type(&self) -> ModelType {
        match self.kind {
            CommKind::Simple => ModelType::SimpleComm,
            CommKind::Adaptive => ModelType::AdaptiveComm,
            CommKind::Groove => ModelType::GrooveComm,
        }
    }

    fn init(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ModelError> {
        let reader = ParamReader::new(ctx.name, ctx.params);
        reader.warn_unknown(COMM_PARAMS);
        self.config = CommConfig {
            rebroadcast_interval: reader.float(&REBROADCAST_INTERVAL)?,
            max_rebroadcast_interval: reader.float(&MAX_REBROADCAST_INTERVAL)?,
            distance_low: reader.float(&DISTANCE_LOW)?,
            distance_high: reader.float(&DISTANCE_HIGH)?,
            backoff_window: reader.float(&BACKOFF_WINDOW)?,
            jitter: reader.boolean(&JITTER),
            fast_first_hop: reader.boolean(&FAST_FIRST_HOP),
            first_hop_window: reader.float(&FIRST_HOP_WINDOW)?,
            adaptive_backoff: reader.boolean(&ADAPTIVE_BACKOFF),
            distance_rate: reader.boolean(&DISTANCE_RATE),
            location_suppression: reader.boolean(&LOCATION_SUPPRESSION),
            range: reader.float(&RANGE)?,
            message_interval: reader.float(&MESSAGE_INTERVAL)?,
            message_lifetime: reader.float(&MESSAGE_LIFETIME)?,
            tx_delay: reader.float(&TX_DELAY)?,
            gateway: reader.boolean(&GATEWAY),
        };
        if self.config.max_rebroadcast_interval < self.config.rebroadcast_interval {
            warn!(
                "Model {}: MAX_REBROADCAST_INTERVAL {} is below REBROADCAST_INTERVAL {}",
                ctx.name, self.config.max_rebroadcast_interval, self.config.rebroadcast_interval
            );
        }
        Ok(())
    }

    fn pre_run(&mut self, ctx: &mut SimContext<'_>) -> Result<()> {
        let interval = self.config.message_interval;
        if interval > 0.0 {
            let first = ctx.now.after(ctx.rng.random_range(0.0..interval));
            ctx.schedule_self(first, EventKind::GenerateMessage);
        }
        Ok(())
    }

    fn process_event(&mut self, ctx: &mut SimContext<'_>, event: Event) -> Result<()> {
        match event.kind {
            EventKind::PacketReceived(packet) => self.on_receive(ctx, packet),
            EventKind::Rebroadcast(pending) => self.on_rebroadcast_due(ctx, pending),
            EventKind::HistoryExpired(id) => {
                let pruned = self.history.prune(ctx.now);
                trace!("{} expired, pruned {} histories", id, pruned);
            }
            EventKind::GenerateMessage => {
                self.originate(ctx);
                if self.config.message_interval > 0.0 {
                    let next = ctx.now.after(self.config.message_interval);
                    ctx.schedule_self(next, EventKind::GenerateMessage);
                }
            }
            other => warn!("Comm model ignoring unexpected event {}", other),
        }
        Ok(())
    }

    fn post_run(&mut self, _ctx: &mut SimContext<'_>) -> Result<()> {
        debug!(
            "Comm {:?}: originated {}, sent {}, heard {}, suppressed {}, expired {}",
            self.owner(),
            self.counters.originated,
            self.counters.transmitted,
            self.counters.received,
            self.counters.suppressed,
            self.counters.expired
        );
        Ok(())
    }
}
