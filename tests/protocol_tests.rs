use vanet_sim::simulation::{
    Address, CommCounters, Coords, Event, EventKind, Model, ModelSpec, ModelType, PacketStamp, RoadNetwork,
    SafetyPacket, SequenceId, SimTime, SimWorld,
};

fn reference() -> Coords {
    Coords::from_degrees(40.0, -80.0)
}

/// A point `feet` due east of the reference point
fn east_of_reference(feet: f64) -> Coords {
    let origin = reference();
    let per_degree = origin.distance_feet(&Coords::from_degrees(40.0, -79.0));
    Coords::from_degrees(40.0, -80.0 + feet / per_degree)
}

fn world() -> SimWorld {
    let map = RoadNetwork::grid(2, 2, 0.005, reference()).unwrap();
    SimWorld::new_with_seed(map, 3)
}

/// A roadside node `name` with comm model `<name>_comm`
fn add_station(
    world: &mut SimWorld,
    name: &str,
    address: u32,
    position: Coords,
    comm: ModelType,
    params: &[(&str, &str)],
) {
    let comm_name = format!("{}_comm", name);
    let mut comm_spec = ModelSpec::new(comm_name.clone(), comm);
    for (key, value) in params {
        comm_spec = comm_spec.param(key, *value);
    }
    world
        .add_models(vec![
            ModelSpec::new(name, ModelType::Infrastructure)
                .param("ADDRESS", Address(address).to_string())
                .param(
                    "LOCATION",
                    format!("{:.6}, {:.6}", position.lat_degrees(), position.lon_degrees()),
                )
                .param("COMM", comm_name),
            comm_spec,
        ])
        .unwrap();
}

fn counters(world: &SimWorld, comm: &str) -> CommCounters {
    world
        .registry
        .get_model(comm)
        .and_then(Model::as_comm)
        .map(|comm| comm.counters().clone())
        .unwrap()
}

/// Deliver `packet` to the comm model of `station` at `at`
fn deliver(world: &mut SimWorld, station: &str, at: SimTime, packet: SafetyPacket) {
    let handle = world.registry.handle(&format!("{}_comm", station)).unwrap();
    world.add_event(Event::new(at, handle, EventKind::PacketReceived(packet)));
}

/// A message about an event at the reference point, relayed by a node
/// 1300 ft away half a second later
fn relayed_packet() -> SafetyPacket {
    let id = SequenceId {
        source: Address(50),
        counter: 0,
    };
    SafetyPacket::new(id, 10.0, PacketStamp::fixed(SimTime::ZERO, reference(), Address(50))).restamped(
        PacketStamp::fixed(SimTime::from_secs(0.5), east_of_reference(1300.0), Address(99)),
    )
}

const SUPPRESSING: &[(&str, &str)] = &[
    ("LOCATION_SUPPRESSION", "Y"),
    ("JITTER", "N"),
    ("DISTANCE_RATE", "N"),
    ("ADAPTIVE_BACKOFF", "N"),
    ("REBROADCAST_INTERVAL", "1"),
];

#[test]
fn test_groove_suppresses_while_farther_copy_is_relevant() {
    let mut world = world();
    add_station(&mut world, "v2", 2, east_of_reference(800.0), ModelType::GrooveComm, SUPPRESSING);
    deliver(&mut world, "v2", SimTime::from_secs(0.5), relayed_packet());

    world.run_until(SimTime::from_secs(2.0));
    assert_eq!(world.stats.rebroadcasts_suppressed, 1);
    assert_eq!(world.stats.transmissions, 0);

    // By the second window the 0.5 s copy has aged out of the relevant window
    world.run_until(SimTime::from_secs(3.0));
    assert_eq!(world.stats.transmissions, 1);
    let v2 = counters(&world, "v2_comm");
    assert_eq!(v2.suppressed, 1);
    assert_eq!(v2.transmitted, 1);
    assert_eq!(v2.received, 1);
}

#[test]
fn test_adaptive_keeps_copies_relevant_for_max_interval() {
    let mut world = world();
    add_station(&mut world, "v2", 2, east_of_reference(800.0), ModelType::AdaptiveComm, SUPPRESSING);
    deliver(&mut world, "v2", SimTime::from_secs(0.5), relayed_packet());

    world.run_until(SimTime::from_secs(3.0));
    assert_eq!(world.stats.transmissions, 0);
    assert_eq!(world.stats.rebroadcasts_suppressed, 2);
}

#[test]
fn test_farther_node_is_not_suppressed() {
    let mut world = world();
    add_station(&mut world, "v3", 3, east_of_reference(1500.0), ModelType::GrooveComm, SUPPRESSING);
    deliver(&mut world, "v3", SimTime::from_secs(0.5), relayed_packet());

    world.run_until(SimTime::from_secs(2.0));
    assert_eq!(world.stats.transmissions, 1);
    assert_eq!(world.stats.rebroadcasts_suppressed, 0);
}

#[test]
fn test_simple_comm_ignores_location_suppression() {
    let mut world = world();
    add_station(&mut world, "v2", 2, east_of_reference(800.0), ModelType::SimpleComm, SUPPRESSING);
    deliver(&mut world, "v2", SimTime::from_secs(0.5), relayed_packet());

    world.run_until(SimTime::from_secs(2.0));
    assert_eq!(world.stats.transmissions, 1);
    assert_eq!(world.stats.rebroadcasts_suppressed, 0);
}

#[test]
fn test_adaptive_window_combines_distance_and_backoff() {
    let mut world = world();
    // Halfway between the distance thresholds with one neighbour heard:
    // 1 / 0.55 s shaped, doubled by the backoff
    add_station(&mut world, "v4", 4, east_of_reference(2750.0), ModelType::AdaptiveComm, &[("JITTER", "N")]);
    deliver(&mut world, "v4", SimTime::from_secs(0.5), relayed_packet());

    world.run_until(SimTime::from_secs(4.10));
    assert_eq!(world.stats.transmissions, 0);
    world.run_until(SimTime::from_secs(4.20));
    assert_eq!(world.stats.transmissions, 1);
}

#[test]
fn test_fast_first_hop_overrides_distance_and_backoff() {
    let mut world = world();
    add_station(
        &mut world,
        "v4",
        4,
        east_of_reference(2750.0),
        ModelType::AdaptiveComm,
        &[("JITTER", "N"), ("FAST_FIRST_HOP", "Y")],
    );
    deliver(&mut world, "v4", SimTime::from_secs(0.5), relayed_packet());

    world.run_until(SimTime::from_secs(0.52));
    assert_eq!(world.stats.transmissions, 1);
}

#[test]
fn test_backoff_applies_without_a_known_position() {
    let mut world = world();
    add_station(&mut world, "v2", 2, east_of_reference(2750.0), ModelType::AdaptiveComm, &[("JITTER", "N")]);
    world.registry.nodes_mut().remove(Address(2));
    deliver(&mut world, "v2", SimTime::from_secs(0.5), relayed_packet());

    // Base window of 1 s doubled for the one neighbour
    world.run_until(SimTime::from_secs(2.4));
    assert_eq!(world.stats.rebroadcasts_suppressed, 0);
    world.run_until(SimTime::from_secs(2.6));
    assert_eq!(world.stats.rebroadcasts_suppressed, 1);
    assert_eq!(world.stats.transmissions, 0);
}

fn short_lived_packet() -> SafetyPacket {
    let id = SequenceId {
        source: Address(50),
        counter: 7,
    };
    SafetyPacket::new(id, 5.0, PacketStamp::fixed(SimTime::ZERO, reference(), Address(50)))
}

#[test]
fn test_window_ending_before_expiry_fires() {
    let mut world = world();
    add_station(
        &mut world,
        "v1",
        1,
        reference(),
        ModelType::SimpleComm,
        &[("JITTER", "N"), ("REBROADCAST_INTERVAL", "4.9")],
    );
    deliver(&mut world, "v1", SimTime::ZERO, short_lived_packet());

    world.run_until(SimTime::from_secs(6.0));
    assert_eq!(world.stats.transmissions, 1);
    // The following window ends at 9.8 s, after the message expires
    assert_eq!(world.stats.messages_expired, 1);
}

#[test]
fn test_window_ending_after_expiry_drops_message() {
    let mut world = world();
    add_station(
        &mut world,
        "v1",
        1,
        reference(),
        ModelType::SimpleComm,
        &[("JITTER", "N"), ("REBROADCAST_INTERVAL", "5.1")],
    );
    deliver(&mut world, "v1", SimTime::ZERO, short_lived_packet());

    world.run_until(SimTime::from_secs(6.0));
    assert_eq!(world.stats.transmissions, 0);
    assert_eq!(world.stats.messages_expired, 1);
    assert_eq!(world.pending_events(), 0);
}

#[test]
fn test_expired_packet_is_not_relayed() {
    let mut world = world();
    add_station(&mut world, "v1", 1, reference(), ModelType::SimpleComm, &[]);
    deliver(&mut world, "v1", SimTime::from_secs(5.5), short_lived_packet());

    world.run_until(SimTime::from_secs(10.0));
    assert_eq!(world.stats.receptions, 1);
    assert_eq!(world.stats.transmissions, 0);
    assert_eq!(world.pending_events(), 0);
}

#[test]
fn test_duplicates_and_own_echoes() {
    let mut world = world();
    let fixed = &[("JITTER", "N"), ("REBROADCAST_INTERVAL", "1")];
    add_station(&mut world, "a", 1, reference(), ModelType::SimpleComm, fixed);
    add_station(&mut world, "b", 2, east_of_reference(100.0), ModelType::SimpleComm, fixed);

    let id = world.inject_message(Address(1)).unwrap();
    world.run_until(SimTime::from_secs(3.0));

    assert_eq!(world.stats.messages_originated, 1);
    assert_eq!(world.stats.reach_of(&id), 1);
    let a = counters(&world, "a_comm");
    let b = counters(&world, "b_comm");
    assert_eq!(a.originated, 1);
    // Everything a hears back is its own message relayed by b
    assert_eq!(a.duplicates, a.received);
    assert!(a.duplicates >= 1);
    assert_eq!(b.duplicates, b.received - 1);
    assert!(b.duplicates >= 1);

    // A copy carrying a's own TX stamp is not counted at all
    let echo = SafetyPacket::new(
        SequenceId {
            source: Address(2),
            counter: 40,
        },
        10.0,
        PacketStamp::fixed(SimTime::from_secs(3.5), reference(), Address(1)),
    );
    let before = counters(&world, "a_comm");
    deliver(&mut world, "a", SimTime::from_secs(3.5), echo);
    world.run_until(SimTime::from_secs(3.6));
    assert_eq!(counters(&world, "a_comm").received, before.received);
}

#[test]
fn test_gateway_reaches_distant_infrastructure() {
    let far = Coords::from_degrees(40.1, -80.0);

    let mut plain = world();
    add_station(&mut plain, "a", 1, reference(), ModelType::SimpleComm, &[]);
    add_station(&mut plain, "b", 2, far, ModelType::SimpleComm, &[]);
    let id = plain.inject_message(Address(1)).unwrap();
    plain.run_until(SimTime::from_secs(0.01));
    assert_eq!(plain.stats.reach_of(&id), 0);

    let mut bridged = world();
    add_station(&mut bridged, "a", 1, reference(), ModelType::SimpleComm, &[("GATEWAY", "Y")]);
    add_station(&mut bridged, "b", 2, far, ModelType::SimpleComm, &[]);
    let id = bridged.inject_message(Address(1)).unwrap();
    bridged.run_until(SimTime::from_secs(0.01));
    assert_eq!(bridged.stats.reach_of(&id), 1);
}

fn add_car(world: &mut SimWorld, index: u32, active: bool) {
    world
        .add_models(vec![
            ModelSpec::new(format!("car{}", index), ModelType::Car)
                .param("ADDRESS", Address(index).to_string())
                .param("MOBILITY", format!("mob{}", index))
                .param("COMM", format!("comm{}", index))
                .param("ACTIVE", if active { "Y" } else { "N" }),
            ModelSpec::new(format!("mob{}", index), ModelType::RandomWalkMobility),
            ModelSpec::new(format!("comm{}", index), ModelType::SimpleComm).param("RANGE", "1000000"),
        ])
        .unwrap();
}

#[test]
fn test_inactive_cars_neither_hear_nor_send() {
    let mut world = world();
    add_car(&mut world, 1, true);
    add_car(&mut world, 2, false);
    add_car(&mut world, 3, true);

    let first = world.inject_message(Address(1)).unwrap();
    world.run_until(SimTime::from_secs(3.0));
    // Only car 3 hears it, even after car 3 relays it
    assert_eq!(world.stats.reach_of(&first), 1);
    assert_eq!(counters(&world, "comm2").received, 0);
    assert!(world.inject_message(Address(2)).is_none());

    assert!(world.set_car_active(Address(2), true));
    let second = world.inject_message(Address(1)).unwrap();
    world.run_for_secs(0.01);
    assert_eq!(world.stats.reach_of(&second), 2);

    assert!(world.set_car_active(Address(3), false));
    assert!(world.inject_message(Address(3)).is_none());
    assert!(!world.set_car_active(Address(42), true));
}

#[test]
fn test_dropped_message_history_is_forgotten_at_expiry() {
    let mut world = world();
    add_station(
        &mut world,
        "v1",
        1,
        reference(),
        ModelType::SimpleComm,
        &[("JITTER", "N"), ("REBROADCAST_INTERVAL", "5.1")],
    );
    deliver(&mut world, "v1", SimTime::ZERO, short_lived_packet());
    let histories = |world: &SimWorld| {
        world
            .registry
            .get_model("v1_comm")
            .and_then(Model::as_comm)
            .map(|comm| comm.history().len())
            .unwrap()
    };

    world.run_until(SimTime::from_secs(4.0));
    assert_eq!(histories(&world), 1);
    world.run_until(SimTime::from_secs(6.0));
    assert_eq!(histories(&world), 0);
}
