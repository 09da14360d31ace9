use vanet_sim::simulation::{
    Address, Coords, Model, ModelSpec, ModelType, NewRecord, RoadLocation, RoadNetwork, SimTime, SimWorld,
};

fn grid() -> RoadNetwork {
    RoadNetwork::grid(3, 3, 0.005, Coords::from_degrees(40.0, -80.0)).unwrap()
}

#[test]
fn test_route_to_same_location_is_empty() {
    let mut map = grid();
    let here = map.address_to_location(40, "Street 1").unwrap();
    assert!(map.shortest_path(&here, &here, None).is_empty());
    assert!(map.shortest_path(&here, &here, Some(true)).is_empty());
}

#[test]
fn test_route_between_components_is_empty() {
    let mut map = grid();
    let a = map.add_vertex(Coords::from_degrees(41.0, -79.0));
    let b = map.add_vertex(Coords::from_degrees(41.0, -78.99));
    let island = map.add_record(NewRecord::new("Island Rd", a, b)).unwrap();

    let start = map.address_to_location(40, "Street 1").unwrap();
    let finish = RoadLocation::new(island, 0, 0.5, true);
    assert!(map.shortest_path(&start, &finish, None).is_empty());
    assert!(map.route_through(&[start, finish], None).is_empty());
}

#[test]
fn test_route_starts_and_ends_on_the_given_records() {
    let mut map = grid();
    let start = map.address_to_location(10, "Street 0").unwrap();
    let finish = map.address_to_location(150, "Street 2").unwrap();
    let route = map.shortest_path(&start, &finish, None);
    assert!(!route.is_empty());
    assert_eq!(route.legs.first().unwrap().record, start.record);
    assert_eq!(route.legs.last().unwrap().record, finish.record);

    // Consecutive legs share a vertex
    for pair in route.legs.windows(2) {
        let exit = map.record(pair[0].record).unwrap().exit_vertex(pair[0].forwards);
        let entry = map.record(pair[1].record).unwrap().entry_vertex(pair[1].forwards);
        assert_eq!(exit, entry);
    }
}

#[test]
fn test_dijkstra_car_drives_to_its_destination() {
    let mut world = SimWorld::new_with_seed(grid(), 11);
    world
        .add_models(vec![
            ModelSpec::new("car1", ModelType::Car)
                .param("ADDRESS", Address(1).to_string())
                .param("MOBILITY", "mob1"),
            ModelSpec::new("mob1", ModelType::TripMobility).param("TRIP", "trip1"),
            ModelSpec::new("trip1", ModelType::DijkstraTrip)
                .param("SOURCE", "10 Street 0")
                .param("DESTINATION", "150 Street 2"),
        ])
        .unwrap();
    let destination = world.road_network.address_to_location(150, "Street 2").unwrap();

    world.run_until(SimTime::from_secs(900.0));

    assert_eq!(world.stats.trips_completed, 1);
    assert_eq!(world.stats.event_errors, 0);
    match world.registry.get_model("mob1") {
        Some(Model::Mobility(mobility)) => {
            assert!(mobility.is_parked());
            assert_eq!(mobility.location().unwrap().record, destination.record);
        }
        other => panic!("unexpected model {:?}", other),
    }
    let node = world.registry.nodes().car(Address(1)).unwrap().clone();
    assert_eq!(node.location.unwrap().record, destination.record);
    // Parked cars stop scheduling updates
    assert_eq!(world.pending_events(), 0);
}
