use std::sync::Arc;

use ride_dispatch::config::Config;
use ride_dispatch::engine::dispatch::StopSpec;
use ride_dispatch::models::actor::{Actor, GeoPoint, Role};
use ride_dispatch::models::ride::{RideStatus, VehicleClass};
use ride_dispatch::realtime::coordinator::{Coordinator, Session};
use ride_dispatch::realtime::events::{ClientEvent, ServerEvent};
use ride_dispatch::realtime::groups::AVAILABLE_DRIVERS;
use ride_dispatch::state::AppState;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use uuid::Uuid;

fn setup() -> Arc<Coordinator> {
    Arc::new(Coordinator::new(Arc::new(AppState::new(Config::default()))))
}

fn add_actor(coordinator: &Coordinator, name: &str, role: Role) -> Uuid {
    let actor = Actor::new(name.to_string(), role);
    let id = actor.id;
    coordinator.state.actors.insert(id, actor);
    id
}

fn connect(coordinator: &Coordinator, actor_id: Uuid) -> (Session, UnboundedReceiver<ServerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let session = coordinator.connect(actor_id, tx).unwrap();
    (session, rx)
}

fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn go_available(coordinator: &Coordinator, session: &Session, lat: f64, lng: f64) {
    coordinator.handle(
        session,
        ClientEvent::GoAvailable {
            position: GeoPoint { lat, lng },
        },
    );
}

fn request_ride(coordinator: &Coordinator, session: &Session) {
    coordinator.handle(
        session,
        ClientEvent::RequestRide {
            pickup: StopSpec {
                address: "Grand Central Terminal".to_string(),
                point: GeoPoint {
                    lat: 40.7527,
                    lng: -73.9772,
                },
            },
            dropoff: StopSpec {
                address: "Times Square".to_string(),
                point: GeoPoint {
                    lat: 40.7580,
                    lng: -73.9855,
                },
            },
            vehicle_class: VehicleClass::Economy,
            payment_method: "card".to_string(),
        },
    );
}

fn confirmed_ride_id(events: &[ServerEvent]) -> Uuid {
    events
        .iter()
        .find_map(|event| match event {
            ServerEvent::RideConfirmed { ride } => Some(ride.id),
            _ => None,
        })
        .expect("ride confirmation delivered to requester")
}

#[test]
fn request_is_broadcast_to_pool_and_confirmed_to_requester() {
    let coordinator = setup();
    let rider_id = add_actor(&coordinator, "rider", Role::Rider);
    let driver_id = add_actor(&coordinator, "driver", Role::Driver);

    let (rider, mut rider_rx) = connect(&coordinator, rider_id);
    let (driver, mut driver_rx) = connect(&coordinator, driver_id);

    go_available(&coordinator, &driver, 40.7530, -73.9780);
    assert_eq!(coordinator.groups.member_count(AVAILABLE_DRIVERS), 1);

    request_ride(&coordinator, &rider);

    let driver_events = drain(&mut driver_rx);
    assert!(matches!(
        driver_events.as_slice(),
        [ServerEvent::RideRequested { .. }]
    ));
    if let ServerEvent::RideRequested { offer } = &driver_events[0] {
        assert_eq!(offer.pickup_address, "Grand Central Terminal");
    }

    let rider_events = drain(&mut rider_rx);
    let ride_id = confirmed_ride_id(&rider_events);
    let ride = coordinator.state.rides.get(&ride_id).unwrap().clone();
    assert_eq!(ride.driver_id, Some(driver_id));
}

#[test]
fn empty_pool_notifies_requester_but_still_confirms() {
    let coordinator = setup();
    let rider_id = add_actor(&coordinator, "rider", Role::Rider);
    let (rider, mut rider_rx) = connect(&coordinator, rider_id);

    request_ride(&coordinator, &rider);

    let events = drain(&mut rider_rx);
    assert!(events.iter().any(|event| matches!(
        event,
        ServerEvent::Error { kind, .. } if kind == "no_available_drivers"
    )));
    confirmed_ride_id(&events);
}

#[test]
fn accept_notifies_rider_and_withdraws_from_pool() {
    let coordinator = setup();
    let rider_id = add_actor(&coordinator, "rider", Role::Rider);
    let winner_id = add_actor(&coordinator, "winner", Role::Driver);
    let other_id = add_actor(&coordinator, "other", Role::Driver);

    let (rider, mut rider_rx) = connect(&coordinator, rider_id);
    let (winner, mut winner_rx) = connect(&coordinator, winner_id);
    let (other, mut other_rx) = connect(&coordinator, other_id);

    go_available(&coordinator, &winner, 40.7530, -73.9780);
    go_available(&coordinator, &other, 40.7600, -73.9700);

    request_ride(&coordinator, &rider);
    let ride_id = confirmed_ride_id(&drain(&mut rider_rx));
    drain(&mut winner_rx);
    drain(&mut other_rx);

    coordinator.handle(&winner, ClientEvent::AcceptRide { ride_id });

    let rider_events = drain(&mut rider_rx);
    assert!(rider_events
        .iter()
        .any(|e| matches!(e, ServerEvent::RideAccepted { ride } if ride.id == ride_id)));

    let other_events = drain(&mut other_rx);
    assert!(other_events
        .iter()
        .any(|e| matches!(e, ServerEvent::RideWithdrawn { ride_id: id } if *id == ride_id)));

    let winner_events = drain(&mut winner_rx);
    assert!(winner_events
        .iter()
        .any(|e| matches!(e, ServerEvent::RideUpdate { .. })));

    // The claiming driver left the pool.
    assert!(!coordinator.groups.contains(AVAILABLE_DRIVERS, winner.conn_id));
    assert!(coordinator.groups.contains(AVAILABLE_DRIVERS, other.conn_id));
}

#[test]
fn failed_accept_notifies_only_the_caller() {
    let coordinator = setup();
    let rider_id = add_actor(&coordinator, "rider", Role::Rider);
    let assigned_id = add_actor(&coordinator, "assigned", Role::Driver);
    let rival_id = add_actor(&coordinator, "rival", Role::Driver);

    let (rider, mut rider_rx) = connect(&coordinator, rider_id);
    let (assigned, mut assigned_rx) = connect(&coordinator, assigned_id);
    let (rival, mut rival_rx) = connect(&coordinator, rival_id);

    go_available(&coordinator, &assigned, 40.7530, -73.9780);
    go_available(&coordinator, &rival, 40.7600, -73.9700);

    request_ride(&coordinator, &rider);
    let ride_id = confirmed_ride_id(&drain(&mut rider_rx));
    drain(&mut assigned_rx);
    drain(&mut rival_rx);

    coordinator.handle(&rival, ClientEvent::AcceptRide { ride_id });

    let rival_events = drain(&mut rival_rx);
    assert!(rival_events.iter().any(|event| matches!(
        event,
        ServerEvent::Error { kind, .. } if kind == "not_authorized"
    )));
    assert!(drain(&mut rider_rx).is_empty());
    assert!(drain(&mut assigned_rx).is_empty());

    // The ride stays claimable by the assigned driver.
    let ride = coordinator.state.rides.get(&ride_id).unwrap().clone();
    assert_eq!(ride.status, RideStatus::Requested);
    assert_eq!(ride.driver_id, Some(assigned_id));
}

#[test]
fn decline_reopens_and_rebroadcasts() {
    let coordinator = setup();
    let rider_id = add_actor(&coordinator, "rider", Role::Rider);
    let near_id = add_actor(&coordinator, "near", Role::Driver);
    let far_id = add_actor(&coordinator, "far", Role::Driver);

    let (rider, mut rider_rx) = connect(&coordinator, rider_id);
    let (near, mut near_rx) = connect(&coordinator, near_id);
    let (far, mut far_rx) = connect(&coordinator, far_id);

    go_available(&coordinator, &near, 40.7530, -73.9780);
    go_available(&coordinator, &far, 40.7600, -73.9700);

    request_ride(&coordinator, &rider);
    let ride_id = confirmed_ride_id(&drain(&mut rider_rx));
    drain(&mut near_rx);
    drain(&mut far_rx);

    coordinator.handle(&near, ClientEvent::DeclineRide { ride_id });

    // The pool sees the request again and the far driver is now assigned.
    let far_events = drain(&mut far_rx);
    assert!(far_events
        .iter()
        .any(|e| matches!(e, ServerEvent::RideRequested { offer } if offer.ride_id == ride_id)));

    let ride = coordinator.state.rides.get(&ride_id).unwrap().clone();
    assert_eq!(ride.status, RideStatus::Requested);
    assert_eq!(ride.driver_id, Some(far_id));
}

#[test]
fn location_pings_relay_to_the_rider_only_while_active() {
    let coordinator = setup();
    let rider_id = add_actor(&coordinator, "rider", Role::Rider);
    let driver_id = add_actor(&coordinator, "driver", Role::Driver);

    let (rider, mut rider_rx) = connect(&coordinator, rider_id);
    let (driver, mut driver_rx) = connect(&coordinator, driver_id);

    go_available(&coordinator, &driver, 40.7530, -73.9780);

    // No active ride: position recorded, nothing relayed.
    coordinator.handle(
        &driver,
        ClientEvent::LocationPing {
            position: GeoPoint { lat: 40.7531, lng: -73.9781 },
            accuracy: None,
            speed: None,
            heading: None,
        },
    );
    assert!(drain(&mut rider_rx).is_empty());
    assert_eq!(coordinator.state.breadcrumbs.len(), 0);

    request_ride(&coordinator, &rider);
    let ride_id = confirmed_ride_id(&drain(&mut rider_rx));
    drain(&mut driver_rx);
    coordinator.handle(&driver, ClientEvent::AcceptRide { ride_id });
    drain(&mut rider_rx);
    drain(&mut driver_rx);

    coordinator.handle(
        &driver,
        ClientEvent::LocationPing {
            position: GeoPoint { lat: 40.7540, lng: -73.9800 },
            accuracy: Some(4.0),
            speed: Some(8.3),
            heading: Some(270.0),
        },
    );

    let rider_events = drain(&mut rider_rx);
    assert!(rider_events.iter().any(|event| matches!(
        event,
        ServerEvent::DriverLocation { ride_id: id, heading: Some(h), .. }
            if *id == ride_id && *h == 270.0
    )));
    assert_eq!(coordinator.state.breadcrumbs.len(), 1);
}

#[test]
fn completion_notifies_rider_and_rejoins_pool() {
    let coordinator = setup();
    let rider_id = add_actor(&coordinator, "rider", Role::Rider);
    let driver_id = add_actor(&coordinator, "driver", Role::Driver);

    let (rider, mut rider_rx) = connect(&coordinator, rider_id);
    let (driver, mut driver_rx) = connect(&coordinator, driver_id);

    go_available(&coordinator, &driver, 40.7530, -73.9780);
    request_ride(&coordinator, &rider);
    let ride_id = confirmed_ride_id(&drain(&mut rider_rx));
    coordinator.handle(&driver, ClientEvent::AcceptRide { ride_id });
    coordinator.handle(&driver, ClientEvent::StartRide { ride_id });
    drain(&mut rider_rx);
    drain(&mut driver_rx);

    coordinator.handle(&driver, ClientEvent::CompleteRide { ride_id });

    let rider_events = drain(&mut rider_rx);
    assert!(rider_events
        .iter()
        .any(|e| matches!(e, ServerEvent::RideUpdate { ride } if ride.status == RideStatus::Completed)));
    assert!(coordinator.groups.contains(AVAILABLE_DRIVERS, driver.conn_id));

    // Both parties rate; each counterpart hears about it.
    coordinator.handle(
        &rider,
        ClientEvent::RateRide {
            ride_id,
            score: 5,
            comment: None,
        },
    );
    coordinator.handle(
        &driver,
        ClientEvent::RateRide {
            ride_id,
            score: 4,
            comment: Some("pleasant".to_string()),
        },
    );

    let driver_events = drain(&mut driver_rx);
    assert!(driver_events.iter().any(|event| matches!(
        event,
        ServerEvent::RatingRecorded { score: 5, rated_by: Role::Rider, .. }
    )));
    let rider_events = drain(&mut rider_rx);
    assert!(rider_events.iter().any(|event| matches!(
        event,
        ServerEvent::RatingRecorded { score: 4, rated_by: Role::Driver, .. }
    )));

    assert_eq!(coordinator.state.actors.get(&driver_id).unwrap().rating, 5.0);
    assert_eq!(coordinator.state.actors.get(&rider_id).unwrap().rating, 4.0);
}

#[test]
fn rider_cancel_notifies_driver() {
    let coordinator = setup();
    let rider_id = add_actor(&coordinator, "rider", Role::Rider);
    let driver_id = add_actor(&coordinator, "driver", Role::Driver);

    let (rider, mut rider_rx) = connect(&coordinator, rider_id);
    let (driver, mut driver_rx) = connect(&coordinator, driver_id);

    go_available(&coordinator, &driver, 40.7530, -73.9780);
    request_ride(&coordinator, &rider);
    let ride_id = confirmed_ride_id(&drain(&mut rider_rx));
    coordinator.handle(&driver, ClientEvent::AcceptRide { ride_id });
    drain(&mut rider_rx);
    drain(&mut driver_rx);

    coordinator.handle(
        &rider,
        ClientEvent::CancelRide {
            ride_id,
            reason: Some("waited too long".to_string()),
        },
    );

    let driver_events = drain(&mut driver_rx);
    assert!(driver_events
        .iter()
        .any(|e| matches!(e, ServerEvent::RideUpdate { ride } if ride.status == RideStatus::Cancelled)));

    // The freed driver is back in the pool and available.
    assert!(coordinator.groups.contains(AVAILABLE_DRIVERS, driver.conn_id));
    assert!(coordinator.state.actors.get(&driver_id).unwrap().available);
}

#[test]
fn outsiders_cannot_cancel_or_rate() {
    let coordinator = setup();
    let rider_id = add_actor(&coordinator, "rider", Role::Rider);
    let driver_id = add_actor(&coordinator, "driver", Role::Driver);
    let outsider_id = add_actor(&coordinator, "outsider", Role::Rider);

    let (rider, mut rider_rx) = connect(&coordinator, rider_id);
    let (driver, _driver_rx) = connect(&coordinator, driver_id);
    let (outsider, mut outsider_rx) = connect(&coordinator, outsider_id);

    go_available(&coordinator, &driver, 40.7530, -73.9780);
    request_ride(&coordinator, &rider);
    let ride_id = confirmed_ride_id(&drain(&mut rider_rx));

    coordinator.handle(
        &outsider,
        ClientEvent::CancelRide {
            ride_id,
            reason: None,
        },
    );

    let events = drain(&mut outsider_rx);
    assert!(events.iter().any(|event| matches!(
        event,
        ServerEvent::Error { kind, .. } if kind == "not_authorized"
    )));
    let ride = coordinator.state.rides.get(&ride_id).unwrap().clone();
    assert_eq!(ride.status, RideStatus::Requested);
}

#[test]
fn disconnect_forces_driver_unavailable() {
    let coordinator = setup();
    let driver_id = add_actor(&coordinator, "driver", Role::Driver);
    let (driver, _rx) = connect(&coordinator, driver_id);

    go_available(&coordinator, &driver, 40.7530, -73.9780);
    assert!(coordinator.state.actors.get(&driver_id).unwrap().available);

    coordinator.disconnect(&driver);

    assert!(!coordinator.state.actors.get(&driver_id).unwrap().available);
    assert_eq!(coordinator.groups.member_count(AVAILABLE_DRIVERS), 0);
}

#[test]
fn riders_cannot_go_available() {
    let coordinator = setup();
    let rider_id = add_actor(&coordinator, "rider", Role::Rider);
    let (rider, mut rider_rx) = connect(&coordinator, rider_id);

    go_available(&coordinator, &rider, 40.7530, -73.9780);

    let events = drain(&mut rider_rx);
    assert!(events.iter().any(|event| matches!(
        event,
        ServerEvent::Error { kind, .. } if kind == "not_authorized"
    )));
    assert_eq!(coordinator.groups.member_count(AVAILABLE_DRIVERS), 0);
}
