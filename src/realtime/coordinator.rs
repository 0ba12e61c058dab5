use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::dispatch::{self, StopSpec};
use crate::error::DispatchError;
use crate::models::actor::{GeoPoint, Role};
use crate::models::ride::{Ride, VehicleClass};
use crate::realtime::events::{ClientEvent, RideOffer, ServerEvent};
use crate::realtime::groups::{user_group, GroupRegistry, Outbox, AVAILABLE_DRIVERS};
use crate::state::AppState;
use crate::tracker;

/// One authenticated realtime connection. Identity is resolved at session
/// setup; payloads never carry it.
#[derive(Clone)]
pub struct Session {
    pub conn_id: Uuid,
    pub actor_id: Uuid,
    pub role: Role,
    pub outbox: Outbox,
}

/// Translates connection events into dispatch/tracker calls and their
/// outcomes into targeted notifications. Never mutates Ride or Actor state
/// itself; failures are reported only to the originating connection.
pub struct Coordinator {
    pub state: Arc<AppState>,
    pub groups: GroupRegistry,
}

impl Coordinator {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            groups: GroupRegistry::default(),
        }
    }

    pub fn connect(&self, actor_id: Uuid, outbox: Outbox) -> Result<Session, DispatchError> {
        let role = self
            .state
            .actors
            .get(&actor_id)
            .map(|actor| actor.role)
            .ok_or_else(|| DispatchError::NotFound(format!("actor {actor_id} not found")))?;

        let session = Session {
            conn_id: Uuid::new_v4(),
            actor_id,
            role,
            outbox: outbox.clone(),
        };
        self.groups
            .join(&user_group(actor_id), session.conn_id, outbox);
        self.state.metrics.connected_sessions.inc();

        info!(actor_id = %actor_id, role = ?role, "session connected");
        Ok(session)
    }

    /// Disconnect is an implicit go-unavailable for drivers.
    pub fn disconnect(&self, session: &Session) {
        if session.role == Role::Driver {
            self.groups.leave(AVAILABLE_DRIVERS, session.conn_id);
            if let Err(err) =
                dispatch::set_availability(&self.state, session.actor_id, false, None)
            {
                warn!(actor_id = %session.actor_id, error = %err, "failed to force unavailable");
            }
        }
        self.groups.leave_all(session.conn_id);
        self.state.metrics.connected_sessions.dec();

        info!(actor_id = %session.actor_id, "session disconnected");
    }

    pub fn handle(&self, session: &Session, event: ClientEvent) {
        match event {
            ClientEvent::GoAvailable { position } => self.on_go_available(session, position),
            ClientEvent::GoUnavailable => self.on_go_unavailable(session),
            ClientEvent::RequestRide {
                pickup,
                dropoff,
                vehicle_class,
                payment_method,
            } => self.on_request_ride(session, pickup, dropoff, vehicle_class, payment_method),
            ClientEvent::AcceptRide { ride_id } => self.on_accept(session, ride_id),
            ClientEvent::DeclineRide { ride_id } => self.on_decline(session, ride_id),
            ClientEvent::Arrived { ride_id } => {
                self.on_lifecycle(session, ride_id, LifecycleOp::Arrive)
            }
            ClientEvent::StartRide { ride_id } => {
                self.on_lifecycle(session, ride_id, LifecycleOp::Start)
            }
            ClientEvent::CompleteRide { ride_id } => {
                self.on_lifecycle(session, ride_id, LifecycleOp::Complete)
            }
            ClientEvent::CancelRide { ride_id, reason } => self.on_cancel(session, ride_id, reason),
            ClientEvent::RateRide {
                ride_id,
                score,
                comment,
            } => self.on_rate(session, ride_id, score, comment),
            ClientEvent::LocationPing {
                position,
                accuracy,
                speed,
                heading,
            } => self.on_location_ping(session, position, accuracy, speed, heading),
        }
    }

    fn notify_caller(&self, session: &Session, event: ServerEvent) {
        let _ = session.outbox.send(event);
    }

    fn notify_failure(&self, session: &Session, err: &DispatchError) {
        self.notify_caller(
            session,
            ServerEvent::Error {
                kind: err.kind().to_string(),
                message: err.to_string(),
            },
        );
    }

    fn notify_actor(&self, actor_id: Uuid, event: &ServerEvent) {
        self.groups.send_to(&user_group(actor_id), event);
    }

    fn require_party(&self, session: &Session, ride: &Ride) -> Result<(), DispatchError> {
        let is_party = session.actor_id == ride.rider_id
            || ride.driver_id == Some(session.actor_id);
        if is_party {
            Ok(())
        } else {
            Err(DispatchError::NotAuthorized(format!(
                "actor {} is not a party to ride {}",
                session.actor_id, ride.id
            )))
        }
    }

    fn ride_snapshot(&self, ride_id: Uuid) -> Result<Ride, DispatchError> {
        self.state
            .rides
            .get(&ride_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DispatchError::NotFound(format!("ride {ride_id} not found")))
    }

    fn on_go_available(&self, session: &Session, position: GeoPoint) {
        let result = tracker::update_driver_position(
            &self.state,
            session.actor_id,
            position,
            None,
            None,
            None,
        )
        .and_then(|_| dispatch::set_availability(&self.state, session.actor_id, true, None));

        match result {
            Ok(()) => {
                self.groups
                    .join(AVAILABLE_DRIVERS, session.conn_id, session.outbox.clone());
            }
            Err(err) => self.notify_failure(session, &err),
        }
    }

    fn on_go_unavailable(&self, session: &Session) {
        self.groups.leave(AVAILABLE_DRIVERS, session.conn_id);
        if let Err(err) = dispatch::set_availability(&self.state, session.actor_id, false, None) {
            self.notify_failure(session, &err);
        }
    }

    fn on_request_ride(
        &self,
        session: &Session,
        pickup: StopSpec,
        dropoff: StopSpec,
        vehicle_class: VehicleClass,
        payment_method: String,
    ) {
        let ride = match dispatch::create_request(
            &self.state,
            session.actor_id,
            pickup,
            dropoff,
            vehicle_class,
            payment_method,
        ) {
            Ok(ride) => ride,
            Err(err) => return self.notify_failure(session, &err),
        };

        // Pre-assign the nearest driver so accept's assignment check can
        // pass; an empty pool is a notice to the requester, not a failure.
        let ride = match dispatch::match_driver(&self.state, ride.id) {
            Ok(updated) => updated,
            Err(err) => {
                self.notify_failure(session, &err);
                ride
            }
        };

        self.groups.send_to(
            AVAILABLE_DRIVERS,
            &ServerEvent::RideRequested {
                offer: RideOffer::from_ride(&ride),
            },
        );
        self.notify_caller(
            session,
            ServerEvent::RideConfirmed {
                ride: Box::new(ride),
            },
        );
    }

    fn on_accept(&self, session: &Session, ride_id: Uuid) {
        match dispatch::accept(&self.state, ride_id, session.actor_id) {
            Ok(ride) => {
                self.groups.leave(AVAILABLE_DRIVERS, session.conn_id);
                self.notify_actor(
                    ride.rider_id,
                    &ServerEvent::RideAccepted {
                        ride: Box::new(ride.clone()),
                    },
                );
                // Other drivers stop displaying the claimed request.
                self.groups
                    .send_to(AVAILABLE_DRIVERS, &ServerEvent::RideWithdrawn { ride_id });
                self.notify_caller(
                    session,
                    ServerEvent::RideUpdate {
                        ride: Box::new(ride),
                    },
                );
            }
            Err(err) => self.notify_failure(session, &err),
        }
    }

    fn on_decline(&self, session: &Session, ride_id: Uuid) {
        match dispatch::decline(&self.state, ride_id, session.actor_id) {
            Ok(ride) => {
                let ride = match dispatch::match_driver_excluding(
                    &self.state,
                    ride.id,
                    Some(session.actor_id),
                ) {
                    Ok(updated) => updated,
                    Err(_) => ride,
                };
                self.groups.send_to(
                    AVAILABLE_DRIVERS,
                    &ServerEvent::RideRequested {
                        offer: RideOffer::from_ride(&ride),
                    },
                );
                self.notify_caller(
                    session,
                    ServerEvent::RideUpdate {
                        ride: Box::new(ride),
                    },
                );
            }
            Err(err) => self.notify_failure(session, &err),
        }
    }

    fn on_lifecycle(&self, session: &Session, ride_id: Uuid, op: LifecycleOp) {
        let result = match op {
            LifecycleOp::Arrive => dispatch::arrive(&self.state, ride_id, session.actor_id),
            LifecycleOp::Start => dispatch::start(&self.state, ride_id, session.actor_id),
            LifecycleOp::Complete => dispatch::complete(&self.state, ride_id, session.actor_id),
        };

        match result {
            Ok(ride) => {
                // A completed ride frees the driver; this connection rejoins
                // the pool.
                if op == LifecycleOp::Complete && session.role == Role::Driver {
                    self.groups
                        .join(AVAILABLE_DRIVERS, session.conn_id, session.outbox.clone());
                }
                self.notify_counterparts(session, &ride);
                self.notify_caller(
                    session,
                    ServerEvent::RideUpdate {
                        ride: Box::new(ride),
                    },
                );
            }
            Err(err) => self.notify_failure(session, &err),
        }
    }

    fn on_cancel(&self, session: &Session, ride_id: Uuid, reason: Option<String>) {
        let result = self
            .ride_snapshot(ride_id)
            .and_then(|ride| self.require_party(session, &ride).map(|_| ride))
            .and_then(|ride| {
                let had_accepted_driver = ride.accepted_at.is_some();
                dispatch::cancel(&self.state, ride_id, session.role, reason)
                    .map(|updated| (updated, had_accepted_driver))
            });

        match result {
            Ok((ride, had_accepted_driver)) => {
                if had_accepted_driver {
                    if let Some(driver_id) = ride.driver_id {
                        // The freed driver's connections rejoin the pool.
                        for (conn_id, outbox) in self.groups.members(&user_group(driver_id)) {
                            self.groups.join(AVAILABLE_DRIVERS, conn_id, outbox);
                        }
                    }
                }
                self.notify_counterparts(session, &ride);
                self.notify_caller(
                    session,
                    ServerEvent::RideUpdate {
                        ride: Box::new(ride),
                    },
                );
            }
            Err(err) => self.notify_failure(session, &err),
        }
    }

    fn on_rate(&self, session: &Session, ride_id: Uuid, score: u8, comment: Option<String>) {
        let result = self
            .ride_snapshot(ride_id)
            .and_then(|ride| self.require_party(session, &ride).map(|_| ride))
            .and_then(|_| dispatch::rate(&self.state, ride_id, score, comment, session.role));

        match result {
            Ok(ride) => {
                let event = ServerEvent::RatingRecorded {
                    ride_id,
                    score,
                    rated_by: session.role,
                };
                for party in [Some(ride.rider_id), ride.driver_id].into_iter().flatten() {
                    if party != session.actor_id {
                        self.notify_actor(party, &event);
                    }
                }
                self.notify_caller(
                    session,
                    ServerEvent::RideUpdate {
                        ride: Box::new(ride),
                    },
                );
            }
            Err(err) => self.notify_failure(session, &err),
        }
    }

    fn on_location_ping(
        &self,
        session: &Session,
        position: GeoPoint,
        accuracy: Option<f64>,
        speed: Option<f64>,
        heading: Option<f64>,
    ) {
        match tracker::update_driver_position(
            &self.state,
            session.actor_id,
            position,
            accuracy,
            speed,
            heading,
        ) {
            Ok(Some(breadcrumb)) => {
                let Some(ride_id) = breadcrumb.ride_id else {
                    return;
                };
                let Ok(ride) = self.ride_snapshot(ride_id) else {
                    return;
                };
                self.notify_actor(
                    ride.rider_id,
                    &ServerEvent::DriverLocation {
                        ride_id,
                        position,
                        speed,
                        heading,
                    },
                );
            }
            Ok(None) => {}
            Err(err) => self.notify_failure(session, &err),
        }
    }

    fn notify_counterparts(&self, session: &Session, ride: &Ride) {
        let event = ServerEvent::RideUpdate {
            ride: Box::new(ride.clone()),
        };
        for party in [Some(ride.rider_id), ride.driver_id].into_iter().flatten() {
            if party != session.actor_id {
                self.notify_actor(party, &event);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleOp {
    Arrive,
    Start,
    Complete,
}
