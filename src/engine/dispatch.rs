use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::engine::fare;
use crate::engine::lifecycle::{allowed_transitions, is_valid_transition};
use crate::error::DispatchError;
use crate::models::actor::{GeoPoint, Role};
use crate::models::ride::{
    Cancellation, Eta, Payment, PaymentStatus, Rating, Ride, RideStatus, Stop, VehicleClass,
};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopSpec {
    pub address: String,
    pub point: GeoPoint,
}

impl StopSpec {
    fn into_stop(self) -> Stop {
        Stop {
            address: self.address,
            point: self.point,
            arrived_at: None,
        }
    }
}

fn observed<F>(state: &AppState, op: &'static str, f: F) -> Result<Ride, DispatchError>
where
    F: FnOnce() -> Result<Ride, DispatchError>,
{
    let start = Instant::now();
    let result = f();
    let outcome = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .dispatch_op_latency_seconds
        .with_label_values(&[op])
        .observe(start.elapsed().as_secs_f64());
    state
        .metrics
        .dispatch_ops_total
        .with_label_values(&[op, outcome])
        .inc();
    result
}

fn ride_snapshot(state: &AppState, ride_id: Uuid) -> Result<Ride, DispatchError> {
    state
        .rides
        .get(&ride_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| DispatchError::NotFound(format!("ride {ride_id} not found")))
}

fn require_actor(state: &AppState, actor_id: Uuid) -> Result<(), DispatchError> {
    if state.actors.contains_key(&actor_id) {
        Ok(())
    } else {
        Err(DispatchError::NotFound(format!("actor {actor_id} not found")))
    }
}

fn require_assigned_driver(ride: &Ride, driver_id: Uuid) -> Result<(), DispatchError> {
    if ride.driver_id == Some(driver_id) {
        Ok(())
    } else {
        Err(DispatchError::NotAuthorized(format!(
            "driver {driver_id} is not assigned to ride {}",
            ride.id
        )))
    }
}

/// Create a new ride request: route the trip, derive the surge multiplier
/// from current demand, price it, and persist the ride in `requested`.
pub fn create_request(
    state: &AppState,
    rider_id: Uuid,
    pickup: StopSpec,
    dropoff: StopSpec,
    vehicle_class: VehicleClass,
    payment_method: String,
) -> Result<Ride, DispatchError> {
    observed(state, "create_request", || {
        let rider = state
            .actors
            .get(&rider_id)
            .ok_or_else(|| DispatchError::NotFound(format!("actor {rider_id} not found")))?;
        if rider.role != Role::Rider {
            return Err(DispatchError::NotAuthorized(
                "only riders can request rides".to_string(),
            ));
        }
        drop(rider);

        if payment_method.trim().is_empty() {
            return Err(DispatchError::BadRequest(
                "payment method cannot be empty".to_string(),
            ));
        }

        let plan = state.planner.route(&pickup.point, &dropoff.point)?;

        // Supply and demand shift continuously; the ratio is computed fresh
        // on every request.
        let waiting_riders = state.count_requested_rides();
        let available_drivers = state.count_available_drivers();
        let surge = fare::surge_multiplier(waiting_riders, available_drivers);
        let reason = fare::surge_reason(surge, waiting_riders, available_drivers);
        let breakdown = fare::quote(
            plan.distance_meters,
            plan.duration_secs,
            vehicle_class,
            surge,
            reason,
        );

        let ride = Ride {
            id: Uuid::new_v4(),
            rider_id,
            driver_id: None,
            status: RideStatus::Requested,
            pickup: pickup.into_stop(),
            dropoff: dropoff.into_stop(),
            vehicle_class,
            fare: breakdown,
            eta: Eta {
                pickup_secs: 0,
                dropoff_secs: plan.duration_secs,
            },
            distance_meters: plan.distance_meters,
            duration_secs: plan.duration_secs,
            route: plan.polyline,
            ratings: Vec::new(),
            payment: Payment {
                method: payment_method,
                status: PaymentStatus::Pending,
                external_ref: None,
            },
            cancellation: None,
            requested_at: Utc::now(),
            accepted_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
        };

        state.rides.insert(ride.id, ride.clone());
        state.metrics.rides_active.inc();

        info!(
            ride_id = %ride.id,
            rider_id = %rider_id,
            surge = ride.fare.surge_multiplier,
            total = ride.fare.total,
            "ride requested"
        );
        Ok(ride)
    })
}

/// Assign the nearest available driver within the matching radius without
/// changing status. Recoverable `NoAvailableDrivers` when nobody qualifies.
pub fn match_driver(state: &AppState, ride_id: Uuid) -> Result<Ride, DispatchError> {
    match_driver_excluding(state, ride_id, None)
}

/// Rematch variant that skips one driver, used after a decline so the
/// decliner is not immediately re-assigned.
pub fn match_driver_excluding(
    state: &AppState,
    ride_id: Uuid,
    exclude: Option<Uuid>,
) -> Result<Ride, DispatchError> {
    observed(state, "match_driver", || {
        let ride = ride_snapshot(state, ride_id)?;
        if ride.status != RideStatus::Requested {
            return Err(DispatchError::InvalidTransition {
                from: ride.status,
                to: RideStatus::Accepted,
            });
        }

        let candidates = state.nearest_available_drivers(
            &ride.pickup.point,
            state.config.match_radius_km,
            state.config.match_candidate_cap,
        );
        let winner = candidates
            .iter()
            .find(|c| Some(c.driver_id) != exclude)
            .ok_or(DispatchError::NoAvailableDrivers)?;

        let pickup_eta_secs =
            (winner.distance_km / state.config.planner_speed_kmh * 3_600.0).ceil() as u32;

        let mut entry = state
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| DispatchError::NotFound(format!("ride {ride_id} not found")))?;
        if entry.status != RideStatus::Requested {
            return Err(DispatchError::InvalidTransition {
                from: entry.status,
                to: RideStatus::Accepted,
            });
        }
        entry.driver_id = Some(winner.driver_id);
        entry.eta.pickup_secs = pickup_eta_secs;
        let updated = entry.clone();
        drop(entry);

        info!(
            ride_id = %ride_id,
            driver_id = %winner.driver_id,
            distance_km = winner.distance_km,
            "driver matched"
        );
        Ok(updated)
    })
}

/// The assigned driver claims the ride. Status write happens under the ride
/// guard with the expected prior status re-verified, so two concurrent
/// accepts cannot both win and a mid-ride driver cannot claim a second ride.
pub fn accept(state: &AppState, ride_id: Uuid, driver_id: Uuid) -> Result<Ride, DispatchError> {
    observed(state, "accept", || {
        require_actor(state, driver_id)?;
        let ride = ride_snapshot(state, ride_id)?;
        require_assigned_driver(&ride, driver_id)?;
        if !is_valid_transition(ride.status, RideStatus::Accepted) {
            return Err(DispatchError::InvalidTransition {
                from: ride.status,
                to: RideStatus::Accepted,
            });
        }

        let updated = {
            let mut entry = state
                .rides
                .get_mut(&ride_id)
                .ok_or_else(|| DispatchError::NotFound(format!("ride {ride_id} not found")))?;
            // Conditional update: transition only if the prior status still
            // holds and the assignment has not moved.
            if entry.status != RideStatus::Requested {
                return Err(DispatchError::InvalidTransition {
                    from: entry.status,
                    to: RideStatus::Accepted,
                });
            }
            require_assigned_driver(&entry, driver_id)?;
            // The driver claim happens under both guards (ride first, then
            // actor, the ordering used everywhere) so a driver matched to two
            // open requests can only ever hold one active ride.
            let mut driver = state
                .actors
                .get_mut(&driver_id)
                .ok_or_else(|| DispatchError::NotFound(format!("actor {driver_id} not found")))?;
            if driver.current_ride_id.is_some() {
                return Err(DispatchError::NotAuthorized(format!(
                    "driver {driver_id} already has an active ride"
                )));
            }
            entry.status = RideStatus::Accepted;
            entry.accepted_at = Some(Utc::now());
            driver.available = false;
            driver.current_ride_id = Some(ride_id);
            driver.updated_at = Utc::now();
            entry.clone()
        };

        info!(ride_id = %ride_id, driver_id = %driver_id, "ride accepted");
        Ok(updated)
    })
}

/// The assigned driver declines before accepting: the assignment is cleared
/// so the ride can be rematched. A re-open, not a cancellation.
pub fn decline(state: &AppState, ride_id: Uuid, driver_id: Uuid) -> Result<Ride, DispatchError> {
    observed(state, "decline", || {
        let ride = ride_snapshot(state, ride_id)?;
        require_assigned_driver(&ride, driver_id)?;
        if ride.status != RideStatus::Requested {
            return Err(DispatchError::InvalidTransition {
                from: ride.status,
                to: RideStatus::Requested,
            });
        }

        let mut entry = state
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| DispatchError::NotFound(format!("ride {ride_id} not found")))?;
        if entry.status != RideStatus::Requested {
            return Err(DispatchError::InvalidTransition {
                from: entry.status,
                to: RideStatus::Requested,
            });
        }
        require_assigned_driver(&entry, driver_id)?;
        entry.driver_id = None;
        entry.eta.pickup_secs = 0;
        let updated = entry.clone();
        drop(entry);

        info!(ride_id = %ride_id, driver_id = %driver_id, "ride declined, re-opened");
        Ok(updated)
    })
}

/// The driver reports arrival at the pickup.
pub fn arrive(state: &AppState, ride_id: Uuid, driver_id: Uuid) -> Result<Ride, DispatchError> {
    observed(state, "arrive", || {
        let ride = ride_snapshot(state, ride_id)?;
        require_assigned_driver(&ride, driver_id)?;
        if !is_valid_transition(ride.status, RideStatus::DriverArriving) {
            return Err(DispatchError::InvalidTransition {
                from: ride.status,
                to: RideStatus::DriverArriving,
            });
        }

        let mut entry = state
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| DispatchError::NotFound(format!("ride {ride_id} not found")))?;
        if entry.status != RideStatus::Accepted {
            return Err(DispatchError::InvalidTransition {
                from: entry.status,
                to: RideStatus::DriverArriving,
            });
        }
        require_assigned_driver(&entry, driver_id)?;
        entry.status = RideStatus::DriverArriving;
        entry.pickup.arrived_at = Some(Utc::now());
        let updated = entry.clone();
        drop(entry);

        info!(ride_id = %ride_id, driver_id = %driver_id, "driver arriving");
        Ok(updated)
    })
}

/// Begin the trip. A driver who never sent an explicit arrival steps through
/// `driver_arriving`; every hop is checked against the transition table.
pub fn start(state: &AppState, ride_id: Uuid, driver_id: Uuid) -> Result<Ride, DispatchError> {
    observed(state, "start", || {
        let ride = ride_snapshot(state, ride_id)?;
        require_assigned_driver(&ride, driver_id)?;
        let via_arrival = ride.status == RideStatus::Accepted
            && is_valid_transition(RideStatus::Accepted, RideStatus::DriverArriving)
            && is_valid_transition(RideStatus::DriverArriving, RideStatus::InProgress);
        if !via_arrival && !is_valid_transition(ride.status, RideStatus::InProgress) {
            return Err(DispatchError::InvalidTransition {
                from: ride.status,
                to: RideStatus::InProgress,
            });
        }

        let mut entry = state
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| DispatchError::NotFound(format!("ride {ride_id} not found")))?;
        let expected = entry.status == RideStatus::Accepted
            || entry.status == RideStatus::DriverArriving;
        if !expected {
            return Err(DispatchError::InvalidTransition {
                from: entry.status,
                to: RideStatus::InProgress,
            });
        }
        require_assigned_driver(&entry, driver_id)?;
        if entry.status == RideStatus::Accepted {
            entry.pickup.arrived_at = Some(Utc::now());
        }
        entry.status = RideStatus::InProgress;
        entry.started_at = Some(Utc::now());
        let updated = entry.clone();
        drop(entry);

        info!(ride_id = %ride_id, driver_id = %driver_id, "ride started");
        Ok(updated)
    })
}

/// Finish the trip: terminal status, payment completed, driver freed.
pub fn complete(state: &AppState, ride_id: Uuid, driver_id: Uuid) -> Result<Ride, DispatchError> {
    observed(state, "complete", || {
        let ride = ride_snapshot(state, ride_id)?;
        require_assigned_driver(&ride, driver_id)?;
        if !is_valid_transition(ride.status, RideStatus::Completed) {
            return Err(DispatchError::InvalidTransition {
                from: ride.status,
                to: RideStatus::Completed,
            });
        }

        let updated = {
            let mut entry = state
                .rides
                .get_mut(&ride_id)
                .ok_or_else(|| DispatchError::NotFound(format!("ride {ride_id} not found")))?;
            if entry.status != RideStatus::InProgress {
                return Err(DispatchError::InvalidTransition {
                    from: entry.status,
                    to: RideStatus::Completed,
                });
            }
            require_assigned_driver(&entry, driver_id)?;
            let now = Utc::now();
            entry.status = RideStatus::Completed;
            entry.completed_at = Some(now);
            entry.dropoff.arrived_at = Some(now);
            entry.payment.status = PaymentStatus::Completed;
            entry.clone()
        };

        if let Some(mut driver) = state.actors.get_mut(&driver_id) {
            driver.available = true;
            driver.current_ride_id = None;
            driver.updated_at = Utc::now();
        }
        state.metrics.rides_active.dec();

        info!(ride_id = %ride_id, driver_id = %driver_id, "ride completed");
        Ok(updated)
    })
}

/// Cancel from any state whose allowed set contains `cancelled`. Records
/// who and why; frees the driver if one was mid-ride.
pub fn cancel(
    state: &AppState,
    ride_id: Uuid,
    by: Role,
    reason: Option<String>,
) -> Result<Ride, DispatchError> {
    observed(state, "cancel", || {
        let ride = ride_snapshot(state, ride_id)?;
        if !allowed_transitions(ride.status).contains(&RideStatus::Cancelled) {
            return Err(DispatchError::InvalidTransition {
                from: ride.status,
                to: RideStatus::Cancelled,
            });
        }

        let (updated, driver_id) = {
            let mut entry = state
                .rides
                .get_mut(&ride_id)
                .ok_or_else(|| DispatchError::NotFound(format!("ride {ride_id} not found")))?;
            if !allowed_transitions(entry.status).contains(&RideStatus::Cancelled) {
                return Err(DispatchError::InvalidTransition {
                    from: entry.status,
                    to: RideStatus::Cancelled,
                });
            }
            let now = Utc::now();
            entry.status = RideStatus::Cancelled;
            entry.cancelled_at = Some(now);
            entry.cancellation = Some(Cancellation {
                by,
                reason,
                at: now,
            });
            (entry.clone(), entry.driver_id)
        };

        if let Some(driver_id) = driver_id {
            if let Some(mut driver) = state.actors.get_mut(&driver_id) {
                if driver.current_ride_id == Some(ride_id) {
                    driver.available = true;
                    driver.current_ride_id = None;
                    driver.updated_at = Utc::now();
                }
            }
        }
        state.metrics.rides_active.dec();

        info!(ride_id = %ride_id, by = ?by, "ride cancelled");
        Ok(updated)
    })
}

/// Record a rating on a completed ride, at most one per rater role, then
/// recompute the rated party's running average over their full history.
pub fn rate(
    state: &AppState,
    ride_id: Uuid,
    score: u8,
    comment: Option<String>,
    rated_by: Role,
) -> Result<Ride, DispatchError> {
    observed(state, "rate", || {
        if !(1..=5).contains(&score) {
            return Err(DispatchError::BadRequest(
                "score must be between 1 and 5".to_string(),
            ));
        }

        let ride = ride_snapshot(state, ride_id)?;
        if ride.status != RideStatus::Completed {
            return Err(DispatchError::NotYetCompleted);
        }
        if ride.rating_by(rated_by).is_some() {
            return Err(DispatchError::AlreadyRated);
        }
        let subject_id = ride
            .rated_party(rated_by)
            .ok_or_else(|| DispatchError::Internal("completed ride has no driver".to_string()))?;
        require_actor(state, subject_id)?;

        let updated = {
            let mut entry = state
                .rides
                .get_mut(&ride_id)
                .ok_or_else(|| DispatchError::NotFound(format!("ride {ride_id} not found")))?;
            if entry.status != RideStatus::Completed {
                return Err(DispatchError::NotYetCompleted);
            }
            if entry.rating_by(rated_by).is_some() {
                return Err(DispatchError::AlreadyRated);
            }
            entry.ratings.push(Rating {
                score,
                comment,
                rated_by,
                rated_at: Utc::now(),
            });
            entry.clone()
        };

        let average = recompute_average(state, subject_id);
        if let Some(mut subject) = state.actors.get_mut(&subject_id) {
            subject.rating = average;
            subject.updated_at = Utc::now();
        }

        info!(
            ride_id = %ride_id,
            subject_id = %subject_id,
            score,
            average,
            "rating recorded"
        );
        Ok(updated)
    })
}

/// Arithmetic mean over every rating the actor has ever received. A full
/// recompute over history, so the figure is exactly auditable.
fn recompute_average(state: &AppState, subject_id: Uuid) -> f64 {
    let mut sum = 0u32;
    let mut count = 0u32;
    for entry in state.rides.iter() {
        let ride = entry.value();
        for rating in &ride.ratings {
            if ride.rated_party(rating.rated_by) == Some(subject_id) {
                sum += u32::from(rating.score);
                count += 1;
            }
        }
    }
    if count == 0 {
        crate::models::actor::DEFAULT_RATING
    } else {
        f64::from(sum) / f64::from(count)
    }
}

/// Availability flip from an explicit intent. A driver cannot go available
/// mid-ride.
pub fn set_availability(
    state: &AppState,
    driver_id: Uuid,
    available: bool,
    position: Option<GeoPoint>,
) -> Result<(), DispatchError> {
    let mut driver = state
        .actors
        .get_mut(&driver_id)
        .ok_or_else(|| DispatchError::NotFound(format!("actor {driver_id} not found")))?;
    if driver.role != Role::Driver {
        return Err(DispatchError::NotAuthorized(
            "only drivers have availability".to_string(),
        ));
    }
    if available && driver.current_ride_id.is_some() {
        return Err(DispatchError::BadRequest(
            "driver is mid-ride and cannot go available".to_string(),
        ));
    }
    driver.available = available;
    if let Some(point) = position {
        driver.position = Some(point);
    }
    driver.updated_at = Utc::now();
    Ok(())
}
