use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::dispatch::StopSpec;
use crate::models::actor::{GeoPoint, Role};
use crate::models::ride::{Ride, VehicleClass};

/// Inbound realtime intents. The connection's actor identity is resolved at
/// session setup, never trusted from the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    GoAvailable {
        position: GeoPoint,
    },
    GoUnavailable,
    RequestRide {
        pickup: StopSpec,
        dropoff: StopSpec,
        vehicle_class: VehicleClass,
        payment_method: String,
    },
    AcceptRide {
        ride_id: Uuid,
    },
    DeclineRide {
        ride_id: Uuid,
    },
    Arrived {
        ride_id: Uuid,
    },
    StartRide {
        ride_id: Uuid,
    },
    CompleteRide {
        ride_id: Uuid,
    },
    CancelRide {
        ride_id: Uuid,
        reason: Option<String>,
    },
    RateRide {
        ride_id: Uuid,
        score: u8,
        comment: Option<String>,
    },
    LocationPing {
        position: GeoPoint,
        accuracy: Option<f64>,
        speed: Option<f64>,
        heading: Option<f64>,
    },
}

/// What the available-driver pool sees about an open request. Payment and
/// rider identity are deliberately excluded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideOffer {
    pub ride_id: Uuid,
    pub pickup_address: String,
    pub pickup: GeoPoint,
    pub dropoff_address: String,
    pub dropoff: GeoPoint,
    pub vehicle_class: VehicleClass,
    pub distance_meters: f64,
    pub duration_secs: u32,
    pub fare_total: f64,
    pub surge_multiplier: f64,
}

impl RideOffer {
    pub fn from_ride(ride: &Ride) -> Self {
        Self {
            ride_id: ride.id,
            pickup_address: ride.pickup.address.clone(),
            pickup: ride.pickup.point,
            dropoff_address: ride.dropoff.address.clone(),
            dropoff: ride.dropoff.point,
            vehicle_class: ride.vehicle_class,
            distance_meters: ride.distance_meters,
            duration_secs: ride.duration_secs,
            fare_total: ride.fare.total,
            surge_multiplier: ride.fare.surge_multiplier,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Broadcast to the available-driver pool when a request opens (or
    /// re-opens after a decline).
    RideRequested { offer: RideOffer },
    /// Direct confirmation to the requester.
    RideConfirmed { ride: Box<Ride> },
    /// Broadcast to the pool once a request is claimed.
    RideWithdrawn { ride_id: Uuid },
    /// Direct to the rider when a driver accepts.
    RideAccepted { ride: Box<Ride> },
    /// Direct lifecycle update (start, complete, cancel, confirmations).
    RideUpdate { ride: Box<Ride> },
    /// Relayed driver position while a ride is active.
    DriverLocation {
        ride_id: Uuid,
        position: GeoPoint,
        speed: Option<f64>,
        heading: Option<f64>,
    },
    RatingRecorded {
        ride_id: Uuid,
        score: u8,
        rated_by: Role,
    },
    Error { kind: String, message: String },
}
