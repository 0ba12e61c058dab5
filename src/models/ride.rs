use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::actor::{GeoPoint, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Requested,
    Accepted,
    DriverArriving,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleClass {
    Economy,
    Premium,
    Xl,
}

impl VehicleClass {
    pub fn multiplier(&self) -> f64 {
        match self {
            VehicleClass::Economy => 1.0,
            VehicleClass::Premium => 1.5,
            VehicleClass::Xl => 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    pub address: String,
    pub point: GeoPoint,
    pub arrived_at: Option<DateTime<Utc>>,
}

/// One vertex of the planned route polyline. Not a live breadcrumb.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePoint {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
}

/// All monetary components are rounded to cents independently before summing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FareBreakdown {
    pub base: f64,
    pub distance_fare: f64,
    pub time_fare: f64,
    pub surge_multiplier: f64,
    pub surge_reason: Option<String>,
    pub total: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Eta {
    pub pickup_secs: u32,
    pub dropoff_secs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    /// 1..=5
    pub score: u8,
    pub comment: Option<String>,
    pub rated_by: Role,
    pub rated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub method: String,
    pub status: PaymentStatus,
    pub external_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cancellation {
    pub by: Role,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// One rider-to-driver trip. Created once, mutated only through
/// lifecycle-gated transitions, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub status: RideStatus,
    pub pickup: Stop,
    pub dropoff: Stop,
    pub vehicle_class: VehicleClass,
    pub fare: FareBreakdown,
    pub eta: Eta,
    pub distance_meters: f64,
    pub duration_secs: u32,
    pub route: Vec<RoutePoint>,
    /// At most one rating per rater role.
    pub ratings: Vec<Rating>,
    pub payment: Payment,
    pub cancellation: Option<Cancellation>,
    pub requested_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Ride {
    pub fn rating_by(&self, role: Role) -> Option<&Rating> {
        self.ratings.iter().find(|r| r.rated_by == role)
    }

    /// The party a rating from `rater` applies to.
    pub fn rated_party(&self, rater: Role) -> Option<Uuid> {
        match rater {
            Role::Rider => self.driver_id,
            Role::Driver => Some(self.rider_id),
        }
    }
}
