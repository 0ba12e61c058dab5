use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Rider,
    Driver,
}

/// A rider or driver account. Role is fixed at creation; the driver-only
/// fields (`available`, `position`, `current_ride_id`) stay at their
/// defaults for riders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    /// Running average over every rating this actor has received, 1.0..=5.0.
    pub rating: f64,
    pub available: bool,
    pub position: Option<GeoPoint>,
    /// Set once a ride this driver serves passes `accepted`, cleared when it
    /// reaches a terminal state. At most one active ride per driver.
    pub current_ride_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const DEFAULT_RATING: f64 = 3.0;

impl Actor {
    pub fn new(name: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            role,
            rating: DEFAULT_RATING,
            available: false,
            position: None,
            current_ride_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}
