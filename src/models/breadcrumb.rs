use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::actor::GeoPoint;

/// A single timestamped position sample recorded while a driver is actively
/// serving a ride. Append-only, immutable, pruned after the retention window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationBreadcrumb {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub ride_id: Option<Uuid>,
    pub point: GeoPoint,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}
