use chrono::Utc;

use crate::error::DispatchError;
use crate::geo;
use crate::models::actor::GeoPoint;
use crate::models::ride::RoutePoint;

#[derive(Debug, Clone)]
pub struct RoutePlan {
    pub distance_meters: f64,
    pub duration_secs: u32,
    pub polyline: Vec<RoutePoint>,
}

/// External route planner collaborator. The production deployment fronts a
/// real routing service; tests inject stubs.
pub trait RoutePlanner: Send + Sync {
    fn route(&self, pickup: &GeoPoint, dropoff: &GeoPoint) -> Result<RoutePlan, DispatchError>;
}

/// Great-circle fallback planner: distance from the haversine formula,
/// duration from a configured average speed, straight-line polyline.
pub struct HaversineRoutePlanner {
    pub speed_kmh: f64,
}

const POLYLINE_SEGMENTS: usize = 10;

impl RoutePlanner for HaversineRoutePlanner {
    fn route(&self, pickup: &GeoPoint, dropoff: &GeoPoint) -> Result<RoutePlan, DispatchError> {
        if !pickup.is_valid() || !dropoff.is_valid() {
            return Err(DispatchError::RoutePlanningFailed(
                "coordinates out of range".to_string(),
            ));
        }
        if self.speed_kmh <= 0.0 {
            return Err(DispatchError::RoutePlanningFailed(
                "planner speed must be positive".to_string(),
            ));
        }

        let distance_meters = geo::haversine_meters(pickup, dropoff);
        if distance_meters < 1.0 {
            return Err(DispatchError::RoutePlanningFailed(
                "pickup and dropoff are the same point".to_string(),
            ));
        }

        let duration_secs = ((distance_meters / 1_000.0) / self.speed_kmh * 3_600.0).ceil() as u32;

        let now = Utc::now();
        let polyline = (0..=POLYLINE_SEGMENTS)
            .map(|i| {
                let t = i as f64 / POLYLINE_SEGMENTS as f64;
                let p = geo::lerp(pickup, dropoff, t);
                RoutePoint {
                    lat: p.lat,
                    lng: p.lng,
                    timestamp: now,
                }
            })
            .collect();

        Ok(RoutePlan {
            distance_meters,
            duration_secs,
            polyline,
        })
    }
}
