use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::Config;
use crate::geo::haversine_km;
use crate::models::actor::{Actor, GeoPoint, Role};
use crate::models::breadcrumb::LocationBreadcrumb;
use crate::models::ride::{Ride, RideStatus};
use crate::observability::metrics::Metrics;
use crate::planner::{HaversineRoutePlanner, RoutePlanner};

pub struct AppState {
    pub config: Config,
    pub rides: DashMap<Uuid, Ride>,
    pub actors: DashMap<Uuid, Actor>,
    pub breadcrumbs: DashMap<Uuid, LocationBreadcrumb>,
    pub planner: Arc<dyn RoutePlanner>,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Copy)]
pub struct DriverCandidate {
    pub driver_id: Uuid,
    pub distance_km: f64,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let planner = Arc::new(HaversineRoutePlanner {
            speed_kmh: config.planner_speed_kmh,
        });
        Self::with_planner(config, planner)
    }

    pub fn with_planner(config: Config, planner: Arc<dyn RoutePlanner>) -> Self {
        Self {
            config,
            rides: DashMap::new(),
            actors: DashMap::new(),
            breadcrumbs: DashMap::new(),
            planner,
            metrics: Metrics::new(),
        }
    }

    pub fn count_available_drivers(&self) -> usize {
        self.actors
            .iter()
            .filter(|entry| {
                let actor = entry.value();
                actor.role == Role::Driver && actor.available
            })
            .count()
    }

    /// Rides still waiting for a driver, used for the demand ratio.
    pub fn count_requested_rides(&self) -> usize {
        self.rides
            .iter()
            .filter(|entry| entry.value().status == RideStatus::Requested)
            .count()
    }

    /// K-nearest available drivers within the radius, ordered by distance
    /// with ties broken by ascending id.
    pub fn nearest_available_drivers(
        &self,
        origin: &GeoPoint,
        radius_km: f64,
        cap: usize,
    ) -> Vec<DriverCandidate> {
        let mut candidates: Vec<DriverCandidate> = self
            .actors
            .iter()
            .filter_map(|entry| {
                let actor = entry.value();
                if actor.role != Role::Driver || !actor.available {
                    return None;
                }
                let position = actor.position.as_ref()?;
                let distance_km = haversine_km(position, origin);
                (distance_km <= radius_km).then_some(DriverCandidate {
                    driver_id: actor.id,
                    distance_km,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then_with(|| a.driver_id.cmp(&b.driver_id))
        });
        candidates.truncate(cap);
        candidates
    }
}
