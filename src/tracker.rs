use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::time::sleep;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::actor::{GeoPoint, Role};
use crate::models::breadcrumb::LocationBreadcrumb;
use crate::state::AppState;

/// Record a driver's current position. The position always updates; a
/// breadcrumb is appended only while the driver has an active ride. Called
/// at a high rate, so it knows nothing about ride status beyond the
/// active-ride pointer.
pub fn update_driver_position(
    state: &AppState,
    driver_id: Uuid,
    point: GeoPoint,
    accuracy: Option<f64>,
    speed: Option<f64>,
    heading: Option<f64>,
) -> Result<Option<LocationBreadcrumb>, DispatchError> {
    if !point.is_valid() {
        return Err(DispatchError::BadRequest(
            "position coordinates out of range".to_string(),
        ));
    }

    let active_ride_id = {
        let mut driver = state
            .actors
            .get_mut(&driver_id)
            .ok_or_else(|| DispatchError::NotFound(format!("actor {driver_id} not found")))?;
        if driver.role != Role::Driver {
            return Err(DispatchError::NotAuthorized(
                "only drivers report positions".to_string(),
            ));
        }
        driver.position = Some(point);
        driver.updated_at = Utc::now();
        driver.current_ride_id
    };

    state.metrics.location_pings_total.inc();

    let Some(ride_id) = active_ride_id else {
        return Ok(None);
    };

    let breadcrumb = LocationBreadcrumb {
        id: Uuid::new_v4(),
        driver_id,
        ride_id: Some(ride_id),
        point,
        accuracy,
        speed,
        heading,
        recorded_at: Utc::now(),
    };
    state.breadcrumbs.insert(breadcrumb.id, breadcrumb.clone());

    debug!(driver_id = %driver_id, ride_id = %ride_id, "breadcrumb recorded");
    Ok(Some(breadcrumb))
}

/// Drop breadcrumbs older than the retention window. Returns how many were
/// removed.
pub fn prune_expired(state: &AppState, retention: Duration) -> usize {
    let cutoff = Utc::now() - retention;
    // Counted inside the closure: pings keep inserting while the sweep
    // runs, so a before/after size diff would not equal the removals.
    let mut pruned = 0usize;
    state.breadcrumbs.retain(|_, crumb| {
        let keep = crumb.recorded_at >= cutoff;
        if !keep {
            pruned += 1;
        }
        keep
    });
    if pruned > 0 {
        state.metrics.breadcrumbs_pruned_total.inc_by(pruned as u64);
    }
    pruned
}

/// In-process realization of the fixed-TTL retention contract.
pub async fn run_breadcrumb_janitor(state: Arc<AppState>) {
    let retention = Duration::days(state.config.breadcrumb_ttl_days);
    let sweep = std::time::Duration::from_secs(state.config.breadcrumb_sweep_secs);
    info!(
        ttl_days = state.config.breadcrumb_ttl_days,
        sweep_secs = state.config.breadcrumb_sweep_secs,
        "breadcrumb janitor started"
    );

    loop {
        sleep(sweep).await;
        let pruned = prune_expired(&state, retention);
        if pruned > 0 {
            info!(pruned, "expired breadcrumbs pruned");
        }
    }
}
