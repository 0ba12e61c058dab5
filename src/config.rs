use std::env;

use crate::error::DispatchError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub match_radius_km: f64,
    pub match_candidate_cap: usize,
    pub breadcrumb_ttl_days: i64,
    pub breadcrumb_sweep_secs: u64,
    pub planner_speed_kmh: f64,
}

impl Config {
    pub fn from_env() -> Result<Self, DispatchError> {
        let _ = dotenvy::dotenv();

        Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            match_radius_km: parse_or_default("MATCH_RADIUS_KM", 10.0)?,
            match_candidate_cap: parse_or_default("MATCH_CANDIDATE_CAP", 10)?,
            breadcrumb_ttl_days: parse_or_default("BREADCRUMB_TTL_DAYS", 7)?,
            breadcrumb_sweep_secs: parse_or_default("BREADCRUMB_SWEEP_SECS", 3600)?,
            planner_speed_kmh: parse_or_default("PLANNER_SPEED_KMH", 30.0)?,
        }
        .validated()
    }

    // Pickup ETAs divide by the planner speed, so a non-positive value is
    // rejected at startup rather than surfacing as an infinite ETA.
    fn validated(self) -> Result<Self, DispatchError> {
        if self.planner_speed_kmh <= 0.0 {
            return Err(DispatchError::Internal(
                "PLANNER_SPEED_KMH must be positive".to_string(),
            ));
        }
        if self.match_radius_km <= 0.0 {
            return Err(DispatchError::Internal(
                "MATCH_RADIUS_KM must be positive".to_string(),
            ));
        }
        Ok(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            match_radius_km: 10.0,
            match_candidate_cap: 10,
            breadcrumb_ttl_days: 7,
            breadcrumb_sweep_secs: 3600,
            planner_speed_kmh: 30.0,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, DispatchError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| DispatchError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
