use crate::models::ride::{FareBreakdown, VehicleClass};

const BASE_FARE: f64 = 2.50;
const PER_MILE_RATE: f64 = 1.75;
const PER_MINUTE_RATE: f64 = 0.35;
const METERS_PER_MILE: f64 = 1_609.344;
const CURRENCY: &str = "USD";

pub const MAX_SURGE: f64 = 3.0;

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Price a trip. Each monetary component is rounded to cents independently
/// before summing so float error never compounds past cent granularity.
pub fn quote(
    distance_meters: f64,
    duration_secs: u32,
    vehicle_class: VehicleClass,
    surge_multiplier: f64,
    surge_reason: Option<String>,
) -> FareBreakdown {
    let miles = distance_meters / METERS_PER_MILE;
    let minutes = f64::from(duration_secs) / 60.0;
    let class_multiplier = vehicle_class.multiplier();

    let base = round_cents(BASE_FARE);
    let distance_fare = round_cents(miles * PER_MILE_RATE * class_multiplier);
    let time_fare = round_cents(minutes * PER_MINUTE_RATE * class_multiplier);
    let total = round_cents((base + distance_fare + time_fare) * surge_multiplier);

    FareBreakdown {
        base,
        distance_fare,
        time_fare,
        surge_multiplier,
        surge_reason,
        total,
        currency: CURRENCY.to_string(),
    }
}

/// Demand-based surge tier, evaluated highest-first on the ratio of waiting
/// riders to available drivers. Zero available drivers with any demand is
/// forced to the maximum tier. Pure; recomputed at request time, never cached.
pub fn surge_multiplier(waiting_riders: usize, available_drivers: usize) -> f64 {
    if available_drivers == 0 {
        return if waiting_riders > 0 { MAX_SURGE } else { 1.0 };
    }

    let ratio = waiting_riders as f64 / available_drivers as f64;
    if ratio > 3.0 {
        3.0
    } else if ratio > 2.0 {
        2.5
    } else if ratio > 1.5 {
        2.0
    } else if ratio > 1.0 {
        1.5
    } else {
        1.0
    }
}

pub fn surge_reason(
    multiplier: f64,
    waiting_riders: usize,
    available_drivers: usize,
) -> Option<String> {
    if multiplier > 1.0 {
        Some(format!(
            "demand {multiplier}x: {waiting_riders} waiting riders / {available_drivers} available drivers"
        ))
    } else {
        None
    }
}
