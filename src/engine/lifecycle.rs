use crate::models::ride::RideStatus;

use RideStatus::*;

/// The closed transition table. Anything not listed here is illegal.
pub fn allowed_transitions(current: RideStatus) -> &'static [RideStatus] {
    match current {
        Requested => &[Accepted, Cancelled],
        Accepted => &[DriverArriving, Cancelled],
        DriverArriving => &[InProgress, Cancelled],
        InProgress => &[Completed, Cancelled],
        Completed => &[],
        Cancelled => &[],
    }
}

pub fn is_valid_transition(current: RideStatus, next: RideStatus) -> bool {
    allowed_transitions(current).contains(&next)
}

pub fn is_terminal(status: RideStatus) -> bool {
    allowed_transitions(status).is_empty()
}
