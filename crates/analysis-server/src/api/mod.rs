//! API handlers for the analysis server.

pub mod analysis;
pub mod games;
pub mod health;

use std::time::Duration;

use crate::config::{seconds, MAX_TIME_LIMIT};
use crate::error::ApiError;

/// Validate a request's `time_limit` in seconds.
fn time_limit(value: f64) -> Result<Duration, ApiError> {
    seconds(value).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "time_limit must be between 0 and {} seconds, got {}",
            MAX_TIME_LIMIT, value
        ))
    })
}
