//! Request timing middleware.
//!
//! Engine-backed endpoints are expected to take up to their time limit, so
//! only requests slower than [`SLOW_REQUEST`] are raised to `warn`.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::{Duration, Instant};

/// Requests slower than this are logged as warnings.
pub const SLOW_REQUEST: Duration = Duration::from_millis(100);

/// Middleware that logs method, path, status and duration of each request.
///
/// # Example
///
/// ```ignore
/// use axum::{Router, middleware};
/// use analysis_server::middleware::timing_layer;
///
/// let app = Router::new()
///     .route("/analyze", post(handler))
///     .layer(middleware::from_fn(timing_layer));
/// ```
pub async fn timing_layer(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status().as_u16();
    let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

    if elapsed > SLOW_REQUEST {
        tracing::warn!(%method, %path, status, duration_ms, "Slow request");
    } else {
        tracing::debug!(%method, %path, status, duration_ms, "Request completed");
    }

    response
}
