pub mod admin;
pub mod bookings;
pub mod health;
pub mod slots;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderMap, HeaderValue, Method};
use axum::routing::{get, patch};
use axum::Router;
use chrono::NaiveDate;
use tower_http::cors::CorsLayer;

use crate::errors::AppError;
use crate::state::AppState;

const MAX_BOOKING_BODY: usize = 64 * 1024;
const MAX_ADMIN_BODY: usize = 4 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    let cors = match state.config.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!(origin = %state.config.cors_origin, "invalid CORS_ORIGIN, cross-origin requests disabled");
            cors
        }
    };

    Router::new()
        .route("/scheduler/health", get(health::health))
        .route("/scheduler/slots", get(slots::get_slots))
        .route(
            "/scheduler/bookings",
            axum::routing::post(bookings::create_booking)
                .layer(DefaultBodyLimit::max(MAX_BOOKING_BODY)),
        )
        .route("/scheduler/bookings/confirm", get(bookings::confirm_booking))
        .route("/scheduler/bookings/reject", get(bookings::reject_booking))
        .route("/scheduler/bookings/:booking_id", get(bookings::get_booking))
        .route("/scheduler/admin/bookings", get(admin::list_bookings))
        .route(
            "/scheduler/admin/bookings/:id",
            patch(admin::cancel_booking).layer(DefaultBodyLimit::max(MAX_ADMIN_BODY)),
        )
        .layer(cors)
        .with_state(state)
}

/// First `X-Forwarded-For` entry, else the peer IP.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

/// One window per client IP shared by every endpoint; each caller passes its
/// own ceiling.
pub(crate) fn check_rate_limit(
    state: &AppState,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    max_requests: usize,
) -> Result<(), AppError> {
    let ip = client_ip(headers, peer);
    if state.rate_limiter.allow(&ip, max_requests) {
        Ok(())
    } else {
        tracing::warn!(client = %ip, max_requests, "rate limited");
        Err(AppError::RateLimited)
    }
}

/// Strict `YYYY-MM-DD`.
pub(crate) fn parse_query_date(value: Option<&str>) -> Option<NaiveDate> {
    let value = value?;
    if value.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

pub(crate) fn parse_date_range(
    from: Option<&str>,
    to: Option<&str>,
) -> Result<(NaiveDate, NaiveDate), AppError> {
    match (parse_query_date(from), parse_query_date(to)) {
        (Some(from), Some(to)) => Ok((from, to)),
        _ => Err(AppError::Validation(
            "from and to must be YYYY-MM-DD format".to_string(),
        )),
    }
}
