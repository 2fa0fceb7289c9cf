use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::Json;
use base64::Engine;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{AdminBookingsResponse, BookingStatus};
use crate::services::lifecycle;
use crate::state::AppState;

use super::parse_date_range;

const ADMIN_USER: &str = "admin";

/// HTTP Basic auth against the single configured admin password.
fn check_auth(headers: &HeaderMap, password: &str) -> Result<(), AppError> {
    if password.is_empty() {
        return Err(AppError::AdminNotConfigured);
    }

    let credentials = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|encoded| {
            base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .ok()
        })
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .ok_or(AppError::Unauthorized)?;

    match credentials.split_once(':') {
        Some((user, pass))
            if user == ADMIN_USER && constant_time_eq(pass.as_bytes(), password.as_bytes()) =>
        {
            Ok(())
        }
        _ => Err(AppError::Unauthorized),
    }
}

/// Runs in time that depends only on `expected.len()`.
fn constant_time_eq(given: &[u8], expected: &[u8]) -> bool {
    let mut diff = given.len() ^ expected.len();
    for (i, e) in expected.iter().enumerate() {
        let g = given.get(i).copied().unwrap_or(0);
        diff |= usize::from(g ^ e);
    }
    diff == 0
}

// GET /scheduler/admin/bookings?from=&to=&status=
#[derive(Deserialize)]
pub struct AdminBookingsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub status: Option<String>,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AdminBookingsQuery>,
) -> Result<Json<AdminBookingsResponse>, AppError> {
    check_auth(&headers, &state.config.admin_password)?;

    let (from, to) = parse_date_range(query.from.as_deref(), query.to.as_deref())?;
    let status_filter = match query.status.as_deref() {
        None | Some("") => None,
        Some(s) => Some(
            BookingStatus::parse(s)
                .ok_or_else(|| AppError::Validation(format!("unknown status: {s}")))?,
        ),
    };

    let bookings = {
        let db = state.db();
        queries::list_bookings(&db, &from, &to, status_filter)?
    };

    Ok(Json(AdminBookingsResponse { bookings }))
}

// PATCH /scheduler/admin/bookings/:id
#[derive(Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_password)?;

    match body {
        Ok(Json(update)) if update.status == BookingStatus::Cancelled.as_str() => {}
        _ => {
            return Err(AppError::Validation(
                "Status must be 'cancelled'".to_string(),
            ))
        }
    }

    let id: i64 = id
        .parse()
        .map_err(|_| AppError::NotFound("Booking not found".to_string()))?;

    {
        let db = state.db();
        lifecycle::cancel_booking(&db, id, &state.notifier)?;
    }

    Ok(Json(serde_json::json!({ "success": true, "message": "Booking cancelled" })))
}
