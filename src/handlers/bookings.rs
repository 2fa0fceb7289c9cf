use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingRequest, BookingResponse, BookingStatus, TokenAction};
use crate::services::booking;
use crate::services::email::escape;
use crate::services::lifecycle::{self, Transition};
use crate::state::AppState;

use super::check_rate_limit;

// POST /scheduler/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: Result<Json<BookingRequest>, JsonRejection>,
) -> Result<Json<BookingResponse>, AppError> {
    check_rate_limit(
        &state,
        &headers,
        peer.map(|c| c.0),
        state.config.booking_rate_limit,
    )?;

    let Json(request) = body.map_err(|e| {
        tracing::debug!(error = %e, "rejecting malformed booking body");
        AppError::Validation("Invalid request body".to_string())
    })?;
    let now = state.clock.now();

    let created = {
        let mut db = state.db();
        booking::create_booking(&mut db, &request, &now, &state.notifier)?
    };

    Ok(Json(BookingResponse {
        success: true,
        message: booking::created_message(created.lang).to_string(),
        booking_id: Some(created.booking_id),
    }))
}

// GET /scheduler/bookings/:booking_id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Path(booking_id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    check_rate_limit(
        &state,
        &headers,
        peer.map(|c| c.0),
        state.config.booking_rate_limit,
    )?;

    let found = {
        let db = state.db();
        queries::get_booking_by_public_id(&db, &booking_id)?
    };

    found
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))
}

#[derive(Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

// GET /scheduler/bookings/confirm?token=
pub async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Response {
    handle_token(&state, TokenAction::Confirm, query.token.as_deref().unwrap_or(""))
}

// GET /scheduler/bookings/reject?token=
pub async fn reject_booking(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Response {
    handle_token(&state, TokenAction::Reject, query.token.as_deref().unwrap_or(""))
}

fn handle_token(state: &AppState, action: TokenAction, token: &str) -> Response {
    let result = {
        let db = state.db();
        lifecycle::apply_token(&db, action, token, &state.notifier)
    };

    match result {
        Ok(Transition::Applied(b)) => {
            let (kind, message) = match b.status {
                BookingStatus::Rejected => (
                    PageKind::Rejected,
                    format!("Booking {} rejected.", b.booking_id),
                ),
                _ => (
                    PageKind::Confirmed,
                    format!("Booking {} confirmed!", b.booking_id),
                ),
            };
            token_page(StatusCode::OK, kind, &message, &summary(&b))
        }
        Ok(Transition::Unchanged(b)) => token_page(
            StatusCode::OK,
            PageKind::Info,
            &format!("This booking is already {}", b.status),
            &b.booking_id,
        ),
        Err(e) => {
            let status = e.status();
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                tracing::error!(error = %e, "token action failed");
            }
            token_page(status, PageKind::Error, &e.public_message(), "")
        }
    }
}

fn summary(b: &Booking) -> String {
    format!("{} · {} {}", b.client_name, b.date, b.start_time)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PageKind {
    Confirmed,
    Rejected,
    Info,
    Error,
}

/// Minimal standalone page shown after an administrator clicks an emailed link.
fn token_page(status: StatusCode, kind: PageKind, message: &str, detail: &str) -> Response {
    let (color, icon) = match kind {
        PageKind::Confirmed => ("#22c55e", "&#10004;"),
        PageKind::Rejected => ("#ef4444", "&#10006;"),
        PageKind::Info => ("#3b82f6", "&#8505;"),
        PageKind::Error => ("#ef4444", "&#9888;"),
    };
    let detail = if detail.is_empty() {
        String::new()
    } else {
        format!("<p style=\"color:#6b7280;font-size:0.875rem\">{}</p>", escape(detail))
    };

    let html = format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"UTF-8\">\
         <meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">\
         <title>Scheduler</title></head>\n\
         <body style=\"margin:0;min-height:100vh;display:flex;align-items:center;justify-content:center;font-family:sans-serif;background:#f9fafb\">\
         <div style=\"text-align:center;padding:2rem;max-width:400px\">\
         <div style=\"width:64px;height:64px;border-radius:50%;background:{color};color:#fff;display:inline-flex;align-items:center;justify-content:center;font-size:2rem\">{icon}</div>\
         <h1 style=\"font-size:1.25rem\">{message}</h1>{detail}</div>\n</body>\n</html>",
        message = escape(message),
    );

    (status, Html(html)).into_response()
}
