use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::AvailableSlotsResponse;
use crate::services::availability;
use crate::state::AppState;

use super::{check_rate_limit, parse_date_range};

/// Longest inclusive `from..=to` span a slot query may cover.
const MAX_RANGE_DAYS: i64 = 62;

#[derive(Deserialize)]
pub struct SlotsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

// GET /scheduler/slots?from=&to=
pub async fn get_slots(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<AvailableSlotsResponse>, AppError> {
    check_rate_limit(
        &state,
        &headers,
        peer.map(|c| c.0),
        state.config.slots_rate_limit,
    )?;

    let (from, to) = parse_date_range(query.from.as_deref(), query.to.as_deref())?;
    if (to - from).num_days() >= MAX_RANGE_DAYS {
        return Err(AppError::Validation(format!(
            "date range must not exceed {MAX_RANGE_DAYS} days"
        )));
    }
    let now = state.clock.now();

    let slots = {
        let db = state.db();
        availability::get_available_slots(&db, &from, &to, &now)?
    };

    Ok(Json(AvailableSlotsResponse { slots }))
}
