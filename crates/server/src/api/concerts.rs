//! Concert API handlers: catalog seeding and issued ticket reads.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use seatbatch_core::{
    CatalogError, ConcertSnapshot, RatingAllocation, SeatLayout, TicketFilter,
};
use tracing::info;

use super::tickets::{
    ticket_error_response, ListTicketsResponse, TicketErrorResponse, TicketResponse,
};
use crate::state::AppState;

/// Maximum allowed limit for ticket queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for ticket queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for seeding a concert
#[derive(Debug, Deserialize)]
pub struct PutConcertBody {
    pub name: String,
    pub ticket_amount: u64,
    /// Price tiers in seat order
    pub ratings: Vec<RatingAllocation>,
}

/// Query parameters for listing a concert's tickets
#[derive(Debug, Deserialize)]
pub struct ListConcertTicketsParams {
    pub rating: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Response for the ticket count of a concert
#[derive(Debug, Serialize)]
pub struct TicketCountResponse {
    pub concert_id: i64,
    pub count: i64,
}

type ApiError = (StatusCode, Json<TicketErrorResponse>);

fn catalog_error_response(err: CatalogError) -> ApiError {
    let status = match &err {
        CatalogError::ConcertNotFound(_) => StatusCode::NOT_FOUND,
        CatalogError::InvalidLayout(_) => StatusCode::BAD_REQUEST,
        CatalogError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(TicketErrorResponse {
            error: err.to_string(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Seed or replace a concert's capacity and price tiers
pub async fn put_concert(
    State(state): State<Arc<AppState>>,
    Path(concert_id): Path<i64>,
    Json(body): Json<PutConcertBody>,
) -> Result<Json<ConcertSnapshot>, ApiError> {
    let snapshot = ConcertSnapshot::new(concert_id, body.ticket_amount, body.ratings);
    SeatLayout::from_snapshot(&snapshot)
        .map_err(|e| catalog_error_response(CatalogError::InvalidLayout(e)))?;

    state
        .concerts()
        .upsert_concert(&body.name, &snapshot)
        .map_err(catalog_error_response)?;

    info!(
        concert_id,
        ticket_amount = snapshot.ticket_amount,
        ratings = snapshot.ratings.len(),
        "Concert seeded"
    );
    Ok(Json(snapshot))
}

/// List issued tickets of a concert
pub async fn list_concert_tickets(
    State(state): State<Arc<AppState>>,
    Path(concert_id): Path<i64>,
    Query(params): Query<ListConcertTicketsParams>,
) -> Result<Json<ListTicketsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = TicketFilter::new()
        .with_concert(concert_id)
        .with_limit(limit)
        .with_offset(offset);
    if let Some(rating) = params.rating {
        filter = filter.with_rating(rating);
    }

    let tickets = state.tickets().list(&filter).map_err(ticket_error_response)?;
    let total = state.tickets().count(&filter).map_err(ticket_error_response)?;

    Ok(Json(ListTicketsResponse {
        tickets: tickets.into_iter().map(TicketResponse::from).collect(),
        total,
        limit,
        offset,
    }))
}

/// Number of issued tickets of a concert
pub async fn count_concert_tickets(
    State(state): State<Arc<AppState>>,
    Path(concert_id): Path<i64>,
) -> Result<Json<TicketCountResponse>, ApiError> {
    let count = state
        .tickets()
        .count(&TicketFilter::new().with_concert(concert_id))
        .map_err(ticket_error_response)?;

    Ok(Json(TicketCountResponse { concert_id, count }))
}
