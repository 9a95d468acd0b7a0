//! Ticket API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use seatbatch_core::{SinkError, Ticket};
use tracing::info;

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

/// Response for ticket operations
#[derive(Debug, Serialize)]
pub struct TicketResponse {
    pub id: i64,
    pub concert_id: i64,
    pub seat_index: u64,
    pub rating: String,
    pub price: i64,
    pub created_at: String,
}

impl From<Ticket> for TicketResponse {
    fn from(ticket: Ticket) -> Self {
        Self {
            id: ticket.id,
            concert_id: ticket.concert_id,
            seat_index: ticket.seat_index,
            rating: ticket.rating_id,
            price: ticket.price,
            created_at: ticket.created_at.to_rfc3339(),
        }
    }
}

/// Response for listing tickets
#[derive(Debug, Serialize)]
pub struct ListTicketsResponse {
    pub tickets: Vec<TicketResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct TicketErrorResponse {
    pub error: String,
}

pub(crate) fn ticket_error_response(err: SinkError) -> (StatusCode, Json<TicketErrorResponse>) {
    let status = match &err {
        SinkError::NotFound(_) => StatusCode::NOT_FOUND,
        SinkError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        SinkError::SeatCollision { .. } => StatusCode::CONFLICT,
        SinkError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
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

/// Get a ticket by ID
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<TicketResponse>, (StatusCode, Json<TicketErrorResponse>)> {
    match state.tickets().get(id) {
        Ok(Some(ticket)) => Ok(Json(TicketResponse::from(ticket))),
        Ok(None) => Err(ticket_error_response(SinkError::NotFound(id))),
        Err(e) => Err(ticket_error_response(e)),
    }
}

/// Delete an issued ticket (administrative)
pub async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<TicketResponse>, (StatusCode, Json<TicketErrorResponse>)> {
    let ticket = state.tickets().delete(id).map_err(ticket_error_response)?;

    info!(
        ticket_id = id,
        concert_id = ticket.concert_id,
        seat_index = ticket.seat_index,
        "Ticket deleted"
    );
    Ok(Json(TicketResponse::from(ticket)))
}
