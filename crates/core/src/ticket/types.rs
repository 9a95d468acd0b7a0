//! Ticket row types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A ticket row produced by the engine, before the sink assigns an id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewTicket {
    pub concert_id: i64,
    /// Zero-based seat slot, unique per concert.
    pub seat_index: u64,
    pub rating_id: String,
    pub price: i64,
}

/// A persisted ticket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ticket {
    /// Assigned by the sink.
    pub id: i64,
    pub concert_id: i64,
    pub seat_index: u64,
    pub rating_id: String,
    pub price: i64,
    pub created_at: DateTime<Utc>,
}
