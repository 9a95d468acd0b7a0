//! Ticket sink and repository traits.

use async_trait::async_trait;
use thiserror::Error;

use crate::partition::SeatRange;
use crate::ticket::{NewTicket, Ticket};

/// Error type for ticket persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    /// Write failed but may succeed if retried (lock contention, dropped connection).
    #[error("transient persistence failure: {0}")]
    Transient(String),

    /// The (concert, seat) uniqueness constraint rejected a row.
    #[error("seat {seat_index} of concert {concert_id} is already issued")]
    SeatCollision { concert_id: i64, seat_index: u64 },

    /// Write failed and retrying will not help.
    #[error("persistence failure: {0}")]
    Fatal(String),

    /// Ticket not found.
    #[error("ticket not found: {0}")]
    NotFound(i64),
}

impl SinkError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Transient(_))
    }
}

/// Persistence target for generated tickets.
///
/// Implementations must commit each chunk atomically and enforce
/// uniqueness of `(concert_id, seat_index)`; the engine relies on the
/// constraint as the last line of defence against overlapping work.
#[async_trait]
pub trait TicketSink: Send + Sync {
    /// Commit a chunk of tickets in one transaction. Returns the number of rows written.
    ///
    /// On error nothing from the chunk is committed.
    async fn write_chunk(&self, concert_id: i64, tickets: &[NewTicket]) -> Result<u64, SinkError>;

    /// Number of tickets issued for a concert.
    async fn count_for_concert(&self, concert_id: i64) -> Result<u64, SinkError>;

    /// Number of tickets issued for a concert whose seat index lies in `range`.
    async fn count_in_range(&self, concert_id: i64, range: SeatRange) -> Result<u64, SinkError>;
}

/// Filter for listing tickets.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    /// Restrict to one concert.
    pub concert_id: Option<i64>,
    /// Restrict to one rating.
    pub rating_id: Option<String>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl TicketFilter {
    pub fn new() -> Self {
        Self {
            concert_id: None,
            rating_id: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_concert(mut self, concert_id: i64) -> Self {
        self.concert_id = Some(concert_id);
        self
    }

    pub fn with_rating(mut self, rating_id: impl Into<String>) -> Self {
        self.rating_id = Some(rating_id.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Administrative read/delete access to issued tickets.
pub trait TicketRepository: Send + Sync {
    /// Get a ticket by id.
    fn get(&self, id: i64) -> Result<Option<Ticket>, SinkError>;

    /// List tickets ordered by concert and seat index.
    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, SinkError>;

    /// Count tickets matching the filter (limit/offset ignored).
    fn count(&self, filter: &TicketFilter) -> Result<i64, SinkError>;

    /// Permanently delete a ticket. Returns the deleted row.
    fn delete(&self, id: i64) -> Result<Ticket, SinkError>;
}
