//! Testing utilities and mock implementations.
//!
//! This module provides in-memory implementations of the catalog and sink
//! ports so the engine can be exercised without a database.
//!
//! # Example
//!
//! ```rust,ignore
//! use seatbatch_core::testing::{fixtures, MockConcertCatalog, MockTicketSink};
//!
//! let catalog = MockConcertCatalog::new();
//! catalog.add_concert(fixtures::concert_snapshot(42, 100)).await;
//!
//! let sink = MockTicketSink::new();
//! sink.inject_transient_failures(45, 2).await;
//!
//! // Hand both to a JobOrchestrator...
//! ```

mod mock_catalog;
mod mock_sink;

pub use mock_catalog::MockConcertCatalog;
pub use mock_sink::MockTicketSink;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::catalog::{ConcertSnapshot, RatingAllocation};

    /// A concert with three price tiers: VIP 10%, R 30%, S the rest.
    pub fn concert_snapshot(concert_id: i64, ticket_amount: u64) -> ConcertSnapshot {
        let vip = ticket_amount / 10;
        let r = ticket_amount * 3 / 10;
        let s = ticket_amount - vip - r;

        ConcertSnapshot::new(
            concert_id,
            ticket_amount,
            vec![
                RatingAllocation::new("VIP", vip, 150_000),
                RatingAllocation::new("R", r, 110_000),
                RatingAllocation::new("S", s, 80_000),
            ],
        )
    }

    /// A snapshot whose shares do not cover the capacity.
    pub fn misallocated_snapshot(concert_id: i64, ticket_amount: u64) -> ConcertSnapshot {
        ConcertSnapshot::new(
            concert_id,
            ticket_amount,
            vec![RatingAllocation::new("S", ticket_amount.saturating_sub(1), 80_000)],
        )
    }
}
