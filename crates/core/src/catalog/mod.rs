//! Concert catalog port - read-only source of seat capacity and price tiers.
//!
//! The issuance engine never decides which seats exist or what they cost.
//! It asks a [`ConcertCatalog`] for a [`ConcertSnapshot`] and turns that into
//! a [`SeatLayout`], the cumulative allocation table used to stamp a rating
//! and price onto every generated ticket.

mod sqlite;
mod types;

pub use sqlite::SqliteConcertCatalog;
pub use types::{ConcertSnapshot, LayoutError, RatingAllocation, SeatLayout};

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when reading from a concert catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No concert with this id.
    #[error("concert not found: {0}")]
    ConcertNotFound(i64),

    /// Catalog data violates a layout invariant.
    #[error("invalid seat layout: {0}")]
    InvalidLayout(#[from] LayoutError),

    /// Storage backend failure.
    #[error("catalog database error: {0}")]
    Database(String),
}

/// Read-only access to concert capacity and price tiers.
#[async_trait]
pub trait ConcertCatalog: Send + Sync {
    /// Fetch the current snapshot for a concert.
    async fn snapshot(&self, concert_id: i64) -> Result<ConcertSnapshot, CatalogError>;
}
