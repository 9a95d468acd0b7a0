//! Concert snapshot and seat layout types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::partition::SeatRange;
use crate::ticket::NewTicket;

/// One price tier of a concert, in catalog order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RatingAllocation {
    /// Rating identifier (e.g. "VIP", "R", "S").
    pub rating_id: String,
    /// Number of seats assigned to this rating.
    pub allocated_share: u64,
    /// Price of one seat in this rating.
    pub price: i64,
}

impl RatingAllocation {
    pub fn new(rating_id: impl Into<String>, allocated_share: u64, price: i64) -> Self {
        Self {
            rating_id: rating_id.into(),
            allocated_share,
            price,
        }
    }
}

/// Read-only view of a concert's capacity and price tiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConcertSnapshot {
    pub concert_id: i64,
    /// Total number of seats (N).
    pub ticket_amount: u64,
    /// Ordered price tiers. Shares must sum to `ticket_amount`.
    pub ratings: Vec<RatingAllocation>,
}

impl ConcertSnapshot {
    pub fn new(concert_id: i64, ticket_amount: u64, ratings: Vec<RatingAllocation>) -> Self {
        Self {
            concert_id,
            ticket_amount,
            ratings,
        }
    }

    /// Sum of all allocated shares, or `None` if it does not fit in a `u64`.
    pub fn allocated_total(&self) -> Option<u64> {
        self.ratings
            .iter()
            .try_fold(0u64, |total, r| total.checked_add(r.allocated_share))
    }
}

/// Errors raised while building or querying a seat layout.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("concert {concert_id}: rating shares sum to {allocated}, expected {ticket_amount}")]
    ShareMismatch {
        concert_id: i64,
        allocated: u64,
        ticket_amount: u64,
    },

    #[error("concert {concert_id}: rating shares overflow")]
    ShareOverflow { concert_id: i64 },

    #[error("concert {concert_id}: seat index {seat_index} is outside capacity {ticket_amount}")]
    SeatOutOfRange {
        concert_id: i64,
        seat_index: u64,
        ticket_amount: u64,
    },
}

/// Upper (exclusive) bound of one rating's block of seat indices.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TierBound {
    end: u64,
    rating_id: String,
    price: i64,
}

/// Cumulative allocation table mapping seat indices to ratings.
///
/// Ratings occupy contiguous blocks in catalog order: the first rating owns
/// `[0, share_0)`, the second `[share_0, share_0 + share_1)`, and so on.
/// Zero-share ratings own no seats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatLayout {
    concert_id: i64,
    ticket_amount: u64,
    tiers: Vec<TierBound>,
}

impl SeatLayout {
    /// Build the allocation table, checking that shares cover every seat exactly once.
    pub fn from_snapshot(snapshot: &ConcertSnapshot) -> Result<Self, LayoutError> {
        let allocated = snapshot
            .allocated_total()
            .ok_or(LayoutError::ShareOverflow {
                concert_id: snapshot.concert_id,
            })?;
        if allocated != snapshot.ticket_amount {
            return Err(LayoutError::ShareMismatch {
                concert_id: snapshot.concert_id,
                allocated,
                ticket_amount: snapshot.ticket_amount,
            });
        }

        // The checked total bounds every running sum
        let mut end = 0u64;
        let tiers = snapshot
            .ratings
            .iter()
            .filter(|r| r.allocated_share > 0)
            .map(|r| {
                end += r.allocated_share;
                TierBound {
                    end,
                    rating_id: r.rating_id.clone(),
                    price: r.price,
                }
            })
            .collect();

        Ok(Self {
            concert_id: snapshot.concert_id,
            ticket_amount: snapshot.ticket_amount,
            tiers,
        })
    }

    pub fn concert_id(&self) -> i64 {
        self.concert_id
    }

    pub fn ticket_amount(&self) -> u64 {
        self.ticket_amount
    }

    /// Rating and price for a seat index.
    pub fn rating_for(&self, seat_index: u64) -> Result<(&str, i64), LayoutError> {
        let idx = self.tiers.partition_point(|t| t.end <= seat_index);
        match self.tiers.get(idx) {
            Some(tier) if seat_index < self.ticket_amount => {
                Ok((tier.rating_id.as_str(), tier.price))
            }
            _ => Err(LayoutError::SeatOutOfRange {
                concert_id: self.concert_id,
                seat_index,
                ticket_amount: self.ticket_amount,
            }),
        }
    }

    /// Materialize the ticket rows for a range of seat indices.
    pub fn build_tickets(&self, range: SeatRange) -> Result<Vec<NewTicket>, LayoutError> {
        range
            .indices()
            .map(|seat_index| {
                let (rating_id, price) = self.rating_for(seat_index)?;
                Ok(NewTicket {
                    concert_id: self.concert_id,
                    seat_index,
                    rating_id: rating_id.to_string(),
                    price,
                })
            })
            .collect()
    }
}
