use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::partition::SeatRange;

/// Shared work cursor for the thread-pool strategy.
///
/// Hands out the `chunk_size` sub-ranges of a set of gaps, each exactly once.
/// `claim` is a single atomic increment of a chunk counter, mapped back to its
/// gap through per-gap chunk totals, so concurrent workers never receive
/// overlapping ranges and memory grows with the number of gaps only.
#[derive(Debug)]
pub struct SeatCursor {
    next: AtomicU64,
    chunk_size: u64,
    gaps: Vec<SeatRange>,
    /// Chunks contained in `gaps[..=i]`.
    chunk_ends: Vec<u64>,
}

impl SeatCursor {
    pub fn new(gaps: Vec<SeatRange>, chunk_size: NonZeroU64) -> Self {
        let chunk_size = chunk_size.get();
        let gaps: Vec<SeatRange> = gaps.into_iter().filter(|g| !g.is_empty()).collect();

        let mut total = 0u64;
        let chunk_ends = gaps
            .iter()
            .map(|gap| {
                total += gap.len().div_ceil(chunk_size);
                total
            })
            .collect();

        Self {
            next: AtomicU64::new(0),
            chunk_size,
            gaps,
            chunk_ends,
        }
    }

    /// Claim the next unclaimed sub-range.
    pub fn claim(&self) -> Option<SeatRange> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        let gap_index = self.chunk_ends.partition_point(|&end| end <= index);
        let gap = self.gaps.get(gap_index)?;

        let first = gap_index
            .checked_sub(1)
            .map_or(0, |prev| self.chunk_ends[prev]);
        let start = gap.start + (index - first) * self.chunk_size;
        Some(SeatRange::new(
            start,
            start.saturating_add(self.chunk_size).min(gap.end),
        ))
    }

    /// Number of sub-ranges the cursor hands out in total.
    pub fn len(&self) -> u64 {
        self.chunk_ends.last().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true once every sub-range has been handed out.
    pub fn is_exhausted(&self) -> bool {
        self.next.load(Ordering::Relaxed) >= self.len()
    }
}
