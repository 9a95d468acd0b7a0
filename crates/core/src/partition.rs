//! Seat index ranges and the range partitioner.
//!
//! A job's seat indices `[0, N)` are split into contiguous, pairwise
//! disjoint ranges. The split is a pure function of `(N, P)` so a resumed
//! run can recompute the plan and compare it to what was persisted.

use std::num::NonZeroU64;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Half-open range of seat indices `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeatRange {
    pub start: u64,
    pub end: u64,
}

impl SeatRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "inverted seat range {}..{}", start, end);
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, seat_index: u64) -> bool {
        seat_index >= self.start && seat_index < self.end
    }

    pub fn indices(&self) -> Range<u64> {
        self.start..self.end
    }

    /// The part of this range at or after `offset`.
    pub fn from_offset(&self, offset: u64) -> SeatRange {
        SeatRange::new(offset.clamp(self.start, self.end), self.end)
    }

    /// Consecutive sub-ranges of at most `chunk_size` seats, in ascending order.
    pub fn chunks(&self, chunk_size: NonZeroU64) -> ChunkIter {
        ChunkIter {
            next: self.start,
            end: self.end,
            chunk_size: chunk_size.get(),
        }
    }
}

impl std::fmt::Display for SeatRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Iterator over the chunks of a [`SeatRange`].
#[derive(Debug, Clone)]
pub struct ChunkIter {
    next: u64,
    end: u64,
    chunk_size: u64,
}

impl Iterator for ChunkIter {
    type Item = SeatRange;

    fn next(&mut self) -> Option<SeatRange> {
        if self.next >= self.end {
            return None;
        }
        let start = self.next;
        let end = start.saturating_add(self.chunk_size).min(self.end);
        self.next = end;
        Some(SeatRange::new(start, end))
    }
}

/// Splits a total seat count into `grid_size` balanced contiguous ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangePartitioner {
    grid_size: NonZeroU64,
}

impl RangePartitioner {
    pub fn new(grid_size: NonZeroU64) -> Self {
        Self { grid_size }
    }

    /// A single range covering everything (sequential and thread-pool strategies).
    pub fn single() -> Self {
        Self {
            grid_size: NonZeroU64::MIN,
        }
    }

    pub fn grid_size(&self) -> u64 {
        self.grid_size.get()
    }

    /// Compute the partition plan for `total` seats.
    ///
    /// Every range holds `total / P` seats; the first `total % P` ranges hold
    /// one extra. When `P > total` the trailing ranges are empty.
    pub fn plan(&self, total: u64) -> Vec<SeatRange> {
        let grid = self.grid_size.get();
        let base = total / grid;
        let remainder = total % grid;

        let mut ranges = Vec::with_capacity(grid as usize);
        let mut start = 0;
        for i in 0..grid {
            let size = base + u64::from(i < remainder);
            ranges.push(SeatRange::new(start, start + size));
            start += size;
        }
        ranges
    }
}

/// Portions of `span` not covered by any of `covered`.
///
/// `covered` may be unsorted and may extend beyond `span`.
pub fn uncovered(span: SeatRange, covered: &[SeatRange]) -> Vec<SeatRange> {
    let mut sorted: Vec<SeatRange> = covered
        .iter()
        .copied()
        .filter(|r| !r.is_empty() && r.end > span.start && r.start < span.end)
        .collect();
    sorted.sort();

    let mut gaps = Vec::new();
    let mut cursor = span.start;
    for range in sorted {
        if range.start > cursor {
            gaps.push(SeatRange::new(cursor, range.start.min(span.end)));
        }
        cursor = cursor.max(range.end);
        if cursor >= span.end {
            break;
        }
    }
    if cursor < span.end {
        gaps.push(SeatRange::new(cursor, span.end));
    }
    gaps
}
