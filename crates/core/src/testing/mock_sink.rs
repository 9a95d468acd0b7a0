//! Mock ticket sink for testing.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::partition::SeatRange;
use crate::ticket::{NewTicket, SinkError, TicketSink};

#[derive(Debug, Default)]
struct SinkState {
    /// Issued seat indices per concert.
    seats: BTreeMap<i64, BTreeSet<u64>>,
    /// Seat span of every committed chunk, in commit order.
    chunks: Vec<SeatRange>,
    /// Remaining transient failures for chunks containing a seat.
    transient_failures: HashMap<u64, u32>,
    /// Chunks containing one of these seats fail permanently.
    fatal_seats: HashSet<u64>,
    /// Every `write_chunk` call, including failed ones.
    write_calls: usize,
}

/// Mock implementation of the TicketSink trait.
///
/// Behaves like a database with a unique index on `(concert_id, seat_index)`:
/// a chunk either commits entirely or not at all. Provides controllable
/// behavior for testing:
/// - Inject transient or fatal failures for chunks touching a seat
/// - Pre-seed seats to provoke collisions
/// - Slow down writes and observe the concurrency high-water mark
///
/// # Example
///
/// ```rust,ignore
/// use seatbatch_core::testing::MockTicketSink;
///
/// let sink = MockTicketSink::new();
/// sink.inject_transient_failures(45, 2).await;
///
/// // ... run a job ...
///
/// assert_eq!(sink.count(42).await, 100);
/// assert!(sink.max_concurrent_writes().await <= 4);
/// ```
#[derive(Debug)]
pub struct MockTicketSink {
    state: Arc<RwLock<SinkState>>,
    write_delay: Arc<RwLock<Duration>>,
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
}

impl Default for MockTicketSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter even if the write future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockTicketSink {
    /// Create a new, empty mock sink.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(SinkState::default())),
            write_delay: Arc::new(RwLock::new(Duration::ZERO)),
            in_flight: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
        }
    }

    /// Fail the next `times` chunks containing `seat_index` with a transient error.
    pub async fn inject_transient_failures(&self, seat_index: u64, times: u32) {
        self.state
            .write()
            .await
            .transient_failures
            .insert(seat_index, times);
    }

    /// Fail every chunk containing `seat_index` with a fatal error.
    pub async fn inject_fatal_failure(&self, seat_index: u64) {
        self.state.write().await.fatal_seats.insert(seat_index);
    }

    /// Remove all injected failures.
    pub async fn clear_failures(&self) {
        let mut state = self.state.write().await;
        state.transient_failures.clear();
        state.fatal_seats.clear();
    }

    /// Mark a seat as already issued, outside of any chunk.
    pub async fn seed_existing(&self, concert_id: i64, seat_index: u64) {
        self.state
            .write()
            .await
            .seats
            .entry(concert_id)
            .or_default()
            .insert(seat_index);
    }

    /// Delay every write before it commits.
    pub async fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.write().await = delay;
    }

    /// Issued seat indices for a concert, ascending.
    pub async fn seat_indices(&self, concert_id: i64) -> Vec<u64> {
        self.state
            .read()
            .await
            .seats
            .get(&concert_id)
            .map(|seats| seats.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of issued tickets for a concert.
    pub async fn count(&self, concert_id: i64) -> u64 {
        self.state
            .read()
            .await
            .seats
            .get(&concert_id)
            .map_or(0, |seats| seats.len() as u64)
    }

    /// Seat spans of committed chunks, in commit order.
    pub async fn committed_chunks(&self) -> Vec<SeatRange> {
        self.state.read().await.chunks.clone()
    }

    /// Number of `write_chunk` calls, successful or not.
    pub async fn write_calls(&self) -> usize {
        self.state.read().await.write_calls
    }

    /// Highest number of writes observed in flight at once.
    pub async fn max_concurrent_writes(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }

    async fn commit(&self, concert_id: i64, tickets: &[NewTicket]) -> Result<u64, SinkError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        state.write_calls += 1;

        if let Some(ticket) = tickets.iter().find(|t| t.concert_id != concert_id) {
            return Err(SinkError::Fatal(format!(
                "ticket for concert {} in chunk for concert {}",
                ticket.concert_id, concert_id
            )));
        }

        for ticket in tickets {
            if let Some(remaining) = state.transient_failures.get_mut(&ticket.seat_index) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(SinkError::Transient(format!(
                        "injected failure at seat {}",
                        ticket.seat_index
                    )));
                }
            }
            if state.fatal_seats.contains(&ticket.seat_index) {
                return Err(SinkError::Fatal(format!(
                    "injected fatal failure at seat {}",
                    ticket.seat_index
                )));
            }
        }

        let issued = state.seats.entry(concert_id).or_default();
        let mut in_chunk = HashSet::new();
        for ticket in tickets {
            if issued.contains(&ticket.seat_index) || !in_chunk.insert(ticket.seat_index) {
                return Err(SinkError::SeatCollision {
                    concert_id,
                    seat_index: ticket.seat_index,
                });
            }
        }

        issued.extend(in_chunk);

        let first = tickets.iter().map(|t| t.seat_index).min();
        let last = tickets.iter().map(|t| t.seat_index).max();
        if let (Some(first), Some(last)) = (first, last) {
            state.chunks.push(SeatRange::new(first, last + 1));
        }

        Ok(tickets.len() as u64)
    }
}

#[async_trait]
impl TicketSink for MockTicketSink {
    async fn write_chunk(&self, concert_id: i64, tickets: &[NewTicket]) -> Result<u64, SinkError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.in_flight);
        self.high_water.fetch_max(current, Ordering::SeqCst);

        let delay = *self.write_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.commit(concert_id, tickets).await
    }

    async fn count_for_concert(&self, concert_id: i64) -> Result<u64, SinkError> {
        Ok(self.count(concert_id).await)
    }

    async fn count_in_range(&self, concert_id: i64, range: SeatRange) -> Result<u64, SinkError> {
        Ok(self
            .state
            .read()
            .await
            .seats
            .get(&concert_id)
            .map_or(0, |seats| seats.range(range.start..range.end).count() as u64))
    }
}
