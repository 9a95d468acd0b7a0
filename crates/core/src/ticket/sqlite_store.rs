//! SQLite-backed ticket sink.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode};
use tracing::debug;

use super::{NewTicket, SinkError, Ticket, TicketFilter, TicketRepository, TicketSink};
use crate::partition::SeatRange;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const TICKET_COLUMNS: &str = "id, concert_id, seat_index, rating, price, created_at";

/// SQLite-backed ticket sink.
///
/// Every chunk is written inside one transaction; the transaction rolls back
/// when dropped, so any early return leaves nothing of the chunk behind.
/// Chunk transactions run on the blocking pool, off the async workers.
pub struct SqliteTicketSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTicketSink {
    /// Open the sink, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, SinkError> {
        let conn = Connection::open(path).map_err(classify)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))
            .map_err(classify)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory sink (useful for testing).
    pub fn in_memory() -> Result<Self, SinkError> {
        let conn = Connection::open_in_memory().map_err(classify)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), SinkError> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(classify)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                concert_id INTEGER NOT NULL,
                seat_index INTEGER NOT NULL,
                rating TEXT NOT NULL,
                price INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(concert_id, seat_index)
            );

            CREATE INDEX IF NOT EXISTS idx_tickets_concert_rating ON tickets(concert_id, rating);
            "#,
        )
        .map_err(classify)?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, SinkError> {
        lock(&self.conn)
    }

    /// All issued seat indices for a concert, ascending.
    pub fn seat_indices(&self, concert_id: i64) -> Result<Vec<u64>, SinkError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT seat_index FROM tickets WHERE concert_id = ? ORDER BY seat_index ASC")
            .map_err(classify)?;

        let rows = stmt
            .query_map(params![concert_id], |row| {
                let seat_index: i64 = row.get(0)?;
                u64::try_from(seat_index)
                    .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(0, seat_index))
            })
            .map_err(classify)?;

        let mut seats = Vec::new();
        for row in rows {
            seats.push(row.map_err(classify)?);
        }
        Ok(seats)
    }

    fn build_where_clause(filter: &TicketFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(concert_id) = filter.concert_id {
            conditions.push("concert_id = ?");
            params.push(Box::new(concert_id));
        }

        if let Some(ref rating_id) = filter.rating_id {
            conditions.push("rating = ?");
            params.push(Box::new(rating_id.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_ticket(row: &rusqlite::Row) -> rusqlite::Result<Ticket> {
        let seat_index: i64 = row.get(2)?;
        let created_at_str: String = row.get(5)?;

        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Ticket {
            id: row.get(0)?,
            concert_id: row.get(1)?,
            seat_index: u64::try_from(seat_index)
                .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(2, seat_index))?,
            rating_id: row.get(3)?,
            price: row.get(4)?,
            created_at,
        })
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, SinkError> {
    conn.lock()
        .map_err(|_| SinkError::Fatal("ticket connection poisoned".to_string()))
}

/// Insert one chunk in a single transaction.
fn insert_chunk(
    conn: &mut Connection,
    concert_id: i64,
    tickets: &[NewTicket],
) -> Result<u64, SinkError> {
    let tx = conn.transaction().map_err(classify)?;
    let created_at = Utc::now().to_rfc3339();

    {
        let mut stmt = tx
            .prepare_cached(
                "INSERT INTO tickets (concert_id, seat_index, rating, price, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .map_err(classify)?;

        for ticket in tickets {
            if ticket.concert_id != concert_id {
                return Err(SinkError::Fatal(format!(
                    "ticket for concert {} in chunk for concert {}",
                    ticket.concert_id, concert_id
                )));
            }

            stmt.execute(params![
                concert_id,
                seat_to_sql(ticket.seat_index)?,
                ticket.rating_id,
                ticket.price,
                created_at,
            ])
            .map_err(|e| {
                if is_unique_violation(&e) {
                    SinkError::SeatCollision {
                        concert_id,
                        seat_index: ticket.seat_index,
                    }
                } else {
                    classify(e)
                }
            })?;
        }
    }

    tx.commit().map_err(classify)?;
    Ok(tickets.len() as u64)
}

/// Map a SQLite error onto the sink taxonomy.
fn classify(err: rusqlite::Error) -> SinkError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            SinkError::Transient(err.to_string())
        }
        _ => SinkError::Fatal(err.to_string()),
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn seat_to_sql(seat_index: u64) -> Result<i64, SinkError> {
    i64::try_from(seat_index)
        .map_err(|_| SinkError::Fatal(format!("seat index {} overflows i64", seat_index)))
}

#[async_trait]
impl TicketSink for SqliteTicketSink {
    async fn write_chunk(&self, concert_id: i64, tickets: &[NewTicket]) -> Result<u64, SinkError> {
        let conn = Arc::clone(&self.conn);
        let chunk = tickets.to_vec();

        let written = tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            insert_chunk(&mut guard, concert_id, &chunk)
        })
        .await
        .map_err(|e| SinkError::Fatal(format!("chunk writer task failed: {}", e)))??;

        debug!(concert_id, rows = written, "Committed ticket chunk");
        Ok(written)
    }

    async fn count_for_concert(&self, concert_id: i64) -> Result<u64, SinkError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM tickets WHERE concert_id = ?",
                params![concert_id],
                |row| row.get(0),
            )
            .map_err(classify)?;
        Ok(count.max(0) as u64)
    }

    async fn count_in_range(&self, concert_id: i64, range: SeatRange) -> Result<u64, SinkError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM tickets WHERE concert_id = ? AND seat_index >= ? AND seat_index < ?",
                params![concert_id, seat_to_sql(range.start)?, seat_to_sql(range.end)?],
                |row| row.get(0),
            )
            .map_err(classify)?;
        Ok(count.max(0) as u64)
    }
}

impl TicketRepository for SqliteTicketSink {
    fn get(&self, id: i64) -> Result<Option<Ticket>, SinkError> {
        let conn = self.conn()?;

        let result = conn.query_row(
            &format!("SELECT {} FROM tickets WHERE id = ?", TICKET_COLUMNS),
            params![id],
            Self::row_to_ticket,
        );

        match result {
            Ok(ticket) => Ok(Some(ticket)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(classify(e)),
        }
    }

    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, SinkError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM tickets {} ORDER BY concert_id ASC, seat_index ASC LIMIT ? OFFSET ?",
            TICKET_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql).map_err(classify)?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_ticket)
            .map_err(classify)?;

        let mut tickets = Vec::new();
        for row_result in rows {
            tickets.push(row_result.map_err(classify)?);
        }

        Ok(tickets)
    }

    fn count(&self, filter: &TicketFilter) -> Result<i64, SinkError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM tickets {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(classify)
    }

    fn delete(&self, id: i64) -> Result<Ticket, SinkError> {
        let conn = self.conn()?;

        let ticket = conn.query_row(
            &format!("SELECT {} FROM tickets WHERE id = ?", TICKET_COLUMNS),
            params![id],
            Self::row_to_ticket,
        );

        let ticket = match ticket {
            Ok(t) => t,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Err(SinkError::NotFound(id)),
            Err(e) => return Err(classify(e)),
        };

        conn.execute("DELETE FROM tickets WHERE id = ?", params![id])
            .map_err(classify)?;

        Ok(ticket)
    }
}
