//! SQLite-backed concert catalog.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{CatalogError, ConcertCatalog, ConcertSnapshot, RatingAllocation, SeatLayout};

/// SQLite-backed concert catalog.
///
/// Reads the `concerts` and `ticket_prices` tables owned by the surrounding
/// CRUD application. The write helpers exist for seeding and tests.
pub struct SqliteConcertCatalog {
    conn: Mutex<Connection>,
}

impl SqliteConcertCatalog {
    /// Open the catalog, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, CatalogError> {
        let conn = Connection::open(path).map_err(|e| CatalogError::Database(e.to_string()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| CatalogError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory catalog (useful for testing).
    pub fn in_memory() -> Result<Self, CatalogError> {
        let conn =
            Connection::open_in_memory().map_err(|e| CatalogError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CatalogError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS concerts (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                ticket_amount INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ticket_prices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                concert_id INTEGER NOT NULL REFERENCES concerts(id) ON DELETE CASCADE,
                rating TEXT NOT NULL,
                share INTEGER NOT NULL,
                price INTEGER NOT NULL,
                position INTEGER NOT NULL,
                UNIQUE(concert_id, rating)
            );

            CREATE INDEX IF NOT EXISTS idx_ticket_prices_concert ON ticket_prices(concert_id, position);
            "#,
        )
        .map_err(|e| CatalogError::Database(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CatalogError> {
        self.conn
            .lock()
            .map_err(|_| CatalogError::Database("catalog connection poisoned".to_string()))
    }

    /// Insert or replace a concert together with its price tiers.
    ///
    /// Tier order in the snapshot becomes the seat layout order.
    pub fn upsert_concert(
        &self,
        name: &str,
        snapshot: &ConcertSnapshot,
    ) -> Result<(), CatalogError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        tx.execute(
            "INSERT INTO concerts (id, name, ticket_amount) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, ticket_amount = excluded.ticket_amount",
            params![snapshot.concert_id, name, to_sql_u64(snapshot.ticket_amount)?],
        )
        .map_err(|e| CatalogError::Database(e.to_string()))?;

        tx.execute(
            "DELETE FROM ticket_prices WHERE concert_id = ?",
            params![snapshot.concert_id],
        )
        .map_err(|e| CatalogError::Database(e.to_string()))?;

        for (position, rating) in snapshot.ratings.iter().enumerate() {
            tx.execute(
                "INSERT INTO ticket_prices (concert_id, rating, share, price, position) VALUES (?, ?, ?, ?, ?)",
                params![
                    snapshot.concert_id,
                    rating.rating_id,
                    to_sql_u64(rating.allocated_share)?,
                    rating.price,
                    position as i64,
                ],
            )
            .map_err(|e| CatalogError::Database(e.to_string()))?;
        }

        tx.commit()
            .map_err(|e| CatalogError::Database(e.to_string()))
    }

    fn load_snapshot(conn: &Connection, concert_id: i64) -> Result<ConcertSnapshot, CatalogError> {
        let ticket_amount: Option<i64> = conn
            .query_row(
                "SELECT ticket_amount FROM concerts WHERE id = ?",
                params![concert_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let Some(ticket_amount) = ticket_amount else {
            return Err(CatalogError::ConcertNotFound(concert_id));
        };

        let mut stmt = conn
            .prepare(
                "SELECT rating, share, price FROM ticket_prices WHERE concert_id = ? ORDER BY position ASC, id ASC",
            )
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![concert_id], |row| {
                let rating: String = row.get(0)?;
                let share: i64 = row.get(1)?;
                let price: i64 = row.get(2)?;
                Ok((rating, share, price))
            })
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let mut ratings = Vec::new();
        for row in rows {
            let (rating, share, price) = row.map_err(|e| CatalogError::Database(e.to_string()))?;
            ratings.push(RatingAllocation::new(rating, from_sql_i64(share)?, price));
        }

        Ok(ConcertSnapshot::new(
            concert_id,
            from_sql_i64(ticket_amount)?,
            ratings,
        ))
    }
}

fn to_sql_u64(value: u64) -> Result<i64, CatalogError> {
    i64::try_from(value).map_err(|_| CatalogError::Database(format!("value {} overflows i64", value)))
}

fn from_sql_i64(value: i64) -> Result<u64, CatalogError> {
    u64::try_from(value).map_err(|_| CatalogError::Database(format!("negative count {}", value)))
}

#[async_trait]
impl ConcertCatalog for SqliteConcertCatalog {
    async fn snapshot(&self, concert_id: i64) -> Result<ConcertSnapshot, CatalogError> {
        let snapshot = {
            let conn = self.conn()?;
            Self::load_snapshot(&conn, concert_id)?
        };

        // Reject inconsistent tier data at the port boundary
        SeatLayout::from_snapshot(&snapshot)?;

        Ok(snapshot)
    }
}
