//! SQLite-backed job store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use uuid::Uuid;

use super::{
    Fingerprint, JobRun, JobRunFilter, JobStatus, JobStore, JobStoreError, NewJobRun, Partition,
    PartitionStatus,
};
use crate::partition::SeatRange;

const RUN_COLUMNS: &str = "id, strategy, concert_id, run_key, status, grid_size, thread_pool_size, chunk_size, ticket_amount, created_at, completed_at";

const PARTITION_COLUMNS: &str = "id, job_run_id, ordinal, range_start, range_end, status, checkpoint_offset, committed_count, attempts, last_error, updated_at";

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Create a new SQLite job store at the given path.
    pub fn new(path: &Path) -> Result<Self, JobStoreError> {
        let conn = Connection::open(path).map_err(|e| JobStoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory job store (useful for testing).
    pub fn in_memory() -> Result<Self, JobStoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| JobStoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), JobStoreError> {
        // Shares the database file with the ticket sink's writers
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS job_runs (
                id TEXT PRIMARY KEY,
                strategy TEXT NOT NULL,
                concert_id INTEGER NOT NULL,
                run_key TEXT NOT NULL,
                status TEXT NOT NULL,
                grid_size INTEGER NOT NULL,
                thread_pool_size INTEGER NOT NULL,
                chunk_size INTEGER NOT NULL,
                ticket_amount INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                completed_at TEXT,
                UNIQUE(concert_id, run_key)
            );

            CREATE INDEX IF NOT EXISTS idx_job_runs_status ON job_runs(status);

            CREATE TABLE IF NOT EXISTS partitions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_run_id TEXT NOT NULL REFERENCES job_runs(id) ON DELETE CASCADE,
                ordinal INTEGER NOT NULL,
                range_start INTEGER NOT NULL,
                range_end INTEGER NOT NULL,
                status TEXT NOT NULL,
                checkpoint_offset INTEGER NOT NULL,
                committed_count INTEGER NOT NULL DEFAULT 0,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                updated_at TEXT NOT NULL,
                UNIQUE(job_run_id, ordinal)
            );

            CREATE TABLE IF NOT EXISTS committed_ranges (
                partition_id INTEGER NOT NULL REFERENCES partitions(id) ON DELETE CASCADE,
                range_start INTEGER NOT NULL,
                range_end INTEGER NOT NULL,
                PRIMARY KEY (partition_id, range_start)
            );
            "#,
        )
        .map_err(|e| JobStoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, JobStoreError> {
        self.conn
            .lock()
            .map_err(|_| JobStoreError::Database("job store connection poisoned".to_string()))
    }

    fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<JobRun> {
        let strategy: String = row.get(1)?;
        let status: String = row.get(4)?;
        let created_at: String = row.get(9)?;
        let completed_at: Option<String> = row.get(10)?;

        Ok(JobRun {
            id: row.get(0)?,
            strategy: strategy.parse().map_err(|e| conversion_error(1, e))?,
            concert_id: row.get(2)?,
            run_key: row.get(3)?,
            status: status.parse().map_err(|e| conversion_error(4, e))?,
            grid_size: get_u64(row, 5)?,
            thread_pool_size: get_u64(row, 6)?,
            chunk_size: get_u64(row, 7)?,
            ticket_amount: get_u64(row, 8)?,
            created_at: parse_timestamp(&created_at),
            completed_at: completed_at.as_deref().map(parse_timestamp),
        })
    }

    fn row_to_partition(row: &rusqlite::Row) -> rusqlite::Result<Partition> {
        let status: String = row.get(5)?;
        let updated_at: String = row.get(10)?;
        let attempts: i64 = row.get(8)?;

        Ok(Partition {
            id: row.get(0)?,
            job_run_id: row.get(1)?,
            ordinal: row.get(2)?,
            range: SeatRange::new(get_u64(row, 3)?, get_u64(row, 4)?),
            status: status.parse().map_err(|e| conversion_error(5, e))?,
            checkpoint_offset: get_u64(row, 6)?,
            committed_count: get_u64(row, 7)?,
            attempts: u32::try_from(attempts)
                .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(8, attempts))?,
            last_error: row.get(9)?,
            updated_at: parse_timestamp(&updated_at),
        })
    }

    fn load_run(conn: &Connection, id: &str) -> Result<Option<JobRun>, JobStoreError> {
        conn.query_row(
            &format!("SELECT {} FROM job_runs WHERE id = ?", RUN_COLUMNS),
            params![id],
            Self::row_to_run,
        )
        .optional()
        .map_err(|e| JobStoreError::Database(e.to_string()))
    }

    fn load_partition(conn: &Connection, id: i64) -> Result<Option<Partition>, JobStoreError> {
        conn.query_row(
            &format!("SELECT {} FROM partitions WHERE id = ?", PARTITION_COLUMNS),
            params![id],
            Self::row_to_partition,
        )
        .optional()
        .map_err(|e| JobStoreError::Database(e.to_string()))
    }
}

fn get_u64(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value))
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn to_sql(value: u64) -> Result<i64, JobStoreError> {
    i64::try_from(value).map_err(|_| JobStoreError::Database(format!("value {} overflows i64", value)))
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn join_statuses<S: std::fmt::Display>(statuses: &[S]) -> String {
    statuses
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl JobStore for SqliteJobStore {
    fn create_run(&self, run: NewJobRun, plan: &[SeatRange]) -> Result<JobRun, JobStoreError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        tx.execute(
            &format!(
                "INSERT INTO job_runs ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)",
                RUN_COLUMNS
            ),
            params![
                id,
                run.strategy.as_str(),
                run.fingerprint.concert_id,
                run.fingerprint.run_key,
                JobStatus::Created.as_str(),
                to_sql(run.grid_size)?,
                to_sql(run.thread_pool_size)?,
                to_sql(run.chunk_size)?,
                to_sql(run.ticket_amount)?,
                now_str,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                JobStoreError::Conflict(format!(
                    "fingerprint {} already has a job run",
                    run.fingerprint
                ))
            } else {
                JobStoreError::Database(e.to_string())
            }
        })?;

        for (ordinal, range) in plan.iter().enumerate() {
            tx.execute(
                "INSERT INTO partitions (job_run_id, ordinal, range_start, range_end, status, checkpoint_offset, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    id,
                    ordinal as i64,
                    to_sql(range.start)?,
                    to_sql(range.end)?,
                    PartitionStatus::NotStarted.as_str(),
                    to_sql(range.start)?,
                    now_str,
                ],
            )
            .map_err(|e| JobStoreError::Database(e.to_string()))?;
        }

        tx.commit()
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        Ok(JobRun {
            id,
            strategy: run.strategy,
            concert_id: run.fingerprint.concert_id,
            run_key: run.fingerprint.run_key,
            status: JobStatus::Created,
            grid_size: run.grid_size,
            thread_pool_size: run.thread_pool_size,
            chunk_size: run.chunk_size,
            ticket_amount: run.ticket_amount,
            created_at: now,
            completed_at: None,
        })
    }

    fn get_run(&self, id: &str) -> Result<Option<JobRun>, JobStoreError> {
        let conn = self.conn()?;
        Self::load_run(&conn, id)
    }

    fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<JobRun>, JobStoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM job_runs WHERE concert_id = ? AND run_key = ?",
                RUN_COLUMNS
            ),
            params![fingerprint.concert_id, fingerprint.run_key],
            Self::row_to_run,
        )
        .optional()
        .map_err(|e| JobStoreError::Database(e.to_string()))
    }

    fn list_runs(&self, filter: &JobRunFilter) -> Result<Vec<JobRun>, JobStoreError> {
        let conn = self.conn()?;

        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }
        if let Some(concert_id) = filter.concert_id {
            conditions.push("concert_id = ?");
            params.push(Box::new(concert_id));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT {} FROM job_runs {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            RUN_COLUMNS, where_clause
        );
        params.push(Box::new(filter.limit));
        params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| JobStoreError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_run)
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        let mut runs = Vec::new();
        for row in rows {
            runs.push(row.map_err(|e| JobStoreError::Database(e.to_string()))?);
        }
        Ok(runs)
    }

    fn partitions(&self, job_run_id: &str) -> Result<Vec<Partition>, JobStoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM partitions WHERE job_run_id = ? ORDER BY ordinal ASC",
                PARTITION_COLUMNS
            ))
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![job_run_id], Self::row_to_partition)
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        let mut partitions = Vec::new();
        for row in rows {
            partitions.push(row.map_err(|e| JobStoreError::Database(e.to_string()))?);
        }
        Ok(partitions)
    }

    fn get_partition(&self, id: i64) -> Result<Option<Partition>, JobStoreError> {
        let conn = self.conn()?;
        Self::load_partition(&conn, id)
    }

    fn transition_run(
        &self,
        id: &str,
        from: &[JobStatus],
        to: JobStatus,
    ) -> Result<JobRun, JobStoreError> {
        let conn = self.conn()?;

        let completed_at = to.is_terminal().then(|| Utc::now().to_rfc3339());
        let sql = format!(
            "UPDATE job_runs SET status = ?, completed_at = ? WHERE id = ? AND status IN ({})",
            placeholders(from.len())
        );

        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(to.as_str()),
            Box::new(completed_at),
            Box::new(id.to_string()),
        ];
        for status in from {
            params.push(Box::new(status.as_str()));
        }
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let changed = conn
            .execute(&sql, param_refs.as_slice())
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        let run = Self::load_run(&conn, id)?
            .ok_or_else(|| JobStoreError::NotFound(format!("job run {}", id)))?;

        if changed == 0 {
            return Err(JobStoreError::Conflict(format!(
                "job run {} is {}, expected one of [{}]",
                id,
                run.status,
                join_statuses(from)
            )));
        }

        Ok(run)
    }

    fn transition_partition(
        &self,
        id: i64,
        from: &[PartitionStatus],
        to: PartitionStatus,
        error: Option<&str>,
    ) -> Result<Partition, JobStoreError> {
        let conn = self.conn()?;

        let attempt_increment: i64 = if to == PartitionStatus::Running { 1 } else { 0 };
        let sql = format!(
            "UPDATE partitions SET status = ?, last_error = ?, attempts = attempts + ?, updated_at = ?
             WHERE id = ? AND status IN ({})",
            placeholders(from.len())
        );

        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(to.as_str()),
            Box::new(error.map(str::to_string)),
            Box::new(attempt_increment),
            Box::new(Utc::now().to_rfc3339()),
            Box::new(id),
        ];
        for status in from {
            params.push(Box::new(status.as_str()));
        }
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let changed = conn
            .execute(&sql, param_refs.as_slice())
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        let partition = Self::load_partition(&conn, id)?
            .ok_or_else(|| JobStoreError::NotFound(format!("partition {}", id)))?;

        if changed == 0 {
            return Err(JobStoreError::Conflict(format!(
                "partition {} is {}, expected one of [{}]",
                id,
                partition.status,
                join_statuses(from)
            )));
        }

        Ok(partition)
    }

    fn advance_checkpoint(&self, id: i64, offset: u64) -> Result<Partition, JobStoreError> {
        let conn = self.conn()?;

        // SET expressions see the pre-update row, so both columns derive from the same offset
        let changed = conn
            .execute(
                "UPDATE partitions
                 SET checkpoint_offset = MIN(range_end, MAX(checkpoint_offset, ?1)),
                     committed_count = MIN(range_end, MAX(checkpoint_offset, ?1)) - range_start,
                     updated_at = ?2
                 WHERE id = ?3",
                params![to_sql(offset)?, Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(JobStoreError::NotFound(format!("partition {}", id)));
        }

        Self::load_partition(&conn, id)?
            .ok_or_else(|| JobStoreError::NotFound(format!("partition {}", id)))
    }

    fn record_committed_range(&self, id: i64, range: SeatRange) -> Result<(), JobStoreError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO committed_ranges (partition_id, range_start, range_end) VALUES (?, ?, ?)",
                params![id, to_sql(range.start)?, to_sql(range.end)?],
            )
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        if inserted > 0 {
            tx.execute(
                "UPDATE partitions SET committed_count = committed_count + ?, updated_at = ? WHERE id = ?",
                params![to_sql(range.len())?, Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| JobStoreError::Database(e.to_string()))?;
        }

        tx.commit()
            .map_err(|e| JobStoreError::Database(e.to_string()))
    }

    fn committed_ranges(&self, id: i64) -> Result<Vec<SeatRange>, JobStoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT range_start, range_end FROM committed_ranges WHERE partition_id = ? ORDER BY range_start ASC",
            )
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![id], |row| {
                Ok(SeatRange::new(get_u64(row, 0)?, get_u64(row, 1)?))
            })
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        let mut ranges = Vec::new();
        for row in rows {
            ranges.push(row.map_err(|e| JobStoreError::Database(e.to_string()))?);
        }
        Ok(ranges)
    }

    fn reset_interrupted(&self) -> Result<Vec<String>, JobStoreError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        let ids = {
            let mut stmt = tx
                .prepare("SELECT id FROM job_runs WHERE status = ?")
                .map_err(|e| JobStoreError::Database(e.to_string()))?;
            let rows = stmt
                .query_map(params![JobStatus::Running.as_str()], |row| row.get::<_, String>(0))
                .map_err(|e| JobStoreError::Database(e.to_string()))?;

            let mut ids = Vec::new();
            for row in rows {
                ids.push(row.map_err(|e| JobStoreError::Database(e.to_string()))?);
            }
            ids
        };

        let now = Utc::now().to_rfc3339();

        tx.execute(
            "UPDATE partitions SET status = ?1, updated_at = ?2
             WHERE status = ?3 AND job_run_id IN (SELECT id FROM job_runs WHERE status = ?4)",
            params![
                PartitionStatus::NotStarted.as_str(),
                now,
                PartitionStatus::Running.as_str(),
                JobStatus::Running.as_str(),
            ],
        )
        .map_err(|e| JobStoreError::Database(e.to_string()))?;

        tx.execute(
            "UPDATE job_runs SET status = ?, completed_at = ? WHERE status = ?",
            params![JobStatus::Stopped.as_str(), now, JobStatus::Running.as_str()],
        )
        .map_err(|e| JobStoreError::Database(e.to_string()))?;

        tx.commit()
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        Ok(ids)
    }
}
