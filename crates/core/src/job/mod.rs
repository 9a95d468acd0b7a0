//! Job runs, partitions, and their persisted state machine.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteJobStore;
pub use store::{JobStore, JobStoreError};
pub use types::{
    Fingerprint, JobRun, JobRunFilter, JobStatus, NewJobRun, Partition, PartitionStatus, Strategy,
};
