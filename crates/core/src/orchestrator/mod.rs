//! Job orchestrator - the top-level entry point of the issuance engine.
//!
//! The orchestrator:
//! - Validates launch parameters against the concert catalog
//! - Enforces single-flight execution per (concert, run key) fingerprint
//! - Builds the partition plan and persists it before any work starts
//! - Resumes failed or stopped runs from their checkpoints
//! - Hands partitions to the concurrency executor and aggregates the result

mod config;
mod runner;
mod types;

pub use config::EngineConfig;
pub use runner::JobOrchestrator;
pub use types::{JobError, JobStatusReport, LaunchKind, LaunchRequest, Launched};
