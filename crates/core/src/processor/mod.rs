//! Processor module for chunked ticket generation.
//!
//! This module provides the `ChunkProcessor` which:
//! - Maps seat indices to ratings and prices through a `SeatLayout`
//! - Commits tickets in chunks, one sink transaction per chunk
//! - Retries transient failures with exponential backoff
//! - Persists the partition checkpoint after every committed chunk
//!
//! # Example
//!
//! ```ignore
//! use seatbatch_core::processor::{ChunkProcessor, PartitionWork, ProcessorConfig};
//!
//! let processor = ChunkProcessor::new(ProcessorConfig::default(), sink, jobs);
//! let outcome = processor.process_partition(PartitionWork {
//!     partition,
//!     layout,
//!     chunk_size: NonZeroU64::new(500).unwrap(),
//!     reconcile: false,
//!     cancel: CancellationToken::new(),
//! }).await;
//! ```

mod chunk;
mod config;
mod types;

pub use chunk::ChunkProcessor;
pub use config::{ProcessorConfig, RetryConfig};
pub use types::{ChunkError, PartitionFailure, PartitionOutcome, PartitionWork};
