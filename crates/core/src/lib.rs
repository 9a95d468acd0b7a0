pub mod catalog;
pub mod config;
pub mod executor;
pub mod job;
pub mod metrics;
pub mod orchestrator;
pub mod partition;
pub mod processor;
pub mod testing;
pub mod ticket;

pub use catalog::{
    CatalogError, ConcertCatalog, ConcertSnapshot, LayoutError, RatingAllocation, SeatLayout,
    SqliteConcertCatalog,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig,
    LogFormat, LoggingConfig, SanitizedConfig, ServerConfig,
};
pub use executor::{ConcurrencyExecutor, ExecutionReport, ExecutorConfig};
pub use job::{
    Fingerprint, JobRun, JobRunFilter, JobStatus, JobStore, JobStoreError, Partition,
    PartitionStatus, SqliteJobStore, Strategy,
};
pub use orchestrator::{
    EngineConfig, JobError, JobOrchestrator, JobStatusReport, LaunchKind, LaunchRequest, Launched,
};
pub use partition::{RangePartitioner, SeatRange};
pub use processor::{ChunkProcessor, PartitionFailure, PartitionOutcome, RetryConfig};
pub use ticket::{
    NewTicket, SinkError, SqliteTicketSink, Ticket, TicketFilter, TicketRepository, TicketSink,
};
