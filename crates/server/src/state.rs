use std::sync::Arc;
use seatbatch_core::{
    Config, JobOrchestrator, SanitizedConfig, SqliteConcertCatalog, TicketRepository,
};

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: Arc<JobOrchestrator>,
    concerts: Arc<SqliteConcertCatalog>,
    tickets: Arc<dyn TicketRepository>,
}

impl AppState {
    pub fn new(
        config: Config,
        orchestrator: Arc<JobOrchestrator>,
        concerts: Arc<SqliteConcertCatalog>,
        tickets: Arc<dyn TicketRepository>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            concerts,
            tickets,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn orchestrator(&self) -> &JobOrchestrator {
        self.orchestrator.as_ref()
    }

    /// Local catalog tables, writable for seeding.
    pub fn concerts(&self) -> &SqliteConcertCatalog {
        self.concerts.as_ref()
    }

    pub fn tickets(&self) -> &dyn TicketRepository {
        self.tickets.as_ref()
    }
}
