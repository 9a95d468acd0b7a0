//! Ticket rows and the sink they are committed to.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteTicketSink;
pub use store::{SinkError, TicketFilter, TicketRepository, TicketSink};
pub use types::{NewTicket, Ticket};
