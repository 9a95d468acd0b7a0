pub mod concerts;
pub mod handlers;
pub mod jobs;
pub mod middleware;
pub mod routes;
pub mod tickets;

pub use routes::create_router;
