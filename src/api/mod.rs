pub mod middleware;
pub mod queue;
pub mod routes;
pub mod state;

pub use queue::{create_pool, JobProducer, QueueError};
pub use routes::create_router;
pub use state::AppState;
