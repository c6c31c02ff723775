mod pg_pool;
mod repositories;
mod store_factory;

pub use repositories::InMemoryJobStore;
pub use repositories::PgJobStore;

pub use pg_pool::{create_pool, run_migrations};
pub use store_factory::JobStoreFactory;
