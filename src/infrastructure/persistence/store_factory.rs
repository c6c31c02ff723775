use std::sync::Arc;

use crate::application::ports::{JobStore, JobStoreError};
use crate::presentation::config::{DatabaseSettings, StoreProvider};

use super::pg_pool::{create_pool, run_migrations};
use super::repositories::{InMemoryJobStore, PgJobStore};

pub struct JobStoreFactory;

impl JobStoreFactory {
    pub async fn create(settings: &DatabaseSettings) -> Result<Arc<dyn JobStore>, JobStoreError> {
        match settings.provider {
            StoreProvider::Postgres => {
                let pool = create_pool(&settings.url, settings.max_connections).await?;
                run_migrations(&pool).await?;
                Ok(Arc::new(PgJobStore::new(pool)))
            }
            StoreProvider::Memory => {
                tracing::warn!("Using in-memory job store; queued and completed jobs are lost on restart");
                Ok(Arc::new(InMemoryJobStore::new()))
            }
        }
    }
}
