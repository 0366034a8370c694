use std::{sync::Arc, time::Instant};

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::{
    config::Config,
    repository::{
        CommentRepository, PostRepository, UserRepository, memory::MemoryStore,
        postgres::PostgresStore,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub comments: Arc<dyn CommentRepository>,
    pub config: Config,
    /// `"postgres"` or `"memory"`, reported by the health endpoint.
    pub storage: &'static str,
    pub started_at: Instant,
}

impl AppState {
    pub fn postgres(pool: PgPool, config: Config) -> Self {
        Self::with_store(Arc::new(PostgresStore::new(pool)), config, "postgres")
    }

    pub fn in_memory(config: Config) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), config, "memory")
    }

    fn with_store<S>(store: Arc<S>, config: Config, storage: &'static str) -> Self
    where
        S: UserRepository + PostRepository + CommentRepository + 'static,
    {
        Self {
            users: store.clone(),
            posts: store.clone(),
            comments: store,
            config,
            storage,
            started_at: Instant::now(),
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
