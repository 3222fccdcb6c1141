use std::sync::Arc;

use sqlx::PgPool;

use crate::services::{
    candidates::CandidatePool, catalog::MovieCatalog, embedding::EmbeddingService,
    recommender::Recommender,
};

/// Shared application state
///
/// The engine singletons live behind `Arc`s; the candidate pool owns the
/// only mutable in-process cache and guards it internally.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub catalog: Arc<dyn MovieCatalog>,
    pub recommender: Arc<Recommender>,
}

impl AppState {
    pub fn new(pool: PgPool, catalog: Arc<dyn MovieCatalog>) -> Self {
        let embeddings = Arc::new(EmbeddingService::new(pool.clone(), Arc::clone(&catalog)));
        let candidates = Arc::new(CandidatePool::new(
            pool.clone(),
            Arc::clone(&catalog),
            Arc::clone(&embeddings),
        ));
        let recommender = Arc::new(Recommender::new(pool.clone(), embeddings, candidates));

        Self {
            pool,
            catalog,
            recommender,
        }
    }
}
