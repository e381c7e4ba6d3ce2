//! The world context — one explicit handle object instead of globals.
//!
//! Everything the phases need (persistence, oracle, affect strategy,
//! embedder, broadcaster, configuration) is wired here once and passed
//! around as an `Arc`. Tests construct a context with in-memory and
//! disabled collaborators.

use std::sync::Arc;

use vivarium_core::VivariumConfig;
use vivarium_core::affect::{AffectAnalyzer, LexicalAffect};
use vivarium_core::embedding::{CachedEmbeddingProvider, EmbeddingProvider, HashedEmbeddingProvider};
use vivarium_core::oracle::{BehaviorOracle, DisabledOracle};
use vivarium_core::persistence::PersistenceGateway;

use crate::broadcast::Broadcaster;

/// Shared wiring for every engine component.
pub struct WorldContext {
    /// Runtime configuration.
    pub config: VivariumConfig,
    /// The persistence gateway (shared with the motion loop).
    pub gateway: Arc<PersistenceGateway>,
    /// Text-generation collaborator.
    pub oracle: Arc<dyn BehaviorOracle>,
    /// Mood/sympathy strategy (lexical or oracle-backed).
    pub affect: Arc<dyn AffectAnalyzer>,
    /// Embedding provider for memory ranking.
    pub embedder: Arc<dyn EmbeddingProvider>,
    /// Observer fan-out hub.
    pub broadcaster: Broadcaster,
}

impl WorldContext {
    /// Wire up a context from explicit parts.
    #[must_use]
    pub fn new(
        config: VivariumConfig,
        gateway: Arc<PersistenceGateway>,
        oracle: Arc<dyn BehaviorOracle>,
        affect: Arc<dyn AffectAnalyzer>,
        embedder: Arc<dyn EmbeddingProvider>,
        broadcaster: Broadcaster,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            gateway,
            oracle,
            affect,
            embedder,
            broadcaster,
        })
    }

    /// A context with no oracle backend and the lexical affect strategy:
    /// everything runs on the deterministic paths. Used by tests and by
    /// worlds that operate offline.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be opened.
    pub fn offline(config: VivariumConfig) -> vivarium_core::error::Result<Arc<Self>> {
        let dims = config.retrieval.embedding_dimensions;
        let cache = config.retrieval.embedding_cache_capacity;
        Ok(Self::new(
            config,
            Arc::new(PersistenceGateway::open_in_memory()?),
            Arc::new(DisabledOracle),
            Arc::new(LexicalAffect),
            Arc::new(CachedEmbeddingProvider::new(
                HashedEmbeddingProvider::new(dims),
                cache,
            )),
            Broadcaster::new(),
        ))
    }
}
