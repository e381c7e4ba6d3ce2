//! Vector embedding abstraction layer.
//!
//! Embeddings feed the cosine-similarity memory ranking in
//! [`crate::retrieval`]. Providers must be deterministic for the lifetime
//! of the process; the default is a hashed bag-of-words projection that is
//! in fact deterministic across processes, so stored vectors stay
//! comparable between runs.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A dense embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// Dimensionality of the embedding.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Generate vector embeddings from text.
///
/// Implementations must be `Send + Sync` and deterministic per process.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string.
    fn embed(&self, text: &str) -> Embedding;

    /// The dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A human-readable name for the provider.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Cosine similarity
// ---------------------------------------------------------------------------

/// Compute the cosine similarity between two embedding vectors.
///
/// Returns a value in \[-1.0, 1.0\]. Returns `0.0` on mismatched
/// dimensions or zero-magnitude inputs.
#[must_use]
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    if a.0.len() != b.0.len() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut mag_a = 0.0_f32;
    let mut mag_b = 0.0_f32;

    for (x, y) in a.0.iter().zip(b.0.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

// ---------------------------------------------------------------------------
// Hashed bag-of-words provider (production default)
// ---------------------------------------------------------------------------

/// Deterministic hashed bag-of-words embedding.
///
/// Each lowercase token hashes (FNV-1a) to a bucket index and a sign; the
/// accumulated vector is L2-normalized. Crude but stable, cheap, and good
/// enough for ranking a few hundred episodic memories per agent.
pub struct HashedEmbeddingProvider {
    dims: usize,
}

impl HashedEmbeddingProvider {
    /// Create a provider with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions }
    }
}

impl Default for HashedEmbeddingProvider {
    fn default() -> Self {
        Self::new(128)
    }
}

/// FNV-1a 64-bit hash. Inlined to keep the provider dependency-free and
/// byte-for-byte stable across platforms.
fn fnv1a(data: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for &byte in data {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

impl EmbeddingProvider for HashedEmbeddingProvider {
    fn embed(&self, text: &str) -> Embedding {
        let mut vec = vec![0.0_f32; self.dims];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(token.as_bytes());
            let idx = (hash % self.dims as u64) as usize;
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vec[idx] += sign;
        }

        let mag: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if mag > f32::EPSILON {
            for x in &mut vec {
                *x /= mag;
            }
        }
        Embedding(vec)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "hashed-bag-of-words"
    }
}

// ---------------------------------------------------------------------------
// Stub provider (tests)
// ---------------------------------------------------------------------------

/// A stub provider that returns zero-vectors. For tests where similarity
/// is irrelevant.
pub struct StubEmbeddingProvider {
    dims: usize,
}

impl StubEmbeddingProvider {
    /// Create a new stub provider with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions }
    }
}

impl Default for StubEmbeddingProvider {
    fn default() -> Self {
        Self::new(128)
    }
}

impl EmbeddingProvider for StubEmbeddingProvider {
    fn embed(&self, _text: &str) -> Embedding {
        Embedding(vec![0.0; self.dims])
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "stub-zero-vector"
    }
}

// ---------------------------------------------------------------------------
// LRU cache wrapper
// ---------------------------------------------------------------------------

/// Caches embeddings of recently seen texts in front of another provider.
///
/// Plan queries and mood-event texts repeat heavily tick to tick, so this
/// keeps the hot path allocation-free.
pub struct CachedEmbeddingProvider<P: EmbeddingProvider> {
    inner: P,
    cache: Mutex<LruCache<String, Embedding>>,
}

impl<P: EmbeddingProvider> CachedEmbeddingProvider<P> {
    /// Wrap `inner` with an LRU cache of the given capacity.
    ///
    /// A zero capacity is bumped to 1.
    #[must_use]
    pub fn new(inner: P, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl<P: EmbeddingProvider> EmbeddingProvider for CachedEmbeddingProvider<P> {
    fn embed(&self, text: &str) -> Embedding {
        if let Some(hit) = self.cache.lock().get(text) {
            return hit.clone();
        }
        let embedding = self.inner.embed(text);
        self.cache
            .lock()
            .put(text.to_string(), embedding.clone());
        embedding
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
