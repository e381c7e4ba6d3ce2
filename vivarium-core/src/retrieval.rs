//! Memory retrieval — brute-force cosine ranking.
//!
//! Every stored vector is scored against the query and the top-k survive.
//! O(n) per query, which is fine at the scale of a few hundred memories
//! per agent; an approximate index would be a scaling concern, not a
//! behavioral one.

use ordered_float::OrderedFloat;

use crate::embedding::{self, Embedding};
use crate::memory::MemoryEntry;

/// A memory entry paired with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    /// Cosine similarity against the query, in \[-1, 1\].
    pub score: OrderedFloat<f32>,
    /// The scored entry.
    pub entry: MemoryEntry,
}

/// Rank `entries` against `query` and return the `top_k` best, highest
/// score first. Entries without a stored embedding are skipped.
#[must_use]
pub fn rank(query: &Embedding, entries: &[MemoryEntry], top_k: usize) -> Vec<ScoredMemory> {
    let mut scored: Vec<ScoredMemory> = entries
        .iter()
        .filter_map(|entry| {
            let vector = entry.embedding.as_ref()?;
            Some(ScoredMemory {
                score: OrderedFloat(embedding::cosine_similarity(query, vector)),
                entry: entry.clone(),
            })
        })
        .collect();

    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored.truncate(top_k);
    scored
}

/// Format ranked memories as a bulleted context block for prompts.
/// Returns a fixed placeholder line when nothing is stored yet.
#[must_use]
pub fn format_context(ranked: &[ScoredMemory]) -> String {
    if ranked.is_empty() {
        return "No memories yet.".to_string();
    }
    ranked
        .iter()
        .map(|m| format!("- {}", m.entry.text))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
