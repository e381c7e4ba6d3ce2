//! Affect analysis strategy — how events move mood and sympathy.
//!
//! Two interchangeable strategies exist: the lexical one in this module
//! (keyword scoring, zero latency, always available) and an oracle-backed
//! one in `vivarium-llm`. The engine selects one at construction time from
//! configuration; nothing downstream branches on which is in use.

use async_trait::async_trait;

use crate::mood::Mood;
use crate::sympathy;

/// Strategy interface for mood and sympathy analysis.
#[async_trait]
pub trait AffectAnalyzer: Send + Sync {
    /// Produce the mood that follows `current` after `event` happened to an
    /// agent with the given persona. Implementations must return a
    /// normalized distribution; on any internal failure they return
    /// `current` unchanged.
    async fn mood_transition(&self, personality: &str, current: &Mood, event: &str) -> Mood;

    /// Signed sympathy delta in \[-2, 2\] that `message` provokes in its
    /// receiver. Failures yield 0.
    async fn sympathy_delta(&self, message: &str) -> i32;
}

/// Keyword-lexicon strategy. Deterministic and infallible.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalAffect;

#[async_trait]
impl AffectAnalyzer for LexicalAffect {
    async fn mood_transition(&self, _personality: &str, current: &Mood, event: &str) -> Mood {
        current.lexical_transition(event)
    }

    async fn sympathy_delta(&self, message: &str) -> i32 {
        sympathy::lexical_delta(message)
    }
}
