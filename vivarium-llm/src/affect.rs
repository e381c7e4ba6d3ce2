//! Oracle-backed affect analysis.
//!
//! Sends mood transitions and sympathy deltas through the behavior oracle
//! and parses its structured replies. Any failure — sentinel text, broken
//! JSON, out-of-shape output — degrades to "no change", never to an
//! error: the lexical strategy exists for worlds that want determinism,
//! this one exists for worlds that want nuance, and neither may stall a
//! tick.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::prompt;
use vivarium_core::affect::AffectAnalyzer;
use vivarium_core::mood::Mood;
use vivarium_core::oracle::{BehaviorOracle, OracleRole, is_error_text};
use vivarium_core::sympathy;

/// Affect analyzer that asks the oracle.
pub struct OracleAffect {
    oracle: Arc<dyn BehaviorOracle>,
}

impl OracleAffect {
    /// Wrap an oracle.
    #[must_use]
    pub fn new(oracle: Arc<dyn BehaviorOracle>) -> Self {
        Self { oracle }
    }
}

/// Raw mood shape the oracle is asked to return.
#[derive(Debug, Deserialize)]
struct RawMood {
    joy: i64,
    anger: i64,
    sadness: i64,
    fear: i64,
    neutral: i64,
}

/// Strip markdown code fences the model may wrap JSON in.
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") up to the first newline, then the
    // closing fence.
    let rest = rest.split_once('\n').map_or(rest, |(_, body)| body);
    rest.rsplit_once("```").map_or(rest, |(body, _)| body).trim()
}

#[async_trait]
impl AffectAnalyzer for OracleAffect {
    async fn mood_transition(&self, personality: &str, current: &Mood, event: &str) -> Mood {
        let user = prompt::render_template(
            prompt::EMOTION_ANALYSIS_USER,
            &[
                ("personality", personality),
                ("current_mood", &current.to_json()),
                ("event", event),
            ],
        );
        let reply = self
            .oracle
            .invoke(OracleRole::Analysis, "You analyze emotions of simulated characters.", &user)
            .await;
        if is_error_text(&reply) {
            return *current;
        }

        match serde_json::from_str::<RawMood>(strip_fences(&reply)) {
            Ok(raw) => Mood::normalized(raw.joy, raw.anger, raw.sadness, raw.fear, raw.neutral),
            Err(e) => {
                debug!(error = %e, "unparseable mood analysis, keeping current mood");
                *current
            }
        }
    }

    async fn sympathy_delta(&self, message: &str) -> i32 {
        let user = prompt::render_template(prompt::SYMPATHY_ANALYSIS_USER, &[("message", message)]);
        let reply = self
            .oracle
            .invoke(OracleRole::Analysis, "You rate the social tone of messages.", &user)
            .await;
        if is_error_text(&reply) {
            return 0;
        }

        match strip_fences(&reply).trim().parse::<i32>() {
            Ok(value) => sympathy::clamp_delta(value),
            Err(_) => {
                debug!(reply = %reply, "unparseable sympathy analysis, using 0");
                0
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
