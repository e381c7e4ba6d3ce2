//! Dialogue protocol — two-turn chat generation with validation, retry,
//! and deterministic fallbacks.
//!
//! Every candidate line runs through the same pipeline: clean it up,
//! reject boilerplate and visibly incomplete text, retry up to the
//! attempt budget, and finally substitute a persona- and weather-specific
//! canned line. A reply that merely echoes its input is also replaced.
//! The protocol therefore always produces two usable lines; whether the
//! exchange is *accepted* is the proximity matcher's call.

use std::sync::Arc;

use tracing::debug;

use vivarium_core::error::Result;
use vivarium_core::oracle::{OracleRole, is_error_text};
use vivarium_core::retrieval;
use vivarium_core::memory::MemoryKind;
use vivarium_core::types::Agent;

use vivarium_llm::prompt;

use crate::broadcast::DialogueLine;
use crate::context::WorldContext;
use crate::relationship::RelationshipUpdater;

// ---------------------------------------------------------------------------
// Line validation
// ---------------------------------------------------------------------------

/// Markers of non-dialogue boilerplate the oracle sometimes produces.
const BLOCKED_MARKERS: &[&str] = &[
    "goal:",
    "action:",
    "mood:",
    "reaction:",
    "plan:",
    "note:",
    "system:",
    "as an ai",
    "i cannot",
    "how's life",
    "nice weather today",
    "hot today, isn't it",
];

/// Words a sentence must not end on.
const DANGLING_ENDINGS: &[&str] = &[
    "and", "but", "or", "nor", "so", "yet", "that", "which", "what", "how",
    "when", "where", "if", "because", "to", "of", "in", "on", "at", "by",
    "with", "for", "from", "into", "about", "as", "the", "a", "an", "is",
    "are", "was", "were", "be", "not", "very", "just", "still", "also",
    "then", "than",
];

/// Clean a raw candidate line. Returns an empty string when the candidate
/// is unusable (placeholder literals, boilerplate markers, trailing
/// punctuation that signals a cut-off).
#[must_use]
pub fn clean_line(text: &str) -> String {
    let mut cleaned = text.trim().replace("**", "").replace('*', "");
    if matches!(cleaned.as_str(), "0" | "1" | "null" | "none" | "nan") {
        return String::new();
    }

    let lowered = cleaned.to_lowercase();
    if BLOCKED_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return String::new();
    }

    // Strip a leading "Speaker:" label (at most three words before a colon
    // near the start).
    if let Some(colon) = cleaned.find(':') {
        if colon < 32 && cleaned[..colon].split_whitespace().count() <= 3 {
            cleaned = cleaned[colon + 1..].trim().to_string();
        }
    }

    if let Some(stripped) = cleaned.strip_prefix("- ") {
        cleaned = stripped.trim().to_string();
    }
    if cleaned.ends_with(',') || cleaned.ends_with(';') || cleaned.ends_with(':') {
        return String::new();
    }
    cleaned
}

/// Whether the text reads as cut off mid-thought: too short, trailing
/// separator punctuation, or a dangling conjunction/preposition ending.
#[must_use]
pub fn is_incomplete(text: &str) -> bool {
    let stripped = text.trim().to_lowercase();
    if stripped.is_empty() {
        return true;
    }
    if stripped.ends_with(',') || stripped.ends_with(';') || stripped.ends_with(':') {
        return true;
    }

    let words: Vec<&str> = stripped
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();
    if words.len() < 4 {
        return true;
    }
    words
        .last()
        .is_some_and(|last| DANGLING_ENDINGS.contains(last))
}

/// Normalize text for repetition comparison: lowercase, punctuation to
/// spaces, collapsed whitespace.
#[must_use]
pub fn normalize_for_compare(text: &str) -> String {
    let mut out = text.to_lowercase();
    for ch in ['.', ',', '!', '?', ';', ':', '-', '—', '\n', '\t'] {
        out = out.replace(ch, " ");
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Why a candidate line was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The oracle returned empty or sentinel text.
    Sentinel,
    /// Cleanup left nothing usable (placeholder literals, boilerplate
    /// markers, a trailing separator).
    Unusable,
    /// The cleaned text still reads as cut off mid-thought.
    Incomplete,
}

/// Run the full validation pipeline over a raw candidate. Each attempt
/// yields either the accepted line or the reason it was rejected.
///
/// # Errors
///
/// Returns the [`RejectReason`] for unusable candidates.
pub fn validate_candidate(raw: &str) -> std::result::Result<String, RejectReason> {
    if is_error_text(raw) {
        return Err(RejectReason::Sentinel);
    }
    let cleaned = clean_line(raw);
    if cleaned.is_empty() {
        return Err(RejectReason::Unusable);
    }
    if is_incomplete(&cleaned) {
        return Err(RejectReason::Incomplete);
    }
    Ok(cleaned)
}

// ---------------------------------------------------------------------------
// Fallback lines
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Archetype {
    Analyst,
    Stoic,
    Open,
    Plain,
}

fn archetype(personality: &str) -> Archetype {
    let lowered = personality.to_lowercase();
    if ["observ", "analy", "tactic", "practical"]
        .iter()
        .any(|needle| lowered.contains(needle))
    {
        Archetype::Analyst
    } else if ["discipl", "direct", "guard", "soldier", "stern"]
        .iter()
        .any(|needle| lowered.contains(needle))
    {
        Archetype::Stoic
    } else if ["emotion", "warm", "empat", "social", "lively"]
        .iter()
        .any(|needle| lowered.contains(needle))
    {
        Archetype::Open
    } else {
        Archetype::Plain
    }
}

/// The canned dialogue line used when generation fails or echoes: a pure
/// function of persona and weather.
#[must_use]
pub fn fallback_line(personality: &str, weather: &str) -> String {
    let line = match archetype(personality) {
        Archetype::Analyst => match weather {
            "sunny" => "Clear light helps me catch the details, so I would pick up the pace.",
            "rainy" => "Under this rain I would keep near shelter and watch how people move.",
            "snowy" => "The snow is pretty, but our routes need simplifying.",
            _ => "Let me size up the situation first and then we move carefully.",
        },
        Archetype::Stoic => match weather {
            "sunny" => "In heat like this we work in short steps and skip the fuss.",
            "rainy" => "The rain is tolerable, but order matters more than speed now.",
            "snowy" => "Snow is fine by me. We keep formation and keep the pace.",
            _ => "We hold to the plan and cut the extra movement.",
        },
        Archetype::Open => match weather {
            "sunny" => "Sun like this makes me want to talk honestly, no masks.",
            "rainy" => "I like the rain, it washes the noise out of my head.",
            "snowy" => "The snow lifts my mood, maybe things look a little lighter now.",
            _ => "Whatever the weather does, what matters is how we talk to each other.",
        },
        Archetype::Plain => return "Fair enough, I hear you, let's take it from there.".to_string(),
    };
    line.to_string()
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

/// A completed two-turn exchange.
#[derive(Debug, Clone)]
pub struct DialogueOutcome {
    /// The two lines, initiator first.
    pub lines: Vec<DialogueLine>,
}

/// Runs two-turn chats between agents.
pub struct DialogueProtocol {
    ctx: Arc<WorldContext>,
    relationships: RelationshipUpdater,
}

impl DialogueProtocol {
    /// Create a protocol bound to the context.
    #[must_use]
    pub fn new(ctx: Arc<WorldContext>) -> Self {
        let relationships = RelationshipUpdater::new(Arc::clone(&ctx));
        Self { ctx, relationships }
    }

    /// Run a full exchange: the initiator opens, the target replies, both
    /// remember it, and both have their sympathy and mood react to the
    /// text they received.
    ///
    /// # Errors
    ///
    /// Returns persistence errors; generation failures never error (they
    /// fall back to canned lines).
    pub async fn run(&self, initiator: &Agent, target: &Agent) -> Result<DialogueOutcome> {
        let env = self.ctx.gateway.environment()?;
        let weather = env.weather.as_str();

        // Turn one: the initiator opens.
        let sympathy_to_target = self.ctx.gateway.sympathy_between(initiator.id, target.id)?;
        let system = persona_system(initiator);
        let user = prompt::render_template(
            prompt::CHAT_INIT_USER,
            &[
                ("target_name", &target.name),
                ("topic_context", "You just felt like talking."),
                ("weather", weather),
                ("sympathy", &sympathy_to_target.to_string()),
                ("sympathy_hint", prompt::sympathy_hint(sympathy_to_target)),
            ],
        );
        let first = self
            .generate_line(&system, &user, &initiator.personality, weather)
            .await;

        // Turn two: the target replies with its own memories in view.
        let sympathy_to_initiator = self.ctx.gateway.sympathy_between(target.id, initiator.id)?;
        let query = format!("conversation with {}: {}", initiator.name, first);
        let entries = self.ctx.gateway.memories_with_vectors(target.id)?;
        let ranked = retrieval::rank(
            &self.ctx.embedder.embed(&query),
            &entries,
            self.ctx.config.retrieval.top_k,
        );
        let system = persona_system(target);
        let user = prompt::render_template(
            prompt::CHAT_REPLY_USER,
            &[
                ("speaker_name", &initiator.name),
                ("message", &first),
                ("weather", weather),
                ("sympathy", &sympathy_to_initiator.to_string()),
                ("sympathy_hint", prompt::sympathy_hint(sympathy_to_initiator)),
                ("past_conversations", &retrieval::format_context(&ranked)),
            ],
        );
        let mut reply = self
            .generate_line(&system, &user, &target.personality, weather)
            .await;

        // Echo guard: a reply identical to its input becomes the fallback.
        if normalize_for_compare(&reply) == normalize_for_compare(&first) {
            debug!(target = %target.name, "reply echoed the input, using fallback");
            reply = fallback_line(&target.personality, weather);
        }

        // Both participants remember the exchange first-person.
        let initiator_memory = format!(
            "I started a conversation with {}: '{first}'. {} replied: '{reply}'",
            target.name, target.name
        );
        self.ctx.gateway.append_memory(
            initiator.id,
            &initiator_memory,
            MemoryKind::Episode,
            Some(&self.ctx.embedder.embed(&initiator_memory)),
        )?;
        let target_memory = format!(
            "{} said to me: '{first}'. I replied: '{reply}'",
            initiator.name
        );
        self.ctx.gateway.append_memory(
            target.id,
            &target_memory,
            MemoryKind::Episode,
            Some(&self.ctx.embedder.embed(&target_memory)),
        )?;

        // Sympathy and mood react to the text each side received.
        self.relationships.react(target, initiator, &first).await?;
        self.relationships.react(initiator, target, &reply).await?;
        self.relationships
            .shift_mood(target, &format!("{} said: {first}", initiator.name))
            .await?;
        self.relationships
            .shift_mood(initiator, &format!("Talked with {}", target.name))
            .await?;

        Ok(DialogueOutcome {
            lines: vec![
                DialogueLine {
                    speaker_id: initiator.id,
                    speaker: initiator.name.clone(),
                    text: first,
                },
                DialogueLine {
                    speaker_id: target.id,
                    speaker: target.name.clone(),
                    text: reply,
                },
            ],
        })
    }

    /// Generate one validated line, retrying up to the configured attempt
    /// budget before falling back to the canned line.
    async fn generate_line(
        &self,
        system: &str,
        user: &str,
        personality: &str,
        weather: &str,
    ) -> String {
        if self.ctx.oracle.is_enabled() {
            let attempts = self.ctx.config.simulation.dialogue_attempts.max(1);
            for attempt in 0..attempts {
                let raw = self.ctx.oracle.invoke(OracleRole::Dialogue, system, user).await;
                match validate_candidate(&raw) {
                    Ok(line) => return line,
                    Err(reason) => debug!(attempt, ?reason, "candidate line rejected"),
                }
            }
        }
        fallback_line(personality, weather)
    }
}

/// Render the persona system prompt for an agent.
fn persona_system(agent: &Agent) -> String {
    let dominant = agent.mood.dominant();
    prompt::render_template(
        prompt::AGENT_SYSTEM,
        &[
            ("name", &agent.name),
            ("personality", &agent.personality),
            ("mood_description", dominant.description()),
            ("mood_style", dominant.style_hint()),
        ],
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
