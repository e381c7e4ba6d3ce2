//! Mood — the five-key emotion distribution and its transition rules.
//!
//! A mood is a distribution over `{joy, anger, sadness, fear, neutral}`
//! that always sums to exactly 100 with no negative component. Transitions
//! take the current distribution plus a free-text event description and
//! produce a new distribution; the arg-max key (the dominant emotion)
//! selects response-style text for generated dialogue.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::lexicon;

/// The five tracked emotions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    /// Cheerful, upbeat.
    Joy,
    /// Irritated, confrontational.
    Anger,
    /// Subdued, melancholic.
    Sadness,
    /// Nervous, on edge.
    Fear,
    /// Even, unremarkable.
    Neutral,
}

impl Emotion {
    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Joy => "joy",
            Self::Anger => "anger",
            Self::Sadness => "sadness",
            Self::Fear => "fear",
            Self::Neutral => "neutral",
        }
    }

    /// Short mood description used in prompts ("cheerful and upbeat").
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Joy => "cheerful and upbeat",
            Self::Anger => "irritated and short-tempered",
            Self::Sadness => "quiet and melancholic",
            Self::Fear => "nervous and watchful",
            Self::Neutral => "calm and even",
        }
    }

    /// Speaking-style directive injected into dialogue prompts.
    #[must_use]
    pub fn style_hint(self) -> &'static str {
        match self {
            Self::Joy => "You speak brightly, joke a little, and use the occasional exclamation.",
            Self::Anger => "You speak sharply and bluntly, and you may snap at people.",
            Self::Sadness => "You speak quietly and briefly, with a tired undertone.",
            Self::Fear => "You speak hesitantly and keep glancing around; you hedge a lot.",
            Self::Neutral => "You speak evenly and plainly, without strong emotion.",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A five-key emotion distribution summing to exactly 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mood {
    /// Joy share.
    pub joy: u32,
    /// Anger share.
    pub anger: u32,
    /// Sadness share.
    pub sadness: u32,
    /// Fear share.
    pub fear: u32,
    /// Neutral share (also absorbs the renormalization remainder).
    pub neutral: u32,
}

impl Mood {
    /// Starting mood for freshly spawned agents.
    pub const DEFAULT: Self = Self {
        joy: 20,
        anger: 5,
        sadness: 5,
        fear: 5,
        neutral: 65,
    };

    /// Total mass of the distribution (always 100 for normalized moods).
    #[must_use]
    pub fn total(&self) -> u32 {
        self.joy + self.anger + self.sadness + self.fear + self.neutral
    }

    /// Dominant emotion: the arg-max key. Ties resolve in the fixed order
    /// joy, anger, sadness, fear, neutral.
    #[must_use]
    pub fn dominant(&self) -> Emotion {
        let pairs = [
            (Emotion::Joy, self.joy),
            (Emotion::Anger, self.anger),
            (Emotion::Sadness, self.sadness),
            (Emotion::Fear, self.fear),
            (Emotion::Neutral, self.neutral),
        ];
        let mut best = pairs[0];
        for pair in &pairs[1..] {
            if pair.1 > best.1 {
                best = *pair;
            }
        }
        best.0
    }

    /// Build a normalized mood from raw (possibly negative) component
    /// values: every value is floored at zero, the result is scaled to sum
    /// to exactly 100, and the rounding remainder goes to `neutral`.
    #[must_use]
    pub fn normalized(joy: i64, anger: i64, sadness: i64, fear: i64, neutral: i64) -> Self {
        let floored = [
            joy.max(0) as u64,
            anger.max(0) as u64,
            sadness.max(0) as u64,
            fear.max(0) as u64,
            neutral.max(0) as u64,
        ];
        let total: u64 = floored.iter().sum();
        if total == 0 {
            return Self {
                joy: 0,
                anger: 0,
                sadness: 0,
                fear: 0,
                neutral: 100,
            };
        }

        let scaled: Vec<u32> = floored
            .iter()
            .map(|&v| ((v * 100) / total) as u32)
            .collect();
        let remainder = 100 - scaled.iter().sum::<u32>();

        Self {
            joy: scaled[0],
            anger: scaled[1],
            sadness: scaled[2],
            fear: scaled[3],
            neutral: scaled[4] + remainder,
        }
    }

    /// Rule-based mood transition: applies lexical-category deltas from the
    /// event text, then floors and renormalizes. An event with no trigger
    /// words leaves the mood unchanged.
    #[must_use]
    pub fn lexical_transition(&self, event: &str) -> Self {
        let positive = lexicon::count_hits(event, lexicon::POSITIVE) as i64;
        let hostile = lexicon::count_hits(event, lexicon::HOSTILE) as i64;
        let anxious = lexicon::count_hits(event, lexicon::ANXIOUS) as i64;
        if positive == 0 && hostile == 0 && anxious == 0 {
            return *self;
        }

        let joy = i64::from(self.joy) + 8 * positive - 6 * hostile;
        let anger = i64::from(self.anger) + 8 * hostile - 4 * positive;
        let sadness = i64::from(self.sadness) - 4 * positive;
        let fear = i64::from(self.fear) + 10 * anxious;
        let neutral = i64::from(self.neutral) - 5 * anxious;

        Self::normalized(joy, anger, sadness, fear, neutral)
    }

    /// Serialize to the JSON column form.
    #[must_use]
    pub fn to_json(&self) -> String {
        // A struct of five u32 fields cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_else(|_| Self::DEFAULT.to_json())
    }

    /// Parse the JSON column form. Anything unparseable (including the
    /// legacy literal `"neutral"`) falls back to [`Self::DEFAULT`].
    #[must_use]
    pub fn from_json_lossy(s: &str) -> Self {
        serde_json::from_str(s).unwrap_or(Self::DEFAULT)
    }
}

impl Default for Mood {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "joy {} / anger {} / sadness {} / fear {} / neutral {}",
            self.joy, self.anger, self.sadness, self.fear, self.neutral
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
