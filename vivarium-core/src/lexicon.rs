//! Keyword lexicons for the rule-based affect strategy.
//!
//! Three categories of trigger words drive the lexical mood and sympathy
//! scoring. Matching is lowercase substring containment over whole tokens,
//! so "helpful" counts as a `help` hit but "whelp" does not.

/// Words that read as warm or approving.
pub const POSITIVE: &[&str] = &[
    "thanks", "thank", "great", "good", "wonderful", "help", "helped",
    "helpful", "friend", "glad", "happy", "love", "trust", "agree",
    "support", "kind", "welcome", "together", "appreciate",
];

/// Words that read as hostile or dismissive.
pub const HOSTILE: &[&str] = &[
    "hate", "angry", "stupid", "enemy", "hostile", "liar", "annoying",
    "refuse", "insult", "attack", "blame", "fight", "useless", "shut",
    "leave", "wrong", "never",
];

/// Words that read as unsettling or dangerous.
pub const ANXIOUS: &[&str] = &[
    "danger", "dangerous", "afraid", "fear", "worried", "worry", "storm",
    "dark", "risk", "unsafe", "alarm", "panic", "lost", "alone",
];

/// Count how many words from `category` occur as tokens of `text`.
///
/// Tokens are compared by prefix so simple inflections still match
/// ("helps", "helping" → `help`).
#[must_use]
pub fn count_hits(text: &str, category: &[&str]) -> usize {
    let lowered = text.to_lowercase();
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .filter(|token| category.iter().any(|word| token.starts_with(word)))
        .count()
}
