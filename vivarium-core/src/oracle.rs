//! Behavior oracle contract.
//!
//! The oracle is an external text-generation collaborator. It never makes
//! the caller handle a transport error: failures come back as text carrying
//! a reserved prefix, and callers treat sentinel-or-empty uniformly as
//! "no usable text" before applying their deterministic fallback.

use async_trait::async_trait;

/// Reserved prefix marking oracle failure text.
pub const ORACLE_ERROR_PREFIX: &str = "[oracle error";

/// Whether `text` is unusable oracle output (empty or an error sentinel).
#[must_use]
pub fn is_error_text(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty() || trimmed.starts_with(ORACLE_ERROR_PREFIX)
}

/// Wrap a failure description into the sentinel form.
#[must_use]
pub fn error_text(reason: &str) -> String {
    format!("{ORACLE_ERROR_PREFIX}: {reason}]")
}

/// What a request is for. Backends may use this to prioritise work; the
/// engine never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OracleRole {
    /// Background memory summarisation.
    Summary,
    /// Plan generation for an agent.
    Plan,
    /// Mood / sympathy analysis.
    Analysis,
    /// A dialogue line someone is waiting on.
    Dialogue,
}

/// External text-generation collaborator.
#[async_trait]
pub trait BehaviorOracle: Send + Sync {
    /// Generate text for the given system and user prompts.
    ///
    /// Never fails at the type level: transport or backend errors are
    /// returned as sentinel text (see [`is_error_text`]).
    async fn invoke(&self, role: OracleRole, system: &str, user: &str) -> String;

    /// Whether a real backend is configured. When `false`, callers skip
    /// composing prompts and go straight to their deterministic path.
    fn is_enabled(&self) -> bool;
}

/// The always-disabled oracle: every call yields a sentinel.
///
/// Used when the world runs without a text-generation backend and in
/// tests that exercise the fallback paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledOracle;

#[async_trait]
impl BehaviorOracle for DisabledOracle {
    async fn invoke(&self, _role: OracleRole, _system: &str, _user: &str) -> String {
        error_text("no oracle backend configured")
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_and_empty_are_errors() {
        assert!(is_error_text(""));
        assert!(is_error_text("   "));
        assert!(is_error_text("[oracle error: timeout]"));
        assert!(is_error_text(&error_text("rate limited")));
        assert!(!is_error_text("A perfectly good line."));
    }

    #[tokio::test]
    async fn disabled_oracle_always_yields_sentinel() {
        let oracle = DisabledOracle;
        assert!(!oracle.is_enabled());
        let text = oracle.invoke(OracleRole::Dialogue, "sys", "user").await;
        assert!(is_error_text(&text));
    }
}
