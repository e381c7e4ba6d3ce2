//! Request and response types for oracle calls.

use serde::Serialize;

/// A request to the behavior oracle.
#[derive(Debug, Clone, Serialize)]
pub struct OracleRequest {
    /// System prompt (persona, rules, constraints).
    pub system: String,
    /// User prompt (context, memories, instructions).
    pub user: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl OracleRequest {
    /// Create a request with the library defaults.
    #[must_use]
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_tokens: 700,
            temperature: 0.7,
            timeout_ms: 25_000,
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// A response from the behavior oracle.
#[derive(Debug, Clone)]
pub struct OracleResponse {
    /// The generated text.
    pub text: String,
    /// Round-trip latency in milliseconds.
    pub latency_ms: u64,
    /// Which model produced the text.
    pub model: String,
}
