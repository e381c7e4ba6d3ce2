//! Error types for the Vivarium core library.

use thiserror::Error;

/// Top-level error type for core operations.
#[derive(Error, Debug)]
pub enum VivariumError {
    /// An agent with the given ID was not found.
    #[error("Agent not found: {0}")]
    AgentNotFound(crate::AgentId),

    /// A point with the given ID was not found.
    #[error("Point not found: {0}")]
    PointNotFound(crate::PointId),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, VivariumError>;
