//! Episodic memory types.
//!
//! A memory is an append-only per-agent log row: free text plus a kind
//! tag. The log is unbounded but periodically compacted — old episodes
//! beyond a retention count are purged and replaced by one summary entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embedding::Embedding;
use crate::types::AgentId;

/// Prefix marking compaction-produced summary text.
pub const SUMMARY_PREFIX: &str = "[summary]";

/// Kind tag of a memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// Something that happened to the agent.
    Episode,
    /// A plan the agent committed to.
    Plan,
    /// A world event the agent witnessed.
    World,
    /// A compaction-produced digest of purged episodes.
    Summary,
}

impl MemoryKind {
    /// Stable string form used in the database column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Episode => "episode",
            Self::Plan => "plan",
            Self::World => "world",
            Self::Summary => "summary",
        }
    }

    /// Parse the database column form; unknown tags become episodes.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "plan" => Self::Plan,
            "world" => Self::World,
            "summary" => Self::Summary,
            _ => Self::Episode,
        }
    }
}

/// One stored memory row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Row id (insertion order).
    pub id: i64,
    /// Owning agent.
    pub agent_id: AgentId,
    /// Free-form first-person text.
    pub text: String,
    /// Kind tag.
    pub kind: MemoryKind,
    /// Embedding of `text`, if one was computed at append time.
    pub embedding: Option<Embedding>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_column_form() {
        for kind in [
            MemoryKind::Episode,
            MemoryKind::Plan,
            MemoryKind::World,
            MemoryKind::Summary,
        ] {
            assert_eq!(MemoryKind::from_str_lossy(kind.as_str()), kind);
        }
        assert_eq!(MemoryKind::from_str_lossy("???"), MemoryKind::Episode);
    }
}
