//! Core type definitions for the Vivarium world.
//!
//! All persisted types are serializable; identifiers are uuid newtypes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::mood::Mood;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Unique identifier for an agent (or mob) in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    /// Create a new random agent ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a movable point on the plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointId(pub Uuid);

impl PointId {
    /// Create a new random point ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a connected observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub Uuid);

impl ObserverId {
    /// Create a new random observer ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Pair Key
// ---------------------------------------------------------------------------

/// Canonical unordered pair of agent ids, keyed as `(min, max)`.
///
/// Used for the chat-cooldown and last-exchange maps so that `(a, b)` and
/// `(b, a)` address the same entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairKey(pub AgentId, pub AgentId);

impl PairKey {
    /// Build the canonical key for two agents, in either order.
    #[must_use]
    pub fn new(a: AgentId, b: AgentId) -> Self {
        if a <= b { Self(a, b) } else { Self(b, a) }
    }

    /// Whether this key involves the given agent.
    #[must_use]
    pub fn contains(&self, id: AgentId) -> bool {
        self.0 == id || self.1 == id
    }
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// Kind of a mobile entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Full agent: plans, chats, has mood and relationships.
    Agent,
    /// Mob: shares the motion substrate but never takes part in dialogue.
    Mob,
}

impl AgentKind {
    /// Stable string form used in the database column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Mob => "mob",
        }
    }

    /// Parse the database column form; unknown values become [`Self::Mob`].
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "agent" => Self::Agent,
            _ => Self::Mob,
        }
    }
}

/// An autonomous world inhabitant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Stable identifier.
    pub id: AgentId,
    /// Stable small integer (the row's insertion order). Drives the
    /// round-robin planning fan-out.
    pub seq: i64,
    /// Display name.
    pub name: String,
    /// Entity kind.
    pub kind: AgentKind,
    /// Free-text persona used to condition generated text.
    pub personality: String,
    /// Current emotion distribution.
    pub mood: Mood,
    /// Latest generated plan text.
    pub current_plan: String,
    /// Linked point, if the agent is placed on the plane.
    pub point_id: Option<PointId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Whether this entity takes part in proximity dialogue.
    #[must_use]
    pub fn is_dialogue_capable(&self) -> bool {
        self.kind == AgentKind::Agent
    }
}

// ---------------------------------------------------------------------------
// Points
// ---------------------------------------------------------------------------

/// A movable point on the \[0,100\]×\[0,100\] plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Stable identifier.
    pub id: PointId,
    /// Current x coordinate (percent units).
    pub x: f64,
    /// Current y coordinate (percent units).
    pub y: f64,
    /// Target x coordinate.
    pub target_x: f64,
    /// Target y coordinate.
    pub target_y: f64,
    /// Movement speed in percent units per motion step.
    pub speed: f64,
}

impl Point {
    /// Default movement speed for freshly spawned points.
    pub const DEFAULT_SPEED: f64 = 1.5;

    /// Euclidean distance from the current position to the target.
    #[must_use]
    pub fn distance_to_target(&self) -> f64 {
        let dx = self.target_x - self.x;
        let dy = self.target_y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Euclidean distance between two positions in percent units.
#[must_use]
pub fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

/// A directed sympathy edge between two agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    /// Owning side of the edge.
    pub from: AgentId,
    /// Target of the edge.
    pub to: AgentId,
    /// Sympathy score, always within \[-10, 10\].
    pub sympathy: i32,
}

// ---------------------------------------------------------------------------
// World events & environment
// ---------------------------------------------------------------------------

/// An append-only world event log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldEventRecord {
    /// Row id (insertion order).
    pub id: i64,
    /// Human-readable event text.
    pub content: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Singleton world environment state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    /// Lowercase weather tag (`sunny`, `rainy`, `snowy`, …).
    pub weather: String,
    /// Motion time scale multiplier.
    pub time_speed: f64,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            weather: "sunny".to_string(),
            time_speed: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_is_order_independent() {
        let a = AgentId::new();
        let b = AgentId::new();
        assert_eq!(PairKey::new(a, b), PairKey::new(b, a));
        assert!(PairKey::new(a, b).contains(a));
        assert!(PairKey::new(a, b).contains(b));
    }

    #[test]
    fn distance_matches_euclidean() {
        let d = distance((10.0, 10.0), (90.0, 90.0));
        assert!((d - 113.137_084).abs() < 1e-3);
    }

    #[test]
    fn agent_kind_round_trips_through_column_form() {
        assert_eq!(AgentKind::from_str_lossy(AgentKind::Agent.as_str()), AgentKind::Agent);
        assert_eq!(AgentKind::from_str_lossy(AgentKind::Mob.as_str()), AgentKind::Mob);
        assert_eq!(AgentKind::from_str_lossy("???"), AgentKind::Mob);
    }
}
