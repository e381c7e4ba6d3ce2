//! Subscription broadcaster — best-effort fan-out of world updates.
//!
//! Observers subscribe for an unbounded channel of typed events. Delivery
//! is fire-and-forget: a failed send (the observer hung up) removes that
//! observer and nobody else notices. Producers are never blocked.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use vivarium_core::mood::Mood;
use vivarium_core::types::{Agent, AgentId, AgentKind, ObserverId, PointId};

/// Wire-friendly view of an agent for snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct AgentView {
    /// Agent id.
    pub id: AgentId,
    /// Display name.
    pub name: String,
    /// Entity kind.
    pub kind: AgentKind,
    /// Persona text.
    pub personality: String,
    /// Current mood distribution.
    pub mood: Mood,
    /// Latest plan text.
    pub current_plan: String,
    /// Linked point, if any.
    pub point_id: Option<PointId>,
}

impl From<&Agent> for AgentView {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id,
            name: agent.name.clone(),
            kind: agent.kind,
            personality: agent.personality.clone(),
            mood: agent.mood,
            current_plan: agent.current_plan.clone(),
            point_id: agent.point_id,
        }
    }
}

/// One line of a broadcast dialogue.
#[derive(Debug, Clone, Serialize)]
pub struct DialogueLine {
    /// Speaking agent.
    pub speaker_id: AgentId,
    /// Speaker display name.
    pub speaker: String,
    /// The spoken line.
    pub text: String,
}

/// Typed world updates pushed to observers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorldUpdate {
    /// Full state of every agent (end of each tick).
    AgentsSnapshot {
        /// All agents.
        agents: Vec<AgentView>,
    },
    /// An agent was spawned.
    AgentCreated {
        /// The new agent.
        agent: AgentView,
    },
    /// An agent was despawned.
    AgentDeleted {
        /// Its id.
        agent_id: AgentId,
    },
    /// An agent's mood changed.
    MoodChanged {
        /// The agent.
        agent_id: AgentId,
        /// The new mood.
        mood: Mood,
    },
    /// Throttled position update (roughly every 10th motion step).
    AgentMoved {
        /// The agent.
        agent_id: AgentId,
        /// X coordinate.
        x: f64,
        /// Y coordinate.
        y: f64,
    },
    /// A short thought bubble from the plan phase.
    AgentThought {
        /// The agent.
        agent_id: AgentId,
        /// Truncated plan text.
        thought: String,
    },
    /// A completed two-turn dialogue.
    Dialogue {
        /// Initiating agent.
        initiator_id: AgentId,
        /// Its name.
        initiator_name: String,
        /// Responding agent.
        target_id: AgentId,
        /// Its name.
        target_name: String,
        /// The exchanged lines, in order.
        messages: Vec<DialogueLine>,
    },
}

/// Hub of connected observers.
#[derive(Clone, Default)]
pub struct Broadcaster {
    observers: Arc<DashMap<ObserverId, mpsc::UnboundedSender<WorldUpdate>>>,
}

impl Broadcaster {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer; returns its id and the receiving end.
    #[must_use]
    pub fn subscribe(&self) -> (ObserverId, mpsc::UnboundedReceiver<WorldUpdate>) {
        let id = ObserverId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.insert(id, tx);
        (id, rx)
    }

    /// Remove an observer explicitly.
    pub fn unsubscribe(&self, id: ObserverId) {
        self.observers.remove(&id);
    }

    /// Number of connected observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Push one update to every observer. A failed send removes only that
    /// observer; there are no retries.
    pub fn publish(&self, update: &WorldUpdate) {
        if self.observers.is_empty() {
            return;
        }

        let mut dead = Vec::new();
        for entry in self.observers.iter() {
            if entry.value().send(update.clone()).is_err() {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            debug!(observer = ?id.0, "dropping disconnected observer");
            self.observers.remove(&id);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
