//! Relationship updates — mood and sympathy against persistence.
//!
//! The pure arithmetic lives in `vivarium_core::{mood, sympathy}`; this
//! component applies it to stored state: it writes both edge directions,
//! persists mood transitions, publishes mood-changed updates, and turns
//! threshold crossings into world events.

use std::sync::Arc;

use tracing::{debug, info};

use vivarium_core::error::Result;
use vivarium_core::mood::Mood;
use vivarium_core::sympathy::{self, Crossing};
use vivarium_core::types::Agent;

use crate::broadcast::WorldUpdate;
use crate::context::WorldContext;

/// Applies affect strategy output to persisted relationship state.
#[derive(Clone)]
pub struct RelationshipUpdater {
    ctx: Arc<WorldContext>,
}

impl RelationshipUpdater {
    /// Create an updater bound to the context.
    #[must_use]
    pub fn new(ctx: Arc<WorldContext>) -> Self {
        Self { ctx }
    }

    /// Transition an agent's mood for `event`, persist it, and broadcast
    /// the change. Returns the new mood.
    ///
    /// # Errors
    ///
    /// Returns persistence errors to the caller (not retried here).
    pub async fn shift_mood(&self, agent: &Agent, event: &str) -> Result<Mood> {
        let updated = self
            .ctx
            .affect
            .mood_transition(&agent.personality, &agent.mood, event)
            .await;
        if updated != agent.mood {
            self.ctx.gateway.update_agent_mood(agent.id, &updated)?;
            self.ctx.broadcaster.publish(&WorldUpdate::MoodChanged {
                agent_id: agent.id,
                mood: updated,
            });
        }
        Ok(updated)
    }

    /// React `reactor`'s sympathy toward `other` to a received message.
    ///
    /// The reactor's own edge takes the full delta; the reciprocal edge
    /// takes only its unit sign. A threshold crossing on the reactor's
    /// edge is logged as a one-shot world event. Returns the applied
    /// delta.
    ///
    /// # Errors
    ///
    /// Returns persistence errors to the caller.
    pub async fn react(&self, reactor: &Agent, other: &Agent, message: &str) -> Result<i32> {
        let delta = self.ctx.affect.sympathy_delta(message).await;
        if delta == 0 {
            return Ok(0);
        }

        let current = self.ctx.gateway.sympathy_between(reactor.id, other.id)?;
        let (updated, crossing) = sympathy::apply_delta(current, delta);
        self.ctx.gateway.upsert_sympathy(reactor.id, other.id, updated)?;

        let reverse_current = self.ctx.gateway.sympathy_between(other.id, reactor.id)?;
        let (reverse_updated, _) =
            sympathy::apply_delta(reverse_current, sympathy::reciprocal_delta(delta));
        self.ctx
            .gateway
            .upsert_sympathy(other.id, reactor.id, reverse_updated)?;

        debug!(
            reactor = %reactor.name,
            other = %other.name,
            delta,
            sympathy = updated,
            "sympathy updated"
        );

        match crossing {
            Some(Crossing::StartsTrusting) => {
                let content = format!("{} starts trusting {}", reactor.name, other.name);
                info!("{content}");
                self.ctx.gateway.append_event(&content)?;
            }
            Some(Crossing::GrowsHostile) => {
                let content = format!("{} grows hostile toward {}", reactor.name, other.name);
                info!("{content}");
                self.ctx.gateway.append_event(&content)?;
            }
            None => {}
        }

        Ok(delta)
    }

    /// Periodic drift pass: every non-zero edge steps one unit toward
    /// zero. Returns how many edges changed.
    ///
    /// # Errors
    ///
    /// Returns persistence errors to the caller.
    pub fn run_drift(&self) -> Result<usize> {
        let mut changed = 0;
        for edge in self.ctx.gateway.all_edges()? {
            if edge.sympathy == 0 {
                continue;
            }
            let drifted = sympathy::drift_step(edge.sympathy);
            self.ctx
                .gateway
                .upsert_sympathy(edge.from, edge.to, drifted)?;
            changed += 1;
        }
        if changed > 0 {
            debug!(edges = changed, "relationship drift applied");
        }
        Ok(changed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
