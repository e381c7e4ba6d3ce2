//! Plan phase — per-agent plan generation, zone retargeting, mood update.
//!
//! Planning is the most expensive per-agent work of a tick, so it is
//! spread round-robin: an agent plans when `tick % K == seq % K`, giving
//! every agent a plan roughly once per K ticks. The plan text then feeds
//! three side effects: a `plan` memory, a mood transition, and a
//! keyword-scored destination zone applied to the agent's point.

use std::sync::Arc;

use tracing::{debug, warn};

use vivarium_core::error::Result;
use vivarium_core::memory::MemoryKind;
use vivarium_core::oracle::{OracleRole, is_error_text};
use vivarium_core::retrieval;
use vivarium_core::sympathy;
use vivarium_core::types::Agent;
use vivarium_core::zones;

use vivarium_llm::prompt;

use crate::broadcast::WorldUpdate;
use crate::context::WorldContext;
use crate::motion::MotionController;
use crate::relationship::RelationshipUpdater;
use crate::scheduler::TickEntry;

/// Fixed retrieval query for planning context.
const PLAN_QUERY: &str = "plan of action what to do next";

/// Thought bubbles are truncated to this many characters.
const THOUGHT_LIMIT: usize = 80;

/// Generates plans for the tick's round-robin slice of agents.
pub struct PlanPhase {
    ctx: Arc<WorldContext>,
    relationships: RelationshipUpdater,
    motion: MotionController,
}

impl PlanPhase {
    /// Create the phase bound to the context and the motion controller
    /// (plan destinations overwrite wander targets through it).
    #[must_use]
    pub fn new(ctx: Arc<WorldContext>, motion: MotionController) -> Self {
        let relationships = RelationshipUpdater::new(Arc::clone(&ctx));
        Self {
            ctx,
            relationships,
            motion,
        }
    }

    /// Run the phase for one tick. Failures are isolated per agent and
    /// recorded as inline entries.
    pub async fn run(&self, agents: &[Agent], tick_index: u64) -> Vec<TickEntry> {
        let fanout = self.ctx.config.simulation.plan_fanout.max(1);
        let mut entries = Vec::new();

        for agent in agents {
            if !agent.is_dialogue_capable() {
                continue;
            }
            if (agent.seq.unsigned_abs() % fanout) != (tick_index % fanout) {
                continue;
            }

            match self.plan_agent(agent).await {
                Ok(plan) => entries.push(TickEntry::Plan {
                    agent_id: agent.id,
                    agent_name: agent.name.clone(),
                    plan,
                }),
                Err(e) => {
                    warn!(agent = %agent.name, error = %e, "plan generation failed");
                    entries.push(TickEntry::PlanError {
                        agent_id: agent.id,
                        agent_name: agent.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        entries
    }

    /// Generate and apply one agent's plan.
    async fn plan_agent(&self, agent: &Agent) -> Result<String> {
        let env = self.ctx.gateway.environment()?;

        // Context: recent events, relevant memories, relationship summary.
        let events = self.ctx.gateway.recent_events(self.ctx.config.simulation.event_window)?;
        let events_text = if events.is_empty() {
            "Nothing of note.".to_string()
        } else {
            events
                .iter()
                .map(|e| format!("- {}", e.content))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let entries = self.ctx.gateway.memories_with_vectors(agent.id)?;
        let ranked = retrieval::rank(
            &self.ctx.embedder.embed(PLAN_QUERY),
            &entries,
            self.ctx.config.retrieval.top_k,
        );
        let memories_text = retrieval::format_context(&ranked);
        let relationships_text = self.relationship_summary(agent)?;

        let plan = if self.ctx.oracle.is_enabled() {
            let dominant = agent.mood.dominant();
            let system = prompt::render_template(
                prompt::AGENT_SYSTEM,
                &[
                    ("name", &agent.name),
                    ("personality", &agent.personality),
                    ("mood_description", dominant.description()),
                    ("mood_style", dominant.style_hint()),
                ],
            );
            let user = prompt::render_template(
                prompt::PLAN_USER,
                &[
                    ("weather", &env.weather),
                    ("events", &events_text),
                    ("memories", &memories_text),
                    ("relationships", &relationships_text),
                ],
            );
            let raw = self.ctx.oracle.invoke(OracleRole::Plan, &system, &user).await;
            if is_error_text(&raw) {
                heuristic_plan(&env.weather, &events_text, &relationships_text)
            } else {
                raw.trim().to_string()
            }
        } else {
            heuristic_plan(&env.weather, &events_text, &relationships_text)
        };

        // Persist the plan and its side effects.
        self.ctx.gateway.update_agent_plan(agent.id, &plan)?;
        let memory = format!("I decided: {plan}");
        self.ctx.gateway.append_memory(
            agent.id,
            &memory,
            MemoryKind::Plan,
            Some(&self.ctx.embedder.embed(&memory)),
        )?;
        self.relationships
            .shift_mood(agent, &format!("Made a plan: {plan}"))
            .await?;

        let mut thought: String = plan.chars().take(THOUGHT_LIMIT).collect();
        if plan.chars().count() > THOUGHT_LIMIT {
            thought.push_str("...");
        }
        self.ctx.broadcaster.publish(&WorldUpdate::AgentThought {
            agent_id: agent.id,
            thought,
        });

        // Map the plan to a destination zone and retarget the point.
        if let Some(point_id) = agent.point_id {
            let mut rng = rand::thread_rng();
            let zone = zones::zone_for_plan(&plan, &mut rng);
            let (tx, ty) = zone.random_interior_point(&mut rng);
            debug!(agent = %agent.name, zone = zone.name, "plan destination");
            self.motion.retarget(point_id, tx, ty)?;
        }

        Ok(plan)
    }

    /// One line per known counterpart: "- Dorian: friend (sympathy: 5)".
    fn relationship_summary(&self, agent: &Agent) -> Result<String> {
        let edges = self.ctx.gateway.edges_for_agent(agent.id)?;
        let mut lines = Vec::new();
        for edge in edges.iter().filter(|e| e.from == agent.id) {
            let Some(other) = self.ctx.gateway.get_agent(edge.to)? else {
                continue;
            };
            lines.push(format!(
                "- {}: {} (sympathy: {})",
                other.name,
                sympathy::label(edge.sympathy),
                edge.sympathy
            ));
        }
        if lines.is_empty() {
            Ok("No one I know yet.".to_string())
        } else {
            Ok(lines.join("\n"))
        }
    }
}

/// Deterministic plan used when no oracle is available: a weather-keyed
/// movement line, a social line keyed on recent events and relationships,
/// and a steady closing line.
#[must_use]
pub fn heuristic_plan(weather: &str, events_text: &str, relationships_text: &str) -> String {
    let weather_line = match weather {
        "rainy" => "Keep near shelter along the road and check on the others more often.",
        "snowy" => "Move carefully, choose safe paths, and stay in touch.",
        "cloudy" => "Keep a working rhythm and watch for changes around the square.",
        "foggy" => "Slow down, double-check details, and avoid rash decisions.",
        "stormy" => "Focus on safety and keep everyone coordinated.",
        "sunny" => "Get out to the square, meet people, and keep conversations going.",
        _ => "Act calmly and take the situation as it comes.",
    };

    let events_lower = events_text.to_lowercase();
    let social_line = if events_lower.contains("hostile") || events_lower.contains("removed") {
        "Take the recent conflicts into account and rebuild contact gently."
    } else if events_lower.contains("trusting") || events_lower.contains("added") {
        "Use the new acquaintances and strengthen the useful ties."
    } else if relationships_text.to_lowercase().contains("enemy") {
        "Avoid escalation with ill-wishers and keep a neutral tone where possible."
    } else {
        "Keep up the relationships: warmer with allies, careful with difficult contacts."
    };

    let steady_line = "Stay in character, speak briefly, and react to what actually happens.";
    format!("{weather_line}\n{social_line}\n{steady_line}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Broadcaster;
    use vivarium_core::VivariumConfig;
    use vivarium_core::types::{AgentKind, Point, PointId};

    fn setup() -> (Arc<WorldContext>, PlanPhase) {
        let mut config = VivariumConfig::default();
        config.simulation.plan_fanout = 1;
        let ctx = WorldContext::offline(config).expect("ctx");
        let motion = MotionController::new(
            Arc::clone(&ctx.gateway),
            ctx.config.motion.clone(),
            Broadcaster::new(),
        );
        let phase = PlanPhase::new(Arc::clone(&ctx), motion);
        (ctx, phase)
    }

    fn spawn_with_point(ctx: &WorldContext, name: &str) -> Agent {
        let agent = ctx
            .gateway
            .insert_agent(name, AgentKind::Agent, "observant and practical")
            .expect("agent");
        let point = Point {
            id: PointId::new(),
            x: 50.0,
            y: 50.0,
            target_x: 50.0,
            target_y: 50.0,
            speed: Point::DEFAULT_SPEED,
        };
        ctx.gateway.insert_point(&point).expect("point");
        ctx.gateway.link_point(agent.id, point.id).expect("link");
        ctx.gateway.get_agent(agent.id).expect("get").expect("Some")
    }

    #[test]
    fn heuristic_plan_is_weather_keyed() {
        let sunny = heuristic_plan("sunny", "", "");
        let rainy = heuristic_plan("rainy", "", "");
        assert_ne!(sunny, rainy);
        assert!(sunny.contains("square"));
        assert!(rainy.contains("road"));
        // Three lines.
        assert_eq!(sunny.lines().count(), 3);
    }

    #[test]
    fn heuristic_plan_reacts_to_conflict_signals() {
        let plan = heuristic_plan("sunny", "- Mira grows hostile toward Dorian", "");
        assert!(plan.contains("conflicts"));

        let plan = heuristic_plan("sunny", "", "- Dorian: enemy (sympathy: -5)");
        assert!(plan.contains("escalation"));
    }

    #[tokio::test]
    async fn planning_persists_plan_memory_mood_and_target() {
        let (ctx, phase) = setup();
        let agent = spawn_with_point(&ctx, "Mira");
        let point_id = agent.point_id.expect("point");
        let (_, mut rx) = ctx.broadcaster.subscribe();

        let entries = phase.run(&[agent.clone()], 0).await;
        assert_eq!(entries.len(), 1);
        let TickEntry::Plan { plan, .. } = &entries[0] else {
            panic!("expected a plan entry: {entries:?}");
        };

        // Plan persisted on the agent.
        let stored = ctx.gateway.get_agent(agent.id).expect("get").expect("Some");
        assert_eq!(&stored.current_plan, plan);

        // A plan memory exists.
        let memories = ctx.gateway.recent_memories(agent.id, 5).expect("mem");
        assert!(memories.iter().any(|m| m.kind == MemoryKind::Plan));

        // The point target moved into a primary zone.
        let point = ctx.gateway.get_point(point_id).expect("get").expect("Some");
        assert!(
            zones::zone_at(point.target_x, point.target_y).is_some(),
            "target ({}, {}) is not inside a primary zone",
            point.target_x,
            point.target_y
        );

        // A thought bubble was broadcast.
        let mut saw_thought = false;
        while let Ok(update) = rx.try_recv() {
            if matches!(update, WorldUpdate::AgentThought { .. }) {
                saw_thought = true;
            }
        }
        assert!(saw_thought);
    }

    #[tokio::test]
    async fn fanout_selects_the_round_robin_slice() {
        let mut config = VivariumConfig::default();
        config.simulation.plan_fanout = 2;
        let ctx = WorldContext::offline(config).expect("ctx");
        let motion = MotionController::new(
            Arc::clone(&ctx.gateway),
            ctx.config.motion.clone(),
            Broadcaster::new(),
        );
        let phase = PlanPhase::new(Arc::clone(&ctx), motion);

        let agents: Vec<Agent> = (0..4)
            .map(|i| {
                ctx.gateway
                    .insert_agent(&format!("Agent{i}"), AgentKind::Agent, "")
                    .expect("agent")
            })
            .collect();

        // seq values are 1..=4; with K = 2, tick 0 picks even seqs and
        // tick 1 picks odd seqs.
        let tick0 = phase.run(&agents, 0).await;
        let tick1 = phase.run(&agents, 1).await;
        assert_eq!(tick0.len(), 2);
        assert_eq!(tick1.len(), 2);

        // Across two consecutive ticks, everyone planned exactly once.
        for agent in &agents {
            let stored = ctx.gateway.get_agent(agent.id).expect("get").expect("Some");
            assert!(!stored.current_plan.is_empty(), "{} never planned", agent.name);
        }
    }

    #[tokio::test]
    async fn mobs_are_skipped() {
        let (ctx, phase) = setup();
        let mob = ctx
            .gateway
            .insert_agent("Crow", AgentKind::Mob, "")
            .expect("mob");
        let entries = phase.run(&[mob], 0).await;
        assert!(entries.is_empty());
    }
}
