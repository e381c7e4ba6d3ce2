//! Proximity matcher — pairwise distance scan with cooldown-gated
//! dialogue selection.
//!
//! Each tick at most one chat is initiated: the first pair of
//! dialogue-capable agents within the proximity threshold whose cooldown
//! has elapsed. When no pair qualifies, one random non-cooldown pair is
//! chosen regardless of distance, so a quiet map still produces the
//! occasional exchange. A completed chat must pass the acceptance gates
//! (no sentinel lines, not a repeat of the pair's previous exchange)
//! before the cooldown is marked and anything is broadcast; rejected
//! chats leave the cooldown untouched so the pair may retry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, warn};

use vivarium_core::oracle::is_error_text;
use vivarium_core::types::{Agent, PairKey, distance};

use crate::broadcast::WorldUpdate;
use crate::context::WorldContext;
use crate::dialogue::{DialogueProtocol, normalize_for_compare};
use crate::scheduler::TickEntry;

// ---------------------------------------------------------------------------
// Cooldown map
// ---------------------------------------------------------------------------

/// In-process map from canonical agent pair to its last chat time.
/// Never persisted; a restart simply clears all cooldowns.
pub struct CooldownMap {
    window: Duration,
    last_chat: Mutex<HashMap<PairKey, Instant>>,
}

impl CooldownMap {
    /// Create a map with the given cooldown window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_chat: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the pair's cooldown has elapsed (or never chatted).
    #[must_use]
    pub fn can_chat(&self, pair: PairKey) -> bool {
        self.last_chat
            .lock()
            .get(&pair)
            .is_none_or(|last| last.elapsed() > self.window)
    }

    /// Record that the pair just chatted.
    pub fn mark(&self, pair: PairKey) {
        self.last_chat.lock().insert(pair, Instant::now());
    }

    /// Drop entries whose cooldown has already elapsed.
    pub fn purge_expired(&self) {
        self.last_chat
            .lock()
            .retain(|_, last| last.elapsed() <= self.window);
    }

    /// Remove every entry.
    pub fn invalidate(&self) {
        self.last_chat.lock().clear();
    }

    /// Number of tracked pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.last_chat.lock().len()
    }

    /// Whether no pair is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_chat.lock().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

/// Selects and runs at most one proximity chat per tick.
pub struct ProximityMatcher {
    ctx: Arc<WorldContext>,
    dialogue: DialogueProtocol,
    cooldowns: CooldownMap,
    last_exchange: Mutex<HashMap<PairKey, String>>,
}

impl ProximityMatcher {
    /// Create a matcher bound to the context.
    #[must_use]
    pub fn new(ctx: Arc<WorldContext>) -> Self {
        let window = Duration::from_secs_f64(ctx.config.simulation.chat_cooldown_seconds);
        let dialogue = DialogueProtocol::new(Arc::clone(&ctx));
        Self {
            ctx,
            dialogue,
            cooldowns: CooldownMap::new(window),
            last_exchange: Mutex::new(HashMap::new()),
        }
    }

    /// The cooldown map (exposed for status queries and tests).
    #[must_use]
    pub fn cooldowns(&self) -> &CooldownMap {
        &self.cooldowns
    }

    /// Run the proximity/dialogue phase over the current agent set.
    pub async fn run_phase(&self, agents: &[Agent]) -> Vec<TickEntry> {
        self.cooldowns.purge_expired();

        let capable: Vec<&Agent> = agents.iter().filter(|a| a.is_dialogue_capable()).collect();
        if capable.len() < 2 {
            return Vec::new();
        }
        let positions: Vec<(f64, f64)> = capable.iter().map(|a| self.position_of(a)).collect();
        let threshold = self.ctx.config.simulation.proximity_threshold;

        // Primary path: first eligible pair in scan order.
        let mut selected: Option<(usize, usize, bool)> = None;
        'scan: for i in 0..capable.len() {
            for j in (i + 1)..capable.len() {
                let pair = PairKey::new(capable[i].id, capable[j].id);
                if distance(positions[i], positions[j]) < threshold && self.cooldowns.can_chat(pair)
                {
                    selected = Some((i, j, false));
                    break 'scan;
                }
            }
        }

        // Liveliness fallback: one random non-cooldown pair, distance
        // ignored.
        if selected.is_none() {
            let mut pool = Vec::new();
            for i in 0..capable.len() {
                for j in (i + 1)..capable.len() {
                    if self.cooldowns.can_chat(PairKey::new(capable[i].id, capable[j].id)) {
                        pool.push((i, j));
                    }
                }
            }
            if !pool.is_empty() {
                let (i, j) = pool[rand::thread_rng().gen_range(0..pool.len())];
                selected = Some((i, j, true));
            }
        }

        let Some((i, j, fallback)) = selected else {
            return Vec::new();
        };
        let initiator = capable[i];
        let target = capable[j];
        debug!(
            initiator = %initiator.name,
            target = %target.name,
            fallback,
            "running proximity chat"
        );

        match self.dialogue.run(initiator, target).await {
            Ok(outcome) => self.gate_and_accept(initiator, target, outcome, fallback),
            Err(e) => {
                warn!(error = %e, "proximity chat failed");
                vec![TickEntry::ChatError {
                    error: e.to_string(),
                }]
            }
        }
    }

    /// Apply the acceptance gates to a completed exchange.
    fn gate_and_accept(
        &self,
        initiator: &Agent,
        target: &Agent,
        outcome: crate::dialogue::DialogueOutcome,
        fallback: bool,
    ) -> Vec<TickEntry> {
        let pair = PairKey::new(initiator.id, target.id);
        let participants = [initiator.name.clone(), target.name.clone()];

        if outcome.lines.iter().any(|line| is_error_text(&line.text)) {
            return vec![TickEntry::ChatRejected {
                participants,
                reason: "oracle sentinel in dialogue".to_string(),
            }];
        }

        let normalized = outcome
            .lines
            .iter()
            .map(|line| normalize_for_compare(&line.text))
            .collect::<Vec<_>>()
            .join("\n");
        if self.last_exchange.lock().get(&pair) == Some(&normalized) {
            debug!(
                initiator = %initiator.name,
                target = %target.name,
                "exchange repeats the previous one, rejecting"
            );
            return vec![TickEntry::ChatRejected {
                participants,
                reason: "identical to the pair's previous exchange".to_string(),
            }];
        }

        self.cooldowns.mark(pair);
        self.last_exchange.lock().insert(pair, normalized);

        self.ctx.broadcaster.publish(&WorldUpdate::Dialogue {
            initiator_id: initiator.id,
            initiator_name: initiator.name.clone(),
            target_id: target.id,
            target_name: target.name.clone(),
            messages: outcome.lines.clone(),
        });

        let snippet: String = outcome.lines[0].text.chars().take(50).collect();
        if let Err(e) = self.ctx.gateway.append_event(&format!(
            "{} and {} talked: \"{snippet}...\"",
            initiator.name, target.name
        )) {
            warn!(error = %e, "failed to log chat event");
        }

        vec![TickEntry::Chat {
            participants,
            lines: outcome.lines,
            fallback,
        }]
    }

    /// Current position of an agent's point; agents without a point sit
    /// at the map center.
    fn position_of(&self, agent: &Agent) -> (f64, f64) {
        agent
            .point_id
            .and_then(|id| self.ctx.gateway.get_point(id).ok().flatten())
            .map_or((50.0, 50.0), |p| (p.x, p.y))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use vivarium_core::VivariumConfig;
    use vivarium_core::types::{AgentKind, Point, PointId};

    fn ctx_with(config: VivariumConfig) -> Arc<WorldContext> {
        WorldContext::offline(config).expect("ctx")
    }

    fn place_agent(ctx: &WorldContext, name: &str, personality: &str, x: f64, y: f64) -> Agent {
        let agent = ctx
            .gateway
            .insert_agent(name, AgentKind::Agent, personality)
            .expect("agent");
        let point = Point {
            id: PointId::new(),
            x,
            y,
            target_x: x,
            target_y: y,
            speed: Point::DEFAULT_SPEED,
        };
        ctx.gateway.insert_point(&point).expect("point");
        ctx.gateway.link_point(agent.id, point.id).expect("link");
        ctx.gateway.get_agent(agent.id).expect("get").expect("Some")
    }

    #[test]
    fn cooldown_map_tracks_pairs() {
        let map = CooldownMap::new(Duration::from_secs(60));
        let pair = PairKey::new(
            vivarium_core::AgentId::new(),
            vivarium_core::AgentId::new(),
        );
        assert!(map.can_chat(pair));
        map.mark(pair);
        assert!(!map.can_chat(pair));
        assert_eq!(map.len(), 1);
        map.invalidate();
        assert!(map.can_chat(pair));
    }

    #[test]
    fn cooldown_purge_drops_elapsed_entries() {
        let map = CooldownMap::new(Duration::from_millis(0));
        let pair = PairKey::new(
            vivarium_core::AgentId::new(),
            vivarium_core::AgentId::new(),
        );
        map.mark(pair);
        std::thread::sleep(Duration::from_millis(2));
        map.purge_expired();
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn distant_pair_is_only_reachable_via_fallback() {
        // (10,10) and (90,90): distance ≈ 113, far beyond the threshold.
        let ctx = ctx_with(VivariumConfig::default());
        let matcher = ProximityMatcher::new(Arc::clone(&ctx));
        let a = place_agent(&ctx, "Mira", "observant", 10.0, 10.0);
        let b = place_agent(&ctx, "Dorian", "disciplined", 90.0, 90.0);

        let entries = matcher.run_phase(&[a, b]).await;
        assert_eq!(entries.len(), 1);
        match &entries[0] {
            TickEntry::Chat { fallback, .. } => {
                assert!(*fallback, "distant pair must come from the fallback path");
            }
            other => panic!("expected a chat entry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn near_pair_is_proximity_selected_and_cooldown_blocks_repeat() {
        let ctx = ctx_with(VivariumConfig::default());
        let matcher = ProximityMatcher::new(Arc::clone(&ctx));
        let a = place_agent(&ctx, "Mira", "observant", 50.0, 50.0);
        let b = place_agent(&ctx, "Dorian", "disciplined", 55.0, 52.0);

        let entries = matcher.run_phase(&[a.clone(), b.clone()]).await;
        assert!(matches!(
            entries[0],
            TickEntry::Chat { fallback: false, .. }
        ));

        // The pair is on cooldown now; with no other pair available the
        // phase goes quiet.
        let entries = matcher.run_phase(&[a, b]).await;
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn repeated_exchange_is_rejected_without_cooldown_mark() {
        // Cooldown of zero so the pair is immediately eligible again; with
        // the oracle disabled both runs produce identical fallback lines.
        let mut config = VivariumConfig::default();
        config.simulation.chat_cooldown_seconds = 0.0;
        let ctx = ctx_with(config);
        let matcher = ProximityMatcher::new(Arc::clone(&ctx));
        let a = place_agent(&ctx, "Mira", "observant", 50.0, 50.0);
        let b = place_agent(&ctx, "Dorian", "disciplined", 55.0, 52.0);
        let (_, mut rx) = ctx.broadcaster.subscribe();

        let first = matcher.run_phase(&[a.clone(), b.clone()]).await;
        assert!(matches!(first[0], TickEntry::Chat { .. }));

        let second = matcher.run_phase(&[a, b]).await;
        assert!(
            matches!(second[0], TickEntry::ChatRejected { .. }),
            "identical exchange must be rejected: {second:?}"
        );

        // Exactly one dialogue broadcast reached the observer.
        let mut dialogues = 0;
        while let Ok(update) = rx.try_recv() {
            if matches!(update, WorldUpdate::Dialogue { .. }) {
                dialogues += 1;
            }
        }
        assert_eq!(dialogues, 1);
    }

    #[tokio::test]
    async fn mobs_never_chat() {
        let ctx = ctx_with(VivariumConfig::default());
        let matcher = ProximityMatcher::new(Arc::clone(&ctx));
        let a = place_agent(&ctx, "Mira", "observant", 50.0, 50.0);
        let mob = ctx
            .gateway
            .insert_agent("Crow", AgentKind::Mob, "")
            .expect("mob");

        let entries = matcher.run_phase(&[a, mob]).await;
        assert!(entries.is_empty());
    }
}
