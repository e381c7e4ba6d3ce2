//! Memory compaction — periodic summarisation of episodic logs.
//!
//! Memory is append-only and unbounded, so the scheduler periodically
//! compacts it: once an agent carries more episodes than the retention
//! threshold, the oldest ones beyond `keep_recent` are purged and one
//! summary entry takes their place. The summary comes from the oracle
//! when one is available and from a deterministic digest otherwise.

use std::sync::Arc;

use tracing::{debug, warn};

use vivarium_core::error::Result;
use vivarium_core::memory::{MemoryKind, SUMMARY_PREFIX};
use vivarium_core::oracle::{OracleRole, is_error_text};
use vivarium_core::types::Agent;

use vivarium_llm::prompt;

use crate::context::WorldContext;
use crate::scheduler::TickEntry;

/// Runs the periodic compaction pass.
pub struct MemoryCompactor {
    ctx: Arc<WorldContext>,
}

impl MemoryCompactor {
    /// Create a compactor bound to the context.
    #[must_use]
    pub fn new(ctx: Arc<WorldContext>) -> Self {
        Self { ctx }
    }

    /// Compact every agent over the retention threshold. Failures are
    /// isolated per agent.
    pub async fn run(&self, agents: &[Agent]) -> Vec<TickEntry> {
        let mut entries = Vec::new();
        for agent in agents {
            match self.compact_agent(agent).await {
                Ok(Some(purged)) => entries.push(TickEntry::Compaction {
                    agent_id: agent.id,
                    purged,
                }),
                Ok(None) => {}
                Err(e) => {
                    warn!(agent = %agent.name, error = %e, "memory compaction failed");
                    entries.push(TickEntry::CompactionError {
                        agent_id: agent.id,
                        error: e.to_string(),
                    });
                }
            }
        }
        entries
    }

    /// Compact one agent if it exceeds the retention threshold. Returns
    /// the number of purged episodes, or `None` when nothing was done.
    async fn compact_agent(&self, agent: &Agent) -> Result<Option<usize>> {
        let memory_config = &self.ctx.config.memory;
        let count = self.ctx.gateway.count_episodes(agent.id)?;
        if count <= memory_config.episode_retention {
            return Ok(None);
        }

        let window = self
            .ctx
            .gateway
            .recent_memories(agent.id, memory_config.summary_window)?;
        let summary = self.summarize(agent, &window).await;

        let purged = self
            .ctx
            .gateway
            .purge_old_episodes(agent.id, memory_config.keep_recent)?;
        let text = format!("{SUMMARY_PREFIX} {summary}");
        self.ctx.gateway.append_memory(
            agent.id,
            &text,
            MemoryKind::Summary,
            Some(&self.ctx.embedder.embed(&text)),
        )?;

        debug!(agent = %agent.name, purged, "episodic memory compacted");
        Ok(Some(purged))
    }

    /// Produce the summary text: oracle when available, deterministic
    /// digest of the most recent entries otherwise.
    async fn summarize(&self, agent: &Agent, window: &[vivarium_core::memory::MemoryEntry]) -> String {
        if self.ctx.oracle.is_enabled() {
            let memories_text = window
                .iter()
                .map(|m| format!("- {}", m.text))
                .collect::<Vec<_>>()
                .join("\n");
            let user = prompt::render_template(
                prompt::SUMMARIZE_USER,
                &[("name", &agent.name), ("memories", &memories_text)],
            );
            let raw = self
                .ctx
                .oracle
                .invoke(OracleRole::Summary, "You condense diaries into short summaries.", &user)
                .await;
            if !is_error_text(&raw) {
                return raw.trim().to_string();
            }
        }
        digest(window)
    }
}

/// Deterministic fallback summary: the most recent few entries, trimmed.
fn digest(window: &[vivarium_core::memory::MemoryEntry]) -> String {
    if window.is_empty() {
        return "Nothing worth keeping from the last stretch.".to_string();
    }
    let highlights = window
        .iter()
        .take(5)
        .map(|m| {
            let mut text: String = m.text.chars().take(60).collect();
            if m.text.chars().count() > 60 {
                text.push_str("...");
            }
            text
        })
        .collect::<Vec<_>>()
        .join("; ");
    format!("Lately: {highlights}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use vivarium_core::VivariumConfig;
    use vivarium_core::types::AgentKind;

    #[tokio::test]
    async fn under_threshold_is_untouched() {
        let ctx = WorldContext::offline(VivariumConfig::default()).expect("ctx");
        let compactor = MemoryCompactor::new(Arc::clone(&ctx));
        let agent = ctx
            .gateway
            .insert_agent("Mira", AgentKind::Agent, "")
            .expect("agent");
        for i in 0..10 {
            ctx.gateway
                .append_memory(agent.id, &format!("episode {i}"), MemoryKind::Episode, None)
                .expect("append");
        }

        let entries = compactor.run(&[agent.clone()]).await;
        assert!(entries.is_empty());
        assert_eq!(ctx.gateway.count_episodes(agent.id).expect("count"), 10);
    }

    #[tokio::test]
    async fn over_threshold_purges_and_summarizes() {
        let mut config = VivariumConfig::default();
        config.memory.episode_retention = 20;
        config.memory.keep_recent = 5;
        let ctx = WorldContext::offline(config).expect("ctx");
        let compactor = MemoryCompactor::new(Arc::clone(&ctx));
        let agent = ctx
            .gateway
            .insert_agent("Mira", AgentKind::Agent, "")
            .expect("agent");
        for i in 0..30 {
            ctx.gateway
                .append_memory(agent.id, &format!("episode {i}"), MemoryKind::Episode, None)
                .expect("append");
        }

        let entries = compactor.run(&[agent.clone()]).await;
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0], TickEntry::Compaction { purged: 25, .. }));

        assert_eq!(ctx.gateway.count_episodes(agent.id).expect("count"), 5);
        let newest = ctx.gateway.recent_memories(agent.id, 1).expect("recent");
        assert_eq!(newest[0].kind, MemoryKind::Summary);
        assert!(newest[0].text.starts_with(SUMMARY_PREFIX));
        // The summary carries a searchable vector.
        assert!(newest[0].embedding.is_some());
    }

    #[test]
    fn digest_is_bounded_and_deterministic() {
        assert!(digest(&[]).contains("Nothing"));
    }
}
