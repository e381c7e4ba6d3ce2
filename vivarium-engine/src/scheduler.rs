//! Tick scheduler — paces the simulation and owns its lifecycle.
//!
//! One cooperative loop drives every tick in a fixed order: plan phase
//! (round-robin slice), proximity/dialogue phase, periodic relationship
//! drift, periodic memory compaction, then a full-snapshot broadcast.
//! Tick failures are caught, logged, and surfaced through the status
//! query; the loop itself never dies. Stopping cancels the pending sleep
//! and awaits clean termination; already-dispatched oracle calls finish
//! on the worker pool and their results are discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vivarium_core::error::Result;
use vivarium_core::types::AgentId;

use crate::broadcast::{AgentView, DialogueLine, WorldUpdate};
use crate::compaction::MemoryCompactor;
use crate::context::WorldContext;
use crate::motion::MotionController;
use crate::plan::PlanPhase;
use crate::proximity::ProximityMatcher;
use crate::relationship::RelationshipUpdater;

/// One entry of a tick's result set. Failures are inline entries, so one
/// agent or pair failing never hides the rest of the tick.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TickEntry {
    /// An agent produced a plan.
    Plan {
        /// The agent.
        agent_id: AgentId,
        /// Its name.
        agent_name: String,
        /// The plan text.
        plan: String,
    },
    /// Plan generation failed for one agent.
    PlanError {
        /// The agent.
        agent_id: AgentId,
        /// Its name.
        agent_name: String,
        /// The failure.
        error: String,
    },
    /// An accepted chat.
    Chat {
        /// Both participant names, initiator first.
        participants: [String; 2],
        /// The exchanged lines.
        lines: Vec<DialogueLine>,
        /// Whether the pair came from the random liveliness fallback
        /// rather than the proximity scan.
        fallback: bool,
    },
    /// A completed chat that failed the acceptance gates.
    ChatRejected {
        /// Both participant names.
        participants: [String; 2],
        /// Why it was rejected.
        reason: String,
    },
    /// The chat attempt itself failed.
    ChatError {
        /// The failure.
        error: String,
    },
    /// A relationship drift pass ran.
    Drift {
        /// How many edges moved toward zero.
        edges_changed: usize,
    },
    /// An agent's episodic memory was compacted.
    Compaction {
        /// The agent.
        agent_id: AgentId,
        /// Purged episode count.
        purged: usize,
    },
    /// Compaction failed for one agent.
    CompactionError {
        /// The agent.
        agent_id: AgentId,
        /// The failure.
        error: String,
    },
}

/// Snapshot of the scheduler's state for status queries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStatus {
    /// Whether the loop is running.
    pub running: bool,
    /// Ticks completed so far.
    pub tick_index: u64,
    /// The most recent tick-level error, if any.
    pub last_error: Option<String>,
    /// The result set of the most recent tick.
    pub last_results: Vec<TickEntry>,
}

struct SchedulerInner {
    ctx: Arc<WorldContext>,
    plan: PlanPhase,
    proximity: ProximityMatcher,
    relationships: RelationshipUpdater,
    compactor: MemoryCompactor,
    running: AtomicBool,
    tick_index: AtomicU64,
    interval_ms: AtomicU64,
    last_error: Mutex<Option<String>>,
    last_results: Mutex<Vec<TickEntry>>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// The tick-driven simulation scheduler.
#[derive(Clone)]
pub struct TickScheduler {
    inner: Arc<SchedulerInner>,
}

impl TickScheduler {
    /// Build the scheduler and its phases.
    #[must_use]
    pub fn new(ctx: Arc<WorldContext>, motion: MotionController) -> Self {
        let plan = PlanPhase::new(Arc::clone(&ctx), motion);
        let proximity = ProximityMatcher::new(Arc::clone(&ctx));
        let relationships = RelationshipUpdater::new(Arc::clone(&ctx));
        let compactor = MemoryCompactor::new(Arc::clone(&ctx));

        let scheduler = Self {
            inner: Arc::new(SchedulerInner {
                plan,
                proximity,
                relationships,
                compactor,
                running: AtomicBool::new(false),
                tick_index: AtomicU64::new(0),
                interval_ms: AtomicU64::new(0),
                last_error: Mutex::new(None),
                last_results: Mutex::new(Vec::new()),
                stop_tx: Mutex::new(None),
                task: Mutex::new(None),
                ctx,
            }),
        };
        let speed = scheduler.inner.ctx.config.simulation.speed;
        scheduler.set_speed(speed);
        scheduler
    }

    /// Change the tick pace: `interval = base / speed`, clamped to the
    /// configured minimum. Takes effect after the current sleep.
    pub fn set_speed(&self, speed: f64) {
        let sim = &self.inner.ctx.config.simulation;
        let speed = speed.clamp(0.1, 10.0);
        let seconds = (sim.base_tick_seconds / speed).max(sim.min_tick_seconds);
        self.inner
            .interval_ms
            .store((seconds * 1000.0) as u64, Ordering::Relaxed);
        debug!(speed, interval_s = seconds, "tick interval updated");
    }

    /// Current tick interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.inner.interval_ms.load(Ordering::Relaxed))
    }

    /// Whether the loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.is_running(),
            tick_index: self.inner.tick_index.load(Ordering::SeqCst),
            last_error: self.inner.last_error.lock().clone(),
            last_results: self.inner.last_results.lock().clone(),
        }
    }

    /// Start the loop. Idempotent: a second call while running is a
    /// no-op.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("scheduler already running");
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        *self.inner.stop_tx.lock() = Some(stop_tx);
        let scheduler = self.clone();
        let task = tokio::spawn(async move { scheduler.run_loop(stop_rx).await });
        *self.inner.task.lock() = Some(task);
        info!("tick scheduler started");
    }

    /// Stop the loop: cancels the pending sleep and awaits termination.
    pub async fn stop(&self) {
        let stop_tx = self.inner.stop_tx.lock().take();
        if let Some(tx) = stop_tx {
            let _ = tx.send(true);
        }
        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.inner.running.store(false, Ordering::SeqCst);
        info!("tick scheduler stopped");
    }

    async fn run_loop(self, mut stop_rx: watch::Receiver<bool>) {
        loop {
            match self.run_tick().await {
                Ok(entries) => {
                    debug!(entries = entries.len(), "tick completed");
                }
                Err(e) => {
                    warn!(error = %e, "tick failed");
                    *self.inner.last_error.lock() = Some(e.to_string());
                }
            }

            let interval = self.interval();
            tokio::select! {
                _ = stop_rx.changed() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }
        self.inner.running.store(false, Ordering::SeqCst);
    }

    /// Run exactly one tick: plan, proximity/dialogue, periodic drift and
    /// compaction, then the snapshot broadcast. Also the entry point for
    /// tests that drive ticks by hand.
    ///
    /// # Errors
    ///
    /// Returns tick-level errors (e.g. the agent list being unreadable);
    /// per-agent and per-pair failures are inline entries instead.
    pub async fn run_tick(&self) -> Result<Vec<TickEntry>> {
        let inner = &self.inner;
        let tick = inner.tick_index.fetch_add(1, Ordering::SeqCst);
        let sim = &inner.ctx.config.simulation;

        let agents = inner.ctx.gateway.list_agents()?;
        if agents.is_empty() {
            inner.last_results.lock().clear();
            return Ok(Vec::new());
        }

        let mut entries = inner.plan.run(&agents, tick).await;

        // Plans changed positions and moods; scan fresh state.
        let agents = inner.ctx.gateway.list_agents()?;
        entries.extend(inner.proximity.run_phase(&agents).await);

        if tick > 0 && sim.drift_interval_ticks > 0 && tick % sim.drift_interval_ticks == 0 {
            match inner.relationships.run_drift() {
                Ok(edges_changed) if edges_changed > 0 => {
                    entries.push(TickEntry::Drift { edges_changed });
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "relationship drift failed"),
            }
        }

        if tick > 0
            && sim.compaction_interval_ticks > 0
            && tick % sim.compaction_interval_ticks == 0
        {
            entries.extend(inner.compactor.run(&agents).await);
        }

        let agents = inner.ctx.gateway.list_agents()?;
        inner.ctx.broadcaster.publish(&WorldUpdate::AgentsSnapshot {
            agents: agents.iter().map(AgentView::from).collect(),
        });

        *inner.last_results.lock() = entries.clone();
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
