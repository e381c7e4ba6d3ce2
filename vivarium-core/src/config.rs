//! Configuration for the Vivarium simulation.
//!
//! Maps directly to `vivarium.toml`; every field has a serde default so a
//! partial file (or none at all) yields a runnable world.

use serde::{Deserialize, Serialize};

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VivariumConfig {
    /// Tick scheduler and interaction pacing.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Motion integrator settings.
    #[serde(default)]
    pub motion: MotionConfig,
    /// Memory retrieval settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Memory retention and compaction.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Behavior oracle integration.
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Persistence settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl VivariumConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns [`crate::VivariumError::Config`] if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::VivariumError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Tick scheduler pacing and interaction gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Base tick interval in seconds at speed 1.0.
    #[serde(default = "default_base_tick")]
    pub base_tick_seconds: f64,
    /// Floor for the derived tick interval, whatever the speed.
    #[serde(default = "default_min_tick")]
    pub min_tick_seconds: f64,
    /// Initial speed multiplier (interval = base / speed).
    #[serde(default = "default_1_0")]
    pub speed: f64,
    /// Proximity threshold for auto-chat, in percent units.
    #[serde(default = "default_proximity")]
    pub proximity_threshold: f64,
    /// Minimum seconds before the same pair may auto-chat again.
    #[serde(default = "default_cooldown")]
    pub chat_cooldown_seconds: f64,
    /// Planning fan-out divisor K: an agent plans when
    /// `tick % K == seq % K`.
    #[serde(default = "default_fanout")]
    pub plan_fanout: u64,
    /// Relationship drift runs every this many ticks.
    #[serde(default = "default_drift_interval")]
    pub drift_interval_ticks: u64,
    /// Memory compaction runs every this many ticks.
    #[serde(default = "default_compaction_interval")]
    pub compaction_interval_ticks: u64,
    /// Most-recent-first world event window fed to the planner.
    #[serde(default = "default_event_window")]
    pub event_window: usize,
    /// Attempts per dialogue line before the canned fallback is used.
    #[serde(default = "default_dialogue_attempts")]
    pub dialogue_attempts: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            base_tick_seconds: 30.0,
            min_tick_seconds: 5.0,
            speed: 1.0,
            proximity_threshold: 20.0,
            chat_cooldown_seconds: 60.0,
            plan_fanout: 4,
            drift_interval_ticks: 20,
            compaction_interval_ticks: 50,
            event_window: 5,
            dialogue_attempts: 3,
        }
    }
}

/// Motion integrator pacing and geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Motion step interval in milliseconds.
    #[serde(default = "default_motion_tick_ms")]
    pub tick_ms: u64,
    /// A point within this distance of its target has "arrived".
    #[serde(default = "default_arrive_radius")]
    pub arrive_radius: f64,
    /// Wander radius for agent-owned points.
    #[serde(default = "default_agent_radius")]
    pub agent_wander_radius: f64,
    /// Wander radius for free (unowned) points.
    #[serde(default = "default_free_radius")]
    pub free_wander_radius: f64,
    /// Positions are persisted only when they moved more than this.
    #[serde(default = "default_deadband")]
    pub write_deadband: f64,
    /// A position-changed update is broadcast every this many steps.
    #[serde(default = "default_broadcast_stride")]
    pub broadcast_stride: u64,
    /// The point→agent owner map is refreshed every this many steps.
    #[serde(default = "default_owner_refresh_stride")]
    pub owner_refresh_stride: u64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            arrive_radius: 0.5,
            agent_wander_radius: 2.8,
            free_wander_radius: 4.2,
            write_deadband: 0.1,
            broadcast_stride: 10,
            owner_refresh_stride: 300,
        }
    }
}

/// Memory retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of memories retrieved per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Embedding vector dimensions.
    #[serde(default = "default_dimensions")]
    pub embedding_dimensions: usize,
    /// Capacity of the per-process embedding LRU cache.
    #[serde(default = "default_cache_capacity")]
    pub embedding_cache_capacity: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            embedding_dimensions: 128,
            embedding_cache_capacity: 1024,
        }
    }
}

/// Memory retention and compaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Compaction triggers once an agent has more episodes than this.
    #[serde(default = "default_retention")]
    pub episode_retention: usize,
    /// Episodes kept (most recent first) when compaction purges the rest.
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,
    /// At most this many memories are fed into a summary.
    #[serde(default = "default_summary_window")]
    pub summary_window: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            episode_retention: 50,
            keep_recent: 10,
            summary_window: 30,
        }
    }
}

/// Behavior oracle integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Provider: "ollama", "openai", "none".
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Base URL for the oracle API.
    #[serde(default = "default_oracle_url")]
    pub base_url: String,
    /// API key for OpenAI-compatible backends.
    #[serde(default)]
    pub api_key: String,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Hard timeout per request in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Retries before a request is reported as failed.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Maximum queued oracle requests before new ones are dropped.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// Concurrent worker tasks draining the queue.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Use the oracle-backed affect analyzer instead of the lexical one.
    #[serde(default)]
    pub oracle_affect: bool,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: "none".to_string(),
            base_url: "http://localhost:11434".to_string(),
            api_key: String::new(),
            model: "qwen2.5:1.5b".to_string(),
            request_timeout_ms: 25_000,
            max_retries: 2,
            temperature: 0.7,
            max_tokens: 700,
            queue_size: 64,
            workers: 2,
            oracle_affect: false,
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: "vivarium.db".to_string(),
            wal_mode: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_provider() -> String { "none".to_string() }
fn default_oracle_url() -> String { "http://localhost:11434".to_string() }
fn default_model() -> String { "qwen2.5:1.5b".to_string() }
fn default_db_path() -> String { "vivarium.db".to_string() }
fn default_1_0() -> f64 { 1.0 }
fn default_base_tick() -> f64 { 30.0 }
fn default_min_tick() -> f64 { 5.0 }
fn default_proximity() -> f64 { 20.0 }
fn default_cooldown() -> f64 { 60.0 }
fn default_arrive_radius() -> f64 { 0.5 }
fn default_agent_radius() -> f64 { 2.8 }
fn default_free_radius() -> f64 { 4.2 }
fn default_deadband() -> f64 { 0.1 }
fn default_temperature() -> f32 { 0.7 }
fn default_fanout() -> u64 { 4 }
fn default_drift_interval() -> u64 { 20 }
fn default_compaction_interval() -> u64 { 50 }
fn default_broadcast_stride() -> u64 { 10 }
fn default_owner_refresh_stride() -> u64 { 300 }
fn default_motion_tick_ms() -> u64 { 50 }
fn default_timeout_ms() -> u64 { 25_000 }
fn default_retries() -> u32 { 2 }
fn default_max_tokens() -> u32 { 700 }
fn default_dialogue_attempts() -> u32 { 3 }
fn default_event_window() -> usize { 5 }
fn default_top_k() -> usize { 5 }
fn default_dimensions() -> usize { 128 }
fn default_cache_capacity() -> usize { 1024 }
fn default_retention() -> usize { 50 }
fn default_keep_recent() -> usize { 10 }
fn default_summary_window() -> usize { 30 }
fn default_queue_size() -> usize { 64 }
fn default_workers() -> usize { 2 }

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
