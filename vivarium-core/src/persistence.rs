//! SQLite persistence gateway for the Vivarium world.
//!
//! One database holds agents, points, relationships, memories (with their
//! embedding vectors as bincode BLOBs), the world event log, and the
//! environment singleton:
//!
//! ```sql
//! agents        (id TEXT PK, name, kind, personality, mood, current_plan,
//!                point_id, created_at)
//! points        (id TEXT PK, x, y, target_x, target_y, speed, updated_at)
//! relationships (agent_from, agent_to, sympathy, PK (agent_from, agent_to))
//! memories      (id INTEGER PK, agent_id, content, kind, vector BLOB,
//!                created_at)
//! events        (id INTEGER PK, content, created_at)
//! environment   (id INTEGER PK CHECK (id = 1), weather, time_speed)
//! ```
//!
//! The gateway is shared by the tick loop and the motion loop; a mutex
//! serialises access at statement/transaction granularity, and overlapping
//! writers interleave last-writer-wins. WAL mode keeps readers cheap.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PersistenceConfig;
use crate::embedding::Embedding;
use crate::error::{Result, VivariumError};
use crate::memory::{MemoryEntry, MemoryKind};
use crate::mood::Mood;
use crate::types::{
    Agent, AgentId, AgentKind, Environment, Point, PointId, RelationshipEdge, WorldEventRecord,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS agents (
        id           TEXT PRIMARY KEY,
        name         TEXT NOT NULL,
        kind         TEXT NOT NULL DEFAULT 'agent',
        personality  TEXT NOT NULL DEFAULT '',
        mood         TEXT NOT NULL,
        current_plan TEXT NOT NULL DEFAULT '',
        point_id     TEXT,
        created_at   TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS points (
        id         TEXT PRIMARY KEY,
        x          REAL NOT NULL,
        y          REAL NOT NULL,
        target_x   REAL NOT NULL,
        target_y   REAL NOT NULL,
        speed      REAL NOT NULL DEFAULT 1.5,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS relationships (
        agent_from TEXT NOT NULL,
        agent_to   TEXT NOT NULL,
        sympathy   INTEGER NOT NULL CHECK (sympathy >= -10 AND sympathy <= 10),
        PRIMARY KEY (agent_from, agent_to)
    );
    CREATE TABLE IF NOT EXISTS memories (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        agent_id   TEXT NOT NULL,
        content    TEXT NOT NULL,
        kind       TEXT NOT NULL DEFAULT 'episode',
        vector     BLOB,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_memories_agent ON memories (agent_id, kind);
    CREATE TABLE IF NOT EXISTS events (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        content    TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS environment (
        id         INTEGER PRIMARY KEY CHECK (id = 1),
        weather    TEXT NOT NULL DEFAULT 'sunny',
        time_speed REAL NOT NULL DEFAULT 1.0,
        updated_at TEXT NOT NULL
    );
";

/// Handle to the open world database.
pub struct PersistenceGateway {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl std::fmt::Debug for PersistenceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceGateway")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl PersistenceGateway {
    /// Open (or create) the world database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&db_path, flags)?;
        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "world database opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Open an in-memory database (tests).
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path to the database file (or `:memory:`).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ------------------------------------------------------------------
    // Agents
    // ------------------------------------------------------------------

    /// Insert a new agent with the default mood and no plan.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures.
    pub fn insert_agent(
        &self,
        name: &str,
        kind: AgentKind,
        personality: &str,
    ) -> Result<Agent> {
        let id = AgentId::new();
        let now = Utc::now();
        let mood = Mood::DEFAULT;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO agents (id, name, kind, personality, mood, current_plan, point_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, '', NULL, ?6)",
            params![
                id.0.to_string(),
                name,
                kind.as_str(),
                personality,
                mood.to_json(),
                now.to_rfc3339()
            ],
        )?;
        let seq = conn.last_insert_rowid();
        debug!(agent = %id, name, seq, "agent inserted");

        Ok(Agent {
            id,
            seq,
            name: name.to_string(),
            kind,
            personality: personality.to_string(),
            mood,
            current_plan: String::new(),
            point_id: None,
            created_at: now,
        })
    }

    /// Fetch one agent.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures.
    pub fn get_agent(&self, id: AgentId) -> Result<Option<Agent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT rowid, id, name, kind, personality, mood, current_plan, point_id, created_at
             FROM agents WHERE id = ?1",
        )?;
        let agent = stmt
            .query_row(params![id.0.to_string()], row_to_agent)
            .optional()?;
        Ok(agent)
    }

    /// All agents, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures.
    pub fn list_agents(&self) -> Result<Vec<Agent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT rowid, id, name, kind, personality, mood, current_plan, point_id, created_at
             FROM agents ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], row_to_agent)?;
        Ok(rows.filter_map(rusqlite::Result::ok).collect())
    }

    /// Overwrite an agent's mood.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::AgentNotFound`] if no row matched.
    pub fn update_agent_mood(&self, id: AgentId, mood: &Mood) -> Result<()> {
        let changed = self.conn.lock().execute(
            "UPDATE agents SET mood = ?2 WHERE id = ?1",
            params![id.0.to_string(), mood.to_json()],
        )?;
        if changed == 0 {
            return Err(VivariumError::AgentNotFound(id));
        }
        Ok(())
    }

    /// Overwrite an agent's current plan.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::AgentNotFound`] if no row matched.
    pub fn update_agent_plan(&self, id: AgentId, plan: &str) -> Result<()> {
        let changed = self.conn.lock().execute(
            "UPDATE agents SET current_plan = ?2 WHERE id = ?1",
            params![id.0.to_string(), plan],
        )?;
        if changed == 0 {
            return Err(VivariumError::AgentNotFound(id));
        }
        Ok(())
    }

    /// Link an agent to its point.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::AgentNotFound`] if no row matched.
    pub fn link_point(&self, id: AgentId, point_id: PointId) -> Result<()> {
        let changed = self.conn.lock().execute(
            "UPDATE agents SET point_id = ?2 WHERE id = ?1",
            params![id.0.to_string(), point_id.0.to_string()],
        )?;
        if changed == 0 {
            return Err(VivariumError::AgentNotFound(id));
        }
        Ok(())
    }

    /// Delete an agent and everything hanging off it: its point, its
    /// memories, and both directions of its relationship edges.
    ///
    /// Returns `true` if the agent existed.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures.
    pub fn delete_agent(&self, id: AgentId) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let id_str = id.0.to_string();

        let point_id: Option<String> = tx
            .query_row(
                "SELECT point_id FROM agents WHERE id = ?1",
                params![id_str],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        if let Some(point_id) = point_id {
            tx.execute("DELETE FROM points WHERE id = ?1", params![point_id])?;
        }
        tx.execute("DELETE FROM memories WHERE agent_id = ?1", params![id_str])?;
        tx.execute(
            "DELETE FROM relationships WHERE agent_from = ?1 OR agent_to = ?1",
            params![id_str],
        )?;
        let deleted = tx.execute("DELETE FROM agents WHERE id = ?1", params![id_str])?;
        tx.commit()?;

        Ok(deleted > 0)
    }

    // ------------------------------------------------------------------
    // Points
    // ------------------------------------------------------------------

    /// Insert a point row.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures.
    pub fn insert_point(&self, point: &Point) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO points (id, x, y, target_x, target_y, speed, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                point.id.0.to_string(),
                point.x,
                point.y,
                point.target_x,
                point.target_y,
                point.speed,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Fetch one point.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures.
    pub fn get_point(&self, id: PointId) -> Result<Option<Point>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, x, y, target_x, target_y, speed FROM points WHERE id = ?1",
        )?;
        let point = stmt
            .query_row(params![id.0.to_string()], row_to_point)
            .optional()?;
        Ok(point)
    }

    /// All points.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures.
    pub fn list_points(&self) -> Result<Vec<Point>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT id, x, y, target_x, target_y, speed FROM points")?;
        let rows = stmt.query_map([], row_to_point)?;
        Ok(rows.filter_map(rusqlite::Result::ok).collect())
    }

    /// Persist a point's position and target.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::PointNotFound`] if no row matched.
    pub fn update_point_position(
        &self,
        id: PointId,
        x: f64,
        y: f64,
        target_x: f64,
        target_y: f64,
    ) -> Result<()> {
        let changed = self.conn.lock().execute(
            "UPDATE points SET x = ?2, y = ?3, target_x = ?4, target_y = ?5, updated_at = ?6
             WHERE id = ?1",
            params![
                id.0.to_string(),
                x,
                y,
                target_x,
                target_y,
                Utc::now().to_rfc3339()
            ],
        )?;
        if changed == 0 {
            return Err(VivariumError::PointNotFound(id));
        }
        Ok(())
    }

    /// Persist only a point's target (plan-driven retarget).
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::PointNotFound`] if no row matched.
    pub fn update_point_target(&self, id: PointId, target_x: f64, target_y: f64) -> Result<()> {
        let changed = self.conn.lock().execute(
            "UPDATE points SET target_x = ?2, target_y = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                id.0.to_string(),
                target_x,
                target_y,
                Utc::now().to_rfc3339()
            ],
        )?;
        if changed == 0 {
            return Err(VivariumError::PointNotFound(id));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Relationships
    // ------------------------------------------------------------------

    /// Sympathy of the directed edge `from → to` (0 when no edge exists).
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures.
    pub fn sympathy_between(&self, from: AgentId, to: AgentId) -> Result<i32> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT sympathy FROM relationships WHERE agent_from = ?1 AND agent_to = ?2",
        )?;
        let value = stmt
            .query_row(params![from.0.to_string(), to.0.to_string()], |row| {
                row.get::<_, i32>(0)
            })
            .optional()?;
        Ok(value.unwrap_or(0))
    }

    /// Create or overwrite the directed edge `from → to`.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures (including
    /// the CHECK violation for out-of-range values).
    pub fn upsert_sympathy(&self, from: AgentId, to: AgentId, sympathy: i32) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO relationships (agent_from, agent_to, sympathy)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(agent_from, agent_to) DO UPDATE SET sympathy = excluded.sympathy",
            params![from.0.to_string(), to.0.to_string(), sympathy],
        )?;
        Ok(())
    }

    /// Every edge touching the given agent, in either direction.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures.
    pub fn edges_for_agent(&self, id: AgentId) -> Result<Vec<RelationshipEdge>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT agent_from, agent_to, sympathy FROM relationships
             WHERE agent_from = ?1 OR agent_to = ?1",
        )?;
        let rows = stmt.query_map(params![id.0.to_string()], row_to_edge)?;
        Ok(rows.filter_map(rusqlite::Result::ok).flatten().collect())
    }

    /// Every edge in the world.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures.
    pub fn all_edges(&self) -> Result<Vec<RelationshipEdge>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT agent_from, agent_to, sympathy FROM relationships")?;
        let rows = stmt.query_map([], row_to_edge)?;
        Ok(rows.filter_map(rusqlite::Result::ok).flatten().collect())
    }

    // ------------------------------------------------------------------
    // Memories
    // ------------------------------------------------------------------

    /// Append a memory row, optionally with its embedding vector.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Serialization`] if the vector cannot be
    /// encoded, or [`VivariumError::Database`] on SQLite failures.
    pub fn append_memory(
        &self,
        agent_id: AgentId,
        text: &str,
        kind: MemoryKind,
        embedding: Option<&Embedding>,
    ) -> Result<i64> {
        let blob = match embedding {
            Some(vector) => Some(
                bincode::serialize(vector)
                    .map_err(|e| VivariumError::Serialization(e.to_string()))?,
            ),
            None => None,
        };
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO memories (agent_id, content, kind, vector, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                agent_id.0.to_string(),
                text,
                kind.as_str(),
                blob,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The agent's most recent memories, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures.
    pub fn recent_memories(&self, agent_id: AgentId, limit: usize) -> Result<Vec<MemoryEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, agent_id, content, kind, vector, created_at FROM memories
             WHERE agent_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![agent_id.0.to_string(), limit as i64], row_to_memory)?;
        Ok(rows.filter_map(rusqlite::Result::ok).flatten().collect())
    }

    /// Every memory of the agent that has a stored vector (retrieval scan).
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures.
    pub fn memories_with_vectors(&self, agent_id: AgentId) -> Result<Vec<MemoryEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, agent_id, content, kind, vector, created_at FROM memories
             WHERE agent_id = ?1 AND vector IS NOT NULL",
        )?;
        let rows = stmt.query_map(params![agent_id.0.to_string()], row_to_memory)?;
        Ok(rows.filter_map(rusqlite::Result::ok).flatten().collect())
    }

    /// Number of stored episodes for the agent.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures.
    pub fn count_episodes(&self, agent_id: AgentId) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE agent_id = ?1 AND kind = 'episode'",
            params![agent_id.0.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Delete the agent's episodes except the `keep_last` most recent.
    ///
    /// Returns the number of purged rows. Other memory kinds are never
    /// touched.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures.
    pub fn purge_old_episodes(&self, agent_id: AgentId, keep_last: usize) -> Result<usize> {
        let deleted = self.conn.lock().execute(
            "DELETE FROM memories
             WHERE agent_id = ?1 AND kind = 'episode'
             AND id NOT IN (
                 SELECT id FROM memories
                 WHERE agent_id = ?1 AND kind = 'episode'
                 ORDER BY id DESC LIMIT ?2
             )",
            params![agent_id.0.to_string(), keep_last as i64],
        )?;
        Ok(deleted)
    }

    // ------------------------------------------------------------------
    // World events
    // ------------------------------------------------------------------

    /// Append a world event log entry.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures.
    pub fn append_event(&self, content: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO events (content, created_at) VALUES (?1, ?2)",
            params![content, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The most recent world events, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<WorldEventRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, content, created_at FROM events ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(WorldEventRecord {
                id: row.get(0)?,
                content: row.get(1)?,
                created_at: parse_timestamp(&row.get::<_, String>(2)?),
            })
        })?;
        Ok(rows.filter_map(rusqlite::Result::ok).collect())
    }

    // ------------------------------------------------------------------
    // Environment
    // ------------------------------------------------------------------

    /// Current environment, created with defaults on first access.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures.
    pub fn environment(&self) -> Result<Environment> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO environment (id, weather, time_speed, updated_at)
             VALUES (1, 'sunny', 1.0, ?1)",
            params![Utc::now().to_rfc3339()],
        )?;
        let env = conn.query_row(
            "SELECT weather, time_speed FROM environment WHERE id = 1",
            [],
            |row| {
                Ok(Environment {
                    weather: row.get(0)?,
                    time_speed: row.get(1)?,
                })
            },
        )?;
        Ok(env)
    }

    /// Update the weather tag (normalized to lowercase).
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures.
    pub fn set_weather(&self, weather: &str) -> Result<()> {
        self.environment()?;
        self.conn.lock().execute(
            "UPDATE environment SET weather = ?1, updated_at = ?2 WHERE id = 1",
            params![weather.to_lowercase(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Update the world time-speed multiplier.
    ///
    /// # Errors
    ///
    /// Returns [`VivariumError::Database`] on SQLite failures.
    pub fn set_time_speed(&self, speed: f64) -> Result<()> {
        self.environment()?;
        self.conn.lock().execute(
            "UPDATE environment SET time_speed = ?1, updated_at = ?2 WHERE id = 1",
            params![speed, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_uuid(s: &str) -> Option<Uuid> {
    match Uuid::parse_str(s) {
        Ok(uuid) => Some(uuid),
        Err(_) => {
            warn!(id = %s, "skipping row with invalid uuid");
            None
        }
    }
}

fn row_to_agent(row: &rusqlite::Row<'_>) -> rusqlite::Result<Agent> {
    let id_str: String = row.get(1)?;
    let kind_str: String = row.get(3)?;
    let mood_str: String = row.get(5)?;
    let point_str: Option<String> = row.get(7)?;
    let created_str: String = row.get(8)?;

    Ok(Agent {
        id: AgentId(Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil())),
        seq: row.get(0)?,
        name: row.get(2)?,
        kind: AgentKind::from_str_lossy(&kind_str),
        personality: row.get(4)?,
        mood: Mood::from_json_lossy(&mood_str),
        current_plan: row.get(6)?,
        point_id: point_str.as_deref().and_then(parse_uuid).map(PointId),
        created_at: parse_timestamp(&created_str),
    })
}

fn row_to_point(row: &rusqlite::Row<'_>) -> rusqlite::Result<Point> {
    let id_str: String = row.get(0)?;
    Ok(Point {
        id: PointId(Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil())),
        x: row.get(1)?,
        y: row.get(2)?,
        target_x: row.get(3)?,
        target_y: row.get(4)?,
        speed: row.get(5)?,
    })
}

fn row_to_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<Option<RelationshipEdge>> {
    let from_str: String = row.get(0)?;
    let to_str: String = row.get(1)?;
    let Some(from) = parse_uuid(&from_str) else {
        return Ok(None);
    };
    let Some(to) = parse_uuid(&to_str) else {
        return Ok(None);
    };
    Ok(Some(RelationshipEdge {
        from: AgentId(from),
        to: AgentId(to),
        sympathy: row.get(2)?,
    }))
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<Option<MemoryEntry>> {
    let id_str: String = row.get(1)?;
    let Some(agent) = parse_uuid(&id_str) else {
        return Ok(None);
    };
    let kind_str: String = row.get(3)?;
    let blob: Option<Vec<u8>> = row.get(4)?;
    let embedding = blob.and_then(|bytes| match bincode::deserialize(&bytes) {
        Ok(vector) => Some(vector),
        Err(e) => {
            warn!(error = %e, "dropping undecodable memory vector");
            None
        }
    });
    let created_str: String = row.get(5)?;

    Ok(Some(MemoryEntry {
        id: row.get(0)?,
        agent_id: AgentId(agent),
        text: row.get(2)?,
        kind: MemoryKind::from_str_lossy(&kind_str),
        embedding,
        created_at: parse_timestamp(&created_str),
    }))
}

/// Extension trait that adds an `.optional()` combinator to
/// `rusqlite::Result`, converting `Err(QueryReturnedNoRows)` into
/// `Ok(None)`.
trait OptionalExt<T> {
    /// Convert `QueryReturnedNoRows` into `Ok(None)`.
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingProvider, HashedEmbeddingProvider};

    fn gateway() -> PersistenceGateway {
        PersistenceGateway::open_in_memory().expect("open")
    }

    #[test]
    fn agent_crud_round_trip() {
        let gw = gateway();
        let agent = gw
            .insert_agent("Mira", AgentKind::Agent, "observant and practical")
            .expect("insert");

        let loaded = gw.get_agent(agent.id).expect("get").expect("Some");
        assert_eq!(loaded.name, "Mira");
        assert_eq!(loaded.kind, AgentKind::Agent);
        assert_eq!(loaded.mood, Mood::DEFAULT);
        assert_eq!(loaded.seq, agent.seq);

        gw.update_agent_plan(agent.id, "walk to the park").expect("plan");
        let mood = Mood {
            joy: 50,
            anger: 10,
            sadness: 10,
            fear: 10,
            neutral: 20,
        };
        gw.update_agent_mood(agent.id, &mood).expect("mood");

        let loaded = gw.get_agent(agent.id).expect("get").expect("Some");
        assert_eq!(loaded.current_plan, "walk to the park");
        assert_eq!(loaded.mood, mood);
    }

    #[test]
    fn seq_increases_with_insertion_order() {
        let gw = gateway();
        let a = gw.insert_agent("A", AgentKind::Agent, "").expect("a");
        let b = gw.insert_agent("B", AgentKind::Agent, "").expect("b");
        assert!(b.seq > a.seq);

        let listed = gw.list_agents().expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "A");
    }

    #[test]
    fn missing_agent_updates_are_reported() {
        let gw = gateway();
        let ghost = AgentId::new();
        assert!(matches!(
            gw.update_agent_plan(ghost, "x"),
            Err(VivariumError::AgentNotFound(_))
        ));
    }

    #[test]
    fn point_round_trip_and_updates() {
        let gw = gateway();
        let point = Point {
            id: PointId::new(),
            x: 50.0,
            y: 50.0,
            target_x: 55.0,
            target_y: 52.0,
            speed: Point::DEFAULT_SPEED,
        };
        gw.insert_point(&point).expect("insert");

        gw.update_point_position(point.id, 51.0, 50.5, 55.0, 52.0)
            .expect("position");
        gw.update_point_target(point.id, 40.0, 48.0).expect("target");

        let loaded = gw.get_point(point.id).expect("get").expect("Some");
        assert!((loaded.x - 51.0).abs() < f64::EPSILON);
        assert!((loaded.target_x - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sympathy_defaults_to_zero_and_upserts() {
        let gw = gateway();
        let a = gw.insert_agent("A", AgentKind::Agent, "").expect("a").id;
        let b = gw.insert_agent("B", AgentKind::Agent, "").expect("b").id;

        assert_eq!(gw.sympathy_between(a, b).expect("get"), 0);

        gw.upsert_sympathy(a, b, 5).expect("upsert");
        gw.upsert_sympathy(a, b, 7).expect("upsert again");
        assert_eq!(gw.sympathy_between(a, b).expect("get"), 7);
        // The reverse edge is independent.
        assert_eq!(gw.sympathy_between(b, a).expect("get"), 0);

        let edges = gw.edges_for_agent(a).expect("edges");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].sympathy, 7);
    }

    #[test]
    fn out_of_range_sympathy_is_rejected_by_check() {
        let gw = gateway();
        let a = gw.insert_agent("A", AgentKind::Agent, "").expect("a").id;
        let b = gw.insert_agent("B", AgentKind::Agent, "").expect("b").id;
        assert!(gw.upsert_sympathy(a, b, 11).is_err());
        assert!(gw.upsert_sympathy(a, b, -11).is_err());
    }

    #[test]
    fn memory_append_search_and_purge() {
        let gw = gateway();
        let provider = HashedEmbeddingProvider::default();
        let agent = gw.insert_agent("A", AgentKind::Agent, "").expect("a").id;

        for i in 0..12 {
            let text = format!("episode number {i}");
            gw.append_memory(agent, &text, MemoryKind::Episode, Some(&provider.embed(&text)))
                .expect("append");
        }
        gw.append_memory(agent, "I decided: rest", MemoryKind::Plan, None)
            .expect("append plan");

        assert_eq!(gw.count_episodes(agent).expect("count"), 12);
        let recent = gw.recent_memories(agent, 3).expect("recent");
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].text, "I decided: rest");

        let with_vectors = gw.memories_with_vectors(agent).expect("vectors");
        assert_eq!(with_vectors.len(), 12);
        assert!(with_vectors.iter().all(|m| m.embedding.is_some()));

        let purged = gw.purge_old_episodes(agent, 10).expect("purge");
        assert_eq!(purged, 2);
        assert_eq!(gw.count_episodes(agent).expect("count"), 10);
        // Plans survive compaction purges.
        let recent = gw.recent_memories(agent, 20).expect("recent");
        assert!(recent.iter().any(|m| m.kind == MemoryKind::Plan));
    }

    #[test]
    fn delete_agent_cascades() {
        let gw = gateway();
        let agent = gw.insert_agent("A", AgentKind::Agent, "").expect("a");
        let other = gw.insert_agent("B", AgentKind::Agent, "").expect("b");

        let point = Point {
            id: PointId::new(),
            x: 50.0,
            y: 50.0,
            target_x: 50.0,
            target_y: 50.0,
            speed: 1.5,
        };
        gw.insert_point(&point).expect("point");
        gw.link_point(agent.id, point.id).expect("link");
        gw.append_memory(agent.id, "something", MemoryKind::Episode, None)
            .expect("memory");
        gw.upsert_sympathy(agent.id, other.id, 3).expect("edge");
        gw.upsert_sympathy(other.id, agent.id, 1).expect("edge");

        assert!(gw.delete_agent(agent.id).expect("delete"));
        assert!(!gw.delete_agent(agent.id).expect("delete again"));

        assert!(gw.get_agent(agent.id).expect("get").is_none());
        assert!(gw.get_point(point.id).expect("get").is_none());
        assert_eq!(gw.recent_memories(agent.id, 10).expect("mem").len(), 0);
        assert_eq!(gw.edges_for_agent(other.id).expect("edges").len(), 0);
    }

    #[test]
    fn events_are_newest_first() {
        let gw = gateway();
        gw.append_event("first").expect("e1");
        gw.append_event("second").expect("e2");

        let events = gw.recent_events(10).expect("events");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].content, "second");
    }

    #[test]
    fn environment_singleton() {
        let gw = gateway();
        let env = gw.environment().expect("env");
        assert_eq!(env.weather, "sunny");

        gw.set_weather("Rainy").expect("weather");
        gw.set_time_speed(2.5).expect("speed");

        let env = gw.environment().expect("env");
        assert_eq!(env.weather, "rainy");
        assert!((env.time_speed - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn file_backed_gateway_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("world.db");
        let config = PersistenceConfig::default();

        let id = {
            let gw = PersistenceGateway::open(&path, &config).expect("open");
            gw.insert_agent("Mira", AgentKind::Agent, "").expect("insert").id
        };

        let gw = PersistenceGateway::open(&path, &config).expect("reopen");
        let loaded = gw.get_agent(id).expect("get").expect("Some");
        assert_eq!(loaded.name, "Mira");
    }
}
