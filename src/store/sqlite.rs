//! SQLite-backed run store.
//!
//! rusqlite is synchronous, so every call hops onto the blocking pool with
//! the connection behind a mutex. Runs never share rows, so one connection
//! is enough for concurrent runs.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

use super::{snapshot_hash, RunStore, StoreError};
use crate::domain::{Checkpoint, NewRun, Run, RunStatus, Snapshot, Stage};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS agent_runs (
    id TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL,
    practice_id TEXT NOT NULL,
    agent TEXT NOT NULL,
    graph_version TEXT NOT NULL,
    status TEXT NOT NULL,
    run_trigger TEXT NOT NULL,
    config TEXT NOT NULL,
    result TEXT,
    error TEXT,
    stage TEXT NOT NULL,
    checkpoint TEXT,
    checkpoint_hash TEXT,
    started_at TEXT NOT NULL,
    completed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_agent_runs_started_at ON agent_runs (started_at);
CREATE TABLE IF NOT EXISTS agent_run_checkpoints (
    run_id TEXT NOT NULL REFERENCES agent_runs (id),
    seq INTEGER NOT NULL,
    stage TEXT NOT NULL,
    snapshot TEXT NOT NULL,
    snapshot_hash TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    PRIMARY KEY (run_id, seq)
);
"#;

const RUN_COLUMNS: &str = "id, organization_id, practice_id, agent, graph_version, status, \
     run_trigger, config, result, error, stage, checkpoint, started_at, completed_at";

/// Run store persisted in a SQLite database file
#[derive(Clone)]
pub struct SqliteRunStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRunStore {
    /// Open (or create) the store at the given path.
    /// Use `":memory:"` for an in-process database.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let open_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || open_connection(&open_path))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;

        debug!(path = %path.display(), "Run store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Task("connection mutex poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn open_connection(path: &Path) -> Result<Connection, StoreError> {
    let conn = if path == Path::new(":memory:") {
        Connection::open_in_memory()?
    } else {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Connection::open(path)?
    };

    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{}': {}", value, e)))
}

fn parse_snapshot(value: &str) -> Result<Snapshot, StoreError> {
    Ok(serde_json::from_str(value)?)
}

fn ensure_exists(conn: &Connection, run_id: Uuid) -> Result<(), StoreError> {
    conn.query_row(
        "SELECT 1 FROM agent_runs WHERE id = ?1",
        params![run_id.to_string()],
        |_| Ok(()),
    )
    .optional()?
    .ok_or(StoreError::NotFound(run_id))
}

/// Row as stored, before parsing
struct RunRow {
    id: String,
    organization_id: String,
    practice_id: String,
    agent: String,
    graph_version: String,
    status: String,
    trigger: String,
    config: String,
    result: Option<String>,
    error: Option<String>,
    stage: String,
    checkpoint: Option<String>,
    started_at: String,
    completed_at: Option<String>,
}

impl RunRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            organization_id: row.get(1)?,
            practice_id: row.get(2)?,
            agent: row.get(3)?,
            graph_version: row.get(4)?,
            status: row.get(5)?,
            trigger: row.get(6)?,
            config: row.get(7)?,
            result: row.get(8)?,
            error: row.get(9)?,
            stage: row.get(10)?,
            checkpoint: row.get(11)?,
            started_at: row.get(12)?,
            completed_at: row.get(13)?,
        })
    }

    fn into_run(self) -> Result<Run, StoreError> {
        Ok(Run {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| StoreError::Corrupt(format!("bad run id '{}': {}", self.id, e)))?,
            organization_id: self.organization_id,
            practice_id: self.practice_id,
            agent: self.agent,
            graph_version: self.graph_version,
            status: self.status.parse().map_err(StoreError::Corrupt)?,
            trigger: self.trigger.parse().map_err(StoreError::Corrupt)?,
            config: parse_snapshot(&self.config)?,
            result: self.result.as_deref().map(parse_snapshot).transpose()?,
            error: self.error,
            stage: self.stage.parse().map_err(StoreError::Corrupt)?,
            checkpoint: self.checkpoint.as_deref().map(parse_snapshot).transpose()?,
            started_at: parse_timestamp(&self.started_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
        })
    }
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn create(&self, new_run: NewRun) -> Result<Run, StoreError> {
        let run = new_run.into_run();
        let row = run.clone();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO agent_runs (id, organization_id, practice_id, agent, graph_version, \
                 status, run_trigger, config, stage, started_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    row.id.to_string(),
                    row.organization_id,
                    row.practice_id,
                    row.agent,
                    row.graph_version,
                    row.status.as_str(),
                    row.trigger.as_str(),
                    serde_json::to_string(&row.config)?,
                    row.stage.as_str(),
                    timestamp(row.started_at),
                ],
            )?;
            Ok(())
        })
        .await?;

        Ok(run)
    }

    async fn checkpoint(
        &self,
        run_id: Uuid,
        snapshot: &Snapshot,
        stage: Stage,
    ) -> Result<bool, StoreError> {
        let hash = snapshot_hash(snapshot)?;
        let snapshot_json = serde_json::to_string(snapshot)?;

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let id = run_id.to_string();

            let current: Option<(String, String)> = tx
                .query_row(
                    "SELECT status, stage FROM agent_runs WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let (status, current_stage) = current.ok_or(StoreError::NotFound(run_id))?;

            if status.parse::<RunStatus>().map_err(StoreError::Corrupt)? != RunStatus::Running {
                return Err(StoreError::AlreadyFinished(run_id));
            }
            let recorded: bool = tx.query_row(
                "SELECT EXISTS (SELECT 1 FROM agent_run_checkpoints \
                 WHERE run_id = ?1 AND stage = ?2 AND snapshot_hash = ?3)",
                params![id, stage.as_str(), hash],
                |row| row.get(0),
            )?;
            if recorded {
                return Ok(false);
            }
            let current_stage: Stage = current_stage.parse().map_err(StoreError::Corrupt)?;
            if stage.precedes(current_stage) {
                return Err(StoreError::StageRegression {
                    run_id,
                    stage,
                    current: current_stage,
                });
            }

            tx.execute(
                "UPDATE agent_runs SET stage = ?1, checkpoint = ?2, checkpoint_hash = ?3 \
                 WHERE id = ?4",
                params![stage.as_str(), snapshot_json, hash, id],
            )?;
            tx.execute(
                "INSERT INTO agent_run_checkpoints \
                 (run_id, seq, stage, snapshot, snapshot_hash, recorded_at) \
                 SELECT ?1, COALESCE(MAX(seq), 0) + 1, ?2, ?3, ?4, ?5 \
                 FROM agent_run_checkpoints WHERE run_id = ?1",
                params![id, stage.as_str(), snapshot_json, hash, timestamp(Utc::now())],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn complete(&self, run_id: Uuid, result: &Snapshot) -> Result<bool, StoreError> {
        let result_json = serde_json::to_string(result)?;

        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE agent_runs SET status = 'completed', stage = 'completed', result = ?1, \
                 completed_at = ?2 \
                 WHERE id = ?3 AND status = 'running'",
                params![result_json, timestamp(Utc::now()), run_id.to_string()],
            )?;
            if changed == 0 {
                ensure_exists(conn, run_id)?;
            }
            Ok(changed > 0)
        })
        .await
    }

    async fn fail(&self, run_id: Uuid, error: &str) -> Result<bool, StoreError> {
        let error = error.to_string();

        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE agent_runs SET status = 'failed', error = ?1, completed_at = ?2 \
                 WHERE id = ?3 AND status = 'running'",
                params![error, timestamp(Utc::now()), run_id.to_string()],
            )?;
            if changed == 0 {
                ensure_exists(conn, run_id)?;
            }
            Ok(changed > 0)
        })
        .await
    }

    async fn get(&self, run_id: Uuid) -> Result<Option<Run>, StoreError> {
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM agent_runs WHERE id = ?1", RUN_COLUMNS),
                    params![run_id.to_string()],
                    RunRow::read,
                )
                .optional()?;
            row.map(RunRow::into_run).transpose()
        })
        .await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Run>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM agent_runs ORDER BY started_at DESC LIMIT ?1",
                RUN_COLUMNS
            ))?;
            let rows = stmt.query_map(params![limit], RunRow::read)?;

            let mut runs = Vec::new();
            for row in rows {
                runs.push(row?.into_run()?);
            }
            Ok(runs)
        })
        .await
    }

    async fn checkpoints(&self, run_id: Uuid) -> Result<Vec<Checkpoint>, StoreError> {
        self.with_conn(move |conn| {
            ensure_exists(conn, run_id)?;

            let mut stmt = conn.prepare(
                "SELECT seq, stage, snapshot, snapshot_hash, recorded_at \
                 FROM agent_run_checkpoints WHERE run_id = ?1 ORDER BY seq",
            )?;
            let rows = stmt.query_map(params![run_id.to_string()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;

            let mut history = Vec::new();
            for row in rows {
                let (seq, stage, snapshot, snapshot_hash, recorded_at) = row?;
                history.push(Checkpoint {
                    run_id,
                    seq: seq as u64,
                    stage: stage.parse().map_err(StoreError::Corrupt)?,
                    snapshot: parse_snapshot(&snapshot)?,
                    snapshot_hash,
                    recorded_at: parse_timestamp(&recorded_at)?,
                });
            }
            Ok(history)
        })
        .await
    }
}
