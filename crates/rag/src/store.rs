//! Conversation and analytics persistence.
//!
//! The pipeline talks to storage through [`ConversationStore`] and
//! [`AnalyticsSink`]. [`SqliteStore`] is the durable implementation;
//! [`MemoryStore`] keeps everything in process for tests and one-shot runs.

use crate::types::Reference;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tutor_core::{AppError, AppResult, ConversationTurn, Role, SettingsProvider};

/// The most recent grounded exchange of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastGrounded {
    pub question: String,
    pub answer: String,
    pub references: Vec<Reference>,
}

/// One analytics record per answered question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub session_id: String,
    pub question: String,
    pub grounded: bool,
    pub citations_count: usize,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Per-session conversation log plus the last grounded exchange.
pub trait ConversationStore: Send + Sync {
    /// The last `limit` turns of the session, oldest first.
    fn recent_turns(&self, session_id: &str, limit: usize) -> AppResult<Vec<ConversationTurn>>;

    fn append_turn(&self, session_id: &str, turn: &ConversationTurn) -> AppResult<()>;

    fn last_grounded(&self, session_id: &str) -> AppResult<Option<LastGrounded>>;

    /// Replace the session's last grounded exchange.
    fn set_last_grounded(&self, session_id: &str, last: &LastGrounded) -> AppResult<()>;
}

pub trait AnalyticsSink: Send + Sync {
    fn record(&self, event: &AnalyticsEvent) -> AppResult<()>;
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> AppResult<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| AppError::Store(format!("{} lock poisoned", what)))
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    turns: Mutex<HashMap<String, Vec<ConversationTurn>>>,
    last: Mutex<HashMap<String, LastGrounded>>,
    events: Mutex<Vec<AnalyticsEvent>>,
    settings: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_setting(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Ok(mut settings) = self.settings.lock() {
            settings.insert(key.into(), value.into());
        }
        self
    }

    /// Recorded analytics events, oldest first.
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ConversationStore for MemoryStore {
    fn recent_turns(&self, session_id: &str, limit: usize) -> AppResult<Vec<ConversationTurn>> {
        let turns = lock(&self.turns, "turns")?;
        let Some(session) = turns.get(session_id) else {
            return Ok(Vec::new());
        };
        let skip = session.len().saturating_sub(limit);
        Ok(session[skip..].to_vec())
    }

    fn append_turn(&self, session_id: &str, turn: &ConversationTurn) -> AppResult<()> {
        lock(&self.turns, "turns")?
            .entry(session_id.to_string())
            .or_default()
            .push(turn.clone());
        Ok(())
    }

    fn last_grounded(&self, session_id: &str) -> AppResult<Option<LastGrounded>> {
        Ok(lock(&self.last, "last grounded")?.get(session_id).cloned())
    }

    fn set_last_grounded(&self, session_id: &str, last: &LastGrounded) -> AppResult<()> {
        lock(&self.last, "last grounded")?.insert(session_id.to_string(), last.clone());
        Ok(())
    }
}

impl AnalyticsSink for MemoryStore {
    fn record(&self, event: &AnalyticsEvent) -> AppResult<()> {
        lock(&self.events, "analytics")?.push(event.clone());
        Ok(())
    }
}

impl SettingsProvider for MemoryStore {
    fn setting(&self, key: &str) -> Option<String> {
        self.settings.lock().ok()?.get(key).cloned()
    }
}

/// SQLite-backed store.
///
/// Turns are an append-only log keyed by session; the last grounded
/// exchange is upserted. Operator settings live in the same file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path`.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Store(format!("Failed to create database directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Store(format!("Failed to open SQLite store: {}", e)))?;
        let store = Self::init(conn)?;

        tracing::debug!("Opened conversation store at {:?}", db_path);
        Ok(store)
    }

    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Store(format!("Failed to open SQLite store: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                text TEXT NOT NULL,
                ts TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id, id);

            CREATE TABLE IF NOT EXISTS last_references (
                session_id TEXT PRIMARY KEY,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                refs_json TEXT NOT NULL,
                ts TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS analytics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                question TEXT NOT NULL,
                grounded INTEGER NOT NULL,
                citations_count INTEGER NOT NULL,
                latency_ms INTEGER NOT NULL,
                ts TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| AppError::Store(format!("Failed to create tables: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        lock(&self.conn, "sqlite connection")
    }

    pub fn get_setting(&self, key: &str) -> AppResult<Option<String>> {
        self.conn()?
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Store(format!("Failed to read setting {}: {}", key, e)))
    }

    pub fn set_setting(&self, key: &str, value: &str) -> AppResult<()> {
        self.conn()?
            .execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .map_err(|e| AppError::Store(format!("Failed to write setting {}: {}", key, e)))?;

        tracing::info!(key, "Updated setting");
        Ok(())
    }

    /// All persisted settings ordered by key.
    pub fn list_settings(&self) -> AppResult<Vec<(String, String)>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT key, value FROM settings ORDER BY key")
            .map_err(|e| AppError::Store(format!("Failed to prepare settings query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| AppError::Store(format!("Failed to query settings: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Store(format!("Failed to read settings: {}", e)))
    }

    /// Analytics rows of a session, oldest first.
    pub fn analytics_for_session(&self, session_id: &str) -> AppResult<Vec<AnalyticsEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT session_id, question, grounded, citations_count, latency_ms, ts
                 FROM analytics WHERE session_id = ?1 ORDER BY id",
            )
            .map_err(|e| AppError::Store(format!("Failed to prepare analytics query: {}", e)))?;

        let rows = stmt
            .query_map(params![session_id], |row| {
                let ts: String = row.get(5)?;
                Ok(AnalyticsEvent {
                    session_id: row.get(0)?,
                    question: row.get(1)?,
                    grounded: row.get::<_, i64>(2)? != 0,
                    citations_count: row.get::<_, i64>(3)? as usize,
                    latency_ms: row.get::<_, i64>(4)? as u64,
                    timestamp: parse_timestamp(&ts),
                })
            })
            .map_err(|e| AppError::Store(format!("Failed to query analytics: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Store(format!("Failed to read analytics: {}", e)))
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl ConversationStore for SqliteStore {
    fn recent_turns(&self, session_id: &str, limit: usize) -> AppResult<Vec<ConversationTurn>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT role, text, ts FROM turns WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(|e| AppError::Store(format!("Failed to prepare turns query: {}", e)))?;

        let rows = stmt
            .query_map(params![session_id, limit as i64], |row| {
                let role: String = row.get(0)?;
                let text: String = row.get(1)?;
                let ts: String = row.get(2)?;
                Ok((role, text, ts))
            })
            .map_err(|e| AppError::Store(format!("Failed to query turns: {}", e)))?;

        let mut turns = Vec::new();
        for row in rows {
            let (role, text, ts) =
                row.map_err(|e| AppError::Store(format!("Failed to read turn: {}", e)))?;
            let Some(role) = Role::parse(&role) else {
                tracing::warn!(role, "Skipping turn with unknown role");
                continue;
            };
            turns.push(ConversationTurn {
                role,
                text,
                timestamp: parse_timestamp(&ts),
            });
        }

        turns.reverse();
        Ok(turns)
    }

    fn append_turn(&self, session_id: &str, turn: &ConversationTurn) -> AppResult<()> {
        self.conn()?
            .execute(
                "INSERT INTO turns (session_id, role, text, ts) VALUES (?1, ?2, ?3, ?4)",
                params![
                    session_id,
                    turn.role.as_str(),
                    turn.text,
                    turn.timestamp.to_rfc3339()
                ],
            )
            .map_err(|e| AppError::Store(format!("Failed to append turn: {}", e)))?;
        Ok(())
    }

    fn last_grounded(&self, session_id: &str) -> AppResult<Option<LastGrounded>> {
        let row: Option<(String, String, String)> = self
            .conn()?
            .query_row(
                "SELECT question, answer, refs_json FROM last_references WHERE session_id = ?1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|e| AppError::Store(format!("Failed to read last references: {}", e)))?;

        let Some((question, answer, refs_json)) = row else {
            return Ok(None);
        };

        let references = match serde_json::from_str(&refs_json) {
            Ok(references) => references,
            Err(e) => {
                tracing::warn!(session_id, "Ignoring unreadable stored references: {}", e);
                Vec::new()
            }
        };

        Ok(Some(LastGrounded {
            question,
            answer,
            references,
        }))
    }

    fn set_last_grounded(&self, session_id: &str, last: &LastGrounded) -> AppResult<()> {
        let refs_json = serde_json::to_string(&last.references)?;

        self.conn()?
            .execute(
                "INSERT INTO last_references (session_id, question, answer, refs_json, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(session_id) DO UPDATE SET
                    question = excluded.question,
                    answer = excluded.answer,
                    refs_json = excluded.refs_json,
                    ts = excluded.ts",
                params![
                    session_id,
                    last.question,
                    last.answer,
                    refs_json,
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(|e| AppError::Store(format!("Failed to store last references: {}", e)))?;
        Ok(())
    }
}

impl AnalyticsSink for SqliteStore {
    fn record(&self, event: &AnalyticsEvent) -> AppResult<()> {
        self.conn()?
            .execute(
                "INSERT INTO analytics (session_id, question, grounded, citations_count, latency_ms, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.session_id,
                    event.question,
                    event.grounded as i64,
                    event.citations_count as i64,
                    event.latency_ms as i64,
                    event.timestamp.to_rfc3339()
                ],
            )
            .map_err(|e| AppError::Store(format!("Failed to record analytics: {}", e)))?;
        Ok(())
    }
}

impl SettingsProvider for SqliteStore {
    fn setting(&self, key: &str) -> Option<String> {
        match self.get_setting(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, "Setting lookup failed: {}", e);
                None
            }
        }
    }
}
