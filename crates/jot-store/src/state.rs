use crate::mirror::MirrorStore;
use chrono::Utc;
use jot_core::{JotError, JotResult};
use jot_fs::WorkspacePaths;
use rusqlite::{Connection, Error as SqlError, ErrorCode, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub profile: String,
    pub server: String,
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub id_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub authenticated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MirrorEntryInfo {
    pub key: String,
    pub bytes: usize,
    pub updated_at: String,
}

/// SQLite-backed workspace state: persisted sessions and mirror snapshots.
#[derive(Debug, Clone)]
pub struct StateStore {
    db_path: PathBuf,
}

impl StateStore {
    pub fn from_workspace(paths: &WorkspacePaths) -> JotResult<Self> {
        Self::open(&paths.state_db_path)
    }

    pub fn open(db_path: &Path) -> JotResult<Self> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                JotError::io(format!(
                    "failed to create state directory '{}': {}",
                    parent.display(),
                    err
                ))
            })?;
        }

        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        let conn = store.connection()?;
        store.initialize_schema(&conn)?;
        tracing::debug!(path = %store.db_path.display(), "state database ready");

        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn load_session(&self, profile: &str) -> JotResult<Option<StoredSession>> {
        let conn = self.connection()?;
        let payload = conn
            .query_row(
                "SELECT payload_json FROM sessions WHERE profile = ?1",
                params![profile_key(profile)],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|err| sqlite_error("load session", &self.db_path, err))?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        serde_json::from_str::<StoredSession>(&payload)
            .map(Some)
            .map_err(|err| {
                JotError::io(format!(
                    "failed to parse stored session in '{}': {}",
                    self.db_path.display(),
                    err
                ))
            })
    }

    pub fn save_session(&self, profile: &str, session: &StoredSession) -> JotResult<()> {
        let payload = serde_json::to_string(session)
            .map_err(|err| JotError::io(format!("failed to serialize session data: {err}")))?;

        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO sessions (profile, payload_json, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(profile) DO UPDATE SET payload_json = excluded.payload_json, updated_at = excluded.updated_at",
            params![profile_key(profile), payload, Utc::now().to_rfc3339()],
        )
        .map_err(|err| sqlite_error("save session", &self.db_path, err))?;

        Ok(())
    }

    pub fn remove_session(&self, profile: &str) -> JotResult<()> {
        let conn = self.connection()?;
        conn.execute(
            "DELETE FROM sessions WHERE profile = ?1",
            params![profile_key(profile)],
        )
        .map_err(|err| sqlite_error("remove session", &self.db_path, err))?;
        Ok(())
    }

    pub fn mirror_entry(&self, key: &str) -> JotResult<Option<MirrorEntryInfo>> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT key, length(snapshot_json), updated_at FROM mirror_entries WHERE key = ?1",
            params![key],
            |row| {
                Ok(MirrorEntryInfo {
                    key: row.get(0)?,
                    bytes: row.get::<_, i64>(1)?.max(0) as usize,
                    updated_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|err| sqlite_error("inspect mirror entry", &self.db_path, err))
    }

    fn connection(&self) -> JotResult<Connection> {
        Connection::open(&self.db_path)
            .map_err(|err| sqlite_error("open state database", &self.db_path, err))
    }

    fn initialize_schema(&self, conn: &Connection) -> JotResult<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             CREATE TABLE IF NOT EXISTS sessions (
                 profile TEXT PRIMARY KEY,
                 payload_json TEXT NOT NULL,
                 updated_at TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS mirror_entries (
                 key TEXT PRIMARY KEY,
                 snapshot_json TEXT NOT NULL,
                 updated_at TEXT NOT NULL
             );",
        )
        .map_err(|err| sqlite_error("initialize schema", &self.db_path, err))?;

        Ok(())
    }
}

impl MirrorStore for StateStore {
    fn get(&self, key: &str) -> JotResult<Option<String>> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT snapshot_json FROM mirror_entries WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|err| sqlite_error("read mirror entry", &self.db_path, err))
    }

    fn set(&self, key: &str, snapshot: &str) -> JotResult<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO mirror_entries (key, snapshot_json, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET snapshot_json = excluded.snapshot_json, updated_at = excluded.updated_at",
            params![key, snapshot, Utc::now().to_rfc3339()],
        )
        .map_err(|err| sqlite_error("write mirror entry", &self.db_path, err))?;
        Ok(())
    }

    fn clear(&self, key: &str) -> JotResult<()> {
        let conn = self.connection()?;
        conn.execute("DELETE FROM mirror_entries WHERE key = ?1", params![key])
            .map_err(|err| sqlite_error("clear mirror entry", &self.db_path, err))?;
        Ok(())
    }
}

fn sqlite_error(action: &str, db_path: &Path, err: SqlError) -> JotError {
    if let SqlError::SqliteFailure(code, message) = &err
        && (code.code == ErrorCode::DatabaseCorrupt || code.code == ErrorCode::NotADatabase)
    {
        let detail = message.as_deref().unwrap_or("sqlite reported corruption");
        return JotError::io(format!(
            "failed to {action}: state database '{}' is corrupted ({detail}); remove '.jot/state.db' and refresh to rebuild the local mirror",
            db_path.display()
        ));
    }

    JotError::io(format!(
        "failed to {action} using state database '{}': {}",
        db_path.display(),
        err
    ))
}

fn profile_key(profile: &str) -> String {
    let sanitized: String = profile
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "default".to_string()
    } else {
        sanitized
    }
}
