use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{Connection, params};
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::models::Conversation;
use crate::error::Result;

// Caching the conversation list so the sidebar renders before the network answers
pub struct Cache {
    conn: Connection,
}

impl Cache {
    pub fn default_path() -> Option<PathBuf> {
        let proj = ProjectDirs::from("ua", "artua", "ArtUA")?;
        Some(proj.data_dir().join("cache.sqlite"))
    }

    pub fn open_default() -> Result<Self> {
        let path = Self::default_path()
            .ok_or_else(|| rusqlite::Error::InvalidPath("no data dir".into()))?;
        Self::open(&path)
    }

    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY,
                position INTEGER NOT NULL,
                unread_count INTEGER NOT NULL,
                last_message_at TEXT,
                updated_at INTEGER NOT NULL,
                raw_json TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    /// Replace the cached list with `conversations`, keeping their order.
    pub fn replace_conversations(&mut self, conversations: &[Conversation]) -> Result<()> {
        let now = Utc::now().timestamp();
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM conversations", [])?;
        for (position, c) in conversations.iter().enumerate() {
            Self::upsert(&tx, c, position as i64, now)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn upsert(conn: &Connection, c: &Conversation, position: i64, now: i64) -> Result<()> {
        let raw = serde_json::to_string(c)?;
        let last_message_at: Option<DateTime<Utc>> = c.last_message.as_ref().map(|m| m.sent_at);
        conn.execute(
            r#"
            INSERT INTO conversations (id, position, unread_count, last_message_at, updated_at, raw_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                position=excluded.position,
                unread_count=excluded.unread_count,
                last_message_at=excluded.last_message_at,
                updated_at=excluded.updated_at,
                raw_json=excluded.raw_json
            "#,
            params![c.id, position, c.unread_count, last_message_at, now, raw],
        )?;
        Ok(())
    }

    pub fn conversations(&self, limit: Option<usize>) -> Result<Vec<Conversation>> {
        let mut stmt = self
            .conn
            .prepare("SELECT raw_json FROM conversations ORDER BY position ASC LIMIT ?1")?;
        let lim = limit.unwrap_or(500) as i64;
        let rows = stmt.query_map(params![lim], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for raw in rows {
            match serde_json::from_str::<Conversation>(&raw?) {
                Ok(c) => out.push(c),
                Err(e) => log::debug!("skipping unreadable cached conversation: {e}"),
            }
        }
        Ok(out)
    }

    /// Drop everything; called when the session ends.
    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM conversations", [])?;
        Ok(())
    }
}
