//! Local-only like counts. Never sent to the board.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::model::CommentId;

#[derive(Debug, Clone)]
pub struct LikeStore {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Default, Clone)]
pub struct Options {
    pub path: Option<PathBuf>,
}

impl LikeStore {
    pub fn open(opts: Options) -> Result<Self> {
        let path = if let Some(path) = opts.path {
            path
        } else {
            default_path().context("likes: resolve default path")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("likes: create directory {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("likes: open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("likes: set WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .context("likes: set busy timeout")?;
        Self::from_connection(conn)
    }

    /// Store that lives only as long as the process; used by `--offline`.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("likes: open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn close(self) -> Result<()> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| anyhow!("likes: connection still in use"))?
            .into_inner();
        conn.close()
            .map_err(|(_, err)| err)
            .context("likes: close connection")
    }

    pub fn count(&self, comment_id: &CommentId) -> Result<Option<i64>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT count FROM comment_likes WHERE comment_id = ?1",
            params![comment_id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .context("likes: query count")
    }

    pub fn counts<'a, I>(&self, comment_ids: I) -> Result<HashMap<CommentId, i64>>
    where
        I: IntoIterator<Item = &'a CommentId>,
    {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT count FROM comment_likes WHERE comment_id = ?1")
            .context("likes: prepare count query")?;
        let mut found = HashMap::new();
        for id in comment_ids {
            let count: Option<i64> = stmt
                .query_row(params![id.as_str()], |row| row.get(0))
                .optional()
                .context("likes: query counts")?;
            if let Some(count) = count {
                found.insert(id.clone(), count);
            }
        }
        Ok(found)
    }

    /// Adds one like on top of the displayed count (stored value, else `seed`)
    /// and returns the new count.
    pub fn like(&self, comment_id: &CommentId, seed: Option<i64>) -> Result<i64> {
        let conn = self.conn.lock();
        let stored: Option<i64> = conn
            .query_row(
                "SELECT count FROM comment_likes WHERE comment_id = ?1",
                params![comment_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .context("likes: read current count")?;
        let next = stored.or(seed).unwrap_or(0).max(0) + 1;
        conn.execute(
            r#"
INSERT INTO comment_likes (comment_id, count, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(comment_id) DO UPDATE SET
  count = excluded.count,
  updated_at = excluded.updated_at
"#,
            params![comment_id.as_str(), next, unix_now()],
        )
        .context("likes: store count")?;
        Ok(next)
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs() as i64
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
)
"#,
        [],
    )
    .context("likes: create migrations table")?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for (idx, sql) in migrations().iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)
            .with_context(|| format!("likes: apply migration {version}"))?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, unix_now()],
        )?;
    }
    Ok(())
}

fn migrations() -> Vec<&'static str> {
    vec![r#"
CREATE TABLE IF NOT EXISTS comment_likes (
  comment_id TEXT PRIMARY KEY,
  count INTEGER NOT NULL,
  updated_at INTEGER NOT NULL
);
"#]
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("treehole").join("likes.db"))
}
