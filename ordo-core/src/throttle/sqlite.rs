// ABOUTME: SQLite-backed throttle store so rate limits survive restarts
// ABOUTME: One row per (scope, id) holding the window reset time and use count

use super::{apply_window, Clock, SystemClock, ThrottleObject, ThrottlePolicy, ThrottleResult, ThrottleStore};
use crate::events::EventFiring;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct SqliteThrottleStore {
    db: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl SqliteThrottleStore {
    /// Open (or create) the throttle database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create throttle database directory")?;
            }
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        tracing::info!(db = %path.display(), "Throttle store initialized");
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open SQLite database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS throttles (
                scope TEXT NOT NULL,
                id TEXT NOT NULL,
                reset INTEGER NOT NULL,
                uses INTEGER NOT NULL,
                PRIMARY KEY (scope, id)
            )",
            [],
        )?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Delete rows whose window has ended. Returns how many were removed.
    pub fn flush_expired(&self) -> Result<usize> {
        let now = self.clock.now_millis();
        let removed = self.lock()?.execute("DELETE FROM throttles WHERE reset <= ?1", params![now])?;
        Ok(removed)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|e| anyhow::anyhow!("Database mutex poisoned: {}", e))
    }
}

fn read_row(conn: &Connection, scope: &str, id: &str) -> Result<Option<ThrottleObject>> {
    let mut stmt = conn.prepare("SELECT reset, uses FROM throttles WHERE scope = ?1 AND id = ?2")?;

    let throttle = stmt.query_row(params![scope, id], |row| {
        Ok(ThrottleObject {
            reset: row.get(0)?,
            uses: row.get(1)?,
        })
    });

    match throttle {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_row(conn: &Connection, scope: &str, id: &str, object: ThrottleObject) -> Result<()> {
    conn.execute(
        "INSERT INTO throttles (scope, id, reset, uses) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(scope, id) DO UPDATE SET reset = excluded.reset, uses = excluded.uses",
        params![scope, id, object.reset, object.uses],
    )?;
    Ok(())
}

#[async_trait]
impl ThrottleStore for SqliteThrottleStore {
    fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    async fn get(&self, scope: &str, id: &str) -> Result<Option<ThrottleObject>> {
        let conn = self.lock()?;
        read_row(&conn, scope, id)
    }

    async fn set(&self, scope: &str, id: &str, object: ThrottleObject) -> Result<()> {
        let conn = self.lock()?;
        write_row(&conn, scope, id, object)
    }

    async fn remove(&self, scope: &str, id: &str) -> Result<()> {
        self.lock()?.execute(
            "DELETE FROM throttles WHERE scope = ?1 AND id = ?2",
            params![scope, id],
        )?;
        Ok(())
    }

    async fn throttle(
        &self,
        scope: &str,
        policy: &ThrottlePolicy,
        id: &str,
        _firing: Option<&EventFiring>,
    ) -> Result<ThrottleResult> {
        let now = self.clock.now_millis();
        let mut db = self.lock()?;
        let tx = db.transaction().context("Failed to start throttle transaction")?;
        let (result, write) = apply_window(read_row(&tx, scope, id)?, policy, now);
        if let Some(object) = write {
            write_row(&tx, scope, id, object)?;
        }
        tx.commit().context("Failed to commit throttle update")?;
        Ok(result)
    }
}
