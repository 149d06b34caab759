//! SQLite connection pool and schema.
//!
//! All queries go through [`Db::run`], which checks out a pooled connection
//! on the blocking thread pool so handlers never stall the async runtime.

pub mod query;

use std::path::Path;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use tracing::{debug, info};

/// Pooled SQLite connections.
pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type DbResult<T> = Result<T, DbError>;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS tenant (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT '1',
    create_time INTEGER NOT NULL,
    create_date TEXT NOT NULL,
    update_time INTEGER NOT NULL,
    update_date TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user (
    id           TEXT PRIMARY KEY,
    email        TEXT NOT NULL UNIQUE,
    nickname     TEXT NOT NULL,
    access_token TEXT NOT NULL UNIQUE,
    status       TEXT NOT NULL DEFAULT '1',
    create_time  INTEGER NOT NULL,
    create_date  TEXT NOT NULL,
    update_time  INTEGER NOT NULL,
    update_date  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_tenant (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL REFERENCES user(id),
    tenant_id   TEXT NOT NULL REFERENCES tenant(id),
    role        TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT '1',
    create_time INTEGER NOT NULL,
    create_date TEXT NOT NULL,
    update_time INTEGER NOT NULL,
    update_date TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_user_tenant_user ON user_tenant(user_id);

CREATE TABLE IF NOT EXISTS api_token (
    token_hash  TEXT PRIMARY KEY,
    tenant_id   TEXT NOT NULL REFERENCES tenant(id),
    create_time INTEGER NOT NULL,
    create_date TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS recommend_question (
    id          TEXT PRIMARY KEY,
    question    TEXT NOT NULL,
    tenant_id   TEXT NOT NULL,
    app_code    TEXT NOT NULL,
    sys_code    TEXT NOT NULL,
    user_code   TEXT NOT NULL,
    valid       TEXT NOT NULL DEFAULT 'Y',
    status      TEXT NOT NULL DEFAULT '1',
    create_time INTEGER NOT NULL,
    create_date TEXT NOT NULL,
    update_time INTEGER NOT NULL,
    update_date TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_recommend_question_tenant ON recommend_question(tenant_id);

CREATE TABLE IF NOT EXISTS file (
    id          TEXT PRIMARY KEY,
    parent_id   TEXT NOT NULL,
    tenant_id   TEXT NOT NULL,
    created_by  TEXT NOT NULL,
    name        TEXT NOT NULL,
    location    TEXT NOT NULL DEFAULT '',
    size        INTEGER NOT NULL DEFAULT 0,
    type        TEXT NOT NULL,
    source_type TEXT NOT NULL DEFAULT '',
    create_time INTEGER NOT NULL,
    create_date TEXT NOT NULL,
    update_time INTEGER NOT NULL,
    update_date TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_file_parent ON file(tenant_id, parent_id);
";

/// Create any missing tables and indexes.
pub fn init_schema(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(SCHEMA)?;
    debug!("Schema ready");
    Ok(())
}

/// SQL functions every connection needs.
///
/// `unicode_lower(text)` lowercases with full Unicode case mapping; SQLite's
/// built-in `lower` only folds ASCII. NULL stays NULL.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "unicode_lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
}

/// Fresh in-memory connection with the schema applied.
#[cfg(test)]
pub(crate) fn test_conn() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    register_functions(&conn).unwrap();
    init_schema(&conn).unwrap();
    conn
}

/// Handle to the database. Cheap to clone.
#[derive(Clone)]
pub struct Db {
    pool: DbPool,
}

impl Db {
    /// Open (or create) the database at `path`; `":memory:"` opens a private
    /// in-memory database.
    pub fn open(path: &str, pool_size: u32) -> DbResult<Self> {
        if path == ":memory:" {
            return Self::open_in_memory();
        }
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("Opening database {path}");
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "busy_timeout", 3000i64)?;
            register_functions(conn)
        });
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(Duration::from_secs(10))
            .build(manager)?;
        Self::from_pool(pool)
    }

    /// In-memory database on a single long-lived connection.
    ///
    /// Every SQLite `:memory:` connection is its own database, so the pool is
    /// capped at one connection that is never recycled.
    pub fn open_in_memory() -> DbResult<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            conn.pragma_update(None, "foreign_keys", "ON")?;
            register_functions(conn)
        });
        let pool = Pool::builder()
            .max_size(1)
            .min_idle(Some(1))
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;
        Self::from_pool(pool)
    }

    fn from_pool(pool: DbPool) -> DbResult<Self> {
        init_schema(&*pool.get()?)?;
        Ok(Self { pool })
    }

    /// Run `f` with a pooled connection on the blocking thread pool.
    pub async fn run<F, T>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&mut Connection) -> DbResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await?
    }

    /// Synchronous variant of [`Db::run`] for CLI commands outside a runtime.
    pub fn run_blocking<F, T>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&mut Connection) -> DbResult<T>,
    {
        let mut conn = self.pool.get()?;
        f(&mut conn)
    }
}
