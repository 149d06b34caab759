//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `KBSERVE_LISTEN`, `KBSERVE_DB_PATH`,
//!    `KBSERVE_STORAGE_ROOT`, `KBSERVE_PANDOC`
//! 2. **Config file** — path via `--config <path>`, or `kbserve.toml` in CWD
//! 3. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:9380"
//! max_concurrent_requests = 256
//! max_file_size = 10485760  # 10 MB
//! question_page_size = 150
//! bulletin_page_size = 15
//!
//! [database]
//! path = "~/.kbserve/kbserve.db"   # ":memory:" for a throwaway database
//! pool_size = 8
//!
//! [storage]
//! backend = "local"                 # or "memory"
//! root = "~/.kbserve/blobs"
//!
//! [auth]
//! session_cookie = "session"
//!
//! [convert]
//! pandoc = "pandoc"
//! timeout_ms = 60000
//!
//! [logging]
//! level = "info"
//! ```

use serde::Deserialize;
use std::path::Path;

use crate::util::expand_tilde;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub convert: ConvertConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server and request-limit settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:9380`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Maximum requests processed at once across all routes (default 256).
    /// Values below 1 are treated as 1.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    /// Maximum size in bytes of an uploaded bulletin (default 10 MB).
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
    /// Page size for question listings when `page_size` is omitted (default 150).
    #[serde(default = "default_question_page_size")]
    pub question_page_size: u32,
    /// Page size for bulletin listings when `page_size` is omitted (default 15).
    #[serde(default = "default_bulletin_page_size")]
    pub bulletin_page_size: u32,
}

/// SQLite settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database file, or `:memory:`. Override with `KBSERVE_DB_PATH`.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Maximum pooled connections for file databases (default 8).
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

/// Which blob store backs bulletin files.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Local,
    Memory,
}

/// Blob storage settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root directory of the `local` backend. Override with `KBSERVE_STORAGE_ROOT`.
    #[serde(default = "default_storage_root")]
    pub root: String,
}

/// Authentication settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Name of the cookie carrying the web session token (default `session`).
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
}

/// External document conversion.
#[derive(Debug, Clone, Deserialize)]
pub struct ConvertConfig {
    /// pandoc binary (default `pandoc`, resolved via `PATH`). Override with `KBSERVE_PANDOC`.
    #[serde(default = "default_pandoc")]
    pub pandoc: String,
    /// Kill the conversion after this many milliseconds (default 60 000).
    #[serde(default = "default_convert_timeout_ms")]
    pub timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_listen() -> String {
    "0.0.0.0:9380".to_string()
}
fn default_max_concurrent_requests() -> usize {
    256
}
fn default_max_file_size() -> usize {
    10 * 1024 * 1024 // 10 MB
}
fn default_question_page_size() -> u32 {
    150
}
fn default_bulletin_page_size() -> u32 {
    15
}
fn default_db_path() -> String {
    "~/.kbserve/kbserve.db".to_string()
}
fn default_pool_size() -> u32 {
    8
}
fn default_storage_root() -> String {
    "~/.kbserve/blobs".to_string()
}
fn default_session_cookie() -> String {
    "session".to_string()
}
fn default_pandoc() -> String {
    "pandoc".to_string()
}
fn default_convert_timeout_ms() -> u64 {
    60_000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_concurrent_requests: default_max_concurrent_requests(),
            max_file_size: default_max_file_size(),
            question_page_size: default_question_page_size(),
            bulletin_page_size: default_bulletin_page_size(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            pool_size: default_pool_size(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root: default_storage_root(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_cookie: default_session_cookie(),
        }
    }
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            pandoc: default_pandoc(),
            timeout_ms: default_convert_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, reads that file (panics on failure). Otherwise looks
    /// for `kbserve.toml` in the current directory, falling back to compiled defaults.
    pub fn load(path: Option<&str>) -> Self {
        let mut config = if let Some(p) = path {
            let content = std::fs::read_to_string(p)
                .unwrap_or_else(|e| panic!("Failed to read config file {p}: {e}"));
            Self::parse(&content)
                .unwrap_or_else(|e| panic!("Failed to parse config file {p}: {e}"))
        } else if Path::new("kbserve.toml").exists() {
            let content =
                std::fs::read_to_string("kbserve.toml").expect("Failed to read kbserve.toml");
            Self::parse(&content).expect("Failed to parse kbserve.toml")
        } else {
            Config::default()
        };

        // Env var overrides
        if let Ok(listen) = std::env::var("KBSERVE_LISTEN") {
            config.server.listen = listen;
        }
        if let Ok(db) = std::env::var("KBSERVE_DB_PATH") {
            config.database.path = db;
        }
        if let Ok(root) = std::env::var("KBSERVE_STORAGE_ROOT") {
            config.storage.root = root;
        }
        if let Ok(pandoc) = std::env::var("KBSERVE_PANDOC") {
            config.convert.pandoc = pandoc;
        }

        config.database.path = expand_tilde(&config.database.path).into_owned();
        config.storage.root = expand_tilde(&config.storage.root).into_owned();
        config
    }

    /// Parse a TOML document; missing sections and fields take their defaults.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
