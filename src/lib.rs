#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::unused_async)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::redundant_closure_for_method_calls)]

//! kbserve library — the knowledge-base API server as reusable modules.
//!
//! - `routes` — REST handlers and the [`routes::router`] builder
//! - `auth` — API token and session middleware
//! - `envelope` — `{code, message, data}` responses and [`envelope::ApiError`]
//! - `services` — row types and SQL behind each endpoint
//! - `db` — pooled SQLite handle and query helpers
//! - `storage` — blob backends for bulletin contents
//! - `convert` — `.docx` to Markdown through pandoc
//! - `template` — `${{key}}` placeholder substitution

pub mod auth;
pub mod config;
pub mod convert;
pub mod db;
pub mod envelope;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;
pub mod template;
pub mod util;

// Re-export key types at crate root for convenience.
pub use config::Config;
pub use db::Db;
pub use envelope::{ApiError, RetCode};
pub use state::AppState;
pub use template::replace_template_placeholders;
