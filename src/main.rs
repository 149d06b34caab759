#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # kbserve
//!
//! Knowledge-base API server: recommended questions and bulletin files per
//! tenant, backed by SQLite and a pluggable blob store.
//!
//! ## Subcommands
//!
//! - `kbserve serve` (default) — run the HTTP server
//! - `kbserve convert <in.docx>` — convert a Word document to Markdown
//! - `kbserve create-tenant --name <n>` — provision a tenant (and owner)
//! - `kbserve issue-token --tenant <id>` — mint an SDK API token
//!
//! ## API surface
//!
//! | Method | Path                              | Auth    | Description                  |
//! |--------|-----------------------------------|---------|------------------------------|
//! | GET    | `/api/health`                     | No      | Liveness probe               |
//! | GET    | `/v1/question/get`                | session | List questions               |
//! | POST   | `/v1/question/create`             | session | Create a question            |
//! | POST   | `/v1/question/update`             | session | Edit an owned question       |
//! | POST   | `/v1/question/rm`                 | session | Delete an owned question     |
//! | GET    | `/api/v1/questions`               | token   | List questions               |
//! | POST   | `/api/v1/question/create`         | token   | Create a question            |
//! | GET    | `/api/v1/bulletin/list`           | token   | List a folder                |
//! | GET    | `/api/v1/bulletin/get/{file_id}`  | token   | Download file content        |
//! | POST   | `/api/v1/bulletin/upload`         | token   | Upload files (multipart)     |
//! | POST   | `/api/v1/bulletin/folder`         | token   | Create a folder              |
//!
//! ## Architecture
//!
//! ```text
//! main.rs          — entry point, clap subcommands, graceful shutdown
//! config.rs        — TOML + env-var configuration
//! auth.rs          — API token and session middleware
//! envelope.rs      — {code, message, data} responses, ApiError
//! state.rs         — AppState shared by handlers
//! routes/
//!   mod.rs         — router assembly, paging parameters
//!   health.rs      — GET /api/health
//!   questions.rs   — recommended question endpoints
//!   bulletin.rs    — bulletin file endpoints
//! services/        — row types and SQL per table
//! db/              — r2d2 SQLite pool, schema, filter/paging helpers
//! storage.rs       — local and in-memory blob stores
//! convert.rs       — pandoc docx → markdown
//! template.rs      — ${{key}} placeholder substitution
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn};

use kbserve::convert::DocxToMarkdown;
use kbserve::services::{ApiTokenService, TenantService, UserService, UserTenantService};
use kbserve::{routes, storage, AppState, Config, Db};

/// Knowledge-base API server.
#[derive(Parser)]
#[command(name = "kbserve", version)]
struct Cli {
    /// Path to TOML config file.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default when no subcommand given).
    Serve,
    /// Convert a .docx document to Markdown with pandoc.
    Convert {
        /// Input .docx file.
        input: PathBuf,
        /// Write Markdown here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Extract embedded images into this directory.
        #[arg(long)]
        extract_media: Option<PathBuf>,
    },
    /// Create a tenant, optionally with an owner account.
    CreateTenant {
        #[arg(long)]
        name: String,
        /// Email of a new user made owner of the tenant.
        #[arg(long)]
        owner_email: Option<String>,
    },
    /// Issue an SDK API token for a tenant.
    IssueToken {
        #[arg(long)]
        tenant: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref());

    // Logs go to stderr so command output on stdout stays clean.
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(config).await,
        Commands::Convert {
            input,
            output,
            extract_media,
        } => run_convert(&config, input, output, extract_media).await,
        Commands::CreateTenant { name, owner_email } => {
            create_tenant(&config, name, owner_email).await
        }
        Commands::IssueToken { tenant } => issue_token(&config, tenant).await,
    }
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    info!("kbserve v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}", config.server.listen);
    if config.database.path == ":memory:" {
        warn!("Using an in-memory database, all data is lost on exit");
    }

    let db = open_db(&config)?;
    let storage = storage::from_config(&config.storage);
    let state = AppState::new(config, db, storage);
    let app = routes::router(state.clone());

    let listener = TcpListener::bind(&state.config.server.listen)
        .await
        .with_context(|| format!("Failed to bind {}", state.config.server.listen))?;

    info!("Server ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Goodbye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to register SIGTERM");
        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received SIGINT");
    }
    info!("Shutting down...");
}

async fn run_convert(
    config: &Config,
    input: PathBuf,
    output: Option<PathBuf>,
    extract_media: Option<PathBuf>,
) -> anyhow::Result<()> {
    let job = DocxToMarkdown {
        input,
        output,
        extract_media,
    };
    let markdown = job
        .run(&config.convert.pandoc, config.convert.timeout_ms)
        .await?;
    match job.output {
        Some(ref out) => info!("Wrote {}", out.display()),
        None => print!("{markdown}"),
    }
    Ok(())
}

async fn create_tenant(
    config: &Config,
    name: String,
    owner_email: Option<String>,
) -> anyhow::Result<()> {
    let db = open_db(config)?;
    let (tenant, owner) = db
        .run(move |conn| {
            let tenant = TenantService::create(conn, &name)?;
            let owner = match owner_email {
                Some(email) => {
                    let nickname = email.split('@').next().unwrap_or_default().to_string();
                    let user = UserService::create(conn, &email, &nickname)?;
                    UserTenantService::create(conn, &user.id, &tenant.id, "owner")?;
                    Some(user)
                }
                None => None,
            };
            Ok((tenant, owner))
        })
        .await?;

    println!("tenant_id: {}", tenant.id);
    if let Some(user) = owner {
        println!("owner_id: {}", user.id);
        println!("session_token: {}", user.access_token);
    }
    Ok(())
}

async fn issue_token(config: &Config, tenant: String) -> anyhow::Result<()> {
    let db = open_db(config)?;
    let token = db
        .run(move |conn| ApiTokenService::issue(conn, &tenant))
        .await?;
    println!("{token}");
    Ok(())
}

fn open_db(config: &Config) -> anyhow::Result<Db> {
    Db::open(&config.database.path, config.database.pool_size)
        .with_context(|| format!("Failed to open database {}", config.database.path))
}
