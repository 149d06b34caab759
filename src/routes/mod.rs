//! HTTP route handlers.
//!
//! Three groups share one [`Router`]:
//!
//! | Group  | Prefix             | Guard                               |
//! |--------|--------------------|-------------------------------------|
//! | public | `/api/health`      | none                                |
//! | web    | `/v1/question/*`   | [`crate::auth::require_session`]    |
//! | sdk    | `/api/v1/*`        | [`crate::auth::require_api_token`]  |

pub mod bulletin;
pub mod health;
pub mod questions;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::db::query::{parse_flag, Page, SortColumn};
use crate::envelope::{validate_request, ApiError};
use crate::AppState;

/// Multipart framing allowance on top of `server.max_file_size`.
const UPLOAD_OVERHEAD: usize = 1024 * 1024;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let max_upload = state
        .config
        .server
        .max_file_size
        .saturating_add(UPLOAD_OVERHEAD);

    let public_routes = Router::new().route("/api/health", get(health::health));

    let web_routes = Router::new()
        .route("/v1/question/get", get(questions::web_list))
        .route("/v1/question/create", post(questions::web_create))
        .route("/v1/question/update", post(questions::web_update))
        .route("/v1/question/rm", post(questions::web_rm))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    let sdk_routes = Router::new()
        .route("/api/v1/questions", get(questions::sdk_list))
        .route("/api/v1/question/create", post(questions::sdk_create))
        .route("/api/v1/bulletin/list", get(bulletin::list_files))
        .route("/api/v1/bulletin/get/{file_id}", get(bulletin::get_file))
        .route("/api/v1/bulletin/folder", post(bulletin::create_folder))
        .route(
            "/api/v1/bulletin/upload",
            post(bulletin::upload).layer(DefaultBodyLimit::max(max_upload)),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_token,
        ));

    Router::new()
        .merge(public_routes)
        .merge(web_routes)
        .merge(sdk_routes)
        .layer(TraceLayer::new_for_http())
        // One semaphore shared by every route; a limit of 0 would refuse all
        // requests forever.
        .layer(GlobalConcurrencyLimitLayer::new(
            state.config.server.max_concurrent_requests.max(1),
        ))
        .with_state(state)
}

/// Paging and ordering parameters shared by the listing endpoints. Values
/// arrive as raw strings so malformed numbers surface as argument errors
/// rather than extractor rejections.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub orderby: Option<String>,
    pub desc: Option<String>,
}

impl PageQuery {
    /// Validate into a [`Page`]. Missing values take defaults; an unknown
    /// `orderby` or a non-numeric `page`/`page_size` is an argument error.
    pub fn resolve<C: SortColumn + Default>(
        &self,
        default_page_size: u32,
        parse_column: fn(&str) -> Option<C>,
    ) -> Result<Page<C>, ApiError> {
        let orderby = match self.orderby.as_deref().map(str::trim) {
            None | Some("") => C::default(),
            Some(name) => parse_column(name)
                .ok_or_else(|| ApiError::argument(format!("Unsupported orderby field: {name}")))?,
        };
        Ok(Page {
            page: parse_number("page", self.page.as_deref(), 1)?,
            page_size: parse_number("page_size", self.page_size.as_deref(), default_page_size)?,
            orderby,
            desc: parse_flag(self.desc.as_deref()),
        })
    }
}

/// Decode a JSON body after checking `required` keys are present.
pub(crate) fn parse_body<T: DeserializeOwned>(
    body: Result<Json<Value>, JsonRejection>,
    required: &[&str],
) -> Result<T, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::argument(e.body_text()))?;
    validate_request(&body, required)?;
    serde_json::from_value(body).map_err(|e| ApiError::argument(format!("Invalid request body: {e}")))
}

fn parse_number(name: &str, raw: Option<&str>, default: u32) -> Result<u32, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| ApiError::argument(format!("{name} must be a non-negative integer"))),
    }
}
