//! Recommended question endpoints.
//!
//! - `GET  /v1/question/get`          — list the session tenant's questions
//! - `POST /v1/question/create`       — create for the session tenant
//! - `POST /v1/question/update`       — edit an owned question
//! - `POST /v1/question/rm`           — delete an owned question
//! - `GET  /api/v1/questions`         — list the token tenant's questions
//! - `POST /api/v1/question/create`   — create for the token tenant
//!
//! Listings return `{ "total": n, "questions": [...] }` where `total` counts
//! every match, not just the page.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_body, PageQuery};
use crate::auth::{SessionUser, TenantId};
use crate::envelope::{json_result, ApiError};
use crate::services::{
    NewRecommendQuestion, QuestionFilter, QuestionOrder, QuestionUpdate, RecommendQuestionService,
    UserTenantService, Validity,
};
use crate::AppState;

const OWNER_ONLY: &str = "Only owner of question authorized for this operation.";

/// Query parameters for the list endpoints. Empty values match everything.
#[derive(Debug, Deserialize)]
pub struct QuestionListQuery {
    pub recommendquestion_id: Option<String>,
    pub app_code: Option<String>,
    pub sys_code: Option<String>,
    pub user_code: Option<String>,
    #[serde(flatten)]
    pub paging: PageQuery,
}

#[derive(Debug, Deserialize)]
struct CreateQuestionBody {
    id: Option<String>,
    question: String,
    app_code: String,
    sys_code: String,
    user_code: String,
    valid: Option<Validity>,
}

#[derive(Debug, Deserialize)]
struct UpdateQuestionBody {
    id: String,
    question: Option<String>,
    valid: Option<Validity>,
}

#[derive(Debug, Deserialize)]
struct RemoveQuestionBody {
    id: String,
}

/// `GET /v1/question/get`
pub async fn web_list(
    State(state): State<AppState>,
    Extension(SessionUser(user)): Extension<SessionUser>,
    Query(query): Query<QuestionListQuery>,
) -> Result<Json<Value>, ApiError> {
    let tenant_id = session_tenant(&state, &user.id).await?;
    list_for_tenant(&state, tenant_id, query).await
}

/// `GET /api/v1/questions`
pub async fn sdk_list(
    State(state): State<AppState>,
    Extension(TenantId(tenant_id)): Extension<TenantId>,
    Query(query): Query<QuestionListQuery>,
) -> Result<Json<Value>, ApiError> {
    list_for_tenant(&state, tenant_id, query).await
}

/// `POST /v1/question/create`
pub async fn web_create(
    State(state): State<AppState>,
    Extension(SessionUser(user)): Extension<SessionUser>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let req = parse_body::<CreateQuestionBody>(body, &["question", "app_code", "sys_code", "user_code"])?;
    let tenant_id = session_tenant(&state, &user.id).await?;
    create_for_tenant(&state, tenant_id, req).await
}

/// `POST /api/v1/question/create`
pub async fn sdk_create(
    State(state): State<AppState>,
    Extension(TenantId(tenant_id)): Extension<TenantId>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let req = parse_body::<CreateQuestionBody>(body, &["question", "app_code", "sys_code", "user_code"])?;
    create_for_tenant(&state, tenant_id, req).await
}

/// `POST /v1/question/update` — returns the edited question.
pub async fn web_update(
    State(state): State<AppState>,
    Extension(SessionUser(user)): Extension<SessionUser>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let req = parse_body::<UpdateQuestionBody>(body, &["id"])?;
    let tenant_id = session_tenant(&state, &user.id).await?;
    ensure_owner(&state, &tenant_id, &req.id).await?;

    let id = req.id;
    let update = QuestionUpdate {
        question: req.question,
        valid: req.valid,
    };
    let detail = state
        .db
        .run(move |conn| {
            RecommendQuestionService::update_by_id(conn, &id, &update)?;
            RecommendQuestionService::get_detail(conn, &id)
        })
        .await?
        .ok_or_else(|| ApiError::data("Question not found!"))?;
    Ok(json_result(detail))
}

/// `POST /v1/question/rm`
pub async fn web_rm(
    State(state): State<AppState>,
    Extension(SessionUser(user)): Extension<SessionUser>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let req = parse_body::<RemoveQuestionBody>(body, &["id"])?;
    let tenant_id = session_tenant(&state, &user.id).await?;
    ensure_owner(&state, &tenant_id, &req.id).await?;

    let id = req.id;
    let removed = state
        .db
        .run(move |conn| RecommendQuestionService::delete_by_id(conn, &id))
        .await?;
    if !removed {
        return Err(ApiError::data("Question not found!"));
    }
    Ok(json_result(true))
}

async fn list_for_tenant(
    state: &AppState,
    tenant_id: String,
    query: QuestionListQuery,
) -> Result<Json<Value>, ApiError> {
    let page = query
        .paging
        .resolve(state.config.server.question_page_size, QuestionOrder::parse)?;
    let filter = QuestionFilter {
        tenant_id: Some(tenant_id),
        id: query.recommendquestion_id,
        app_code: query.app_code,
        sys_code: query.sys_code,
        user_code: query.user_code,
    };
    let (questions, total) = state
        .db
        .run(move |conn| RecommendQuestionService::get_list(conn, &filter, &page))
        .await?;
    Ok(json_result(json!({ "total": total, "questions": questions })))
}

async fn create_for_tenant(
    state: &AppState,
    tenant_id: String,
    req: CreateQuestionBody,
) -> Result<Json<Value>, ApiError> {
    let new = NewRecommendQuestion {
        id: req.id,
        tenant_id,
        question: req.question,
        app_code: req.app_code,
        sys_code: req.sys_code,
        user_code: req.user_code,
        valid: req.valid.unwrap_or_default(),
    };
    let row = state
        .db
        .run(move |conn| RecommendQuestionService::insert(conn, new))
        .await?;
    info!("Created recommended question {} for tenant {}", row.id, row.tenant_id);
    Ok(json_result(row))
}

/// First tenant the user belongs to.
pub(crate) async fn session_tenant(state: &AppState, user_id: &str) -> Result<String, ApiError> {
    let user_id = user_id.to_string();
    state
        .db
        .run(move |conn| UserTenantService::query(conn, &user_id))
        .await?
        .into_iter()
        .next()
        .map(|membership| membership.tenant_id)
        .ok_or_else(|| ApiError::data("Tenant not found!"))
}

async fn ensure_owner(state: &AppState, tenant_id: &str, question_id: &str) -> Result<(), ApiError> {
    let tenant_id = tenant_id.to_string();
    let owned = state
        .db
        .run(move |conn| RecommendQuestionService::get_recommendquestion_ids(conn, &tenant_id))
        .await?;
    if owned.iter().any(|id| id == question_id) {
        Ok(())
    } else {
        Err(ApiError::Permission(OWNER_ONLY.to_string()))
    }
}
