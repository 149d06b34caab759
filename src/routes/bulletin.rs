//! Bulletin file endpoints (SDK token required).
//!
//! - `GET  /api/v1/bulletin/list`             — page through a folder
//! - `GET  /api/v1/bulletin/get/{file_id}`    — raw file content
//! - `POST /api/v1/bulletin/upload`           — multipart upload
//! - `POST /api/v1/bulletin/folder`           — create a folder
//!
//! Rows of other tenants are invisible: looking one up by id behaves exactly
//! like a missing row.
//!
//! ## Storage layout
//!
//! Content is stored under bucket = parent folder id and key = `location`.
//! The location starts as the uploaded file name and gains `_` suffixes
//! until it does not collide with an existing blob, so replacing a file
//! never overwrites another row's content.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Multipart, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{parse_body, PageQuery};
use crate::auth::TenantId;
use crate::db::DbResult;
use crate::envelope::{json_result, ApiError};
use crate::services::file::{filename_type, guess_content_type};
use crate::services::{File, FileOrder, FileService, FileType, NewFile};
use crate::AppState;

/// Longest accepted file name, in bytes.
const FILE_NAME_LEN_LIMIT: usize = 255;

/// Query parameters for `GET /api/v1/bulletin/list`.
///
/// `app_code` and `sys_code` are accepted for client compatibility; files
/// carry no such columns so they do not narrow the listing.
#[derive(Debug, Deserialize)]
pub struct BulletinListQuery {
    pub parent_id: Option<String>,
    pub keywords: Option<String>,
    pub app_code: Option<String>,
    pub sys_code: Option<String>,
    #[serde(flatten)]
    pub paging: PageQuery,
}

#[derive(Debug, Deserialize)]
struct CreateFolderBody {
    name: String,
    parent_id: Option<String>,
}

/// `GET /api/v1/bulletin/list`
pub async fn list_files(
    State(state): State<AppState>,
    Extension(TenantId(tenant_id)): Extension<TenantId>,
    Query(query): Query<BulletinListQuery>,
) -> Result<Json<Value>, ApiError> {
    let page = query
        .paging
        .resolve(state.config.server.bulletin_page_size, FileOrder::parse)?;
    let parent_id = query.parent_id;
    let keywords = query.keywords;

    let data = state
        .db
        .run(move |conn| {
            let folder = match find_folder(conn, &tenant_id, parent_id.as_deref())? {
                Some(folder) => folder,
                None => return Ok(Err(ApiError::data("Folder not found!"))),
            };
            let (files, total) =
                FileService::get_by_pf_id(conn, &tenant_id, &folder.id, &page, keywords.as_deref())?;
            let Some(parent_folder) = FileService::get_parent_folder(conn, &folder.id)? else {
                return Ok(Err(ApiError::data("File not found!")));
            };
            Ok(Ok(json!({
                "total": total,
                "files": files,
                "parent_folder": parent_folder,
            })))
        })
        .await??;
    Ok(json_result(data))
}

/// `GET /api/v1/bulletin/get/{file_id}` — the stored bytes with a content
/// type guessed from the file name.
pub async fn get_file(
    State(state): State<AppState>,
    Extension(TenantId(tenant_id)): Extension<TenantId>,
    Path(file_id): Path<String>,
) -> Result<Response, ApiError> {
    let file = state
        .db
        .run(move |conn| FileService::get_tenant_file(conn, &tenant_id, &file_id))
        .await?
        .filter(|f| !f.is_folder())
        .ok_or_else(|| ApiError::data("Document not found!"))?;

    let content = state
        .storage
        .get(&file.parent_id, &file.location)
        .await?
        .ok_or_else(|| ApiError::data("Document not found!"))?;
    debug!("Serving {} ({} bytes)", file.name, content.len());

    let content_type = guess_content_type(&file.name, file.file_type)
        .unwrap_or_else(|| "application/octet-stream".to_string());
    Ok(([(header::CONTENT_TYPE, content_type)], content).into_response())
}

/// `POST /api/v1/bulletin/upload` — multipart with one or more `file`
/// parts and an optional `parent_id` field. Returns the inserted rows.
pub async fn upload(
    State(state): State<AppState>,
    Extension(TenantId(tenant_id)): Extension<TenantId>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let max_size = state.config.server.max_file_size;
    let mut parent_id: Option<String> = None;
    let mut uploads: Vec<(String, Bytes)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::argument(e.body_text()))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "parent_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::argument(e.body_text()))?;
                parent_id = Some(text.trim().to_string());
            }
            "file" => {
                let name = field.file_name().map(base_name).unwrap_or_default();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::argument(e.body_text()))?;
                uploads.push((name, data));
            }
            _ => {}
        }
    }

    if uploads.is_empty() {
        return Err(ApiError::argument("No file part!"));
    }
    for (name, data) in &uploads {
        if name.is_empty() || name == "." || name == ".." {
            return Err(ApiError::argument("No file selected!"));
        }
        if name.len() > FILE_NAME_LEN_LIMIT {
            return Err(ApiError::argument(format!(
                "File name must be {FILE_NAME_LEN_LIMIT} bytes or less."
            )));
        }
        if data.len() > max_size {
            return Err(ApiError::argument(format!(
                "File size exceeds the limit of {max_size} bytes."
            )));
        }
    }

    let tenant = tenant_id.clone();
    let folder = state
        .db
        .run(move |conn| find_folder(conn, &tenant, parent_id.as_deref()))
        .await?
        .ok_or_else(|| ApiError::data("Can't find this folder!"))?;

    // Blobs first, then every row in one transaction. Any failure removes
    // the blobs written so far, so the batch lands whole or not at all.
    let mut staged: Vec<(String, String, i64)> = Vec::with_capacity(uploads.len());
    for (name, data) in uploads {
        let size = i64::try_from(data.len()).unwrap_or(i64::MAX);
        match store_blob(&state, &folder.id, &name, data).await {
            Ok(location) => staged.push((name, location, size)),
            Err(e) => {
                discard_blobs(&state, &folder.id, &staged).await;
                return Err(e);
            }
        }
    }

    let rows = staged.clone();
    let folder_id = folder.id.clone();
    let result = state
        .db
        .run(move |conn| {
            let tx = conn.transaction()?;
            let mut files = Vec::with_capacity(rows.len());
            for (name, location, size) in rows {
                let unique = FileService::duplicate_name(&tx, &tenant_id, &folder_id, &name)?;
                files.push(FileService::insert(
                    &tx,
                    NewFile {
                        parent_id: folder_id.clone(),
                        tenant_id: tenant_id.clone(),
                        created_by: tenant_id.clone(),
                        file_type: filename_type(&unique),
                        name: unique,
                        location,
                        size,
                    },
                )?);
            }
            tx.commit()?;
            Ok(files)
        })
        .await;

    match result {
        Ok(files) => {
            for file in &files {
                info!("Uploaded {} ({} bytes) into folder {}", file.name, file.size, file.parent_id);
            }
            Ok(json_result(files))
        }
        Err(e) => {
            discard_blobs(&state, &folder.id, &staged).await;
            Err(e.into())
        }
    }
}

/// Write one upload under a location no other blob in `bucket` uses.
async fn store_blob(state: &AppState, bucket: &str, name: &str, data: Bytes) -> Result<String, ApiError> {
    let mut location = name.to_string();
    while state.storage.exists(bucket, &location).await? {
        location.push('_');
    }
    state.storage.put(bucket, &location, data.to_vec()).await?;
    Ok(location)
}

async fn discard_blobs(state: &AppState, bucket: &str, staged: &[(String, String, i64)]) {
    for (_, location, _) in staged {
        if let Err(e) = state.storage.delete(bucket, location).await {
            warn!("Failed to remove blob {bucket}/{location}: {e}");
        }
    }
}

/// `POST /api/v1/bulletin/folder` — `{ "name": ..., "parent_id": ... }`.
pub async fn create_folder(
    State(state): State<AppState>,
    Extension(TenantId(tenant_id)): Extension<TenantId>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let req = parse_body::<CreateFolderBody>(body, &["name"])?;
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::argument("Folder name can't be empty."));
    }
    if name.len() > FILE_NAME_LEN_LIMIT {
        return Err(ApiError::argument(format!(
            "Folder name must be {FILE_NAME_LEN_LIMIT} bytes or less."
        )));
    }
    let parent_id = req.parent_id;

    let folder = state
        .db
        .run(move |conn| {
            let Some(parent) = find_folder(conn, &tenant_id, parent_id.as_deref())? else {
                return Ok(Err(ApiError::data("Can't find this folder!")));
            };
            if FileService::name_exists(conn, &tenant_id, &parent.id, &name)? {
                return Ok(Err(ApiError::data(
                    "Duplicated folder name in the same folder.",
                )));
            }
            let folder = FileService::insert(
                conn,
                NewFile {
                    parent_id: parent.id,
                    tenant_id: tenant_id.clone(),
                    created_by: tenant_id,
                    name,
                    location: String::new(),
                    size: 0,
                    file_type: FileType::Folder,
                },
            )?;
            Ok(Ok(folder))
        })
        .await??;
    info!("Created folder {} ({})", folder.name, folder.id);
    Ok(json_result(folder))
}

/// The folder `parent_id` names, or the tenant root when it is absent.
fn find_folder(conn: &Connection, tenant_id: &str, parent_id: Option<&str>) -> DbResult<Option<File>> {
    match parent_id.filter(|id| !id.is_empty()) {
        None => FileService::get_root_folder(conn, tenant_id).map(Some),
        Some(id) => Ok(FileService::get_tenant_file(conn, tenant_id, id)?.filter(File::is_folder)),
    }
}

/// Last path component of a client-supplied file name.
fn base_name(name: &str) -> String {
    name.rsplit(['/', '\\']).next().unwrap_or_default().trim().to_string()
}
