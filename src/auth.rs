//! Request authentication.
//!
//! Two schemes guard the API:
//!
//! - **SDK token** (`/api/v1/*`): `Authorization: Bearer <token>`. The token
//!   maps to exactly one tenant; handlers receive it as [`TenantId`].
//! - **Web session** (`/v1/question/*`): a cookie (default name `session`)
//!   carrying a user's access token. Handlers receive the [`SessionUser`]
//!   and resolve the tenant themselves.
//!
//! Token failures are reported in the JSON envelope with code 109; a missing
//! or unknown session is HTTP 401.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::envelope::ApiError;
use crate::services::{ApiTokenService, User, UserService};
use crate::AppState;

/// Tenant resolved from an SDK token.
#[derive(Clone, Debug)]
pub struct TenantId(pub String);

/// User resolved from the session cookie.
#[derive(Clone, Debug)]
pub struct SessionUser(pub User);

/// Axum middleware for the SDK surface. Resolves the Bearer token to a tenant
/// and stores it as a [`TenantId`] extension.
pub async fn require_api_token(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match bearer_token(request.headers()) {
        Ok(t) => t,
        Err(e) => return e.into_response(),
    };

    let tenant = match state
        .db
        .run(move |conn| ApiTokenService::tenant_for(conn, &token))
        .await
    {
        Ok(Some(tenant)) => tenant,
        Ok(None) => {
            return ApiError::Authentication(
                "Authentication error: API key is invalid!".to_string(),
            )
            .into_response()
        }
        Err(e) => return ApiError::from(e).into_response(),
    };

    debug!("Authenticated tenant {tenant}");
    request.extensions_mut().insert(TenantId(tenant));
    next.run(request).await
}

/// Axum middleware for the web surface. Resolves the session cookie to an
/// active user and stores it as a [`SessionUser`] extension.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(access_token) = cookie_value(request.headers(), &state.config.auth.session_cookie)
    else {
        return ApiError::Unauthorized.into_response();
    };

    match state
        .db
        .run(move |conn| UserService::get_by_access_token(conn, &access_token))
        .await
    {
        Ok(Some(user)) => {
            request.extensions_mut().insert(SessionUser(user));
            next.run(request).await
        }
        Ok(None) => ApiError::Unauthorized.into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Second whitespace-separated word of the `Authorization` header.
fn bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Authentication("`Authorization` can't be empty".to_string()))?;
    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(_), Some(token)) => Ok(token.to_string()),
        _ => Err(ApiError::Authentication(
            "Please check your authorization format.".to_string(),
        )),
    }
}

/// Value of cookie `name` across all `Cookie` headers.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(
            bearer_token(&headers).unwrap_err().to_string(),
            "`Authorization` can't be empty"
        );
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("kb-abc"));
        assert_eq!(
            bearer_token(&headers).unwrap_err().to_string(),
            "Please check your authorization format."
        );
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer kb-abc"));
        assert_eq!(bearer_token(&headers).unwrap(), "kb-abc");
    }

    #[test]
    fn test_cookie_value() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark; lang=en"));
        headers.append(header::COOKIE, HeaderValue::from_static("session=\"tok123\""));
        assert_eq!(cookie_value(&headers, "session").as_deref(), Some("tok123"));
        assert_eq!(cookie_value(&headers, "lang").as_deref(), Some("en"));
        assert_eq!(cookie_value(&headers, "missing"), None);

        let mut empty = HeaderMap::new();
        empty.insert(header::COOKIE, HeaderValue::from_static("session="));
        assert_eq!(cookie_value(&empty, "session"), None);
    }
}
