//! Tenants, users, their membership, and SDK API tokens.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use super::STATUS_VALID;
use crate::db::DbResult;
use crate::util::{current_timestamp, datetime_format, new_id};

#[derive(Debug, Clone, Serialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub status: String,
    pub create_time: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub nickname: String,
    /// Web session token; presented in the session cookie.
    #[serde(skip_serializing)]
    pub access_token: String,
    pub status: String,
}

impl User {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            email: row.get("email")?,
            nickname: row.get("nickname")?,
            access_token: row.get("access_token")?,
            status: row.get("status")?,
        })
    }
}

/// A user's membership in a tenant.
#[derive(Debug, Clone, Serialize)]
pub struct UserTenant {
    pub id: String,
    pub user_id: String,
    pub tenant_id: String,
    pub role: String,
}

pub struct TenantService;

impl TenantService {
    pub fn create(conn: &Connection, name: &str) -> DbResult<Tenant> {
        let now = current_timestamp();
        let date = datetime_format(now);
        let tenant = Tenant {
            id: new_id(),
            name: name.to_string(),
            status: STATUS_VALID.to_string(),
            create_time: now,
        };
        conn.execute(
            "INSERT INTO tenant (id, name, status, create_time, create_date, update_time, update_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?4, ?5)",
            params![tenant.id, tenant.name, tenant.status, now, date],
        )?;
        info!("Created tenant {} ({})", tenant.id, tenant.name);
        Ok(tenant)
    }
}

pub struct UserService;

impl UserService {
    /// Create a user with a fresh access token.
    pub fn create(conn: &Connection, email: &str, nickname: &str) -> DbResult<User> {
        let now = current_timestamp();
        let date = datetime_format(now);
        let user = User {
            id: new_id(),
            email: email.to_string(),
            nickname: nickname.to_string(),
            access_token: new_id(),
            status: STATUS_VALID.to_string(),
        };
        conn.execute(
            "INSERT INTO user (id, email, nickname, access_token, status,
                               create_time, create_date, update_time, update_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?6, ?7)",
            params![
                user.id,
                user.email,
                user.nickname,
                user.access_token,
                user.status,
                now,
                date
            ],
        )?;
        Ok(user)
    }

    /// Active user owning `access_token`.
    pub fn get_by_access_token(conn: &Connection, access_token: &str) -> DbResult<Option<User>> {
        Ok(conn
            .query_row(
                "SELECT * FROM user WHERE access_token = ?1 AND status = ?2",
                params![access_token, STATUS_VALID],
                User::from_row,
            )
            .optional()?)
    }
}

pub struct UserTenantService;

impl UserTenantService {
    pub fn create(
        conn: &Connection,
        user_id: &str,
        tenant_id: &str,
        role: &str,
    ) -> DbResult<UserTenant> {
        let now = current_timestamp();
        let date = datetime_format(now);
        let membership = UserTenant {
            id: new_id(),
            user_id: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            role: role.to_string(),
        };
        conn.execute(
            "INSERT INTO user_tenant (id, user_id, tenant_id, role, status,
                                      create_time, create_date, update_time, update_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?6, ?7)",
            params![
                membership.id,
                membership.user_id,
                membership.tenant_id,
                membership.role,
                STATUS_VALID,
                now,
                date
            ],
        )?;
        Ok(membership)
    }

    /// Active memberships of `user_id`, oldest first.
    pub fn query(conn: &Connection, user_id: &str) -> DbResult<Vec<UserTenant>> {
        let mut stmt = conn.prepare(
            "SELECT id, user_id, tenant_id, role FROM user_tenant
             WHERE user_id = ?1 AND status = ?2
             ORDER BY create_time ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![user_id, STATUS_VALID], |row| {
                Ok(UserTenant {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    tenant_id: row.get(2)?,
                    role: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

pub struct ApiTokenService;

impl ApiTokenService {
    /// Issue a new token for `tenant_id`. Only its hash is stored, so the
    /// returned plaintext cannot be recovered later.
    pub fn issue(conn: &Connection, tenant_id: &str) -> DbResult<String> {
        let token = format!("kb-{}", new_id());
        let now = current_timestamp();
        conn.execute(
            "INSERT INTO api_token (token_hash, tenant_id, create_time, create_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![hash_token(&token), tenant_id, now, datetime_format(now)],
        )?;
        info!("Issued API token for tenant {tenant_id}");
        Ok(token)
    }

    /// Tenant owning `token`, if any.
    pub fn tenant_for(conn: &Connection, token: &str) -> DbResult<Option<String>> {
        Ok(conn
            .query_row(
                "SELECT tenant_id FROM api_token WHERE token_hash = ?1",
                params![hash_token(token)],
                |row| row.get(0),
            )
            .optional()?)
    }
}

/// Hex SHA-256 of a token.
pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}
