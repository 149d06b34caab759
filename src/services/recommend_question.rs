//! Recommended questions: suggested queries shown to end users of an app.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::STATUS_VALID;
use crate::db::query::{Filter, Page, SortColumn};
use crate::db::DbResult;
use crate::util::{current_timestamp, datetime_format, new_id};

/// Whether a question is offered to users (`"Y"`) or hidden (`"N"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Validity {
    #[default]
    #[serde(rename = "Y")]
    Valid,
    #[serde(rename = "N")]
    Invalid,
}

impl Validity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "Y",
            Self::Invalid => "N",
        }
    }
}

impl ToSql for Validity {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Validity {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "Y" => Ok(Self::Valid),
            "N" => Ok(Self::Invalid),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendQuestion {
    pub id: String,
    pub question: String,
    pub tenant_id: String,
    pub app_code: String,
    pub sys_code: String,
    pub user_code: String,
    pub valid: Validity,
    pub status: String,
    pub create_time: i64,
    pub create_date: String,
    pub update_time: i64,
    pub update_date: String,
}

impl RecommendQuestion {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            question: row.get("question")?,
            tenant_id: row.get("tenant_id")?,
            app_code: row.get("app_code")?,
            sys_code: row.get("sys_code")?,
            user_code: row.get("user_code")?,
            valid: row.get("valid")?,
            status: row.get("status")?,
            create_time: row.get("create_time")?,
            create_date: row.get("create_date")?,
            update_time: row.get("update_time")?,
            update_date: row.get("update_date")?,
        })
    }
}

/// Equality filters for [`RecommendQuestionService::get_list`]. `None` and
/// empty strings match everything.
#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    pub tenant_id: Option<String>,
    pub id: Option<String>,
    pub app_code: Option<String>,
    pub sys_code: Option<String>,
    pub user_code: Option<String>,
}

/// Sortable columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QuestionOrder {
    Id,
    Question,
    AppCode,
    SysCode,
    UserCode,
    Valid,
    #[default]
    CreateTime,
    CreateDate,
    UpdateTime,
    UpdateDate,
}

impl QuestionOrder {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "id" => Self::Id,
            "question" => Self::Question,
            "app_code" => Self::AppCode,
            "sys_code" => Self::SysCode,
            "user_code" => Self::UserCode,
            "valid" => Self::Valid,
            "create_time" => Self::CreateTime,
            "create_date" => Self::CreateDate,
            "update_time" => Self::UpdateTime,
            "update_date" => Self::UpdateDate,
            _ => return None,
        })
    }
}

impl SortColumn for QuestionOrder {
    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Question => "question",
            Self::AppCode => "app_code",
            Self::SysCode => "sys_code",
            Self::UserCode => "user_code",
            Self::Valid => "valid",
            Self::CreateTime => "create_time",
            Self::CreateDate => "create_date",
            Self::UpdateTime => "update_time",
            Self::UpdateDate => "update_date",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewRecommendQuestion {
    /// Caller-chosen id; generated when `None`.
    pub id: Option<String>,
    pub tenant_id: String,
    pub question: String,
    pub app_code: String,
    pub sys_code: String,
    pub user_code: String,
    pub valid: Validity,
}

/// Fields a question edit may change.
#[derive(Debug, Clone, Default)]
pub struct QuestionUpdate {
    pub question: Option<String>,
    pub valid: Option<Validity>,
}

pub struct RecommendQuestionService;

impl RecommendQuestionService {
    /// One page of matching questions plus the total match count.
    pub fn get_list(
        conn: &Connection,
        filter: &QuestionFilter,
        page: &Page<QuestionOrder>,
    ) -> DbResult<(Vec<RecommendQuestion>, u64)> {
        let f = Filter::new()
            .eq("id", filter.id.as_deref())
            .eq("app_code", filter.app_code.as_deref())
            .eq("user_code", filter.user_code.as_deref())
            .eq("sys_code", filter.sys_code.as_deref())
            .eq("tenant_id", filter.tenant_id.as_deref());
        let where_sql = f.where_sql();

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM recommend_question{where_sql}"),
            params_from_iter(f.params()),
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM recommend_question{where_sql}{}",
            page.tail_sql()
        ))?;
        let rows = stmt
            .query_map(params_from_iter(f.params()), RecommendQuestion::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok((rows, u64::try_from(total).unwrap_or_default()))
    }

    pub fn insert(conn: &Connection, new: NewRecommendQuestion) -> DbResult<RecommendQuestion> {
        let now = current_timestamp();
        let date = datetime_format(now);
        let row = RecommendQuestion {
            id: new.id.filter(|id| !id.is_empty()).unwrap_or_else(new_id),
            question: new.question,
            tenant_id: new.tenant_id,
            app_code: new.app_code,
            sys_code: new.sys_code,
            user_code: new.user_code,
            valid: new.valid,
            status: STATUS_VALID.to_string(),
            create_time: now,
            create_date: date.clone(),
            update_time: now,
            update_date: date,
        };
        conn.execute(
            "INSERT INTO recommend_question (id, question, tenant_id, app_code, sys_code, user_code,
                                             valid, status, create_time, create_date, update_time, update_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                row.id,
                row.question,
                row.tenant_id,
                row.app_code,
                row.sys_code,
                row.user_code,
                row.valid,
                row.status,
                row.create_time,
                row.create_date,
                row.update_time,
                row.update_date
            ],
        )?;
        Ok(row)
    }

    /// Ids of every question owned by `tenant_id`.
    pub fn get_recommendquestion_ids(conn: &Connection, tenant_id: &str) -> DbResult<Vec<String>> {
        let mut stmt = conn.prepare("SELECT id FROM recommend_question WHERE tenant_id = ?1")?;
        let ids = stmt
            .query_map(params![tenant_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// The question when both it and its tenant are live.
    pub fn get_detail(conn: &Connection, id: &str) -> DbResult<Option<RecommendQuestion>> {
        Ok(conn
            .query_row(
                "SELECT q.* FROM recommend_question q
                 JOIN tenant t ON t.id = q.tenant_id AND t.status = ?2
                 WHERE q.id = ?1 AND q.status = ?2",
                params![id, STATUS_VALID],
                RecommendQuestion::from_row,
            )
            .optional()?)
    }

    /// Apply `update`; returns whether a row was changed.
    pub fn update_by_id(conn: &Connection, id: &str, update: &QuestionUpdate) -> DbResult<bool> {
        let now = current_timestamp();
        let mut sets = vec!["update_time = ?", "update_date = ?"];
        let mut values = vec![Value::Integer(now), Value::Text(datetime_format(now))];
        if let Some(ref q) = update.question {
            sets.push("question = ?");
            values.push(Value::Text(q.clone()));
        }
        if let Some(v) = update.valid {
            sets.push("valid = ?");
            values.push(Value::Text(v.as_str().to_string()));
        }
        values.push(Value::Text(id.to_string()));
        let changed = conn.execute(
            &format!("UPDATE recommend_question SET {} WHERE id = ?", sets.join(", ")),
            params_from_iter(values),
        )?;
        Ok(changed > 0)
    }

    pub fn delete_by_id(conn: &Connection, id: &str) -> DbResult<bool> {
        let changed = conn.execute("DELETE FROM recommend_question WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_conn;
    use crate::services::TenantService;

    fn new_question(tenant: &str, question: &str, app: &str, sys: &str, user: &str) -> NewRecommendQuestion {
        NewRecommendQuestion {
            id: None,
            tenant_id: tenant.to_string(),
            question: question.to_string(),
            app_code: app.to_string(),
            sys_code: sys.to_string(),
            user_code: user.to_string(),
            valid: Validity::Valid,
        }
    }

    fn page(page: u32, page_size: u32, orderby: QuestionOrder, desc: bool) -> Page<QuestionOrder> {
        Page {
            page,
            page_size,
            orderby,
            desc,
        }
    }

    fn tenant_filter(tenant: &str) -> QuestionFilter {
        QuestionFilter {
            tenant_id: Some(tenant.to_string()),
            ..QuestionFilter::default()
        }
    }

    #[test]
    fn test_insert_then_list_returns_it_once() {
        let conn = test_conn();
        let created = RecommendQuestionService::insert(
            &conn,
            new_question("t1", "How do I reset my password?", "app", "sys", "u1"),
        )
        .unwrap();
        assert_eq!(created.id.len(), 32);
        assert_eq!(created.status, "1");

        let (rows, total) = RecommendQuestionService::get_list(
            &conn,
            &tenant_filter("t1"),
            &page(1, 150, QuestionOrder::CreateTime, false),
        )
        .unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows, vec![created]);
    }

    #[test]
    fn test_caller_supplied_id_kept() {
        let conn = test_conn();
        let mut q = new_question("t1", "q", "a", "s", "u");
        q.id = Some("abc123".into());
        let row = RecommendQuestionService::insert(&conn, q.clone()).unwrap();
        assert_eq!(row.id, "abc123");
        // Duplicate ids are rejected by the primary key.
        assert!(RecommendQuestionService::insert(&conn, q).is_err());
    }

    #[test]
    fn test_filters_exclude_non_matching() {
        let conn = test_conn();
        for (app, sys, user) in [("a1", "s1", "u1"), ("a1", "s2", "u1"), ("a2", "s1", "u2")] {
            RecommendQuestionService::insert(&conn, new_question("t1", "q", app, sys, user)).unwrap();
        }
        RecommendQuestionService::insert(&conn, new_question("t2", "q", "a1", "s1", "u1")).unwrap();
        let p = page(1, 150, QuestionOrder::CreateTime, false);

        let by_app = QuestionFilter {
            app_code: Some("a1".into()),
            ..tenant_filter("t1")
        };
        let (rows, total) = RecommendQuestionService::get_list(&conn, &by_app, &p).unwrap();
        assert_eq!(total, 2);
        assert!(rows.iter().all(|r| r.app_code == "a1" && r.tenant_id == "t1"));

        let by_all = QuestionFilter {
            app_code: Some("a1".into()),
            sys_code: Some("s1".into()),
            user_code: Some("u1".into()),
            ..tenant_filter("t1")
        };
        assert_eq!(RecommendQuestionService::get_list(&conn, &by_all, &p).unwrap().1, 1);

        let by_user = QuestionFilter {
            user_code: Some("u2".into()),
            ..tenant_filter("t1")
        };
        let (rows, _) = RecommendQuestionService::get_list(&conn, &by_user, &p).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].app_code, "a2");

        let empty_is_ignored = QuestionFilter {
            sys_code: Some(String::new()),
            ..tenant_filter("t1")
        };
        assert_eq!(RecommendQuestionService::get_list(&conn, &empty_is_ignored, &p).unwrap().1, 3);

        let by_id = QuestionFilter {
            id: Some(rows[0].id.clone()),
            ..QuestionFilter::default()
        };
        assert_eq!(RecommendQuestionService::get_list(&conn, &by_id, &p).unwrap().1, 1);
    }

    #[test]
    fn test_pagination_bounds_and_offsets() {
        let conn = test_conn();
        for i in 0..7 {
            RecommendQuestionService::insert(&conn, new_question("t1", &format!("q{i}"), "a", "s", "u"))
                .unwrap();
        }
        let f = tenant_filter("t1");
        let (p1, total) =
            RecommendQuestionService::get_list(&conn, &f, &page(1, 3, QuestionOrder::Question, false)).unwrap();
        let (p3, _) =
            RecommendQuestionService::get_list(&conn, &f, &page(3, 3, QuestionOrder::Question, false)).unwrap();
        let (p4, _) =
            RecommendQuestionService::get_list(&conn, &f, &page(4, 3, QuestionOrder::Question, false)).unwrap();
        assert_eq!(total, 7);
        assert_eq!(
            p1.iter().map(|r| r.question.as_str()).collect::<Vec<_>>(),
            ["q0", "q1", "q2"]
        );
        assert_eq!(p3.len(), 1);
        assert_eq!(p3[0].question, "q6");
        assert!(p4.is_empty());
    }

    #[test]
    fn test_desc_reverses_order() {
        let conn = test_conn();
        for q in ["b", "a", "c"] {
            RecommendQuestionService::insert(&conn, new_question("t1", q, "a", "s", "u")).unwrap();
        }
        let f = tenant_filter("t1");
        let (asc, _) =
            RecommendQuestionService::get_list(&conn, &f, &page(1, 10, QuestionOrder::Question, false)).unwrap();
        let (desc, _) =
            RecommendQuestionService::get_list(&conn, &f, &page(1, 10, QuestionOrder::Question, true)).unwrap();
        let names = |rows: &[RecommendQuestion]| rows.iter().map(|r| r.question.clone()).collect::<Vec<_>>();
        assert_eq!(names(&asc), ["a", "b", "c"]);
        assert_eq!(names(&desc), ["c", "b", "a"]);
    }

    #[test]
    fn test_detail_requires_live_tenant() {
        let conn = test_conn();
        let tenant = TenantService::create(&conn, "acme").unwrap();
        let q = RecommendQuestionService::insert(&conn, new_question(&tenant.id, "q", "a", "s", "u")).unwrap();
        assert_eq!(
            RecommendQuestionService::get_detail(&conn, &q.id).unwrap().map(|d| d.id),
            Some(q.id.clone())
        );
        conn.execute("UPDATE tenant SET status = '0'", []).unwrap();
        assert!(RecommendQuestionService::get_detail(&conn, &q.id).unwrap().is_none());
    }

    #[test]
    fn test_update_and_delete() {
        let conn = test_conn();
        let tenant = TenantService::create(&conn, "acme").unwrap();
        let q = RecommendQuestionService::insert(&conn, new_question(&tenant.id, "old", "a", "s", "u")).unwrap();
        let changed = RecommendQuestionService::update_by_id(
            &conn,
            &q.id,
            &QuestionUpdate {
                question: Some("new".into()),
                valid: Some(Validity::Invalid),
            },
        )
        .unwrap();
        assert!(changed);
        let detail = RecommendQuestionService::get_detail(&conn, &q.id).unwrap().unwrap();
        assert_eq!(detail.question, "new");
        assert_eq!(detail.valid, Validity::Invalid);

        assert_eq!(
            RecommendQuestionService::get_recommendquestion_ids(&conn, &tenant.id).unwrap(),
            vec![q.id.clone()]
        );
        assert!(RecommendQuestionService::delete_by_id(&conn, &q.id).unwrap());
        assert!(!RecommendQuestionService::delete_by_id(&conn, &q.id).unwrap());
        assert!(RecommendQuestionService::get_recommendquestion_ids(&conn, &tenant.id)
            .unwrap()
            .is_empty());
    }
}
