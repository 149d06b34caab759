//! Conditional `WHERE` construction, single-column ordering, and offset
//! pagination shared by the services.

use rusqlite::types::Value;

/// Conjunction of optional predicates plus their bound parameters.
#[derive(Debug, Default)]
pub struct Filter {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = value`, skipped when `value` is `None` or empty.
    #[must_use]
    pub fn eq(mut self, column: &'static str, value: Option<&str>) -> Self {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            self.clauses.push(format!("{column} = ?"));
            self.params.push(Value::Text(v.to_string()));
        }
        self
    }

    /// `column != value`, always applied.
    #[must_use]
    pub fn ne(mut self, column: &'static str, value: &str) -> Self {
        self.clauses.push(format!("{column} != ?"));
        self.params.push(Value::Text(value.to_string()));
        self
    }

    /// Case-insensitive substring match, skipped when `needle` is empty.
    #[must_use]
    pub fn contains_ci(mut self, column: &'static str, needle: Option<&str>) -> Self {
        if let Some(n) = needle.filter(|n| !n.is_empty()) {
            self.clauses
                .push(format!("instr(unicode_lower({column}), ?) > 0"));
            self.params.push(Value::Text(n.to_lowercase()));
        }
        self
    }

    /// ` WHERE a AND b` or the empty string.
    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// Sort column whitelist for one table.
pub trait SortColumn: Copy {
    fn column(self) -> &'static str;
}

/// Requested page of an ordered listing.
#[derive(Debug, Clone, Copy)]
pub struct Page<C> {
    /// 1-based page number; 0 is treated as 1.
    pub page: u32,
    pub page_size: u32,
    pub orderby: C,
    pub desc: bool,
}

impl<C: SortColumn> Page<C> {
    /// ` ORDER BY col DIR, id ASC LIMIT n OFFSET m`.
    ///
    /// `id` breaks ties so consecutive pages never overlap.
    pub fn tail_sql(&self) -> String {
        let dir = if self.desc { "DESC" } else { "ASC" };
        let offset = u64::from(self.page.max(1) - 1) * u64::from(self.page_size);
        format!(
            " ORDER BY {} {dir}, id ASC LIMIT {} OFFSET {offset}",
            self.orderby.column(),
            self.page_size
        )
    }
}

/// Interpret a query-string flag: `1`, `true`, `yes`, `on` (any case) are set.
pub fn parse_flag(raw: Option<&str>) -> bool {
    raw.map(str::trim).is_some_and(|v| {
        ["1", "true", "yes", "on"]
            .iter()
            .any(|t| v.eq_ignore_ascii_case(t))
    })
}
