//! Clause-structured post listing queries.
//!
//! A [`PostQuery`] keeps the DISTINCT flag, joins, author predicate and
//! remaining filters apart until execution, so callers can extend
//! individual clauses (see the archive augmenter in `contributors-core`).
//! Placeholders are named (`:author`) and bound from [`PostQuery::params`].

use contributors_shared::{POST_TYPE_POST, STATUS_PUBLISH, UserId};

/// Columns selected for every post listing, in [`crate::Storage`] row order.
pub(crate) const POST_COLUMNS: &str = "posts.id, posts.author_id, posts.post_type, posts.status, \
     posts.title, posts.content, posts.published_at";

/// A value bound to a named placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryParam {
    Int(i64),
    Text(String),
}

impl From<QueryParam> for libsql::Value {
    fn from(param: QueryParam) -> Self {
        match param {
            QueryParam::Int(v) => libsql::Value::Integer(v),
            QueryParam::Text(v) => libsql::Value::Text(v),
        }
    }
}

/// A posts listing, split into its clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostQuery {
    /// Emit `SELECT DISTINCT`.
    pub distinct: bool,
    /// Complete join fragments appended after `FROM posts`.
    pub joins: Vec<String>,
    /// The primary-author predicate, if the listing is author-scoped.
    pub author_clause: Option<String>,
    /// Other predicates, ANDed together.
    pub filters: Vec<String>,
    /// Named parameters; names include the `:` prefix.
    pub params: Vec<(String, QueryParam)>,
    pub limit: u32,
    pub offset: u32,
}

impl PostQuery {
    /// Default page size for listings.
    pub const DEFAULT_PER_PAGE: u32 = 10;

    /// All published items of the canonical post type, newest first.
    pub fn published_posts() -> Self {
        Self {
            distinct: false,
            joins: Vec::new(),
            author_clause: None,
            filters: vec![
                "posts.post_type = :post_type".into(),
                "posts.status = :status".into(),
            ],
            params: vec![
                (":post_type".into(), QueryParam::Text(POST_TYPE_POST.into())),
                (":status".into(), QueryParam::Text(STATUS_PUBLISH.into())),
            ],
            limit: Self::DEFAULT_PER_PAGE,
            offset: 0,
        }
    }

    /// Published posts whose primary author is `author`.
    pub fn by_author(author: UserId) -> Self {
        let mut query = Self::published_posts();
        query.author_clause = Some("posts.author_id = :author".into());
        query.bind(":author", QueryParam::Int(author.0));
        query
    }

    /// Select a 1-based page.
    pub fn page(mut self, page: u32, per_page: u32) -> Self {
        let per_page = per_page.max(1);
        self.limit = per_page;
        self.offset = page.max(1).saturating_sub(1).saturating_mul(per_page);
        self
    }

    /// Bind (or rebind) a named parameter.
    pub fn bind(&mut self, name: &str, value: QueryParam) {
        match self.params.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value,
            None => self.params.push((name.to_string(), value)),
        }
    }

    /// Look up a bound parameter.
    pub fn param(&self, name: &str) -> Option<&QueryParam> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Assemble the final SQL text.
    pub fn to_sql(&self) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(POST_COLUMNS);
        sql.push_str(" FROM posts");
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join.trim());
        }

        sql.push_str(" WHERE 1=1");
        if let Some(author) = &self.author_clause {
            sql.push_str(&format!(" AND ({author})"));
        }
        for filter in &self.filters {
            sql.push_str(&format!(" AND ({filter})"));
        }

        sql.push_str(" ORDER BY posts.published_at DESC, posts.id DESC");
        sql.push_str(&format!(" LIMIT {} OFFSET {}", self.limit, self.offset));
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_query_sql_shape() {
        let query = PostQuery::by_author(UserId(7)).page(2, 5);
        let sql = query.to_sql();
        assert!(sql.starts_with("SELECT posts.id"));
        assert!(sql.contains("WHERE 1=1 AND (posts.author_id = :author)"));
        assert!(sql.contains("AND (posts.status = :status)"));
        assert!(sql.ends_with("LIMIT 5 OFFSET 5"));
        assert_eq!(query.param(":author"), Some(&QueryParam::Int(7)));
    }

    #[test]
    fn distinct_and_joins_are_emitted_in_place() {
        let mut query = PostQuery::published_posts();
        query.distinct = true;
        query.joins.push("LEFT JOIN post_meta AS m ON (posts.id = m.post_id)".into());
        let sql = query.to_sql();
        assert!(sql.starts_with("SELECT DISTINCT posts.id"));
        assert!(sql.contains("FROM posts LEFT JOIN post_meta AS m ON (posts.id = m.post_id) WHERE"));
    }

    #[test]
    fn rebinding_replaces_value() {
        let mut query = PostQuery::by_author(UserId(1));
        query.bind(":author", QueryParam::Int(2));
        assert_eq!(query.param(":author"), Some(&QueryParam::Int(2)));
        assert_eq!(query.params.iter().filter(|(n, _)| n == ":author").count(), 1);
    }

    #[test]
    fn page_zero_is_first_page() {
        let query = PostQuery::published_posts().page(0, 0);
        assert_eq!(query.limit, 1);
        assert_eq!(query.offset, 0);
    }
}
