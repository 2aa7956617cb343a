//! Author archive augmentation.
//!
//! An author archive lists posts whose primary author is X. The augmenter
//! widens that listing to posts that name X as a contributor, by extending
//! the predicate, join, and DISTINCT clauses of the [`PostQuery`]. Two
//! strategies are available (see [`MatchStrategy`]):
//!
//! - `Index` joins the `post_contributors` table written alongside each
//!   assignment.
//! - `Serialized` joins the raw assignment record in `post_meta` and matches
//!   its JSON text. The middle and last patterns may run past the id list
//!   into `box_title`, so a title containing `,X,` or `,X]` (for example
//!   "Top 10,50,100") lists the post under X. `Index` has no such case.

use tracing::{debug, instrument};

use contributors_shared::{ASSIGNMENT_META_KEY, MatchStrategy, Post, Result, UserId};
use contributors_storage::{PostQuery, QueryParam, Storage};

const INDEX_JOIN: &str = "LEFT JOIN post_contributors AS contrib ON (posts.id = contrib.post_id)";
const META_JOIN: &str = "LEFT JOIN post_meta AS contrib_meta ON (posts.id = contrib_meta.post_id)";

/// The view a listing query serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestView {
    AuthorArchive(UserId),
    Home,
    Search,
    Single,
}

/// Request facts that decide whether a query is augmented.
#[derive(Debug, Clone, Copy)]
pub struct QueryContext {
    pub view: RequestView,
    /// The request's primary listing, not a widget or secondary loop.
    pub is_main_query: bool,
    pub is_admin: bool,
}

impl QueryContext {
    /// The public main query of an author archive.
    pub fn author_archive(author: UserId) -> Self {
        Self {
            view: RequestView::AuthorArchive(author),
            is_main_query: true,
            is_admin: false,
        }
    }

    /// The archived author, when this query should be augmented.
    fn target(&self) -> Option<UserId> {
        match self.view {
            RequestView::AuthorArchive(author) if self.is_main_query && !self.is_admin => {
                Some(author)
            }
            _ => None,
        }
    }
}

/// Extends author-archive queries with contributor matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveAugmenter {
    strategy: MatchStrategy,
}

impl ArchiveAugmenter {
    pub fn new(strategy: MatchStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> MatchStrategy {
        self.strategy
    }

    /// Apply all three clause extensions. Returns whether the query changed.
    #[instrument(skip_all, fields(strategy = ?self.strategy))]
    pub fn augment(&self, query: &mut PostQuery, ctx: &QueryContext) -> bool {
        let Some(author) = ctx.target() else {
            return false;
        };
        self.augment_join(query, ctx);
        self.augment_where(query, ctx);
        self.augment_distinct(query, ctx);
        debug!(%author, "augmented author archive query");
        true
    }

    /// OR-extend the primary-author predicate with a contributor match.
    pub fn augment_where(&self, query: &mut PostQuery, ctx: &QueryContext) {
        let Some(author) = ctx.target() else {
            return;
        };
        let existing = query
            .author_clause
            .take()
            .unwrap_or_else(|| "posts.author_id = :author".into());
        if query.param(":author").is_none() {
            query.bind(":author", QueryParam::Int(author.0));
        }

        let contributor_match = match self.strategy {
            MatchStrategy::Index => {
                query.bind(":contributor", QueryParam::Int(author.0));
                "contrib.user_id = :contributor".to_string()
            }
            MatchStrategy::Serialized => {
                let [only, first, middle, last] = serialized_patterns(author);
                query.bind(":contrib_key", QueryParam::Text(ASSIGNMENT_META_KEY.into()));
                query.bind(":contrib_only", QueryParam::Text(only));
                query.bind(":contrib_first", QueryParam::Text(first));
                query.bind(":contrib_middle", QueryParam::Text(middle));
                query.bind(":contrib_last", QueryParam::Text(last));
                "contrib_meta.meta_key = :contrib_key AND (\
                 contrib_meta.meta_value LIKE :contrib_only ESCAPE '\\' \
                 OR contrib_meta.meta_value LIKE :contrib_first ESCAPE '\\' \
                 OR contrib_meta.meta_value LIKE :contrib_middle ESCAPE '\\' \
                 OR contrib_meta.meta_value LIKE :contrib_last ESCAPE '\\')"
                    .to_string()
            }
        };

        query.author_clause = Some(format!("({existing}) OR ({contributor_match})"));
    }

    /// Join the table the contributor predicate reads from.
    pub fn augment_join(&self, query: &mut PostQuery, ctx: &QueryContext) {
        if ctx.target().is_none() {
            return;
        }
        let join = match self.strategy {
            MatchStrategy::Index => INDEX_JOIN,
            MatchStrategy::Serialized => META_JOIN,
        };
        if !query.joins.iter().any(|j| j == join) {
            query.joins.push(join.to_string());
        }
    }

    /// A post can match both as author and as contributor, and the join can
    /// multiply rows.
    pub fn augment_distinct(&self, query: &mut PostQuery, ctx: &QueryContext) {
        if ctx.target().is_some() {
            query.distinct = true;
        }
    }
}

/// LIKE patterns matching `user` inside a stored assignment's
/// `contributor_ids` list: only, first, middle, and last element.
///
/// The `%` after the list opener is unbounded, so the last two patterns
/// also match `,X,` and `,X]` anywhere later in the record, box title
/// included.
pub fn serialized_patterns(user: UserId) -> [String; 4] {
    let prefix = r#"%"contributor\_ids":["#;
    [
        format!("{prefix}{user}]%"),
        format!("{prefix}{user},%"),
        format!("{prefix}%,{user},%"),
        format!("{prefix}%,{user}]%"),
    ]
}

/// One page of an author's public archive, including contributed posts.
#[instrument(skip_all, fields(author = %author, page = page))]
pub async fn list_author_archive(
    storage: &Storage,
    augmenter: &ArchiveAugmenter,
    author: UserId,
    page: u32,
    per_page: u32,
) -> Result<Vec<Post>> {
    let mut query = PostQuery::by_author(author).page(page, per_page);
    augmenter.augment(&mut query, &QueryContext::author_archive(author));
    storage.query_posts(&query).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use contributors_shared::{ContributorAssignment, NewPost, PostId};
    use crate::test_support::{add_user, test_storage};

    const STRATEGIES: [MatchStrategy; 2] = [MatchStrategy::Index, MatchStrategy::Serialized];

    async fn assign(storage: &Storage, post_id: PostId, ids: &[UserId], title: &str) {
        let assignment = ContributorAssignment {
            contributor_ids: ids.to_vec(),
            box_title: title.into(),
        };
        storage
            .write_assignment(post_id, &serde_json::to_string(&assignment).unwrap(), ids)
            .await
            .unwrap();
    }

    fn ids(posts: &[Post]) -> Vec<PostId> {
        posts.iter().map(|p| p.id).collect()
    }

    #[test]
    fn other_contexts_are_left_alone() {
        let augmenter = ArchiveAugmenter::default();
        let contexts = [
            QueryContext { view: RequestView::Home, is_main_query: true, is_admin: false },
            QueryContext { view: RequestView::Search, is_main_query: true, is_admin: false },
            QueryContext { is_main_query: false, ..QueryContext::author_archive(UserId(1)) },
            QueryContext { is_admin: true, ..QueryContext::author_archive(UserId(1)) },
        ];
        for ctx in contexts {
            let mut query = PostQuery::by_author(UserId(1));
            let before = query.clone();
            assert!(!augmenter.augment(&mut query, &ctx));
            assert_eq!(query, before);
        }
    }

    #[test]
    fn index_strategy_clause_shape() {
        let mut query = PostQuery::by_author(UserId(7));
        ArchiveAugmenter::new(MatchStrategy::Index)
            .augment(&mut query, &QueryContext::author_archive(UserId(7)));
        let sql = query.to_sql();
        assert!(sql.starts_with("SELECT DISTINCT"));
        assert!(sql.contains(INDEX_JOIN));
        assert!(sql.contains("((posts.author_id = :author) OR (contrib.user_id = :contributor))"));
        assert_eq!(query.param(":contributor"), Some(&QueryParam::Int(7)));
    }

    #[test]
    fn augmenting_twice_adds_one_join() {
        let augmenter = ArchiveAugmenter::new(MatchStrategy::Serialized);
        let ctx = QueryContext::author_archive(UserId(7));
        let mut query = PostQuery::by_author(UserId(7));
        augmenter.augment_join(&mut query, &ctx);
        augmenter.augment_join(&mut query, &ctx);
        assert_eq!(query.joins, vec![META_JOIN.to_string()]);
    }

    #[test]
    fn serialized_patterns_cover_list_positions() {
        let [only, first, middle, last] = serialized_patterns(UserId(12));
        assert_eq!(only, r#"%"contributor\_ids":[12]%"#);
        assert_eq!(first, r#"%"contributor\_ids":[12,%"#);
        assert_eq!(middle, r#"%"contributor\_ids":[%,12,%"#);
        assert_eq!(last, r#"%"contributor\_ids":[%,12]%"#);
    }

    #[tokio::test]
    async fn contributed_post_listed_once_for_each_strategy() {
        for strategy in STRATEGIES {
            let storage = test_storage().await;
            let x = add_user(&storage, "x", |_| {}).await;
            let y = add_user(&storage, "y", |_| {}).await;

            let own = storage.insert_post(&NewPost::published(x.id, "Own", "")).await.unwrap();
            let contributed = storage.insert_post(&NewPost::published(y.id, "Guest", "")).await.unwrap();
            let unrelated = storage.insert_post(&NewPost::published(y.id, "Other", "")).await.unwrap();

            // X listed twice and also primary author of `own`: still one row each.
            assign(&storage, contributed.id, &[x.id, y.id, x.id], "").await;
            assign(&storage, own.id, &[x.id], "").await;
            assign(&storage, unrelated.id, &[y.id], "").await;

            let posts = list_author_archive(&storage, &ArchiveAugmenter::new(strategy), x.id, 1, 10)
                .await
                .unwrap();
            let mut found = ids(&posts);
            found.sort();
            assert_eq!(found, vec![own.id, contributed.id], "strategy {strategy:?}");
        }
    }

    #[tokio::test]
    async fn numeric_prefixes_do_not_collide() {
        for strategy in STRATEGIES {
            let storage = test_storage().await;
            let author = add_user(&storage, "author", |_| {}).await;
            let post = storage.insert_post(&NewPost::published(author.id, "P", "")).await.unwrap();
            assign(&storage, post.id, &[UserId(712), UserId(120), UserId(1)], "").await;

            let augmenter = ArchiveAugmenter::new(strategy);
            let found = list_author_archive(&storage, &augmenter, UserId(12), 1, 10).await.unwrap();
            assert!(found.is_empty(), "strategy {strategy:?}");
            let found = list_author_archive(&storage, &augmenter, UserId(1), 1, 10).await.unwrap();
            assert_eq!(ids(&found), vec![post.id], "strategy {strategy:?}");
        }
    }

    #[tokio::test]
    async fn serialized_title_false_positive_is_index_free() {
        let storage = test_storage().await;
        let author = add_user(&storage, "author", |_| {}).await;
        let post = storage.insert_post(&NewPost::published(author.id, "P", "")).await.unwrap();
        assign(&storage, post.id, &[UserId(3)], "Top picks [1,50]").await;

        let legacy = ArchiveAugmenter::new(MatchStrategy::Serialized);
        let found = list_author_archive(&storage, &legacy, UserId(50), 1, 10).await.unwrap();
        assert_eq!(ids(&found), vec![post.id]);

        let indexed = ArchiveAugmenter::new(MatchStrategy::Index);
        let found = list_author_archive(&storage, &indexed, UserId(50), 1, 10).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn serialized_matches_ids_spelled_out_in_the_title() {
        let storage = test_storage().await;
        let author = add_user(&storage, "author", |_| {}).await;
        let post = storage.insert_post(&NewPost::published(author.id, "P", "")).await.unwrap();
        assign(&storage, post.id, &[UserId(3)], "Top 10,50,100").await;

        let legacy = ArchiveAugmenter::new(MatchStrategy::Serialized);
        let found = list_author_archive(&storage, &legacy, UserId(50), 1, 10).await.unwrap();
        assert_eq!(ids(&found), vec![post.id]);
        let found = list_author_archive(&storage, &legacy, UserId(3), 1, 10).await.unwrap();
        assert_eq!(ids(&found), vec![post.id]);

        let indexed = ArchiveAugmenter::new(MatchStrategy::Index);
        let found = list_author_archive(&storage, &indexed, UserId(50), 1, 10).await.unwrap();
        assert!(found.is_empty());
        let found = list_author_archive(&storage, &indexed, UserId(3), 1, 10).await.unwrap();
        assert_eq!(ids(&found), vec![post.id]);
    }

    #[tokio::test]
    async fn unrelated_meta_rows_do_not_duplicate_results() {
        let storage = test_storage().await;
        let x = add_user(&storage, "x", |_| {}).await;
        let post = storage.insert_post(&NewPost::published(x.id, "P", "")).await.unwrap();
        storage.set_post_meta(post.id, "views", "10").await.unwrap();
        storage.set_post_meta(post.id, "mood", "calm").await.unwrap();
        assign(&storage, post.id, &[x.id], "").await;

        let legacy = ArchiveAugmenter::new(MatchStrategy::Serialized);
        let found = list_author_archive(&storage, &legacy, x.id, 1, 10).await.unwrap();
        assert_eq!(ids(&found), vec![post.id]);
    }
}
