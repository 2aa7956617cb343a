//! libSQL-backed content platform storage.
//!
//! The [`Storage`] struct wraps a local libSQL database holding the user
//! directory, content items, per-item metadata, global options, and the
//! contributor join index used by author archives.
//!
//! **Access rules:**
//! - Admin paths (saving settings and assignments): read-write via [`Storage::open`]
//! - Rendering and archive listings: read-only via [`Storage::open_readonly`]

mod migrations;
pub mod query;

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use contributors_shared::{
    ASSIGNMENT_META_KEY, ContributorAssignment, ContributorsError, NewPost, NewUser, Post,
    PostId, Result, User, UserId,
};
use libsql::{Connection, Database, params};

pub use query::{PostQuery, QueryParam};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

fn db_err(e: libsql::Error) -> ContributorsError {
    ContributorsError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ContributorsError::io(parent, e))?;
        }

        let storage = Self::connect(path, false).await?;
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ContributorsError::Storage(format!(
                "database not found at {} (run `contribs init` first)",
                path.display()
            )));
        }
        Self::connect(path, true).await
    }

    async fn connect(path: &Path, readonly: bool) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;

        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(db_err)?;

        Ok(Self { db, conn, readonly })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ContributorsError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    pub async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ContributorsError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Global options
    // -----------------------------------------------------------------------

    /// Read a global option.
    pub async fn get_option(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM options WHERE key = ?1", params![key])
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row.get::<String>(0).map_err(db_err)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Write a global option (upserts).
    pub async fn set_option(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO options (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Write a global option only if it has no value yet. Returns `true` if written.
    pub async fn add_option(&self, key: &str, value: &str) -> Result<bool> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO options (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .await
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    // -----------------------------------------------------------------------
    // Post metadata
    // -----------------------------------------------------------------------

    /// Read one metadata value of a post.
    pub async fn get_post_meta(&self, post_id: PostId, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT meta_value FROM post_meta WHERE post_id = ?1 AND meta_key = ?2",
                params![post_id.0, key],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row.get::<String>(0).map_err(db_err)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Write one metadata value of a post (upserts).
    pub async fn set_post_meta(&self, post_id: PostId, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO post_meta (post_id, meta_key, meta_value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(post_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
                params![post_id.0, key, value],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Remove one metadata value of a post.
    pub async fn delete_post_meta(&self, post_id: PostId, key: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "DELETE FROM post_meta WHERE post_id = ?1 AND meta_key = ?2",
                params![post_id.0, key],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Contributor assignment + join index
    // -----------------------------------------------------------------------

    /// Persist a serialized assignment record and its index rows in one transaction.
    pub async fn write_assignment(
        &self,
        post_id: PostId,
        record_json: &str,
        contributor_ids: &[UserId],
    ) -> Result<()> {
        self.check_writable()?;
        let tx = self.conn.transaction().await.map_err(db_err)?;

        tx.execute(
            "INSERT INTO post_meta (post_id, meta_key, meta_value) VALUES (?1, ?2, ?3)
             ON CONFLICT(post_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
            params![post_id.0, ASSIGNMENT_META_KEY, record_json],
        )
        .await
        .map_err(db_err)?;

        tx.execute(
            "DELETE FROM post_contributors WHERE post_id = ?1",
            params![post_id.0],
        )
        .await
        .map_err(db_err)?;

        for (position, user_id) in contributor_ids.iter().enumerate() {
            tx.execute(
                "INSERT INTO post_contributors (post_id, position, user_id) VALUES (?1, ?2, ?3)",
                params![post_id.0, position as i64, user_id.0],
            )
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    /// Contributor ids recorded in the join index for a post, in position order.
    pub async fn indexed_contributors(&self, post_id: PostId) -> Result<Vec<UserId>> {
        let mut rows = self
            .conn
            .query(
                "SELECT user_id FROM post_contributors WHERE post_id = ?1 ORDER BY position",
                params![post_id.0],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(UserId(row.get::<i64>(0).map_err(db_err)?));
        }
        Ok(results)
    }

    /// Rebuild the join index from every stored assignment record.
    ///
    /// Records that fail to parse are skipped with a warning. Returns the
    /// number of posts indexed.
    pub async fn rebuild_contributor_index(&self) -> Result<usize> {
        self.check_writable()?;

        let mut rows = self
            .conn
            .query(
                "SELECT post_id, meta_value FROM post_meta WHERE meta_key = ?1 ORDER BY post_id",
                params![ASSIGNMENT_META_KEY],
            )
            .await
            .map_err(db_err)?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let post_id = PostId(row.get::<i64>(0).map_err(db_err)?);
            let raw: String = row.get(1).map_err(db_err)?;
            match serde_json::from_str::<ContributorAssignment>(&raw) {
                Ok(assignment) => records.push((post_id, assignment.contributor_ids)),
                Err(e) => tracing::warn!(%post_id, error = %e, "skipping unreadable assignment record"),
            }
        }
        drop(rows);

        let tx = self.conn.transaction().await.map_err(db_err)?;
        tx.execute("DELETE FROM post_contributors", ())
            .await
            .map_err(db_err)?;
        for (post_id, ids) in &records {
            for (position, user_id) in ids.iter().enumerate() {
                tx.execute(
                    "INSERT INTO post_contributors (post_id, position, user_id) VALUES (?1, ?2, ?3)",
                    params![post_id.0, position as i64, user_id.0],
                )
                .await
                .map_err(db_err)?;
            }
        }
        tx.commit().await.map_err(db_err)?;

        tracing::info!(posts = records.len(), "rebuilt contributor index");
        Ok(records.len())
    }

    // -----------------------------------------------------------------------
    // User directory
    // -----------------------------------------------------------------------

    /// Create a user and return the stored record.
    pub async fn insert_user(&self, user: &NewUser) -> Result<User> {
        self.check_writable()?;
        let mut rows = self
            .conn
            .query(
                "INSERT INTO users (login, nicename, display_name, email, bio, website_url, avatar_url, role)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 RETURNING id",
                params![
                    user.login.trim(),
                    user.nicename(),
                    user.resolved_display_name(),
                    user.email.trim(),
                    user.bio.as_str(),
                    user.website_url.trim(),
                    user.avatar_url.as_deref(),
                    user.role.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;

        let id = match rows.next().await {
            Ok(Some(row)) => UserId(row.get::<i64>(0).map_err(db_err)?),
            Ok(None) => {
                return Err(ContributorsError::Storage("insert returned no id".into()));
            }
            Err(e) => return Err(db_err(e)),
        };
        drop(rows);

        self.get_user(id)
            .await?
            .ok_or_else(|| ContributorsError::Storage(format!("user {id} vanished after insert")))
    }

    /// Resolve a user by id.
    pub async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, login, nicename, display_name, email, bio, website_url, avatar_url, role
                 FROM users WHERE id = ?1",
                params![id.0],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_user(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// List every user, ordered by login.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, login, nicename, display_name, email, bio, website_url, avatar_url, role
                 FROM users ORDER BY login",
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_user(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Content items
    // -----------------------------------------------------------------------

    /// Create a content item and return the stored record.
    pub async fn insert_post(&self, post: &NewPost) -> Result<Post> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let mut rows = self
            .conn
            .query(
                "INSERT INTO posts (author_id, post_type, status, title, content, published_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 RETURNING id",
                params![
                    post.author_id.0,
                    post.post_type.as_str(),
                    post.status.as_str(),
                    post.title.as_str(),
                    post.content.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;

        let id = match rows.next().await {
            Ok(Some(row)) => PostId(row.get::<i64>(0).map_err(db_err)?),
            Ok(None) => {
                return Err(ContributorsError::Storage("insert returned no id".into()));
            }
            Err(e) => return Err(db_err(e)),
        };
        drop(rows);

        self.get_post(id)
            .await?
            .ok_or_else(|| ContributorsError::Storage(format!("post {id} vanished after insert")))
    }

    /// Fetch a content item by id.
    pub async fn get_post(&self, id: PostId) -> Result<Option<Post>> {
        let sql = format!("SELECT {} FROM posts WHERE posts.id = ?1", query::POST_COLUMNS);
        let mut rows = self
            .conn
            .query(&sql, params![id.0])
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_post(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Delete a content item together with its metadata and index rows.
    pub async fn delete_post(&self, id: PostId) -> Result<()> {
        self.check_writable()?;
        let tx = self.conn.transaction().await.map_err(db_err)?;
        tx.execute("DELETE FROM post_contributors WHERE post_id = ?1", params![id.0])
            .await
            .map_err(db_err)?;
        tx.execute("DELETE FROM post_meta WHERE post_id = ?1", params![id.0])
            .await
            .map_err(db_err)?;
        tx.execute("DELETE FROM posts WHERE id = ?1", params![id.0])
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    /// Execute a clause-structured listing.
    pub async fn query_posts(&self, query: &PostQuery) -> Result<Vec<Post>> {
        let sql = query.to_sql();
        tracing::trace!(%sql, "executing post query");

        let named: Vec<(String, libsql::Value)> = query
            .params
            .iter()
            .map(|(name, value)| (name.clone(), value.clone().into()))
            .collect();

        let mut rows = self
            .conn
            .query(&sql, libsql::params::Params::Named(named))
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_post(&row)?);
        }
        Ok(results)
    }
}

/// Convert a database row to a [`User`].
fn row_to_user(row: &libsql::Row) -> Result<User> {
    let role: String = row.get(8).map_err(db_err)?;
    Ok(User {
        id: UserId(row.get::<i64>(0).map_err(db_err)?),
        login: row.get::<String>(1).map_err(db_err)?,
        nicename: row.get::<String>(2).map_err(db_err)?,
        display_name: row.get::<String>(3).map_err(db_err)?,
        email: row.get::<String>(4).map_err(db_err)?,
        bio: row.get::<String>(5).map_err(db_err)?,
        website_url: row.get::<String>(6).map_err(db_err)?,
        avatar_url: row.get::<String>(7).ok(),
        role: role.parse()?,
    })
}

/// Convert a database row to a [`Post`].
fn row_to_post(row: &libsql::Row) -> Result<Post> {
    Ok(Post {
        id: PostId(row.get::<i64>(0).map_err(db_err)?),
        author_id: UserId(row.get::<i64>(1).map_err(db_err)?),
        post_type: row.get::<String>(2).map_err(db_err)?,
        status: row.get::<String>(3).map_err(db_err)?,
        title: row.get::<String>(4).map_err(db_err)?,
        content: row.get::<String>(5).map_err(db_err)?,
        published_at: {
            let s: String = row.get(6).map_err(db_err)?;
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .map_err(|e| ContributorsError::Storage(format!("invalid date: {e}")))?
        },
    })
}
