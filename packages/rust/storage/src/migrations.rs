//! SQL migration definitions for the contributors database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: users, posts, post_meta, options",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- User directory
CREATE TABLE IF NOT EXISTS users (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    login        TEXT NOT NULL UNIQUE,
    nicename     TEXT NOT NULL,
    display_name TEXT NOT NULL,
    email        TEXT NOT NULL DEFAULT '',
    bio          TEXT NOT NULL DEFAULT '',
    website_url  TEXT NOT NULL DEFAULT '',
    avatar_url   TEXT,
    role         TEXT NOT NULL
);

-- Content items
CREATE TABLE IF NOT EXISTS posts (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    author_id    INTEGER NOT NULL,
    post_type    TEXT NOT NULL,
    status       TEXT NOT NULL,
    title        TEXT NOT NULL,
    content      TEXT NOT NULL,
    published_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id);
CREATE INDEX IF NOT EXISTS idx_posts_type_status ON posts(post_type, status);

-- Per-item key/value metadata
CREATE TABLE IF NOT EXISTS post_meta (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    post_id    INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    meta_key   TEXT NOT NULL,
    meta_value TEXT NOT NULL,
    UNIQUE(post_id, meta_key)
);

CREATE INDEX IF NOT EXISTS idx_post_meta_key ON post_meta(meta_key);

-- Global key/value options
CREATE TABLE IF NOT EXISTS options (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Contributor join index for author archives",
            sql: r#"
CREATE TABLE IF NOT EXISTS post_contributors (
    post_id  INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    user_id  INTEGER NOT NULL,
    PRIMARY KEY (post_id, position)
);

CREATE INDEX IF NOT EXISTS idx_post_contributors_user ON post_contributors(user_id);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
