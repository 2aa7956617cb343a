//! Shared types, error model, and configuration for the contributors workspace.
//!
//! This crate is the foundation depended on by all other crates.
//! It provides:
//! - [`ContributorsError`], the unified error type
//! - Domain types ([`User`], [`Post`], [`DisplayOptions`], [`ContributorAssignment`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ArchiveConfig, MatchStrategy, RenderConfig, SecurityConfig, SiteConfig,
    StorageConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    nonce_secret_from_env,
};
pub use error::{ContributorsError, Result};
pub use types::{
    ASSIGNMENT_META_KEY, ContributorAssignment, DEFAULT_BOX_TITLE, DISPLAY_OPTIONS_KEY,
    DisplayOptions, FieldKey, NewPost, NewUser, POST_TYPE_POST, Post, PostId, RawOrder, Role,
    STATUS_PUBLISH, User, UserId, normalize_order,
};
