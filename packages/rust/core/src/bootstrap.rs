//! One-time setup run at deployment (`contribs init`).

use tracing::{info, instrument};
use uuid::Uuid;

use contributors_shared::{ContributorsError, DISPLAY_OPTIONS_KEY, DisplayOptions, Result};
use contributors_storage::Storage;

use crate::nonce::NONCE_SECRET_KEY;

/// What a bootstrap run changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapReport {
    pub options_created: bool,
    pub secret_created: bool,
    /// Posts with an assignment record after the index rebuild.
    pub posts_indexed: usize,
}

/// Write default display options and the nonce secret if absent, then
/// rebuild the contributor index. Safe to run repeatedly.
#[instrument(skip_all)]
pub async fn bootstrap(storage: &Storage) -> Result<BootstrapReport> {
    let defaults = serde_json::to_string(&DisplayOptions::default())
        .map_err(|e| ContributorsError::Storage(e.to_string()))?;
    let options_created = storage.add_option(DISPLAY_OPTIONS_KEY, &defaults).await?;

    let secret = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    let secret_created = storage.add_option(NONCE_SECRET_KEY, &secret).await?;

    let posts_indexed = storage.rebuild_contributor_index().await?;

    info!(options_created, secret_created, posts_indexed, "bootstrap complete");
    Ok(BootstrapReport {
        options_created,
        secret_created,
        posts_indexed,
    })
}
