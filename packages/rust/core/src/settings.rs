//! Global display options: which card fields show and in what order.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info, instrument, warn};

use contributors_shared::{DISPLAY_OPTIONS_KEY, DisplayOptions, RawOrder, Result};
use contributors_storage::Storage;

/// Settings form input as submitted.
///
/// Checkbox fields are on when present; the submitted value, whatever its
/// type, is ignored. `element_order` comes either as a list or as the
/// comma-joined string the reorderable list writes into its hidden field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawDisplayOptions {
    #[serde(default, deserialize_with = "present")]
    pub show_avatar: bool,
    #[serde(default, deserialize_with = "present")]
    pub show_name: bool,
    #[serde(default, deserialize_with = "present")]
    pub show_bio: bool,
    #[serde(default, deserialize_with = "present")]
    pub show_website: bool,
    #[serde(default)]
    pub element_order: Option<RawOrder>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    IgnoredAny::deserialize(deserializer)?;
    Ok(true)
}

/// Turn untrusted settings input into a valid [`DisplayOptions`].
///
/// Never fails: absent checkboxes are off, and an absent or unusable order
/// becomes the default order.
pub fn sanitize_display_options(raw: &RawDisplayOptions) -> DisplayOptions {
    let element_order = match &raw.element_order {
        Some(order) => order.normalize(),
        None => DisplayOptions::default().element_order,
    };

    DisplayOptions {
        show_avatar: raw.show_avatar,
        show_name: raw.show_name,
        show_bio: raw.show_bio,
        show_website: raw.show_website,
        element_order,
    }
}

/// Load the persisted display options, or the defaults if none are stored.
///
/// A stored record that no longer parses is treated as absent.
pub async fn get_display_options(storage: &Storage) -> Result<DisplayOptions> {
    let Some(raw) = storage.get_option(DISPLAY_OPTIONS_KEY).await? else {
        debug!("no display options stored, using defaults");
        return Ok(DisplayOptions::default());
    };

    match serde_json::from_str(&raw) {
        Ok(options) => Ok(options),
        Err(e) => {
            warn!(error = %e, "stored display options unreadable, using defaults");
            Ok(DisplayOptions::default())
        }
    }
}

/// Sanitize and persist settings input. Returns what was stored.
#[instrument(skip_all)]
pub async fn save_display_options(
    storage: &Storage,
    raw: &RawDisplayOptions,
) -> Result<DisplayOptions> {
    let options = sanitize_display_options(raw);
    let encoded = serde_json::to_string(&options)
        .map_err(|e| contributors_shared::ContributorsError::Storage(e.to_string()))?;
    storage.set_option(DISPLAY_OPTIONS_KEY, &encoded).await?;

    info!(
        show_avatar = options.show_avatar,
        show_name = options.show_name,
        show_bio = options.show_bio,
        show_website = options.show_website,
        order = ?options.element_order,
        "saved display options"
    );
    Ok(options)
}
