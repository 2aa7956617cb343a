//! Contributor boxes: configuration store, render pipeline, and author
//! archive augmentation.
//!
//! Components take their collaborators ([`contributors_storage::Storage`],
//! [`nonce::NonceIssuer`], [`render::RenderSettings`]) as explicit
//! arguments; nothing is held in process-wide state.

pub mod admin;
pub mod archive;
pub mod assignment;
pub mod bootstrap;
pub mod nonce;
pub mod render;
pub mod settings;

#[cfg(test)]
mod test_support;

pub use archive::{ArchiveAugmenter, QueryContext, RequestView, list_author_archive};
pub use assignment::{
    AssignmentForm, SaveContext, SaveOutcome, SkipReason, can_edit_post, get_assignment,
    save_assignment,
};
pub use bootstrap::{BootstrapReport, bootstrap};
pub use nonce::{NonceCheck, NonceIssuer};
pub use render::{RenderSettings, render_contributors};
pub use settings::{RawDisplayOptions, get_display_options, save_display_options};
