//! Fixtures shared by the unit tests in this crate.

use std::time::Duration;

use url::Url;
use uuid::Uuid;

use contributors_shared::{NewPost, NewUser, Post, User, UserId};
use contributors_storage::Storage;

use crate::nonce::NonceIssuer;
use crate::render::RenderSettings;

pub(crate) async fn test_storage() -> Storage {
    let path = std::env::temp_dir().join(format!("contributors_core_test_{}.db", Uuid::now_v7()));
    Storage::open(&path).await.unwrap()
}

pub(crate) async fn add_user(storage: &Storage, login: &str, edit: impl FnOnce(&mut NewUser)) -> User {
    let mut user = NewUser {
        login: login.into(),
        email: format!("{login}@example.com"),
        ..NewUser::default()
    };
    edit(&mut user);
    storage.insert_user(&user).await.unwrap()
}

pub(crate) async fn add_post(storage: &Storage, author: UserId) -> Post {
    storage
        .insert_post(&NewPost::published(author, "Hello", "<p>Body</p>"))
        .await
        .unwrap()
}

pub(crate) fn test_nonces() -> NonceIssuer {
    NonceIssuer::new("test-secret", Duration::from_secs(86_400))
}

pub(crate) fn test_settings() -> RenderSettings {
    RenderSettings {
        site_url: Url::parse("https://blog.example/").unwrap(),
        avatar_size: 96,
    }
}
