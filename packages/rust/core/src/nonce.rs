//! Time-limited anti-forgery tokens for the assignment form.
//!
//! A token is bound to an action name, the acting user, and a tick counter
//! that advances every half lifetime. Tokens from the current tick verify as
//! [`NonceCheck::Fresh`], tokens from the previous tick as
//! [`NonceCheck::Aging`]; anything older is rejected.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

use contributors_shared::{AppConfig, ContributorsError, Result, UserId, nonce_secret_from_env};
use contributors_storage::Storage;

/// Option key holding the generated secret when none is set in the environment.
pub const NONCE_SECRET_KEY: &str = "contributors_nonce_secret";

/// Action name the assignment form tokens are bound to.
pub const ASSIGNMENT_ACTION: &str = "contributors-assignment";

/// Hex characters kept from the digest.
const TOKEN_LEN: usize = 12;

/// Result of verifying a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceCheck {
    /// Issued during the current tick.
    Fresh,
    /// Issued during the previous tick.
    Aging,
    Invalid,
}

impl NonceCheck {
    pub fn is_valid(self) -> bool {
        !matches!(self, Self::Invalid)
    }
}

/// Issues and verifies anti-forgery tokens.
#[derive(Clone)]
pub struct NonceIssuer {
    secret: String,
    lifetime: Duration,
}

impl std::fmt::Debug for NonceIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceIssuer")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl NonceIssuer {
    pub fn new(secret: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            secret: secret.into(),
            lifetime,
        }
    }

    /// Build an issuer from config, preferring the environment secret over
    /// the one generated at bootstrap.
    pub async fn from_storage(storage: &Storage, config: &AppConfig) -> Result<Self> {
        let lifetime = Duration::from_secs(config.security.nonce_lifetime_secs);

        if let Some(secret) = nonce_secret_from_env(config) {
            debug!(env = %config.security.nonce_secret_env, "using nonce secret from environment");
            return Ok(Self::new(secret, lifetime));
        }

        match storage.get_option(NONCE_SECRET_KEY).await? {
            Some(secret) if !secret.is_empty() => Ok(Self::new(secret, lifetime)),
            _ => Err(ContributorsError::config(format!(
                "no nonce secret: set {} or run `contribs init`",
                config.security.nonce_secret_env
            ))),
        }
    }

    /// Issue a token for `action` and `user` valid from now.
    pub fn create(&self, action: &str, user: UserId) -> String {
        self.create_at(action, user, Utc::now())
    }

    pub fn create_at(&self, action: &str, user: UserId, now: DateTime<Utc>) -> String {
        self.token_for_tick(self.tick(now), action, user)
    }

    pub fn verify(&self, token: &str, action: &str, user: UserId) -> NonceCheck {
        self.verify_at(token, action, user, Utc::now())
    }

    pub fn verify_at(
        &self,
        token: &str,
        action: &str,
        user: UserId,
        now: DateTime<Utc>,
    ) -> NonceCheck {
        let token = token.trim();
        if token.is_empty() {
            return NonceCheck::Invalid;
        }

        let tick = self.tick(now);
        if constant_time_eq(token, &self.token_for_tick(tick, action, user)) {
            return NonceCheck::Fresh;
        }
        if constant_time_eq(token, &self.token_for_tick(tick - 1, action, user)) {
            return NonceCheck::Aging;
        }
        NonceCheck::Invalid
    }

    /// Half-lifetime counter, rounded up.
    fn tick(&self, now: DateTime<Utc>) -> i64 {
        let half = i64::try_from(self.lifetime.as_secs() / 2).unwrap_or(i64::MAX).max(1);
        let secs = now.timestamp();
        secs.div_euclid(half) + i64::from(secs.rem_euclid(half) > 0)
    }

    fn token_for_tick(&self, tick: i64, action: &str, user: UserId) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{tick}|{action}|{user}|{}", self.secret).as_bytes());
        let mut digest = format!("{:x}", hasher.finalize());
        digest.truncate(TOKEN_LEN);
        digest
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DAY: Duration = Duration::from_secs(86_400);

    fn issuer() -> NonceIssuer {
        NonceIssuer::new("s3cret", DAY)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn token_is_short_hex() {
        let token = issuer().create(ASSIGNMENT_ACTION, UserId(1));
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fresh_then_aging_then_expired() {
        let issuer = issuer();
        let issued = at(1_700_000_000);
        let token = issuer.create_at(ASSIGNMENT_ACTION, UserId(3), issued);

        assert_eq!(issuer.verify_at(&token, ASSIGNMENT_ACTION, UserId(3), issued), NonceCheck::Fresh);
        let half_later = at(1_700_000_000 + 43_200);
        assert_eq!(
            issuer.verify_at(&token, ASSIGNMENT_ACTION, UserId(3), half_later),
            NonceCheck::Aging
        );
        let day_later = at(1_700_000_000 + 86_400);
        assert_eq!(
            issuer.verify_at(&token, ASSIGNMENT_ACTION, UserId(3), day_later),
            NonceCheck::Invalid
        );
    }

    #[test]
    fn bound_to_user_action_and_secret() {
        let issuer = issuer();
        let now = at(1_700_000_000);
        let token = issuer.create_at(ASSIGNMENT_ACTION, UserId(3), now);

        assert!(!issuer.verify_at(&token, ASSIGNMENT_ACTION, UserId(4), now).is_valid());
        assert!(!issuer.verify_at(&token, "other-action", UserId(3), now).is_valid());
        let other = NonceIssuer::new("different", DAY);
        assert!(!other.verify_at(&token, ASSIGNMENT_ACTION, UserId(3), now).is_valid());
    }

    #[test]
    fn empty_or_garbage_token_is_invalid() {
        let issuer = issuer();
        assert_eq!(issuer.verify("", ASSIGNMENT_ACTION, UserId(1)), NonceCheck::Invalid);
        assert_eq!(issuer.verify("zzzz", ASSIGNMENT_ACTION, UserId(1)), NonceCheck::Invalid);
    }

    #[test]
    fn tick_rounds_up() {
        let issuer = issuer();
        assert_eq!(issuer.tick(at(43_200)), 1);
        assert_eq!(issuer.tick(at(43_201)), 2);
    }

    #[tokio::test]
    async fn stored_secret_is_used_without_env() {
        let storage = crate::test_support::test_storage().await;
        let mut config = AppConfig::default();
        config.security.nonce_secret_env = "CONTRIBUTORS_TEST_UNSET_SECRET_VAR".into();

        assert!(NonceIssuer::from_storage(&storage, &config).await.is_err());

        storage.set_option(NONCE_SECRET_KEY, "abc").await.unwrap();
        let issuer = NonceIssuer::from_storage(&storage, &config).await.unwrap();
        let token = issuer.create(ASSIGNMENT_ACTION, UserId(2));
        assert!(NonceIssuer::new("abc", DAY).verify(&token, ASSIGNMENT_ACTION, UserId(2)).is_valid());
    }
}
