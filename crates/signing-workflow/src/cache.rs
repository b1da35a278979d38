//! Bearer token cache with single-flight refresh
//!
//! Holds at most one token. A token is usable while `now < expires_at`, where
//! `expires_at` is the provider's reported lifetime minus a safety margin so
//! long-running calls never start with a token about to lapse.
//!
//! The cache is an owned object shared via `Arc`, not a process global. The
//! refresh guard lets concurrent misses coalesce: the first caller refreshes
//! while later callers wait on the guard and then find the fresh token.
//! Time comes from `tokio::time::Instant`, so paused-clock tests can advance it.

use std::time::Duration;

use common::Secret;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio::time::Instant;
use tracing::debug;

/// Subtracted from the provider-reported lifetime before caching.
pub const EXPIRY_SAFETY_MARGIN: Duration = Duration::from_secs(5 * 60);

/// A token and the instant it stops being usable.
#[derive(Debug, Clone)]
pub struct CachedToken {
    token: Secret<String>,
    expires_at: Instant,
}

impl CachedToken {
    /// Build an entry expiring at `now + lifetime - margin`. A lifetime no
    /// longer than the margin yields an entry that is already expired.
    pub fn new(token: String, lifetime: Duration, margin: Duration) -> Self {
        Self {
            token: Secret::new(token),
            expires_at: Instant::now() + lifetime.saturating_sub(margin),
        }
    }

    pub fn is_usable(&self) -> bool {
        Instant::now() < self.expires_at
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn token(&self) -> &str {
        self.token.expose()
    }
}

/// Single-slot token cache shared by every caller of one provider.
#[derive(Debug)]
pub struct TokenCache {
    slot: RwLock<Option<CachedToken>>,
    refresh: Mutex<()>,
    margin: Duration,
}

impl TokenCache {
    /// Cache using the standard five-minute safety margin.
    pub fn new() -> Self {
        Self::with_margin(EXPIRY_SAFETY_MARGIN)
    }

    pub fn with_margin(margin: Duration) -> Self {
        Self {
            slot: RwLock::new(None),
            refresh: Mutex::new(()),
            margin,
        }
    }

    /// The cached token, only if it is still usable.
    pub async fn get(&self) -> Option<String> {
        let slot = self.slot.read().await;
        slot.as_ref()
            .filter(|entry| entry.is_usable())
            .map(|entry| entry.token().to_string())
    }

    /// Replace the cached token.
    pub async fn store(&self, token: String, lifetime: Duration) {
        let entry = CachedToken::new(token, lifetime, self.margin);
        debug!(
            usable_for_secs = lifetime.saturating_sub(self.margin).as_secs(),
            "caching token"
        );
        *self.slot.write().await = Some(entry);
    }

    /// Drop the cached token so the next caller refreshes.
    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }

    /// Current entry, usable or not.
    pub async fn entry(&self) -> Option<CachedToken> {
        self.slot.read().await.clone()
    }

    /// Acquire the refresh guard. Holders must re-check `get()` after
    /// acquiring it: another caller may have refreshed in the meantime.
    pub async fn refresh_guard(&self) -> MutexGuard<'_, ()> {
        self.refresh.lock().await
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}
