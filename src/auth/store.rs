//! File-backed cache for the OAuth handshake: pending state tokens on
//! one side, issued credential bundles on the other. This is the only
//! state shared across requests, so every mutation happens under one
//! lock and is flushed with a write-to-temp-then-rename so a crash
//! can't leave a half-written cache behind.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Pending states are redeemable for this long after creation.
const STATE_TTL_MINUTES: i64 = 10;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum AuthError {
    #[error("unknown or invalid state token")]
    InvalidState,
    #[error("state token was already redeemed")]
    AlreadyUsed,
    #[error("state token expired")]
    Expired,
    #[error("no credentials found for that token")]
    MissingCredential,
}

/// Everything needed to act on the user's calendar on their behalf.
/// Held only by the store; clients get an opaque token instead.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PendingAuth {
    created_at: DateTime<Utc>,
    used: bool,
}

// The cache file is a flat token -> entry object. Untagged works here
// because the two shapes share no fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum CacheEntry {
    Pending(PendingAuth),
    Issued(Credentials),
}

pub struct AuthStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl AuthStore {
    /// Open the cache at `path`, starting empty when the file is
    /// missing or unreadable (same recovery the original cache had).
    pub fn open(path: &str) -> Self {
        let entries = match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("Discarding unreadable auth cache {}: {}", path, e);
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };

        Self {
            path: PathBuf::from(path),
            entries: Mutex::new(entries),
        }
    }

    /// Serialize the whole map to a sibling temp file and rename it
    /// over the cache so readers never observe a partial write.
    fn persist(&self, entries: &HashMap<String, CacheEntry>) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        let raw = serde_json::to_string_pretty(entries)?;
        fs::write(&tmp, raw)
            .with_context(|| format!("Failed to write auth cache {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace auth cache {}", self.path.display()))?;
        Ok(())
    }

    fn random_token() -> String {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Mint a state token for a new authorization redirect.
    pub fn begin_auth(&self) -> Result<String> {
        let token = Self::random_token();
        let mut entries = self.entries.lock().expect("auth store lock poisoned");
        entries.insert(
            token.clone(),
            CacheEntry::Pending(PendingAuth {
                created_at: Utc::now(),
                used: false,
            }),
        );
        self.persist(&entries)?;
        Ok(token)
    }

    /// Redeem a state token from the provider's callback. Single
    /// redemption: the check and the mark happen under the store lock,
    /// so two callbacks racing on the same token can't both succeed.
    /// The redeemed entry stays behind marked `used` so a replayed
    /// callback is told `AlreadyUsed` rather than `InvalidState`.
    pub fn redeem_state(&self, token: &str) -> Result<()> {
        self.redeem_state_at(token, Utc::now())
    }

    fn redeem_state_at(&self, token: &str, now: DateTime<Utc>) -> Result<()> {
        let mut entries = self.entries.lock().expect("auth store lock poisoned");

        let pending = match entries.get_mut(token) {
            Some(CacheEntry::Pending(pending)) => pending,
            _ => return Err(AuthError::InvalidState.into()),
        };

        if pending.used {
            return Err(AuthError::AlreadyUsed.into());
        }
        if now - pending.created_at > Duration::minutes(STATE_TTL_MINUTES) {
            entries.remove(token);
            self.persist(&entries)?;
            return Err(AuthError::Expired.into());
        }

        pending.used = true;
        self.persist(&entries)?;
        Ok(())
    }

    /// Store an issued credential bundle under a fresh opaque token.
    /// No expiry here: token refresh is the provider's job.
    pub fn issue_credentials(&self, credentials: Credentials) -> Result<String> {
        let token = Self::random_token();
        let mut entries = self.entries.lock().expect("auth store lock poisoned");
        entries.insert(token.clone(), CacheEntry::Issued(credentials));
        self.persist(&entries)?;
        Ok(token)
    }

    pub fn credentials(&self, token: &str) -> Option<Credentials> {
        let entries = self.entries.lock().expect("auth store lock poisoned");
        match entries.get(token) {
            Some(CacheEntry::Issued(credentials)) => Some(credentials.clone()),
            _ => None,
        }
    }
}
