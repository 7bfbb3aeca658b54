//! Gmail mailbox domain types.
//!
//! A user may connect several Gmail mailboxes. Each mailbox keeps its own
//! OAuth tokens and an incremental sync watermark (`last_history_id`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GmailAccountId, UserId};

/// A Gmail mailbox connected by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmailAccount {
    /// Unique identifier for this mailbox.
    pub id: GmailAccountId,
    /// User who connected the mailbox.
    pub user_id: UserId,
    /// Mailbox address. Unique per user.
    pub email: String,
    /// Google account subject. Unique per user.
    pub google_sub: String,
    /// Long-lived refresh token.
    pub refresh_token: String,
    /// Short-lived access token, if one has been minted.
    pub access_token: Option<String>,
    /// When the access token expires.
    pub token_expiry: Option<DateTime<Utc>>,
    /// Gmail history id up to which changes have been imported.
    pub last_history_id: Option<String>,
    /// When the last sync finished.
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GmailAccount {
    /// Returns true when there is no usable access token at `now`.
    pub fn token_expired(&self, now: DateTime<Utc>) -> bool {
        match (&self.access_token, self.token_expiry) {
            (Some(_), Some(expiry)) => expiry <= now,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    /// Returns true if no sync has completed yet.
    pub fn needs_full_sync(&self) -> bool {
        self.last_history_id.is_none()
    }
}

/// Fields required to connect a mailbox.
#[derive(Debug, Clone)]
pub struct NewGmailAccount {
    pub user_id: UserId,
    pub email: String,
    pub google_sub: String,
    pub refresh_token: String,
    pub access_token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
}

impl NewGmailAccount {
    /// Creates a mailbox connection with only a refresh token.
    pub fn new(
        user_id: UserId,
        email: impl Into<String>,
        google_sub: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            email: email.into(),
            google_sub: google_sub.into(),
            refresh_token: refresh_token.into(),
            access_token: None,
            token_expiry: None,
        }
    }

    /// Sets the current access token and its expiry.
    pub fn access_token(mut self, token: impl Into<String>, expiry: DateTime<Utc>) -> Self {
        self.access_token = Some(token.into());
        self.token_expiry = Some(expiry);
        self
    }

    /// Materializes the mailbox with a fresh id and no sync state.
    pub fn into_account(self, now: DateTime<Utc>) -> GmailAccount {
        GmailAccount {
            id: GmailAccountId::generate(),
            user_id: self.user_id,
            email: self.email,
            google_sub: self.google_sub,
            refresh_token: self.refresh_token,
            access_token: self.access_token,
            token_expiry: self.token_expiry,
            last_history_id: None,
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Returns true if `candidate` is strictly newer than `current`.
///
/// Gmail history ids are unsigned integers encoded as strings. Ids that do
/// not parse are compared by length then lexically, which orders decimal
/// strings the same way.
pub fn history_id_is_newer(current: Option<&str>, candidate: &str) -> bool {
    let Some(current) = current else {
        return true;
    };

    match (current.parse::<u64>(), candidate.parse::<u64>()) {
        (Ok(a), Ok(b)) => b > a,
        _ => (candidate.len(), candidate) > (current.len(), current),
    }
}
