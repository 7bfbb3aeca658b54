//! Login session and verification token types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{SessionId, UserId};

/// A login session keyed by an opaque token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier for this session.
    pub id: SessionId,
    /// Token presented by the client.
    pub session_token: String,
    /// User this session belongs to.
    pub user_id: UserId,
    /// When the session stops being valid.
    pub expires: DateTime<Utc>,
}

impl Session {
    /// Creates a session with a random token that expires after `ttl`.
    pub fn issue(user_id: UserId, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: SessionId::generate(),
            session_token: random_token(),
            user_id,
            expires: now + ttl,
        }
    }

    /// Returns true if the session has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }
}

/// A one-time token used for email verification or magic links.
///
/// Identified by the pair (identifier, token).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationToken {
    /// What the token verifies, usually an email address.
    pub identifier: String,
    /// The secret token value.
    pub token: String,
    /// When the token stops being valid.
    pub expires: DateTime<Utc>,
}

impl VerificationToken {
    /// Creates a token for `identifier` that expires after `ttl`.
    pub fn issue(identifier: impl Into<String>, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            identifier: identifier.into(),
            token: random_token(),
            expires: now + ttl,
        }
    }

    /// Returns true if the token has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }
}

fn random_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_expiry() {
        let now = Utc::now();
        let session = Session::issue(UserId::from("user-1"), now, Duration::hours(1));

        assert!(!session.is_expired(now));
        assert!(session.is_expired(now + Duration::hours(1)));
        assert!(session.is_expired(now + Duration::hours(2)));
    }

    #[test]
    fn tokens_are_random_and_long() {
        let now = Utc::now();
        let a = VerificationToken::issue("a@example.com", now, Duration::minutes(10));
        let b = VerificationToken::issue("a@example.com", now, Duration::minutes(10));

        assert_ne!(a.token, b.token);
        assert_eq!(a.token.len(), 64);
    }

    #[test]
    fn verification_token_expiry() {
        let now = Utc::now();
        let token = VerificationToken::issue("a@example.com", now, Duration::minutes(10));
        assert!(!token.is_expired(now + Duration::minutes(9)));
        assert!(token.is_expired(now + Duration::minutes(10)));
    }
}
