//! User domain types.
//!
//! A user is the owner of every other record: OAuth links, sessions,
//! connected mailboxes, categories and imported email.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier for this user.
    pub id: UserId,
    /// Display name.
    pub name: Option<String>,
    /// Primary email address, unique across users when present.
    pub email: Option<String>,
    /// When the email address was verified.
    pub email_verified: Option<DateTime<Utc>>,
    /// Avatar URL.
    pub image: Option<String>,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last modified.
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub id: Option<UserId>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub email_verified: Option<DateTime<Utc>>,
    pub image: Option<String>,
}

impl NewUser {
    /// Creates a user keyed by email address.
    pub fn with_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Default::default()
        }
    }

    /// Sets the display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the avatar URL.
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Marks the email as verified at the given time.
    pub fn verified_at(mut self, at: DateTime<Utc>) -> Self {
        self.email_verified = Some(at);
        self
    }

    /// Materializes the user, generating an id if none was given.
    pub fn into_user(self, now: DateTime<Utc>) -> User {
        User {
            id: self.id.unwrap_or_else(UserId::generate),
            name: self.name,
            email: self.email,
            email_verified: self.email_verified,
            image: self.image,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update for a user. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<Option<String>>,
    pub email: Option<Option<String>>,
    pub email_verified: Option<Option<DateTime<Utc>>>,
    pub image: Option<Option<String>>,
}

impl UserUpdate {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets or clears the display name.
    pub fn name(mut self, name: Option<String>) -> Self {
        self.name = Some(name);
        self
    }

    /// Sets or clears the email address.
    pub fn email(mut self, email: Option<String>) -> Self {
        self.email = Some(email);
        self
    }

    /// Sets or clears the verification timestamp.
    pub fn email_verified(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.email_verified = Some(at);
        self
    }

    /// Sets or clears the avatar URL.
    pub fn image(mut self, image: Option<String>) -> Self {
        self.image = Some(image);
        self
    }

    /// Returns true if the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.email_verified.is_none()
            && self.image.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_generates_id_and_timestamps() {
        let now = Utc::now();
        let user = NewUser::with_email("a@example.com")
            .name("Alice")
            .into_user(now);

        assert!(!user.id.0.is_empty());
        assert_eq!(user.email.as_deref(), Some("a@example.com"));
        assert_eq!(user.name.as_deref(), Some("Alice"));
        assert_eq!(user.created_at, now);
        assert_eq!(user.updated_at, now);
    }

    #[test]
    fn explicit_id_is_kept() {
        let user = NewUser {
            id: Some(UserId::from("user-1")),
            ..Default::default()
        }
        .into_user(Utc::now());
        assert_eq!(user.id, UserId::from("user-1"));
    }

    #[test]
    fn empty_update() {
        assert!(UserUpdate::new().is_empty());
        assert!(!UserUpdate::new().name(None).is_empty());
    }
}
