//! Core identifier types for domain entities.
//!
//! These newtype wrappers provide type safety for entity identifiers,
//! preventing accidental mixing of different ID types.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

entity_id!(
    /// Unique identifier for a user.
    UserId
);

entity_id!(
    /// Unique identifier for an OAuth provider account link.
    AccountId
);

entity_id!(
    /// Unique identifier for a login session.
    SessionId
);

entity_id!(
    /// Unique identifier for a connected Gmail mailbox.
    GmailAccountId
);

entity_id!(
    /// Unique identifier for a user-defined category.
    CategoryId
);

entity_id!(
    /// Unique identifier for an imported email.
    ///
    /// This is the local row id, not Gmail's message id.
    EmailMessageId
);

entity_id!(
    /// Unique identifier for a recorded email action.
    EmailActionId
);

/// Error returned when a stored enum value is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    /// Name of the enum being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_enum_error_message() {
        let err = ParseEnumError::new("EmailActionStatus", "DONE");
        assert_eq!(err.to_string(), "unknown EmailActionStatus value: DONE");
    }

    #[test]
    fn user_id_display() {
        let id = UserId("test-user".to_string());
        assert_eq!(id.to_string(), "test-user");
    }

    #[test]
    fn category_id_equality() {
        let id1 = CategoryId::from("cat-1");
        let id2 = CategoryId::from("cat-1".to_string());
        assert_eq!(id1, id2);
    }

    #[test]
    fn message_id_hash() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(EmailMessageId::from("msg-1"));
        assert!(set.contains(&EmailMessageId::from("msg-1")));
    }

    #[test]
    fn generated_ids_are_unique_uuids() {
        let a = EmailActionId::generate();
        let b = EmailActionId::generate();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }
}
