//! Email action domain types.
//!
//! An action records an archive, trash or unsubscribe request against an
//! imported message and the outcome of carrying it out.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EmailActionId, EmailImportStatus, EmailMessageId, ParseEnumError};

/// What the action does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailActionType {
    /// Remove the message from the inbox.
    Archive,
    /// Move the message to trash.
    Trash,
    /// Follow the message's unsubscribe link.
    UnsubscribeAttempt,
}

impl EmailActionType {
    /// All variants in declaration order.
    pub const ALL: [EmailActionType; 3] = [Self::Archive, Self::Trash, Self::UnsubscribeAttempt];

    /// Returns the stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Archive => "ARCHIVE",
            Self::Trash => "TRASH",
            Self::UnsubscribeAttempt => "UNSUBSCRIBE_ATTEMPT",
        }
    }

    /// Import status the message ends up in once this action succeeds.
    pub fn resulting_import_status(&self) -> Option<EmailImportStatus> {
        match self {
            Self::Archive => Some(EmailImportStatus::Archived),
            Self::Trash => Some(EmailImportStatus::Trashed),
            Self::UnsubscribeAttempt => None,
        }
    }
}

impl fmt::Display for EmailActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmailActionType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ARCHIVE" => Ok(Self::Archive),
            "TRASH" => Ok(Self::Trash),
            "UNSUBSCRIBE_ATTEMPT" => Ok(Self::UnsubscribeAttempt),
            other => Err(ParseEnumError::new("EmailActionType", other)),
        }
    }
}

/// Progress of an action.
///
/// The only legal moves are `Pending -> Succeeded` and `Pending -> Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailActionStatus {
    /// Requested, not yet carried out.
    #[default]
    Pending,
    /// Carried out successfully.
    Succeeded,
    /// Attempted and failed.
    Failed,
}

impl EmailActionStatus {
    /// All variants in declaration order.
    pub const ALL: [EmailActionStatus; 3] = [Self::Pending, Self::Succeeded, Self::Failed];

    /// Returns the stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }

    /// Returns true once the action has an outcome.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Returns true if moving from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: EmailActionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Succeeded) | (Self::Pending, Self::Failed)
        )
    }
}

impl fmt::Display for EmailActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmailActionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "FAILED" => Ok(Self::Failed),
            other => Err(ParseEnumError::new("EmailActionStatus", other)),
        }
    }
}

/// A recorded action against an imported message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailAction {
    /// Unique identifier for this action.
    pub id: EmailActionId,
    /// Message the action applies to.
    pub email_message_id: EmailMessageId,
    /// What the action does.
    pub action_type: EmailActionType,
    /// Current progress.
    pub status: EmailActionStatus,
    /// Free-form request or outcome details.
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmailAction {
    /// Creates a pending action.
    pub fn pending(
        email_message_id: EmailMessageId,
        action_type: EmailActionType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EmailActionId::generate(),
            email_message_id,
            action_type,
            status: EmailActionStatus::Pending,
            details: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attaches request details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_transitions_are_allowed() {
        use EmailActionStatus::*;

        for from in EmailActionStatus::ALL {
            for to in EmailActionStatus::ALL {
                let expected = from == Pending && to != Pending;
                assert_eq!(from.can_transition_to(to), expected, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(!EmailActionStatus::Pending.is_terminal());
        assert!(EmailActionStatus::Succeeded.is_terminal());
        assert!(EmailActionStatus::Failed.is_terminal());
    }

    #[test]
    fn action_type_round_trips_through_str() {
        for action_type in EmailActionType::ALL {
            assert_eq!(
                action_type.as_str().parse::<EmailActionType>().unwrap(),
                action_type
            );
        }
        assert!("UNSUBSCRIBE".parse::<EmailActionType>().is_err());
    }

    #[test]
    fn resulting_import_status() {
        assert_eq!(
            EmailActionType::Archive.resulting_import_status(),
            Some(EmailImportStatus::Archived)
        );
        assert_eq!(
            EmailActionType::Trash.resulting_import_status(),
            Some(EmailImportStatus::Trashed)
        );
        assert_eq!(EmailActionType::UnsubscribeAttempt.resulting_import_status(), None);
    }

    #[test]
    fn serde_names_match_stored_names() {
        let json = serde_json::to_string(&EmailActionType::UnsubscribeAttempt).unwrap();
        assert_eq!(json, "\"UNSUBSCRIBE_ATTEMPT\"");

        let status: EmailActionStatus = serde_json::from_str("\"SUCCEEDED\"").unwrap();
        assert_eq!(status, EmailActionStatus::Succeeded);
    }

    #[test]
    fn pending_action() {
        let action = EmailAction::pending(
            EmailMessageId::from("msg-1"),
            EmailActionType::Trash,
            Utc::now(),
        )
        .with_details(serde_json::json!({"requested_by": "user"}));

        assert_eq!(action.status, EmailActionStatus::Pending);
        assert_eq!(action.details.unwrap()["requested_by"], "user");
    }
}
