//! Imported email domain types.
//!
//! An [`EmailMessage`] is a local copy of a Gmail message together with the
//! triage results attached to it: category, summary, import status and the
//! unsubscribe links found in its headers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::unsubscribe::{self, UnsubscribeLink};
use super::{CategoryId, EmailMessageId, GmailAccountId, ParseEnumError, UserId};

/// Where an imported message currently lives in the mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailImportStatus {
    /// Imported and still in the inbox.
    #[default]
    Imported,
    /// Archived in Gmail.
    Archived,
    /// Moved to Gmail's trash.
    Trashed,
}

impl EmailImportStatus {
    /// All variants in declaration order.
    pub const ALL: [EmailImportStatus; 3] = [Self::Imported, Self::Archived, Self::Trashed];

    /// Returns the stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imported => "IMPORTED",
            Self::Archived => "ARCHIVED",
            Self::Trashed => "TRASHED",
        }
    }
}

impl fmt::Display for EmailImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmailImportStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IMPORTED" => Ok(Self::Imported),
            "ARCHIVED" => Ok(Self::Archived),
            "TRASHED" => Ok(Self::Trashed),
            other => Err(ParseEnumError::new("EmailImportStatus", other)),
        }
    }
}

/// An email imported from a connected Gmail mailbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Local identifier.
    pub id: EmailMessageId,
    /// Owner of the message.
    pub user_id: UserId,
    /// Mailbox the message was imported from.
    pub gmail_account_id: GmailAccountId,
    /// Category the message was sorted into.
    pub category_id: CategoryId,
    /// Gmail's message id. Unique per mailbox.
    pub gmail_message_id: String,
    /// Gmail's thread id.
    pub gmail_thread_id: String,
    /// Gmail internal date in milliseconds since the epoch.
    pub internal_date_ms: i64,
    /// Sender address.
    pub from_email: String,
    /// Sender display name.
    pub from_name: Option<String>,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    /// Generated summary of the message.
    pub summary: Option<String>,
    /// Current mailbox state.
    pub import_status: EmailImportStatus,
    /// Raw `List-Unsubscribe` header.
    pub list_unsubscribe: Option<String>,
    /// Parsed unsubscribe links, stored verbatim as JSON.
    pub unsubscribe_links: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmailMessage {
    /// Returns the Gmail internal date as a timestamp.
    pub fn internal_date(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.internal_date_ms)
    }

    /// Decodes the stored unsubscribe links.
    ///
    /// Entries that do not match the link shape are skipped.
    pub fn links(&self) -> Vec<UnsubscribeLink> {
        self.unsubscribe_links
            .as_ref()
            .map(unsubscribe::links_from_json)
            .unwrap_or_default()
    }

    /// Returns true if the message can be unsubscribed from.
    pub fn has_unsubscribe(&self) -> bool {
        !self.links().is_empty()
    }
}

/// Fields required to import a message.
#[derive(Debug, Clone)]
pub struct NewEmailMessage {
    pub user_id: UserId,
    pub gmail_account_id: GmailAccountId,
    pub category_id: CategoryId,
    pub gmail_message_id: String,
    pub gmail_thread_id: String,
    pub internal_date_ms: i64,
    pub from_email: String,
    pub from_name: Option<String>,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub summary: Option<String>,
    pub list_unsubscribe: Option<String>,
    pub unsubscribe_links: Option<serde_json::Value>,
}

impl NewEmailMessage {
    /// Creates an import record with the identifying fields set.
    pub fn new(
        user_id: UserId,
        gmail_account_id: GmailAccountId,
        category_id: CategoryId,
        gmail_message_id: impl Into<String>,
        gmail_thread_id: impl Into<String>,
        internal_date_ms: i64,
        from_email: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            gmail_account_id,
            category_id,
            gmail_message_id: gmail_message_id.into(),
            gmail_thread_id: gmail_thread_id.into(),
            internal_date_ms,
            from_email: from_email.into(),
            from_name: None,
            subject: None,
            snippet: None,
            body_text: None,
            body_html: None,
            summary: None,
            list_unsubscribe: None,
            unsubscribe_links: None,
        }
    }

    /// Sets the sender display name.
    pub fn from_name(mut self, name: impl Into<String>) -> Self {
        self.from_name = Some(name.into());
        self
    }

    /// Sets the subject line.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the snippet.
    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    /// Sets the plain text and HTML bodies.
    pub fn bodies(mut self, text: Option<String>, html: Option<String>) -> Self {
        self.body_text = text;
        self.body_html = html;
        self
    }

    /// Sets the raw `List-Unsubscribe` header.
    pub fn list_unsubscribe(mut self, header: impl Into<String>) -> Self {
        self.list_unsubscribe = Some(header.into());
        self
    }

    /// Fills `unsubscribe_links` from the header when not already set.
    pub fn with_parsed_unsubscribe_links(mut self) -> Self {
        if self.unsubscribe_links.is_none() {
            if let Some(header) = &self.list_unsubscribe {
                let links = unsubscribe::parse_list_unsubscribe(header);
                if !links.is_empty() {
                    self.unsubscribe_links = Some(unsubscribe::links_to_json(&links));
                }
            }
        }
        self
    }

    /// Materializes the message with a fresh id and IMPORTED status.
    pub fn into_message(self, now: DateTime<Utc>) -> EmailMessage {
        EmailMessage {
            id: EmailMessageId::generate(),
            user_id: self.user_id,
            gmail_account_id: self.gmail_account_id,
            category_id: self.category_id,
            gmail_message_id: self.gmail_message_id,
            gmail_thread_id: self.gmail_thread_id,
            internal_date_ms: self.internal_date_ms,
            from_email: self.from_email,
            from_name: self.from_name,
            subject: self.subject,
            snippet: self.snippet,
            body_text: self.body_text,
            body_html: self.body_html,
            summary: self.summary,
            import_status: EmailImportStatus::default(),
            list_unsubscribe: self.list_unsubscribe,
            unsubscribe_links: self.unsubscribe_links,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update for a message. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct EmailMessageUpdate {
    pub category_id: Option<CategoryId>,
    pub summary: Option<Option<String>>,
    pub import_status: Option<EmailImportStatus>,
    pub unsubscribe_links: Option<Option<serde_json::Value>>,
}

impl EmailMessageUpdate {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the message to another category.
    pub fn category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    /// Sets the summary.
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(Some(summary.into()));
        self
    }

    /// Sets the import status.
    pub fn import_status(mut self, status: EmailImportStatus) -> Self {
        self.import_status = Some(status);
        self
    }

    /// Replaces the stored unsubscribe links.
    pub fn unsubscribe_links(mut self, links: Option<serde_json::Value>) -> Self {
        self.unsubscribe_links = Some(links);
        self
    }

    /// Returns true if the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.category_id.is_none()
            && self.summary.is_none()
            && self.import_status.is_none()
            && self.unsubscribe_links.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_new_message() -> NewEmailMessage {
        NewEmailMessage::new(
            UserId::from("user-1"),
            GmailAccountId::from("gmail-1"),
            CategoryId::from("cat-1"),
            "18c2f0a1",
            "18c2f0a0",
            1_700_000_000_000,
            "news@example.com",
        )
    }

    #[test]
    fn import_status_round_trips_through_str() {
        for status in EmailImportStatus::ALL {
            assert_eq!(status.as_str().parse::<EmailImportStatus>().unwrap(), status);
        }
        assert!("archived".parse::<EmailImportStatus>().is_err());
    }

    #[test]
    fn import_status_serde_uses_upper_case() {
        let json = serde_json::to_string(&EmailImportStatus::Trashed).unwrap();
        assert_eq!(json, "\"TRASHED\"");
    }

    #[test]
    fn new_message_defaults_to_imported() {
        let message = make_new_message().into_message(Utc::now());
        assert_eq!(message.import_status, EmailImportStatus::Imported);
        assert!(message.summary.is_none());
        assert_eq!(
            message.internal_date().map(|d| d.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn parses_unsubscribe_header_on_request() {
        let message = make_new_message()
            .list_unsubscribe("<https://example.com/u?id=1>, <mailto:leave@example.com>")
            .with_parsed_unsubscribe_links()
            .into_message(Utc::now());

        let links = message.links();
        assert_eq!(links.len(), 2);
        assert!(message.has_unsubscribe());
    }

    #[test]
    fn explicit_links_are_not_overwritten() {
        let explicit = serde_json::json!([{"kind": "http", "url": "https://other.example/"}]);
        let mut new_message = make_new_message().list_unsubscribe("<mailto:x@example.com>");
        new_message.unsubscribe_links = Some(explicit.clone());

        let message = new_message
            .with_parsed_unsubscribe_links()
            .into_message(Utc::now());
        assert_eq!(message.unsubscribe_links, Some(explicit));
    }

    #[test]
    fn update_builder() {
        let update = EmailMessageUpdate::new()
            .category(CategoryId::from("cat-2"))
            .summary("Weekly digest");
        assert!(!update.is_empty());
        assert!(update.import_status.is_none());
        assert!(EmailMessageUpdate::new().is_empty());
    }
}
