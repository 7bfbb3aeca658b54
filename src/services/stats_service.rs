//! Statistics service for summarizing the triage store.
//!
//! Aggregates:
//! - Record counts (users, mailboxes, categories)
//! - Message volume, summaries and unsubscribe coverage
//! - Messages per category and per import status
//! - Action outcomes per status

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::{Result, ServiceError};
use crate::domain::{CategoryId, EmailActionStatus, EmailImportStatus, UserId};
use crate::storage::queries::{
    categories, email_actions, email_messages, gmail_accounts, users, EmailActionFilter,
    EmailMessageFilter, GmailAccountFilter, MessageAggregate, UserFilter,
};
use crate::storage::Database;

/// Which records a report covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsScope {
    /// Restrict to one user's records.
    pub user_id: Option<UserId>,
    /// Only messages received at or after this Gmail internal date.
    pub received_after_ms: Option<i64>,
    /// Only messages received before this Gmail internal date.
    pub received_before_ms: Option<i64>,
}

impl StatsScope {
    /// Covers every record in the store.
    pub fn all() -> Self {
        Self::default()
    }

    /// Covers one user's records.
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    /// Restricts message statistics to a receive window.
    pub fn received_between(mut self, after_ms: Option<i64>, before_ms: Option<i64>) -> Self {
        self.received_after_ms = after_ms;
        self.received_before_ms = before_ms;
        self
    }

    fn message_filter(&self) -> EmailMessageFilter {
        let mut filter = EmailMessageFilter::new()
            .received_between(self.received_after_ms, self.received_before_ms);
        if let Some(user_id) = &self.user_id {
            filter = filter.user(user_id.clone());
        }
        filter
    }
}

/// Message count for one category, with its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryStat {
    pub category_id: CategoryId,
    pub name: String,
    pub count: u64,
}

/// Snapshot of the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    pub user_id: Option<UserId>,
    pub users: u64,
    pub gmail_accounts: u64,
    pub categories: u64,
    pub messages: MessageAggregate,
    /// Messages per category, largest first.
    pub messages_by_category: Vec<CategoryStat>,
    /// Messages per import status, every status included.
    pub messages_by_status: Vec<(EmailImportStatus, u64)>,
    /// Actions per status, every status included.
    pub actions_by_status: Vec<(EmailActionStatus, u64)>,
}

impl StatsReport {
    /// Number of actions still waiting to run.
    pub fn pending_actions(&self) -> u64 {
        self.action_count(EmailActionStatus::Pending)
    }

    /// Number of actions with the given status.
    pub fn action_count(&self, status: EmailActionStatus) -> u64 {
        self.actions_by_status
            .iter()
            .find(|(s, _)| *s == status)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    /// Number of messages with the given import status.
    pub fn message_count(&self, status: EmailImportStatus) -> u64 {
        self.messages_by_status
            .iter()
            .find(|(s, _)| *s == status)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    /// Renders the report as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Service for computing store statistics.
pub struct StatsService {
    db: Database,
}

impl StatsService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Builds a report for the given scope.
    ///
    /// A user scope fails with [`ServiceError::NotFound`] if the user does
    /// not exist.
    pub async fn report(&self, scope: StatsScope) -> Result<StatsReport> {
        let report = self
            .db
            .with_conn(move |conn| {
                let (users_count, gmail_count, category_count, category_names) =
                    match &scope.user_id {
                        Some(user_id) => {
                            users::require(conn, user_id)?;
                            let names = categories::get_by_user(conn, user_id)?
                                .into_iter()
                                .map(|c| (c.id, c.name))
                                .collect::<HashMap<_, _>>();
                            (
                                1,
                                gmail_accounts::count_by_user(conn, user_id)?,
                                names.len() as u64,
                                Some(names),
                            )
                        }
                        None => (
                            users::count(conn, &UserFilter::new())?,
                            gmail_accounts::count(conn, &GmailAccountFilter::new())?,
                            categories::count_all(conn)?,
                            None,
                        ),
                    };

                let message_filter = scope.message_filter();
                let messages = email_messages::aggregate(conn, &message_filter)?;

                let messages_by_category = email_messages::group_by_category(conn, &message_filter)?
                    .into_iter()
                    .map(|entry| -> crate::storage::Result<CategoryStat> {
                        let name = match &category_names {
                            Some(names) => names.get(&entry.category_id).cloned(),
                            None => categories::get_by_id(conn, &entry.category_id)?.map(|c| c.name),
                        };
                        Ok(CategoryStat {
                            name: name.unwrap_or_default(),
                            category_id: entry.category_id,
                            count: entry.count,
                        })
                    })
                    .collect::<crate::storage::Result<Vec<_>>>()?;

                let status_counts = email_messages::group_by_status(conn, &message_filter)?;
                let messages_by_status = EmailImportStatus::ALL
                    .iter()
                    .map(|status| {
                        let count = status_counts
                            .iter()
                            .find(|entry| entry.import_status == *status)
                            .map(|entry| entry.count)
                            .unwrap_or(0);
                        (*status, count)
                    })
                    .collect();

                let mut action_filter = EmailActionFilter::new();
                if let Some(user_id) = &scope.user_id {
                    action_filter = action_filter.user(user_id.clone());
                }
                let action_counts = email_actions::group_by_status(conn, &action_filter)?;
                let actions_by_status = EmailActionStatus::ALL
                    .iter()
                    .map(|status| {
                        let count = action_counts
                            .iter()
                            .find(|entry| entry.status == *status)
                            .map(|entry| entry.count)
                            .unwrap_or(0);
                        (*status, count)
                    })
                    .collect();

                Ok(StatsReport {
                    generated_at: Utc::now(),
                    user_id: scope.user_id,
                    users: users_count,
                    gmail_accounts: gmail_count,
                    categories: category_count,
                    messages,
                    messages_by_category,
                    messages_by_status,
                    actions_by_status,
                })
            })
            .await
            .map_err(ServiceError::from_storage)?;

        tracing::debug!(
            user_id = ?report.user_id,
            messages = report.messages.count,
            pending_actions = report.pending_actions(),
            "stats report generated"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EmailAction, EmailActionType, EmailMessageUpdate};
    use crate::storage::queries::fixtures::{seed_category, seed_mailbox, seed_message, Mailbox};
    use pretty_assertions::assert_eq;

    async fn seeded() -> (Database, Mailbox, Mailbox) {
        let db = Database::open_in_memory().await.unwrap();
        let (first, second) = db
            .with_conn(|conn| {
                let first = seed_mailbox(conn, "first@example.com");
                let receipts = seed_category(conn, &first.user, "Receipts");

                let a = seed_message(conn, &first.gmail, &first.category, "a");
                let b = seed_message(conn, &first.gmail, &first.category, "b");
                let c = seed_message(conn, &first.gmail, &receipts, "c");
                email_messages::update(
                    conn,
                    &a.id,
                    &EmailMessageUpdate::new()
                        .summary("weekly digest")
                        .import_status(EmailImportStatus::Archived),
                )?;

                email_actions::insert(
                    conn,
                    &EmailAction::pending(b.id.clone(), EmailActionType::Trash, Utc::now()),
                )?;
                let done = EmailAction::pending(c.id.clone(), EmailActionType::Archive, Utc::now());
                email_actions::insert(conn, &done)?;
                email_actions::transition(conn, &done.id, EmailActionStatus::Succeeded, None)?;

                let second = seed_mailbox(conn, "second@example.com");
                seed_message(conn, &second.gmail, &second.category, "z");
                Ok((first, second))
            })
            .await
            .unwrap();
        (db, first, second)
    }

    #[tokio::test]
    async fn report_covers_whole_store() {
        let (db, _, _) = seeded().await;
        let report = StatsService::new(db).report(StatsScope::all()).await.unwrap();

        assert_eq!(report.users, 2);
        assert_eq!(report.gmail_accounts, 2);
        assert_eq!(report.categories, 3);
        assert_eq!(report.messages.count, 4);
        assert_eq!(report.messages.summarized, 1);
        assert_eq!(report.message_count(EmailImportStatus::Imported), 3);
        assert_eq!(report.message_count(EmailImportStatus::Archived), 1);
        assert_eq!(report.message_count(EmailImportStatus::Trashed), 0);
        assert_eq!(report.messages_by_status.len(), EmailImportStatus::ALL.len());
        assert_eq!(report.pending_actions(), 1);
        assert_eq!(report.action_count(EmailActionStatus::Succeeded), 1);
        assert_eq!(report.action_count(EmailActionStatus::Failed), 0);
    }

    #[tokio::test]
    async fn report_scoped_to_user() {
        let (db, first, second) = seeded().await;
        let service = StatsService::new(db);

        let report = service
            .report(StatsScope::user(first.user.id.clone()))
            .await
            .unwrap();
        assert_eq!(report.users, 1);
        assert_eq!(report.gmail_accounts, 1);
        assert_eq!(report.categories, 2);
        assert_eq!(report.messages.count, 3);
        assert_eq!(
            report.messages_by_category,
            vec![
                CategoryStat {
                    category_id: first.category.id.clone(),
                    name: "Newsletters".to_string(),
                    count: 2,
                },
                CategoryStat {
                    category_id: report.messages_by_category[1].category_id.clone(),
                    name: "Receipts".to_string(),
                    count: 1,
                },
            ]
        );

        let other = service
            .report(StatsScope::user(second.user.id.clone()))
            .await
            .unwrap();
        assert_eq!(other.messages.count, 1);
        assert_eq!(other.pending_actions(), 0);
    }

    #[tokio::test]
    async fn report_respects_receive_window() {
        let (db, _, _) = seeded().await;
        let report = StatsService::new(db)
            .report(StatsScope::all().received_between(Some(1_800_000_000_000), None))
            .await
            .unwrap();

        assert_eq!(report.messages.count, 0);
        assert!(report.messages_by_category.is_empty());
        assert_eq!(report.users, 2);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (db, _, _) = seeded().await;
        let err = StatsService::new(db)
            .report(StatsScope::user(UserId::from("ghost")))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn report_serializes_to_json() {
        let (db, _, _) = seeded().await;
        let report = StatsService::new(db).report(StatsScope::all()).await.unwrap();

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["users"], 2);
        assert_eq!(json["messages"]["count"], 4);
        assert_eq!(json["actions_by_status"][0], serde_json::json!(["PENDING", 1]));
    }
}
