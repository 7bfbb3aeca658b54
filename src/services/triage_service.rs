//! Triage service for importing email and acting on it.
//!
//! Coordinates between the action executor and storage:
//! - Batch import with duplicate detection
//! - Classification into categories with summaries
//! - Requesting archive, trash and unsubscribe actions
//! - Running pending actions and recording their outcome

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;

use super::error::{Result, ServiceError};
use super::executor::{ActionExecutor, ExecutorError};
use crate::domain::{
    CategoryId, EmailAction, EmailActionId, EmailActionStatus, EmailActionType, EmailMessage,
    EmailMessageId, EmailMessageUpdate, GmailAccountId, NewEmailMessage, UserId,
};
use crate::storage::queries::{
    categories, email_actions, email_messages, gmail_accounts, EmailActionFilter, Page,
};
use crate::storage::{Database, DatabaseError};

/// Outcome of an import batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Messages written to the store.
    pub imported: usize,
    /// Messages skipped because the mailbox already had them.
    pub duplicates: usize,
}

/// Outcome of a pending action run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionRunReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Actions completed elsewhere or whose message disappeared mid-run.
    pub skipped: usize,
}

/// Service for importing and triaging email.
pub struct TriageService {
    db: Database,
    executor: Arc<dyn ActionExecutor>,
}

impl TriageService {
    /// Creates a new triage service.
    pub fn new(db: Database, executor: Arc<dyn ActionExecutor>) -> Self {
        Self { db, executor }
    }

    /// Imports a batch of messages in one transaction.
    ///
    /// Unsubscribe links are parsed from `List-Unsubscribe` when not given.
    /// Messages already imported for the same mailbox are counted as
    /// duplicates instead of failing the batch. The whole batch is rejected
    /// if any message names a mailbox or category its user does not own.
    pub async fn import_messages(&self, batch: Vec<NewEmailMessage>) -> Result<ImportReport> {
        if batch.is_empty() {
            return Ok(ImportReport::default());
        }

        let now = Utc::now();
        let messages: Vec<EmailMessage> = batch
            .into_iter()
            .map(|m| m.with_parsed_unsubscribe_links().into_message(now))
            .collect();
        let total = messages.len();

        let imported = self
            .db
            .transaction(move |tx| {
                check_ownership(tx, &messages)?;
                email_messages::insert_many(tx, &messages, true)
            })
            .await
            .map_err(ServiceError::from_storage)?;

        let report = ImportReport {
            imported,
            duplicates: total - imported,
        };
        tracing::info!(
            imported = report.imported,
            duplicates = report.duplicates,
            "import batch stored"
        );
        Ok(report)
    }

    /// Files a message under a category, optionally storing a summary.
    ///
    /// The category must belong to the message's owner.
    pub async fn classify(
        &self,
        message_id: &EmailMessageId,
        category_id: &CategoryId,
        summary: Option<String>,
    ) -> Result<EmailMessage> {
        let message_id = message_id.clone();
        let category_id = category_id.clone();

        self.db
            .transaction(move |tx| {
                let message = email_messages::require(tx, &message_id)?;
                let category = categories::require(tx, &category_id)?;
                if category.user_id != message.user_id {
                    return Err(DatabaseError::not_found(
                        "category",
                        format!("{} for user {}", category_id, message.user_id),
                    ));
                }

                let mut changes = EmailMessageUpdate::new().category(category_id.clone());
                if let Some(summary) = summary {
                    changes = changes.summary(summary);
                }
                email_messages::update(tx, &message_id, &changes)
            })
            .await
            .map_err(ServiceError::from_storage)
    }

    /// Records a PENDING action against a message.
    pub async fn request_action(
        &self,
        message_id: &EmailMessageId,
        action_type: EmailActionType,
        details: Option<serde_json::Value>,
    ) -> Result<EmailAction> {
        let message_id = message_id.clone();

        let action = self
            .db
            .transaction(move |tx| {
                email_messages::require(tx, &message_id)?;
                let mut action = EmailAction::pending(message_id, action_type, Utc::now());
                if let Some(details) = details {
                    action = action.with_details(details);
                }
                email_actions::insert(tx, &action)?;
                Ok(action)
            })
            .await
            .map_err(ServiceError::from_storage)?;

        tracing::debug!(
            action_id = %action.id,
            message_id = %action.email_message_id,
            action_type = %action.action_type,
            "action requested"
        );
        Ok(action)
    }

    /// Runs up to `limit` pending actions, oldest first.
    ///
    /// Executor failures are recorded on the action as FAILED and do not stop
    /// the run. Storage errors do.
    pub async fn run_pending_actions(&self, limit: u32) -> Result<ActionRunReport> {
        let filter = EmailActionFilter::pending().page(Page::first(limit));
        let pending = self
            .db
            .with_conn(move |conn| email_actions::find_many(conn, &filter))
            .await?;

        let mut report = ActionRunReport::default();
        for action in pending {
            report.attempted += 1;
            let action_id = action.id.clone();

            match self.perform(action).await {
                Ok((_, None)) => report.succeeded += 1,
                Ok((_, Some(_))) => report.failed += 1,
                Err(ServiceError::NotFound { .. })
                | Err(ServiceError::Storage(DatabaseError::InvalidTransition { .. })) => {
                    tracing::warn!(action_id = %action_id, "action skipped, no longer pending");
                    report.skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "pending actions processed"
        );
        Ok(report)
    }

    /// Runs a single pending action.
    ///
    /// The outcome is recorded either way; an executor failure is also
    /// returned as [`ServiceError::Executor`].
    pub async fn execute_action(&self, action_id: &EmailActionId) -> Result<EmailAction> {
        let id = action_id.clone();
        let action = self
            .db
            .with_conn(move |conn| email_actions::require(conn, &id))
            .await
            .map_err(ServiceError::from_storage)?;

        if action.status.is_terminal() {
            return Err(DatabaseError::InvalidTransition {
                id: action.id.0.clone(),
                from: action.status,
                to: EmailActionStatus::Succeeded,
            }
            .into());
        }

        match self.perform(action).await? {
            (updated, None) => Ok(updated),
            (_, Some(err)) => Err(ServiceError::Executor(err)),
        }
    }

    /// Executes one action and records the result.
    ///
    /// The status transition and the resulting import status change commit
    /// together.
    async fn perform(&self, action: EmailAction) -> Result<(EmailAction, Option<ExecutorError>)> {
        let message_id = action.email_message_id.clone();
        let message = self
            .db
            .with_conn(move |conn| email_messages::require(conn, &message_id))
            .await
            .map_err(ServiceError::from_storage)?;

        tracing::debug!(
            action_id = %action.id,
            message_id = %message.id,
            action_type = %action.action_type,
            "executing action"
        );

        let (status, details, error) = match self.executor.execute(&message, action.action_type).await
        {
            Ok(details) => (EmailActionStatus::Succeeded, details, None),
            Err(err) => {
                tracing::warn!(
                    action_id = %action.id,
                    message_id = %message.id,
                    error = %err,
                    "action failed"
                );
                let details = serde_json::json!({ "error": err.to_string() });
                (EmailActionStatus::Failed, details, Some(err))
            }
        };

        let action_id = action.id.clone();
        let action_type = action.action_type;
        let updated = self
            .db
            .transaction(move |tx| {
                let updated = email_actions::transition(tx, &action_id, status, Some(&details))?;
                if status == EmailActionStatus::Succeeded {
                    if let Some(import_status) = action_type.resulting_import_status() {
                        email_messages::update(
                            tx,
                            &message.id,
                            &EmailMessageUpdate::new().import_status(import_status),
                        )?;
                    }
                }
                Ok(updated)
            })
            .await
            .map_err(ServiceError::from_storage)?;

        Ok((updated, error))
    }
}

/// Every message's mailbox and category must belong to its user.
fn check_ownership(conn: &Connection, messages: &[EmailMessage]) -> crate::storage::Result<()> {
    let mut mailbox_owners: HashMap<GmailAccountId, UserId> = HashMap::new();
    let mut category_owners: HashMap<CategoryId, UserId> = HashMap::new();

    for message in messages {
        let owner = match mailbox_owners.entry(message.gmail_account_id.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                entry.insert(gmail_accounts::require(conn, &message.gmail_account_id)?.user_id)
            }
        };
        if *owner != message.user_id {
            return Err(DatabaseError::not_found(
                "gmail account",
                format!("{} for user {}", message.gmail_account_id, message.user_id),
            ));
        }

        let owner = match category_owners.entry(message.category_id.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                entry.insert(categories::require(conn, &message.category_id)?.user_id)
            }
        };
        if *owner != message.user_id {
            return Err(DatabaseError::not_found(
                "category",
                format!("{} for user {}", message.category_id, message.user_id),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EmailImportStatus, GmailAccount};
    use crate::services::executor::MockActionExecutor;
    use crate::storage::queries::fixtures::{new_message, seed_category, seed_mailbox, Mailbox};
    use crate::storage::queries::EmailMessageFilter;
    use serde_json::json;

    async fn setup() -> (Database, Mailbox) {
        let db = Database::open_in_memory().await.unwrap();
        let mailbox = db
            .with_conn(|conn| Ok(seed_mailbox(conn, "owner@example.com")))
            .await
            .unwrap();
        (db, mailbox)
    }

    fn idle_executor() -> Arc<dyn ActionExecutor> {
        let mut executor = MockActionExecutor::new();
        executor.expect_execute().never();
        Arc::new(executor)
    }

    fn batch(mb: &Mailbox, ids: &[&str]) -> Vec<NewEmailMessage> {
        ids.iter()
            .map(|id| new_message(&mb.gmail, &mb.category, id, 1_700_000_000_000))
            .collect()
    }

    async fn import_one(service: &TriageService, mb: &Mailbox, id: &str) -> EmailMessage {
        service.import_messages(batch(mb, &[id])).await.unwrap();
        let gmail: GmailAccount = mb.gmail.clone();
        let id = id.to_string();
        service
            .db
            .with_conn(move |conn| email_messages::get_by_gmail_id(conn, &gmail.id, &id))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn import_counts_duplicates() {
        let (db, mb) = setup().await;
        let service = TriageService::new(db, idle_executor());

        let first = service.import_messages(batch(&mb, &["a", "b"])).await.unwrap();
        assert_eq!(first, ImportReport { imported: 2, duplicates: 0 });

        let second = service
            .import_messages(batch(&mb, &["b", "c", "c"]))
            .await
            .unwrap();
        assert_eq!(second, ImportReport { imported: 1, duplicates: 2 });

        let empty = service.import_messages(Vec::new()).await.unwrap();
        assert_eq!(empty, ImportReport::default());
    }

    #[tokio::test]
    async fn import_parses_unsubscribe_header() {
        let (db, mb) = setup().await;
        let service = TriageService::new(db, idle_executor());

        let new = new_message(&mb.gmail, &mb.category, "n1", 1)
            .list_unsubscribe("<mailto:off@example.com>, <https://example.com/off>");
        service.import_messages(vec![new]).await.unwrap();

        let gmail_id = mb.gmail.id.clone();
        let stored = service
            .db
            .with_conn(move |conn| email_messages::get_by_gmail_id(conn, &gmail_id, "n1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.links().len(), 2);
    }

    #[tokio::test]
    async fn import_rejects_mailbox_of_another_user() {
        let (db, mb) = setup().await;
        let service = TriageService::new(db.clone(), idle_executor());
        let stranger = db
            .with_conn(|conn| Ok(seed_mailbox(conn, "stranger@example.com")))
            .await
            .unwrap();

        let mut borrowed = new_message(&mb.gmail, &mb.category, "x1", 1);
        borrowed.user_id = stranger.user.id.clone();
        let err = service.import_messages(vec![borrowed]).await.unwrap_err();
        assert!(err.is_not_found());

        // One bad message rejects the whole batch.
        let mut mixed = batch(&mb, &["ok"]);
        mixed.push(new_message(&mb.gmail, &stranger.category, "x2", 1));
        let err = service.import_messages(mixed).await.unwrap_err();
        assert!(err.is_not_found());

        let owners = [mb.user.id.clone(), stranger.user.id.clone()];
        for user_id in owners {
            let stored = db
                .with_conn(move |conn| {
                    email_messages::count(conn, &EmailMessageFilter::new().user(user_id))
                })
                .await
                .unwrap();
            assert_eq!(stored, 0);
        }
    }

    #[tokio::test]
    async fn classify_moves_message_and_stores_summary() {
        let (db, mb) = setup().await;
        let service = TriageService::new(db.clone(), idle_executor());
        let message = import_one(&service, &mb, "m1").await;

        let user = mb.user.clone();
        let receipts = db
            .with_conn(move |conn| Ok(seed_category(conn, &user, "Receipts")))
            .await
            .unwrap();

        let classified = service
            .classify(&message.id, &receipts.id, Some("Your order shipped".to_string()))
            .await
            .unwrap();
        assert_eq!(classified.category_id, receipts.id);
        assert_eq!(classified.summary.as_deref(), Some("Your order shipped"));
    }

    #[tokio::test]
    async fn classify_rejects_foreign_category() {
        let (db, mb) = setup().await;
        let service = TriageService::new(db.clone(), idle_executor());
        let message = import_one(&service, &mb, "m1").await;

        let stranger = db
            .with_conn(|conn| Ok(seed_mailbox(conn, "stranger@example.com")))
            .await
            .unwrap();

        let err = service
            .classify(&message.id, &stranger.category.id, None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = service
            .classify(&EmailMessageId::from("missing"), &mb.category.id, None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn request_action_requires_message() {
        let (db, mb) = setup().await;
        let service = TriageService::new(db, idle_executor());
        let message = import_one(&service, &mb, "m1").await;

        let action = service
            .request_action(&message.id, EmailActionType::Archive, Some(json!({"rule": 7})))
            .await
            .unwrap();
        assert_eq!(action.status, EmailActionStatus::Pending);
        assert_eq!(action.details, Some(json!({"rule": 7})));

        let err = service
            .request_action(&EmailMessageId::from("missing"), EmailActionType::Trash, None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn run_pending_actions_records_outcomes() {
        let (db, mb) = setup().await;

        let mut executor = MockActionExecutor::new();
        executor
            .expect_execute()
            .times(3)
            .returning(|message, action| match action {
                EmailActionType::Archive => Ok(json!({"archived": message.gmail_message_id})),
                EmailActionType::Trash => Err(ExecutorError::Provider("quota".to_string())),
                EmailActionType::UnsubscribeAttempt => Ok(json!({"followed": "https"})),
            });
        let service = TriageService::new(db.clone(), Arc::new(executor));

        let archived = import_one(&service, &mb, "archive-me").await;
        let trashed = import_one(&service, &mb, "trash-me").await;
        let unsub = import_one(&service, &mb, "unsub-me").await;
        let a = service
            .request_action(&archived.id, EmailActionType::Archive, None)
            .await
            .unwrap();
        let t = service
            .request_action(&trashed.id, EmailActionType::Trash, None)
            .await
            .unwrap();
        service
            .request_action(&unsub.id, EmailActionType::UnsubscribeAttempt, None)
            .await
            .unwrap();

        let report = service.run_pending_actions(10).await.unwrap();
        assert_eq!(
            report,
            ActionRunReport {
                attempted: 3,
                succeeded: 2,
                failed: 1,
                skipped: 0
            }
        );

        let (a, t, archived, trashed, unsub) = db
            .with_conn(move |conn| {
                Ok((
                    email_actions::require(conn, &a.id)?,
                    email_actions::require(conn, &t.id)?,
                    email_messages::require(conn, &archived.id)?,
                    email_messages::require(conn, &trashed.id)?,
                    email_messages::require(conn, &unsub.id)?,
                ))
            })
            .await
            .unwrap();

        assert_eq!(a.status, EmailActionStatus::Succeeded);
        assert_eq!(a.details, Some(json!({"archived": "archive-me"})));
        assert_eq!(archived.import_status, EmailImportStatus::Archived);

        assert_eq!(t.status, EmailActionStatus::Failed);
        assert_eq!(t.details, Some(json!({"error": "provider error: quota"})));
        assert_eq!(trashed.import_status, EmailImportStatus::Imported);

        assert_eq!(unsub.import_status, EmailImportStatus::Imported);

        let again = service.run_pending_actions(10).await.unwrap();
        assert_eq!(again, ActionRunReport::default());
    }

    #[tokio::test]
    async fn run_pending_actions_respects_limit() {
        let (db, mb) = setup().await;

        let mut executor = MockActionExecutor::new();
        executor
            .expect_execute()
            .times(1)
            .returning(|_, _| Ok(json!({})));
        let service = TriageService::new(db, Arc::new(executor));

        let message = import_one(&service, &mb, "m1").await;
        for action_type in [EmailActionType::Trash, EmailActionType::Archive] {
            service
                .request_action(&message.id, action_type, None)
                .await
                .unwrap();
        }

        let report = service.run_pending_actions(1).await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.succeeded, 1);
    }

    #[tokio::test]
    async fn execute_action_surfaces_executor_error() {
        let (db, mb) = setup().await;

        let mut executor = MockActionExecutor::new();
        executor
            .expect_execute()
            .times(1)
            .returning(|_, _| Err(ExecutorError::NoUnsubscribeLink));
        let service = TriageService::new(db, Arc::new(executor));

        let message = import_one(&service, &mb, "m1").await;
        let action = service
            .request_action(&message.id, EmailActionType::UnsubscribeAttempt, None)
            .await
            .unwrap();

        let err = service.execute_action(&action.id).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Executor(ExecutorError::NoUnsubscribeLink)
        ));

        let err = service.execute_action(&action.id).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Storage(DatabaseError::InvalidTransition {
                from: EmailActionStatus::Failed,
                ..
            })
        ));

        let err = service
            .execute_action(&EmailActionId::from("missing"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
