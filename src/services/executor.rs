//! Action executor trait definition.
//!
//! This module defines the [`ActionExecutor`] trait, the seam between the
//! triage store and the mail provider that actually archives, trashes or
//! unsubscribes. Implementations talk to the Gmail API; the store only
//! records what they report.

use async_trait::async_trait;

use crate::domain::{EmailActionType, EmailMessage};

/// Errors an executor can report for a single action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// Authentication failed or credentials expired.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        /// Seconds to wait before retrying, if known.
        retry_after_secs: Option<u64>,
    },

    /// The message no longer exists at the provider.
    #[error("message not found at provider: {0}")]
    NotFound(String),

    /// An unsubscribe was requested for a message without links.
    #[error("message has no unsubscribe link")]
    NoUnsubscribeLink,

    /// Provider-specific error.
    #[error("provider error: {0}")]
    Provider(String),
}

/// Carries out an action against the mail provider.
///
/// On success, returns details to store on the action record (for example
/// the provider response or the link that was followed).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        message: &EmailMessage,
        action: EmailActionType,
    ) -> Result<serde_json::Value, ExecutorError>;
}
