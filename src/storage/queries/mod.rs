//! Database query modules for CRUD operations.
//!
//! Each module provides functions over a `&Connection`, so they can be called
//! from `Database::with_conn` or composed inside `Database::transaction`.

pub mod accounts;
pub mod categories;
pub mod email_actions;
pub mod email_messages;
pub mod filter;
pub mod gmail_accounts;
pub mod sessions;
pub mod users;
pub mod verification_tokens;

#[cfg(test)]
pub(crate) mod fixtures;

pub use email_actions::{ActionStatusCount, EmailActionFilter};
pub use email_messages::{CategoryCount, EmailMessageFilter, MessageAggregate, StatusCount};
pub use filter::{Page, SortOrder, WhereClause};
pub use gmail_accounts::GmailAccountFilter;
pub use users::UserFilter;
