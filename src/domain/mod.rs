//! Domain layer types for the triage store.
//!
//! This module contains the entity types persisted by the storage layer:
//! users and their OAuth links, sessions, connected Gmail mailboxes,
//! categories, imported email and the actions taken on it.

mod account;
mod category;
mod email_action;
mod email_message;
mod gmail_account;
mod session;
mod types;
pub mod unsubscribe;
mod user;

pub use account::{Account, OAuthTokens};
pub use category::Category;
pub use email_action::{EmailAction, EmailActionStatus, EmailActionType};
pub use email_message::{EmailImportStatus, EmailMessage, EmailMessageUpdate, NewEmailMessage};
pub use gmail_account::{history_id_is_newer, GmailAccount, NewGmailAccount};
pub use session::{Session, VerificationToken};
pub use types::{
    AccountId, CategoryId, EmailActionId, EmailMessageId, GmailAccountId, ParseEnumError,
    SessionId, UserId,
};
pub use unsubscribe::{LinkKind, UnsubscribeLink};
pub use user::{NewUser, User, UserUpdate};
