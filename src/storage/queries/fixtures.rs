//! Test fixtures shared by the query modules.

use chrono::Utc;
use rusqlite::Connection;

use super::{categories, email_messages, gmail_accounts, users};
use crate::domain::{
    Category, EmailMessage, GmailAccount, NewEmailMessage, NewGmailAccount, NewUser, User,
};
use crate::storage::schema;

/// Opens a migrated in-memory connection with foreign keys on.
pub(crate) fn setup() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
    schema::migrate(&conn).unwrap();
    conn
}

pub(crate) fn seed_user(conn: &Connection, email: &str) -> User {
    let user = NewUser::with_email(email).into_user(Utc::now());
    users::insert(conn, &user).unwrap();
    user
}

pub(crate) fn seed_gmail_account(conn: &Connection, user: &User, email: &str) -> GmailAccount {
    let account = NewGmailAccount::new(
        user.id.clone(),
        email,
        format!("sub-{email}"),
        "refresh-token",
    )
    .into_account(Utc::now());
    gmail_accounts::insert(conn, &account).unwrap();
    account
}

pub(crate) fn seed_category(conn: &Connection, user: &User, name: &str) -> Category {
    let category = Category::new(user.id.clone(), name, Utc::now());
    categories::insert(conn, &category).unwrap();
    category
}

pub(crate) fn new_message(
    mailbox: &GmailAccount,
    category: &Category,
    gmail_message_id: &str,
    internal_date_ms: i64,
) -> NewEmailMessage {
    NewEmailMessage::new(
        mailbox.user_id.clone(),
        mailbox.id.clone(),
        category.id.clone(),
        gmail_message_id,
        format!("thread-{gmail_message_id}"),
        internal_date_ms,
        "sender@example.com",
    )
}

pub(crate) fn seed_message(
    conn: &Connection,
    mailbox: &GmailAccount,
    category: &Category,
    gmail_message_id: &str,
) -> EmailMessage {
    let message =
        new_message(mailbox, category, gmail_message_id, 1_700_000_000_000).into_message(Utc::now());
    email_messages::insert(conn, &message).unwrap();
    message
}

/// A user with one mailbox and one category.
pub(crate) struct Mailbox {
    pub user: User,
    pub gmail: GmailAccount,
    pub category: Category,
}

pub(crate) fn seed_mailbox(conn: &Connection, email: &str) -> Mailbox {
    let user = seed_user(conn, email);
    let gmail = seed_gmail_account(conn, &user, email);
    let category = seed_category(conn, &user, "Newsletters");
    Mailbox {
        user,
        gmail,
        category,
    }
}
