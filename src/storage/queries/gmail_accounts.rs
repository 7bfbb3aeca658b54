//! Connected Gmail mailbox queries.
//!
//! Besides CRUD this owns the sync watermark: [`advance_sync`] records a
//! completed sync and only ever moves `last_history_id` forward.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::filter::{page_sql, Page, SortOrder, WhereClause};
use crate::domain::{history_id_is_newer, GmailAccount, GmailAccountId, UserId};
use crate::storage::{DatabaseError, Result};

const COLUMNS: &str = "id, user_id, email, google_sub, refresh_token, access_token, token_expiry,
    last_history_id, last_synced_at, created_at, updated_at";

/// Criteria for [`find_many`] and [`find_first`].
#[derive(Debug, Clone, Default)]
pub struct GmailAccountFilter {
    pub user_id: Option<UserId>,
    pub email: Option<String>,
    /// `Some(true)` for mailboxes that have never completed a sync.
    pub never_synced: Option<bool>,
    /// Order by creation time.
    pub order: SortOrder,
    pub page: Option<Page>,
}

impl GmailAccountFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn never_synced(mut self, never_synced: bool) -> Self {
        self.never_synced = Some(never_synced);
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn page(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }

    fn where_clause(&self) -> WhereClause {
        let mut clause = WhereClause::new();
        if let Some(user_id) = &self.user_id {
            clause.eq("user_id", user_id.0.clone());
        }
        if let Some(email) = &self.email {
            clause.eq("email", email.clone());
        }
        match self.never_synced {
            Some(true) => {
                clause.raw("last_history_id IS NULL");
            }
            Some(false) => {
                clause.raw("last_history_id IS NOT NULL");
            }
            None => {}
        }
        clause
    }
}

/// Inserts a new mailbox connection.
pub fn insert(conn: &Connection, account: &GmailAccount) -> Result<()> {
    conn.execute(
        "INSERT INTO gmail_accounts (id, user_id, email, google_sub, refresh_token, access_token,
            token_expiry, last_history_id, last_synced_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            account.id.0.as_str(),
            account.user_id.0.as_str(),
            account.email,
            account.google_sub,
            account.refresh_token,
            account.access_token,
            account.token_expiry,
            account.last_history_id,
            account.last_synced_at,
            account.created_at,
            account.updated_at,
        ],
    )?;
    Ok(())
}

/// Gets a mailbox by ID.
pub fn get_by_id(conn: &Connection, id: &GmailAccountId) -> Result<Option<GmailAccount>> {
    let account = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM gmail_accounts WHERE id = ?1"),
            params![id.0.as_str()],
            row_to_gmail_account,
        )
        .optional()?;
    Ok(account)
}

/// Gets a user's mailbox by address.
pub fn get_by_email(
    conn: &Connection,
    user_id: &UserId,
    email: &str,
) -> Result<Option<GmailAccount>> {
    let account = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM gmail_accounts WHERE user_id = ?1 AND email = ?2"),
            params![user_id.0.as_str(), email],
            row_to_gmail_account,
        )
        .optional()?;
    Ok(account)
}

/// Gets a user's mailbox by Google subject id.
pub fn get_by_google_sub(
    conn: &Connection,
    user_id: &UserId,
    google_sub: &str,
) -> Result<Option<GmailAccount>> {
    let account = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM gmail_accounts WHERE user_id = ?1 AND google_sub = ?2"
            ),
            params![user_id.0.as_str(), google_sub],
            row_to_gmail_account,
        )
        .optional()?;
    Ok(account)
}

/// Gets a mailbox by ID, failing if it does not exist.
pub fn require(conn: &Connection, id: &GmailAccountId) -> Result<GmailAccount> {
    get_by_id(conn, id)?.ok_or_else(|| DatabaseError::not_found("gmail account", id.as_str()))
}

/// Lists mailboxes matching the filter.
pub fn find_many(conn: &Connection, filter: &GmailAccountFilter) -> Result<Vec<GmailAccount>> {
    let clause = filter.where_clause();
    let sql = format!(
        "SELECT {COLUMNS} FROM gmail_accounts{} ORDER BY created_at {}, id{}",
        clause.sql(),
        filter.order.as_sql(),
        page_sql(filter.page),
    );

    let mut stmt = conn.prepare(&sql)?;
    let accounts = stmt
        .query_map(params_from_iter(clause.params()), row_to_gmail_account)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(accounts)
}

/// Returns the first mailbox matching the filter.
pub fn find_first(conn: &Connection, filter: &GmailAccountFilter) -> Result<Option<GmailAccount>> {
    let filter = filter.clone().page(Page::first(1));
    Ok(find_many(conn, &filter)?.into_iter().next())
}

/// Stores a refreshed access token. A new refresh token replaces the stored
/// one only when given.
pub fn update_tokens(
    conn: &Connection,
    id: &GmailAccountId,
    access_token: &str,
    token_expiry: DateTime<Utc>,
    refresh_token: Option<&str>,
) -> Result<GmailAccount> {
    let updated = conn.execute(
        "UPDATE gmail_accounts SET access_token = ?1, token_expiry = ?2,
            refresh_token = COALESCE(?3, refresh_token), updated_at = ?4
         WHERE id = ?5",
        params![
            access_token,
            token_expiry,
            refresh_token,
            Utc::now(),
            id.0.as_str()
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::not_found("gmail account", id.as_str()));
    }
    require(conn, id)
}

/// Records a completed sync.
///
/// `last_synced_at` is always set. `last_history_id` is replaced only if
/// `history_id` is newer than the stored value.
pub fn advance_sync(
    conn: &Connection,
    id: &GmailAccountId,
    history_id: &str,
    synced_at: DateTime<Utc>,
) -> Result<GmailAccount> {
    let mut account = require(conn, id)?;
    if history_id_is_newer(account.last_history_id.as_deref(), history_id) {
        account.last_history_id = Some(history_id.to_string());
    } else {
        tracing::debug!(
            gmail_account_id = %id,
            stored = ?account.last_history_id,
            history_id,
            "ignoring stale history id"
        );
    }
    account.last_synced_at = Some(synced_at);
    account.updated_at = Utc::now();

    conn.execute(
        "UPDATE gmail_accounts SET last_history_id = ?1, last_synced_at = ?2, updated_at = ?3
         WHERE id = ?4",
        params![
            account.last_history_id,
            account.last_synced_at,
            account.updated_at,
            account.id.0.as_str(),
        ],
    )?;
    Ok(account)
}

/// Inserts the mailbox, or refreshes the existing connection for the same
/// (user_id, google_sub). Sync state of an existing connection is kept.
pub fn upsert(conn: &Connection, account: &GmailAccount) -> Result<GmailAccount> {
    conn.execute(
        "INSERT INTO gmail_accounts (id, user_id, email, google_sub, refresh_token, access_token,
            token_expiry, last_history_id, last_synced_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(user_id, google_sub) DO UPDATE SET
             email = excluded.email,
             refresh_token = excluded.refresh_token,
             access_token = COALESCE(excluded.access_token, gmail_accounts.access_token),
             token_expiry = COALESCE(excluded.token_expiry, gmail_accounts.token_expiry),
             updated_at = excluded.updated_at",
        params![
            account.id.0.as_str(),
            account.user_id.0.as_str(),
            account.email,
            account.google_sub,
            account.refresh_token,
            account.access_token,
            account.token_expiry,
            account.last_history_id,
            account.last_synced_at,
            account.created_at,
            account.updated_at,
        ],
    )?;

    get_by_google_sub(conn, &account.user_id, &account.google_sub)?
        .ok_or_else(|| DatabaseError::not_found("gmail account", account.google_sub.as_str()))
}

/// Deletes a mailbox and its imported messages. Returns false if it did not exist.
pub fn delete(conn: &Connection, id: &GmailAccountId) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM gmail_accounts WHERE id = ?1",
        params![id.0.as_str()],
    )?;
    Ok(deleted > 0)
}

/// Counts mailboxes matching the filter. Paging is ignored.
pub fn count(conn: &Connection, filter: &GmailAccountFilter) -> Result<u64> {
    let clause = filter.where_clause();
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM gmail_accounts{}", clause.sql()),
        params_from_iter(clause.params()),
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Counts mailboxes connected by a user.
pub fn count_by_user(conn: &Connection, user_id: &UserId) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM gmail_accounts WHERE user_id = ?1",
        params![user_id.0.as_str()],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

fn row_to_gmail_account(row: &Row<'_>) -> rusqlite::Result<GmailAccount> {
    Ok(GmailAccount {
        id: GmailAccountId::from(row.get::<_, String>(0)?),
        user_id: UserId::from(row.get::<_, String>(1)?),
        email: row.get(2)?,
        google_sub: row.get(3)?,
        refresh_token: row.get(4)?,
        access_token: row.get(5)?,
        token_expiry: row.get(6)?,
        last_history_id: row.get(7)?,
        last_synced_at: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}
