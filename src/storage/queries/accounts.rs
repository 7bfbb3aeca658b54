//! OAuth account database queries.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::domain::{Account, AccountId, OAuthTokens, UserId};
use crate::storage::{DatabaseError, Result};

const COLUMNS: &str = "id, user_id, account_type, provider, provider_account_id, refresh_token,
    access_token, expires_at, token_type, scope, id_token, session_state";

/// Inserts a new account link.
pub fn insert(conn: &Connection, account: &Account) -> Result<()> {
    conn.execute(
        "INSERT INTO accounts (id, user_id, account_type, provider, provider_account_id,
            refresh_token, access_token, expires_at, token_type, scope, id_token, session_state)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            account.id.0.as_str(),
            account.user_id.0.as_str(),
            account.account_type,
            account.provider,
            account.provider_account_id,
            account.refresh_token,
            account.access_token,
            account.expires_at,
            account.token_type,
            account.scope,
            account.id_token,
            account.session_state,
        ],
    )?;
    Ok(())
}

/// Gets an account by ID.
pub fn get_by_id(conn: &Connection, id: &AccountId) -> Result<Option<Account>> {
    let account = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM accounts WHERE id = ?1"),
            params![id.0.as_str()],
            row_to_account,
        )
        .optional()?;
    Ok(account)
}

/// Gets the account for a remote identity.
pub fn get_by_provider(
    conn: &Connection,
    provider: &str,
    provider_account_id: &str,
) -> Result<Option<Account>> {
    let account = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM accounts WHERE provider = ?1 AND provider_account_id = ?2"
            ),
            params![provider, provider_account_id],
            row_to_account,
        )
        .optional()?;
    Ok(account)
}

/// Gets an account by ID, failing if it does not exist.
pub fn require(conn: &Connection, id: &AccountId) -> Result<Account> {
    get_by_id(conn, id)?.ok_or_else(|| DatabaseError::not_found("account", id.as_str()))
}

/// Gets all account links for a user.
pub fn get_by_user(conn: &Connection, user_id: &UserId) -> Result<Vec<Account>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM accounts WHERE user_id = ?1 ORDER BY provider, provider_account_id"
    ))?;

    let accounts = stmt
        .query_map(params![user_id.0.as_str()], row_to_account)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(accounts)
}

/// Stores fresh token material on an account and returns the result.
pub fn update_tokens(conn: &Connection, id: &AccountId, tokens: &OAuthTokens) -> Result<Account> {
    let mut account = require(conn, id)?;
    tokens.apply_to(&mut account);

    conn.execute(
        "UPDATE accounts SET refresh_token = ?1, access_token = ?2, expires_at = ?3,
            token_type = ?4, scope = ?5, id_token = ?6
         WHERE id = ?7",
        params![
            account.refresh_token,
            account.access_token,
            account.expires_at,
            account.token_type,
            account.scope,
            account.id_token,
            account.id.0.as_str(),
        ],
    )?;
    Ok(account)
}

/// Inserts the account or refreshes the tokens of the existing link for the
/// same (provider, provider_account_id).
///
/// The owning user of an existing link is never changed. A missing refresh
/// token keeps the stored one.
pub fn upsert(conn: &Connection, account: &Account) -> Result<Account> {
    conn.execute(
        "INSERT INTO accounts (id, user_id, account_type, provider, provider_account_id,
            refresh_token, access_token, expires_at, token_type, scope, id_token, session_state)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(provider, provider_account_id) DO UPDATE SET
             refresh_token = COALESCE(excluded.refresh_token, accounts.refresh_token),
             access_token = excluded.access_token,
             expires_at = excluded.expires_at,
             token_type = excluded.token_type,
             scope = excluded.scope,
             id_token = excluded.id_token,
             session_state = excluded.session_state",
        params![
            account.id.0.as_str(),
            account.user_id.0.as_str(),
            account.account_type,
            account.provider,
            account.provider_account_id,
            account.refresh_token,
            account.access_token,
            account.expires_at,
            account.token_type,
            account.scope,
            account.id_token,
            account.session_state,
        ],
    )?;

    get_by_provider(conn, &account.provider, &account.provider_account_id)?.ok_or_else(|| {
        DatabaseError::not_found(
            "account",
            format!("{}:{}", account.provider, account.provider_account_id),
        )
    })
}

/// Deletes an account link. Returns false if it did not exist.
pub fn delete(conn: &Connection, id: &AccountId) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM accounts WHERE id = ?1", params![id.0.as_str()])?;
    Ok(deleted > 0)
}

/// Deletes all account links for a user.
pub fn delete_by_user(conn: &Connection, user_id: &UserId) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM accounts WHERE user_id = ?1",
        params![user_id.0.as_str()],
    )?;
    Ok(deleted)
}

/// Counts account links for a user.
pub fn count_by_user(conn: &Connection, user_id: &UserId) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM accounts WHERE user_id = ?1",
        params![user_id.0.as_str()],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

fn row_to_account(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: AccountId::from(row.get::<_, String>(0)?),
        user_id: UserId::from(row.get::<_, String>(1)?),
        account_type: row.get(2)?,
        provider: row.get(3)?,
        provider_account_id: row.get(4)?,
        refresh_token: row.get(5)?,
        access_token: row.get(6)?,
        expires_at: row.get(7)?,
        token_type: row.get(8)?,
        scope: row.get(9)?,
        id_token: row.get(10)?,
        session_state: row.get(11)?,
    })
}
