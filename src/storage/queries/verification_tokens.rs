//! Verification token database queries.
//!
//! Tokens are one-time: [`consume`] reads and deletes in one step.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::domain::VerificationToken;
use crate::storage::Result;

/// Inserts a new token.
pub fn insert(conn: &Connection, token: &VerificationToken) -> Result<()> {
    conn.execute(
        "INSERT INTO verification_tokens (identifier, token, expires) VALUES (?1, ?2, ?3)",
        params![token.identifier, token.token, token.expires],
    )?;
    Ok(())
}

/// Gets a token by its (identifier, token) pair.
pub fn get(conn: &Connection, identifier: &str, token: &str) -> Result<Option<VerificationToken>> {
    let found = conn
        .query_row(
            "SELECT identifier, token, expires FROM verification_tokens
             WHERE identifier = ?1 AND token = ?2",
            params![identifier, token],
            row_to_token,
        )
        .optional()?;
    Ok(found)
}

/// Deletes the token and returns it, or `None` if it was not present.
///
/// Expired tokens are still returned; callers decide what expiry means.
pub fn consume(
    conn: &Connection,
    identifier: &str,
    token: &str,
) -> Result<Option<VerificationToken>> {
    let found = conn
        .query_row(
            "DELETE FROM verification_tokens WHERE identifier = ?1 AND token = ?2
             RETURNING identifier, token, expires",
            params![identifier, token],
            row_to_token,
        )
        .optional()?;
    Ok(found)
}

/// Deletes every token that expired at or before `now`.
pub fn delete_expired(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM verification_tokens WHERE expires <= ?1",
        params![now],
    )?;
    Ok(deleted)
}

fn row_to_token(row: &Row<'_>) -> rusqlite::Result<VerificationToken> {
    Ok(VerificationToken {
        identifier: row.get(0)?,
        token: row.get(1)?,
        expires: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::queries::fixtures::setup;
    use chrono::Duration;

    #[test]
    fn insert_get_and_consume() {
        let conn = setup();
        let token = VerificationToken::issue("a@example.com", Utc::now(), Duration::hours(1));
        insert(&conn, &token).unwrap();

        assert_eq!(
            get(&conn, "a@example.com", &token.token).unwrap().unwrap(),
            token
        );
        assert!(get(&conn, "b@example.com", &token.token).unwrap().is_none());

        let consumed = consume(&conn, "a@example.com", &token.token).unwrap();
        assert_eq!(consumed, Some(token.clone()));
        assert!(consume(&conn, "a@example.com", &token.token).unwrap().is_none());
    }

    #[test]
    fn token_value_is_unique() {
        let conn = setup();
        let token = VerificationToken::issue("a@example.com", Utc::now(), Duration::hours(1));
        insert(&conn, &token).unwrap();

        let mut clash = VerificationToken::issue("b@example.com", Utc::now(), Duration::hours(1));
        clash.token = token.token.clone();
        assert!(insert(&conn, &clash).unwrap_err().is_unique_violation());
    }

    #[test]
    fn delete_expired_tokens() {
        let conn = setup();
        let now = Utc::now();
        let old = VerificationToken::issue("a@example.com", now - Duration::hours(2), Duration::hours(1));
        let fresh = VerificationToken::issue("a@example.com", now, Duration::hours(1));
        insert(&conn, &old).unwrap();
        insert(&conn, &fresh).unwrap();

        assert_eq!(delete_expired(&conn, now).unwrap(), 1);
        assert!(get(&conn, "a@example.com", &fresh.token).unwrap().is_some());
    }
}
