//! Login session database queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::domain::{Session, SessionId, UserId};
use crate::storage::{DatabaseError, Result};

/// Inserts a new session.
pub fn insert(conn: &Connection, session: &Session) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (id, session_token, user_id, expires) VALUES (?1, ?2, ?3, ?4)",
        params![
            session.id.0.as_str(),
            session.session_token,
            session.user_id.0.as_str(),
            session.expires,
        ],
    )?;
    Ok(())
}

/// Gets a session by ID.
pub fn get_by_id(conn: &Connection, id: &SessionId) -> Result<Option<Session>> {
    let session = conn
        .query_row(
            "SELECT id, session_token, user_id, expires FROM sessions WHERE id = ?1",
            params![id.0.as_str()],
            row_to_session,
        )
        .optional()?;
    Ok(session)
}

/// Gets a session by its token, whether or not it has expired.
pub fn get_by_token(conn: &Connection, session_token: &str) -> Result<Option<Session>> {
    let session = conn
        .query_row(
            "SELECT id, session_token, user_id, expires FROM sessions WHERE session_token = ?1",
            params![session_token],
            row_to_session,
        )
        .optional()?;
    Ok(session)
}

/// Gets all sessions for a user, latest expiry first.
pub fn get_by_user(conn: &Connection, user_id: &UserId) -> Result<Vec<Session>> {
    let mut stmt = conn.prepare(
        "SELECT id, session_token, user_id, expires FROM sessions
         WHERE user_id = ?1 ORDER BY expires DESC",
    )?;

    let sessions = stmt
        .query_map(params![user_id.0.as_str()], row_to_session)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(sessions)
}

/// Moves a session's expiry and returns the updated session.
pub fn extend(conn: &Connection, session_token: &str, expires: DateTime<Utc>) -> Result<Session> {
    let updated = conn.execute(
        "UPDATE sessions SET expires = ?1 WHERE session_token = ?2",
        params![expires, session_token],
    )?;
    if updated == 0 {
        return Err(DatabaseError::not_found("session", session_token));
    }

    get_by_token(conn, session_token)?
        .ok_or_else(|| DatabaseError::not_found("session", session_token))
}

/// Deletes a session. Returns false if it did not exist.
pub fn delete(conn: &Connection, id: &SessionId) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id.0.as_str()])?;
    Ok(deleted > 0)
}

/// Deletes every session that expired at or before `now`.
pub fn delete_expired(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
    let deleted = conn.execute("DELETE FROM sessions WHERE expires <= ?1", params![now])?;
    Ok(deleted)
}

/// Deletes every session for a user.
pub fn delete_by_user(conn: &Connection, user_id: &UserId) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM sessions WHERE user_id = ?1",
        params![user_id.0.as_str()],
    )?;
    Ok(deleted)
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: SessionId::from(row.get::<_, String>(0)?),
        session_token: row.get(1)?,
        user_id: UserId::from(row.get::<_, String>(2)?),
        expires: row.get(3)?,
    })
}
