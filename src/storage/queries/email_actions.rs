//! Email action database queries.
//!
//! Actions start PENDING and move once to SUCCEEDED or FAILED. [`transition`]
//! enforces that with a compare-and-set on the stored status.

use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::filter::{json_column, json_param, page_sql, parse_column, Page, SortOrder, WhereClause};
use crate::domain::{
    EmailAction, EmailActionId, EmailActionStatus, EmailActionType, EmailMessageId, UserId,
};
use crate::storage::{DatabaseError, Result};

const COLUMNS: &str =
    "id, email_message_id, action_type, status, details, created_at, updated_at";

/// Criteria for filtered reads, counts and deletes.
#[derive(Debug, Clone, Default)]
pub struct EmailActionFilter {
    pub email_message_id: Option<EmailMessageId>,
    /// Actions on messages owned by this user.
    pub user_id: Option<UserId>,
    pub action_type: Option<EmailActionType>,
    pub status: Option<EmailActionStatus>,
    /// Order by creation time, newest first by default.
    pub order: SortOrder,
    pub page: Option<Page>,
}

impl EmailActionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending actions, oldest first.
    pub fn pending() -> Self {
        Self::new()
            .status(EmailActionStatus::Pending)
            .order(SortOrder::Asc)
    }

    pub fn message(mut self, email_message_id: EmailMessageId) -> Self {
        self.email_message_id = Some(email_message_id);
        self
    }

    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn action_type(mut self, action_type: EmailActionType) -> Self {
        self.action_type = Some(action_type);
        self
    }

    pub fn status(mut self, status: EmailActionStatus) -> Self {
        self.status = Some(status);
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
        if let Some(message_id) = &self.email_message_id {
            clause.eq("email_message_id", message_id.0.clone());
        }
        if let Some(user_id) = &self.user_id {
            clause.push(
                "email_message_id IN (SELECT id FROM email_messages WHERE user_id = ?)",
                user_id.0.clone(),
            );
        }
        if let Some(action_type) = self.action_type {
            clause.eq("action_type", action_type.as_str().to_string());
        }
        if let Some(status) = self.status {
            clause.eq("status", status.as_str().to_string());
        }
        clause
    }
}

/// Action count for one status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionStatusCount {
    pub status: EmailActionStatus,
    pub count: u64,
}

/// Inserts a new action.
pub fn insert(conn: &Connection, action: &EmailAction) -> Result<()> {
    conn.execute(
        "INSERT INTO email_actions (id, email_message_id, action_type, status, details,
            created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            action.id.0.as_str(),
            action.email_message_id.0.as_str(),
            action.action_type.as_str(),
            action.status.as_str(),
            json_param(action.details.as_ref()),
            action.created_at,
            action.updated_at,
        ],
    )?;
    Ok(())
}

/// Inserts several actions, failing on the first error.
pub fn insert_many(conn: &Connection, actions: &[EmailAction]) -> Result<usize> {
    for action in actions {
        insert(conn, action)?;
    }
    Ok(actions.len())
}

/// Gets an action by ID.
pub fn get_by_id(conn: &Connection, id: &EmailActionId) -> Result<Option<EmailAction>> {
    let action = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM email_actions WHERE id = ?1"),
            params![id.0.as_str()],
            row_to_action,
        )
        .optional()?;
    Ok(action)
}

/// Gets an action by ID, failing if it does not exist.
pub fn require(conn: &Connection, id: &EmailActionId) -> Result<EmailAction> {
    get_by_id(conn, id)?.ok_or_else(|| DatabaseError::not_found("email action", id.as_str()))
}

/// Lists actions matching the filter.
pub fn find_many(conn: &Connection, filter: &EmailActionFilter) -> Result<Vec<EmailAction>> {
    let clause = filter.where_clause();
    let sql = format!(
        "SELECT {COLUMNS} FROM email_actions{} ORDER BY created_at {order}, id {order}{}",
        clause.sql(),
        page_sql(filter.page),
        order = filter.order.as_sql(),
    );

    let mut stmt = conn.prepare(&sql)?;
    let actions = stmt
        .query_map(params_from_iter(clause.params()), row_to_action)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(actions)
}

/// Returns the first action matching the filter.
pub fn find_first(conn: &Connection, filter: &EmailActionFilter) -> Result<Option<EmailAction>> {
    let filter = filter.clone().page(Page::first(1));
    Ok(find_many(conn, &filter)?.into_iter().next())
}

/// Moves an action to `next`, optionally replacing its details.
///
/// Fails with [`DatabaseError::InvalidTransition`] if the stored status does
/// not allow the move, including when another writer completed it first.
pub fn transition(
    conn: &Connection,
    id: &EmailActionId,
    next: EmailActionStatus,
    details: Option<&serde_json::Value>,
) -> Result<EmailAction> {
    let current = require(conn, id)?;
    if !current.status.can_transition_to(next) {
        return Err(invalid_transition(id, current.status, next));
    }

    let updated = conn.execute(
        "UPDATE email_actions SET status = ?1, details = COALESCE(?2, details), updated_at = ?3
         WHERE id = ?4 AND status = ?5",
        params![
            next.as_str(),
            json_param(details),
            Utc::now(),
            id.0.as_str(),
            current.status.as_str(),
        ],
    )?;
    if updated == 0 {
        let stored = require(conn, id)?;
        return Err(invalid_transition(id, stored.status, next));
    }

    require(conn, id)
}

fn invalid_transition(
    id: &EmailActionId,
    from: EmailActionStatus,
    to: EmailActionStatus,
) -> DatabaseError {
    DatabaseError::InvalidTransition {
        id: id.0.clone(),
        from,
        to,
    }
}

/// Deletes an action. Returns false if it did not exist.
pub fn delete(conn: &Connection, id: &EmailActionId) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM email_actions WHERE id = ?1",
        params![id.0.as_str()],
    )?;
    Ok(deleted > 0)
}

/// Deletes every matching action. Paging is ignored.
pub fn delete_many(conn: &Connection, filter: &EmailActionFilter) -> Result<usize> {
    let clause = filter.where_clause();
    let deleted = conn.execute(
        &format!("DELETE FROM email_actions{}", clause.sql()),
        params_from_iter(clause.params()),
    )?;
    Ok(deleted)
}

/// Counts matching actions. Paging is ignored.
pub fn count(conn: &Connection, filter: &EmailActionFilter) -> Result<u64> {
    let clause = filter.where_clause();
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM email_actions{}", clause.sql()),
        params_from_iter(clause.params()),
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Counts matching actions per status. Statuses with no actions are omitted.
pub fn group_by_status(
    conn: &Connection,
    filter: &EmailActionFilter,
) -> Result<Vec<ActionStatusCount>> {
    let clause = filter.where_clause();
    let mut stmt = conn.prepare(&format!(
        "SELECT status, COUNT(*) FROM email_actions{} GROUP BY status ORDER BY status",
        clause.sql()
    ))?;

    let counts = stmt
        .query_map(params_from_iter(clause.params()), |row| {
            Ok(ActionStatusCount {
                status: parse_column(row, 0)?,
                count: row.get::<_, i64>(1)? as u64,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(counts)
}

fn row_to_action(row: &Row<'_>) -> rusqlite::Result<EmailAction> {
    Ok(EmailAction {
        id: EmailActionId::from(row.get::<_, String>(0)?),
        email_message_id: EmailMessageId::from(row.get::<_, String>(1)?),
        action_type: parse_column(row, 2)?,
        status: parse_column(row, 3)?,
        details: json_column(row, 4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
