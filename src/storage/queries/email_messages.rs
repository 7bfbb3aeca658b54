//! Imported email database queries.
//!
//! CRUD, filtered reads and aggregates over `email_messages`. The pair
//! (gmail_account_id, gmail_message_id) identifies a message within a
//! mailbox and guards against importing it twice.

use chrono::Utc;
use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::filter::{json_column, json_param, page_sql, parse_column, Page, SortOrder, WhereClause};
use crate::domain::{
    CategoryId, EmailImportStatus, EmailMessage, EmailMessageId, EmailMessageUpdate,
    GmailAccountId, UserId,
};
use crate::storage::{DatabaseError, Result};

const COLUMNS: &str = "id, user_id, gmail_account_id, category_id, gmail_message_id,
    gmail_thread_id, internal_date_ms, from_email, from_name, subject, snippet, body_text,
    body_html, summary, import_status, list_unsubscribe, unsubscribe_links, created_at, updated_at";

const INSERT: &str = "INSERT INTO email_messages (id, user_id, gmail_account_id, category_id,
    gmail_message_id, gmail_thread_id, internal_date_ms, from_email, from_name, subject, snippet,
    body_text, body_html, summary, import_status, list_unsubscribe, unsubscribe_links,
    created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)";

/// Criteria for filtered reads, counts, bulk updates and deletes.
#[derive(Debug, Clone, Default)]
pub struct EmailMessageFilter {
    pub user_id: Option<UserId>,
    pub gmail_account_id: Option<GmailAccountId>,
    pub category_id: Option<CategoryId>,
    pub import_status: Option<EmailImportStatus>,
    pub gmail_thread_id: Option<String>,
    pub from_email: Option<String>,
    /// Substring match on the subject.
    pub subject_contains: Option<String>,
    /// Inclusive lower bound on `internal_date_ms`.
    pub received_after_ms: Option<i64>,
    /// Exclusive upper bound on `internal_date_ms`.
    pub received_before_ms: Option<i64>,
    pub has_summary: Option<bool>,
    pub has_unsubscribe: Option<bool>,
    /// Order by `internal_date_ms`, newest first by default.
    pub order: SortOrder,
    pub page: Option<Page>,
}

impl EmailMessageFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn gmail_account(mut self, gmail_account_id: GmailAccountId) -> Self {
        self.gmail_account_id = Some(gmail_account_id);
        self
    }

    pub fn category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn status(mut self, status: EmailImportStatus) -> Self {
        self.import_status = Some(status);
        self
    }

    pub fn thread(mut self, gmail_thread_id: impl Into<String>) -> Self {
        self.gmail_thread_id = Some(gmail_thread_id.into());
        self
    }

    pub fn from_email(mut self, from_email: impl Into<String>) -> Self {
        self.from_email = Some(from_email.into());
        self
    }

    pub fn subject_contains(mut self, fragment: impl Into<String>) -> Self {
        self.subject_contains = Some(fragment.into());
        self
    }

    pub fn received_between(mut self, after_ms: Option<i64>, before_ms: Option<i64>) -> Self {
        self.received_after_ms = after_ms;
        self.received_before_ms = before_ms;
        self
    }

    pub fn has_summary(mut self, has_summary: bool) -> Self {
        self.has_summary = Some(has_summary);
        self
    }

    pub fn has_unsubscribe(mut self, has_unsubscribe: bool) -> Self {
        self.has_unsubscribe = Some(has_unsubscribe);
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
        if let Some(gmail_account_id) = &self.gmail_account_id {
            clause.eq("gmail_account_id", gmail_account_id.0.clone());
        }
        if let Some(category_id) = &self.category_id {
            clause.eq("category_id", category_id.0.clone());
        }
        if let Some(status) = self.import_status {
            clause.eq("import_status", status.as_str().to_string());
        }
        if let Some(thread_id) = &self.gmail_thread_id {
            clause.eq("gmail_thread_id", thread_id.clone());
        }
        if let Some(from_email) = &self.from_email {
            clause.eq("from_email", from_email.clone());
        }
        if let Some(fragment) = &self.subject_contains {
            clause.contains("subject", fragment);
        }
        if let Some(after) = self.received_after_ms {
            clause.push("internal_date_ms >= ?", after);
        }
        if let Some(before) = self.received_before_ms {
            clause.push("internal_date_ms < ?", before);
        }
        match self.has_summary {
            Some(true) => {
                clause.raw("summary IS NOT NULL");
            }
            Some(false) => {
                clause.raw("summary IS NULL");
            }
            None => {}
        }
        match self.has_unsubscribe {
            Some(true) => {
                clause.raw("unsubscribe_links IS NOT NULL");
            }
            Some(false) => {
                clause.raw("unsubscribe_links IS NULL");
            }
            None => {}
        }
        clause
    }
}

/// Totals over a set of messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageAggregate {
    pub count: u64,
    pub earliest_internal_date_ms: Option<i64>,
    pub latest_internal_date_ms: Option<i64>,
    /// Messages with a summary.
    pub summarized: u64,
    /// Messages with stored unsubscribe links.
    pub with_unsubscribe: u64,
}

/// Message count for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category_id: CategoryId,
    pub count: u64,
}

/// Message count for one import status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub import_status: EmailImportStatus,
    pub count: u64,
}

/// Inserts a new message.
pub fn insert(conn: &Connection, message: &EmailMessage) -> Result<()> {
    conn.execute(INSERT, params_from_iter(insert_params(message).iter()))?;
    Ok(())
}

/// Inserts several messages and returns how many rows were written.
///
/// With `skip_duplicates`, messages already imported for the same mailbox
/// are silently skipped; otherwise the first duplicate fails the call.
pub fn insert_many(
    conn: &Connection,
    messages: &[EmailMessage],
    skip_duplicates: bool,
) -> Result<usize> {
    let sql = if skip_duplicates {
        format!("{INSERT} ON CONFLICT(gmail_account_id, gmail_message_id) DO NOTHING")
    } else {
        INSERT.to_string()
    };

    let mut stmt = conn.prepare(&sql)?;
    let mut inserted = 0;
    for message in messages {
        inserted += stmt.execute(params_from_iter(insert_params(message).iter()))?;
    }
    Ok(inserted)
}

/// Gets a message by ID.
pub fn get_by_id(conn: &Connection, id: &EmailMessageId) -> Result<Option<EmailMessage>> {
    let message = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM email_messages WHERE id = ?1"),
            params![id.0.as_str()],
            row_to_message,
        )
        .optional()?;
    Ok(message)
}

/// Gets a message by its Gmail id within a mailbox.
pub fn get_by_gmail_id(
    conn: &Connection,
    gmail_account_id: &GmailAccountId,
    gmail_message_id: &str,
) -> Result<Option<EmailMessage>> {
    let message = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM email_messages
                 WHERE gmail_account_id = ?1 AND gmail_message_id = ?2"
            ),
            params![gmail_account_id.0.as_str(), gmail_message_id],
            row_to_message,
        )
        .optional()?;
    Ok(message)
}

/// Gets a message by ID, failing if it does not exist.
pub fn require(conn: &Connection, id: &EmailMessageId) -> Result<EmailMessage> {
    get_by_id(conn, id)?.ok_or_else(|| DatabaseError::not_found("email message", id.as_str()))
}

/// Lists messages matching the filter.
pub fn find_many(conn: &Connection, filter: &EmailMessageFilter) -> Result<Vec<EmailMessage>> {
    let clause = filter.where_clause();
    let sql = format!(
        "SELECT {COLUMNS} FROM email_messages{} ORDER BY internal_date_ms {}, id{}",
        clause.sql(),
        filter.order.as_sql(),
        page_sql(filter.page),
    );

    let mut stmt = conn.prepare(&sql)?;
    let messages = stmt
        .query_map(params_from_iter(clause.params()), row_to_message)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(messages)
}

/// Returns the first message matching the filter.
pub fn find_first(conn: &Connection, filter: &EmailMessageFilter) -> Result<Option<EmailMessage>> {
    let filter = filter.clone().page(Page::first(1));
    Ok(find_many(conn, &filter)?.into_iter().next())
}

/// Applies a partial update and returns the updated message.
pub fn update(
    conn: &Connection,
    id: &EmailMessageId,
    changes: &EmailMessageUpdate,
) -> Result<EmailMessage> {
    if changes.is_empty() {
        return require(conn, id);
    }

    let (assignments, mut values) = assignments(changes);
    values.push(Box::new(id.0.clone()));

    let updated = conn.execute(
        &format!(
            "UPDATE email_messages SET {} WHERE id = ?",
            assignments.join(", ")
        ),
        params_from_iter(values.iter()),
    )?;
    if updated == 0 {
        return Err(DatabaseError::not_found("email message", id.as_str()));
    }
    require(conn, id)
}

/// Applies the same partial update to every matching message. Paging is ignored.
pub fn update_many(
    conn: &Connection,
    filter: &EmailMessageFilter,
    changes: &EmailMessageUpdate,
) -> Result<usize> {
    if changes.is_empty() {
        return Ok(0);
    }

    let clause = filter.where_clause();
    let (assignments, mut values) = assignments(changes);
    for value in clause.params() {
        values.push(Box::new(value.clone()));
    }

    let updated = conn.execute(
        &format!(
            "UPDATE email_messages SET {}{}",
            assignments.join(", "),
            clause.sql()
        ),
        params_from_iter(values.iter()),
    )?;
    Ok(updated)
}

/// Inserts the message, or refreshes the content of an already imported copy.
///
/// Triage state on an existing row (category, summary, import status) is
/// kept. Stored unsubscribe links are only replaced by non-null values.
pub fn upsert(conn: &Connection, message: &EmailMessage) -> Result<EmailMessage> {
    conn.execute(
        &format!(
            "{INSERT} ON CONFLICT(gmail_account_id, gmail_message_id) DO UPDATE SET
                 gmail_thread_id = excluded.gmail_thread_id,
                 internal_date_ms = excluded.internal_date_ms,
                 from_email = excluded.from_email,
                 from_name = excluded.from_name,
                 subject = excluded.subject,
                 snippet = excluded.snippet,
                 body_text = excluded.body_text,
                 body_html = excluded.body_html,
                 list_unsubscribe = excluded.list_unsubscribe,
                 unsubscribe_links = COALESCE(excluded.unsubscribe_links, email_messages.unsubscribe_links),
                 updated_at = excluded.updated_at"
        ),
        params_from_iter(insert_params(message).iter()),
    )?;

    get_by_gmail_id(conn, &message.gmail_account_id, &message.gmail_message_id)?.ok_or_else(
        || DatabaseError::not_found("email message", message.gmail_message_id.as_str()),
    )
}

/// Deletes a message and its actions. Returns false if it did not exist.
pub fn delete(conn: &Connection, id: &EmailMessageId) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM email_messages WHERE id = ?1",
        params![id.0.as_str()],
    )?;
    Ok(deleted > 0)
}

/// Deletes every matching message. Paging is ignored.
pub fn delete_many(conn: &Connection, filter: &EmailMessageFilter) -> Result<usize> {
    let clause = filter.where_clause();
    let deleted = conn.execute(
        &format!("DELETE FROM email_messages{}", clause.sql()),
        params_from_iter(clause.params()),
    )?;
    Ok(deleted)
}

/// Counts matching messages. Paging is ignored.
pub fn count(conn: &Connection, filter: &EmailMessageFilter) -> Result<u64> {
    let clause = filter.where_clause();
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM email_messages{}", clause.sql()),
        params_from_iter(clause.params()),
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Computes totals over matching messages. Paging is ignored.
pub fn aggregate(conn: &Connection, filter: &EmailMessageFilter) -> Result<MessageAggregate> {
    let clause = filter.where_clause();
    let aggregate = conn.query_row(
        &format!(
            "SELECT COUNT(*), MIN(internal_date_ms), MAX(internal_date_ms),
                    COUNT(summary), COUNT(unsubscribe_links)
             FROM email_messages{}",
            clause.sql()
        ),
        params_from_iter(clause.params()),
        |row| {
            Ok(MessageAggregate {
                count: row.get::<_, i64>(0)? as u64,
                earliest_internal_date_ms: row.get(1)?,
                latest_internal_date_ms: row.get(2)?,
                summarized: row.get::<_, i64>(3)? as u64,
                with_unsubscribe: row.get::<_, i64>(4)? as u64,
            })
        },
    )?;
    Ok(aggregate)
}

/// Counts matching messages per category, largest first.
pub fn group_by_category(
    conn: &Connection,
    filter: &EmailMessageFilter,
) -> Result<Vec<CategoryCount>> {
    let clause = filter.where_clause();
    let mut stmt = conn.prepare(&format!(
        "SELECT category_id, COUNT(*) AS n FROM email_messages{}
         GROUP BY category_id ORDER BY n DESC, category_id",
        clause.sql()
    ))?;

    let counts = stmt
        .query_map(params_from_iter(clause.params()), |row| {
            Ok(CategoryCount {
                category_id: CategoryId::from(row.get::<_, String>(0)?),
                count: row.get::<_, i64>(1)? as u64,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(counts)
}

/// Counts matching messages per import status. Statuses with no messages
/// are omitted.
pub fn group_by_status(conn: &Connection, filter: &EmailMessageFilter) -> Result<Vec<StatusCount>> {
    let clause = filter.where_clause();
    let mut stmt = conn.prepare(&format!(
        "SELECT import_status, COUNT(*) FROM email_messages{}
         GROUP BY import_status ORDER BY import_status",
        clause.sql()
    ))?;

    let counts = stmt
        .query_map(params_from_iter(clause.params()), |row| {
            Ok(StatusCount {
                import_status: parse_column(row, 0)?,
                count: row.get::<_, i64>(1)? as u64,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(counts)
}

fn insert_params(message: &EmailMessage) -> Vec<Box<dyn ToSql>> {
    vec![
        Box::new(message.id.0.clone()),
        Box::new(message.user_id.0.clone()),
        Box::new(message.gmail_account_id.0.clone()),
        Box::new(message.category_id.0.clone()),
        Box::new(message.gmail_message_id.clone()),
        Box::new(message.gmail_thread_id.clone()),
        Box::new(message.internal_date_ms),
        Box::new(message.from_email.clone()),
        Box::new(message.from_name.clone()),
        Box::new(message.subject.clone()),
        Box::new(message.snippet.clone()),
        Box::new(message.body_text.clone()),
        Box::new(message.body_html.clone()),
        Box::new(message.summary.clone()),
        Box::new(message.import_status.as_str()),
        Box::new(message.list_unsubscribe.clone()),
        Box::new(json_param(message.unsubscribe_links.as_ref())),
        Box::new(message.created_at),
        Box::new(message.updated_at),
    ]
}

fn assignments(changes: &EmailMessageUpdate) -> (Vec<&'static str>, Vec<Box<dyn ToSql>>) {
    let mut columns = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(category_id) = &changes.category_id {
        columns.push("category_id = ?");
        values.push(Box::new(category_id.0.clone()));
    }
    if let Some(summary) = &changes.summary {
        columns.push("summary = ?");
        values.push(Box::new(summary.clone()));
    }
    if let Some(status) = changes.import_status {
        columns.push("import_status = ?");
        values.push(Box::new(status.as_str()));
    }
    if let Some(links) = &changes.unsubscribe_links {
        columns.push("unsubscribe_links = ?");
        values.push(Box::new(json_param(links.as_ref())));
    }

    columns.push("updated_at = ?");
    values.push(Box::new(Utc::now()));

    (columns, values)
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<EmailMessage> {
    Ok(EmailMessage {
        id: EmailMessageId::from(row.get::<_, String>(0)?),
        user_id: UserId::from(row.get::<_, String>(1)?),
        gmail_account_id: GmailAccountId::from(row.get::<_, String>(2)?),
        category_id: CategoryId::from(row.get::<_, String>(3)?),
        gmail_message_id: row.get(4)?,
        gmail_thread_id: row.get(5)?,
        internal_date_ms: row.get(6)?,
        from_email: row.get(7)?,
        from_name: row.get(8)?,
        subject: row.get(9)?,
        snippet: row.get(10)?,
        body_text: row.get(11)?,
        body_html: row.get(12)?,
        summary: row.get(13)?,
        import_status: parse_column(row, 14)?,
        list_unsubscribe: row.get(15)?,
        unsubscribe_links: json_column(row, 16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}
