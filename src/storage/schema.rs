//! SQL schema definitions as const strings.
//!
//! Contains the complete SQLite schema for the triage store.

use rusqlite::Connection;

use super::database::{DatabaseError, Result};

/// Version written to `PRAGMA user_version` after migrating.
pub const SCHEMA_VERSION: u32 = 1;

/// SQL to create the users table.
pub const CREATE_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    name TEXT,
    email TEXT UNIQUE,
    email_verified TEXT,
    image TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create the OAuth accounts table.
pub const CREATE_ACCOUNTS: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    account_type TEXT NOT NULL,
    provider TEXT NOT NULL,
    provider_account_id TEXT NOT NULL,
    refresh_token TEXT,
    access_token TEXT,
    expires_at INTEGER,
    token_type TEXT,
    scope TEXT,
    id_token TEXT,
    session_state TEXT,
    UNIQUE (provider, provider_account_id)
)
"#;

/// SQL to create the sessions table.
pub const CREATE_SESSIONS: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    session_token TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    expires TEXT NOT NULL
)
"#;

/// SQL to create the verification tokens table.
pub const CREATE_VERIFICATION_TOKENS: &str = r#"
CREATE TABLE IF NOT EXISTS verification_tokens (
    identifier TEXT NOT NULL,
    token TEXT NOT NULL UNIQUE,
    expires TEXT NOT NULL,
    UNIQUE (identifier, token)
)
"#;

/// SQL to create the connected Gmail mailboxes table.
pub const CREATE_GMAIL_ACCOUNTS: &str = r#"
CREATE TABLE IF NOT EXISTS gmail_accounts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    email TEXT NOT NULL,
    google_sub TEXT NOT NULL,
    refresh_token TEXT NOT NULL,
    access_token TEXT,
    token_expiry TEXT,
    last_history_id TEXT,
    last_synced_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (user_id, email),
    UNIQUE (user_id, google_sub)
)
"#;

/// SQL to create the categories table.
pub const CREATE_CATEGORIES: &str = r#"
CREATE TABLE IF NOT EXISTS categories (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (user_id, name)
)
"#;

/// SQL to create the imported messages table.
///
/// `category_id` keeps the default foreign key action so a category that is
/// still in use cannot be deleted on its own.
pub const CREATE_EMAIL_MESSAGES: &str = r#"
CREATE TABLE IF NOT EXISTS email_messages (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    gmail_account_id TEXT NOT NULL REFERENCES gmail_accounts(id) ON DELETE CASCADE,
    category_id TEXT NOT NULL REFERENCES categories(id),
    gmail_message_id TEXT NOT NULL,
    gmail_thread_id TEXT NOT NULL,
    internal_date_ms INTEGER NOT NULL,
    from_email TEXT NOT NULL,
    from_name TEXT,
    subject TEXT,
    snippet TEXT,
    body_text TEXT,
    body_html TEXT,
    summary TEXT,
    import_status TEXT NOT NULL DEFAULT 'IMPORTED'
        CHECK (import_status IN ('IMPORTED', 'ARCHIVED', 'TRASHED')),
    list_unsubscribe TEXT,
    unsubscribe_links TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (gmail_account_id, gmail_message_id)
)
"#;

/// SQL to create the email actions table.
pub const CREATE_EMAIL_ACTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS email_actions (
    id TEXT PRIMARY KEY,
    email_message_id TEXT NOT NULL REFERENCES email_messages(id) ON DELETE CASCADE,
    action_type TEXT NOT NULL
        CHECK (action_type IN ('ARCHIVE', 'TRASH', 'UNSUBSCRIBE_ATTEMPT')),
    status TEXT NOT NULL DEFAULT 'PENDING'
        CHECK (status IN ('PENDING', 'SUCCEEDED', 'FAILED')),
    details TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create indexes on foreign keys and common lookups.
pub const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_accounts_user ON accounts(user_id);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires);
CREATE INDEX IF NOT EXISTS idx_verification_tokens_expires ON verification_tokens(expires);
CREATE INDEX IF NOT EXISTS idx_gmail_accounts_user ON gmail_accounts(user_id);
CREATE INDEX IF NOT EXISTS idx_categories_user ON categories(user_id);
CREATE INDEX IF NOT EXISTS idx_email_messages_user ON email_messages(user_id);
CREATE INDEX IF NOT EXISTS idx_email_messages_category ON email_messages(category_id);
CREATE INDEX IF NOT EXISTS idx_email_messages_thread ON email_messages(gmail_thread_id);
CREATE INDEX IF NOT EXISTS idx_email_messages_date ON email_messages(internal_date_ms DESC);
CREATE INDEX IF NOT EXISTS idx_email_messages_status ON email_messages(import_status);
CREATE INDEX IF NOT EXISTS idx_email_actions_message ON email_actions(email_message_id);
CREATE INDEX IF NOT EXISTS idx_email_actions_status ON email_actions(status, created_at)
"#;

/// Returns all migration statements in dependency order.
pub fn all_migrations() -> Vec<&'static str> {
    vec![
        CREATE_USERS,
        CREATE_ACCOUNTS,
        CREATE_SESSIONS,
        CREATE_VERIFICATION_TOKENS,
        CREATE_GMAIL_ACCOUNTS,
        CREATE_CATEGORIES,
        CREATE_EMAIL_MESSAGES,
        CREATE_EMAIL_ACTIONS,
        CREATE_INDEXES,
    ]
}

/// Applies every migration and records [`SCHEMA_VERSION`].
pub fn migrate(conn: &Connection) -> Result<()> {
    let from = current_version(conn)?;
    for migration in all_migrations() {
        conn.execute_batch(migration)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
    }
    conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))?;

    if from != SCHEMA_VERSION {
        tracing::info!(from, to = SCHEMA_VERSION, "schema migrated");
    }
    Ok(())
}

/// Reads `PRAGMA user_version`.
pub fn current_version(conn: &Connection) -> Result<u32> {
    let version = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_migrations_returns_statements() {
        let migrations = all_migrations();
        assert_eq!(migrations.len(), 9);
        assert_eq!(migrations[0], CREATE_USERS);
        assert_eq!(migrations[migrations.len() - 1], CREATE_INDEXES);
    }

    #[test]
    fn create_users_is_valid_sql() {
        assert!(CREATE_USERS.contains("CREATE TABLE"));
        assert!(CREATE_USERS.contains("users"));
        assert!(CREATE_USERS.contains("id TEXT PRIMARY KEY"));
        assert!(CREATE_USERS.contains("email TEXT UNIQUE"));
    }

    #[test]
    fn compound_uniques_are_declared() {
        assert!(CREATE_ACCOUNTS.contains("UNIQUE (provider, provider_account_id)"));
        assert!(CREATE_VERIFICATION_TOKENS.contains("UNIQUE (identifier, token)"));
        assert!(CREATE_GMAIL_ACCOUNTS.contains("UNIQUE (user_id, email)"));
        assert!(CREATE_GMAIL_ACCOUNTS.contains("UNIQUE (user_id, google_sub)"));
        assert!(CREATE_CATEGORIES.contains("UNIQUE (user_id, name)"));
        assert!(CREATE_EMAIL_MESSAGES.contains("UNIQUE (gmail_account_id, gmail_message_id)"));
    }

    #[test]
    fn category_reference_does_not_cascade() {
        assert!(CREATE_EMAIL_MESSAGES.contains("category_id TEXT NOT NULL REFERENCES categories(id),"));
        assert!(CREATE_EMAIL_ACTIONS.contains("REFERENCES email_messages(id) ON DELETE CASCADE"));
    }

    #[test]
    fn indexes_use_if_not_exists() {
        for line in CREATE_INDEXES.lines().filter(|l| !l.trim().is_empty()) {
            assert!(line.contains("IF NOT EXISTS"), "{line}");
        }
    }

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(current_version(&conn).unwrap(), 0);

        migrate(&conn).unwrap();
        migrate(&conn).unwrap();

        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);
    }
}
