//! User database queries.
//!
//! CRUD operations for users, including the email-keyed upsert used when an
//! OAuth sign-in arrives.

use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::filter::{page_sql, Page, SortOrder, WhereClause};
use crate::domain::{User, UserId, UserUpdate};
use crate::storage::{DatabaseError, Result};

const COLUMNS: &str = "id, name, email, email_verified, image, created_at, updated_at";

/// Criteria for [`find_many`], [`find_first`], [`count`] and [`delete_many`].
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub email: Option<String>,
    /// Substring match on the display name.
    pub name_contains: Option<String>,
    pub verified: Option<bool>,
    /// Order by creation time.
    pub order: SortOrder,
    pub page: Option<Page>,
}

impl UserFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn name_contains(mut self, fragment: impl Into<String>) -> Self {
        self.name_contains = Some(fragment.into());
        self
    }

    pub fn verified(mut self, verified: bool) -> Self {
        self.verified = Some(verified);
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
        if let Some(email) = &self.email {
            clause.eq("email", email.clone());
        }
        if let Some(fragment) = &self.name_contains {
            clause.contains("name", fragment);
        }
        match self.verified {
            Some(true) => {
                clause.raw("email_verified IS NOT NULL");
            }
            Some(false) => {
                clause.raw("email_verified IS NULL");
            }
            None => {}
        }
        clause
    }
}

/// Inserts a new user.
pub fn insert(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, name, email, email_verified, image, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user.id.0.as_str(),
            user.name,
            user.email,
            user.email_verified,
            user.image,
            user.created_at,
            user.updated_at,
        ],
    )?;
    Ok(())
}

/// Inserts several users, failing on the first conflict.
pub fn insert_many(conn: &Connection, users: &[User]) -> Result<usize> {
    for user in users {
        insert(conn, user)?;
    }
    Ok(users.len())
}

/// Gets a user by ID.
pub fn get_by_id(conn: &Connection, id: &UserId) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM users WHERE id = ?1"),
            params![id.0.as_str()],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

/// Gets a user by email address.
pub fn get_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM users WHERE email = ?1"),
            params![email],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

/// Gets a user by ID, failing if it does not exist.
pub fn require(conn: &Connection, id: &UserId) -> Result<User> {
    get_by_id(conn, id)?.ok_or_else(|| DatabaseError::not_found("user", id.as_str()))
}

/// Lists users matching the filter.
pub fn find_many(conn: &Connection, filter: &UserFilter) -> Result<Vec<User>> {
    let clause = filter.where_clause();
    let sql = format!(
        "SELECT {COLUMNS} FROM users{} ORDER BY created_at {}, id{}",
        clause.sql(),
        filter.order.as_sql(),
        page_sql(filter.page),
    );

    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map(params_from_iter(clause.params()), row_to_user)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(users)
}

/// Returns the first user matching the filter.
pub fn find_first(conn: &Connection, filter: &UserFilter) -> Result<Option<User>> {
    let filter = filter.clone().page(Page::first(1));
    Ok(find_many(conn, &filter)?.into_iter().next())
}

/// Applies a partial update and returns the updated user.
pub fn update(conn: &Connection, id: &UserId, changes: &UserUpdate) -> Result<User> {
    let mut user = require(conn, id)?;
    if changes.is_empty() {
        return Ok(user);
    }

    if let Some(name) = &changes.name {
        user.name = name.clone();
    }
    if let Some(email) = &changes.email {
        user.email = email.clone();
    }
    if let Some(verified) = changes.email_verified {
        user.email_verified = verified;
    }
    if let Some(image) = &changes.image {
        user.image = image.clone();
    }
    user.updated_at = Utc::now();

    conn.execute(
        "UPDATE users SET name = ?1, email = ?2, email_verified = ?3, image = ?4, updated_at = ?5
         WHERE id = ?6",
        params![
            user.name,
            user.email,
            user.email_verified,
            user.image,
            user.updated_at,
            user.id.0.as_str(),
        ],
    )?;
    Ok(user)
}

/// Inserts the user, or refreshes the profile of the user with the same email.
///
/// Fields missing from `user` keep their stored values. Returns the stored row.
pub fn upsert_by_email(conn: &Connection, user: &User) -> Result<User> {
    conn.execute(
        "INSERT INTO users (id, name, email, email_verified, image, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(email) DO UPDATE SET
             name = COALESCE(excluded.name, users.name),
             email_verified = COALESCE(excluded.email_verified, users.email_verified),
             image = COALESCE(excluded.image, users.image),
             updated_at = excluded.updated_at",
        params![
            user.id.0.as_str(),
            user.name,
            user.email,
            user.email_verified,
            user.image,
            user.created_at,
            user.updated_at,
        ],
    )?;

    let stored = match &user.email {
        Some(email) => get_by_email(conn, email)?,
        None => get_by_id(conn, &user.id)?,
    };
    stored.ok_or_else(|| DatabaseError::not_found("user", user.id.as_str()))
}

/// Deletes a user and everything it owns. Returns false if it did not exist.
pub fn delete(conn: &Connection, id: &UserId) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM users WHERE id = ?1", params![id.0.as_str()])?;
    Ok(deleted > 0)
}

/// Deletes users matching the filter. Paging is ignored.
pub fn delete_many(conn: &Connection, filter: &UserFilter) -> Result<usize> {
    let clause = filter.where_clause();
    let deleted = conn.execute(
        &format!("DELETE FROM users{}", clause.sql()),
        params_from_iter(clause.params()),
    )?;
    Ok(deleted)
}

/// Counts users matching the filter. Paging is ignored.
pub fn count(conn: &Connection, filter: &UserFilter) -> Result<u64> {
    let clause = filter.where_clause();
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM users{}", clause.sql()),
        params_from_iter(clause.params()),
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId::from(row.get::<_, String>(0)?),
        name: row.get(1)?,
        email: row.get(2)?,
        email_verified: row.get(3)?,
        image: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Account, NewUser, Session};
    use crate::storage::queries::fixtures::{seed_mailbox, seed_message, setup};
    use crate::storage::queries::{
        accounts, categories, email_messages, gmail_accounts, sessions, EmailMessageFilter,
    };

    fn make_user(email: &str) -> User {
        NewUser::with_email(email).name("Test User").into_user(Utc::now())
    }

    #[test]
    fn insert_and_get_user() {
        let conn = setup();
        let user = make_user("alice@example.com");
        insert(&conn, &user).unwrap();

        let by_id = get_by_id(&conn, &user.id).unwrap().unwrap();
        assert_eq!(by_id, user);

        let by_email = get_by_email(&conn, "alice@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let conn = setup();
        insert(&conn, &make_user("dup@example.com")).unwrap();

        let err = insert(&conn, &make_user("dup@example.com")).unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn users_without_email_do_not_conflict() {
        let conn = setup();
        let a = NewUser::default().into_user(Utc::now());
        let b = NewUser::default().into_user(Utc::now());
        assert_eq!(insert_many(&conn, &[a, b]).unwrap(), 2);
        assert_eq!(count(&conn, &UserFilter::new()).unwrap(), 2);
    }

    #[test]
    fn require_missing_user_is_not_found() {
        let conn = setup();
        let err = require(&conn, &UserId::from("nope")).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "user not found: nope");
    }

    #[test]
    fn update_sets_and_clears_fields() {
        let conn = setup();
        let user = make_user("bob@example.com");
        insert(&conn, &user).unwrap();

        let verified_at = Utc::now();
        let changes = UserUpdate::new()
            .name(None)
            .image(Some("https://example.com/bob.png".to_string()))
            .email_verified(Some(verified_at));
        let updated = update(&conn, &user.id, &changes).unwrap();

        assert!(updated.name.is_none());
        assert_eq!(updated.email_verified, Some(verified_at));

        let stored = require(&conn, &user.id).unwrap();
        assert_eq!(stored, updated);
    }

    #[test]
    fn upsert_by_email_keeps_id_and_fills_gaps() {
        let conn = setup();
        let original = make_user("carol@example.com");
        insert(&conn, &original).unwrap();

        let incoming = NewUser::with_email("carol@example.com")
            .image("https://example.com/carol.png")
            .into_user(Utc::now());
        let stored = upsert_by_email(&conn, &incoming).unwrap();

        assert_eq!(stored.id, original.id);
        assert_eq!(stored.name.as_deref(), Some("Test User"));
        assert_eq!(stored.image.as_deref(), Some("https://example.com/carol.png"));
        assert_eq!(count(&conn, &UserFilter::new()).unwrap(), 1);
    }

    #[test]
    fn filters_and_paging() {
        let conn = setup();
        insert(&conn, &make_user("a@example.com")).unwrap();
        insert(
            &conn,
            &NewUser::with_email("b@example.com")
                .name("Verified Person")
                .verified_at(Utc::now())
                .into_user(Utc::now()),
        )
        .unwrap();

        let verified = find_many(&conn, &UserFilter::new().verified(true)).unwrap();
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].email.as_deref(), Some("b@example.com"));

        let by_name = find_first(&conn, &UserFilter::new().name_contains("Person")).unwrap();
        assert!(by_name.is_some());

        insert(
            &conn,
            &NewUser::with_email("c@example.com").name("Pct_Owner").into_user(Utc::now()),
        )
        .unwrap();
        assert_eq!(count(&conn, &UserFilter::new().name_contains("t_O")).unwrap(), 1);
        assert_eq!(count(&conn, &UserFilter::new().name_contains("r_o")).unwrap(), 0);
        assert_eq!(count(&conn, &UserFilter::new().name_contains("%")).unwrap(), 0);

        let page = find_many(&conn, &UserFilter::new().page(Page::first(1))).unwrap();
        assert_eq!(page.len(), 1);

        assert_eq!(count(&conn, &UserFilter::new().verified(false)).unwrap(), 2);
    }

    #[test]
    fn delete_and_delete_many() {
        let conn = setup();
        let user = make_user("gone@example.com");
        insert(&conn, &user).unwrap();
        insert(&conn, &make_user("other@example.com")).unwrap();

        assert!(delete(&conn, &user.id).unwrap());
        assert!(!delete(&conn, &user.id).unwrap());

        assert_eq!(delete_many(&conn, &UserFilter::new()).unwrap(), 1);
        assert_eq!(count(&conn, &UserFilter::new()).unwrap(), 0);
    }

    #[test]
    fn delete_cascades_to_owned_records() {
        let conn = setup();
        let mb = seed_mailbox(&conn, "owner@example.com");
        seed_message(&conn, &mb.gmail, &mb.category, "m1");
        accounts::insert(&conn, &Account::oauth(mb.user.id.clone(), "google", "sub-1")).unwrap();
        sessions::insert(
            &conn,
            &Session::issue(mb.user.id.clone(), Utc::now(), chrono::Duration::days(1)),
        )
        .unwrap();

        let user_id = mb.user.id.clone();
        let messages = EmailMessageFilter::new().user(user_id.clone());
        assert_eq!(accounts::count_by_user(&conn, &user_id).unwrap(), 1);
        assert_eq!(email_messages::count(&conn, &messages).unwrap(), 1);

        assert!(delete(&conn, &user_id).unwrap());

        assert_eq!(accounts::count_by_user(&conn, &user_id).unwrap(), 0);
        assert!(sessions::get_by_user(&conn, &user_id).unwrap().is_empty());
        assert_eq!(gmail_accounts::count_by_user(&conn, &user_id).unwrap(), 0);
        assert_eq!(categories::count_by_user(&conn, &user_id).unwrap(), 0);
        assert_eq!(email_messages::count(&conn, &messages).unwrap(), 0);
    }
}
