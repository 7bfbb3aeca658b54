//! Category database queries.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::domain::{Category, CategoryId, UserId};
use crate::storage::{DatabaseError, Result};

/// Inserts a new category.
pub fn insert(conn: &Connection, category: &Category) -> Result<()> {
    conn.execute(
        "INSERT INTO categories (id, user_id, name, description, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            category.id.0.as_str(),
            category.user_id.0.as_str(),
            category.name,
            category.description,
            category.created_at,
            category.updated_at,
        ],
    )?;
    Ok(())
}

/// Inserts several categories, failing on the first conflict.
pub fn insert_many(conn: &Connection, categories: &[Category]) -> Result<usize> {
    for category in categories {
        insert(conn, category)?;
    }
    Ok(categories.len())
}

/// Gets a category by ID.
pub fn get_by_id(conn: &Connection, id: &CategoryId) -> Result<Option<Category>> {
    let category = conn
        .query_row(
            "SELECT id, user_id, name, description, created_at, updated_at
             FROM categories WHERE id = ?1",
            params![id.0.as_str()],
            row_to_category,
        )
        .optional()?;
    Ok(category)
}

/// Gets a user's category by name.
pub fn get_by_name(conn: &Connection, user_id: &UserId, name: &str) -> Result<Option<Category>> {
    let category = conn
        .query_row(
            "SELECT id, user_id, name, description, created_at, updated_at
             FROM categories WHERE user_id = ?1 AND name = ?2",
            params![user_id.0.as_str(), name],
            row_to_category,
        )
        .optional()?;
    Ok(category)
}

/// Gets a category by ID, failing if it does not exist.
pub fn require(conn: &Connection, id: &CategoryId) -> Result<Category> {
    get_by_id(conn, id)?.ok_or_else(|| DatabaseError::not_found("category", id.as_str()))
}

/// Gets all categories for a user, ordered by name.
pub fn get_by_user(conn: &Connection, user_id: &UserId) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, name, description, created_at, updated_at
         FROM categories WHERE user_id = ?1 ORDER BY name",
    )?;

    let categories = stmt
        .query_map(params![user_id.0.as_str()], row_to_category)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(categories)
}

/// Renames a category and replaces its description.
pub fn update(
    conn: &Connection,
    id: &CategoryId,
    name: &str,
    description: Option<&str>,
) -> Result<Category> {
    let updated = conn.execute(
        "UPDATE categories SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
        params![name, description, Utc::now(), id.0.as_str()],
    )?;
    if updated == 0 {
        return Err(DatabaseError::not_found("category", id.as_str()));
    }
    require(conn, id)
}

/// Inserts the category, or updates the description of the user's category
/// with the same name. A missing description keeps the stored one.
pub fn upsert(conn: &Connection, category: &Category) -> Result<Category> {
    conn.execute(
        "INSERT INTO categories (id, user_id, name, description, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(user_id, name) DO UPDATE SET
             description = COALESCE(excluded.description, categories.description),
             updated_at = excluded.updated_at",
        params![
            category.id.0.as_str(),
            category.user_id.0.as_str(),
            category.name,
            category.description,
            category.created_at,
            category.updated_at,
        ],
    )?;

    get_by_name(conn, &category.user_id, &category.name)?
        .ok_or_else(|| DatabaseError::not_found("category", category.name.as_str()))
}

/// Deletes a category. Returns false if it did not exist.
///
/// Fails with a foreign key violation while messages still reference it.
pub fn delete(conn: &Connection, id: &CategoryId) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM categories WHERE id = ?1", params![id.0.as_str()])?;
    Ok(deleted > 0)
}

/// Counts categories across all users.
pub fn count_all(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))?;
    Ok(count as u64)
}

/// Counts categories for a user.
pub fn count_by_user(conn: &Connection, user_id: &UserId) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM categories WHERE user_id = ?1",
        params![user_id.0.as_str()],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

fn row_to_category(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: CategoryId::from(row.get::<_, String>(0)?),
        user_id: UserId::from(row.get::<_, String>(1)?),
        name: row.get(2)?,
        description: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
