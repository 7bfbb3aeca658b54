//! Category domain types.
//!
//! Categories are user-defined buckets that imported email is sorted into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CategoryId, UserId};

/// A user-defined category. Names are unique per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Unique identifier for this category.
    pub id: CategoryId,
    /// Owner of the category.
    pub user_id: UserId,
    /// Display name.
    pub name: String,
    /// What belongs in this category, used as guidance for classification.
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    /// Creates a category with a fresh id.
    pub fn new(user_id: UserId, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: CategoryId::generate(),
            user_id,
            name: name.into(),
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
