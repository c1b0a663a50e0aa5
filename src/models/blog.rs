//! Represents a blog post.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row in the `blog` table.
///
/// Posts belong to an author (`ON DELETE CASCADE`), carry engagement
/// counters, and use the same soft-delete convention as `Author`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Blog {
    pub id: i64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Soft-delete marker; 0 means the post is active.
    pub deleted_at: i64,

    pub title: String,

    /// Full post body.
    pub content: String,

    /// View counter.
    pub views: i64,

    /// Like counter.
    pub likes: i64,

    /// Whether the post is visible to readers.
    pub published: bool,

    /// Set when `published` flips to true; null for drafts.
    pub published_at: Option<DateTime<Utc>>,

    /// Owning author; deleting the author removes their posts.
    pub author_id: i64,
}
