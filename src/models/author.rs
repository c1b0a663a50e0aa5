//! Represents a blog author.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row in the `author` table.
///
/// Authors are soft-deleted: `deleted_at` holds 0 while the row is live and
/// a timestamp once it is retired. The column is indexed so live-row
/// filtering stays cheap.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Author {
    pub id: i64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Soft-delete marker; 0 means the author is active.
    pub deleted_at: i64,

    /// Display name.
    pub name: String,
}
