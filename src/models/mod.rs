//! Schema-shaped records for the blog database.
//!
//! These mirror the tables created by the initial migration. They map to
//! rows via `sqlx::FromRow` and serialize as JSON via `serde`; no runtime
//! entity behavior lives here.

pub mod author;
pub mod blog;
