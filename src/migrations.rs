//! Forward-only schema migrations for the blog database.
//!
//! Each migration carries its DDL as literal SQL text; the forward script
//! creates the `author` and `blog` tables plus the `aerich` bookkeeping
//! table, the reverse script is a declared no-op. Applied versions are
//! recorded in `aerich` so re-running is idempotent.

use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// One schema migration: a version label, the owning app, and literal
/// forward/reverse SQL.
pub struct Migration {
    pub version: &'static str,
    pub app: &'static str,
    upgrade: &'static str,
    downgrade: &'static str,
}

impl Migration {
    /// DDL text executed when the migration is applied forward.
    pub fn upgrade_sql(&self) -> &'static str {
        self.upgrade
    }

    /// DDL text for rollback. Empty for migrations that declare no reverse.
    pub fn downgrade_sql(&self) -> &'static str {
        self.downgrade
    }
}

/// All known migrations, oldest first.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: "0001_init",
    app: "models",
    upgrade: include_str!("../migrations/0001_init.sql"),
    downgrade: "",
}];

/// Apply every pending migration in order. Returns how many ran.
pub async fn apply_all(pool: &SqlitePool) -> Result<usize, sqlx::Error> {
    let mut applied = 0;
    for migration in MIGRATIONS {
        if is_applied(pool, migration).await? {
            debug!(version = migration.version, "migration already applied");
            continue;
        }
        apply_migration(pool, migration).await?;
        applied += 1;
    }
    Ok(applied)
}

/// Run one migration's statements and its bookkeeping insert in a single
/// transaction, so a failing statement leaves neither partial DDL nor a
/// missing version record behind.
async fn apply_migration(pool: &SqlitePool, migration: &Migration) -> Result<(), sqlx::Error> {
    let stmts = statements(migration.upgrade_sql());
    info!(
        version = migration.version,
        statements = stmts.len(),
        "applying migration"
    );
    let mut tx = pool.begin().await?;
    for stmt in stmts {
        debug!("executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(&mut *tx).await?;
    }
    let content = json!({ "applied_at": Utc::now().to_rfc3339() });
    sqlx::query("INSERT INTO aerich (version, app, content) VALUES (?, ?, ?)")
        .bind(migration.version)
        .bind(migration.app)
        .bind(content.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Roll back every applied migration, newest first, executing each reverse
/// script and clearing its bookkeeping row. Migrations with an empty
/// reverse script only lose their record.
pub async fn revert_all(pool: &SqlitePool) -> Result<usize, sqlx::Error> {
    let mut reverted = 0;
    for migration in MIGRATIONS.iter().rev() {
        if !is_applied(pool, migration).await? {
            continue;
        }
        let mut tx = pool.begin().await?;
        for stmt in statements(migration.downgrade_sql()) {
            debug!("executing rollback SQL: {}", stmt);
            sqlx::query(stmt).execute(&mut *tx).await?;
        }
        sqlx::query("DELETE FROM aerich WHERE version = ? AND app = ?")
            .bind(migration.version)
            .bind(migration.app)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(version = migration.version, "reverted migration");
        reverted += 1;
    }
    Ok(reverted)
}

/// The initial migration creates the bookkeeping table itself, so a missing
/// `aerich` table simply means nothing has been applied yet.
async fn is_applied(pool: &SqlitePool, migration: &Migration) -> Result<bool, sqlx::Error> {
    let has_table: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'aerich'",
    )
    .fetch_one(pool)
    .await?;
    if has_table == 0 {
        return Ok(false);
    }
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM aerich WHERE version = ? AND app = ?")
        .bind(migration.version)
        .bind(migration.app)
        .fetch_one(pool)
        .await?;
    Ok(rows > 0)
}

fn statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_migration_creates_expected_tables() {
        let sql = MIGRATIONS[0].upgrade_sql();
        for table in ["\"author\"", "\"blog\"", "\"aerich\""] {
            assert!(
                sql.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")),
                "missing table {table}"
            );
        }
        assert!(sql.contains("ON DELETE CASCADE"));
        assert!(sql.contains("\"idx_author_deleted_at\""));
        assert!(sql.contains("\"idx_blog_deleted_at\""));
    }

    #[test]
    fn init_migration_has_empty_reverse() {
        assert!(MIGRATIONS[0].downgrade_sql().is_empty());
        assert!(statements(MIGRATIONS[0].downgrade_sql()).is_empty());
    }

    #[test]
    fn statement_splitting_skips_blanks() {
        let stmts = statements("CREATE TABLE a (x);\n\nCREATE TABLE b (y);\n");
        assert_eq!(stmts.len(), 2);
        assert!(stmts.iter().all(|s| s.starts_with("CREATE TABLE")));
    }

    #[tokio::test]
    async fn failed_migration_rolls_back_ddl_and_bookkeeping() {
        use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
        use std::str::FromStr;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(
                SqliteConnectOptions::from_str("sqlite::memory:")
                    .unwrap()
                    .foreign_keys(true),
            )
            .await
            .unwrap();
        apply_all(&pool).await.unwrap();

        // Second statement fails: `extra` already exists and this form has
        // no IF NOT EXISTS guard.
        let broken = Migration {
            version: "0002_broken",
            app: "models",
            upgrade: "CREATE TABLE extra (x INTEGER); CREATE TABLE extra (x INTEGER);",
            downgrade: "",
        };
        assert!(apply_migration(&pool, &broken).await.is_err());

        let extra_tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'extra'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(extra_tables, 0, "partial DDL should be rolled back");

        let recorded: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM aerich WHERE version = '0002_broken'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(recorded, 0);
    }
}
