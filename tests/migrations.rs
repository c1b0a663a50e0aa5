//! Migration tests against an in-memory SQLite database.

use blog_store::migrations;
use blog_store::models::{author::Author, blog::Blog};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

/// One connection only: each in-memory SQLite connection is its own
/// database, so a larger pool would scatter the schema.
async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap()
}

async fn table_exists(pool: &SqlitePool, name: &str) -> bool {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_one(pool)
            .await
            .unwrap();
    count > 0
}

#[tokio::test]
async fn apply_creates_all_tables_and_records_version() {
    let pool = test_pool().await;
    let applied = migrations::apply_all(&pool).await.unwrap();
    assert_eq!(applied, 1);

    for table in ["author", "blog", "aerich"] {
        assert!(table_exists(&pool, table).await, "table {table} missing");
    }

    let versions: Vec<String> = sqlx::query_scalar("SELECT version FROM aerich ORDER BY id")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(versions, vec!["0001_init".to_string()]);
}

#[tokio::test]
async fn apply_is_idempotent() {
    let pool = test_pool().await;
    assert_eq!(migrations::apply_all(&pool).await.unwrap(), 1);
    assert_eq!(migrations::apply_all(&pool).await.unwrap(), 0);

    let bookkeeping_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM aerich")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(bookkeeping_rows, 1);
}

#[tokio::test]
async fn author_and_blog_rows_use_schema_defaults() {
    let pool = test_pool().await;
    migrations::apply_all(&pool).await.unwrap();

    let author_id = sqlx::query("INSERT INTO author (name) VALUES (?)")
        .bind("ada")
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();

    let author: Author = sqlx::query_as(
        "SELECT id, created_at, updated_at, deleted_at, name FROM author WHERE id = ?",
    )
    .bind(author_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(author.name, "ada");
    assert_eq!(author.deleted_at, 0);

    let blog_id = sqlx::query("INSERT INTO blog (title, content, author_id) VALUES (?, ?, ?)")
        .bind("first post")
        .bind("hello world")
        .bind(author_id)
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();

    let blog: Blog = sqlx::query_as(
        "SELECT id, created_at, updated_at, deleted_at, title, content, views, likes, \
         published, published_at, author_id FROM blog WHERE id = ?",
    )
    .bind(blog_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(blog.title, "first post");
    assert_eq!(blog.views, 0);
    assert_eq!(blog.likes, 0);
    assert!(!blog.published);
    assert!(blog.published_at.is_none());
    assert_eq!(blog.author_id, author_id);
}

#[tokio::test]
async fn deleting_an_author_cascades_to_blogs() {
    let pool = test_pool().await;
    migrations::apply_all(&pool).await.unwrap();

    let author_id = sqlx::query("INSERT INTO author (name) VALUES ('bob')")
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();
    sqlx::query("INSERT INTO blog (title, content, author_id) VALUES ('t', 'c', ?)")
        .bind(author_id)
        .execute(&pool)
        .await
        .unwrap();

    sqlx::query("DELETE FROM author WHERE id = ?")
        .bind(author_id)
        .execute(&pool)
        .await
        .unwrap();

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blog WHERE author_id = ?")
        .bind(author_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn revert_clears_bookkeeping_and_allows_reapply() {
    let pool = test_pool().await;
    migrations::apply_all(&pool).await.unwrap();

    let reverted = migrations::revert_all(&pool).await.unwrap();
    assert_eq!(reverted, 1);

    // The reverse script is a declared no-op, so tables stay in place but
    // the version record is gone.
    assert!(table_exists(&pool, "author").await);
    let bookkeeping_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM aerich")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(bookkeeping_rows, 0);

    assert_eq!(migrations::apply_all(&pool).await.unwrap(), 1);
}
