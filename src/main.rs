use anyhow::{Context, Result};
use blog_store::config::{AppConfig, Command};
use blog_store::migrations;
use blog_store::services::remote_storage::RemoteStorage;
use bytes::Bytes;
use futures::StreamExt;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{path::Path, path::PathBuf, str::FromStr, time::Duration};
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + command ---
    let (cfg, command) = AppConfig::from_env_and_args()?;
    tracing::debug!("resolved config: endpoint={}, bucket={}", cfg.endpoint, cfg.bucket);

    match command {
        Command::Migrate => {
            let pool = connect_db(&cfg.database_url).await?;
            let applied = migrations::apply_all(&pool).await?;
            tracing::info!("database migration complete, {} applied", applied);
        }
        Command::Revert => {
            let pool = connect_db(&cfg.database_url).await?;
            let reverted = migrations::revert_all(&pool).await?;
            tracing::info!("database rollback complete, {} reverted", reverted);
        }
        Command::Put { path, file } => {
            let storage = RemoteStorage::connect(cfg.storage()).await?;
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            storage.write(&path, Bytes::from(data)).await?;
            println!("uploaded {} to {}/{}", file.display(), storage.bucket(), path);
        }
        Command::Get { path, output } => {
            let storage = RemoteStorage::connect(cfg.storage()).await?;
            let data = storage.read(&path).await?;
            write_output(output, &data).await?;
        }
        Command::Stream {
            path,
            chunk_size,
            output,
        } => {
            let storage = RemoteStorage::connect(cfg.storage()).await?;
            let mut stream = storage.stream(&path, chunk_size).await?;
            match output {
                Some(out_path) => {
                    let mut file = tokio::fs::File::create(&out_path)
                        .await
                        .with_context(|| format!("creating {}", out_path.display()))?;
                    while let Some(chunk) = stream.next().await {
                        file.write_all(&chunk?).await?;
                    }
                    file.flush().await?;
                }
                None => {
                    let mut out = tokio::io::stdout();
                    while let Some(chunk) = stream.next().await {
                        out.write_all(&chunk?).await?;
                    }
                    out.flush().await?;
                }
            }
        }
        Command::Rm { path } => {
            let storage = RemoteStorage::connect(cfg.storage()).await?;
            storage.delete(&path).await?;
            println!("deleted {}/{}", storage.bucket(), path);
        }
        Command::Presign { path, expires_secs } => {
            let storage = RemoteStorage::connect(cfg.storage()).await?;
            let url = match expires_secs {
                Some(secs) => {
                    storage
                        .presigned_get_url_with_expiry(&path, Duration::from_secs(secs))
                        .await?
                }
                None => storage.open(&path)?.url().await?,
            };
            println!("{url}");
        }
    }

    Ok(())
}

/// Open the SQLite pool, creating the database file (and its parent
/// directory) on first use. Foreign keys are enabled per connection so the
/// schema's ON DELETE CASCADE actually cascades.
async fn connect_db(database_url: &str) -> Result<SqlitePool> {
    if let Some(db_path) = database_url
        .strip_prefix("sqlite://")
        .map(|p| p.trim_start_matches("file:"))
    {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("created missing directory {:?}", parent);
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("parsing database URL `{database_url}`"))?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

async fn write_output(output: Option<PathBuf>, data: &[u8]) -> Result<()> {
    match output {
        Some(path) => {
            tokio::fs::write(&path, data)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
        }
        None => {
            let mut out = tokio::io::stdout();
            out.write_all(data).await?;
            out.flush().await?;
        }
    }
    Ok(())
}
