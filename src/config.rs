use crate::services::remote_storage::RemoteStorageConfig;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{env, path::PathBuf, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub secure: bool,
    pub region: String,
    pub timeout_secs: u64,
    pub database_url: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Object storage and schema migrations for the blog service"
)]
pub struct Args {
    /// Object store endpoint, host:port or URL (overrides BLOG_STORE_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Access key (overrides BLOG_STORE_ACCESS_KEY)
    #[arg(long)]
    pub access_key: Option<String>,

    /// Secret key (overrides BLOG_STORE_SECRET_KEY)
    #[arg(long)]
    pub secret_key: Option<String>,

    /// Bucket holding blog media (overrides BLOG_STORE_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Plain HTTP for bare host:port endpoints (overrides BLOG_STORE_SECURE)
    #[arg(long)]
    pub insecure: bool,

    /// Region reported to the store (overrides BLOG_STORE_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Per-operation timeout in seconds (overrides BLOG_STORE_TIMEOUT_SECS)
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Database URL (overrides BLOG_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply pending schema migrations and exit
    Migrate,

    /// Roll back applied schema migrations
    Revert,

    /// Upload a local file to an object path
    Put { path: String, file: PathBuf },

    /// Download an object to stdout or a file
    Get {
        path: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Download an object in fixed-size chunks
    Stream {
        path: String,
        #[arg(long, default_value_t = 1024)]
        chunk_size: usize,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete an object
    Rm { path: String },

    /// Print a presigned GET URL for an object
    Presign {
        path: String,
        #[arg(long)]
        expires_secs: Option<u64>,
    },
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the
    /// requested command.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_endpoint =
            env::var("BLOG_STORE_ENDPOINT").unwrap_or_else(|_| "127.0.0.1:9000".into());
        let env_access = env::var("BLOG_STORE_ACCESS_KEY").unwrap_or_else(|_| "minioadmin".into());
        let env_secret = env::var("BLOG_STORE_SECRET_KEY").unwrap_or_else(|_| "minioadmin".into());
        let env_bucket = env::var("BLOG_STORE_BUCKET").unwrap_or_else(|_| "blog-media".into());
        let env_secure = match env::var("BLOG_STORE_SECURE") {
            Ok(value) => parse_bool(&value)
                .with_context(|| format!("parsing BLOG_STORE_SECURE value `{}`", value))?,
            Err(env::VarError::NotPresent) => true,
            Err(err) => return Err(err).context("reading BLOG_STORE_SECURE"),
        };
        let env_region = env::var("BLOG_STORE_REGION").unwrap_or_else(|_| "us-east-1".into());
        let env_timeout = match env::var("BLOG_STORE_TIMEOUT_SECS") {
            Ok(value) => value
                .parse::<u64>()
                .with_context(|| format!("parsing BLOG_STORE_TIMEOUT_SECS value `{}`", value))?,
            Err(env::VarError::NotPresent) => 30,
            Err(err) => return Err(err).context("reading BLOG_STORE_TIMEOUT_SECS"),
        };
        let env_db = env::var("BLOG_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/blog.db".into());

        // --- Merge ---
        let cfg = Self {
            endpoint: args.endpoint.unwrap_or(env_endpoint),
            access_key: args.access_key.unwrap_or(env_access),
            secret_key: args.secret_key.unwrap_or(env_secret),
            bucket: args.bucket.unwrap_or(env_bucket),
            secure: if args.insecure { false } else { env_secure },
            region: args.region.unwrap_or(env_region),
            timeout_secs: args.timeout_secs.unwrap_or(env_timeout),
            database_url: args.database_url.unwrap_or(env_db),
        };

        Ok((cfg, args.command))
    }

    /// Connection settings for the remote storage adapter.
    pub fn storage(&self) -> RemoteStorageConfig {
        RemoteStorageConfig {
            endpoint: self.endpoint.clone(),
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
            bucket: self.bucket.clone(),
            secure: self.secure,
            region: self.region.clone(),
            operation_timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got `{other}`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        for v in ["1", "true", "TRUE", "yes", "on"] {
            assert!(parse_bool(v).unwrap(), "{v} should be true");
        }
        for v in ["0", "false", "no", "OFF"] {
            assert!(!parse_bool(v).unwrap(), "{v} should be false");
        }
        assert!(parse_bool("maybe").is_err());
    }
}
