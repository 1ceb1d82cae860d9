use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub log_level: String,
    /// Limit on receiving one object upload.
    pub body_timeout: Duration,
    /// Limit on draining in-flight requests after a shutdown signal.
    pub shutdown_timeout: Duration,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "S3-compatible object storage on a local directory")]
pub struct Args {
    /// Host to bind to (overrides S3FS_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides S3FS_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Root directory for buckets (overrides S3FS_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Log level: trace, debug, info, warn, error (overrides S3FS_LOG_LEVEL).
    /// RUST_LOG takes precedence when set.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Seconds allowed for receiving an object body (overrides S3FS_BODY_TIMEOUT_SECS)
    #[arg(long)]
    pub body_timeout_secs: Option<u64>,

    /// Seconds to wait for in-flight requests on shutdown (overrides S3FS_SHUTDOWN_TIMEOUT_SECS)
    #[arg(long)]
    pub shutdown_timeout_secs: Option<u64>,
}

impl AppConfig {
    /// Parse CLI args, then fall back to environment variables and defaults.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse(), |name| env::var(name))
    }

    /// Merge parsed arguments with a variable lookup.
    pub fn merge<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        // --- Environment fallback ---
        let env_host = lookup("S3FS_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_var(&lookup, "S3FS_PORT", 8080u16)?;
        let env_storage = lookup("S3FS_STORAGE_DIR").unwrap_or_else(|_| ".s3data".into());
        let env_log_level = lookup("S3FS_LOG_LEVEL").unwrap_or_else(|_| "info".into());
        let env_body_timeout = parse_var(&lookup, "S3FS_BODY_TIMEOUT_SECS", 30u64)?;
        let env_shutdown_timeout = parse_var(&lookup, "S3FS_SHUTDOWN_TIMEOUT_SECS", 30u64)?;

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            log_level: args.log_level.unwrap_or(env_log_level),
            body_timeout: Duration::from_secs(args.body_timeout_secs.unwrap_or(env_body_timeout)),
            shutdown_timeout: Duration::from_secs(
                args.shutdown_timeout_secs.unwrap_or(env_shutdown_timeout),
            ),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read and parse an optional variable, using `default` when it is unset.
fn parse_var<T, F>(lookup: &F, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Result<String, env::VarError>,
{
    match lookup(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
