use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, fmt::Display, str::FromStr, time::Duration};

/// Where blobs are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    Local,
    S3,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            other => bail!("unknown storage backend `{}` (expected local or s3)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Origin clients reach this service at; local locators are built on it.
    pub public_base_url: String,
    pub storage_backend: StorageBackend,
    pub storage_dir: String,
    pub s3_bucket: Option<String>,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub s3_prefix: Option<String>,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
    pub s3_force_path_style: bool,
    pub signing_secret: String,
    pub max_sessions: usize,
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
    pub url_cache_duration: Duration,
    pub default_url_ttl: Duration,
    pub max_chunk_len: usize,
    pub max_body_bytes: usize,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("public_base_url", &self.public_base_url)
            .field("storage_backend", &self.storage_backend)
            .field("storage_dir", &self.storage_dir)
            .field("s3_bucket", &self.s3_bucket)
            .field("s3_region", &self.s3_region)
            .field("s3_endpoint", &self.s3_endpoint)
            .field("s3_prefix", &self.s3_prefix)
            .field("max_sessions", &self.max_sessions)
            .field("session_ttl", &self.session_ttl)
            .field("sweep_interval", &self.sweep_interval)
            .field("url_cache_duration", &self.url_cache_duration)
            .field("default_url_ttl", &self.default_url_ttl)
            .finish_non_exhaustive()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Media library upload and deletion service")]
pub struct Args {
    /// Host to bind to (overrides MEDIA_LIBRARY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides MEDIA_LIBRARY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides MEDIA_LIBRARY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public base URL (overrides MEDIA_LIBRARY_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Storage backend (overrides MEDIA_LIBRARY_STORAGE_BACKEND)
    #[arg(long, value_enum)]
    pub storage_backend: Option<StorageBackend>,

    /// Directory where blobs are stored by the local backend
    /// (overrides MEDIA_LIBRARY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// S3 bucket (overrides MEDIA_LIBRARY_S3_BUCKET)
    #[arg(long)]
    pub s3_bucket: Option<String>,

    /// S3 endpoint for S3-compatible services (overrides MEDIA_LIBRARY_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn env_secs(name: &str, default_secs: u64) -> Result<Duration> {
    env_parse(name, default_secs).map(Duration::from_secs)
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env_opt("MEDIA_LIBRARY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = env_parse("MEDIA_LIBRARY_PORT", 3000u16)?;
        let env_db = env_opt("MEDIA_LIBRARY_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/meta/media_library.db".into());
        let env_backend = env_parse("MEDIA_LIBRARY_STORAGE_BACKEND", StorageBackend::Local)?;
        let env_storage =
            env_opt("MEDIA_LIBRARY_STORAGE_DIR").unwrap_or_else(|| "./data/media".into());

        let host = args.host.unwrap_or(env_host);
        let port = args.port.unwrap_or(env_port);
        let public_base_url = args
            .public_base_url
            .or_else(|| env_opt("MEDIA_LIBRARY_PUBLIC_BASE_URL"))
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", port));

        // --- Merge ---
        let cfg = Self {
            host,
            port,
            database_url: args.database_url.unwrap_or(env_db),
            public_base_url,
            storage_backend: args.storage_backend.unwrap_or(env_backend),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            s3_bucket: args.s3_bucket.or_else(|| env_opt("MEDIA_LIBRARY_S3_BUCKET")),
            s3_region: env_opt("MEDIA_LIBRARY_S3_REGION").unwrap_or_else(|| "us-east-1".into()),
            s3_endpoint: args.s3_endpoint.or_else(|| env_opt("MEDIA_LIBRARY_S3_ENDPOINT")),
            s3_prefix: env_opt("MEDIA_LIBRARY_S3_PREFIX"),
            s3_access_key_id: env_opt("MEDIA_LIBRARY_S3_ACCESS_KEY_ID"),
            s3_secret_access_key: env_opt("MEDIA_LIBRARY_S3_SECRET_ACCESS_KEY"),
            s3_force_path_style: env_parse("MEDIA_LIBRARY_S3_FORCE_PATH_STYLE", false)?,
            signing_secret: env_opt("MEDIA_LIBRARY_SIGNING_SECRET").unwrap_or_default(),
            max_sessions: env_parse("MEDIA_LIBRARY_MAX_SESSIONS", 100usize)?,
            session_ttl: env_secs("MEDIA_LIBRARY_SESSION_TTL_SECS", 30 * 60)?,
            sweep_interval: env_secs("MEDIA_LIBRARY_SWEEP_INTERVAL_SECS", 60)?,
            url_cache_duration: env_secs("MEDIA_LIBRARY_URL_CACHE_SECS", 50 * 60)?,
            default_url_ttl: env_secs("MEDIA_LIBRARY_URL_TTL_SECS", 60 * 60)?,
            max_chunk_len: env_parse("MEDIA_LIBRARY_MAX_CHUNK_LEN", 2 * 1024 * 1024usize)?,
            max_body_bytes: env_parse("MEDIA_LIBRARY_MAX_BODY_BYTES", 512 * 1024 * 1024usize)?,
        };
        cfg.validate()?;

        Ok((cfg, args.migrate))
    }

    /// Reject combinations that would fail later at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.storage_backend == StorageBackend::S3 && self.s3_bucket.is_none() {
            bail!("MEDIA_LIBRARY_S3_BUCKET is required for the s3 backend");
        }
        if self.s3_access_key_id.is_some() != self.s3_secret_access_key.is_some() {
            bail!("S3 access key id and secret access key must be set together");
        }
        if self.storage_backend == StorageBackend::Local && self.signing_secret.is_empty() {
            bail!("MEDIA_LIBRARY_SIGNING_SECRET is required for the local backend");
        }
        if self.url_cache_duration >= self.default_url_ttl {
            bail!(
                "URL cache duration ({}s) must be shorter than the default URL TTL ({}s)",
                self.url_cache_duration.as_secs(),
                self.default_url_ttl.as_secs()
            );
        }
        if self.max_sessions == 0 {
            bail!("MEDIA_LIBRARY_MAX_SESSIONS must be at least 1");
        }
        if self.sweep_interval.is_zero() {
            bail!("MEDIA_LIBRARY_SWEEP_INTERVAL_SECS must be at least 1");
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
