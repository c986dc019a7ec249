use crate::services::{
    filter::normalize_prefix, s3_storage::S3Settings, transcoder::EncodeOptions,
};
use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, path::PathBuf, str::FromStr, time::Duration};

const DEFAULT_CONCURRENCY: usize = 5;
const DEFAULT_PAGE_SIZE: usize = 1000;

/// Which storage client the run talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// AWS S3 or an S3-compatible endpoint.
    S3,
    /// Bucket laid out on local disk.
    Local,
}

/// Deadlines for each kind of remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub head: Duration,
    pub get: Duration,
    pub put: Duration,
    pub list: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            head: Duration::from_millis(8_000),
            get: Duration::from_millis(15_000),
            put: Duration::from_millis(15_000),
            list: Duration::from_millis(10_000),
        }
    }
}

/// Immutable settings of one batch run. Prefixes are already normalized.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub concurrency: usize,
    pub include_prefix: Option<String>,
    pub exclude_prefixes: Vec<String>,
    pub dry_run: bool,
    pub timeouts: Timeouts,
    pub page_size: usize,
    pub encode: EncodeOptions,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            include_prefix: None,
            exclude_prefixes: Vec::new(),
            dry_run: false,
            timeouts: Timeouts::default(),
            page_size: DEFAULT_PAGE_SIZE,
            encode: EncodeOptions::default(),
        }
    }
}

impl RunConfig {
    /// Build a run configuration, normalizing prefixes and falling back to the
    /// default concurrency when a non-positive value is given.
    pub fn new(
        concurrency: usize,
        include_prefix: Option<&str>,
        exclude_prefixes: &[String],
        dry_run: bool,
    ) -> Self {
        Self {
            concurrency: if concurrency == 0 {
                DEFAULT_CONCURRENCY
            } else {
                concurrency
            },
            include_prefix: include_prefix
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(normalize_prefix),
            exclude_prefixes: exclude_prefixes
                .iter()
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .map(normalize_prefix)
                .collect(),
            dry_run,
            ..Self::default()
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bucket: String,
    pub backend: Backend,
    pub s3: S3Settings,
    pub storage_dir: PathBuf,
    pub failed_keys_file: PathBuf,
    pub run: RunConfig,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Convert every image in a bucket to WebP, skipping those already converted"
)]
pub struct Args {
    /// Bucket to convert (overrides WEBP_BATCH_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Storage backend (overrides WEBP_BATCH_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// S3-compatible endpoint instead of AWS (overrides WEBP_BATCH_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// S3 region (overrides WEBP_BATCH_REGION, then the AWS provider chain)
    #[arg(long)]
    pub region: Option<String>,

    /// Path-style bucket addressing; on by default with a custom endpoint
    /// (overrides WEBP_BATCH_FORCE_PATH_STYLE)
    #[arg(long)]
    pub force_path_style: Option<bool>,

    /// Root directory for the local backend (overrides WEBP_BATCH_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Maximum number of conversions in flight (overrides WEBP_BATCH_CONCURRENCY)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Only convert keys under this prefix
    #[arg(long)]
    pub include: Option<String>,

    /// Comma-separated prefixes to leave alone
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Log what would be converted without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Existence-check timeout in milliseconds (overrides WEBP_BATCH_HEAD_TIMEOUT_MS)
    #[arg(long)]
    pub head_timeout_ms: Option<u64>,

    /// Fetch timeout in milliseconds (overrides WEBP_BATCH_GET_TIMEOUT_MS)
    #[arg(long)]
    pub get_timeout_ms: Option<u64>,

    /// Store timeout in milliseconds (overrides WEBP_BATCH_PUT_TIMEOUT_MS)
    #[arg(long)]
    pub put_timeout_ms: Option<u64>,

    /// Listing page timeout in milliseconds (overrides WEBP_BATCH_LIST_TIMEOUT_MS)
    #[arg(long)]
    pub list_timeout_ms: Option<u64>,

    /// Keys requested per listing page (1-1000)
    #[arg(long)]
    pub page_size: Option<usize>,

    /// WebP quality (0-100)
    #[arg(long)]
    pub quality: Option<u8>,

    /// WebP encoder effort (0-6)
    #[arg(long)]
    pub effort: Option<u8>,

    /// Where failed keys are written (overrides WEBP_BATCH_FAILED_KEYS_FILE)
    #[arg(long)]
    pub failed_keys_file: Option<PathBuf>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let bucket = match args.bucket.or_else(|| env::var("WEBP_BATCH_BUCKET").ok()) {
            Some(bucket) if !bucket.trim().is_empty() => bucket.trim().to_string(),
            _ => bail!("a bucket is required (--bucket or WEBP_BATCH_BUCKET)"),
        };
        let backend = match args.backend {
            Some(backend) => backend,
            None => match env::var("WEBP_BATCH_BACKEND") {
                Ok(value) => <Backend as ValueEnum>::from_str(&value, true)
                    .map_err(|e| anyhow::anyhow!(e))
                    .with_context(|| format!("parsing WEBP_BATCH_BACKEND value `{}`", value))?,
                Err(_) => Backend::S3,
            },
        };
        let endpoint_url = args
            .endpoint
            .or_else(|| env::var("WEBP_BATCH_ENDPOINT").ok())
            .filter(|url| !url.trim().is_empty());
        let region = args
            .region
            .or_else(|| env::var("WEBP_BATCH_REGION").ok())
            .filter(|region| !region.trim().is_empty());
        let force_path_style = match args.force_path_style {
            Some(value) => value,
            None => env_or("WEBP_BATCH_FORCE_PATH_STYLE", endpoint_url.is_some())?,
        };
        let storage_dir = args.storage_dir.unwrap_or_else(|| {
            env::var("WEBP_BATCH_STORAGE_DIR")
                .unwrap_or_else(|_| "./data/objects".into())
                .into()
        });
        let failed_keys_file = args.failed_keys_file.unwrap_or_else(|| {
            env::var("WEBP_BATCH_FAILED_KEYS_FILE")
                .unwrap_or_else(|_| "failed-keys.txt".into())
                .into()
        });
        let concurrency = match args.concurrency {
            Some(value) => value,
            None => env_or("WEBP_BATCH_CONCURRENCY", DEFAULT_CONCURRENCY)?,
        };

        // --- Merge ---
        let defaults = Timeouts::default();
        let timeouts = Timeouts {
            head: millis(args.head_timeout_ms, "WEBP_BATCH_HEAD_TIMEOUT_MS", defaults.head)?,
            get: millis(args.get_timeout_ms, "WEBP_BATCH_GET_TIMEOUT_MS", defaults.get)?,
            put: millis(args.put_timeout_ms, "WEBP_BATCH_PUT_TIMEOUT_MS", defaults.put)?,
            list: millis(args.list_timeout_ms, "WEBP_BATCH_LIST_TIMEOUT_MS", defaults.list)?,
        };

        let mut run = RunConfig::new(
            concurrency,
            args.include.as_deref(),
            &args.exclude,
            args.dry_run,
        );
        run.timeouts = timeouts;
        run.page_size = args.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 1000);
        if let Some(quality) = args.quality {
            run.encode.quality = quality.min(100);
        }
        if let Some(effort) = args.effort {
            run.encode.effort = effort.min(6);
        }

        Ok(Self {
            bucket,
            backend,
            s3: S3Settings {
                endpoint_url,
                region,
                force_path_style,
            },
            storage_dir,
            failed_keys_file,
            run,
        })
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn millis(arg: Option<u64>, env_name: &str, default: Duration) -> Result<Duration> {
    match arg {
        Some(ms) => Ok(Duration::from_millis(ms)),
        None => Ok(Duration::from_millis(env_or(
            env_name,
            default.as_millis() as u64,
        )?)),
    }
}
