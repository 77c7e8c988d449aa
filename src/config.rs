use crate::models::batch::BatchForm;
use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

/// Default endpoint the upload page talks to.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";
/// 500 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 500 * 1024 * 1024;
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 3] = [".dcm", ".nii", ".nii.gz"];
pub const DEFAULT_RESET_DELAY: Duration = Duration::from_millis(3000);

/// Settings shared by the validator, the transport and the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Base URL of the server exposing `POST /api/upload`.
    pub server_url: String,
    pub max_file_size: u64,
    /// Lower-case suffixes including the leading dot. Compound suffixes such
    /// as `.nii.gz` are matched as a whole.
    pub allowed_extensions: Vec<String>,
    /// Pause between a fully successful batch and the automatic reset.
    pub reset_delay: Duration,
    /// `None` starts every upload of a batch at once.
    pub max_concurrent_uploads: Option<usize>,
    /// `None` lets a hung request block its batch indefinitely.
    pub task_timeout: Option<Duration>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            reset_delay: DEFAULT_RESET_DELAY,
            max_concurrent_uploads: None,
            task_timeout: None,
        }
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Upload DICOM / NIfTI studies to the image viewer")]
pub struct Args {
    /// Files to upload (.dcm, .nii, .nii.gz)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Patient identifier applied to every file of the batch
    #[arg(long)]
    pub patient_id: String,

    /// Study identifier applied to every file of the batch
    #[arg(long, default_value = "")]
    pub study_id: String,

    /// Free-text description applied to every file of the batch
    #[arg(long, default_value = "")]
    pub description: String,

    /// Server base URL (overrides SCAN_UPLOAD_SERVER_URL)
    #[arg(long)]
    pub server_url: Option<String>,

    /// Maximum accepted file size in bytes (overrides SCAN_UPLOAD_MAX_FILE_SIZE)
    #[arg(long)]
    pub max_file_size: Option<u64>,

    /// Accepted suffix, repeatable (overrides SCAN_UPLOAD_ALLOWED_EXTENSIONS)
    #[arg(long = "allow-ext")]
    pub allowed_extensions: Vec<String>,

    /// Delay before the form resets after a fully successful batch
    /// (overrides SCAN_UPLOAD_RESET_DELAY_MS)
    #[arg(long)]
    pub reset_delay_ms: Option<u64>,

    /// Upper bound on simultaneous uploads (overrides SCAN_UPLOAD_MAX_CONCURRENT)
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Per-file timeout in seconds (overrides SCAN_UPLOAD_TASK_TIMEOUT_SECS)
    #[arg(long)]
    pub task_timeout_secs: Option<u64>,

    /// Print upload events as JSON lines on stdout
    #[arg(long)]
    pub json: bool,
}

/// What the binary was asked to upload, separate from how.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub files: Vec<PathBuf>,
    pub form: BatchForm,
    pub json: bool,
}

impl UploadConfig {
    /// Parse CLI args and `SCAN_UPLOAD_*` variables into a config and the
    /// requested invocation.
    pub fn from_env_and_args() -> Result<(Self, Invocation)> {
        let args = Args::parse();
        Self::resolve(args, |key| env::var(key).ok())
    }

    /// Merge order: CLI flag, then environment, then default.
    pub fn resolve(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<(Self, Invocation)> {
        let defaults = Self::default();

        let env_extensions = env("SCAN_UPLOAD_ALLOWED_EXTENSIONS")
            .map(|raw| raw.split(',').map(str::to_string).collect::<Vec<_>>());
        let allowed_extensions = if !args.allowed_extensions.is_empty() {
            args.allowed_extensions
        } else {
            env_extensions.unwrap_or(defaults.allowed_extensions)
        };
        let allowed_extensions = normalize_extensions(allowed_extensions);
        if allowed_extensions.is_empty() {
            return Err(anyhow!("at least one allowed extension is required"));
        }

        let reset_delay_ms = match args.reset_delay_ms {
            Some(ms) => Some(ms),
            None => parse_env(&env, "SCAN_UPLOAD_RESET_DELAY_MS")?,
        };
        let task_timeout_secs = match args.task_timeout_secs {
            Some(secs) => Some(secs),
            None => parse_env(&env, "SCAN_UPLOAD_TASK_TIMEOUT_SECS")?,
        };
        let max_concurrent = match args.max_concurrent {
            Some(n) => Some(n),
            None => parse_env(&env, "SCAN_UPLOAD_MAX_CONCURRENT")?,
        };
        if max_concurrent == Some(0) {
            return Err(anyhow!("max concurrent uploads must be at least 1"));
        }

        let cfg = Self {
            server_url: args
                .server_url
                .or_else(|| env("SCAN_UPLOAD_SERVER_URL"))
                .unwrap_or(defaults.server_url),
            max_file_size: match args.max_file_size {
                Some(size) => size,
                None => parse_env(&env, "SCAN_UPLOAD_MAX_FILE_SIZE")?
                    .unwrap_or(defaults.max_file_size),
            },
            allowed_extensions,
            reset_delay: reset_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.reset_delay),
            max_concurrent_uploads: max_concurrent,
            task_timeout: task_timeout_secs.map(Duration::from_secs),
        };

        let invocation = Invocation {
            files: args.files,
            form: BatchForm {
                patient_id: args.patient_id,
                study_id: args.study_id,
                description: args.description,
            },
            json: args.json,
        };

        Ok((cfg, invocation))
    }

    /// Full URL of the upload endpoint.
    pub fn upload_url(&self) -> String {
        format!("{}/api/upload", self.server_url.trim_end_matches('/'))
    }
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match env(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        None => Ok(None),
    }
}

fn normalize_extensions(raw: Vec<String>) -> Vec<String> {
    raw.into_iter()
        .map(|ext| ext.trim().to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .map(|ext| {
            if ext.starts_with('.') {
                ext
            } else {
                format!(".{}", ext)
            }
        })
        .collect()
}
