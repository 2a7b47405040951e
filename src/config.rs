use std::path::PathBuf;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_DOWNLOAD_DIR: &str = "downloads";
const DEFAULT_YT_DLP_BIN: &str = "yt-dlp";
const DEFAULT_STALE_JOB_SECONDS: u64 = 2 * 60 * 60;

/// Runtime settings, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub download_dir: PathBuf,
    pub yt_dlp_bin: PathBuf,
    pub ffmpeg_location: Option<PathBuf>,
    pub yt_dlp_proxy: Option<String>,
    /// Empty means any origin may call the API.
    pub allowed_origins: Vec<String>,
    /// Leftover job directories older than this are swept; 0 disables it.
    pub stale_job_seconds: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty_var = |name: &str| {
            lookup(name).and_then(|value| non_empty(&value).map(ToString::to_string))
        };

        Self {
            bind_addr: resolve_bind_addr(&non_empty_var),
            download_dir: non_empty_var("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR)),
            yt_dlp_bin: non_empty_var("YT_DLP_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_YT_DLP_BIN)),
            ffmpeg_location: non_empty_var("FFMPEG_LOCATION").map(PathBuf::from),
            yt_dlp_proxy: non_empty_var("YT_DLP_PROXY"),
            allowed_origins: non_empty_var("ALLOWED_ORIGINS")
                .map(|value| {
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|origin| !origin.is_empty())
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            stale_job_seconds: non_empty_var("STALE_JOB_SECONDS")
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(DEFAULT_STALE_JOB_SECONDS),
        }
    }
}

fn resolve_bind_addr(var: &impl Fn(&str) -> Option<String>) -> String {
    if let Some(configured) = var("APP_ADDR") {
        return configured;
    }

    if let Some(port) = var("PORT").and_then(|value| value.parse::<u16>().ok()) {
        return format!("0.0.0.0:{port}");
    }

    DEFAULT_BIND_ADDR.to_string()
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
