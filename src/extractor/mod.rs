//! Seam between the HTTP layer and the media extraction tool.
//!
//! Handlers only see [`MediaExtractor`]; the production implementation shells
//! out to yt-dlp, tests swap in a fake that writes files directly.

mod ytdlp;

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ExtractorError;

pub use ytdlp::YtDlp;

/// What a download call should produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadTarget {
    /// Best available audio, transcoded to a 192 kbps MP3.
    Audio,
    /// The given rendition (or the best one when absent), muxed with audio
    /// when needed and delivered in an MP4 container.
    Video { format_id: Option<String> },
}

/// Video metadata as reported by the extraction tool.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawVideoInfo {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub view_count: Option<u64>,
    pub ext: Option<String>,
    /// Final path on disk, only present after a download.
    pub filepath: Option<String>,
    #[serde(default)]
    pub formats: Vec<RawFormat>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFormat {
    pub format_id: String,
    pub url: Option<String>,
    pub ext: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub height: Option<u32>,
    pub filesize: Option<f64>,
    pub filesize_approx: Option<f64>,
}

#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Resolves metadata and the list of renditions without downloading.
    async fn fetch_info(&self, url: &str) -> Result<RawVideoInfo, ExtractorError>;

    /// Downloads `target` into `output_dir` and returns the metadata of what
    /// was produced. Blocks until fetching and post-processing are finished.
    async fn download(
        &self,
        url: &str,
        target: &DownloadTarget,
        output_dir: &Path,
    ) -> Result<RawVideoInfo, ExtractorError>;
}
