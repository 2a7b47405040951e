//! Bookkeeping for the transient files the extraction tool leaves behind.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    pin::Pin,
    task::{Context, Poll},
    time::{Duration, SystemTime},
};

use futures_util::Stream;
use tracing::{debug, warn};
use uuid::Uuid;

const PARTIAL_SUFFIX: &str = ".part";
const UNDERSCORE_ARTIFACTS: [&str; 2] = [".mp4_", ".webm_"];

/// Finds the file the extraction tool produced for `base` + `ext` inside `dir`.
///
/// The tool picks the final name itself, so the directory is scanned for
/// names starting with `base` and ending with `ext`, skipping partial files.
/// The shortest match wins. When only `<name><ext>_` leftovers exist, the
/// shortest of those is used instead. Returns `None` when neither a match nor
/// the exact `base + ext` path exists.
pub async fn locate_output(dir: &Path, base: &str, ext: &str) -> std::io::Result<Option<PathBuf>> {
    let artifact_ext = format!("{ext}_");
    let mut matches = Vec::new();
    let mut artifacts = Vec::new();

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.starts_with(base) || name.ends_with(PARTIAL_SUFFIX) {
            continue;
        }

        if name.ends_with(&artifact_ext) {
            artifacts.push(name);
        } else if name.ends_with(ext) {
            matches.push(name);
        }
    }

    debug!(
        "Output scan in {:?}: {} match(es), {} artifact(s)",
        dir,
        matches.len(),
        artifacts.len()
    );

    if let Some(name) = shortest(matches).or_else(|| shortest(artifacts)) {
        return Ok(Some(dir.join(name)));
    }

    let predicted = dir.join(format!("{base}{ext}"));
    if tokio::fs::try_exists(&predicted).await? {
        Ok(Some(predicted))
    } else {
        Ok(None)
    }
}

/// Accepts the path the extraction tool reported only if it is an existing
/// file inside `job_dir`.
pub async fn reported_output(job_dir: &Path, reported: &str) -> std::io::Result<Option<PathBuf>> {
    let candidate = PathBuf::from(reported);
    let metadata = match tokio::fs::metadata(&candidate).await {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error),
    };
    if !metadata.is_file() {
        return Ok(None);
    }

    let canonical_dir = tokio::fs::canonicalize(job_dir).await?;
    let canonical_candidate = tokio::fs::canonicalize(&candidate).await?;
    if !canonical_candidate.starts_with(&canonical_dir) {
        warn!(
            "Ignoring reported output outside the job directory: {:?}",
            canonical_candidate
        );
        return Ok(None);
    }

    Ok(Some(canonical_candidate))
}

fn shortest(mut names: Vec<String>) -> Option<String> {
    names.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    names.into_iter().next()
}

/// Renames `name.mp4_` / `name.webm_` in place to drop the trailing
/// underscore. Other paths are returned unchanged.
pub async fn normalize_artifact_name(path: PathBuf) -> std::io::Result<PathBuf> {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return Ok(path);
    };
    if !UNDERSCORE_ARTIFACTS
        .iter()
        .any(|suffix| name.ends_with(suffix))
    {
        return Ok(path);
    }

    let fixed = path.with_file_name(&name[..name.len() - 1]);
    tokio::fs::rename(&path, &fixed).await?;
    debug!("Renamed {:?} to {:?}", path, fixed);
    Ok(fixed)
}

/// Owns one served file and its job directory; both are removed on drop.
#[derive(Debug)]
pub struct TransientFile {
    path: PathBuf,
    job_dir: PathBuf,
}

impl TransientFile {
    pub fn new(path: PathBuf, job_dir: PathBuf) -> Self {
        Self { path, job_dir }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        let path = std::mem::take(&mut self.path);
        let job_dir = std::mem::take(&mut self.job_dir);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_transient(&path, &job_dir));
            }
            Err(_) => remove_transient(&path, &job_dir),
        }
    }
}

fn remove_transient(path: &Path, job_dir: &Path) {
    if let Err(error) = std::fs::remove_file(path)
        && error.kind() != ErrorKind::NotFound
    {
        warn!("Could not remove served file {:?}: {error}", path);
    }

    if let Err(error) = std::fs::remove_dir_all(job_dir)
        && error.kind() != ErrorKind::NotFound
    {
        warn!("Could not remove job directory {:?}: {error}", job_dir);
    }

    debug!("Cleaned up {:?}", path);
}

/// Wraps a body stream so the [`TransientFile`] lives exactly as long as the
/// transfer, whether it completes, fails, or the client goes away.
pub struct CleanupStream<S> {
    inner: S,
    _file: TransientFile,
}

impl<S> CleanupStream<S> {
    pub fn new(inner: S, file: TransientFile) -> Self {
        Self { inner, _file: file }
    }
}

impl<S> Stream for CleanupStream<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Removes job directories (UUID-named) under `download_dir` older than
/// `older_than_secs`. Anything else in the directory is left alone.
pub async fn cleanup_stale_jobs(download_dir: &Path, older_than_secs: u64) {
    if older_than_secs == 0 {
        return;
    }

    let mut entries = match tokio::fs::read_dir(download_dir).await {
        Ok(entries) => entries,
        Err(error) => {
            if error.kind() != ErrorKind::NotFound {
                warn!("Could not open {:?} for cleanup: {error}", download_dir);
            }
            return;
        }
    };

    let max_age = Duration::from_secs(older_than_secs);
    let now = SystemTime::now();

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(error) => {
                warn!("Could not iterate {:?} for cleanup: {error}", download_dir);
                break;
            }
        };

        let path = entry.path();
        let is_job_dir = entry
            .file_name()
            .to_str()
            .is_some_and(|name| Uuid::parse_str(name).is_ok());
        if !is_job_dir {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!("Could not read metadata of {:?}: {error}", path);
                continue;
            }
        };
        if !metadata.is_dir() {
            continue;
        }

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }

        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => debug!("Removed stale job directory {:?}", path),
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => warn!("Could not remove stale job directory {:?}: {error}", path),
        }
    }
}

pub fn content_type_for_filename(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "opus" => "audio/ogg",
        _ => "application/octet-stream",
    }
}

pub fn build_content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_filename(filename),
        urlencoding::encode(filename)
    )
}

fn ascii_filename(value: &str) -> String {
    let replaced: String = value
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric()
                || matches!(character, '.' | '-' | '_' | ' ' | '(' | ')' | '\'' | ',')
            {
                character
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = replaced.trim();
    if trimmed.is_empty() {
        "download".to_string()
    } else {
        trimmed.to_string()
    }
}
