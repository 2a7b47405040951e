use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{DownloadTarget, MediaExtractor, RawVideoInfo};
use crate::{config::Config, error::ExtractorError};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const YOUTUBE_EXTRACTOR_ARGS: &str = "youtube:player_client=web,ios,android,mweb;player_skip=webpage";
const AUDIO_EXTRACTOR_ARGS: &str = "youtube:player_client=ios,android;player_skip=configs";
const AUDIO_BITRATE: &str = "192K";
const FALLBACK_VIDEO_SELECTOR: &str = "bestvideo+bestaudio/best";

/// Runs the yt-dlp executable, one blocking process per call.
#[derive(Debug, Clone)]
pub struct YtDlp {
    bin: PathBuf,
    ffmpeg_location: Option<PathBuf>,
    proxy: Option<String>,
}

impl YtDlp {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bin: config.yt_dlp_bin.clone(),
            ffmpeg_location: config.ffmpeg_location.clone(),
            proxy: config.yt_dlp_proxy.clone(),
        }
    }

    fn common_args(&self, extractor_args: &str) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--no-check-certificates".to_string(),
            "--user-agent".to_string(),
            BROWSER_USER_AGENT.to_string(),
            "--extractor-args".to_string(),
            extractor_args.to_string(),
        ];

        if let Some(location) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(location.to_string_lossy().into_owned());
        }
        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        args
    }

    fn info_args(&self, url: &str) -> Vec<String> {
        let mut args = self.common_args(YOUTUBE_EXTRACTOR_ARGS);
        args.extend(["-J".to_string(), "-f".to_string(), "all".to_string()]);
        args.push(url.to_string());
        args
    }

    fn download_args(&self, url: &str, target: &DownloadTarget, output_dir: &Path) -> Vec<String> {
        let output_template = output_dir.join("%(title)s.%(ext)s");
        let extractor_args = match target {
            DownloadTarget::Audio => AUDIO_EXTRACTOR_ARGS,
            DownloadTarget::Video { .. } => YOUTUBE_EXTRACTOR_ARGS,
        };

        let mut args = self.common_args(extractor_args);
        args.extend([
            "--print".to_string(),
            "after_move:%()j".to_string(),
            "-o".to_string(),
            output_template.to_string_lossy().into_owned(),
        ]);

        match target {
            DownloadTarget::Audio => {
                args.extend([
                    "-f".to_string(),
                    "bestaudio/best".to_string(),
                    "-x".to_string(),
                    "--audio-format".to_string(),
                    "mp3".to_string(),
                    "--audio-quality".to_string(),
                    AUDIO_BITRATE.to_string(),
                ]);
            }
            DownloadTarget::Video { format_id } => {
                args.extend([
                    "-f".to_string(),
                    video_selector(format_id.as_deref()),
                    "--merge-output-format".to_string(),
                    "mp4".to_string(),
                    "--remux-video".to_string(),
                    "mp4".to_string(),
                ]);
            }
        }

        args.push(url.to_string());
        args
    }

    async fn run(&self, args: Vec<String>) -> Result<Vec<u8>, ExtractorError> {
        debug!("Running {:?} {:?}", self.bin, args);

        let output = Command::new(&self.bin)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    ExtractorError::NotInstalled
                } else {
                    ExtractorError::Spawn(error)
                }
            })?;

        if !output.status.success() {
            let message = run_error_message(&output.stderr);
            warn!("yt-dlp exited with {}: {message}", output.status);
            return Err(ExtractorError::Failed(message));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl MediaExtractor for YtDlp {
    async fn fetch_info(&self, url: &str) -> Result<RawVideoInfo, ExtractorError> {
        let stdout = self.run(self.info_args(url)).await?;
        parse_info(&stdout)
    }

    async fn download(
        &self,
        url: &str,
        target: &DownloadTarget,
        output_dir: &Path,
    ) -> Result<RawVideoInfo, ExtractorError> {
        let stdout = self.run(self.download_args(url, target, output_dir)).await?;
        parse_info(&stdout)
    }
}

/// Picks the client's rendition and only pulls in a separate audio track when
/// that rendition has none of its own.
fn video_selector(format_id: Option<&str>) -> String {
    match format_id.map(str::trim).filter(|value| !value.is_empty()) {
        Some(format_id) => format!("{format_id}[acodec=none]+bestaudio/{format_id}"),
        None => FALLBACK_VIDEO_SELECTOR.to_string(),
    }
}

/// yt-dlp prints one JSON document per line; the last one describes the
/// requested video after post-processing.
fn parse_info(stdout: &[u8]) -> Result<RawVideoInfo, ExtractorError> {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .ok_or(ExtractorError::EmptyOutput)?;

    Ok(serde_json::from_str(line)?)
}

fn run_error_message(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp could not complete the operation")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ytdlp() -> YtDlp {
        YtDlp {
            bin: PathBuf::from("yt-dlp"),
            ffmpeg_location: None,
            proxy: None,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|arg| arg == flag)
            .and_then(|index| args.get(index + 1))
            .map(String::as_str)
    }

    #[test]
    fn info_args_skip_download_and_request_all_formats() {
        let args = ytdlp().info_args("https://youtu.be/abc");

        assert!(args.contains(&"-J".to_string()));
        assert_eq!(value_after(&args, "-f"), Some("all"));
        assert_eq!(value_after(&args, "--user-agent"), Some(BROWSER_USER_AGENT));
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/abc"));
    }

    #[test]
    fn audio_download_transcodes_to_mp3() {
        let args = ytdlp().download_args(
            "https://youtu.be/abc",
            &DownloadTarget::Audio,
            Path::new("/tmp/job"),
        );

        assert_eq!(value_after(&args, "-f"), Some("bestaudio/best"));
        assert!(args.contains(&"-x".to_string()));
        assert_eq!(value_after(&args, "--audio-format"), Some("mp3"));
        assert_eq!(value_after(&args, "--audio-quality"), Some("192K"));
        assert_eq!(
            value_after(&args, "-o"),
            Some("/tmp/job/%(title)s.%(ext)s")
        );
        assert_eq!(value_after(&args, "--print"), Some("after_move:%()j"));
        assert_eq!(
            value_after(&args, "--extractor-args"),
            Some("youtube:player_client=ios,android;player_skip=configs")
        );
    }

    #[test]
    fn video_download_muxes_into_mp4() {
        let args = ytdlp().download_args(
            "https://youtu.be/abc",
            &DownloadTarget::Video {
                format_id: Some("137".to_string()),
            },
            Path::new("/tmp/job"),
        );

        assert_eq!(
            value_after(&args, "-f"),
            Some("137[acodec=none]+bestaudio/137")
        );
        assert_eq!(value_after(&args, "--merge-output-format"), Some("mp4"));
        assert_eq!(value_after(&args, "--remux-video"), Some("mp4"));
        assert_eq!(
            value_after(&args, "--extractor-args"),
            Some(YOUTUBE_EXTRACTOR_ARGS)
        );
    }

    #[test]
    fn blank_format_id_falls_back_to_best() {
        assert_eq!(video_selector(None), FALLBACK_VIDEO_SELECTOR);
        assert_eq!(video_selector(Some("  ")), FALLBACK_VIDEO_SELECTOR);
    }

    #[test]
    fn optional_flags_are_forwarded() {
        let extractor = YtDlp {
            bin: PathBuf::from("/opt/bin/yt-dlp"),
            ffmpeg_location: Some(PathBuf::from("/opt/ffmpeg")),
            proxy: Some("socks5://127.0.0.1:1080".to_string()),
        };
        let args = extractor.info_args("https://youtu.be/abc");

        assert_eq!(value_after(&args, "--ffmpeg-location"), Some("/opt/ffmpeg"));
        assert_eq!(
            value_after(&args, "--proxy"),
            Some("socks5://127.0.0.1:1080")
        );
    }

    #[test]
    fn parse_info_reads_last_json_line() {
        let stdout = b"\n{\"title\": \"First\"}\n{\"title\": \"My Title\", \"ext\": \"mp4\"}\n\n";
        let info = parse_info(stdout).unwrap();
        assert_eq!(info.title.as_deref(), Some("My Title"));
        assert_eq!(info.ext.as_deref(), Some("mp4"));
    }

    #[test]
    fn parse_info_rejects_empty_output() {
        assert!(matches!(parse_info(b"  \n"), Err(ExtractorError::EmptyOutput)));
        assert!(matches!(parse_info(b"not json"), Err(ExtractorError::Parse(_))));
    }

    #[test]
    fn error_message_uses_last_stderr_line() {
        let stderr = b"[youtube] abc: Downloading webpage\nERROR: [youtube] abc: Video unavailable\n";
        assert_eq!(
            run_error_message(stderr),
            "ERROR: [youtube] abc: Video unavailable"
        );
        assert_eq!(
            run_error_message(b""),
            "yt-dlp could not complete the operation"
        );
    }
}
