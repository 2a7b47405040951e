use serde::Serialize;

use crate::extractor::{RawFormat, RawVideoInfo};

const ACCEPTED_EXTENSIONS: [&str; 2] = ["mp4", "webm"];
const MIN_VIDEO_HEIGHT: u32 = 144;
const BYTES_PER_MB: f64 = 1_048_576.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoInfo {
    pub title: String,
    pub thumbnail: String,
    pub duration: u64,
    pub channel: String,
    pub view_count: u64,
    pub formats: Vec<FormatDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatDescriptor {
    pub format_id: String,
    pub quality: String,
    pub ext: String,
    pub filesize: u64,
    pub filesize_mb: f64,
    pub has_audio: bool,
    pub height: Option<u32>,
}

impl VideoInfo {
    pub fn from_raw(info: RawVideoInfo) -> Self {
        let formats = build_format_list(&info.formats);

        Self {
            title: info
                .title
                .unwrap_or_else(|| "Unknown Title".to_string()),
            thumbnail: info.thumbnail.unwrap_or_default(),
            duration: info
                .duration
                .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
                .map(|seconds| seconds.round() as u64)
                .unwrap_or_default(),
            channel: info
                .uploader
                .unwrap_or_else(|| "Unknown Channel".to_string()),
            view_count: info.view_count.unwrap_or_default(),
            formats,
        }
    }
}

/// Keeps downloadable mp4/webm renditions with a known size, labels them,
/// and orders them tallest first with audio-only entries last.
pub fn build_format_list(formats: &[RawFormat]) -> Vec<FormatDescriptor> {
    let mut descriptors: Vec<FormatDescriptor> = formats.iter().filter_map(describe).collect();
    descriptors.sort_by(|a, b| b.height.unwrap_or(0).cmp(&a.height.unwrap_or(0)));
    descriptors
}

fn describe(format: &RawFormat) -> Option<FormatDescriptor> {
    format.url.as_deref().filter(|url| !url.is_empty())?;

    let ext = format
        .ext
        .as_deref()
        .filter(|ext| ACCEPTED_EXTENSIONS.contains(ext))?;

    let filesize = format
        .filesize
        .or(format.filesize_approx)
        .filter(|size| size.is_finite() && *size >= 1.0)
        .map(|size| size.round() as u64)?;

    let (quality, with_audio, height) = if has_video(format) {
        let height = format.height.filter(|height| *height >= MIN_VIDEO_HEIGHT)?;
        (format!("{height}p"), has_audio(format), Some(height))
    } else if has_audio(format) {
        ("audio".to_string(), true, None)
    } else {
        return None;
    };

    Some(FormatDescriptor {
        format_id: format.format_id.clone(),
        quality,
        ext: ext.to_string(),
        filesize,
        filesize_mb: filesize_mb(filesize),
        has_audio: with_audio,
        height,
    })
}

fn has_video(format: &RawFormat) -> bool {
    matches!(format.vcodec.as_deref(), Some(value) if value != "none")
}

fn has_audio(format: &RawFormat) -> bool {
    matches!(format.acodec.as_deref(), Some(value) if value != "none")
}

fn filesize_mb(bytes: u64) -> f64 {
    (bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(
        format_id: &str,
        ext: &str,
        vcodec: &str,
        acodec: &str,
        height: Option<u32>,
        filesize: Option<f64>,
    ) -> RawFormat {
        RawFormat {
            format_id: format_id.to_string(),
            url: Some(format!("https://media.example/{format_id}")),
            ext: Some(ext.to_string()),
            vcodec: Some(vcodec.to_string()),
            acodec: Some(acodec.to_string()),
            height,
            filesize,
            filesize_approx: None,
        }
    }

    #[test]
    fn filters_and_orders_mixed_formats() {
        let formats = vec![
            format("22", "mp4", "vp9", "aac", Some(720), Some(1_000_000.0)),
            format("140", "mp4", "none", "aac", None, Some(50_000.0)),
            format("160", "mp4", "h264", "none", Some(100), Some(10_000.0)),
        ];

        let list = build_format_list(&formats);

        assert_eq!(list.len(), 2);
        assert_eq!(
            list[0],
            FormatDescriptor {
                format_id: "22".to_string(),
                quality: "720p".to_string(),
                ext: "mp4".to_string(),
                filesize: 1_000_000,
                filesize_mb: 0.95,
                has_audio: true,
                height: Some(720),
            }
        );
        assert_eq!(
            list[1],
            FormatDescriptor {
                format_id: "140".to_string(),
                quality: "audio".to_string(),
                ext: "mp4".to_string(),
                filesize: 50_000,
                filesize_mb: 0.05,
                has_audio: true,
                height: None,
            }
        );
    }

    #[test]
    fn drops_entries_without_url_size_or_accepted_extension() {
        let mut no_url = format("18", "mp4", "avc1", "mp4a", Some(360), Some(5_000.0));
        no_url.url = None;
        let formats = vec![
            no_url,
            format("251", "m4a", "none", "opus", None, Some(5_000.0)),
            format("137", "mp4", "avc1", "none", Some(1080), None),
            format("136", "mp4", "avc1", "none", Some(720), Some(0.0)),
            format("sb0", "mhtml", "none", "none", None, Some(1.0)),
            format("x", "webm", "none", "none", None, Some(1.0)),
        ];

        assert!(build_format_list(&formats).is_empty());
    }

    #[test]
    fn approximate_size_is_accepted() {
        let mut entry = format("248", "webm", "vp9", "none", Some(1080), None);
        entry.filesize_approx = Some(2_097_152.0);

        let list = build_format_list(&[entry]);

        assert_eq!(list.len(), 1);
        assert_eq!(list[0].filesize, 2_097_152);
        assert_eq!(list[0].filesize_mb, 2.0);
        assert!(!list[0].has_audio);
        assert_eq!(list[0].quality, "1080p");
    }

    #[test]
    fn video_without_height_is_dropped() {
        let entry = format("x", "mp4", "avc1", "mp4a", None, Some(10_000.0));
        assert!(build_format_list(&[entry]).is_empty());
    }

    #[test]
    fn taller_renditions_come_first() {
        let formats = vec![
            format("140", "mp4", "none", "aac", None, Some(1_000.0)),
            format("18", "mp4", "avc1", "mp4a", Some(360), Some(1_000.0)),
            format("137", "mp4", "avc1", "none", Some(1080), Some(1_000.0)),
            format("22", "mp4", "avc1", "mp4a", Some(720), Some(1_000.0)),
        ];

        let ids: Vec<_> = build_format_list(&formats)
            .into_iter()
            .map(|entry| entry.format_id)
            .collect();
        assert_eq!(ids, vec!["137", "22", "18", "140"]);
    }

    #[test]
    fn video_info_fills_defaults() {
        let info = VideoInfo::from_raw(RawVideoInfo {
            duration: Some(212.6),
            ..RawVideoInfo::default()
        });

        assert_eq!(info.title, "Unknown Title");
        assert_eq!(info.thumbnail, "");
        assert_eq!(info.channel, "Unknown Channel");
        assert_eq!(info.duration, 213);
        assert_eq!(info.view_count, 0);
        assert!(info.formats.is_empty());
    }

    #[test]
    fn audio_descriptor_serializes_null_height() {
        let descriptor = FormatDescriptor {
            format_id: "140".to_string(),
            quality: "audio".to_string(),
            ext: "mp4".to_string(),
            filesize: 50_000,
            filesize_mb: 0.05,
            has_audio: true,
            height: None,
        };

        let value = serde_json::to_value(&descriptor).unwrap();
        assert!(value["height"].is_null());
        assert_eq!(value["filesize_mb"], 0.05);
    }
}
