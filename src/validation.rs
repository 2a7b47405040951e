use std::sync::LazyLock;

use regex::Regex;

const MAX_FILENAME_CHARS: usize = 200;
const FORBIDDEN_FILENAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?(www\.)?(youtube\.com|youtu\.be)/.+$")
        .expect("valid static regex")
});

/// Returns whether `url` looks like a link to a YouTube video.
///
/// The scheme and `www.` prefix are optional; the domain tokens match
/// case-sensitively and must be followed by a non-empty path.
pub fn is_valid_youtube_url(url: &str) -> bool {
    YOUTUBE_URL.is_match(url)
}

/// Strips characters that are illegal in file names on common filesystems
/// and caps the result at 200 characters.
///
/// The result may be empty; callers have to tolerate that.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|character| !FORBIDDEN_FILENAME_CHARS.contains(character))
        .take(MAX_FILENAME_CHARS)
        .collect()
}
