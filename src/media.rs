use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const VIDEO_EXTS: &[&str] = &[
    ".mp4", ".avi", ".mov", ".mkv", ".webm", ".flv", ".wmv", ".mpg", ".mpeg", ".m4v",
];

pub const IMAGE_EXTS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp", ".tiff", ".tif",
];

pub const AUDIO_EXTS: &[&str] = &[
    ".mp3", ".wav", ".flac", ".ogg", ".m4a", ".aac", ".wma", ".opus", ".aiff",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    pub fn of(path: &str) -> Option<Self> {
        let lower = path.to_ascii_lowercase();
        if IMAGE_EXTS.iter().any(|ext| lower.ends_with(ext)) {
            Some(MediaKind::Image)
        } else if VIDEO_EXTS.iter().any(|ext| lower.ends_with(ext)) {
            Some(MediaKind::Video)
        } else if AUDIO_EXTS.iter().any(|ext| lower.ends_with(ext)) {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

pub fn is_media(path: &str) -> bool {
    MediaKind::of(path).is_some()
}

pub fn is_audio(path: &str) -> bool {
    MediaKind::of(path) == Some(MediaKind::Audio)
}

pub fn is_wav(path: &str) -> bool {
    path.to_ascii_lowercase().ends_with(".wav")
}

pub fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Extension of the basename including the leading dot, or `""` when there is
/// none. A leading dot alone (".hidden") is not an extension.
pub fn extension(path: &str) -> &str {
    let name = basename(path);
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[idx..],
        _ => "",
    }
}

pub fn stem(path: &str) -> &str {
    let name = basename(path);
    let ext = extension(path);
    &name[..name.len() - ext.len()]
}

pub fn parent(path: &str) -> &str {
    let name_len = basename(path).len();
    let dir = &path[..path.len() - name_len];
    dir.strip_suffix(['/', '\\']).unwrap_or(dir)
}

pub fn replace_extension(path: &str, from: &str, to: &str) -> Option<String> {
    let ext = extension(path);
    if !ext.eq_ignore_ascii_case(from) {
        return None;
    }
    Some(format!("{}{}", &path[..path.len() - ext.len()], to))
}

/// `Song(1).mp3`, `Song (2).wav`.
pub fn has_duplicate_suffix(path: &str) -> bool {
    static DUPLICATE_RE: OnceLock<Regex> = OnceLock::new();
    let re = DUPLICATE_RE.get_or_init(|| Regex::new(r"\(\d+\)\.[^.]+$").expect("duplicate regex"));
    re.is_match(basename(path))
}

/// `"03. Midnight Drive.mp3"` -> `"Midnight Drive"`. Drops the extension and a
/// leading track-number prefix (digits followed by `.`, `-` or whitespace).
pub fn title_from_filename(path: &str) -> String {
    static EXT_RE: OnceLock<Regex> = OnceLock::new();
    static TRACK_PREFIX_RE: OnceLock<Regex> = OnceLock::new();
    let ext_re = EXT_RE.get_or_init(|| Regex::new(r"\.[^.]+$").expect("extension regex"));
    let prefix_re =
        TRACK_PREFIX_RE.get_or_init(|| Regex::new(r"^\d+[.\-\s]+").expect("track prefix regex"));

    let without_ext = ext_re.replace(basename(path), "");
    prefix_re.replace(&without_ext, "").trim().to_string()
}

pub fn sort_by_basename(paths: &mut [String]) {
    paths.sort_by(|a, b| {
        basename(a)
            .to_lowercase()
            .cmp(&basename(b).to_lowercase())
            .then_with(|| a.cmp(b))
    });
}
