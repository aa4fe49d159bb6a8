use crate::cache::Artwork;
use crate::cmd;
use crate::media::{self, MediaKind};
use crate::paths::AppPaths;
use crate::{EngineError, Result};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

const THUMB_SCALE_PAD: &str =
    "scale=160:90:force_original_aspect_ratio=decrease,pad=160:90:(ow-iw)/2:(oh-ih)/2";
const WAVEFORM_FILTER: &str = "aformat=channel_layouts=mono,showwavespic=s=160x90:colors=#00d4ff";

/// libmp3lame VBR level. Lower is better quality and larger output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mp3Quality {
    V0,
    #[default]
    V2,
    V4,
}

impl Mp3Quality {
    pub fn level(self) -> u8 {
        match self {
            Mp3Quality::V0 => 0,
            Mp3Quality::V2 => 2,
            Mp3Quality::V4 => 4,
        }
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Mp3Quality::V0),
            2 => Some(Mp3Quality::V2),
            4 => Some(Mp3Quality::V4),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mp3Conversion {
    pub mp3_path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaProbe {
    pub duration_ms: Option<i64>,
    pub audio_bitrate_bps: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub fps: Option<f64>,
}

/// Renders a small raster preview of a media file.
pub trait PreviewGenerator {
    fn thumbnail(&self, path: &Path, kind: MediaKind) -> Result<Artwork>;
}

pub trait MediaProber {
    fn probe(&self, path: &Path) -> Result<MediaProbe>;
}

pub trait Transcoder {
    /// Writes a sibling `.mp3` next to `path` and returns where it landed.
    fn wav_to_mp3(&self, path: &Path, quality: Mp3Quality) -> Result<Mp3Conversion>;
}

/// Shells out to the resolved `ffmpeg`/`ffprobe` commands.
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    paths: AppPaths,
}

impl FfmpegTools {
    pub fn new(paths: AppPaths) -> Self {
        Self { paths }
    }
}

pub fn thumbnail_args(kind: MediaKind, input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-nostdin".into(), "-y".into()];
    if kind == MediaKind::Video {
        args.push("-ss".into());
        args.push("1".into());
    }
    args.push("-i".into());
    args.push(input.as_os_str().to_os_string());
    let filters: &[&str] = match kind {
        MediaKind::Audio => &["-filter_complex", WAVEFORM_FILTER, "-vframes", "1"],
        MediaKind::Video => &["-vframes", "1", "-vf", THUMB_SCALE_PAD],
        MediaKind::Image => &["-vf", THUMB_SCALE_PAD],
    };
    args.extend(filters.iter().map(OsString::from));
    args.push(output.as_os_str().to_os_string());
    args
}

pub fn wav_to_mp3_args(input: &Path, output: &Path, quality: Mp3Quality) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-nostdin".into(), "-i".into()];
    args.push(input.as_os_str().to_os_string());
    let level = quality.level().to_string();
    for part in [
        "-q:a",
        level.as_str(),
        "-ar",
        "44100",
        "-joint_stereo",
        "1",
        "-codec:a",
        "libmp3lame",
        "-y",
    ] {
        args.push(part.into());
    }
    args.push(output.as_os_str().to_os_string());
    args
}

/// Sibling `.mp3` path for a `.wav` input, `None` for anything else.
pub fn mp3_path_for(wav: &Path) -> Option<PathBuf> {
    media::replace_extension(&wav.to_string_lossy(), ".wav", ".mp3").map(PathBuf::from)
}

impl PreviewGenerator for FfmpegTools {
    fn thumbnail(&self, path: &Path, kind: MediaKind) -> Result<Artwork> {
        let output = self.paths.thumbnail_path_for(path);
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut command = cmd::command(self.paths.ffmpeg_cmd());
        command.args(thumbnail_args(kind, path, &output));
        cmd::run_checked("ffmpeg", &mut command)?;

        let data = std::fs::read(&output)?;
        if data.is_empty() {
            return Err(EngineError::ExternalToolFailed {
                tool: "ffmpeg".to_string(),
                code: None,
                stderr: "empty thumbnail".to_string(),
            });
        }
        Ok(Artwork::new("image/jpeg", data))
    }
}

impl MediaProber for FfmpegTools {
    fn probe(&self, path: &Path) -> Result<MediaProbe> {
        let mut command = cmd::command(self.paths.ffprobe_cmd());
        command
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path);
        let output = cmd::run_checked("ffprobe", &mut command)?;
        parse_probe(&output.stdout)
    }
}

impl Transcoder for FfmpegTools {
    fn wav_to_mp3(&self, path: &Path, quality: Mp3Quality) -> Result<Mp3Conversion> {
        let mp3_path = mp3_path_for(path).ok_or_else(|| EngineError::UnsupportedMedia {
            path: path.to_path_buf(),
        })?;
        let mut command = cmd::command(self.paths.ffmpeg_cmd());
        command.args(wav_to_mp3_args(path, &mp3_path, quality));
        cmd::run_checked("ffmpeg", &mut command)?;

        let size_bytes = std::fs::metadata(&mp3_path)?.len();
        Ok(Mp3Conversion {
            mp3_path,
            size_bytes,
        })
    }
}

pub fn parse_probe(stdout: &[u8]) -> Result<MediaProbe> {
    let parsed: FfprobeOutput = serde_json::from_slice(stdout)?;
    let streams = parsed.streams.unwrap_or_default();
    let audio = streams
        .iter()
        .find(|st| st.codec_type.as_deref() == Some("audio"));
    let video = streams
        .iter()
        .find(|st| st.codec_type.as_deref() == Some("video"));

    Ok(MediaProbe {
        duration_ms: parsed
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(parse_seconds_to_ms),
        audio_bitrate_bps: audio
            .and_then(|st| st.bit_rate.as_deref())
            .and_then(|b| b.trim().parse().ok()),
        width: video.and_then(|st| st.width),
        height: video.and_then(|st| st.height),
        fps: video
            .and_then(|st| st.r_frame_rate.as_deref())
            .and_then(parse_frame_rate),
    })
}

#[derive(Debug, Clone, Deserialize)]
struct FfprobeOutput {
    streams: Option<Vec<FfprobeStream>>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Clone, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    bit_rate: Option<String>,
    width: Option<i64>,
    height: Option<i64>,
    r_frame_rate: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

fn parse_seconds_to_ms(value: &str) -> Option<i64> {
    let seconds: f64 = value.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some((seconds * 1000.0).round() as i64)
}

/// `"30000/1001"` -> 29.97.
fn parse_frame_rate(value: &str) -> Option<f64> {
    let (num, den) = value.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 {
        return None;
    }
    let fps = num / den;
    fps.is_finite().then_some(fps)
}

/// `mm:ss`, minutes allowed past 99.
pub fn format_time(duration_ms: i64) -> String {
    let secs = duration_ms.max(0) / 1000;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn format_size_mb(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
}

/// Duration straight from the RIFF header, for when ffprobe is unavailable.
pub fn wav_duration_ms(path: &Path) -> Option<i64> {
    let reader = hound::WavReader::open(path).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return None;
    }
    let frames = reader.duration() as i64;
    Some(frames * 1000 / i64::from(spec.sample_rate))
}

/// One-line summary shown under the player.
pub fn describe(prober: &dyn MediaProber, path: &Path) -> String {
    let text = path.to_string_lossy();
    let name = media::basename(&text).to_string();
    let Ok(meta) = std::fs::metadata(path) else {
        return name;
    };
    let size = format_size_mb(meta.len());

    let kind = MediaKind::of(&text);
    if kind == Some(MediaKind::Image) {
        return format!("{name} | {size}");
    }

    let probe = match prober.probe(path) {
        Ok(probe) => probe,
        Err(_) if media::is_wav(&text) => match wav_duration_ms(path) {
            Some(ms) => return format!("{name} | {} | {size}", format_time(ms)),
            None => return format!("{name} | {size}"),
        },
        Err(_) => return format!("{name} | {size}"),
    };
    let duration = probe
        .duration_ms
        .map(format_time)
        .unwrap_or_else(|| "00:00".to_string());

    match kind {
        Some(MediaKind::Video) => {
            let fps = probe.fps.map(|f| f.round() as i64).unwrap_or(0);
            format!(
                "{name} | {duration} | {}×{} | {fps} fps | {size}",
                probe.width.unwrap_or(0),
                probe.height.unwrap_or(0)
            )
        }
        _ => match probe.audio_bitrate_bps {
            Some(bps) => format!(
                "{name} | {duration} | {} kbps | {size}",
                (bps as f64 / 1000.0).round() as i64
            ),
            None => format!("{name} | {duration} | {size}"),
        },
    }
}
