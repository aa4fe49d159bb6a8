use crate::config::CuratorSettings;
use crate::inference::{Inference, OllamaClient};
use crate::paths::AppPaths;
use crate::{EngineError, Result};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct FfmpegToolsStatus {
    pub installed: bool,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub ffmpeg_version: Option<String>,
    pub ffprobe_version: Option<String>,
}

/// `installed` means the bundled copies exist. The versions come from whatever
/// `ffmpeg_cmd`/`ffprobe_cmd` resolve to, so a system install still reports one.
pub fn ffmpeg_tools_status(paths: &AppPaths) -> FfmpegToolsStatus {
    let ffmpeg_path = paths.ffmpeg_bin_path();
    let ffprobe_path = paths.ffprobe_bin_path();

    FfmpegToolsStatus {
        installed: ffmpeg_path.exists() && ffprobe_path.exists(),
        ffmpeg_path: ffmpeg_path.to_string_lossy().to_string(),
        ffprobe_path: ffprobe_path.to_string_lossy().to_string(),
        ffmpeg_version: crate::cmd::version_first_line(paths.ffmpeg_cmd()),
        ffprobe_version: crate::cmd::version_first_line(paths.ffprobe_cmd()),
    }
}

/// Downloads the platform ffmpeg build into `<base>/tools/ffmpeg`.
pub fn install_ffmpeg_tools(paths: &AppPaths) -> Result<FfmpegToolsStatus> {
    paths.ensure_dirs()?;

    let destination = paths.ffmpeg_dir();
    std::fs::create_dir_all(&destination)?;

    let download_url = ffmpeg_sidecar::download::ffmpeg_download_url()
        .map_err(|e| EngineError::InstallFailed(e.to_string()))?;
    let archive_path =
        ffmpeg_sidecar::download::download_ffmpeg_package(download_url, &destination)
            .map_err(|e| EngineError::InstallFailed(e.to_string()))?;
    ffmpeg_sidecar::download::unpack_ffmpeg(&archive_path, &destination)
        .map_err(|e| EngineError::InstallFailed(e.to_string()))?;

    let status = ffmpeg_tools_status(paths);
    if !status.installed {
        return Err(EngineError::InstallFailed(format!(
            "ffmpeg archive unpacked but {} is missing",
            status.ffmpeg_path
        )));
    }
    Ok(status)
}

#[derive(Debug, Clone, Serialize)]
pub struct InferenceStatus {
    pub base_url: String,
    pub available: bool,
    pub models: Vec<String>,
    pub error: Option<String>,
}

pub fn inference_status(settings: &CuratorSettings) -> InferenceStatus {
    let client = match OllamaClient::from_settings(settings) {
        Ok(client) => client,
        Err(err) => {
            return InferenceStatus {
                base_url: settings.inference_base_url.clone(),
                available: false,
                models: Vec::new(),
                error: Some(err.to_string()),
            }
        }
    };
    let base_url = client.base_url().to_string();
    match client.list_models() {
        Ok(models) => InferenceStatus {
            base_url,
            available: true,
            models,
            error: None,
        },
        Err(err) => InferenceStatus {
            base_url,
            available: false,
            models: Vec::new(),
            error: Some(err.to_string()),
        },
    }
}
