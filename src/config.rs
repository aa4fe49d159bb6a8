use crate::ffmpeg::Mp3Quality;
use crate::paths::AppPaths;
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_INFERENCE_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_INFERENCE_MODEL: &str = "llama3.2:latest";
pub const DEFAULT_TRASH_DIR_NAME: &str = "_CuratorTrash";
const DEFAULT_INFERENCE_TIMEOUT_SECS: u64 = 120;
const MAX_INFERENCE_TIMEOUT_SECS: u64 = 900;
const DEFAULT_QUIESCENCE_MS: u64 = 100;
const MAX_QUIESCENCE_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CuratorSettings {
    pub inference_base_url: String,
    /// Empty means "first model the endpoint lists".
    pub inference_model: String,
    pub inference_timeout_secs: u64,
    /// VBR level handed to the transcoder: 0, 2 or 4.
    pub mp3_quality: u8,
    /// Pause between stopping playback and moving the viewed file.
    pub quiescence_ms: u64,
    pub trash_dir_name: String,
}

impl Default for CuratorSettings {
    fn default() -> Self {
        Self {
            inference_base_url: DEFAULT_INFERENCE_BASE_URL.to_string(),
            inference_model: DEFAULT_INFERENCE_MODEL.to_string(),
            inference_timeout_secs: DEFAULT_INFERENCE_TIMEOUT_SECS,
            mp3_quality: Mp3Quality::default().level(),
            quiescence_ms: DEFAULT_QUIESCENCE_MS,
            trash_dir_name: DEFAULT_TRASH_DIR_NAME.to_string(),
        }
    }
}

impl CuratorSettings {
    pub fn mp3_quality(&self) -> Mp3Quality {
        Mp3Quality::from_level(self.mp3_quality).unwrap_or_default()
    }

    fn normalized(mut self) -> Self {
        let url = self.inference_base_url.trim().trim_end_matches('/');
        self.inference_base_url = if url.is_empty() {
            DEFAULT_INFERENCE_BASE_URL.to_string()
        } else {
            url.to_string()
        };
        self.inference_model = self.inference_model.trim().to_string();
        self.inference_timeout_secs = self
            .inference_timeout_secs
            .clamp(1, MAX_INFERENCE_TIMEOUT_SECS);
        self.mp3_quality = self.mp3_quality().level();
        self.quiescence_ms = self.quiescence_ms.min(MAX_QUIESCENCE_MS);

        let trash = self.trash_dir_name.trim();
        self.trash_dir_name = if trash.is_empty() || trash.contains(['/', '\\']) || trash == ".." {
            DEFAULT_TRASH_DIR_NAME.to_string()
        } else {
            trash.to_string()
        };
        self
    }
}

pub fn load_settings(paths: &AppPaths) -> Result<CuratorSettings> {
    let path = paths.settings_path();
    if !path.exists() {
        return Ok(CuratorSettings::default());
    }
    let bytes = std::fs::read(&path)?;
    let parsed: CuratorSettings = serde_json::from_slice(&bytes).map_err(|e| {
        EngineError::InvalidInput(format!(
            "failed to parse settings at {}: {e}",
            path.to_string_lossy()
        ))
    })?;
    Ok(parsed.normalized())
}

pub fn save_settings(paths: &AppPaths, settings: &CuratorSettings) -> Result<()> {
    let path = paths.settings_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&settings.clone().normalized())?;
    std::fs::write(&path, format!("{json}\n"))?;
    Ok(())
}
