use crate::ffmpeg::PreviewGenerator;
use crate::media::{self, MediaKind};
use crate::tags::TagCodec;
use crate::{EngineError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

/// An encoded image plus its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artwork {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Artwork {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }

    pub fn from_data_uri(uri: &str) -> Result<Self> {
        static DATA_URI_RE: OnceLock<Regex> = OnceLock::new();
        let re = DATA_URI_RE.get_or_init(|| {
            Regex::new(r"^data:(image/[A-Za-z0-9.+-]+);base64,(.+)$").expect("data uri regex")
        });
        let caps = re
            .captures(uri.trim())
            .ok_or_else(|| EngineError::InvalidInput("not an image data URI".to_string()))?;
        let data = STANDARD
            .decode(&caps[2])
            .map_err(|e| EngineError::InvalidInput(format!("invalid base64 image data: {e}")))?;
        Ok(Self::new(&caps[1], data))
    }

    /// Reads a replacement cover image picked by the user.
    pub fn from_image_file(path: &Path) -> Result<Self> {
        let name = path.to_string_lossy();
        let mime = mime_for_image_extension(media::extension(&name)).ok_or_else(|| {
            EngineError::UnsupportedMedia {
                path: path.to_path_buf(),
            }
        })?;
        Ok(Self::new(mime, std::fs::read(path)?))
    }
}

fn mime_for_image_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        ".jpg" | ".jpeg" => Some("image/jpeg"),
        ".png" => Some("image/png"),
        ".gif" => Some("image/gif"),
        ".webp" => Some("image/webp"),
        ".bmp" => Some("image/bmp"),
        ".tif" | ".tiff" => Some("image/tiff"),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Thumbnail,
    CoverArt,
}

#[derive(Debug, Clone, Default)]
pub struct CacheLayer {
    thumbnails: HashMap<String, Artwork>,
    cover_art: HashMap<String, Artwork>,
}

impl CacheLayer {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self, kind: CacheKind) -> &HashMap<String, Artwork> {
        match kind {
            CacheKind::Thumbnail => &self.thumbnails,
            CacheKind::CoverArt => &self.cover_art,
        }
    }

    fn store_mut(&mut self, kind: CacheKind) -> &mut HashMap<String, Artwork> {
        match kind {
            CacheKind::Thumbnail => &mut self.thumbnails,
            CacheKind::CoverArt => &mut self.cover_art,
        }
    }

    pub fn get(&self, kind: CacheKind, path: &str) -> Option<&Artwork> {
        self.store(kind).get(path)
    }

    pub fn put(&mut self, kind: CacheKind, path: &str, artwork: Artwork) {
        self.store_mut(kind).insert(path.to_string(), artwork);
    }

    pub fn invalidate(&mut self, path: &str) {
        self.thumbnails.remove(path);
        self.cover_art.remove(path);
    }

    /// Moves whatever is cached under `old` to `new`. Nothing survives under `old`.
    pub fn rekey(&mut self, old: &str, new: &str) {
        if old == new {
            return;
        }
        for store in [&mut self.thumbnails, &mut self.cover_art] {
            store.remove(new);
            if let Some(artwork) = store.remove(old) {
                store.insert(new.to_string(), artwork);
            }
        }
    }

    pub fn clear(&mut self) {
        self.thumbnails.clear();
        self.cover_art.clear();
    }

    pub fn len(&self, kind: CacheKind) -> usize {
        self.store(kind).len()
    }

    pub fn is_empty(&self) -> bool {
        self.thumbnails.is_empty() && self.cover_art.is_empty()
    }

    /// Embedded cover art wins over a generated preview. Failed previews are not cached.
    pub fn resolve_thumbnail(
        &mut self,
        path: &str,
        tags: &dyn TagCodec,
        previews: &dyn PreviewGenerator,
    ) -> Option<Artwork> {
        if let Some(hit) = self.thumbnails.get(path) {
            return Some(hit.clone());
        }
        if let Some(cover) = self.cover_art.get(path).cloned() {
            self.thumbnails.insert(path.to_string(), cover.clone());
            return Some(cover);
        }

        let kind = MediaKind::of(path)?;
        if kind == MediaKind::Audio {
            if let Ok(record) = tags.read(Path::new(path)) {
                if let Some(cover) = record.cover_art {
                    self.cover_art.insert(path.to_string(), cover.clone());
                    self.thumbnails.insert(path.to_string(), cover.clone());
                    return Some(cover);
                }
            }
        }

        match previews.thumbnail(Path::new(path), kind) {
            Ok(artwork) if !artwork.data.is_empty() => {
                self.thumbnails.insert(path.to_string(), artwork.clone());
                Some(artwork)
            }
            _ => None,
        }
    }
}
