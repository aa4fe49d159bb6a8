use crate::cache::{Artwork, CacheKind, CacheLayer};
use crate::inference::MetadataSuggestion;
use crate::media;
use crate::tags::{TagCodec, TagEdits, TagRecord};
use crate::{EngineError, Result};
use std::path::Path;

pub fn read_for_display(tags: &dyn TagCodec, path: &Path) -> Result<TagRecord> {
    tags.read(path)
}

/// Merges `edits` over the on-disk tags, writes, and returns the re-read record.
/// A supplied `cover` replaces the embedded picture wholesale.
pub fn write_merged(
    tags: &dyn TagCodec,
    path: &Path,
    edits: &TagEdits,
    cover: Option<&Artwork>,
) -> Result<TagRecord> {
    let existing = tags.read(path)?;
    let merged = existing.merged(edits, cover);
    tags.write(path, &merged)?;
    tags.read(path)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagField {
    Title,
    Artist,
    Album,
    Genre,
    Comment,
    TrackNumber,
}

#[derive(Debug, Clone, Default)]
pub struct MetadataEditor {
    path: Option<String>,
    baseline: TagRecord,
    buffer: TagRecord,
    pending_cover: Option<Artwork>,
}

impl MetadataEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `path` into the buffer, discarding unsaved edits.
    pub fn open(&mut self, tags: &dyn TagCodec, path: &str) -> Result<&TagRecord> {
        let record = read_for_display(tags, Path::new(path))?;
        self.path = Some(path.to_string());
        self.baseline = record.clone();
        self.buffer = record;
        self.pending_cover = None;
        Ok(&self.buffer)
    }

    pub fn close(&mut self) {
        *self = Self::default();
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn record(&self) -> &TagRecord {
        &self.buffer
    }

    pub fn set(&mut self, field: TagField, value: impl Into<String>) {
        let value = value.into();
        match field {
            TagField::Title => self.buffer.title = value,
            TagField::Artist => self.buffer.artist = value,
            TagField::Album => self.buffer.album = value,
            TagField::Genre => self.buffer.genre = value,
            TagField::Comment => self.buffer.comment = value,
            TagField::TrackNumber => self.buffer.track_number = value,
        }
    }

    pub fn set_pending_cover(&mut self, cover: Artwork) {
        self.pending_cover = Some(cover);
    }

    pub fn pending_cover(&self) -> Option<&Artwork> {
        self.pending_cover.as_ref()
    }

    pub fn cover_for_display(&self) -> Option<&Artwork> {
        self.pending_cover.as_ref().or(self.buffer.cover_art.as_ref())
    }

    pub fn is_dirty(&self) -> bool {
        self.pending_cover.is_some() || !TagEdits::diff(&self.baseline, &self.buffer).is_empty()
    }

    pub fn title_from_filename(&mut self) {
        if let Some(path) = &self.path {
            self.buffer.title = media::title_from_filename(path);
        }
    }

    pub fn apply_suggestion(&mut self, suggestion: &MetadataSuggestion) {
        let fields = [
            (TagField::Title, &suggestion.title),
            (TagField::Artist, &suggestion.artist),
            (TagField::Album, &suggestion.album),
            (TagField::Genre, &suggestion.genre),
            (TagField::Comment, &suggestion.comment),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                self.set(field, value.clone());
            }
        }
    }

    /// Writes only the changed fields, then replaces the buffer with the re-read record.
    pub fn save(&mut self, tags: &dyn TagCodec, caches: &mut CacheLayer) -> Result<&TagRecord> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| EngineError::InvalidInput("no file open for editing".to_string()))?;
        let edits = TagEdits::diff(&self.baseline, &self.buffer);
        let verified = write_merged(tags, Path::new(&path), &edits, self.pending_cover.as_ref())?;

        if self.pending_cover.take().is_some() {
            caches.invalidate(&path);
            if let Some(cover) = &verified.cover_art {
                caches.put(CacheKind::CoverArt, &path, cover.clone());
                caches.put(CacheKind::Thumbnail, &path, cover.clone());
            }
        }
        self.baseline = verified.clone();
        self.buffer = verified;
        Ok(&self.buffer)
    }
}

/// Shared values for a multi-file tag write. Empty or absent text keeps each
/// file's own value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchMetadataRequest {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub title_from_filename: bool,
    pub auto_number: bool,
}

impl BatchMetadataRequest {
    pub fn edits_for(&self, path: &str, position: usize) -> TagEdits {
        let shared = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        TagEdits {
            title: self
                .title_from_filename
                .then(|| media::title_from_filename(path)),
            artist: shared(&self.artist),
            album: shared(&self.album),
            genre: shared(&self.genre),
            comment: None,
            track_number: self.auto_number.then(|| position.to_string()),
        }
    }
}
