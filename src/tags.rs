use crate::cache::Artwork;
use crate::{EngineError, Result};
use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::tag::{ItemKey, Tag};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Normalized tag bundle. Missing text fields read as empty strings and a
/// missing cover as `None`, so callers never special-case absent tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagRecord {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub comment: String,
    pub track_number: String,
    pub cover_art: Option<Artwork>,
}

/// A partial update. `None` fields keep whatever the file already has.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagEdits {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub comment: Option<String>,
    pub track_number: Option<String>,
}

impl TagEdits {
    pub fn is_empty(&self) -> bool {
        *self == TagEdits::default()
    }

    /// Edits that would turn `base` into `target`'s text fields.
    pub fn diff(base: &TagRecord, target: &TagRecord) -> Self {
        fn changed(a: &str, b: &str) -> Option<String> {
            (a != b).then(|| b.to_string())
        }
        Self {
            title: changed(&base.title, &target.title),
            artist: changed(&base.artist, &target.artist),
            album: changed(&base.album, &target.album),
            genre: changed(&base.genre, &target.genre),
            comment: changed(&base.comment, &target.comment),
            track_number: changed(&base.track_number, &target.track_number),
        }
    }
}

impl TagRecord {
    /// `edits` over `self`; a supplied cover replaces the embedded one outright.
    pub fn merged(&self, edits: &TagEdits, cover: Option<&Artwork>) -> TagRecord {
        let pick = |edit: &Option<String>, existing: &str| {
            edit.clone().unwrap_or_else(|| existing.to_string())
        };
        TagRecord {
            title: pick(&edits.title, &self.title),
            artist: pick(&edits.artist, &self.artist),
            album: pick(&edits.album, &self.album),
            genre: pick(&edits.genre, &self.genre),
            comment: pick(&edits.comment, &self.comment),
            track_number: pick(&edits.track_number, &self.track_number),
            cover_art: cover.cloned().or_else(|| self.cover_art.clone()),
        }
    }
}

/// Reads and writes embedded audio tags.
///
/// `write` stores the full record: empty text fields are removed from the
/// file and a `None` cover leaves existing pictures untouched.
pub trait TagCodec {
    fn read(&self, path: &Path) -> Result<TagRecord>;
    fn write(&self, path: &Path, record: &TagRecord) -> Result<()>;
}

const TEXT_KEYS: [ItemKey; 6] = [
    ItemKey::TrackTitle,
    ItemKey::TrackArtist,
    ItemKey::AlbumTitle,
    ItemKey::Genre,
    ItemKey::Comment,
    ItemKey::TrackNumber,
];

/// Frame aliases (ID3 `TCON`, Vorbis `GENRE`) resolve through lofty's generic item keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTagCodec;

impl LoftyTagCodec {
    fn text_fields(record: &TagRecord) -> [&str; 6] {
        [
            &record.title,
            &record.artist,
            &record.album,
            &record.genre,
            &record.comment,
            &record.track_number,
        ]
    }
}

impl TagCodec for LoftyTagCodec {
    fn read(&self, path: &Path) -> Result<TagRecord> {
        let tagged_file = lofty::read_from_path(path).map_err(tag_error)?;
        let Some(tag) = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
        else {
            return Ok(TagRecord::default());
        };

        let text = |key: &ItemKey| tag.get_string(key).unwrap_or_default().to_string();
        let cover_art = tag
            .pictures()
            .iter()
            .find(|p| p.pic_type() == PictureType::CoverFront)
            .or_else(|| tag.pictures().first())
            .map(|p| {
                let mime = p
                    .mime_type()
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| "image/jpeg".to_string());
                Artwork::new(mime, p.data().to_vec())
            });

        Ok(TagRecord {
            title: text(&ItemKey::TrackTitle),
            artist: text(&ItemKey::TrackArtist),
            album: text(&ItemKey::AlbumTitle),
            genre: text(&ItemKey::Genre),
            comment: text(&ItemKey::Comment),
            track_number: text(&ItemKey::TrackNumber),
            cover_art,
        })
    }

    fn write(&self, path: &Path, record: &TagRecord) -> Result<()> {
        let mut tagged_file = lofty::read_from_path(path).map_err(tag_error)?;
        if tagged_file.primary_tag().is_none() {
            let tag_type = tagged_file.primary_tag_type();
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        let tag = tagged_file
            .primary_tag_mut()
            .ok_or_else(|| EngineError::Tag("file format does not support tags".to_string()))?;

        for (key, value) in TEXT_KEYS.iter().zip(Self::text_fields(record)) {
            let value = value.trim();
            if value.is_empty() {
                tag.remove_key(key);
            } else {
                tag.insert_text(key.clone(), value.to_string());
            }
        }

        if let Some(cover) = &record.cover_art {
            tag.remove_picture_type(PictureType::CoverFront);
            tag.push_picture(Picture::new_unchecked(
                PictureType::CoverFront,
                Some(MimeType::from_str(&cover.mime_type)),
                Some("Cover".to_string()),
                cover.data.clone(),
            ));
        }

        tagged_file
            .save_to_path(path, WriteOptions::default())
            .map_err(tag_error)
    }
}

fn tag_error(err: lofty::error::LoftyError) -> EngineError {
    EngineError::Tag(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_silent_wav(path: &Path) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
        for _ in 0..800 {
            writer.write_sample(0_i16).expect("sample");
        }
        writer.finalize().expect("finalize");
    }

    #[test]
    fn merge_preserves_untouched_fields() {
        let existing = TagRecord {
            title: "T".to_string(),
            artist: "Y".to_string(),
            album: "A".to_string(),
            ..TagRecord::default()
        };
        let edits = TagEdits {
            artist: Some("X".to_string()),
            ..TagEdits::default()
        };
        let merged = existing.merged(&edits, None);
        assert_eq!(merged.title, "T");
        assert_eq!(merged.artist, "X");
        assert_eq!(merged.album, "A");
    }

    #[test]
    fn merge_replaces_cover_only_when_supplied() {
        let old_cover = Artwork::new("image/png", vec![1]);
        let new_cover = Artwork::new("image/jpeg", vec![2, 3]);
        let existing = TagRecord {
            cover_art: Some(old_cover.clone()),
            ..TagRecord::default()
        };
        let kept = existing.merged(&TagEdits::default(), None);
        assert_eq!(kept.cover_art, Some(old_cover));
        let replaced = existing.merged(&TagEdits::default(), Some(&new_cover));
        assert_eq!(replaced.cover_art, Some(new_cover));
    }

    #[test]
    fn diff_only_reports_changed_fields() {
        let base = TagRecord {
            title: "Old".to_string(),
            genre: "Jazz".to_string(),
            ..TagRecord::default()
        };
        let target = TagRecord {
            title: "New".to_string(),
            genre: "Jazz".to_string(),
            ..TagRecord::default()
        };
        let edits = TagEdits::diff(&base, &target);
        assert_eq!(edits.title.as_deref(), Some("New"));
        assert!(edits.genre.is_none());
        assert!(TagEdits::diff(&base, &base).is_empty());
    }

    #[test]
    fn lofty_reads_untagged_wav_as_defaults_and_writes_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let wav = dir.path().join("take.wav");
        write_silent_wav(&wav);

        let codec = LoftyTagCodec;
        let empty = codec.read(&wav).expect("read untagged");
        assert_eq!(empty, TagRecord::default());

        let record = TagRecord {
            title: "Midnight Drive".to_string(),
            artist: "Night Shift".to_string(),
            album: "Late".to_string(),
            ..TagRecord::default()
        };
        codec.write(&wav, &record).expect("write");
        let back = codec.read(&wav).expect("read back");
        assert_eq!(back.title, "Midnight Drive");
        assert_eq!(back.artist, "Night Shift");
        assert_eq!(back.album, "Late");
    }

    #[test]
    fn lofty_new_cover_replaces_embedded_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let wav = dir.path().join("liner.wav");
        write_silent_wav(&wav);

        let codec = LoftyTagCodec;
        let first = TagRecord {
            title: "Blue Room".to_string(),
            genre: "Jazz".to_string(),
            comment: "liner".to_string(),
            track_number: "7".to_string(),
            cover_art: Some(Artwork::new("image/png", vec![0x89, b'P', b'N', b'G'])),
            ..TagRecord::default()
        };
        codec.write(&wav, &first).expect("write first cover");
        assert_eq!(codec.read(&wav).expect("read first"), first);

        let jpeg = Artwork::new("image/jpeg", vec![255, 216, 255, 9]);
        let second = TagRecord {
            cover_art: Some(jpeg.clone()),
            ..first.clone()
        };
        codec.write(&wav, &second).expect("write second cover");

        let back = codec.read(&wav).expect("read second");
        assert_eq!(back.cover_art, Some(jpeg));
        assert_eq!(back.comment, "liner");
        assert_eq!(back.track_number, "7");
        assert_eq!(back.genre, "Jazz");
    }

    #[test]
    fn lofty_reports_unreadable_files_as_tag_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bogus = dir.path().join("bogus.xyz");
        std::fs::write(&bogus, b"definitely not audio").expect("write");
        let err = LoftyTagCodec.read(&bogus).expect_err("should fail");
        assert!(matches!(err, EngineError::Tag(_)));
    }
}
