use crate::config::DEFAULT_TRASH_DIR_NAME;
use crate::media;
use crate::{EngineError, Result};
use std::path::{Path, PathBuf};

/// Destructive filesystem operations used by trash and move batches.
pub trait FileOps {
    /// Moves `path` into the sibling trash folder and returns where it landed.
    fn trash(&self, path: &Path) -> Result<PathBuf>;
    fn move_to(&self, path: &Path, dest_dir: &Path) -> Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct LocalFs {
    trash_dir_name: String,
}

impl Default for LocalFs {
    fn default() -> Self {
        Self::new(DEFAULT_TRASH_DIR_NAME)
    }
}

impl LocalFs {
    pub fn new(trash_dir_name: impl Into<String>) -> Self {
        Self {
            trash_dir_name: trash_dir_name.into(),
        }
    }

    pub fn trash_dir_for(&self, path: &Path) -> PathBuf {
        path.parent()
            .unwrap_or_else(|| Path::new(""))
            .join(&self.trash_dir_name)
    }
}

impl FileOps for LocalFs {
    fn trash(&self, path: &Path) -> Result<PathBuf> {
        let trash_dir = self.trash_dir_for(path);
        std::fs::create_dir_all(&trash_dir)?;
        let dest = unique_destination(path, &trash_dir)?;
        std::fs::rename(path, &dest)?;
        Ok(dest)
    }

    fn move_to(&self, path: &Path, dest_dir: &Path) -> Result<PathBuf> {
        if !dest_dir.is_dir() {
            return Err(EngineError::InvalidInput(format!(
                "move destination is not a folder: {}",
                dest_dir.display()
            )));
        }
        let dest = unique_destination(path, dest_dir)?;
        if std::fs::rename(path, &dest).is_err() {
            // Cross-device moves cannot rename.
            std::fs::copy(path, &dest)?;
            if let Err(e) = std::fs::remove_file(path) {
                let _ = std::fs::remove_file(&dest);
                return Err(e.into());
            }
        }
        Ok(dest)
    }
}

/// `dir/<name>` if free, else `dir/<stem>__1<ext>`, `dir/<stem>__2<ext>`, ...
pub fn unique_destination(path: &Path, dir: &Path) -> Result<PathBuf> {
    let text = path.to_string_lossy();
    let name = media::basename(&text);
    if name.is_empty() {
        return Err(EngineError::InvalidInput(format!(
            "path has no file name: {text}"
        )));
    }
    let mut dest = dir.join(name);
    let stem = media::stem(&text);
    let ext = media::extension(&text);
    let mut n = 1_u32;
    while dest.exists() {
        dest = dir.join(format!("{stem}__{n}{ext}"));
        n += 1;
    }
    Ok(dest)
}

/// Media files directly inside `dir` (no recursion), in load order.
pub fn scan_folder(dir: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let path = entry.path().to_string_lossy().to_string();
        if media::is_media(&path) {
            out.push(path);
        }
    }
    media::sort_by_basename(&mut out);
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropResolution {
    pub label: String,
    pub paths: Vec<String>,
    pub is_folder: bool,
}

/// The first dropped directory wins. A path that cannot be stat'ed fails the whole drop.
pub fn resolve_dropped_paths(dropped: &[PathBuf]) -> Result<DropResolution> {
    let mut files = Vec::new();
    let mut first_dir: Option<&PathBuf> = None;

    for path in dropped.iter().filter(|p| !p.as_os_str().is_empty()) {
        let meta = std::fs::symlink_metadata(path).map_err(|e| {
            EngineError::InvalidInput(format!(
                "file not found or unreadable: {}: {e}",
                path.display()
            ))
        })?;
        if meta.is_dir() {
            first_dir.get_or_insert(path);
            continue;
        }
        let text = path.to_string_lossy().to_string();
        if media::is_media(&text) {
            files.push(text);
        }
    }

    if let Some(dir) = first_dir {
        return Ok(DropResolution {
            label: dir.to_string_lossy().to_string(),
            paths: scan_folder(dir)?,
            is_folder: true,
        });
    }

    media::sort_by_basename(&mut files);
    Ok(DropResolution {
        label: format!("{} files", files.len()),
        paths: files,
        is_folder: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path, body: &str) {
        std::fs::write(path, body).expect("write file");
    }

    #[test]
    fn trash_uniquifies_with_double_underscore_suffix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fs = LocalFs::default();

        let first = dir.path().join("song.mp3");
        touch(&first, "one");
        let landed = fs.trash(&first).expect("trash one");
        assert_eq!(landed, dir.path().join("_CuratorTrash").join("song.mp3"));

        touch(&first, "two");
        let landed = fs.trash(&first).expect("trash two");
        assert_eq!(landed, dir.path().join("_CuratorTrash").join("song__1.mp3"));

        touch(&first, "three");
        let landed = fs.trash(&first).expect("trash three");
        assert_eq!(landed, dir.path().join("_CuratorTrash").join("song__2.mp3"));
        assert_eq!(std::fs::read_to_string(landed).expect("read"), "three");
        assert!(!first.exists());
    }

    #[test]
    fn move_to_uses_same_uniquify_rule() {
        let src_dir = tempfile::tempdir().expect("src");
        let dst_dir = tempfile::tempdir().expect("dst");
        touch(&dst_dir.path().join("clip.mkv"), "existing");
        let src = src_dir.path().join("clip.mkv");
        touch(&src, "moved");

        let landed = LocalFs::default()
            .move_to(&src, dst_dir.path())
            .expect("move");
        assert_eq!(landed, dst_dir.path().join("clip__1.mkv"));
        assert!(!src.exists());
        assert_eq!(std::fs::read_to_string(landed).expect("read"), "moved");
    }

    #[test]
    fn move_to_missing_source_fails_without_side_effects() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = LocalFs::default()
            .move_to(&dir.path().join("ghost.mp3"), dir.path())
            .expect_err("should fail");
        assert!(matches!(err, EngineError::Io(_)));
        assert!(!dir.path().join("ghost.mp3").exists());
    }

    #[test]
    fn scan_folder_filters_sorts_and_skips_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(&dir.path().join("b.MP3"), "");
        touch(&dir.path().join("A.png"), "");
        touch(&dir.path().join("notes.txt"), "");
        std::fs::create_dir(dir.path().join("sub.mp4")).expect("dir");

        let found = scan_folder(dir.path()).expect("scan");
        let names: Vec<&str> = found.iter().map(|p| media::basename(p)).collect();
        assert_eq!(names, vec!["A.png", "b.MP3"]);
    }

    #[test]
    fn dropped_directory_takes_precedence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let folder = dir.path().join("album");
        std::fs::create_dir(&folder).expect("album");
        touch(&folder.join("01.flac"), "");
        let loose = dir.path().join("loose.mp3");
        touch(&loose, "");

        let resolved = resolve_dropped_paths(&[loose, folder.clone()]).expect("resolve");
        assert!(resolved.is_folder);
        assert_eq!(resolved.label, folder.to_string_lossy());
        assert_eq!(resolved.paths.len(), 1);
    }

    #[test]
    fn dropped_files_keep_only_media() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("z.wav");
        let b = dir.path().join("a.mp4");
        let c = dir.path().join("readme.md");
        for p in [&a, &b, &c] {
            touch(p, "");
        }
        let resolved = resolve_dropped_paths(&[a, b, c]).expect("resolve");
        assert!(!resolved.is_folder);
        assert_eq!(resolved.label, "2 files");
        let names: Vec<&str> = resolved.paths.iter().map(|p| media::basename(p)).collect();
        assert_eq!(names, vec!["a.mp4", "z.wav"]);
    }

    #[test]
    fn unreadable_drop_fails_whole_resolution() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ok = dir.path().join("a.mp3");
        touch(&ok, "");
        let missing = dir.path().join("missing.mp3");
        let err = resolve_dropped_paths(&[ok, missing]).expect_err("should fail");
        assert!(err.to_string().contains("missing.mp3"));
    }
}
