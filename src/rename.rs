use crate::inference::{self, Inference};
use crate::media;
use crate::{EngineError, Result};
use std::path::{Path, PathBuf};

/// Renames one file on disk and returns its new path.
pub trait Renamer {
    fn is_available(&self) -> bool;
    fn rename(&self, path: &Path) -> Result<PathBuf>;
}

/// Asks the inference endpoint for a fresh name for each duplicate.
pub struct AiRenamer<I> {
    inference: I,
}

impl<I: Inference> AiRenamer<I> {
    pub fn new(inference: I) -> Self {
        Self { inference }
    }

    pub fn inference(&self) -> &I {
        &self.inference
    }
}

impl<I: Inference> Renamer for AiRenamer<I> {
    fn is_available(&self) -> bool {
        self.inference.is_available()
    }

    fn rename(&self, path: &Path) -> Result<PathBuf> {
        let text = path.to_string_lossy();
        let old_name = media::basename(&text);
        let reply = self.inference.generate(&inference::rename_prompt(old_name))?;
        let new_name = inference::clean_suggested_name(&reply, old_name).ok_or_else(|| {
            EngineError::Inference(format!("no usable filename in reply: {:?}", reply.trim()))
        })?;

        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        let dest = free_name_in(dir, &new_name, path);
        std::fs::rename(path, &dest)?;
        Ok(dest)
    }
}

/// `dir/<name>` if free, else `dir/<stem> 1<ext>`, `dir/<stem> 2<ext>`, ...
/// `source` itself never counts as taken.
pub fn free_name_in(dir: &Path, name: &str, source: &Path) -> PathBuf {
    let stem = media::stem(name);
    let ext = media::extension(name);
    let mut dest = dir.join(name);
    let mut counter = 1_u32;
    while dest.exists() && dest != source {
        dest = dir.join(format!("{stem} {counter}{ext}"));
        counter += 1;
    }
    dest
}
