use crate::batch::{self, BatchObserver, BatchProgress, BatchSummary, CancelToken, LoggedObserver};
use crate::cache::Artwork;
use crate::config::{self, CuratorSettings};
use crate::eventlog::{self, EventLog, LogLevel};
use crate::ffmpeg::{self, FfmpegTools, MediaProber, Mp3Conversion, Mp3Quality, PreviewGenerator, Transcoder};
use crate::fs_ops::{self, FileOps, LocalFs};
use crate::inference::{self, Inference, MetadataSuggestion, OllamaClient};
use crate::library::Library;
use crate::media;
use crate::metadata::{BatchMetadataRequest, MetadataEditor};
use crate::paths::AppPaths;
use crate::rename::AiRenamer;
use crate::tags::{LoftyTagCodec, TagCodec, TagRecord};
use crate::{EngineError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// External services the session calls out to.
pub struct Collaborators {
    pub fs: Box<dyn FileOps>,
    pub tags: Box<dyn TagCodec>,
    pub previews: Box<dyn PreviewGenerator>,
    pub prober: Box<dyn MediaProber>,
    pub transcoder: Box<dyn Transcoder>,
    pub inference: Box<dyn Inference>,
}

impl Collaborators {
    /// Local filesystem, lofty tags, ffmpeg tools and the configured inference endpoint.
    pub fn local(paths: &AppPaths, settings: &CuratorSettings) -> Result<Self> {
        let tools = FfmpegTools::new(paths.clone());
        Ok(Self {
            fs: Box::new(LocalFs::new(settings.trash_dir_name.clone())),
            tags: Box::new(LoftyTagCodec),
            previews: Box::new(tools.clone()),
            prober: Box::new(tools.clone()),
            transcoder: Box::new(tools),
            inference: Box::new(OllamaClient::from_settings(settings)?),
        })
    }
}

pub struct CuratorSession {
    paths: AppPaths,
    settings: CuratorSettings,
    library: Library,
    editor: MetadataEditor,
    log: EventLog,
    cancel: CancelToken,
    collaborators: Collaborators,
}

impl CuratorSession {
    /// Prepares `base_dir`, loads settings and wires the local collaborators.
    pub fn open(base_dir: PathBuf) -> Result<Self> {
        let paths = AppPaths::new(base_dir);
        paths.ensure_dirs()?;
        let settings = config::load_settings(&paths)?;
        let collaborators = Collaborators::local(&paths, &settings)?;
        let session = Self::with_collaborators(paths, settings, collaborators);
        let _ = session.log.prune();
        Ok(session)
    }

    pub fn with_collaborators(
        paths: AppPaths,
        settings: CuratorSettings,
        collaborators: Collaborators,
    ) -> Self {
        let log = EventLog::new(&paths);
        Self {
            paths,
            settings,
            library: Library::new(),
            editor: MetadataEditor::new(),
            log,
            cancel: CancelToken::new(),
            collaborators,
        }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn settings(&self) -> &CuratorSettings {
        &self.settings
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn editor(&self) -> &MetadataEditor {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut MetadataEditor {
        &mut self.editor
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    /// Clone this to cancel a running batch from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn quiescence(&self) -> Duration {
        Duration::from_millis(self.settings.quiescence_ms)
    }

    // --- loading ---

    pub fn load_folder(&mut self, dir: &Path) -> Result<usize> {
        let paths = fs_ops::scan_folder(dir)?;
        self.install(paths, &dir.to_string_lossy());
        Ok(self.library.len())
    }

    /// Files picked in a dialog, kept in pick order. Non-media paths are ignored.
    pub fn load_files(&mut self, files: &[PathBuf]) -> usize {
        let paths: Vec<String> = files
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .filter(|p| media::is_media(p))
            .collect();
        let label = format!("{} files", paths.len());
        self.install(paths, &label);
        self.library.len()
    }

    pub fn load_dropped(&mut self, dropped: &[PathBuf]) -> Result<usize> {
        let resolved = fs_ops::resolve_dropped_paths(dropped)?;
        self.install(resolved.paths, &resolved.label);
        Ok(self.library.len())
    }

    fn install(&mut self, paths: Vec<String>, label: &str) {
        self.library.load(paths, label);
        self.sync_editor();
    }

    pub fn clear(&mut self) {
        self.library.clear();
        self.editor.close();
    }

    // --- navigation and selection ---

    pub fn set_current(&mut self, index: usize) -> bool {
        let moved = self.library.set_current(index);
        if moved {
            self.sync_editor();
        }
        moved
    }

    pub fn previous(&mut self) -> bool {
        let moved = self.library.previous();
        if moved {
            self.sync_editor();
        }
        moved
    }

    pub fn next(&mut self) -> bool {
        let moved = self.library.next();
        if moved {
            self.sync_editor();
        }
        moved
    }

    pub fn toggle_select(&mut self, path: &str) -> bool {
        self.library.toggle_select(path)
    }

    pub fn select_all(&mut self) {
        self.library.select_all();
    }

    pub fn select_none(&mut self) {
        self.library.select_none();
    }

    /// Keeps the edit buffer on the viewed audio file. Anything else closes it.
    fn sync_editor(&mut self) {
        let Some(current) = self.library.current_path().map(str::to_string) else {
            self.editor.close();
            return;
        };
        if !media::is_audio(&current) {
            self.editor.close();
            return;
        }
        if let Err(err) = self.editor.open(self.collaborators.tags.as_ref(), &current) {
            self.editor.close();
            let _ = self.log.log(
                &eventlog::new_batch_id(),
                LogLevel::Warn,
                "tags_unreadable",
                serde_json::json!({ "path": current, "error": err.to_string() }),
            );
        }
    }

    // --- visuals ---

    /// Cached or freshly generated preview for a library path.
    pub fn thumbnail(&mut self, path: &str) -> Option<Artwork> {
        if !self.library.contains(path) {
            return None;
        }
        self.library.caches_mut().resolve_thumbnail(
            path,
            self.collaborators.tags.as_ref(),
            self.collaborators.previews.as_ref(),
        )
    }

    pub fn describe_current(&self) -> Option<String> {
        let current = self.library.current_path()?;
        Some(ffmpeg::describe(
            self.collaborators.prober.as_ref(),
            Path::new(current),
        ))
    }

    // --- batches ---

    fn logged<'a>(
        log: &'a EventLog,
        cancel: &'a CancelToken,
        observer: &'a mut dyn BatchObserver,
    ) -> LoggedObserver<'a> {
        cancel.reset();
        LoggedObserver::new(log, cancel, observer)
    }

    /// Reopens the editor only when the batch moved the viewed slot or rewrote
    /// the viewed file. Otherwise unsaved edits stay in the buffer.
    fn sync_editor_after(&mut self, viewed: Option<String>, reached: &[String], summary: &BatchSummary) {
        let moved = self.library.current_path() != viewed.as_deref();
        let rewritten = viewed.as_ref().is_some_and(|v| {
            reached.contains(v) && !summary.errors.iter().any(|e| &e.path == v)
        });
        if moved || rewritten {
            self.sync_editor();
        }
    }

    fn viewed(&self) -> Option<String> {
        self.library.current_path().map(str::to_string)
    }

    pub fn trash(&mut self, observer: &mut dyn BatchObserver) -> BatchSummary {
        let quiescence = self.quiescence();
        let viewed = self.viewed();
        let mut reached = ReachedPaths::new(observer);
        let summary = {
            let mut observer = Self::logged(&self.log, &self.cancel, &mut reached);
            batch::trash_selected(
                &mut self.library,
                self.collaborators.fs.as_ref(),
                quiescence,
                &mut observer,
            )
        };
        self.sync_editor_after(viewed, &reached.paths, &summary);
        summary
    }

    pub fn move_to(&mut self, dest_dir: &Path, observer: &mut dyn BatchObserver) -> BatchSummary {
        let quiescence = self.quiescence();
        let viewed = self.viewed();
        let mut reached = ReachedPaths::new(observer);
        let summary = {
            let mut observer = Self::logged(&self.log, &self.cancel, &mut reached);
            batch::move_selected(
                &mut self.library,
                self.collaborators.fs.as_ref(),
                dest_dir,
                quiescence,
                &mut observer,
            )
        };
        self.sync_editor_after(viewed, &reached.paths, &summary);
        summary
    }

    /// `quality` falls back to the configured default.
    pub fn convert_selected(
        &mut self,
        quality: Option<Mp3Quality>,
        observer: &mut dyn BatchObserver,
    ) -> BatchSummary {
        let quality = quality.unwrap_or_else(|| self.settings.mp3_quality());
        let viewed = self.viewed();
        let mut reached = ReachedPaths::new(observer);
        let summary = {
            let mut observer = Self::logged(&self.log, &self.cancel, &mut reached);
            batch::convert_selected_to_mp3(
                &mut self.library,
                self.collaborators.transcoder.as_ref(),
                quality,
                &mut observer,
            )
        };
        self.sync_editor_after(viewed, &reached.paths, &summary);
        summary
    }

    /// Converts the viewed `.wav` and swaps the result into its slot.
    pub fn convert_current(&mut self, quality: Option<Mp3Quality>) -> Result<Mp3Conversion> {
        let current = self
            .library
            .current_path()
            .map(str::to_string)
            .ok_or_else(|| EngineError::InvalidInput("nothing is being viewed".to_string()))?;
        if !media::is_wav(&current) {
            return Err(EngineError::InvalidInput(format!(
                "only .wav files can be converted: {current}"
            )));
        }
        let quality = quality.unwrap_or_else(|| self.settings.mp3_quality());
        let converted = self
            .collaborators
            .transcoder
            .wav_to_mp3(Path::new(&current), quality)?;
        self.library
            .replace(&current, &converted.mp3_path.to_string_lossy());
        self.sync_editor();
        Ok(converted)
    }

    pub fn apply_batch_metadata(
        &mut self,
        request: &BatchMetadataRequest,
        observer: &mut dyn BatchObserver,
    ) -> BatchSummary {
        let viewed = self.viewed();
        let mut reached = ReachedPaths::new(observer);
        let summary = {
            let mut observer = Self::logged(&self.log, &self.cancel, &mut reached);
            batch::apply_batch_metadata(
                &mut self.library,
                self.collaborators.tags.as_ref(),
                request,
                &mut observer,
            )
        };
        self.sync_editor_after(viewed, &reached.paths, &summary);
        summary
    }

    pub fn ai_rename_duplicates(
        &mut self,
        observer: &mut dyn BatchObserver,
    ) -> Result<BatchSummary> {
        let viewed = self.viewed();
        let mut reached = ReachedPaths::new(observer);
        let summary = {
            let renamer = AiRenamer::new(self.collaborators.inference.as_ref());
            let mut observer = Self::logged(&self.log, &self.cancel, &mut reached);
            batch::ai_rename_duplicates(&mut self.library, &renamer, &mut observer)?
        };
        self.sync_editor_after(viewed, &reached.paths, &summary);
        Ok(summary)
    }

    // --- metadata ---

    pub fn set_pending_cover_from_file(&mut self, image: &Path) -> Result<()> {
        let artwork = Artwork::from_image_file(image)?;
        self.editor.set_pending_cover(artwork);
        Ok(())
    }

    pub fn save_metadata(&mut self) -> Result<TagRecord> {
        let saved = self.editor.save(
            self.collaborators.tags.as_ref(),
            self.library.caches_mut(),
        )?;
        Ok(saved.clone())
    }

    pub fn inference_available(&self) -> bool {
        self.collaborators.inference.is_available()
    }

    /// Streams a metadata proposal for the viewed audio file into the edit buffer.
    pub fn ai_suggest_metadata(
        &mut self,
        on_token: &mut dyn FnMut(&str),
    ) -> Result<MetadataSuggestion> {
        let current = self
            .library
            .current_path()
            .map(str::to_string)
            .ok_or_else(|| EngineError::InvalidInput("nothing is being viewed".to_string()))?;
        if self.editor.path() != Some(current.as_str()) {
            self.editor
                .open(self.collaborators.tags.as_ref(), &current)?;
        }
        let inference = self.collaborators.inference.as_ref();
        if !inference.is_available() {
            return Err(EngineError::InferenceUnavailable(
                "inference endpoint is not reachable".to_string(),
            ));
        }

        let prompt = inference::metadata_prompt(media::basename(&current), self.editor.record());
        let text = inference.generate_streamed(&prompt, on_token)?;
        let suggestion = inference::parse_metadata_suggestion(&text);
        self.editor.apply_suggestion(&suggestion);
        let _ = self.log.log(
            &eventlog::new_batch_id(),
            LogLevel::Info,
            "metadata_suggested",
            serde_json::json!({ "path": current, "empty": suggestion.is_empty() }),
        );
        Ok(suggestion)
    }
}

/// Forwards to the caller's observer and remembers every path the batch reached.
struct ReachedPaths<'a> {
    inner: &'a mut dyn BatchObserver,
    paths: Vec<String>,
}

impl<'a> ReachedPaths<'a> {
    fn new(inner: &'a mut dyn BatchObserver) -> Self {
        Self {
            inner,
            paths: Vec::new(),
        }
    }
}

impl BatchObserver for ReachedPaths<'_> {
    fn should_cancel(&mut self) -> bool {
        self.inner.should_cancel()
    }

    fn on_progress(&mut self, progress: &BatchProgress) {
        self.paths.push(progress.path.clone());
        self.inner.on_progress(progress);
    }

    fn stop_playback(&mut self, path: &str) {
        self.inner.stop_playback(path);
    }

    fn log(&mut self, batch_id: &str, level: LogLevel, event: &str, data: serde_json::Value) {
        self.inner.log(batch_id, level, event, data);
    }
}
