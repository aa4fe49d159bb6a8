use crate::eventlog::{EventLog, LogLevel};
use crate::ffmpeg::{Mp3Quality, Transcoder};
use crate::fs_ops::FileOps;
use crate::library::Library;
use crate::media;
use crate::metadata::{self, BatchMetadataRequest};
use crate::rename::Renamer;
use crate::tags::TagCodec;
use crate::{EngineError, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOperation {
    Trash,
    Move,
    ConvertToMp3,
    WriteMetadata,
    AiRename,
}

impl BatchOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            BatchOperation::Trash => "trash",
            BatchOperation::Move => "move",
            BatchOperation::ConvertToMp3 => "convert_to_mp3",
            BatchOperation::WriteMetadata => "write_metadata",
            BatchOperation::AiRename => "ai_rename",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub index: usize,
    pub total: usize,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub operation: BatchOperation,
    pub success_count: usize,
    pub failure_count: usize,
    pub errors: Vec<ItemError>,
    pub canceled: bool,
}

impl BatchSummary {
    fn new(operation: BatchOperation) -> Self {
        Self {
            batch_id: crate::eventlog::new_batch_id(),
            operation,
            success_count: 0,
            failure_count: 0,
            errors: Vec::new(),
            canceled: false,
        }
    }

    pub fn processed(&self) -> usize {
        self.success_count + self.failure_count
    }
}

/// Hooks the driver calls while a batch runs. Every method has a no-op default.
pub trait BatchObserver {
    fn should_cancel(&mut self) -> bool {
        false
    }

    fn on_progress(&mut self, _progress: &BatchProgress) {}

    /// The viewed file is about to be moved; release any handle on it.
    fn stop_playback(&mut self, _path: &str) {}

    fn log(&mut self, _batch_id: &str, _level: LogLevel, _event: &str, _data: serde_json::Value) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Wraps an observer: log events go to the event log, a set cancel token stops
/// the batch, everything else is forwarded.
pub struct LoggedObserver<'a> {
    log: &'a EventLog,
    cancel: &'a CancelToken,
    inner: &'a mut dyn BatchObserver,
}

impl<'a> LoggedObserver<'a> {
    pub fn new(log: &'a EventLog, cancel: &'a CancelToken, inner: &'a mut dyn BatchObserver) -> Self {
        Self { log, cancel, inner }
    }
}

impl BatchObserver for LoggedObserver<'_> {
    fn should_cancel(&mut self) -> bool {
        self.cancel.is_canceled() || self.inner.should_cancel()
    }

    fn on_progress(&mut self, progress: &BatchProgress) {
        self.inner.on_progress(progress);
    }

    fn stop_playback(&mut self, path: &str) {
        self.inner.stop_playback(path);
    }

    fn log(&mut self, batch_id: &str, level: LogLevel, event: &str, data: serde_json::Value) {
        // Logging must never fail a batch.
        let _ = self.log.log(batch_id, level, event, data.clone());
        self.inner.log(batch_id, level, event, data);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconcile {
    Remove,
    Replace(String),
    Keep,
}

/// Drives `apply` over `targets` in order. `apply` receives the item path and
/// its 1-based position.
pub fn run_batch<F>(
    library: &mut Library,
    operation: BatchOperation,
    targets: Vec<String>,
    observer: &mut dyn BatchObserver,
    mut apply: F,
) -> BatchSummary
where
    F: FnMut(&str, usize) -> Result<Reconcile>,
{
    let mut summary = BatchSummary::new(operation);
    if targets.is_empty() {
        return summary;
    }

    let total = targets.len();
    observer.log(
        &summary.batch_id,
        LogLevel::Info,
        "batch_started",
        serde_json::json!({ "operation": operation.as_str(), "total": total }),
    );

    for (i, path) in targets.iter().enumerate() {
        if observer.should_cancel() {
            summary.canceled = true;
            observer.log(
                &summary.batch_id,
                LogLevel::Warn,
                "batch_canceled",
                serde_json::json!({ "processed": i, "total": total }),
            );
            break;
        }
        observer.on_progress(&BatchProgress {
            index: i + 1,
            total,
            path: path.clone(),
        });

        match apply(path, i + 1) {
            Ok(outcome) => {
                let new_path = match outcome {
                    Reconcile::Remove => {
                        library.remove(path);
                        None
                    }
                    Reconcile::Replace(new_path) => {
                        library.replace(path, &new_path);
                        Some(new_path)
                    }
                    Reconcile::Keep => None,
                };
                summary.success_count += 1;
                observer.log(
                    &summary.batch_id,
                    LogLevel::Info,
                    "item_succeeded",
                    serde_json::json!({ "path": path, "new_path": new_path }),
                );
            }
            Err(err) => {
                let message = err.to_string();
                summary.failure_count += 1;
                observer.log(
                    &summary.batch_id,
                    LogLevel::Error,
                    "item_failed",
                    serde_json::json!({ "path": path, "error": message }),
                );
                summary.errors.push(ItemError {
                    path: path.clone(),
                    message,
                });
            }
        }
    }

    observer.log(
        &summary.batch_id,
        LogLevel::Info,
        "batch_finished",
        serde_json::json!({
            "operation": operation.as_str(),
            "success_count": summary.success_count,
            "failure_count": summary.failure_count,
            "canceled": summary.canceled,
        }),
    );
    summary
}

// Playback must release the viewed file before it is moved.
fn quiesce_if_viewed(
    library: &Library,
    targets: &[String],
    quiescence: Duration,
    observer: &mut dyn BatchObserver,
) {
    let Some(current) = library.current_path() else {
        return;
    };
    if targets.iter().any(|t| t == current) {
        observer.stop_playback(current);
        if !quiescence.is_zero() {
            std::thread::sleep(quiescence);
        }
    }
}

pub fn trash_selected(
    library: &mut Library,
    fs: &dyn FileOps,
    quiescence: Duration,
    observer: &mut dyn BatchObserver,
) -> BatchSummary {
    let targets = library.batch_targets();
    quiesce_if_viewed(library, &targets, quiescence, observer);
    run_batch(library, BatchOperation::Trash, targets, observer, |path, _| {
        fs.trash(Path::new(path))?;
        Ok(Reconcile::Remove)
    })
}

pub fn move_selected(
    library: &mut Library,
    fs: &dyn FileOps,
    dest_dir: &Path,
    quiescence: Duration,
    observer: &mut dyn BatchObserver,
) -> BatchSummary {
    let targets = library.batch_targets();
    quiesce_if_viewed(library, &targets, quiescence, observer);
    run_batch(library, BatchOperation::Move, targets, observer, |path, _| {
        fs.move_to(Path::new(path), dest_dir)?;
        Ok(Reconcile::Remove)
    })
}

pub fn convert_selected_to_mp3(
    library: &mut Library,
    transcoder: &dyn Transcoder,
    quality: Mp3Quality,
    observer: &mut dyn BatchObserver,
) -> BatchSummary {
    let targets: Vec<String> = library
        .selection_snapshot()
        .into_iter()
        .filter(|p| media::is_wav(p))
        .collect();
    run_batch(
        library,
        BatchOperation::ConvertToMp3,
        targets,
        observer,
        |path, _| {
            let converted = transcoder.wav_to_mp3(Path::new(path), quality)?;
            Ok(Reconcile::Replace(
                converted.mp3_path.to_string_lossy().to_string(),
            ))
        },
    )
}

/// Writes shared tag values to the selected audio files. Track numbers follow
/// the order of the filtered batch.
pub fn apply_batch_metadata(
    library: &mut Library,
    tags: &dyn TagCodec,
    request: &BatchMetadataRequest,
    observer: &mut dyn BatchObserver,
) -> BatchSummary {
    let targets: Vec<String> = library
        .selection_snapshot()
        .into_iter()
        .filter(|p| media::is_audio(p))
        .collect();
    run_batch(
        library,
        BatchOperation::WriteMetadata,
        targets,
        observer,
        |path, position| {
            let edits = request.edits_for(path, position);
            metadata::write_merged(tags, Path::new(path), &edits, None)?;
            Ok(Reconcile::Keep)
        },
    )
}

/// Selected files whose names carry an OS duplicate marker, e.g. `Song(1).mp3`.
pub fn duplicate_candidates(library: &Library) -> Vec<String> {
    library
        .selection_snapshot()
        .into_iter()
        .filter(|p| media::has_duplicate_suffix(p))
        .collect()
}

/// Renames selected duplicates through `renamer`.
///
/// Fails with `InferenceUnavailable` before touching anything when there are
/// candidates but the renamer is offline.
pub fn ai_rename_duplicates(
    library: &mut Library,
    renamer: &dyn Renamer,
    observer: &mut dyn BatchObserver,
) -> Result<BatchSummary> {
    let targets = duplicate_candidates(library);
    if !targets.is_empty() && !renamer.is_available() {
        return Err(EngineError::InferenceUnavailable(
            "inference endpoint is not reachable".to_string(),
        ));
    }
    Ok(run_batch(
        library,
        BatchOperation::AiRename,
        targets,
        observer,
        |path, _| {
            let renamed = renamer.rename(Path::new(path))?;
            Ok(Reconcile::Replace(renamed.to_string_lossy().to_string()))
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Artwork, CacheKind};
    use crate::ffmpeg::Mp3Conversion;
    use crate::metadata::tests::MemoryTags;
    use crate::tags::TagRecord;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::path::PathBuf;

    #[derive(Default)]
    struct FakeFs {
        fail: HashSet<String>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeFs {
        fn failing(paths: &[&str]) -> Self {
            Self {
                fail: paths.iter().map(|p| p.to_string()).collect(),
                ..Self::default()
            }
        }

        fn run(&self, path: &Path, dest: PathBuf) -> Result<PathBuf> {
            let key = path.to_string_lossy().to_string();
            self.calls.borrow_mut().push(key.clone());
            if self.fail.contains(&key) {
                return Err(EngineError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "file is locked",
                )));
            }
            Ok(dest)
        }
    }

    impl FileOps for FakeFs {
        fn trash(&self, path: &Path) -> Result<PathBuf> {
            self.run(path, PathBuf::from("/trash").join(path.file_name().unwrap_or_default()))
        }

        fn move_to(&self, path: &Path, dest_dir: &Path) -> Result<PathBuf> {
            self.run(path, dest_dir.join(path.file_name().unwrap_or_default()))
        }
    }

    struct FakeTranscoder;

    impl Transcoder for FakeTranscoder {
        fn wav_to_mp3(&self, path: &Path, _quality: Mp3Quality) -> Result<Mp3Conversion> {
            let mp3_path = crate::ffmpeg::mp3_path_for(path).ok_or_else(|| {
                EngineError::UnsupportedMedia {
                    path: path.to_path_buf(),
                }
            })?;
            Ok(Mp3Conversion {
                mp3_path,
                size_bytes: 1,
            })
        }
    }

    struct FakeRenamer {
        available: bool,
    }

    impl Renamer for FakeRenamer {
        fn is_available(&self) -> bool {
            self.available
        }

        fn rename(&self, path: &Path) -> Result<PathBuf> {
            let text = path.to_string_lossy();
            Ok(PathBuf::from(format!(
                "{}/Renamed {}{}",
                media::parent(&text),
                media::stem(&text).len(),
                media::extension(&text)
            )))
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        cancel_after: Option<usize>,
        progress: Vec<BatchProgress>,
        stopped: Vec<String>,
        events: Vec<String>,
    }

    impl BatchObserver for RecordingObserver {
        fn should_cancel(&mut self) -> bool {
            self.cancel_after
                .is_some_and(|limit| self.progress.len() >= limit)
        }

        fn on_progress(&mut self, progress: &BatchProgress) {
            self.progress.push(progress.clone());
        }

        fn stop_playback(&mut self, path: &str) {
            self.stopped.push(path.to_string());
        }

        fn log(&mut self, _batch_id: &str, _level: LogLevel, event: &str, _data: serde_json::Value) {
            self.events.push(event.to_string());
        }
    }

    fn lib(paths: &[&str]) -> Library {
        let mut library = Library::new();
        library.load(paths.iter().map(|p| p.to_string()).collect(), "test");
        library
    }

    fn select(library: &mut Library, paths: &[&str]) {
        for p in paths {
            library.toggle_select(p);
        }
    }

    #[test]
    fn every_batch_is_a_no_op_on_empty_selection() {
        let mut library = lib(&["/m/a.wav", "/m/b(1).mp3"]);
        let before = library.paths().to_vec();
        let mut observer = RecordingObserver::default();

        let convert = convert_selected_to_mp3(
            &mut library,
            &FakeTranscoder,
            Mp3Quality::V2,
            &mut observer,
        );
        let tags = MemoryTags::default();
        let meta = apply_batch_metadata(
            &mut library,
            &tags,
            &BatchMetadataRequest::default(),
            &mut observer,
        );
        let rename = ai_rename_duplicates(
            &mut library,
            &FakeRenamer { available: false },
            &mut observer,
        )
        .expect("empty rename batch");

        for summary in [convert, meta, rename] {
            assert_eq!((summary.success_count, summary.failure_count), (0, 0));
            assert!(!summary.canceled);
        }
        assert_eq!(library.paths(), before.as_slice());
        assert!(observer.events.is_empty());
        assert_eq!(*tags.writes.borrow(), 0);
    }

    #[test]
    fn trash_and_move_are_no_ops_with_nothing_loaded() {
        let mut library = Library::new();
        let fs = FakeFs::default();
        let trash = trash_selected(&mut library, &fs, Duration::ZERO, &mut NoopObserver);
        let moved = move_selected(
            &mut library,
            &fs,
            Path::new("/dest"),
            Duration::ZERO,
            &mut NoopObserver,
        );
        assert_eq!(trash.processed(), 0);
        assert_eq!(moved.processed(), 0);
        assert!(fs.calls.borrow().is_empty());
    }

    #[test]
    fn convert_replaces_wav_in_place() {
        let mut library = lib(&["/m/a.wav", "/m/b.mp3"]);
        select(&mut library, &["/m/a.wav", "/m/b.mp3"]);
        library
            .caches_mut()
            .put(CacheKind::Thumbnail, "/m/a.wav", Artwork::new("image/jpeg", vec![1]));

        let summary = convert_selected_to_mp3(
            &mut library,
            &FakeTranscoder,
            Mp3Quality::V0,
            &mut NoopObserver,
        );

        assert_eq!((summary.success_count, summary.failure_count), (1, 0));
        assert_eq!(library.paths(), ["/m/a.mp3", "/m/b.mp3"]);
        assert!(library.is_selected("/m/a.mp3"));
        assert!(!library.is_selected("/m/a.wav"));
        assert!(library.caches().get(CacheKind::Thumbnail, "/m/a.wav").is_none());
    }

    #[test]
    fn trash_partial_failure_keeps_failed_items() {
        let mut library = lib(&["/m/a.mp3", "/m/b.mp3", "/m/c.mp3", "/m/d.mp3"]);
        library.set_current(3);
        select(&mut library, &["/m/a.mp3", "/m/b.mp3", "/m/c.mp3"]);
        let fs = FakeFs::failing(&["/m/b.mp3"]);

        let summary = trash_selected(&mut library, &fs, Duration::ZERO, &mut NoopObserver);

        assert_eq!((summary.success_count, summary.failure_count), (2, 1));
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].path, "/m/b.mp3");
        assert!(summary.errors[0].message.contains("file is locked"));
        assert_eq!(library.paths(), ["/m/b.mp3", "/m/d.mp3"]);
        assert!(library.is_selected("/m/b.mp3"));
        assert_eq!(library.current_path(), Some("/m/d.mp3"));
        assert_eq!(*fs.calls.borrow(), ["/m/a.mp3", "/m/b.mp3", "/m/c.mp3"]);
    }

    #[test]
    fn trash_without_selection_targets_viewed_file_and_stops_playback() {
        let mut library = lib(&["/m/a.mp4", "/m/b.mp4", "/m/c.mp4"]);
        library.set_current(2);
        let fs = FakeFs::default();
        let mut observer = RecordingObserver::default();

        let summary = trash_selected(&mut library, &fs, Duration::from_millis(1), &mut observer);

        assert_eq!(summary.success_count, 1);
        assert_eq!(observer.stopped, ["/m/c.mp4"]);
        assert_eq!(library.paths(), ["/m/a.mp4", "/m/b.mp4"]);
        assert_eq!(library.current_path(), Some("/m/b.mp4"));
    }

    #[test]
    fn move_leaves_playback_alone_when_viewed_file_is_not_targeted() {
        let mut library = lib(&["/m/a.mp4", "/m/b.mp4"]);
        select(&mut library, &["/m/b.mp4"]);
        let mut observer = RecordingObserver::default();

        let summary = move_selected(
            &mut library,
            &FakeFs::default(),
            Path::new("/dest"),
            Duration::ZERO,
            &mut observer,
        );
        assert_eq!(summary.success_count, 1);
        assert!(observer.stopped.is_empty());
        assert_eq!(library.current_path(), Some("/m/a.mp4"));
    }

    #[test]
    fn trashing_everything_leaves_no_viewed_item() {
        let mut library = lib(&["/m/a.png", "/m/b.png"]);
        library.select_all();
        let summary = trash_selected(
            &mut library,
            &FakeFs::default(),
            Duration::ZERO,
            &mut NoopObserver,
        );
        assert_eq!(summary.success_count, 2);
        assert!(library.is_empty());
        assert_eq!(library.current_index(), None);
    }

    #[test]
    fn cancel_stops_before_next_item_and_keeps_processed_state() {
        let mut library = lib(&["/m/a.mp3", "/m/b.mp3", "/m/c.mp3"]);
        library.select_all();
        let fs = FakeFs::default();
        let mut observer = RecordingObserver {
            cancel_after: Some(1),
            ..RecordingObserver::default()
        };

        let summary = trash_selected(&mut library, &fs, Duration::ZERO, &mut observer);

        assert!(summary.canceled);
        assert_eq!(summary.processed(), 1);
        assert_eq!(library.paths(), ["/m/b.mp3", "/m/c.mp3"]);
        assert!(library.is_selected("/m/b.mp3"));
        assert_eq!(
            observer.events,
            ["batch_started", "item_succeeded", "batch_canceled", "batch_finished"]
        );
    }

    #[test]
    fn progress_is_monotonic_and_complete() {
        let mut library = lib(&["/m/a.wav", "/m/b.wav", "/m/c.mp3"]);
        library.select_all();
        let mut observer = RecordingObserver::default();

        convert_selected_to_mp3(&mut library, &FakeTranscoder, Mp3Quality::V2, &mut observer);

        let indices: Vec<(usize, usize)> =
            observer.progress.iter().map(|p| (p.index, p.total)).collect();
        assert_eq!(indices, [(1, 2), (2, 2)]);
        assert_eq!(observer.progress[1].path, "/m/b.wav");
    }

    #[test]
    fn batch_metadata_numbers_audio_in_snapshot_order() {
        let mut library = lib(&["/m/01 Intro.mp3", "/m/cover.jpg", "/m/02 Outro.flac"]);
        library.select_all();
        let tags = MemoryTags::with(
            "/m/02 Outro.flac",
            TagRecord {
                artist: "Keep Me".to_string(),
                comment: "liner".to_string(),
                ..TagRecord::default()
            },
        );
        let request = BatchMetadataRequest {
            artist: Some(String::new()),
            album: Some("Night Roads".to_string()),
            genre: None,
            title_from_filename: true,
            auto_number: true,
        };

        let summary = apply_batch_metadata(&mut library, &tags, &request, &mut NoopObserver);

        assert_eq!((summary.success_count, summary.failure_count), (2, 0));
        let first = tags.get("/m/01 Intro.mp3");
        assert_eq!((first.title.as_str(), first.track_number.as_str()), ("Intro", "1"));
        let second = tags.get("/m/02 Outro.flac");
        assert_eq!(second.title, "Outro");
        assert_eq!(second.track_number, "2");
        assert_eq!(second.artist, "Keep Me");
        assert_eq!(second.album, "Night Roads");
        assert_eq!(second.comment, "liner");
        assert_eq!(library.len(), 3);
    }

    #[test]
    fn ai_rename_only_touches_duplicates() {
        let mut library = lib(&["/m/Song.mp3", "/m/Song(1).mp3", "/m/Track(2).wav"]);
        library.select_all();
        assert_eq!(
            duplicate_candidates(&library),
            ["/m/Song(1).mp3", "/m/Track(2).wav"]
        );

        let summary = ai_rename_duplicates(
            &mut library,
            &FakeRenamer { available: true },
            &mut NoopObserver,
        )
        .expect("rename batch");

        assert_eq!(summary.success_count, 2);
        assert_eq!(
            library.paths(),
            ["/m/Song.mp3", "/m/Renamed 7.mp3", "/m/Renamed 8.wav"]
        );
        assert!(library.is_selected("/m/Renamed 7.mp3"));
        assert!(!library.is_selected("/m/Song(1).mp3"));
    }

    #[test]
    fn ai_rename_reports_unavailable_without_mutating() {
        let mut library = lib(&["/m/Song(1).mp3"]);
        library.select_all();
        let err = ai_rename_duplicates(
            &mut library,
            &FakeRenamer { available: false },
            &mut NoopObserver,
        )
        .expect_err("offline");
        assert!(matches!(err, EngineError::InferenceUnavailable(_)));
        assert_eq!(library.paths(), ["/m/Song(1).mp3"]);
    }

    #[test]
    fn logged_observer_writes_events_and_honors_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = EventLog::with_policy(dir.path().to_path_buf(), Default::default());
        let token = CancelToken::new();
        let mut inner = RecordingObserver::default();

        let mut library = lib(&["/m/a.mp3", "/m/b.mp3"]);
        library.select_all();
        {
            let mut observer = LoggedObserver::new(&log, &token, &mut inner);
            let summary =
                trash_selected(&mut library, &FakeFs::default(), Duration::ZERO, &mut observer);
            assert_eq!(summary.success_count, 2);
        }
        let text = std::fs::read_to_string(log.path()).expect("log file");
        assert_eq!(text.lines().count(), 4);
        assert_eq!(inner.events.len(), 4);

        token.cancel();
        library.load(vec!["/m/c.mp3".to_string()], "again");
        library.select_all();
        let mut observer = LoggedObserver::new(&log, &token, &mut inner);
        let summary = trash_selected(&mut library, &FakeFs::default(), Duration::ZERO, &mut observer);
        assert!(summary.canceled);
        assert_eq!(library.len(), 1);
    }
}
