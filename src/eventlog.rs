use crate::paths::AppPaths;
use crate::Result;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const EVENT_LOG_FILE_NAME: &str = "curator.jsonl";
const EVENT_LOG_ROTATE_BYTES: u64 = 10 * 1024 * 1024;
const EVENT_LOG_MAX_BACKUPS: usize = 3;
const EVENT_LOG_MAX_AGE_DAYS: u64 = 30;
const EVENT_LOG_TOTAL_CAP_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogRetentionPolicy {
    pub rotate_bytes: u64,
    pub max_backups: usize,
    pub max_age_days: u64,
    pub total_cap_bytes: u64,
}

impl Default for LogRetentionPolicy {
    fn default() -> Self {
        Self {
            rotate_bytes: EVENT_LOG_ROTATE_BYTES,
            max_backups: EVENT_LOG_MAX_BACKUPS,
            max_age_days: EVENT_LOG_MAX_AGE_DAYS,
            total_cap_bytes: EVENT_LOG_TOTAL_CAP_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Append-only JSON-lines log of batch activity.
#[derive(Debug, Clone)]
pub struct EventLog {
    dir: PathBuf,
    policy: LogRetentionPolicy,
}

impl EventLog {
    pub fn new(paths: &AppPaths) -> Self {
        Self::with_policy(paths.logs_dir(), LogRetentionPolicy::default())
    }

    pub fn with_policy(dir: PathBuf, policy: LogRetentionPolicy) -> Self {
        Self { dir, policy }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(EVENT_LOG_FILE_NAME)
    }

    pub fn policy(&self) -> LogRetentionPolicy {
        self.policy
    }

    pub fn log(
        &self,
        batch_id: &str,
        level: LogLevel,
        event: &str,
        data: serde_json::Value,
    ) -> Result<()> {
        let line = serde_json::json!({
            "ts_ms": now_ms(),
            "batch_id": batch_id,
            "level": level.as_str(),
            "event": event,
            "data": data
        })
        .to_string();

        let path = self.path();
        std::fs::create_dir_all(&self.dir)?;
        self.rotate_if_needed(&path)?;
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?
            .write_all(format!("{line}\n").as_bytes())?;
        Ok(())
    }

    fn rotate_if_needed(&self, path: &Path) -> Result<()> {
        let len = match std::fs::metadata(path) {
            Ok(m) => m.len(),
            Err(_) => return Ok(()),
        };
        if len < self.policy.rotate_bytes {
            return Ok(());
        }
        rotate_file_backups(path, self.policy.max_backups)?;
        Ok(())
    }

    /// Drops files older than the age limit, then the oldest remaining files
    /// until the directory fits under the total cap.
    pub fn prune(&self) -> Result<()> {
        if !self.dir.exists() {
            return Ok(());
        }

        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(self.policy.max_age_days * 24 * 60 * 60))
            .unwrap_or(UNIX_EPOCH);

        let mut candidates: Vec<(PathBuf, SystemTime, u64)> = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let Ok(entry) = entry else { continue };
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().unwrap_or(UNIX_EPOCH);
            let path = entry.path();
            if modified < cutoff {
                let _ = std::fs::remove_file(&path);
                continue;
            }
            candidates.push((path, modified, meta.len()));
        }

        candidates.sort_by_key(|(_, modified, _)| *modified);
        let mut total: u64 = candidates.iter().map(|(_, _, size)| *size).sum();
        for (path, _modified, size) in candidates {
            if total <= self.policy.total_cap_bytes {
                break;
            }
            let _ = std::fs::remove_file(&path);
            total = total.saturating_sub(size);
        }
        Ok(())
    }
}

pub fn new_batch_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn rotate_file_backups(path: &Path, max_backups: usize) -> std::io::Result<()> {
    if max_backups == 0 {
        let _ = std::fs::remove_file(path);
        return Ok(());
    }

    for i in (1..=max_backups).rev() {
        let dst = path_with_suffix(path, &format!(".{i}"));
        let src = if i == 1 {
            path.to_path_buf()
        } else {
            path_with_suffix(path, &format!(".{}", i - 1))
        };
        if !src.exists() {
            continue;
        }
        if dst.exists() {
            let _ = std::fs::remove_file(&dst);
        }
        std::fs::rename(src, dst)?;
    }
    Ok(())
}

fn path_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let file_name = match path.file_name() {
        Some(n) => n.to_string_lossy().to_string(),
        None => suffix.to_string(),
    };
    path.with_file_name(format!("{file_name}{suffix}"))
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
