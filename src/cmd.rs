use crate::{EngineError, Result};
use std::ffi::OsStr;
use std::process::{Command, Output};

pub fn command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    configure_for_background(&mut cmd);
    cmd
}

/// Runs `cmd` to completion. A binary that cannot be spawned maps to
/// `ExternalToolMissing`, a non-zero exit to `ExternalToolFailed` with trimmed stderr.
pub fn run_checked(tool: &str, cmd: &mut Command) -> Result<Output> {
    let output = cmd.output().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => EngineError::ExternalToolMissing {
            tool: tool.to_string(),
        },
        _ => EngineError::Io(e),
    })?;

    if !output.status.success() {
        return Err(EngineError::ExternalToolFailed {
            tool: tool.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output)
}

pub fn version_first_line(program: impl AsRef<OsStr>) -> Option<String> {
    let output = command(program).arg("-version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let first = text.lines().next()?.trim();
    if first.is_empty() {
        return None;
    }
    Some(first.to_string())
}

#[cfg(windows)]
fn configure_for_background(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;

    // Transcodes run while the window has focus; keep ffmpeg from opening a console.
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn configure_for_background(_cmd: &mut Command) {}
