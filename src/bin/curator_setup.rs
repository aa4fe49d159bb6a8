use std::path::PathBuf;

use curator_engine::paths::AppPaths;
use curator_engine::{config, tools};

fn main() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return Ok(());
    }

    let mut base_dir: Option<PathBuf> = None;
    let mut install_ffmpeg = false;
    let mut check_inference = false;
    let mut status_only = false;
    let mut force = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--base-dir" => {
                i += 1;
                let v = args
                    .get(i)
                    .ok_or_else(|| "--base-dir requires a value".to_string())?;
                base_dir = Some(PathBuf::from(v));
            }
            "--install-ffmpeg" => install_ffmpeg = true,
            "--check-inference" => check_inference = true,
            "--status" => status_only = true,
            "--force" => force = true,
            other => return Err(format!("unknown arg: {other} (try --help)")),
        }
        i += 1;
    }

    if !install_ffmpeg && !check_inference && !status_only {
        return Err("nothing to do (pass --status, --install-ffmpeg or --check-inference)".to_string());
    }

    let base_dir = base_dir
        .or_else(default_base_dir)
        .ok_or_else(|| "could not determine base dir; pass --base-dir".to_string())?;

    let paths = AppPaths::new(base_dir);
    paths.ensure_dirs().map_err(|e| e.to_string())?;

    let settings_path = paths.settings_path();
    let settings = config::load_settings(&paths).map_err(|e| e.to_string())?;
    if !settings_path.exists() {
        config::save_settings(&paths, &settings).map_err(|e| e.to_string())?;
    }

    println!("Base dir: {}", paths.base_dir.to_string_lossy());
    println!("Settings: {}", settings_path.to_string_lossy());

    if status_only {
        print_json("ffmpeg", &tools::ffmpeg_tools_status(&paths))?;
    }

    if install_ffmpeg {
        let status = tools::ffmpeg_tools_status(&paths);
        if status.installed && !force {
            println!("FFmpeg: already installed ({})", status.ffmpeg_path);
        } else {
            println!("FFmpeg: installing...");
            let next = tools::install_ffmpeg_tools(&paths).map_err(|e| e.to_string())?;
            println!("FFmpeg: installed ({})", next.ffmpeg_path);
        }
    }

    if check_inference {
        let status = tools::inference_status(&settings);
        print_json("inference", &status)?;
        if !status.available {
            return Err(format!("inference endpoint {} is not reachable", status.base_url));
        }
    }

    Ok(())
}

fn print_json(label: &str, value: &impl serde::Serialize) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{label}: {text}");
    Ok(())
}

fn default_base_dir() -> Option<PathBuf> {
    if let Ok(v) = std::env::var("CURATOR_BASE_DIR") {
        let t = v.trim();
        if !t.is_empty() {
            return Some(PathBuf::from(t));
        }
    }

    if cfg!(windows) {
        if let Ok(appdata) = std::env::var("APPDATA") {
            let t = appdata.trim();
            if !t.is_empty() {
                return Some(PathBuf::from(t).join("curator"));
            }
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let t = home.trim();
        if !t.is_empty() {
            return Some(PathBuf::from(t).join(".local").join("share").join("curator"));
        }
    }

    None
}

fn print_help() {
    println!(
        r#"curator_setup

Prepares the app data directory and checks the external tools the curator relies on.

Usage:
  cargo run --bin curator_setup -- --status
  cargo run --bin curator_setup -- --install-ffmpeg
  cargo run --bin curator_setup -- --check-inference

Options:
  --base-dir <path>     Override base dir (default: $CURATOR_BASE_DIR, then %APPDATA%\curator or ~/.local/share/curator)
  --status              Print FFmpeg tool status as JSON
  --install-ffmpeg      Install FFmpeg tools into <base-dir>/tools/ffmpeg
  --check-inference     Query the configured inference endpoint for its models
  --force               Reinstall even if present
"#
    );
}
