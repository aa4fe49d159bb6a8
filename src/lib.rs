pub mod batch;
pub mod cache;
pub mod cmd;
pub mod config;
mod error;
pub mod eventlog;
pub mod ffmpeg;
pub mod fs_ops;
pub mod inference;
pub mod library;
pub mod media;
pub mod metadata;
pub mod paths;
pub mod rename;
pub mod session;
pub mod tags;
pub mod tools;

pub use error::{EngineError, Result};
