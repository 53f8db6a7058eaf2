use std::path::{Path, PathBuf};

use chrono::Local;
use eyre::{Result, eyre};
use tokio::fs;
use tracing::debug;

use crate::openai_client::AudioClip;

/// Resolve a user-supplied path: expands a leading `~` and makes relative
/// paths absolute against the current directory.
pub fn sanitize_path(path: &str) -> PathBuf {
    let path = path.trim();

    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            if path.len() == 1 {
                return home;
            } else if let Some(rest) = path.strip_prefix("~/") {
                return home.join(rest);
            }
        }
    }

    let path_buf = Path::new(path);
    if path_buf.is_relative() {
        if let Ok(current_dir) = std::env::current_dir() {
            return current_dir.join(path_buf);
        }
    }

    path_buf.to_path_buf()
}

/// Load a finished recording from disk.
pub async fn read_recording(path: &str) -> Result<AudioClip> {
    let path = sanitize_path(path);

    if !path.is_file() {
        return Err(eyre!("Recording not found: {}", path.display()));
    }

    let bytes = fs::read(&path)
        .await
        .map_err(|e| eyre!("Failed to read recording {}: {}", path.display(), e))?;

    if bytes.is_empty() {
        return Err(eyre!("Recording is empty: {}", path.display()));
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "recording.mp3".to_string());

    debug!("Loaded recording {} ({} bytes)", path.display(), bytes.len());
    Ok(AudioClip::new(file_name, bytes))
}

/// Writes synthesized reply audio where a player can pick it up.
pub struct AudioSink {
    dir: PathBuf,
    stamp: String,
}

impl AudioSink {
    pub async fn create(dir: &str) -> Result<Self> {
        let dir = sanitize_path(dir);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| eyre!("Failed to create output directory {}: {}", dir.display(), e))?;

        Ok(Self {
            dir,
            stamp: Local::now().format("%Y%m%d-%H%M%S").to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store one spoken sentence as `reply-<session>-<turn>-<sentence>.mp3`.
    pub async fn write(&self, turn: usize, sentence: usize, audio: &[u8]) -> Result<PathBuf> {
        let path = self
            .dir
            .join(format!("reply-{}-{:03}-{:02}.mp3", self.stamp, turn, sentence));

        fs::write(&path, audio)
            .await
            .map_err(|e| eyre!("Failed to write audio {}: {}", path.display(), e))?;

        debug!("Wrote {} bytes to {}", audio.len(), path.display());
        Ok(path)
    }
}
