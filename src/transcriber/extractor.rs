//! # Audio Extraction
//!
//! Pulls the audio track out of an uploaded media container and writes it as a
//! 16-bit linear PCM WAV file. Decoding and demuxing are left to `ffmpeg`,
//! which is run as a child process.
//!
//! ## Failure mapping:
//! Every problem here (binary missing, unreadable container, no audio stream,
//! output not writable, deadline exceeded) is an `AppError::MediaDecode`.

use crate::config::MediaConfig;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info};

/// How much of ffmpeg's stderr is kept in an error message.
const STDERR_TAIL_CHARS: usize = 400;

/// Something that can turn a media file into a PCM WAV file.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    /// Write the first audio stream of `source` to `target` as 16-bit PCM WAV.
    async fn extract(&self, source: &Path, target: &Path) -> AppResult<()>;
}

/// Extractor backed by the `ffmpeg` command-line tool.
#[derive(Debug, Clone)]
pub struct FfmpegAudioExtractor {
    binary: PathBuf,
    sample_rate: u32,
    channels: u16,
    timeout: Duration,
}

impl FfmpegAudioExtractor {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            binary: PathBuf::from(&config.ffmpeg_path),
            sample_rate: config.sample_rate,
            channels: config.channels,
            timeout: config.timeout(),
        }
    }

    /// Arguments for one extraction.
    ///
    /// `-map 0:a:0` makes ffmpeg fail outright when the container has no audio
    /// stream instead of producing an empty file.
    fn arguments(&self, source: &Path, target: &Path) -> Vec<String> {
        vec![
            "-nostdin".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            source.to_string_lossy().into_owned(),
            "-vn".to_string(),
            "-map".to_string(),
            "0:a:0".to_string(),
            "-acodec".to_string(),
            "pcm_s16le".to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-ac".to_string(),
            self.channels.to_string(),
            "-f".to_string(),
            "wav".to_string(),
            target.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl AudioExtractor for FfmpegAudioExtractor {
    async fn extract(&self, source: &Path, target: &Path) -> AppResult<()> {
        if !source.is_file() {
            return Err(AppError::MediaDecode(format!(
                "source file {} does not exist",
                source.display()
            )));
        }

        let start_time = Instant::now();
        debug!(
            source = %source.display(),
            target = %target.display(),
            sample_rate = self.sample_rate,
            channels = self.channels,
            "Running ffmpeg"
        );

        let child = Command::new(&self.binary)
            .args(self.arguments(source, target))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AppError::MediaDecode(format!(
                    "could not start {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                AppError::MediaDecode(format!(
                    "audio extraction timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| AppError::MediaDecode(format!("ffmpeg did not finish: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::MediaDecode(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr_tail(&stderr)
            )));
        }

        info!(
            source = %source.display(),
            duration_ms = %start_time.elapsed().as_millis(),
            "Audio extracted"
        );

        Ok(())
    }
}

/// Last part of ffmpeg's stderr, where the actual reason usually is.
fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - STDERR_TAIL_CHARS).collect()
}
