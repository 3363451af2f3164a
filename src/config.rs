//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix, `__` between nested keys)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER__PORT, APP_RECOGNIZER__API_KEY, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! ## Why `__` as the separator:
//! Several keys contain underscores themselves (`api_key`, `max_file_size_mb`), so a
//! single `_` cannot tell nesting apart from the key name.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration that contains all settings.
///
/// Grouped by concern so each collaborator (upload storage, ffmpeg, the
/// remote recognizer) only needs to see its own section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub uploads: UploadsConfig,
    pub media: MediaConfig,
    pub recognizer: RecognizerConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Where uploaded media is stored while a request is being handled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    /// Directory for stored uploads, created on demand
    pub dir: PathBuf,
    /// Uploads larger than this are rejected with 413
    pub max_file_size_mb: u64,
}

/// Audio extraction settings.
///
/// ## Fields:
/// - `ffmpeg_path`: Binary used to demux and decode the uploaded media
/// - `scratch_dir`: Directory that receives the per-request WAV sidecar files
/// - `sample_rate` / `channels`: Format of the extracted 16-bit PCM audio
/// - `timeout_secs`: Deadline for a single extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub ffmpeg_path: String,
    pub scratch_dir: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    pub timeout_secs: u64,
}

/// Remote speech-recognition service settings.
///
/// The service is any endpoint that speaks the OpenAI-compatible
/// `/audio/transcriptions` API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizerConfig {
    pub base_url: String,
    /// Sent as a bearer token when non-empty
    pub api_key: String,
    pub model: String,
    /// ISO 639-1 hint; empty lets the service detect the language
    pub language: String,
    pub timeout_secs: u64,
}

/// Performance tuning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Number of in-flight transcriptions considered full load
    pub max_concurrent_jobs: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            uploads: UploadsConfig {
                dir: PathBuf::from("uploads"),
                max_file_size_mb: 512,
            },
            media: MediaConfig {
                ffmpeg_path: "ffmpeg".to_string(),
                scratch_dir: PathBuf::from("."),
                sample_rate: 16000,    // What speech models are trained on
                channels: 1,
                timeout_secs: 300,
            },
            recognizer: RecognizerConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: String::new(),
                model: "whisper-1".to_string(),
                language: "en".to_string(),
                timeout_secs: 120,
            },
            performance: PerformanceConfig {
                max_concurrent_jobs: 10,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST, PORT and OPENAI_API_KEY
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_MEDIA__FFMPEG_PATH=/usr/local/bin/ffmpeg`: Use another ffmpeg
    /// - `APP_RECOGNIZER__BASE_URL=http://localhost:8000/v1`: Point at a self-hosted service
    /// - `OPENAI_API_KEY=sk-...`: Special case, fills `recognizer.api_key`
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        // Deployment platforms set these without our prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(key) = env::var("OPENAI_API_KEY") {
            settings = settings.set_override("recognizer.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Catching these at startup gives a clear message instead of a confusing
    /// failure on the first upload.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.uploads.dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Upload directory cannot be empty"));
        }

        if self.uploads.max_file_size_mb == 0 {
            return Err(anyhow::anyhow!("Maximum upload size must be greater than 0"));
        }

        if self.media.ffmpeg_path.trim().is_empty() {
            return Err(anyhow::anyhow!("ffmpeg path cannot be empty"));
        }

        if self.media.sample_rate == 0 {
            return Err(anyhow::anyhow!("Audio sample rate must be greater than 0"));
        }

        if !(1..=2).contains(&self.media.channels) {
            return Err(anyhow::anyhow!(
                "Audio channels must be 1 (mono) or 2 (stereo), got {}",
                self.media.channels
            ));
        }

        if self.media.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Extraction timeout must be greater than 0"));
        }

        if self.recognizer.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("Recognizer base URL cannot be empty"));
        }

        if self.recognizer.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Recognizer timeout must be greater than 0"));
        }

        if self.performance.max_concurrent_jobs == 0 {
            return Err(anyhow::anyhow!("Max concurrent jobs must be greater than 0"));
        }

        Ok(())
    }

    /// Upload size limit in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        self.uploads.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

impl MediaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RecognizerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that the default configuration is valid and has expected values.
    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.uploads.dir, PathBuf::from("uploads"));
        assert_eq!(config.media.sample_rate, 16000);
        assert_eq!(config.media.channels, 1);
        assert!(config.validate().is_ok());
    }

    /// Test that validation catches invalid configurations.
    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.media.channels = 6;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.recognizer.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.uploads.max_file_size_mb = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_upload_limit_in_bytes() {
        let mut config = AppConfig::default();
        config.uploads.max_file_size_mb = 2;
        assert_eq!(config.max_upload_bytes(), 2 * 1024 * 1024);
    }

    #[test]
    fn test_timeouts_are_seconds() {
        let config = AppConfig::default();
        assert_eq!(config.media.timeout(), Duration::from_secs(300));
        assert_eq!(config.recognizer.timeout(), Duration::from_secs(120));
    }
}
