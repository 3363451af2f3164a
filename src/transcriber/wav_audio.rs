//! # WAV Sidecar Loading
//!
//! Reads the extracted WAV file into memory as a single recognition buffer and
//! checks that it is the 16-bit PCM audio the extractor was asked for.

use crate::error::{AppError, AppResult};
use std::io::Cursor;
use std::path::Path;

/// A whole WAV file held in memory, plus what its header says about it.
#[derive(Debug, Clone)]
pub struct WavAudio {
    /// The file exactly as written to disk; this is what gets uploaded
    pub bytes: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per channel
    pub frames: usize,
}

impl WavAudio {
    /// Load and verify a WAV file.
    ///
    /// ## Errors:
    /// - `MediaDecode` if the file is missing or not a 16-bit PCM WAV
    /// - `RecognitionService` if it parses but holds no samples, since there is
    ///   nothing a recognizer could hear
    pub async fn load(path: &Path) -> AppResult<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            AppError::MediaDecode(format!("could not read {}: {}", path.display(), e))
        })?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> AppResult<Self> {
        let mut cursor = Cursor::new(&bytes);
        let (header, data) = wav::read(&mut cursor)
            .map_err(|e| AppError::MediaDecode(format!("extracted audio is not a WAV file: {}", e)))?;

        if header.audio_format != wav::WAV_FORMAT_PCM || header.bits_per_sample != 16 {
            return Err(AppError::MediaDecode(format!(
                "extracted audio is not 16-bit PCM (format {}, {} bits)",
                header.audio_format, header.bits_per_sample
            )));
        }

        if header.channel_count == 0 || header.sampling_rate == 0 {
            return Err(AppError::MediaDecode(
                "extracted audio has an invalid header".to_string(),
            ));
        }

        let samples = data.as_sixteen().map(|s| s.len()).unwrap_or(0);
        if samples == 0 {
            return Err(AppError::RecognitionService(
                "audio track is empty".to_string(),
            ));
        }

        Ok(Self {
            sample_rate: header.sampling_rate,
            channels: header.channel_count,
            frames: samples / header.channel_count as usize,
            bytes,
        })
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }
}

/// Encode 16-bit samples as a WAV file in memory.
#[cfg(test)]
pub fn encode_pcm16(sample_rate: u32, channels: u16, samples: Vec<i16>) -> Vec<u8> {
    let header = wav::Header::new(wav::WAV_FORMAT_PCM, channels, sample_rate, 16);
    let mut cursor = Cursor::new(Vec::new());
    wav::write(header, &wav::BitDepth::Sixteen(samples), &mut cursor).unwrap();
    cursor.into_inner()
}
