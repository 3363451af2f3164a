//! # Transcriber Module
//!
//! Turns one uploaded media file into a transcript.
//!
//! ## Key Components:
//! - **Allow-list**: which file suffixes are accepted at all
//! - **Extractor**: media container → 16-bit PCM WAV sidecar (ffmpeg)
//! - **WAV loading**: the sidecar read back as one in-memory buffer
//! - **Recognizer**: WAV bytes → text via a remote speech-to-text service
//! - **Pipeline**: the per-request job tying the steps together and owning cleanup

pub mod allow_list;
pub mod extractor;
pub mod pipeline;
pub mod recognizer;
pub mod wav_audio;

pub use allow_list::{extension_of, is_allowed_file};
pub use extractor::FfmpegAudioExtractor;
pub use pipeline::{PipelineContext, TranscriptionJob};
pub use recognizer::HttpSpeechRecognizer;
