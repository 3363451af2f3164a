//! # Transcription Pipeline
//!
//! One `TranscriptionJob` carries a single uploaded file through
//! validate → extract audio → transcribe, and owns the WAV sidecar it creates
//! along the way.
//!
//! ## Stage transitions:
//! `Idle → Validating → Extracting → Transcribing → Succeeded | Failed → CleanedUp`
//!
//! Any stage can go straight to `CleanedUp`. There is no retry edge: a failure
//! ends the job.
//!
//! ## Resource ownership:
//! The sidecar path is unique to the job and is removed by `cleanup()`, which
//! `Drop` also calls. Release is therefore tied to the job's lifetime rather
//! than to the caller remembering a cleanup step on every exit path.

use crate::error::{AppError, AppResult};
use crate::transcriber::allow_list::is_allowed_file;
use crate::transcriber::extractor::AudioExtractor;
use crate::transcriber::recognizer::SpeechRecognizer;
use crate::transcriber::wav_audio::WavAudio;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Idle,
    Validating,
    Extracting,
    Transcribing,
    Succeeded,
    Failed,
    CleanedUp,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStage::Idle => "idle",
            JobStage::Validating => "validating",
            JobStage::Extracting => "extracting",
            JobStage::Transcribing => "transcribing",
            JobStage::Succeeded => "succeeded",
            JobStage::Failed => "failed",
            JobStage::CleanedUp => "cleaned_up",
        };
        f.write_str(label)
    }
}

/// The collaborators a job needs, shared by every request.
#[derive(Clone)]
pub struct PipelineContext {
    pub extractor: Arc<dyn AudioExtractor>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    /// Directory that receives sidecar files
    pub scratch_dir: PathBuf,
    /// Deadline for the remote recognition call
    pub recognition_timeout: Duration,
}

/// Pipeline state for one uploaded file.
pub struct TranscriptionJob {
    /// Name the client gave the file; only used for validation and logs
    original_name: String,
    source: PathBuf,
    sidecar: PathBuf,
    context: PipelineContext,
    stage: JobStage,
}

impl TranscriptionJob {
    /// Create a job for `source`. Nothing touches the disk until `process`.
    pub fn new(original_name: impl Into<String>, source: impl Into<PathBuf>, context: PipelineContext) -> Self {
        let sidecar = context
            .scratch_dir
            .join(format!("extracted_audio-{}.wav", uuid::Uuid::new_v4()));

        Self {
            original_name: original_name.into(),
            source: source.into(),
            sidecar,
            context,
            stage: JobStage::Idle,
        }
    }

    pub fn stage(&self) -> JobStage {
        self.stage
    }

    /// Where this job writes (or wrote) its extracted audio.
    pub fn sidecar_path(&self) -> &Path {
        &self.sidecar
    }

    fn enter(&mut self, stage: JobStage) {
        debug!(
            upload = %self.original_name,
            from = %self.stage,
            to = %stage,
            "Job stage change"
        );
        self.stage = stage;
    }

    /// Reject files whose extension is not on the allow-list.
    pub fn validate(&mut self) -> AppResult<()> {
        self.enter(JobStage::Validating);
        if is_allowed_file(&self.original_name) {
            Ok(())
        } else {
            Err(AppError::BadUpload(format!(
                "Unsupported file type: {}",
                self.original_name
            )))
        }
    }

    /// Write the source's audio track to the sidecar as 16-bit PCM WAV.
    pub async fn extract_audio(&mut self) -> AppResult<PathBuf> {
        self.enter(JobStage::Extracting);
        self.context
            .extractor
            .extract(&self.source, &self.sidecar)
            .await?;
        Ok(self.sidecar.clone())
    }

    /// Send the whole sidecar to the recognizer and return its transcript.
    ///
    /// The call is bounded by `recognition_timeout`; running out of time is a
    /// `RecognitionService` error like any other service failure.
    pub async fn transcribe(&mut self) -> AppResult<String> {
        self.enter(JobStage::Transcribing);

        let audio = WavAudio::load(&self.sidecar).await?;
        debug!(
            upload = %self.original_name,
            sample_rate = audio.sample_rate,
            channels = audio.channels,
            duration_secs = audio.duration_secs(),
            "Loaded extracted audio"
        );

        let timeout = self.context.recognition_timeout;
        let text = tokio::time::timeout(timeout, self.context.recognizer.recognize(audio.bytes))
            .await
            .map_err(|_| {
                AppError::RecognitionService(format!(
                    "no response from the recognizer within {}s",
                    timeout.as_secs_f64()
                ))
            })??;

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(AppError::RecognitionService(
                "no speech could be recognized in the audio".to_string(),
            ));
        }

        Ok(text)
    }

    /// Run the whole pipeline. The caller still owes a `cleanup()`.
    pub async fn process(&mut self) -> AppResult<String> {
        let outcome = self.run_stages().await;

        match &outcome {
            Ok(text) => {
                self.enter(JobStage::Succeeded);
                info!(upload = %self.original_name, chars = text.len(), "Transcription succeeded");
            }
            Err(e) => {
                self.enter(JobStage::Failed);
                warn!(upload = %self.original_name, error = %e, kind = e.kind(), "Transcription failed");
            }
        }

        outcome
    }

    async fn run_stages(&mut self) -> AppResult<String> {
        self.validate()?;
        self.extract_audio().await?;
        self.transcribe().await
    }

    /// Delete the sidecar if it exists. Safe to call any number of times.
    pub fn cleanup(&mut self) {
        match std::fs::remove_file(&self.sidecar) {
            Ok(()) => debug!(path = %self.sidecar.display(), "Removed extracted audio"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.sidecar.display(),
                error = %e,
                "Could not remove extracted audio"
            ),
        }

        if self.stage != JobStage::CleanedUp {
            self.enter(JobStage::CleanedUp);
        }
    }
}

impl Drop for TranscriptionJob {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Stand-ins for ffmpeg and the remote service.

    use super::*;
    use crate::transcriber::wav_audio::encode_pcm16;
    use async_trait::async_trait;

    /// Writes a short WAV to the target instead of running ffmpeg.
    pub struct FakeExtractor {
        pub samples: usize,
    }

    #[async_trait]
    impl AudioExtractor for FakeExtractor {
        async fn extract(&self, source: &Path, target: &Path) -> AppResult<()> {
            if !source.is_file() {
                return Err(AppError::MediaDecode("source missing".to_string()));
            }
            let bytes = encode_pcm16(16000, 1, vec![1200; self.samples]);
            tokio::fs::write(target, bytes).await?;
            Ok(())
        }
    }

    /// Fails like ffmpeg does on a corrupt file, after leaving a partial output behind.
    pub struct BrokenExtractor;

    #[async_trait]
    impl AudioExtractor for BrokenExtractor {
        async fn extract(&self, _source: &Path, target: &Path) -> AppResult<()> {
            tokio::fs::write(target, b"partial").await?;
            Err(AppError::MediaDecode(
                "Invalid data found when processing input".to_string(),
            ))
        }
    }

    /// Answers every request with the same text.
    pub struct FixedRecognizer {
        pub text: &'static str,
    }

    #[async_trait]
    impl SpeechRecognizer for FixedRecognizer {
        async fn recognize(&self, wav_bytes: Vec<u8>) -> AppResult<String> {
            assert!(wav_bytes.starts_with(b"RIFF"));
            Ok(self.text.to_string())
        }

        fn name(&self) -> String {
            "fixed".to_string()
        }
    }

    /// Never answers in time.
    pub struct StalledRecognizer;

    #[async_trait]
    impl SpeechRecognizer for StalledRecognizer {
        async fn recognize(&self, _wav_bytes: Vec<u8>) -> AppResult<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".to_string())
        }

        fn name(&self) -> String {
            "stalled".to_string()
        }
    }

    pub fn context(
        scratch_dir: &Path,
        extractor: impl AudioExtractor + 'static,
        recognizer: impl SpeechRecognizer + 'static,
    ) -> PipelineContext {
        PipelineContext {
            extractor: Arc::new(extractor),
            recognizer: Arc::new(recognizer),
            scratch_dir: scratch_dir.to_path_buf(),
            recognition_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn source_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"media bytes").unwrap();
        path
    }

    #[tokio::test]
    async fn test_process_returns_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_file(dir.path(), "upload.mp4");
        let ctx = context(
            dir.path(),
            FakeExtractor { samples: 16000 },
            FixedRecognizer { text: " hello world " },
        );

        let mut job = TranscriptionJob::new("Hello.MP4", &source, ctx);
        let text = job.process().await.unwrap();

        assert_eq!(text, "hello world");
        assert_eq!(job.stage(), JobStage::Succeeded);
        assert!(job.sidecar_path().exists());

        job.cleanup();
        assert!(!job.sidecar_path().exists());
        assert_eq!(job.stage(), JobStage::CleanedUp);
    }

    #[tokio::test]
    async fn test_disallowed_extension_never_reaches_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_file(dir.path(), "upload.txt");
        let ctx = context(
            dir.path(),
            FakeExtractor { samples: 16000 },
            FixedRecognizer { text: "hello" },
        );

        let mut job = TranscriptionJob::new("notes.txt", &source, ctx);
        let result = job.process().await;

        assert!(matches!(result, Err(AppError::BadUpload(_))));
        assert_eq!(job.stage(), JobStage::Failed);
        assert!(!job.sidecar_path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_media_is_media_decode_error_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_file(dir.path(), "upload.mkv");
        let ctx = context(dir.path(), BrokenExtractor, FixedRecognizer { text: "hello" });

        let mut job = TranscriptionJob::new("broken.mkv", &source, ctx);
        let result = job.process().await;

        assert!(matches!(result, Err(AppError::MediaDecode(_))));
        assert!(job.sidecar_path().exists());
        job.cleanup();
        assert!(!job.sidecar_path().exists());
    }

    #[tokio::test]
    async fn test_silent_audio_is_recognition_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_file(dir.path(), "upload.wav");
        let ctx = context(
            dir.path(),
            FakeExtractor { samples: 16000 },
            FixedRecognizer { text: "   " },
        );

        let mut job = TranscriptionJob::new("quiet.wav", &source, ctx);
        let result = job.process().await;

        assert!(matches!(result, Err(AppError::RecognitionService(_))));
    }

    #[tokio::test]
    async fn test_empty_audio_track_is_recognition_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_file(dir.path(), "upload.mp3");
        let ctx = context(
            dir.path(),
            FakeExtractor { samples: 0 },
            FixedRecognizer { text: "hello" },
        );

        let mut job = TranscriptionJob::new("empty.mp3", &source, ctx);
        let result = job.process().await;

        assert!(matches!(result, Err(AppError::RecognitionService(_))));
    }

    #[tokio::test]
    async fn test_slow_recognizer_hits_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_file(dir.path(), "upload.ogg");
        let mut ctx = context(dir.path(), FakeExtractor { samples: 1600 }, StalledRecognizer);
        ctx.recognition_timeout = Duration::from_millis(50);

        let mut job = TranscriptionJob::new("talk.ogg", &source, ctx);
        let result = job.process().await;

        assert!(matches!(result, Err(AppError::RecognitionService(_))));
    }

    #[tokio::test]
    async fn test_cleanup_twice_is_safe() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            dir.path(),
            FakeExtractor { samples: 16 },
            FixedRecognizer { text: "hi" },
        );

        let mut job = TranscriptionJob::new("never-run.mp4", dir.path().join("x.mp4"), ctx);
        job.cleanup();
        job.cleanup();
        assert_eq!(job.stage(), JobStage::CleanedUp);
    }

    #[tokio::test]
    async fn test_drop_removes_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_file(dir.path(), "upload.mov");
        let ctx = context(
            dir.path(),
            FakeExtractor { samples: 1600 },
            FixedRecognizer { text: "hi" },
        );

        let sidecar = {
            let mut job = TranscriptionJob::new("clip.mov", &source, ctx);
            job.extract_audio().await.unwrap();
            assert!(job.sidecar_path().exists());
            job.sidecar_path().to_path_buf()
        };

        assert!(!sidecar.exists());
    }

    #[test]
    fn test_sidecar_paths_are_unique_per_job() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            dir.path(),
            FakeExtractor { samples: 16 },
            FixedRecognizer { text: "hi" },
        );

        let a = TranscriptionJob::new("a.mp4", "a.mp4", ctx.clone());
        let b = TranscriptionJob::new("b.mp4", "b.mp4", ctx);
        assert_ne!(a.sidecar_path(), b.sidecar_path());
        assert!(a.sidecar_path().starts_with(dir.path()));
    }
}
