//! # Upload Form Handlers
//!
//! ## Endpoints:
//! - `GET /` - the upload form
//! - `POST /` - multipart form with one file field named `file`; answers with
//!   the same page and the transcript (or an `Error occurred: ...` line)
//!
//! ## Request lifecycle for `POST /`:
//! 1. Find the `file` field (400 "No file uploaded" if absent)
//! 2. Check its filename (400 "No selected file" if empty, 400 if the extension
//!    is not allowed)
//! 3. Stream it to `uploads/` under a server-generated name
//! 4. Run a `TranscriptionJob` on it
//! 5. Remove the sidecar and the stored upload, whatever happened

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::transcriber::{extension_of, is_allowed_file, TranscriptionJob};
use actix_multipart::{Field, Multipart, MultipartError};
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Name of the multipart field carrying the media file.
const FILE_FIELD: &str = "file";

/// An uploaded file on disk, deleted when this value is dropped.
///
/// The on-disk name is `<uuid>.<ext>`; the client's filename is kept only as
/// metadata so it can never steer where the file is written.
#[derive(Debug)]
pub struct StoredUpload {
    original_name: String,
    path: PathBuf,
    size: u64,
}

impl StoredUpload {
    /// Stream a multipart field into `dir`, enforcing `max_bytes`.
    ///
    /// A partially written file is removed if anything goes wrong, because the
    /// guard already owns it by the time the first chunk is written.
    async fn save(
        field: &mut Field,
        original_name: &str,
        dir: &Path,
        max_bytes: u64,
    ) -> AppResult<Self> {
        tokio::fs::create_dir_all(dir).await?;

        let extension = extension_of(original_name).unwrap_or_default();
        let path = dir.join(format!("{}.{}", uuid::Uuid::new_v4(), extension));
        let mut file = tokio::fs::File::create(&path).await?;

        let mut upload = Self {
            original_name: original_name.to_string(),
            path,
            size: 0,
        };

        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            upload.size += chunk.len() as u64;
            if upload.size > max_bytes {
                return Err(AppError::PayloadTooLarge(format!(
                    "File exceeds the {} MB upload limit",
                    max_bytes / (1024 * 1024)
                )));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        debug!(
            upload = %upload.original_name,
            path = %upload.path.display(),
            bytes = upload.size,
            "Stored upload"
        );

        Ok(upload)
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoredUpload {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed stored upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Could not remove stored upload"),
        }
    }
}

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

/// `GET /`
pub async fn index(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(html(state.pages.index(None)?))
}

/// `POST /`
pub async fn upload(state: web::Data<AppState>, mut payload: Multipart) -> AppResult<HttpResponse> {
    let config = state.get_config();
    let mut stored: Option<StoredUpload> = None;

    while let Some(item) = payload.next().await {
        let mut field = match item {
            Ok(field) => field,
            // A body that is not multipart at all carries no file part.
            Err(MultipartError::ContentTypeMissing | MultipartError::ContentTypeIncompatible) => {
                break
            }
            Err(e) => return Err(e.into()),
        };

        // A part without a `filename` parameter is a plain form value, even when named `file`.
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let filename = match filename {
            Some(filename) if field.name() == Some(FILE_FIELD) && stored.is_none() => filename,
            _ => {
                // Unrelated form fields and repeated file fields are drained and ignored.
                while let Some(chunk) = field.next().await {
                    chunk?;
                }
                continue;
            }
        };

        if filename.is_empty() {
            return Err(AppError::BadUpload("No selected file".to_string()));
        }

        if !is_allowed_file(&filename) {
            return Err(AppError::BadUpload(format!("Unsupported file type: {}", filename)));
        }

        stored = Some(
            StoredUpload::save(
                &mut field,
                &filename,
                &config.uploads.dir,
                config.max_upload_bytes(),
            )
            .await?,
        );
    }

    let upload = stored.ok_or_else(|| AppError::BadUpload("No file uploaded".to_string()))?;
    info!(upload = %upload.original_name(), bytes = upload.size, "Upload received");

    let transcription = run_job(&state, &upload).await?;
    drop(upload);

    Ok(html(state.pages.index(Some(&transcription))?))
}

/// Run the pipeline and turn its outcome into the text shown on the page.
///
/// Pipeline failures become `Error occurred: <message>`; only problems with the
/// upload itself propagate as an HTTP error.
async fn run_job(state: &AppState, upload: &StoredUpload) -> AppResult<String> {
    let _active = state.track_job();
    let mut job = TranscriptionJob::new(upload.original_name(), upload.path(), state.pipeline.clone());
    debug!(sidecar = %job.sidecar_path().display(), "Starting transcription job");

    let outcome = job.process().await;
    job.cleanup();
    debug!(stage = %job.stage(), "Transcription job finished");

    match outcome {
        Ok(text) => Ok(text),
        Err(e) if e.is_pipeline_failure() => Ok(format!("Error occurred: {}", e)),
        Err(e) => Err(e),
    }
}
