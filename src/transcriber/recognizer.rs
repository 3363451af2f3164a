//! # Remote Speech Recognition
//!
//! The transcript comes from a hosted speech-to-text service. The pipeline only
//! sees the `SpeechRecognizer` trait: WAV bytes in, best-guess text out.
//!
//! `HttpSpeechRecognizer` speaks the OpenAI-compatible
//! `POST {base_url}/audio/transcriptions` API, which is also what most
//! self-hosted Whisper servers expose.

use crate::config::RecognizerConfig;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, info};

/// Turns a complete WAV file into text.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Transcribe `wav_bytes`.
    ///
    /// Implementations return `AppError::RecognitionService` when the service
    /// cannot be reached, rejects the audio, or hears nothing.
    async fn recognize(&self, wav_bytes: Vec<u8>) -> AppResult<String>;

    /// Short label for logs and the health endpoint.
    fn name(&self) -> String;
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

pub struct HttpSpeechRecognizer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    language: Option<String>,
}

impl HttpSpeechRecognizer {
    /// Build a recognizer whose HTTP client gives up after the configured timeout.
    pub fn new(config: &RecognizerConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::ConfigError(format!("HTTP client: {}", e)))?;

        let language = Some(config.language.trim().to_string()).filter(|l| !l.is_empty());

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            language,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url)
    }
}

#[async_trait]
impl SpeechRecognizer for HttpSpeechRecognizer {
    async fn recognize(&self, wav_bytes: Vec<u8>) -> AppResult<String> {
        let start_time = Instant::now();
        let audio_len = wav_bytes.len();

        let file_part = multipart::Part::bytes(wav_bytes)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| AppError::RecognitionService(format!("mime: {}", e)))?;

        let mut form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "json");
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }
        let form = form.part("file", file_part);

        debug!(model = %self.model, bytes = audio_len, "Sending audio to recognizer");

        let mut request = self.client.post(self.endpoint()).multipart(form);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::RecognitionService("request timed out".to_string())
            } else {
                AppError::RecognitionService(format!("service unreachable: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(AppError::RecognitionService(format!(
                "service rejected the request with status {}: {}",
                status,
                body.trim()
            )));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| AppError::RecognitionService(format!("unreadable response: {}", e)))?;

        let transcript = parsed.text.trim().to_string();
        if transcript.is_empty() {
            return Err(AppError::RecognitionService(
                "no speech could be recognized in the audio".to_string(),
            ));
        }

        info!(
            chars = transcript.len(),
            duration_ms = %start_time.elapsed().as_millis(),
            "Recognizer returned transcript"
        );

        Ok(transcript)
    }

    fn name(&self) -> String {
        format!("{} via {}", self.model, self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{web, App, HttpResponse, HttpServer};
    use std::net::TcpListener;

    /// Start a throwaway transcription endpoint that always answers with
    /// `status` and `body`. Returns its base URL.
    fn start_mock_service(status: u16, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = HttpServer::new(move || {
            App::new().route(
                "/v1/audio/transcriptions",
                web::post().to(move || async move {
                    HttpResponse::build(
                        actix_web::http::StatusCode::from_u16(status).unwrap(),
                    )
                    .content_type("application/json")
                    .body(body)
                }),
            )
        })
        .workers(1)
        .listen(listener)
        .unwrap()
        .run();

        actix_web::rt::spawn(server);
        format!("http://{}/v1", addr)
    }

    fn recognizer_for(base_url: String) -> HttpSpeechRecognizer {
        let mut config = AppConfig::default().recognizer;
        config.base_url = base_url;
        config.api_key = "test-key".to_string();
        config.timeout_secs = 5;
        HttpSpeechRecognizer::new(&config).unwrap()
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let recognizer = recognizer_for("http://localhost:9000/v1/".to_string());
        assert_eq!(
            recognizer.endpoint(),
            "http://localhost:9000/v1/audio/transcriptions"
        );
    }

    #[test]
    fn test_empty_language_is_omitted() {
        let mut config = AppConfig::default().recognizer;
        config.language = "  ".to_string();
        let recognizer = HttpSpeechRecognizer::new(&config).unwrap();
        assert!(recognizer.language.is_none());
    }

    #[actix_web::test]
    async fn test_returns_trimmed_transcript() {
        let base_url = start_mock_service(200, r#"{"text": "  hello world \n"}"#);
        let recognizer = recognizer_for(base_url);

        let text = recognizer.recognize(b"RIFF fake".to_vec()).await.unwrap();
        assert_eq!(text, "hello world");
    }

    #[actix_web::test]
    async fn test_empty_transcript_is_an_error() {
        let base_url = start_mock_service(200, r#"{"text": ""}"#);
        let recognizer = recognizer_for(base_url);

        let result = recognizer.recognize(b"silence".to_vec()).await;
        assert!(matches!(result, Err(AppError::RecognitionService(_))));
    }

    #[actix_web::test]
    async fn test_error_status_is_an_error() {
        let base_url = start_mock_service(400, r#"{"error": {"message": "bad audio"}}"#);
        let recognizer = recognizer_for(base_url);

        match recognizer.recognize(b"noise".to_vec()).await {
            Err(AppError::RecognitionService(msg)) => assert!(msg.contains("400")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[actix_web::test]
    async fn test_unparseable_body_is_an_error() {
        let base_url = start_mock_service(200, "not json");
        let recognizer = recognizer_for(base_url);

        let result = recognizer.recognize(b"audio".to_vec()).await;
        assert!(matches!(result, Err(AppError::RecognitionService(_))));
    }

    #[actix_web::test]
    async fn test_unreachable_service_is_an_error() {
        // Bind then drop so nothing is listening on the port.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let recognizer = recognizer_for(format!("http://127.0.0.1:{}/v1", port));

        let result = recognizer.recognize(b"audio".to_vec()).await;
        assert!(matches!(result, Err(AppError::RecognitionService(_))));
    }
}
