//! # Application State Management
//!
//! State shared by every HTTP worker: configuration, request metrics, the
//! pipeline collaborators (extractor + recognizer), and the page renderer.
//!
//! ## Arc<RwLock<T>> Pattern
//! - **Arc**: every worker's handlers hold a reference to the same data
//! - **RwLock**: many concurrent readers, one writer at a time
//!
//! Everything request-scoped (the uploaded file, the WAV sidecar) lives in
//! the request, never here.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::page::PageRenderer;
use crate::transcriber::{FfmpegAudioExtractor, HttpSpeechRecognizer, PipelineContext};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

/// The main application state that's shared across all HTTP request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<RwLock<AppConfig>>,

    /// Performance metrics, updated by every request
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started (never changes)
    pub start_time: Instant,

    /// Extractor, recognizer and scratch settings handed to each job
    pub pipeline: PipelineContext,

    pub pages: Arc<PageRenderer>,
}

/// Performance metrics collected across all HTTP requests.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of error responses since server start
    pub error_count: u64,

    /// Transcription jobs currently running
    pub active_jobs: u32,

    /// Jobs finished since start, whatever their outcome
    pub completed_jobs: u64,

    /// Per-endpoint statistics, keyed like "POST /"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,

    /// Total time spent processing all requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    pub error_count: u64,
}

/// Counts one running job for as long as it is alive.
///
/// Returned by [`AppState::track_job`]; the count goes back down on drop, so a
/// job that errors out or is cancelled is still accounted for.
pub struct ActiveJob {
    metrics: Arc<RwLock<AppMetrics>>,
}

impl Drop for ActiveJob {
    fn drop(&mut self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        if metrics.active_jobs > 0 {
            metrics.active_jobs -= 1;
        }
        metrics.completed_jobs += 1;
    }
}

impl AppState {
    /// Build the production state: ffmpeg for extraction, the configured HTTP
    /// service for recognition.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let pipeline = PipelineContext {
            extractor: Arc::new(FfmpegAudioExtractor::new(&config.media)),
            recognizer: Arc::new(HttpSpeechRecognizer::new(&config.recognizer)?),
            scratch_dir: config.media.scratch_dir.clone(),
            recognition_timeout: config.recognizer.timeout(),
        };
        Self::with_pipeline(config, pipeline)
    }

    /// Build state around an already assembled pipeline.
    pub fn with_pipeline(config: AppConfig, pipeline: PipelineContext) -> AppResult<Self> {
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
            pipeline,
            pages: Arc::new(PageRenderer::new()?),
        })
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the lock immediately, so other threads aren't blocked.
    pub fn get_config(&self) -> AppConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.request_count += 1;
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    ///
    /// The first request to an endpoint creates its entry.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Mark a transcription job as running until the returned guard is dropped.
    pub fn track_job(&self) -> ActiveJob {
        {
            let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
            metrics.active_jobs += 1;
        }
        ActiveJob {
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    ///
    /// Copies the data so no lock is held while the response is serialized.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap_or_else(PoisonError::into_inner);
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_jobs: metrics.active_jobs,
            completed_jobs: metrics.completed_jobs,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that failed, from 0.0 to 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
