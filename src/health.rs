use crate::config::AppConfig;
use crate::state::{AppMetrics, AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": overall_error_rate(&metrics),
            "active_jobs": metrics.active_jobs,
            "completed_jobs": metrics.completed_jobs
        },
        "memory": get_memory_info(),
        "pipeline": {
            "extractor": config.media.ffmpeg_path,
            "sample_rate": config.media.sample_rate,
            "channels": config.media.channels,
            // Never the API key
            "recognizer": state.pipeline.recognizer.name(),
            "recognizer_timeout_secs": config.recognizer.timeout_secs
        },
        "system": get_system_status(&config, &metrics)
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats = Vec::new();
    for (endpoint, metric) in metrics.endpoint_metrics.iter() {
        endpoint_stats.push(json!({
            "endpoint": endpoint,
            "request_count": metric.request_count,
            "error_count": metric.error_count,
            "error_rate": metric.error_rate(),
            "average_duration_ms": metric.average_duration_ms(),
            "total_duration_ms": metric.total_duration_ms
        }));
    }

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": overall_error_rate(&metrics),
            "active_jobs": metrics.active_jobs,
            "completed_jobs": metrics.completed_jobs,
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "endpoints": endpoint_stats,
        "memory": get_memory_info(),
        "performance": {
            "max_concurrent_jobs": state.get_config().performance.max_concurrent_jobs
        }
    }))
}

fn overall_error_rate(metrics: &AppMetrics) -> f64 {
    if metrics.request_count > 0 {
        metrics.error_count as f64 / metrics.request_count as f64
    } else {
        0.0
    }
}

#[cfg(target_os = "linux")]
fn get_memory_info() -> serde_json::Value {
    let pid = std::process::id();

    if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
        let mut vm_rss = 0;
        let mut vm_size = 0;

        for line in status.lines() {
            if line.starts_with("VmRSS:") {
                if let Some(kb_str) = line.split_whitespace().nth(1) {
                    vm_rss = kb_str.parse::<u64>().unwrap_or(0) * 1024;
                }
            } else if line.starts_with("VmSize:") {
                if let Some(kb_str) = line.split_whitespace().nth(1) {
                    vm_size = kb_str.parse::<u64>().unwrap_or(0) * 1024;
                }
            }
        }

        return json!({
            "resident_memory_bytes": vm_rss,
            "virtual_memory_bytes": vm_size,
            "available": true
        });
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false
    })
}

#[cfg(not(target_os = "linux"))]
fn get_memory_info() -> serde_json::Value {
    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false,
        "note": "Memory info not available on this platform"
    })
}

fn get_system_status(config: &AppConfig, metrics: &AppMetrics) -> serde_json::Value {
    let job_usage = if config.performance.max_concurrent_jobs > 0 {
        metrics.active_jobs as f64 / config.performance.max_concurrent_jobs as f64
    } else {
        0.0
    };

    let status = if job_usage > 0.9 {
        "high_load"
    } else if job_usage > 0.7 {
        "moderate_load"
    } else {
        "normal"
    };

    json!({
        "status": status,
        "job_usage_percent": (job_usage * 100.0).round(),
        "max_jobs": config.performance.max_concurrent_jobs,
        "current_jobs": metrics.active_jobs,
        "load_warnings": if job_usage > 0.8 {
            vec!["High transcription load - consider increasing max_concurrent_jobs"]
        } else {
            vec![]
        }
    })
}
