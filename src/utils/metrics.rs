// src/utils/metrics.rs

use axum::{http::StatusCode, routing::get, serve, Router};
use once_cell::sync::Lazy;
use prometheus::{
    gather, register_counter, register_gauge, register_histogram, Counter, Encoder, Gauge,
    Histogram, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{PipelineError, Result};

pub static DOCUMENTS_PROCESSED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "pipeline_documents_processed_total",
        "Total number of documents annotated and normalized."
    )
    .expect("Failed to register DOCUMENTS_PROCESSED_TOTAL counter")
});

pub static DOCUMENTS_WITHOUT_ROWS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "pipeline_documents_without_rows_total",
        "Total number of documents that produced no rows for the selected processor."
    )
    .expect("Failed to register DOCUMENTS_WITHOUT_ROWS_TOTAL counter")
});

pub static ROWS_NORMALIZED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "pipeline_rows_normalized_total",
        "Total number of annotation rows produced by the normalizer."
    )
    .expect("Failed to register ROWS_NORMALIZED_TOTAL counter")
});

pub static BATCHES_LOADED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "pipeline_batches_loaded_total",
        "Total number of batches loaded into the warehouse."
    )
    .expect("Failed to register BATCHES_LOADED_TOTAL counter")
});

pub static ROWS_LOADED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "pipeline_rows_loaded_total",
        "Total number of rows reported loaded by warehouse load jobs."
    )
    .expect("Failed to register ROWS_LOADED_TOTAL counter")
});

pub static LOAD_FAILURES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "pipeline_load_failures_total",
        "Total number of batch loads that failed."
    )
    .expect("Failed to register LOAD_FAILURES_TOTAL counter")
});

pub static ROWS_IN_BATCH: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "pipeline_rows_in_batch",
        "Rows currently buffered in the chunk accumulator."
    )
    .expect("Failed to register ROWS_IN_BATCH gauge")
});

pub static ANNOTATION_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "pipeline_annotation_duration_seconds",
        "Histogram of per-document annotation latencies."
    )
    .expect("Failed to register ANNOTATION_DURATION_SECONDS histogram")
});

pub static LOAD_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "pipeline_load_duration_seconds",
        "Histogram of batch load durations, staging file to finished job."
    )
    .expect("Failed to register LOAD_DURATION_SECONDS histogram")
});

async fn metrics_handler() -> (StatusCode, String) {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&gather(), &mut buffer) {
        error!("Could not encode prometheus metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Could not encode prometheus metrics: {}", e),
        );
    }
    match String::from_utf8(buffer) {
        Ok(s) => (StatusCode::OK, s),
        Err(e) => {
            error!("Prometheus metrics UTF-8 error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Prometheus metrics UTF-8 error: {}", e),
            )
        }
    }
}

/// Serves `/metrics` from a background thread with its own runtime, so the blocking
/// pipeline never has to enter async code.
pub fn setup_prometheus_metrics(metrics_port: Option<u16>) -> Result<()> {
    let Some(port) = metrics_port else {
        info!("Prometheus metrics endpoint not configured (no port specified).");
        return Ok(());
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| PipelineError::Unexpected(format!("Failed to build metrics runtime: {}", e)))?;
    let listener_addr = format!("0.0.0.0:{}", port);
    info!(
        "Metrics endpoint will be available at http://{}/metrics",
        listener_addr
    );

    std::thread::Builder::new()
        .name("metrics-server".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                let app = Router::new().route("/metrics", get(metrics_handler));
                match TcpListener::bind(&listener_addr).await {
                    Ok(listener) => {
                        if let Err(e) = serve(listener, app).await {
                            error!("Metrics server error: {}", e);
                        }
                    }
                    Err(e) => {
                        error!("Failed to bind metrics server to {}: {}", listener_addr, e);
                    }
                }
            })
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_register_once() {
        let before = DOCUMENTS_PROCESSED_TOTAL.get();
        DOCUMENTS_PROCESSED_TOTAL.inc();
        assert!(DOCUMENTS_PROCESSED_TOTAL.get() >= before + 1.0);
    }

    #[test]
    fn test_no_port_is_a_no_op() {
        assert!(setup_prometheus_metrics(None).is_ok());
    }
}
