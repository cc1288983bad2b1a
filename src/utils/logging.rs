// src/utils/logging.rs

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::data_model::{AnnotationKind, Library};
use crate::error::{PipelineError, Result};

/// `{library}_{processor}_{YYYYmmddHHMMSS}.log`
pub fn log_file_name(library: Library, kind: AnnotationKind, started: chrono::DateTime<Local>) -> String {
    format!(
        "{}_{}_{}.log",
        library.name(),
        kind.name(),
        started.format("%Y%m%d%H%M%S")
    )
}

/// Logs to stderr and to a per-run file in `log_dir`.
///
/// The returned guard flushes the file writer on drop and must live until the run ends.
pub fn init_logging(
    log_dir: &Path,
    library: Library,
    kind: AnnotationKind,
    json: bool,
) -> Result<(WorkerGuard, PathBuf)> {
    fs::create_dir_all(log_dir)?;
    let file_name = log_file_name(library, kind, Local::now());
    let log_path = log_dir.join(&file_name);

    let file_appender = tracing_appender::rolling::never(log_dir, &file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = if json {
        fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_ansi(false)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| PipelineError::Unexpected(format!("Failed to initialise logging: {}", e)))?;

    Ok((guard, log_path))
}
