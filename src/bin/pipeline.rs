// src/bin/pipeline.rs

//! # Text analytics pipeline
//!
//! Reads documents from a CSV/Parquet file or a BigQuery table, annotates each one with
//! spaCy or Stanza (named entities, part of speech, dependency parse or morphology),
//! flattens the annotations into fixed per-kind columns and loads them into BigQuery in
//! evenly sized batches.
//!
//! Everything is driven by one YAML file (`--config`). The process exits non-zero on any
//! configuration, input, annotation or load error; a failed load leaves its staging CSV
//! on disk for inspection.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::HumanDuration;
use tracing::{error, info};

use TextAnalytics::annotators::{Annotator, NlpServiceClient, SpacyAnnotator, StanzaAnnotator};
use TextAnalytics::config::args::Args;
use TextAnalytics::config::{load_app_config, AppConfig, InputFormat};
use TextAnalytics::data_model::Library;
use TextAnalytics::executor::PipelineExecutor;
use TextAnalytics::pipeline::readers::{BaseReader, CsvReader, ParquetReader, WarehouseReader};
use TextAnalytics::sink::credentials::{
    resolve_key_path, ServiceAccountKey, ServiceAccountTokenProvider, StaticTokenProvider,
    TokenProvider, STATIC_TOKEN_ENV,
};
use TextAnalytics::sink::{BigQueryClient, TableRef, TableSink};
use TextAnalytics::utils::logging::init_logging;
use TextAnalytics::utils::metrics::setup_prometheus_metrics;
use TextAnalytics::utils::progress::{create_progress_bar, DOCUMENT_PROGRESS_TEMPLATE};

fn build_token_provider(config: &AppConfig) -> Result<Arc<dyn TokenProvider>> {
    if let Some(token) = env::var(STATIC_TOKEN_ENV).ok().filter(|t| !t.is_empty()) {
        info!("Using access token from ${}", STATIC_TOKEN_ENV);
        return Ok(Arc::new(StaticTokenProvider(token)));
    }
    let key_path = resolve_key_path(&config.credentials, &config.warehouse.project_name, |var| {
        env::var(var).ok()
    })?;
    let key = ServiceAccountKey::from_file(&key_path)?;
    let provider = ServiceAccountTokenProvider::new(
        key,
        Duration::from_secs_f64(config.warehouse.timeout_seconds),
    )?;
    Ok(Arc::new(provider))
}

fn build_annotator(config: &AppConfig, library: Library) -> Result<Box<dyn Annotator>> {
    let timeout = Duration::from_secs_f64(config.annotator.timeout_seconds);
    let annotator: Box<dyn Annotator> = match library {
        Library::Spacy => {
            let client = NlpServiceClient::new(
                &config.annotator.spacy_endpoint,
                timeout,
                config.annotator.max_retries,
            )?;
            let model = config
                .annotator
                .spacy_model
                .clone()
                .unwrap_or_else(|| SpacyAnnotator::default_model(&config.language));
            info!("Using spaCy model {} at {}", model, client.endpoint());
            Box::new(SpacyAnnotator::new(client, model))
        }
        Library::Stanza => {
            let client = NlpServiceClient::new(
                &config.annotator.stanza_endpoint,
                timeout,
                config.annotator.max_retries,
            )?;
            info!("Using Stanza ({}) at {}", config.language, client.endpoint());
            Box::new(StanzaAnnotator::new(client, config.language.clone()))
        }
    };
    Ok(annotator)
}

fn build_reader(config: &AppConfig, client: &BigQueryClient) -> Result<Box<dyn BaseReader>> {
    let input = &config.input;
    if input.from_database {
        let table = TableRef::new(
            config.warehouse.project_name.clone(),
            config.warehouse.dataset_name.clone(),
            input.source_table(&config.warehouse),
        );
        info!("Reading documents from table {}", table);
        return Ok(Box::new(WarehouseReader::new(
            client.clone(),
            table,
            input.id_column.clone(),
            input.text_column.clone(),
        )));
    }
    let reader: Box<dyn BaseReader> = match input.format {
        InputFormat::Csv => Box::new(CsvReader::from_dir(
            &input.input_dir,
            input.id_column.clone(),
            input.text_column.clone(),
            input.batch_size,
        )?),
        InputFormat::Parquet => Box::new(ParquetReader::from_dir(
            &input.input_dir,
            input.id_column.clone(),
            input.text_column.clone(),
            input.batch_size,
        )?),
    };
    Ok(reader)
}

fn run(config: &AppConfig, args: &Args) -> Result<()> {
    let start_time = Instant::now();
    let kind = config.annotation_kind()?;
    let library = config.library()?;
    let destination = config.destination()?;

    if let Err(e) = setup_prometheus_metrics(args.metrics_port) {
        error!("Failed to start Prometheus metrics endpoint: {}", e);
    }

    info!("Processor: {}, library: {}, language: {}", kind, library, config.language);
    info!("Destination: {}", destination.table_id());

    let tokens = build_token_provider(config).context("Failed to set up warehouse credentials")?;
    let client = BigQueryClient::new(
        config.warehouse.api_base.as_deref(),
        tokens,
        config.warehouse.location.clone(),
        Duration::from_secs_f64(config.warehouse.timeout_seconds),
        Duration::from_millis(config.warehouse.job_poll_interval_ms),
    )?;

    let reader = build_reader(config, &client).context("Failed to open input")?;
    let annotator = build_annotator(config, library)?;
    let sink = TableSink::new(client, config.staging.dir.clone(), library);
    let executor = PipelineExecutor::new(
        annotator,
        sink,
        destination,
        config.chunking.min_chunk,
        config.chunking.max_chunk,
    );

    let progress = create_progress_bar(0, "Annotating documents", DOCUMENT_PROGRESS_TEMPLATE);
    let summary = match executor.run_from_reader(reader.as_ref(), &progress) {
        Ok(summary) => summary,
        Err(e) => {
            progress.abandon_with_message(format!("Pipeline failed: {}", e));
            return Err(e.into());
        }
    };

    info!(
        "Processed {} documents ({} without output, {} duplicate ids) in {} batches, {} rows loaded in {}",
        summary.documents_processed,
        summary.documents_without_rows,
        summary.duplicate_ids,
        summary.batches_flushed,
        summary.rows_loaded,
        HumanDuration(start_time.elapsed())
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Logging needs the selected library and processor for its file name, so a broken
    // config can only be reported on stderr.
    let config = match load_app_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if args.validate_config {
        println!("Configuration '{}' is valid.", args.config.display());
        return ExitCode::SUCCESS;
    }

    let log_dir = args.log_dir.clone().unwrap_or_else(|| config.logging.dir.clone());
    let (library, kind) = match (config.library(), config.annotation_kind()) {
        (Ok(library), Ok(kind)) => (library, kind),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let _guard = match init_logging(&log_dir, library, kind, config.logging.json) {
        Ok((guard, path)) => {
            info!("Logging to {}", path.display());
            guard
        }
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&config, &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
