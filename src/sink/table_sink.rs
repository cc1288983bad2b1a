// src/sink/table_sink.rs

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, error, info};

use crate::data_model::{AnnotationKind, Batch, Library, WarehouseDestination};
use crate::error::{PipelineError, Result};
use crate::pipeline::writers::{BaseWriter, CsvStagingWriter};
use crate::schema::schema_for;
use crate::sink::warehouse::{
    LoadOptions, LoadResult, TableRef, WarehouseClient, WarehouseError,
};
use crate::utils::metrics::{
    BATCHES_LOADED_TOTAL, LOAD_DURATION_SECONDS, LOAD_FAILURES_TOTAL, ROWS_LOADED_TOTAL,
};

/// Loads batches into the warehouse through a CSV staging file.
pub struct TableSink<W> {
    client: W,
    staging_dir: PathBuf,
    library: Library,
    options: LoadOptions,
}

impl<W: WarehouseClient> TableSink<W> {
    pub fn new(client: W, staging_dir: impl Into<PathBuf>, library: Library) -> Self {
        TableSink {
            client,
            staging_dir: staging_dir.into(),
            library,
            options: LoadOptions::default(),
        }
    }

    pub fn client(&self) -> &W {
        &self.client
    }

    /// One staging file per (processor, library) pair: `temp_{processor}_{library}.csv`.
    pub fn staging_path(&self, kind: AnnotationKind) -> PathBuf {
        self.staging_dir
            .join(format!("temp_{}_{}.csv", kind.name(), self.library.name()))
    }

    /// Creates the dataset and the table when they are missing.
    ///
    /// Absence is the only recovered condition. Losing a creation race to another writer
    /// (`AlreadyExists`) counts as success; every other failure is returned.
    pub fn ensure_destination(&self, destination: &WarehouseDestination) -> Result<TableRef> {
        let table = TableRef::new(
            destination.project.clone(),
            destination.dataset.clone(),
            destination.table_name(),
        );

        match self.client.get_dataset(&table.project, &table.dataset) {
            Ok(()) => debug!("Dataset {}.{} exists", table.project, table.dataset),
            Err(WarehouseError::NotFound(_)) => {
                match self.client.create_dataset(&table.project, &table.dataset) {
                    Ok(()) => info!("Created dataset {}.{}", table.project, table.dataset),
                    Err(WarehouseError::AlreadyExists(_)) => {
                        debug!("Dataset {}.{} was created concurrently", table.project, table.dataset)
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        }

        match self.client.get_table(&table) {
            Ok(_) => debug!("Table {} exists", table),
            Err(WarehouseError::NotFound(_)) => {
                match self.client.create_table(&table, schema_for(destination.kind)) {
                    Ok(()) => info!("Created table {}", table),
                    Err(WarehouseError::AlreadyExists(_)) => {
                        debug!("Table {} was created concurrently", table)
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        }

        Ok(table)
    }

    /// Stages and loads one batch. An empty batch is skipped and yields `None`.
    ///
    /// The staging file is removed only after the load job succeeded; on failure it is left
    /// in place and the error names it.
    pub fn load(&self, batch: &Batch, destination: &WarehouseDestination) -> Result<Option<LoadResult>> {
        if batch.kind != destination.kind {
            return Err(PipelineError::SchemaMismatch(format!(
                "cannot load a {} batch into a {} destination",
                batch.kind, destination.kind
            )));
        }
        if batch.is_empty() {
            info!(
                documents = batch.documents,
                "Batch has no rows, nothing to load into {}",
                destination.table_id()
            );
            return Ok(None);
        }

        let staging_path = self.staging_path(batch.kind);
        let started = Instant::now();
        match self.stage_and_load(batch, destination, &staging_path) {
            Ok(result) => {
                fs::remove_file(&staging_path)?;
                LOAD_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());
                BATCHES_LOADED_TOTAL.inc();
                ROWS_LOADED_TOTAL.inc_by(result.rows_loaded as f64);
                Ok(Some(result))
            }
            Err(e) => {
                LOAD_FAILURES_TOTAL.inc();
                error!(
                    table = %destination.table_id(),
                    staging = %staging_path.display(),
                    error = %e,
                    "Load failed, staging file kept"
                );
                Err(PipelineError::LoadFailed {
                    table: destination.table_id(),
                    staging_path,
                    source: Box::new(e),
                })
            }
        }
    }

    fn stage_and_load(
        &self,
        batch: &Batch,
        destination: &WarehouseDestination,
        staging_path: &Path,
    ) -> Result<LoadResult> {
        let schema = schema_for(batch.kind);

        let mut writer = CsvStagingWriter::new(staging_path, batch.kind)?;
        writer.write_batch(batch)?;
        writer.close()?;
        verify_header(staging_path, &schema.header_line())?;
        debug!(
            rows = batch.len(),
            "Wrote staging file {}",
            staging_path.display()
        );

        let table = self.ensure_destination(destination)?;
        let job = self
            .client
            .submit_load(&table, schema, staging_path, &self.options)?;
        debug!(job_id = %job.job_id, "Submitted load job for {}", table);
        let stats = self.client.wait_for_job(&job)?;
        let info = self.client.get_table(&table)?;

        info!(
            "Loaded {} rows and {} columns to {}",
            stats.output_rows, info.num_columns, table
        );

        Ok(LoadResult {
            table: table.to_string(),
            job_id: job.job_id,
            rows_loaded: stats.output_rows,
            columns_loaded: info.num_columns,
            table_rows: info.num_rows,
        })
    }
}

/// The staging file's first line must be exactly the schema's column list.
fn verify_header(path: &Path, expected: &str) -> Result<()> {
    let mut first_line = String::new();
    BufReader::new(fs::File::open(path)?).read_line(&mut first_line)?;
    let header = first_line.trim_end_matches(['\r', '\n']);
    if header != expected {
        return Err(PipelineError::SchemaMismatch(format!(
            "staging header '{}' does not match schema '{}'",
            header, expected
        )));
    }
    Ok(())
}
