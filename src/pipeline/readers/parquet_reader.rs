// src/pipeline/readers/parquet_reader.rs

use crate::error::{PipelineError, Result};
use crate::pipeline::readers::base_reader::{
    documents_from_batch, find_input_file, BaseReader, DocumentIter,
};

use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

/// Reads documents from a Parquet file.
#[derive(Debug, Clone)]
pub struct ParquetReader {
    path: PathBuf,
    id_column: String,
    text_column: String,
    batch_size: Option<usize>,
}

impl ParquetReader {
    pub fn new(
        path: impl Into<PathBuf>,
        id_column: impl Into<String>,
        text_column: impl Into<String>,
        batch_size: Option<usize>,
    ) -> Self {
        ParquetReader {
            path: path.into(),
            id_column: id_column.into(),
            text_column: text_column.into(),
            batch_size,
        }
    }

    /// Picks the first `*.parquet` in `dir`.
    pub fn from_dir(
        dir: &Path,
        id_column: impl Into<String>,
        text_column: impl Into<String>,
        batch_size: Option<usize>,
    ) -> Result<Self> {
        let path = find_input_file(dir, "parquet")?;
        info!("Reading documents from {}", path.display());
        Ok(ParquetReader::new(path, id_column, text_column, batch_size))
    }
}

impl BaseReader for ParquetReader {
    fn read_documents(&self) -> Result<DocumentIter> {
        let file = File::open(&self.path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let builder = if let Some(batch_size) = self.batch_size {
            builder.with_batch_size(batch_size)
        } else {
            builder
        };
        let record_batch_reader = builder.build()?;

        let id_column = self.id_column.clone();
        let text_column = self.text_column.clone();
        let source = self.path.display().to_string();

        let iterator = record_batch_reader.flat_map(move |batch_result| match batch_result {
            Ok(batch) => match documents_from_batch(&batch, &id_column, &text_column, &source) {
                Ok(docs) => docs,
                Err(e) => vec![Err(e)],
            },
            Err(e) => vec![Err(PipelineError::Unexpected(format!(
                "Failed to read Parquet batch from '{}': {}",
                source, e
            )))],
        });

        Ok(Box::new(iterator))
    }
}
