// src/pipeline/readers/csv_reader.rs

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::pipeline::readers::base_reader::{
    documents_from_batch, find_input_file, BaseReader, DocumentIter,
};

const DEFAULT_BATCH_SIZE: usize = 1024;

/// Reads documents from the first CSV file in the input directory.
#[derive(Debug, Clone)]
pub struct CsvReader {
    path: PathBuf,
    id_column: String,
    text_column: String,
    batch_size: usize,
}

impl CsvReader {
    pub fn new(
        path: impl Into<PathBuf>,
        id_column: impl Into<String>,
        text_column: impl Into<String>,
        batch_size: Option<usize>,
    ) -> Self {
        CsvReader {
            path: path.into(),
            id_column: id_column.into(),
            text_column: text_column.into(),
            batch_size: batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
        }
    }

    /// Picks the first `*.csv` in `dir`.
    pub fn from_dir(
        dir: &Path,
        id_column: impl Into<String>,
        text_column: impl Into<String>,
        batch_size: Option<usize>,
    ) -> Result<Self> {
        let path = find_input_file(dir, "csv")?;
        info!("Reading documents from {}", path.display());
        Ok(CsvReader::new(path, id_column, text_column, batch_size))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BaseReader for CsvReader {
    fn read_documents(&self) -> Result<DocumentIter> {
        let format = Format::default().with_header(true);

        // Only the header names are taken from inference; every column is read as text
        // so numeric identifiers keep their exact spelling.
        let (inferred, _) = format.infer_schema(File::open(&self.path)?, Some(100))?;
        if inferred.fields().is_empty() {
            return Err(PipelineError::InputError(format!(
                "CSV file '{}' has no header",
                self.path.display()
            )));
        }
        let schema = Arc::new(Schema::new(
            inferred
                .fields()
                .iter()
                .map(|f| Field::new(f.name(), DataType::Utf8, true))
                .collect::<Vec<_>>(),
        ));

        let reader = ReaderBuilder::new(schema)
            .with_format(format)
            .with_batch_size(self.batch_size)
            .build(File::open(&self.path)?)?;

        let id_column = self.id_column.clone();
        let text_column = self.text_column.clone();
        let source = self.path.display().to_string();

        let iterator = reader.flat_map(move |batch_result| match batch_result {
            Ok(batch) => match documents_from_batch(&batch, &id_column, &text_column, &source) {
                Ok(docs) => docs,
                Err(e) => vec![Err(e)],
            },
            Err(e) => vec![Err(PipelineError::InputError(format!(
                "Failed to read CSV batch from '{}': {}",
                source, e
            )))],
        });

        Ok(Box::new(iterator))
    }
}
