use std::fs;
use std::path::{Path, PathBuf};

use arrow::array::{Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use tracing::debug;

use crate::data_model::DocumentRecord;
use crate::error::{PipelineError, Result};

pub type DocumentIter = Box<dyn Iterator<Item = Result<DocumentRecord>>>;

pub trait BaseReader {
    fn read_documents(&self) -> Result<DocumentIter>;
}

/// First file in `dir` with the given extension, in file-name order.
///
/// Only one input file per run is supported; any further matches are ignored.
pub fn find_input_file(dir: &Path, extension: &str) -> Result<PathBuf> {
    let entries = fs::read_dir(dir).map_err(|e| {
        PipelineError::InputError(format!(
            "Cannot read input directory '{}': {}",
            dir.display(),
            e
        ))
    })?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next().ok_or_else(|| {
        PipelineError::InputError(format!(
            "No .{} file found in '{}'",
            extension,
            dir.display()
        ))
    })
}

fn string_column(batch: &RecordBatch, idx: usize, name: &str) -> Result<StringArray> {
    let column = batch.column(idx);
    let as_utf8 = match column.data_type() {
        DataType::Utf8 => column.clone(),
        _ => cast(column, &DataType::Utf8)?,
    };
    as_utf8
        .as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .ok_or_else(|| {
            PipelineError::Unexpected(format!("Column '{}' is not a valid Utf8 StringArray", name))
        })
}

/// Turns one record batch into documents. Rows without text are skipped; a row with
/// text but no identifier cannot be traced back and is an input error.
pub fn documents_from_batch(
    batch: &RecordBatch,
    id_column: &str,
    text_column: &str,
    source: &str,
) -> Result<Vec<Result<DocumentRecord>>> {
    let schema = batch.schema();
    let id_idx = schema.index_of(id_column).map_err(|_| {
        PipelineError::InputError(format!(
            "ID column '{}' not found in '{}'",
            id_column, source
        ))
    })?;
    let text_idx = schema.index_of(text_column).map_err(|_| {
        PipelineError::InputError(format!(
            "Text column '{}' not found in '{}'",
            text_column, source
        ))
    })?;

    let ids = string_column(batch, id_idx, id_column)?;
    let texts = string_column(batch, text_idx, text_column)?;

    let mut documents = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        if texts.is_null(i) {
            debug!(row = i, source, "Skipping row without text");
            continue;
        }
        if ids.is_null(i) {
            documents.push(Err(PipelineError::InputError(format!(
                "Row {} in '{}' has text but a null '{}'",
                i, source, id_column
            ))));
            continue;
        }
        documents.push(Ok(DocumentRecord::new(ids.value(i), texts.value(i))));
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Int64Array};
    use arrow::datatypes::{Field, Schema};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_find_input_file_takes_first_sorted_match() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("b.csv"), "id,text\n")?;
        fs::write(dir.path().join("a.csv"), "id,text\n")?;
        fs::write(dir.path().join("notes.txt"), "ignored")?;

        let found = find_input_file(dir.path(), "csv")?;
        assert_eq!(found.file_name().unwrap(), "a.csv");
        Ok(())
    }

    #[test]
    fn test_find_input_file_missing() -> Result<()> {
        let dir = tempdir()?;
        let result = find_input_file(dir.path(), "parquet");
        assert!(matches!(result, Err(PipelineError::InputError(_))));
        Ok(())
    }

    #[test]
    fn test_documents_from_batch_casts_ids_and_skips_null_text() -> Result<()> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new("text", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![Some(1), Some(2), None])) as ArrayRef,
                Arc::new(StringArray::from(vec![Some("first"), None, Some("orphan")])) as ArrayRef,
            ],
        )?;

        let docs = documents_from_batch(&batch, "id", "text", "test")?;
        assert_eq!(docs.len(), 2);
        assert_eq!(
            docs[0].as_ref().unwrap(),
            &DocumentRecord::new("1", "first")
        );
        assert!(matches!(docs[1], Err(PipelineError::InputError(_))));
        Ok(())
    }
}
