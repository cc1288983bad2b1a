use std::fs::File;
use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use tempfile::tempdir;
use TextAnalytics::data_model::DocumentRecord;
use TextAnalytics::error::{PipelineError, Result};
use TextAnalytics::pipeline::readers::{BaseReader, ParquetReader};

fn write_speeches(path: &std::path::Path, ids: Vec<Option<i64>>, texts: Vec<Option<&str>>) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("speech_id", DataType::Int64, true),
        Field::new("body", DataType::Utf8, true),
        Field::new("speaker", DataType::Utf8, true),
    ]));
    let speakers: Vec<Option<&str>> = ids.iter().map(|_| Some("someone")).collect();
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from(ids)) as ArrayRef,
            Arc::new(StringArray::from(texts)) as ArrayRef,
            Arc::new(StringArray::from(speakers)) as ArrayRef,
        ],
    )?;
    let mut writer = ArrowWriter::try_new(File::create(path)?, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

#[test]
fn test_parquet_reader_casts_ids_and_skips_missing_text() -> Result<()> {
    let dir = tempdir()?;
    write_speeches(
        &dir.path().join("speeches.parquet"),
        vec![Some(7), Some(8), Some(9)],
        vec![Some("Første tale."), None, Some("Tredje tale.")],
    )?;

    let reader = ParquetReader::from_dir(dir.path(), "speech_id", "body", Some(2))?;
    let docs = reader.read_documents()?.collect::<Result<Vec<_>>>()?;

    assert_eq!(
        docs,
        vec![
            DocumentRecord::new("7", "Første tale."),
            DocumentRecord::new("9", "Tredje tale."),
        ]
    );
    Ok(())
}

#[test]
fn test_parquet_reader_missing_column() -> Result<()> {
    let dir = tempdir()?;
    write_speeches(&dir.path().join("a.parquet"), vec![Some(1)], vec![Some("x")])?;

    let reader = ParquetReader::from_dir(dir.path(), "speech_id", "content", None)?;
    let result = reader
        .read_documents()
        .and_then(|docs| docs.collect::<Result<Vec<_>>>());
    assert!(result.is_err(), "unknown text column must fail");
    Ok(())
}

#[test]
fn test_parquet_dir_without_parquet_files() -> Result<()> {
    let dir = tempdir()?;
    std::fs::write(dir.path().join("notes.csv"), "id,text\n1,a\n")?;
    assert!(matches!(
        ParquetReader::from_dir(dir.path(), "id", "text", None),
        Err(PipelineError::InputError(_))
    ));
    Ok(())
}
