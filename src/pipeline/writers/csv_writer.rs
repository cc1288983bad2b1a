use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Builder, RecordBatch, StringBuilder};
use arrow::csv::{Writer, WriterBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

use crate::data_model::{AnnotationKind, Batch, FieldValue};
use crate::error::{PipelineError, Result};
use crate::pipeline::writers::BaseWriter;
use crate::schema::{schema_for, ColumnSchema, ColumnType};

/// Arrow schema mirroring the warehouse column schema of a kind.
pub fn arrow_schema(schema: &ColumnSchema) -> SchemaRef {
    Arc::new(Schema::new(
        schema
            .columns()
            .iter()
            .map(|c| {
                let data_type = match c.column_type {
                    ColumnType::String => DataType::Utf8,
                    ColumnType::Integer => DataType::Int64,
                };
                Field::new(c.name, data_type, c.is_nullable())
            })
            .collect::<Vec<_>>(),
    ))
}

/// Writes annotation rows to a UTF-8 CSV staging file with a header row.
///
/// Fields containing the delimiter, quotes or newlines are quoted; nulls become empty fields.
pub struct CsvStagingWriter {
    kind: AnnotationKind,
    path: PathBuf,
    schema: SchemaRef,
    writer: Option<Writer<BufWriter<File>>>,
}

impl CsvStagingWriter {
    pub fn new(path: impl AsRef<Path>, kind: AnnotationKind) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        let writer = WriterBuilder::new()
            .with_header(true)
            .build(BufWriter::new(file));

        Ok(CsvStagingWriter {
            kind,
            path,
            schema: arrow_schema(schema_for(kind)),
            writer: Some(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn build_record_batch(&self, batch: &Batch) -> Result<RecordBatch> {
        let columns = schema_for(self.kind).columns();
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());

        for (idx, column) in columns.iter().enumerate() {
            match column.column_type {
                ColumnType::String => {
                    let mut builder = StringBuilder::with_capacity(batch.len(), batch.len() * 16);
                    for row in &batch.rows {
                        match &row.values()[idx] {
                            FieldValue::Null => builder.append_null(),
                            FieldValue::Str(s) => builder.append_value(s),
                            FieldValue::Int(v) => builder.append_value(v.to_string()),
                        }
                    }
                    arrays.push(Arc::new(builder.finish()) as ArrayRef);
                }
                ColumnType::Integer => {
                    let mut builder = Int64Builder::with_capacity(batch.len());
                    for row in &batch.rows {
                        match &row.values()[idx] {
                            FieldValue::Null => builder.append_null(),
                            FieldValue::Int(v) => builder.append_value(*v),
                            FieldValue::Str(s) => {
                                return Err(PipelineError::SchemaMismatch(format!(
                                    "column '{}' is INTEGER but holds '{}'",
                                    column.name, s
                                )))
                            }
                        }
                    }
                    arrays.push(Arc::new(builder.finish()) as ArrayRef);
                }
            }
        }

        Ok(RecordBatch::try_new(self.schema.clone(), arrays)?)
    }
}

impl BaseWriter for CsvStagingWriter {
    fn write_batch(&mut self, batch: &Batch) -> Result<()> {
        if batch.kind != self.kind {
            return Err(PipelineError::SchemaMismatch(format!(
                "staging writer for {} received a {} batch",
                self.kind, batch.kind
            )));
        }
        if batch.is_empty() {
            return Ok(());
        }
        let record_batch = self.build_record_batch(batch)?;
        if let Some(writer) = self.writer.as_mut() {
            writer.write(&record_batch)?;
        }
        Ok(())
    }

    fn close(mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            let mut inner = writer.into_inner();
            inner.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_model::AnnotationRow;
    use tempfile::tempdir;

    fn entity_row(id: &str, text: &str, start: usize) -> AnnotationRow {
        AnnotationRow::builder(AnnotationKind::Entities)
            .set("identifier", id)
            .unwrap()
            .set("text", text)
            .unwrap()
            .set("type", "ORG")
            .unwrap()
            .set("start_char", start)
            .unwrap()
            .build()
    }

    #[test]
    fn test_writes_header_and_quotes_embedded_newlines() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("temp_ner_spacy.csv");

        let mut batch = Batch::new(AnnotationKind::Entities);
        batch.rows.push(entity_row("d1", "Acme, Inc.", 0));
        batch.rows.push(entity_row("d2", "Line\nBreak", 3));

        let mut writer = CsvStagingWriter::new(&path, AnnotationKind::Entities)?;
        writer.write_batch(&batch)?;
        writer.close()?;

        let content = std::fs::read_to_string(&path)?;
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some(schema_for(AnnotationKind::Entities).header_line().as_str())
        );
        assert!(content.contains("d1,\"Acme, Inc.\",ORG,0,"));
        assert!(content.contains("\"Line\nBreak\""));
        Ok(())
    }

    #[test]
    fn test_rejects_batch_of_other_kind() -> Result<()> {
        let dir = tempdir()?;
        let mut writer =
            CsvStagingWriter::new(dir.path().join("x.csv"), AnnotationKind::Morphology)?;
        let result = writer.write_batch(&Batch::new(AnnotationKind::Entities));
        assert!(matches!(result, Err(PipelineError::SchemaMismatch(_))));
        Ok(())
    }

    #[test]
    fn test_arrow_schema_nullability() {
        let schema = arrow_schema(schema_for(AnnotationKind::DependencyParse));
        assert_eq!(schema.fields().len(), 15);
        assert!(!schema.field(0).is_nullable());
        assert_eq!(schema.field_with_name("head_num").unwrap().data_type(), &DataType::Int64);
    }
}
