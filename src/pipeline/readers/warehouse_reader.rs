// src/pipeline/readers/warehouse_reader.rs

use tracing::info;

use crate::data_model::DocumentRecord;
use crate::error::{PipelineError, Result};
use crate::pipeline::readers::base_reader::{BaseReader, DocumentIter};
use crate::sink::warehouse::{TableRef, WarehouseClient, WarehouseError};

/// Reads distinct, non-null (identifier, text) pairs from a warehouse table.
pub struct WarehouseReader<W> {
    client: W,
    table: TableRef,
    id_column: String,
    text_column: String,
}

impl<W: WarehouseClient> WarehouseReader<W> {
    pub fn new(
        client: W,
        table: TableRef,
        id_column: impl Into<String>,
        text_column: impl Into<String>,
    ) -> Self {
        WarehouseReader {
            client,
            table,
            id_column: id_column.into(),
            text_column: text_column.into(),
        }
    }

    pub fn query(&self) -> String {
        format!(
            "SELECT DISTINCT CAST(`{id}` AS STRING) AS id, CAST(`{text}` AS STRING) AS text \
             FROM `{table}` WHERE `{id}` IS NOT NULL AND `{text}` IS NOT NULL",
            id = self.id_column,
            text = self.text_column,
            table = self.table,
        )
    }
}

impl<W: WarehouseClient> BaseReader for WarehouseReader<W> {
    fn read_documents(&self) -> Result<DocumentIter> {
        match self.client.get_table(&self.table) {
            Ok(_) => {}
            Err(WarehouseError::NotFound(_)) => {
                return Err(PipelineError::InputError(format!(
                    "Input table '{}' not found",
                    self.table
                )))
            }
            Err(e) => return Err(e.into()),
        }

        let rows = self.client.query_rows(&self.table.project, &self.query())?;
        info!("Fetched {} rows from {}", rows.len(), self.table);

        let documents: Vec<Result<DocumentRecord>> = rows
            .into_iter()
            .enumerate()
            .filter_map(|(i, row)| {
                let mut cells = row.into_iter();
                match (cells.next().flatten(), cells.next().flatten()) {
                    (Some(id), Some(text)) => Some(Ok(DocumentRecord::new(id, text))),
                    (_, None) => None,
                    (None, Some(_)) => Some(Err(PipelineError::InputError(format!(
                        "Row {} of '{}' has text but no identifier",
                        i, self.table
                    )))),
                }
            })
            .collect();

        Ok(Box::new(documents.into_iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::fake::FakeWarehouse;

    fn some(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn test_query_text() {
        let reader = WarehouseReader::new(
            FakeWarehouse::new(),
            TableRef::new("p", "d", "speeches"),
            "doc_id",
            "body",
        );
        let sql = reader.query();
        assert!(sql.starts_with("SELECT DISTINCT CAST(`doc_id` AS STRING) AS id"));
        assert!(sql.contains("FROM `p.d.speeches`"));
        assert!(sql.ends_with("`doc_id` IS NOT NULL AND `body` IS NOT NULL"));
    }

    #[test]
    fn test_missing_input_table_is_input_error() {
        let reader = WarehouseReader::new(
            FakeWarehouse::new(),
            TableRef::new("p", "d", "missing"),
            "id",
            "text",
        );
        assert!(matches!(
            reader.read_documents(),
            Err(PipelineError::InputError(_))
        ));
    }

    #[test]
    fn test_rows_become_documents() -> Result<()> {
        let table = TableRef::new("p", "d", "speeches");
        let mut fake = FakeWarehouse::new();
        fake.tables.borrow_mut().insert(table.clone(), (2, 3));
        fake.query_result = vec![
            vec![some("1"), some("Hello")],
            vec![some("2"), None],
            vec![None, some("orphan")],
        ];

        let reader = WarehouseReader::new(fake, table, "id", "text");
        let docs: Vec<_> = reader.read_documents()?.collect();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].as_ref().unwrap(), &DocumentRecord::new("1", "Hello"));
        assert!(docs[1].is_err());
        Ok(())
    }
}
