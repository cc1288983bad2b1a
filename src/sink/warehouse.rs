// src/sink/warehouse.rs

use std::path::Path;

use thiserror::Error;

use crate::schema::ColumnSchema;

#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Warehouse API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

pub type WarehouseResult<T> = std::result::Result<T, WarehouseError>;

/// `project.dataset.table`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(project: impl Into<String>, dataset: impl Into<String>, table: impl Into<String>) -> Self {
        TableRef {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDisposition {
    Append,
    Truncate,
}

impl WriteDisposition {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            WriteDisposition::Append => "WRITE_APPEND",
            WriteDisposition::Truncate => "WRITE_TRUNCATE",
        }
    }
}

/// Settings for a CSV load job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    pub skip_leading_rows: u32,
    pub max_bad_records: u32,
    pub allow_quoted_newlines: bool,
    pub write_disposition: WriteDisposition,
}

impl Default for LoadOptions {
    /// Header row skipped, no malformed rows tolerated, quoted newlines allowed, append only.
    fn default() -> Self {
        LoadOptions {
            skip_leading_rows: 1,
            max_bad_records: 0,
            allow_quoted_newlines: true,
            write_disposition: WriteDisposition::Append,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableInfo {
    pub num_rows: u64,
    pub num_columns: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub project: String,
    pub job_id: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobStats {
    pub output_rows: u64,
}

/// Outcome of one successful batch load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult {
    pub table: String,
    pub job_id: String,
    pub rows_loaded: u64,
    pub columns_loaded: usize,
    pub table_rows: u64,
}

/// The warehouse operations the table sink and the warehouse reader need.
pub trait WarehouseClient {
    fn get_dataset(&self, project: &str, dataset: &str) -> WarehouseResult<()>;

    fn create_dataset(&self, project: &str, dataset: &str) -> WarehouseResult<()>;

    fn get_table(&self, table: &TableRef) -> WarehouseResult<TableInfo>;

    fn create_table(&self, table: &TableRef, schema: &ColumnSchema) -> WarehouseResult<()>;

    /// Uploads a staging file and starts a load job into `table`.
    fn submit_load(
        &self,
        table: &TableRef,
        schema: &ColumnSchema,
        staging_file: &Path,
        options: &LoadOptions,
    ) -> WarehouseResult<JobHandle>;

    /// Blocks until the job is done. A job that finished with an error is `JobFailed`.
    fn wait_for_job(&self, job: &JobHandle) -> WarehouseResult<JobStats>;

    /// Runs a query and returns every row as nullable strings.
    fn query_rows(&self, project: &str, sql: &str) -> WarehouseResult<Vec<Vec<Option<String>>>>;
}

impl<W: WarehouseClient + ?Sized> WarehouseClient for &W {
    fn get_dataset(&self, project: &str, dataset: &str) -> WarehouseResult<()> {
        (**self).get_dataset(project, dataset)
    }

    fn create_dataset(&self, project: &str, dataset: &str) -> WarehouseResult<()> {
        (**self).create_dataset(project, dataset)
    }

    fn get_table(&self, table: &TableRef) -> WarehouseResult<TableInfo> {
        (**self).get_table(table)
    }

    fn create_table(&self, table: &TableRef, schema: &ColumnSchema) -> WarehouseResult<()> {
        (**self).create_table(table, schema)
    }

    fn submit_load(
        &self,
        table: &TableRef,
        schema: &ColumnSchema,
        staging_file: &Path,
        options: &LoadOptions,
    ) -> WarehouseResult<JobHandle> {
        (**self).submit_load(table, schema, staging_file, options)
    }

    fn wait_for_job(&self, job: &JobHandle) -> WarehouseResult<JobStats> {
        (**self).wait_for_job(job)
    }

    fn query_rows(&self, project: &str, sql: &str) -> WarehouseResult<Vec<Vec<Option<String>>>> {
        (**self).query_rows(project, sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_load_options() {
        let options = LoadOptions::default();
        assert_eq!(options.skip_leading_rows, 1);
        assert_eq!(options.max_bad_records, 0);
        assert!(options.allow_quoted_newlines);
        assert_eq!(options.write_disposition.as_api_str(), "WRITE_APPEND");
    }

    #[test]
    fn test_table_ref_display() {
        let table = TableRef::new("p", "d", "t");
        assert_eq!(table.to_string(), "p.d.t");
    }
}
