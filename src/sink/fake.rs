//! In-memory warehouse for unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::schema::ColumnSchema;
use crate::sink::warehouse::{
    JobHandle, JobStats, LoadOptions, TableInfo, TableRef, WarehouseClient, WarehouseError,
    WarehouseResult,
};

#[derive(Default)]
pub struct FakeWarehouse {
    pub datasets: RefCell<HashSet<String>>,
    pub tables: RefCell<HashMap<TableRef, (usize, u64)>>,
    pub dataset_creates: RefCell<usize>,
    pub table_creates: RefCell<usize>,
    /// Staging file contents seen by each load, in order.
    pub loads: RefCell<Vec<String>>,
    pub fail_loads: bool,
    pub query_result: Vec<Vec<Option<String>>>,
}

impl FakeWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        FakeWarehouse {
            fail_loads: true,
            ..Default::default()
        }
    }
}

impl WarehouseClient for FakeWarehouse {
    fn get_dataset(&self, _project: &str, dataset: &str) -> WarehouseResult<()> {
        if self.datasets.borrow().contains(dataset) {
            Ok(())
        } else {
            Err(WarehouseError::NotFound(dataset.to_string()))
        }
    }

    fn create_dataset(&self, _project: &str, dataset: &str) -> WarehouseResult<()> {
        if !self.datasets.borrow_mut().insert(dataset.to_string()) {
            return Err(WarehouseError::AlreadyExists(dataset.to_string()));
        }
        *self.dataset_creates.borrow_mut() += 1;
        Ok(())
    }

    fn get_table(&self, table: &TableRef) -> WarehouseResult<TableInfo> {
        self.tables
            .borrow()
            .get(table)
            .map(|(cols, rows)| TableInfo {
                num_rows: *rows,
                num_columns: *cols,
            })
            .ok_or_else(|| WarehouseError::NotFound(table.to_string()))
    }

    fn create_table(&self, table: &TableRef, schema: &ColumnSchema) -> WarehouseResult<()> {
        let mut tables = self.tables.borrow_mut();
        if tables.contains_key(table) {
            return Err(WarehouseError::AlreadyExists(table.to_string()));
        }
        tables.insert(table.clone(), (schema.len(), 0));
        *self.table_creates.borrow_mut() += 1;
        Ok(())
    }

    fn submit_load(
        &self,
        table: &TableRef,
        _schema: &ColumnSchema,
        staging_file: &Path,
        options: &LoadOptions,
    ) -> WarehouseResult<JobHandle> {
        let content = std::fs::read_to_string(staging_file)
            .map_err(|e| WarehouseError::Api {
                status: 400,
                message: e.to_string(),
            })?;
        let data_rows = content
            .lines()
            .skip(options.skip_leading_rows as usize)
            .count() as u64;
        self.loads.borrow_mut().push(content);
        if let Some(entry) = self.tables.borrow_mut().get_mut(table) {
            if !self.fail_loads {
                entry.1 += data_rows;
            }
        }
        Ok(JobHandle {
            project: table.project.clone(),
            job_id: format!("job_{}", self.loads.borrow().len()),
            location: None,
        })
    }

    fn wait_for_job(&self, job: &JobHandle) -> WarehouseResult<JobStats> {
        if self.fail_loads {
            return Err(WarehouseError::JobFailed {
                job_id: job.job_id.clone(),
                message: "Error while reading data, error message: too many bad records".into(),
            });
        }
        let rows = self
            .loads
            .borrow()
            .last()
            .map(|c| c.lines().count().saturating_sub(1) as u64)
            .unwrap_or(0);
        Ok(JobStats { output_rows: rows })
    }

    fn query_rows(&self, _project: &str, _sql: &str) -> WarehouseResult<Vec<Vec<Option<String>>>> {
        Ok(self.query_result.clone())
    }
}
