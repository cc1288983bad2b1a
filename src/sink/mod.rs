// src/sink/mod.rs

pub mod bigquery;
pub mod credentials;
pub mod table_sink;
pub mod warehouse;

#[cfg(test)]
pub(crate) mod fake;

pub use bigquery::BigQueryClient;
pub use table_sink::TableSink;
pub use warehouse::{LoadOptions, LoadResult, TableRef, WarehouseClient, WarehouseError};
