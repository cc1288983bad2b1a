// src/pipeline/readers/mod.rs

pub mod base_reader;
pub mod csv_reader;
pub mod parquet_reader;
pub mod warehouse_reader;

pub use base_reader::{BaseReader, DocumentIter};
pub use csv_reader::CsvReader;
pub use parquet_reader::ParquetReader;
pub use warehouse_reader::WarehouseReader;
