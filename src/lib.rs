#![allow(non_snake_case)]
#![allow(clippy::too_many_arguments)]

pub mod annotators;
pub mod config;
pub mod data_model;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod schema;
pub mod sink;
pub mod utils;

pub use error::{PipelineError, Result};
pub use executor::{PipelineExecutor, RunSummary};
