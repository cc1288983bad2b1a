use crate::data_model::Batch;
use crate::error::Result;

/// Trait for writing batches of annotation rows to an output sink (e.g. a staging file).
pub trait BaseWriter {
    /// Write a batch of rows to the sink.
    fn write_batch(&mut self, batch: &Batch) -> Result<()>;

    /// Finalize and close the output writer.
    fn close(self) -> Result<()>;
}
