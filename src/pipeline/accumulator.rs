// src/pipeline/accumulator.rs

use crate::data_model::{AnnotationKind, AnnotationRow, Batch};
use crate::error::{PipelineError, Result};
use std::mem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    Empty,
    Accumulating,
    ReadyToFlush,
}

/// Buffers normalized rows across documents until a batch is due.
///
/// The threshold counts documents, not rows. A document that produced no rows still
/// counts, so the batch boundaries only depend on the input order.
#[derive(Debug)]
pub struct ChunkAccumulator {
    kind: AnnotationKind,
    threshold: usize,
    batch: Batch,
    state: AccumulatorState,
}

impl ChunkAccumulator {
    pub fn new(kind: AnnotationKind, threshold: usize) -> Self {
        ChunkAccumulator {
            kind,
            threshold: threshold.max(1),
            batch: Batch::new(kind),
            state: AccumulatorState::Empty,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    pub fn documents_in_batch(&self) -> usize {
        self.batch.documents
    }

    pub fn rows_in_batch(&self) -> usize {
        self.batch.len()
    }

    /// True when no document has been appended since the last flush.
    pub fn is_empty(&self) -> bool {
        self.batch.documents == 0
    }

    /// Adds one document's rows. Rows of another kind are rejected.
    pub fn append(&mut self, rows: Vec<AnnotationRow>) -> Result<()> {
        if let Some(row) = rows.iter().find(|r| r.kind() != self.kind) {
            return Err(PipelineError::SchemaMismatch(format!(
                "cannot append a {} row to a {} batch",
                row.kind(),
                self.kind
            )));
        }
        self.batch.rows.extend(rows);
        self.batch.documents += 1;
        self.state = AccumulatorState::Accumulating;
        Ok(())
    }

    /// Decides whether the current batch must be flushed, given how many documents are
    /// still waiting after the one just appended.
    ///
    /// A full batch is always due. When nothing is left the partial batch is due as well,
    /// which guarantees the trailing chunk is never dropped.
    pub fn should_flush(&mut self, remaining: usize) -> bool {
        if self.is_empty() {
            return false;
        }
        let due = self.batch.documents >= self.threshold || remaining == 0;
        if due {
            self.state = AccumulatorState::ReadyToFlush;
        }
        due
    }

    /// Hands the accumulated batch over and resets to `Empty`.
    pub fn flush(&mut self) -> Batch {
        self.state = AccumulatorState::Empty;
        mem::replace(&mut self.batch, Batch::new(self.kind))
    }
}
