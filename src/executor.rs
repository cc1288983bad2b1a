use std::collections::HashSet;
use std::time::Instant;

use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use crate::annotators::Annotator;
use crate::data_model::{DocumentRecord, WarehouseDestination};
use crate::error::Result;
use crate::pipeline::accumulator::ChunkAccumulator;
use crate::pipeline::chunking::compute_threshold;
use crate::pipeline::normalizer::normalize;
use crate::pipeline::readers::BaseReader;
use crate::sink::table_sink::TableSink;
use crate::sink::warehouse::WarehouseClient;
use crate::utils::metrics::{
    ANNOTATION_DURATION_SECONDS, DOCUMENTS_PROCESSED_TOTAL, DOCUMENTS_WITHOUT_ROWS_TOTAL,
    ROWS_IN_BATCH, ROWS_NORMALIZED_TOTAL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub documents_processed: usize,
    pub documents_without_rows: usize,
    pub duplicate_ids: usize,
    pub threshold: usize,
    pub batches_flushed: usize,
    pub rows_normalized: u64,
    pub rows_loaded: u64,
}

/// Drives one run: annotate, normalize, accumulate and load, strictly in input order.
pub struct PipelineExecutor<A, W> {
    annotator: A,
    sink: TableSink<W>,
    destination: WarehouseDestination,
    min_chunk: usize,
    max_chunk: usize,
}

impl<A: Annotator, W: WarehouseClient> PipelineExecutor<A, W> {
    pub fn new(
        annotator: A,
        sink: TableSink<W>,
        destination: WarehouseDestination,
        min_chunk: usize,
        max_chunk: usize,
    ) -> Self {
        if annotator.library() != destination.library {
            warn!(
                "Annotator library {} differs from destination library {}",
                annotator.library(),
                destination.library
            );
        }
        PipelineExecutor {
            annotator,
            sink,
            destination,
            min_chunk,
            max_chunk,
        }
    }

    pub fn sink(&self) -> &TableSink<W> {
        &self.sink
    }

    /// Reads every document up front; the chunk threshold depends on the total count.
    pub fn run_from_reader(&self, reader: &dyn BaseReader, progress: &ProgressBar) -> Result<RunSummary> {
        let documents = reader.read_documents()?.collect::<Result<Vec<_>>>()?;
        self.run(documents, progress)
    }

    pub fn run(&self, documents: Vec<DocumentRecord>, progress: &ProgressBar) -> Result<RunSummary> {
        let kind = self.destination.kind;
        let n_docs = documents.len();
        let threshold = compute_threshold(n_docs, self.min_chunk, self.max_chunk);
        let mut summary = RunSummary {
            threshold,
            ..Default::default()
        };

        if n_docs == 0 {
            info!("No documents to process");
            return Ok(summary);
        }
        info!(
            "Processing {} documents for {} with {}, flushing every {} documents into {}",
            n_docs,
            kind,
            self.annotator.library(),
            threshold,
            self.destination.table_id()
        );
        progress.set_length(n_docs as u64);

        let mut accumulator = ChunkAccumulator::new(kind, threshold);
        let mut seen_ids: HashSet<String> = HashSet::with_capacity(n_docs);

        for (position, document) in documents.iter().enumerate() {
            debug!(document_id = %document.id, "Processing document");
            if !seen_ids.insert(document.id.clone()) {
                warn!(document_id = %document.id, "Duplicate document id, word ids will collide");
                summary.duplicate_ids += 1;
            }

            let started = Instant::now();
            let annotated = self.annotator.annotate(document, kind)?;
            ANNOTATION_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

            let rows = normalize(kind, &document.id, &annotated)?;
            if rows.is_empty() {
                info!(document_id = %document.id, "No {} output found in document", kind);
                summary.documents_without_rows += 1;
                DOCUMENTS_WITHOUT_ROWS_TOTAL.inc();
            }
            summary.rows_normalized += rows.len() as u64;
            ROWS_NORMALIZED_TOTAL.inc_by(rows.len() as f64);

            accumulator.append(rows)?;
            summary.documents_processed += 1;
            DOCUMENTS_PROCESSED_TOTAL.inc();
            ROWS_IN_BATCH.set(accumulator.rows_in_batch() as f64);
            progress.inc(1);

            let remaining = n_docs - position - 1;
            if accumulator.should_flush(remaining) {
                self.flush(&mut accumulator, &mut summary)?;
            }
        }

        // Only reachable when the loop ends without a due check, kept so no rows are lost.
        if !accumulator.is_empty() {
            warn!("Flushing residual batch after the last document");
            self.flush(&mut accumulator, &mut summary)?;
        }

        progress.finish_with_message("Done");
        info!(
            "Finished: {} documents, {} without output, {} batches, {} rows loaded",
            summary.documents_processed,
            summary.documents_without_rows,
            summary.batches_flushed,
            summary.rows_loaded
        );
        Ok(summary)
    }

    fn flush(&self, accumulator: &mut ChunkAccumulator, summary: &mut RunSummary) -> Result<()> {
        let batch = accumulator.flush();
        ROWS_IN_BATCH.set(0.0);
        info!(
            "Flushing batch of {} rows from {} documents",
            batch.len(),
            batch.documents
        );
        if let Some(result) = self.sink.load(&batch, &self.destination)? {
            summary.rows_loaded += result.rows_loaded;
        }
        summary.batches_flushed += 1;
        Ok(())
    }
}
