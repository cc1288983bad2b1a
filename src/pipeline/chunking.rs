// src/pipeline/chunking.rs

pub const DEFAULT_MIN_CHUNK: usize = 5000;
pub const DEFAULT_MAX_CHUNK: usize = 10000;

/// Picks how many documents go into one batch.
///
/// Candidates are scanned from `max_chunk` down to `min_chunk`, and the first one that
/// divides `n_docs` evenly wins, so the run ends without a small trailing batch. When no
/// candidate divides the corpus, `min_chunk` is returned.
///
/// `n_docs == 0` is divisible by everything and yields `max_chunk`.
pub fn compute_threshold(n_docs: usize, min_chunk: usize, max_chunk: usize) -> usize {
    if min_chunk == 0 || min_chunk > max_chunk {
        // Degenerate bounds are rejected by config validation; never return 0 here.
        return min_chunk.max(1);
    }
    (min_chunk..=max_chunk)
        .rev()
        .find(|candidate| n_docs % candidate == 0)
        .unwrap_or(min_chunk)
}
