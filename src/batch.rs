//! Decoding of batches of independent sequences.

use std::time::Instant;

use rayon::prelude::*;
use rten_tensor::prelude::*;
use rten_tensor::NdTensorView;

use crate::alphabet::Alphabet;
use crate::decoder::{Hypothesis, TrieBeamSearch};
use crate::error::SequenceError;
use crate::greedy::decode_greedy;
use crate::threading::{thread_pool, ThreadPool};

/// Result of decoding one sequence in a batch.
pub type SequenceResult<T> = Result<T, SequenceError>;

/// Run `decode` on each sequence of `batch` in `pool`, preserving the order of
/// the batch.
fn decode_each<T: Send>(
    batch: &[NdTensorView<f32, 2>],
    pool: &ThreadPool,
    decode: impl Fn(NdTensorView<f32, 2>) -> Result<T, crate::error::DecodeError> + Sync,
) -> Vec<SequenceResult<T>> {
    let start = Instant::now();
    let results: Vec<SequenceResult<T>> = pool.run(|| {
        batch
            .par_iter()
            .enumerate()
            .map(|(index, emissions)| {
                decode(emissions.view()).map_err(|error| SequenceError { index, error })
            })
            .collect()
    });

    let failed = results.iter().filter(|result| result.is_err()).count();
    log::debug!(
        "Decoded batch of {} sequences in {:.2}ms using {} threads, {} failed",
        batch.len(),
        start.elapsed().as_secs_f64() * 1000.,
        pool.num_threads(),
        failed,
    );

    results
}

/// Split a `[batch, sequence, n_labels]` tensor into one view per sequence.
pub fn split_batch<'a>(batch: &NdTensorView<'a, f32, 3>) -> Vec<NdTensorView<'a, f32, 2>> {
    (0..batch.size(0)).map(|index| batch.slice(index)).collect()
}

impl TrieBeamSearch<'_> {
    /// Decode each sequence in a batch, using the thread pool returned by
    /// [`thread_pool`].
    ///
    /// Sequences are decoded independently and results are returned in the
    /// same order as `batch`. A sequence that fails to decode does not
    /// prevent the others from completing.
    pub fn decode_batch(&self, batch: &[NdTensorView<f32, 2>]) -> Vec<SequenceResult<Vec<Hypothesis>>> {
        self.decode_batch_in(batch, thread_pool())
    }

    /// Variant of [`decode_batch`](TrieBeamSearch::decode_batch) which uses a
    /// custom thread pool.
    pub fn decode_batch_in(
        &self,
        batch: &[NdTensorView<f32, 2>],
        pool: &ThreadPool,
    ) -> Vec<SequenceResult<Vec<Hypothesis>>> {
        decode_each(batch, pool, |emissions| self.decode(emissions))
    }

    /// Decode a `[batch, sequence, n_labels]` tensor of emissions.
    ///
    /// See [`decode_batch`](TrieBeamSearch::decode_batch).
    pub fn decode_batch_tensor(
        &self,
        batch: NdTensorView<f32, 3>,
    ) -> Vec<SequenceResult<Vec<Hypothesis>>> {
        self.decode_batch(&split_batch(&batch))
    }
}

/// Decode each sequence in a batch using [`decode_greedy`].
pub fn decode_greedy_batch(
    batch: &[NdTensorView<f32, 2>],
    alphabet: &Alphabet,
) -> Vec<SequenceResult<Hypothesis>> {
    decode_each(batch, thread_pool(), |emissions| {
        decode_greedy(emissions, alphabet)
    })
}
