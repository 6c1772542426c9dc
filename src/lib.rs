//! hwr-decode turns the per-timestep label probabilities produced by a
//! handwriting or speech recognition model trained with
//! [CTC](https://distill.pub/2017/ctc/) into text.
//!
//! # Decoding
//!
//! The input to decoding is a `[sequence, n_labels]` matrix of probabilities
//! (see [rten-tensor](rten_tensor)), where each label except the last
//! corresponds to a character of an [`Alphabet`] and the last label is the
//! CTC blank.
//!
//! - [`decode_greedy`] chooses the most likely label at each timestep. It is
//!   fast but can only return one result.
//! - [`TrieBeamSearch`] performs a beam search which sums the probabilities
//!   of all paths that produce the same text. It can optionally restrict
//!   output to the words of a [`Lexicon`] and rerank beams using a
//!   character-level [`LanguageModel`].
//!
//! The lexicon and language model are supplied by the caller through traits.
//! This crate does not build them.
//!
//! ## Threading
//!
//! Batches of sequences can be decoded in parallel using
//! [`TrieBeamSearch::decode_batch`]. This uses a Rayon
//! [ThreadPool](https://docs.rs/rayon/latest/rayon/struct.ThreadPool.html)
//! which is sized to match the number of physical cores, or the value of the
//! `HWR_NUM_THREADS` environment variable if set. You can access this pool
//! using [`thread_pool`].
//!
//! Setting [`DecoderConfig::parallel_beams`] additionally expands the beams
//! of each timestep in parallel. Results are identical either way.
//!
//! ## Logging
//!
//! Timing and progress details are reported using the
//! [log](https://docs.rs/log) crate at `debug` and `trace` levels.

mod alphabet;
mod batch;
mod beam;
mod candidates;
mod config;
mod decoder;
mod emission;
mod env;
mod error;
mod greedy;
mod lexicon;
mod lm;
mod threading;

pub use alphabet::Alphabet;
pub use batch::{decode_greedy_batch, split_batch, SequenceResult};
pub use beam::{Beam, BeamTable, Mass, TextWeights};
pub use candidates::{CandidateGenerator, CandidateSet};
pub use config::DecoderConfig;
pub use decoder::{texts, Hypothesis, TrieBeamSearch, TrieBeamSearchBuilder};
pub use emission::check_emissions;
pub use error::{ConfigError, DecodeError, SequenceError};
pub use greedy::decode_greedy;
pub use lexicon::Lexicon;
pub use lm::LanguageModel;
pub use threading::{thread_pool, ThreadPool};
