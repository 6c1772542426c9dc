//! Lexicon and language-model constrained CTC beam search.

use std::time::Instant;

use rayon::prelude::*;
use rten_tensor::prelude::*;
use rten_tensor::NdTensorView;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::alphabet::Alphabet;
use crate::beam::{Beam, BeamTable, Mass, TextWeights};
use crate::candidates::CandidateGenerator;
use crate::config::DecoderConfig;
use crate::emission::{check_emissions, read_row};
use crate::error::{ConfigError, DecodeError};
use crate::lexicon::Lexicon;
use crate::lm::LanguageModel;
use crate::threading::thread_pool;

/// A decoded text and the scores used to rank it.
#[derive(Clone, Debug, PartialEq)]
pub struct Hypothesis {
    text: Beam,
    mass: Mass,
    text_weight: f64,
    score: f64,
}

impl Hypothesis {
    pub(crate) fn new(text: Beam, mass: Mass, text_weight: f64, gamma: f64) -> Hypothesis {
        Hypothesis {
            score: mass.total() * text_weight.powf(gamma),
            text,
            mass,
            text_weight,
        }
    }

    pub fn text(&self) -> &str {
        self.text.as_str()
    }

    /// Return the total probability of all paths through the emission matrix
    /// which produce this text.
    ///
    /// This is not normalized by the input length, so longer inputs tend to
    /// produce lower values.
    pub fn mass(&self) -> f64 {
        self.mass.total()
    }

    /// Return the probability mass split by whether paths end in a blank.
    pub fn split_mass(&self) -> Mass {
        self.mass
    }

    /// Return the language model weight of the text, or 1 if no language
    /// model was used.
    pub fn text_weight(&self) -> f64 {
        self.text_weight
    }

    /// Return the score used for ranking, `mass * text_weight ^ gamma`.
    pub fn score(&self) -> f64 {
        self.score
    }
}

/// Return the texts of a list of hypotheses.
pub fn texts(hypotheses: &[Hypothesis]) -> Vec<String> {
    hypotheses.iter().map(|hyp| hyp.text().to_string()).collect()
}

/// Builder for a [`TrieBeamSearch`] decoder.
pub struct TrieBeamSearchBuilder<'a> {
    alphabet: Alphabet,
    config: DecoderConfig,
    lexicon: Option<&'a dyn Lexicon>,
    lm: Option<&'a dyn LanguageModel>,
}

impl<'a> TrieBeamSearchBuilder<'a> {
    /// Set the search parameters. Defaults to [`DecoderConfig::default`].
    pub fn config(mut self, config: DecoderConfig) -> Self {
        self.config = config;
        self
    }

    /// Restrict decoded words to those in `lexicon`.
    pub fn lexicon(mut self, lexicon: &'a dyn Lexicon) -> Self {
        self.lexicon = Some(lexicon);
        self
    }

    /// Weight beams using a character-level language model.
    ///
    /// The model's influence is controlled by [`DecoderConfig::gamma`] and
    /// the context length by [`DecoderConfig::lm_order`].
    pub fn language_model(mut self, lm: &'a dyn LanguageModel) -> Self {
        self.lm = Some(lm);
        self
    }

    /// Validate the configuration and create the decoder.
    pub fn build(self) -> Result<TrieBeamSearch<'a>, ConfigError> {
        self.config.validate(self.lm.is_some())?;
        Ok(TrieBeamSearch {
            alphabet: self.alphabet,
            config: self.config,
            lexicon: self.lexicon,
            lm: self.lm,
        })
    }
}

/// A beam that survived pruning, with the values used to rank it.
#[derive(Clone, Debug)]
struct RankedBeam {
    beam: Beam,
    mass: Mass,
    text_weight: f64,
    score: f64,
}

/// Accumulators and newly created text weights produced by expanding one or
/// more beams for a single timestep.
#[derive(Default)]
struct Expansion {
    table: BeamTable,
    weights: FxHashMap<Beam, f64>,
}

impl Expansion {
    fn merge(&mut self, other: Expansion) {
        self.table.merge(other.table);
        for (beam, weight) in other.weights {
            self.weights.entry(beam).or_insert(weight);
        }
    }
}

/// CTC beam search decoder which can constrain output to the words of a
/// lexicon and weight beams using a character-level language model.
///
/// The decoder takes a `[sequence, n_labels]` matrix of label probabilities
/// (not log probabilities), where the final label is the CTC blank, and
/// returns the most likely texts.
///
/// At each timestep every surviving beam is extended by each of its candidate
/// labels (see [`CandidateGenerator`]). The probability mass of each
/// resulting text is accumulated separately for paths which end in a blank
/// and paths which do not, following the CTC rules for collapsing repeated
/// labels. Beams are then ranked by `mass * text_weight ^ gamma` and only the
/// best [`beam_width`](DecoderConfig::beam_width) are kept.
///
/// With no lexicon or language model this is a standard CTC prefix beam
/// search. Like any beam search it is a heuristic and may miss the most
/// probable text.
///
/// ```
/// use hwr_decode::{Alphabet, DecoderConfig, TrieBeamSearch};
/// use rten_tensor::prelude::*;
/// use rten_tensor::NdTensor;
///
/// let alphabet = Alphabet::new("ab").unwrap();
/// let decoder = TrieBeamSearch::builder(alphabet)
///     .config(DecoderConfig {
///         beam_width: 3,
///         top_paths: 3,
///         gamma: 0.,
///         ..Default::default()
///     })
///     .build()
///     .unwrap();
///
/// let emissions = NdTensor::from_data([2, 3], vec![0.6, 0.3, 0.1, 0.1, 0.1, 0.8]);
/// let hyps = decoder.decode(emissions.view()).unwrap();
/// assert_eq!(hwr_decode::texts(&hyps), ["a", "b", ""]);
/// ```
pub struct TrieBeamSearch<'a> {
    alphabet: Alphabet,
    config: DecoderConfig,
    lexicon: Option<&'a dyn Lexicon>,
    lm: Option<&'a dyn LanguageModel>,
}

impl<'a> TrieBeamSearch<'a> {
    /// Start building a decoder for emission matrices over `alphabet`.
    pub fn builder(alphabet: Alphabet) -> TrieBeamSearchBuilder<'a> {
        TrieBeamSearchBuilder {
            alphabet,
            config: DecoderConfig::default(),
            lexicon: None,
            lm: None,
        }
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decode a `[sequence, n_labels]` emission matrix and return up to
    /// [`top_paths`](DecoderConfig::top_paths) hypotheses, best first.
    ///
    /// An input with no timesteps decodes to a single empty hypothesis.
    pub fn decode(&self, emissions: NdTensorView<f32, 2>) -> Result<Vec<Hypothesis>, DecodeError> {
        let mut beams = self.search(&emissions, |_| {})?;
        beams.truncate(self.config.top_paths);
        Ok(beams
            .into_iter()
            .map(|ranked| {
                Hypothesis::new(
                    ranked.beam,
                    ranked.mass,
                    ranked.text_weight,
                    self.config.gamma,
                )
            })
            .collect())
    }

    /// Decode a `[sequence, n_labels]` emission matrix and return the texts of
    /// the best hypotheses.
    pub fn decode_texts(&self, emissions: NdTensorView<f32, 2>) -> Result<Vec<String>, DecodeError> {
        self.decode(emissions).map(|hyps| texts(&hyps))
    }

    /// Decode a sequence and return the texts of the beams that survive
    /// pruning after each timestep, best first.
    ///
    /// The first entry is the initial state, before any timestep. This is
    /// mainly useful for inspecting how the search proceeds.
    pub fn trace(&self, emissions: NdTensorView<f32, 2>) -> Result<Vec<Vec<String>>, DecodeError> {
        let mut steps = Vec::new();
        self.search(&emissions, |beams| {
            steps.push(
                beams
                    .iter()
                    .map(|ranked| ranked.beam.as_str().to_string())
                    .collect(),
            )
        })?;
        Ok(steps)
    }

    /// Run the search, calling `on_step` with the initial beams and then with
    /// the surviving beams after each timestep, and return the beams
    /// surviving the final timestep.
    fn search(
        &self,
        emissions: &NdTensorView<f32, 2>,
        mut on_step: impl FnMut(&[RankedBeam]),
    ) -> Result<Vec<RankedBeam>, DecodeError> {
        check_emissions(emissions, &self.alphabet)?;

        let start = Instant::now();
        let [seq, _] = emissions.shape();
        let generator =
            CandidateGenerator::new(&self.alphabet, self.lexicon, self.config.candidate_cap);

        let mut weights = TextWeights::new();
        let mut beams = vec![RankedBeam {
            beam: Beam::empty(),
            mass: Mass::initial(),
            text_weight: 1.,
            score: 1.,
        }];
        let mut row = Vec::with_capacity(self.alphabet.num_labels());
        on_step(&beams);

        for t in 0..seq {
            read_row(emissions, t, &mut row);

            let expansion = if self.config.parallel_beams {
                self.expand_parallel(&generator, &beams, &row, &weights)?
            } else {
                self.expand_sequential(&generator, &beams, &row, &weights)?
            };

            for (beam, weight) in expansion.weights {
                weights.insert(beam, weight);
            }
            beams = self.prune(expansion.table, &weights, self.config.beam_width);
            on_step(&beams);

            log::trace!(
                "Timestep {}: {} beams, best {:?}",
                t,
                beams.len(),
                beams.first().map(|ranked| ranked.beam.as_str()),
            );
        }

        log::debug!(
            "Decoded {} timesteps in {:.2}ms, {} beams, {} distinct texts",
            seq,
            start.elapsed().as_secs_f64() * 1000.,
            beams.len(),
            weights.len(),
        );

        Ok(beams)
    }

    fn expand_sequential(
        &self,
        generator: &CandidateGenerator,
        beams: &[RankedBeam],
        row: &[f32],
        weights: &TextWeights,
    ) -> Result<Expansion, DecodeError> {
        let mut expansion = Expansion::default();
        for ranked in beams {
            self.expand_beam(generator, ranked, row, weights, &mut expansion)?;
        }
        Ok(expansion)
    }

    /// Expand each beam into a private table on a separate task, then sum
    /// the tables in beam order.
    ///
    /// Each beam contributes at most once to any accumulator, so this
    /// produces the same values and beam order as `expand_sequential`.
    ///
    /// Tasks run in the pool returned by [`thread_pool`], unless this is
    /// already called from a Rayon pool, such as when decoding a batch.
    fn expand_parallel(
        &self,
        generator: &CandidateGenerator,
        beams: &[RankedBeam],
        row: &[f32],
        weights: &TextWeights,
    ) -> Result<Expansion, DecodeError> {
        let expand = || {
            beams
                .par_iter()
                .map(|ranked| {
                    let mut partial = Expansion::default();
                    self.expand_beam(generator, ranked, row, weights, &mut partial)?;
                    Ok(partial)
                })
                .collect::<Result<Vec<_>, DecodeError>>()
        };
        let partials = if rayon::current_thread_index().is_some() {
            expand()?
        } else {
            thread_pool().run(expand)?
        };

        let mut expansion = Expansion::default();
        for partial in partials {
            expansion.merge(partial);
        }
        Ok(expansion)
    }

    /// Extend one beam by each of its candidate labels, adding the results
    /// to `out`.
    fn expand_beam(
        &self,
        generator: &CandidateGenerator,
        ranked: &RankedBeam,
        row: &[f32],
        weights: &TextWeights,
        out: &mut Expansion,
    ) -> Result<(), DecodeError> {
        let RankedBeam {
            beam, mass: prev, ..
        } = ranked;
        let blank = self.alphabet.blank();

        for label in generator.candidates(beam, row)? {
            let prob = row[label] as f64;
            if label == blank {
                out.table.extend_blank(beam, *prev, prob);
                continue;
            }

            let Some(ch) = self.alphabet.char(label) else {
                continue;
            };
            let new_beam = out.table.extend_char(beam, *prev, ch, prob);
            if !weights.contains(&new_beam) && !out.weights.contains_key(&new_beam) {
                let weight = self.text_weight(beam, ch)?;
                out.weights.insert(new_beam, weight);
            }
        }

        Ok(())
    }

    /// Compute the language model weight for the text `beam + ch`.
    ///
    /// The context is the last `lm_order - 1` characters of the lowercased
    /// beam. A character whose lowercase form has several characters, such
    /// as 'İ', is scored as the first of them.
    fn text_weight(&self, beam: &Beam, ch: char) -> Result<f64, DecodeError> {
        let Some(lm) = self.lm else {
            return Ok(1.);
        };

        let context_len = self.config.lm_order.saturating_sub(1);
        let lowercase: SmallVec<[char; 8]> = beam
            .tail(context_len)
            .chars()
            .flat_map(char::to_lowercase)
            .collect();
        let context = &lowercase[lowercase.len().saturating_sub(context_len)..];
        let ch = ch.to_lowercase().next().unwrap_or(ch);

        let score = lm.score(ch, context);
        if !(score.is_finite() && score >= 0.) {
            return Err(DecodeError::InvalidLmScore { ch, score });
        }
        Ok(score)
    }

    /// Rank the beams in `table` and return the best `limit`.
    ///
    /// Beams with no probability mass are dropped. Ties keep the order in
    /// which beams were first produced.
    fn prune(&self, table: BeamTable, weights: &TextWeights, limit: usize) -> Vec<RankedBeam> {
        let mut ranked: Vec<RankedBeam> = table
            .into_entries()
            .into_iter()
            .filter(|(_, mass)| mass.total() > 0.)
            .map(|(beam, mass)| {
                let text_weight = weights.get(&beam).unwrap_or(1.);
                RankedBeam {
                    score: mass.total() * text_weight.powf(self.config.gamma),
                    beam,
                    mass,
                    text_weight,
                }
            })
            .collect();

        // `sort_by` is stable.
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(limit);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use hwr_testing::{assert_close, emissions, TestCases};
    use rten_tensor::prelude::*;
    use rten_tensor::NdTensor;

    use super::{texts, TrieBeamSearch};
    use crate::alphabet::Alphabet;
    use crate::config::DecoderConfig;
    use crate::error::{ConfigError, DecodeError};
    use crate::lexicon::Lexicon;
    use crate::lm::LanguageModel;

    fn config(beam_width: usize, top_paths: usize) -> DecoderConfig {
        DecoderConfig {
            beam_width,
            top_paths,
            candidate_cap: 100,
            gamma: 0.,
            lm_order: 1,
            parallel_beams: false,
        }
    }

    fn worked_example() -> NdTensor<f32, 2> {
        emissions(&[[0.6, 0.3, 0.1], [0.1, 0.1, 0.8]])
    }

    /// Lexicon which knows the single word "cat".
    struct Cat;

    impl Lexicon for Cat {
        fn is_word(&self, text: &str) -> bool {
            text == "cat"
        }

        fn char_candidates(&self, prefix: &str) -> Vec<char> {
            "cat"
                .strip_prefix(prefix)
                .and_then(|rest| rest.chars().next())
                .into_iter()
                .collect()
        }
    }

    /// Language model which scores each character by a fixed table,
    /// ignoring context.
    struct Unigram(&'static [(char, f64)]);

    impl LanguageModel for Unigram {
        fn score(&self, ch: char, _context: &[char]) -> f64 {
            self.0
                .iter()
                .find(|(c, _)| *c == ch)
                .map(|(_, score)| *score)
                .unwrap_or(0.01)
        }
    }

    #[test]
    fn test_worked_example() {
        let alphabet = Alphabet::new("ab").unwrap();
        let decoder = TrieBeamSearch::builder(alphabet)
            .config(config(3, 3))
            .build()
            .unwrap();

        let input = worked_example();
        let steps = decoder.trace(input.view()).unwrap();
        assert_eq!(steps, [vec![""], vec!["a", "b", ""], vec!["a", "b", ""]]);

        let hyps = decoder.decode(input.view()).unwrap();
        assert_eq!(texts(&hyps), ["a", "b", ""]);
        assert_close(hyps[0].mass(), 0.55, 1e-6);
        assert_close(hyps[1].mass(), 0.28, 1e-6);
        assert_close(hyps[2].mass(), 0.08, 1e-6);

        // "a" is produced by "a-", "aa" and "-a".
        assert_close(hyps[0].split_mass().blank, 0.48, 1e-6);
        assert_close(hyps[0].split_mass().non_blank, 0.07, 1e-6);
    }

    #[test]
    fn test_empty_input() {
        let alphabet = Alphabet::new("ab").unwrap();
        let decoder = TrieBeamSearch::builder(alphabet)
            .config(config(3, 3))
            .build()
            .unwrap();
        let input = NdTensor::<f32, 2>::zeros([0, 3]);
        let hyps = decoder.decode(input.view()).unwrap();
        assert_eq!(texts(&hyps), [""]);
        assert_eq!(hyps[0].score(), 1.);

        // The trace holds only the initial state.
        assert_eq!(decoder.trace(input.view()).unwrap(), [vec![""]]);
    }

    #[test]
    fn test_width_bound() {
        #[derive(Debug)]
        struct Case {
            beam_width: usize,
        }

        let cases = [1, 2, 3, 5, 10].map(|beam_width| Case { beam_width });

        cases.test_each(|&Case { beam_width }| {
            let alphabet = Alphabet::new("abc").unwrap();
            let decoder = TrieBeamSearch::builder(alphabet)
                .config(config(beam_width, 100))
                .build()
                .unwrap();
            let input = emissions(&[
                [0.3, 0.3, 0.2, 0.2],
                [0.2, 0.4, 0.1, 0.3],
                [0.25, 0.25, 0.25, 0.25],
                [0.1, 0.2, 0.3, 0.4],
            ]);
            let steps = decoder.trace(input.view()).unwrap();
            for beams in &steps {
                assert!(beams.len() <= beam_width);
            }
            let hyps = decoder.decode(input.view()).unwrap();
            assert!(hyps.len() <= beam_width);
        })
    }

    #[test]
    fn test_repeats_need_blank() {
        let alphabet = Alphabet::new("ab").unwrap();
        let decoder = TrieBeamSearch::builder(alphabet)
            .config(config(10, 1))
            .build()
            .unwrap();

        // "a a" with no blank in between collapses to "a".
        let input = emissions(&[[1., 0., 0.], [1., 0., 0.]]);
        assert_eq!(decoder.decode_texts(input.view()).unwrap(), ["a"]);

        // A blank between the two "a"s gives "aa".
        let input = emissions(&[[1., 0., 0.], [0., 0., 1.], [1., 0., 0.]]);
        assert_eq!(decoder.decode_texts(input.view()).unwrap(), ["aa"]);
    }

    #[test]
    fn test_beam_sums_paths() {
        // The most likely single path is blank-blank, but the total
        // probability of paths that produce "a" is higher.
        let alphabet = Alphabet::new("a").unwrap();
        let decoder = TrieBeamSearch::builder(alphabet)
            .config(config(10, 2))
            .build()
            .unwrap();
        let input = emissions(&[[0.2, 0.8], [0.4, 0.6]]);
        let hyps = decoder.decode(input.view()).unwrap();
        assert_eq!(texts(&hyps), ["a", ""]);
        assert_close(hyps[0].mass(), 0.8 * 0.4 + 0.2 * 0.6 + 0.2 * 0.4, 1e-6);
        assert_close(hyps[1].mass(), 0.8 * 0.6, 1e-6);

        // With a beam width of 1, the search follows the greedy path.
        let decoder = TrieBeamSearch::builder(Alphabet::new("a").unwrap())
            .config(config(1, 1))
            .build()
            .unwrap();
        assert_eq!(decoder.decode_texts(input.view()).unwrap(), [""]);
    }

    #[test]
    fn test_lexicon_constraint() {
        let alphabet = Alphabet::new("abct").unwrap();
        let lexicon = Cat;
        let decoder = TrieBeamSearch::builder(alphabet)
            .config(config(10, 3))
            .lexicon(&lexicon)
            .build()
            .unwrap();

        // Labels: a b c t blank. The final frame prefers "b" over "t".
        let input = emissions(&[
            [0.05, 0.05, 0.8, 0.05, 0.05],
            [0.8, 0.05, 0.05, 0.05, 0.05],
            [0.05, 0.6, 0.05, 0.25, 0.05],
        ]);
        let hyps = texts(&decoder.decode(input.view()).unwrap());
        assert_eq!(hyps[0], "cat");
        assert!(hyps.iter().all(|text| "cat".starts_with(text.as_str())));

        // Without the lexicon, "cab" wins.
        let unconstrained = TrieBeamSearch::builder(Alphabet::new("abct").unwrap())
            .config(config(10, 1))
            .build()
            .unwrap();
        assert_eq!(unconstrained.decode_texts(input.view()).unwrap(), ["cab"]);
    }

    #[test]
    fn test_language_model_reranks() {
        let input = emissions(&[[0.45, 0.55, 0.], [0., 0., 1.]]);
        let lm = Unigram(&[('a', 0.9), ('b', 0.1)]);

        let decode = |gamma: f64| {
            let decoder = TrieBeamSearch::builder(Alphabet::new("ab").unwrap())
                .config(DecoderConfig {
                    gamma,
                    lm_order: 2,
                    ..config(5, 2)
                })
                .language_model(&lm)
                .build()
                .unwrap();
            decoder.decode(input.view()).unwrap()
        };

        // With gamma = 0 the language model has no effect.
        let hyps = decode(0.);
        assert_eq!(texts(&hyps), ["b", "a"]);
        assert_close(hyps[0].score(), 0.55, 1e-6);
        assert_close(hyps[0].text_weight(), 0.1, 1e-9);

        let hyps = decode(1.);
        assert_eq!(texts(&hyps), ["a", "b"]);
        assert_close(hyps[0].score(), 0.45 * 0.9, 1e-6);
        assert_close(hyps[1].score(), 0.55 * 0.1, 1e-6);
    }

    #[test]
    fn test_language_model_context() {
        use std::sync::Mutex;

        /// Records the queries it receives.
        struct Recorder(Mutex<Vec<(char, String)>>);

        impl LanguageModel for Recorder {
            fn score(&self, ch: char, context: &[char]) -> f64 {
                self.0
                    .lock()
                    .unwrap()
                    .push((ch, context.iter().collect()));
                0.5
            }
        }

        let lm = Recorder(Mutex::new(Vec::new()));
        let decoder = TrieBeamSearch::builder(Alphabet::new("AbC").unwrap())
            .config(DecoderConfig {
                gamma: 1.,
                lm_order: 3,
                ..config(1, 1)
            })
            .language_model(&lm)
            .build()
            .unwrap();

        // Labels: A b C blank. The greedy path spells "AbC".
        let input = emissions(&[
            [1., 0., 0., 0.],
            [0., 1., 0., 0.],
            [0., 0., 1., 0.],
        ]);
        assert_eq!(decoder.decode_texts(input.view()).unwrap(), ["AbC"]);

        // Each new text is scored once, using up to two lowercased characters
        // of context.
        let queries = lm.0.lock().unwrap();
        let expected: Vec<(char, String)> = [
            ('a', ""),
            ('b', ""),
            ('c', ""),
            ('a', "a"),
            ('b', "a"),
            ('c', "a"),
            ('a', "ab"),
            ('b', "ab"),
            ('c', "ab"),
        ]
        .iter()
        .map(|(ch, ctx)| (*ch, ctx.to_string()))
        .collect();
        assert_eq!(*queries, expected);
    }

    #[test]
    fn test_invalid_lm_score() {
        struct Broken;

        impl LanguageModel for Broken {
            fn score(&self, _ch: char, _context: &[char]) -> f64 {
                f64::NAN
            }
        }

        let lm = Broken;
        let decoder = TrieBeamSearch::builder(Alphabet::new("ab").unwrap())
            .config(DecoderConfig {
                lm_order: 2,
                ..config(3, 1)
            })
            .language_model(&lm)
            .build()
            .unwrap();
        let err = decoder.decode(worked_example().view()).err();
        assert!(matches!(err, Some(DecodeError::InvalidLmScore { ch: 'a', .. })));
    }

    #[test]
    fn test_malformed_input() {
        let decoder = TrieBeamSearch::builder(Alphabet::new("abc").unwrap())
            .config(config(3, 1))
            .build()
            .unwrap();
        let err = decoder.decode(worked_example().view()).err();
        assert_eq!(
            err,
            Some(DecodeError::RowWidthMismatch {
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn test_invalid_config() {
        let lm = Unigram(&[]);
        let result = TrieBeamSearch::builder(Alphabet::new("ab").unwrap())
            .config(DecoderConfig {
                lm_order: 0,
                ..config(3, 1)
            })
            .language_model(&lm)
            .build();
        assert_eq!(result.err(), Some(ConfigError::InvalidLmOrder(0)));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let lexicon = Cat;
        let lm = Unigram(&[('c', 0.5), ('a', 0.3), ('t', 0.2)]);
        let input = emissions(&[
            [0.1, 0.1, 0.4, 0.1, 0.3],
            [0.3, 0.1, 0.1, 0.2, 0.3],
            [0.3, 0.1, 0.1, 0.2, 0.3],
            [0.1, 0.3, 0.1, 0.4, 0.1],
            [0.2, 0.2, 0.2, 0.2, 0.2],
        ]);

        let decode = |parallel_beams: bool, with_lexicon: bool| {
            let mut builder = TrieBeamSearch::builder(Alphabet::new("abct").unwrap())
                .config(DecoderConfig {
                    gamma: 0.7,
                    lm_order: 3,
                    parallel_beams,
                    ..config(8, 8)
                })
                .language_model(&lm);
            if with_lexicon {
                builder = builder.lexicon(&lexicon);
            }
            builder.build().unwrap().decode(input.view()).unwrap()
        };

        for with_lexicon in [false, true] {
            let sequential = decode(false, with_lexicon);
            let parallel = decode(true, with_lexicon);
            assert_eq!(sequential, parallel);
            assert_eq!(sequential, decode(false, with_lexicon));
        }
    }

    #[test]
    fn test_zero_mass_beams_are_dropped() {
        let decoder = TrieBeamSearch::builder(Alphabet::new("ab").unwrap())
            .config(config(3, 3))
            .build()
            .unwrap();

        // "b" has zero probability, so it never becomes a beam.
        let input = emissions(&[[0.6, 0., 0.4]]);
        let hyps = decoder.decode(input.view()).unwrap();
        assert_eq!(texts(&hyps), ["a", ""]);
        assert_eq!(decoder.trace(input.view()).unwrap()[1], ["a", ""]);

        // A timestep where every label has zero probability leaves no beams.
        let input = emissions(&[[0.6, 0.3, 0.1], [0., 0., 0.], [0.5, 0.25, 0.25]]);
        assert!(decoder.decode(input.view()).unwrap().is_empty());
        let steps = decoder.trace(input.view()).unwrap();
        assert_eq!(steps.len(), 4);
        assert!(steps[2].is_empty());
        assert!(steps[3].is_empty());
    }

    #[test]
    fn test_language_model_context_multi_char_lowercase() {
        use std::sync::Mutex;

        struct Recorder(Mutex<Vec<(char, String)>>);

        impl LanguageModel for Recorder {
            fn score(&self, ch: char, context: &[char]) -> f64 {
                self.0
                    .lock()
                    .unwrap()
                    .push((ch, context.iter().collect()));
                0.5
            }
        }

        let lm = Recorder(Mutex::new(Vec::new()));
        let decoder = TrieBeamSearch::builder(Alphabet::new("İa").unwrap())
            .config(DecoderConfig {
                gamma: 1.,
                lm_order: 2,
                ..config(1, 1)
            })
            .language_model(&lm)
            .build()
            .unwrap();

        // Labels: İ a blank. The greedy path spells "İa".
        let input = emissions(&[[1., 0., 0.], [0., 1., 0.]]);
        assert_eq!(decoder.decode_texts(input.view()).unwrap(), ["İa"]);

        // 'İ' lowercases to "i\u{307}". The context is limited to the last
        // character of that.
        let queries = lm.0.lock().unwrap();
        let expected: Vec<(char, String)> = [
            ('i', ""),
            ('a', ""),
            ('i', "\u{307}"),
            ('a', "\u{307}"),
        ]
        .iter()
        .map(|(ch, ctx)| (*ch, ctx.to_string()))
        .collect();
        assert_eq!(*queries, expected);
    }

    #[test]
    fn test_parallel_beams_use_thread_pool() {
        use std::sync::Mutex;

        /// Records the name of the thread each query runs on.
        struct ThreadNames(Mutex<Vec<Option<String>>>);

        impl LanguageModel for ThreadNames {
            fn score(&self, _ch: char, _context: &[char]) -> f64 {
                let name = std::thread::current().name().map(|name| name.to_string());
                self.0.lock().unwrap().push(name);
                0.5
            }
        }

        let lm = ThreadNames(Mutex::new(Vec::new()));
        let decoder = TrieBeamSearch::builder(Alphabet::new("ab").unwrap())
            .config(DecoderConfig {
                gamma: 1.,
                lm_order: 2,
                parallel_beams: true,
                ..config(3, 3)
            })
            .language_model(&lm)
            .build()
            .unwrap();
        decoder.decode(worked_example().view()).unwrap();

        let names = lm.0.lock().unwrap();
        assert!(!names.is_empty());
        for name in names.iter() {
            assert!(
                name.as_deref().is_some_and(|name| name.starts_with("hwr-decode-")),
                "query ran on thread {:?}",
                name
            );
        }
    }
}
