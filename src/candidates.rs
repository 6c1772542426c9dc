//! Selection of the labels which may extend a beam at a given timestep.

use smallvec::SmallVec;

use crate::alphabet::Alphabet;
use crate::beam::Beam;
use crate::error::DecodeError;
use crate::lexicon::Lexicon;

/// Labels that may extend a beam at one timestep, in the order they should
/// be applied.
pub type CandidateSet = SmallVec<[usize; 32]>;

/// Generates the candidate labels for extending each beam.
///
/// Without a lexicon every label is a candidate. With a lexicon, the
/// characters that may follow the beam's pending word fragment are
/// candidates, plus capitalized word starts and separators at word
/// boundaries. The blank is always a candidate.
///
/// If there are more than `cap` candidates, only the `cap` most probable at
/// the current timestep are kept. This is a local heuristic: a path that is
/// pruned here can not be recovered later, even if it would have become the
/// best path.
pub struct CandidateGenerator<'a> {
    alphabet: &'a Alphabet,
    lexicon: Option<&'a dyn Lexicon>,
    cap: usize,
}

impl<'a> CandidateGenerator<'a> {
    pub fn new(
        alphabet: &'a Alphabet,
        lexicon: Option<&'a dyn Lexicon>,
        cap: usize,
    ) -> CandidateGenerator<'a> {
        CandidateGenerator {
            alphabet,
            lexicon,
            cap,
        }
    }

    /// Return the labels which may extend `beam`, given the probabilities
    /// `row` of each label at the current timestep.
    pub fn candidates(&self, beam: &Beam, row: &[f32]) -> Result<CandidateSet, DecodeError> {
        let mut labels = CandidateSet::new();
        match self.lexicon {
            Some(lexicon) => self.lexicon_candidates(lexicon, beam, &mut labels)?,
            None => labels.extend(0..self.alphabet.num_labels()),
        }

        if labels.len() > self.cap {
            // Most probable first. Ties keep alphabet order, so the blank
            // loses ties.
            labels.sort_by(|&a, &b| row[b].total_cmp(&row[a]).then(a.cmp(&b)));
            labels.truncate(self.cap);
        }

        Ok(labels)
    }

    fn lexicon_candidates(
        &self,
        lexicon: &dyn Lexicon,
        beam: &Beam,
        labels: &mut CandidateSet,
    ) -> Result<(), DecodeError> {
        let fragment: String = beam
            .pending_fragment()
            .chars()
            .flat_map(char::to_lowercase)
            .collect();
        let next_chars = lexicon.char_candidates(&fragment);

        for &ch in &next_chars {
            if !is_lowercase(ch) {
                return Err(DecodeError::InvalidLexiconCandidate {
                    prefix: fragment,
                    ch,
                });
            }
            if let Some(label) = self.alphabet.label(ch) {
                push_unique(labels, label);
            }
        }

        // At a word boundary, a new word may start with a capital, or the
        // current word may be followed by punctuation or a space.
        if fragment.is_empty() || lexicon.is_word(&fragment) {
            for &ch in &next_chars {
                let mut upper = ch.to_uppercase();
                if let (Some(upper_ch), None) = (upper.next(), upper.next()) {
                    if let Some(label) = self.alphabet.label(upper_ch) {
                        push_unique(labels, label);
                    }
                }
            }
            for &label in self.alphabet.separators() {
                push_unique(labels, label);
            }
        }

        push_unique(labels, self.alphabet.blank());

        Ok(())
    }
}

fn push_unique(labels: &mut CandidateSet, label: usize) {
    if !labels.contains(&label) {
        labels.push(label);
    }
}

/// Return true if lowercasing `ch` leaves it unchanged.
fn is_lowercase(ch: char) -> bool {
    let mut lower = ch.to_lowercase();
    lower.next() == Some(ch) && lower.next().is_none()
}
