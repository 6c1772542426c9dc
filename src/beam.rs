//! Beam values and the per-timestep probability accumulators used by the
//! beam search.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

/// A decoding hypothesis: the text produced so far, with blanks removed and
/// repeats collapsed.
///
/// Beams are immutable and compared by text. Extending a beam creates a new
/// value, which makes them cheap to share between threads.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Beam(Arc<str>);

impl Beam {
    /// Return the empty beam that every search starts from.
    pub fn empty() -> Beam {
        Beam(Arc::from(""))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return the final character of the beam.
    pub fn last_char(&self) -> Option<char> {
        self.0.chars().next_back()
    }

    /// Return a new beam with `ch` appended.
    pub fn push(&self, ch: char) -> Beam {
        let mut text = String::with_capacity(self.0.len() + ch.len_utf8());
        text.push_str(&self.0);
        text.push(ch);
        Beam(text.into())
    }

    /// Return the trailing run of alphabetic characters.
    ///
    /// This is the part of the current word that is still being spelled out,
    /// eg. `"Hel"` for the beam `"Say Hel"`.
    pub fn pending_fragment(&self) -> &str {
        let start = self
            .0
            .char_indices()
            .rev()
            .take_while(|(_, ch)| ch.is_alphabetic())
            .last()
            .map(|(pos, _)| pos)
            .unwrap_or(self.0.len());
        &self.0[start..]
    }

    /// Return the last `n` characters, or the whole text if it is shorter.
    pub fn tail(&self, n: usize) -> &str {
        if n == 0 {
            return "";
        }
        match self.0.char_indices().rev().nth(n - 1) {
            Some((pos, _)) => &self.0[pos..],
            None => &self.0,
        }
    }
}

impl From<&str> for Beam {
    fn from(text: &str) -> Beam {
        Beam(Arc::from(text))
    }
}

impl fmt::Debug for Beam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for Beam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Probability mass of all paths that produce a beam's text, split by
/// whether the path ends in a blank.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Mass {
    /// Mass of paths ending in a blank.
    pub blank: f64,

    /// Mass of paths ending in a non-blank label.
    pub non_blank: f64,
}

impl Mass {
    /// Return the mass of the empty beam before any timestep is processed.
    pub fn initial() -> Mass {
        Mass {
            blank: 1.,
            non_blank: 0.,
        }
    }

    pub fn total(&self) -> f64 {
        self.blank + self.non_blank
    }
}

/// Accumulators for a single timestep.
///
/// Entries are kept in the order that beams were first produced at this
/// timestep. Beams that were never referenced have zero mass.
#[derive(Clone, Debug, Default)]
pub struct BeamTable {
    index: FxHashMap<Beam, usize>,
    entries: Vec<(Beam, Mass)>,
}

impl BeamTable {
    pub fn new() -> BeamTable {
        BeamTable::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the accumulated mass for `beam`.
    pub fn mass(&self, beam: &Beam) -> Mass {
        self.index
            .get(beam)
            .map(|&i| self.entries[i].1)
            .unwrap_or_default()
    }

    fn entry(&mut self, beam: &Beam) -> &mut Mass {
        let next_index = self.entries.len();
        let index = *self.index.entry(beam.clone()).or_insert(next_index);
        if index == next_index {
            self.entries.push((beam.clone(), Mass::default()));
        }
        &mut self.entries[index].1
    }

    /// Add mass to the paths for `beam` that end in a blank.
    pub fn add_blank(&mut self, beam: &Beam, mass: f64) {
        self.entry(beam).blank += mass;
    }

    /// Add mass to the paths for `beam` that end in a non-blank label.
    pub fn add_non_blank(&mut self, beam: &Beam, mass: f64) {
        self.entry(beam).non_blank += mass;
    }

    /// Extend `beam`, whose mass at the previous timestep was `prev`, by a
    /// blank with probability `prob`.
    ///
    /// A blank never changes the beam's text.
    pub fn extend_blank(&mut self, beam: &Beam, prev: Mass, prob: f64) {
        self.add_blank(beam, prob * prev.total());
    }

    /// Extend `beam`, whose mass at the previous timestep was `prev`, by the
    /// character `ch` with probability `prob` and return the extended beam.
    ///
    /// If `ch` repeats the last character of `beam`, only paths that passed
    /// through a blank produce a new occurrence of `ch`. Paths that did not
    /// are a continuation of the previous occurrence and their mass stays on
    /// `beam`.
    pub fn extend_char(&mut self, beam: &Beam, prev: Mass, ch: char, prob: f64) -> Beam {
        let new_beam = beam.push(ch);
        if beam.last_char() == Some(ch) {
            self.add_non_blank(&new_beam, prob * prev.blank);
            self.add_non_blank(beam, prob * prev.non_blank);
        } else {
            self.add_non_blank(&new_beam, prob * prev.total());
        }
        new_beam
    }

    /// Add the accumulators from `other` into this table.
    ///
    /// Beams that are new to this table are appended in `other`'s order.
    pub fn merge(&mut self, other: BeamTable) {
        for (beam, mass) in other.entries {
            let entry = self.entry(&beam);
            entry.blank += mass.blank;
            entry.non_blank += mass.non_blank;
        }
    }

    /// Iterate over beams in the order they were first produced.
    pub fn iter(&self) -> impl Iterator<Item = (&Beam, Mass)> {
        self.entries.iter().map(|(beam, mass)| (beam, *mass))
    }

    pub fn into_entries(self) -> Vec<(Beam, Mass)> {
        self.entries
    }
}

/// Language-model weights, keyed by beam text.
///
/// A weight is computed once, when a beam is first created, and reused
/// whenever the same text is produced again during a decode.
#[derive(Clone, Debug)]
pub struct TextWeights {
    weights: FxHashMap<Beam, f64>,
}

impl TextWeights {
    /// Create a cache holding only the weight of the empty beam, which is 1.
    pub fn new() -> TextWeights {
        let mut weights = FxHashMap::default();
        weights.insert(Beam::empty(), 1.);
        TextWeights { weights }
    }

    pub fn get(&self, beam: &Beam) -> Option<f64> {
        self.weights.get(beam).copied()
    }

    pub fn contains(&self, beam: &Beam) -> bool {
        self.weights.contains_key(beam)
    }

    /// Record the weight for `beam` unless it already has one.
    pub fn insert(&mut self, beam: Beam, weight: f64) {
        self.weights.entry(beam).or_insert(weight);
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

impl Default for TextWeights {
    fn default() -> Self {
        Self::new()
    }
}
