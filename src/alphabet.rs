//! Label sets used to interpret the columns of an emission matrix.

use rustc_hash::FxHashMap;

use crate::error::ConfigError;

/// Ordered set of characters which a sequence model can emit, plus the CTC
/// blank.
///
/// Column `i` of an emission matrix, for `i < len()`, holds the probability
/// of character `i`. The final column, at index [`blank`](Alphabet::blank),
/// holds the probability of the blank.
#[derive(Clone, Debug)]
pub struct Alphabet {
    chars: Vec<char>,
    index: FxHashMap<char, usize>,

    /// Labels which may follow a complete word or start a new one when
    /// decoding against a lexicon.
    separators: Vec<usize>,
}

impl Alphabet {
    /// Create an alphabet from the characters in `chars`, in order.
    ///
    /// Every non-alphabetic character (eg. punctuation, digits and space)
    /// becomes a separator. Use [`with_separators`](Alphabet::with_separators)
    /// to choose a different set.
    pub fn new(chars: &str) -> Result<Alphabet, ConfigError> {
        let chars: Vec<char> = chars.chars().collect();
        if chars.is_empty() {
            return Err(ConfigError::EmptyAlphabet);
        }

        let mut index = FxHashMap::default();
        for (label, &ch) in chars.iter().enumerate() {
            if index.insert(ch, label).is_some() {
                return Err(ConfigError::DuplicateChar(ch));
            }
        }

        let separators = chars
            .iter()
            .enumerate()
            .filter(|(_, ch)| !ch.is_alphabetic())
            .map(|(label, _)| label)
            .collect();

        Ok(Alphabet {
            chars,
            index,
            separators,
        })
    }

    /// Replace the separator set with the characters in `separators`.
    ///
    /// Characters which are not in the alphabet are ignored.
    pub fn with_separators(mut self, separators: &str) -> Alphabet {
        let mut labels = Vec::new();
        for ch in separators.chars() {
            if let Some(label) = self.label(ch) {
                if !labels.contains(&label) {
                    labels.push(label);
                }
            }
        }
        self.separators = labels;
        self
    }

    /// Return the number of characters, excluding the blank.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// Return true if the alphabet has no characters. This is never the case
    /// for an alphabet created via [`Alphabet::new`].
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Return the number of labels, including the blank. This is the
    /// expected width of each emission matrix row.
    pub fn num_labels(&self) -> usize {
        self.chars.len() + 1
    }

    /// Return the label of the CTC blank.
    pub fn blank(&self) -> usize {
        self.chars.len()
    }

    /// Return the label for a character, or `None` if it is not in the
    /// alphabet.
    pub fn label(&self, ch: char) -> Option<usize> {
        self.index.get(&ch).copied()
    }

    /// Return the character for a label, or `None` for the blank or an
    /// out-of-range label.
    pub fn char(&self, label: usize) -> Option<char> {
        self.chars.get(label).copied()
    }

    /// Return the labels of separator characters, in alphabet order.
    pub fn separators(&self) -> &[usize] {
        &self.separators
    }

    /// Return the characters of this alphabet, excluding the blank.
    pub fn chars(&self) -> &[char] {
        &self.chars
    }
}
