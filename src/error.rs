use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors reported when building a decoder from an invalid configuration.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// `beam_width` was zero.
    ZeroBeamWidth,

    /// `top_paths` was zero.
    ZeroTopPaths,

    /// `candidate_cap` was zero.
    ZeroCandidateCap,

    /// `gamma` was negative or not finite.
    InvalidGamma(f64),

    /// A language model was supplied with an order less than one.
    InvalidLmOrder(usize),

    /// The alphabet contains no characters.
    EmptyAlphabet,

    /// A character appears more than once in the alphabet.
    DuplicateChar(char),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ZeroBeamWidth => write!(f, "beam width must be at least 1"),
            ConfigError::ZeroTopPaths => write!(f, "top paths must be at least 1"),
            ConfigError::ZeroCandidateCap => write!(f, "candidate cap must be at least 1"),
            ConfigError::InvalidGamma(gamma) => {
                write!(f, "gamma must be finite and non-negative, got {}", gamma)
            }
            ConfigError::InvalidLmOrder(order) => {
                write!(f, "language model order must be at least 1, got {}", order)
            }
            ConfigError::EmptyAlphabet => write!(f, "alphabet is empty"),
            ConfigError::DuplicateChar(ch) => {
                write!(f, "character {:?} appears more than once in alphabet", ch)
            }
        }
    }
}

impl Error for ConfigError {}

/// Errors reported while decoding a single sequence.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodeError {
    /// The emission matrix does not have one column per alphabet label plus
    /// one for the blank.
    RowWidthMismatch { expected: usize, actual: usize },

    /// The emission matrix contains a NaN or infinite value.
    NonFiniteValue { timestep: usize, label: usize },

    /// The language model returned a score which is negative or not finite.
    InvalidLmScore { ch: char, score: f64 },

    /// The lexicon returned a candidate which is not lowercase.
    InvalidLexiconCandidate { prefix: String, ch: char },
}

impl DecodeError {
    /// Return true if this error was caused by the emission matrix rather
    /// than a collaborator.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            DecodeError::RowWidthMismatch { .. } | DecodeError::NonFiniteValue { .. }
        )
    }

    /// Return true if this error was caused by the lexicon or language model.
    pub fn is_collaborator_error(&self) -> bool {
        matches!(
            self,
            DecodeError::InvalidLmScore { .. } | DecodeError::InvalidLexiconCandidate { .. }
        )
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::RowWidthMismatch { expected, actual } => write!(
                f,
                "malformed input: expected {} labels per timestep, got {}",
                expected, actual
            ),
            DecodeError::NonFiniteValue { timestep, label } => write!(
                f,
                "malformed input: non-finite probability at timestep {} label {}",
                timestep, label
            ),
            DecodeError::InvalidLmScore { ch, score } => write!(
                f,
                "language model error: invalid score {} for {:?}",
                score, ch
            ),
            DecodeError::InvalidLexiconCandidate { prefix, ch } => write!(
                f,
                "lexicon error: candidate {:?} for prefix {:?} is not lowercase",
                ch, prefix
            ),
        }
    }
}

impl Error for DecodeError {}

/// A [`DecodeError`] for one sequence in a batch.
#[derive(Clone, Debug, PartialEq)]
pub struct SequenceError {
    /// Index of the failed sequence in the batch.
    pub index: usize,

    pub error: DecodeError,
}

impl Display for SequenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "sequence {}: {}", self.index, self.error)
    }
}

impl Error for SequenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}
