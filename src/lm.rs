//! Interface to character-level language models.

/// A character-level language model used to weight beams during decoding.
pub trait LanguageModel: Sync {
    /// Return the likelihood of `ch` following `context`.
    ///
    /// `context` holds up to `order - 1` preceding characters, most recent
    /// last. Both `ch` and `context` are lowercase. The result must be finite
    /// and non-negative for every input, including n-grams that were never
    /// observed.
    fn score(&self, ch: char, context: &[char]) -> f64;
}

impl<M: LanguageModel + ?Sized> LanguageModel for &M {
    fn score(&self, ch: char, context: &[char]) -> f64 {
        (**self).score(ch, context)
    }
}
