//! Interface to word lists which constrain decoding.

/// A lexicon, usually backed by a trie, which restricts decoded words to a
/// known vocabulary.
///
/// The decoder only ever queries a lexicon with lowercase prefixes, and
/// shares it between threads without synchronization.
pub trait Lexicon: Sync {
    /// Return true if `text` is a complete word.
    fn is_word(&self, text: &str) -> bool;

    /// Return the lowercase characters which can follow `prefix` in some word.
    ///
    /// This returns an empty list for prefixes that do not start any word.
    /// The empty prefix returns the characters which can start a word.
    fn char_candidates(&self, prefix: &str) -> Vec<char>;
}

impl<L: Lexicon + ?Sized> Lexicon for &L {
    fn is_word(&self, text: &str) -> bool {
        (**self).is_word(text)
    }

    fn char_candidates(&self, prefix: &str) -> Vec<char> {
        (**self).char_candidates(prefix)
    }
}
