use std::collections::HashSet;

/// Injectable stop-word filter: callers can substitute a custom list,
/// defaulting to a short common-English set.
pub struct StopWordFilter {
    words: HashSet<String>,
}

impl StopWordFilter {
    pub fn new(words: impl IntoIterator<Item = String>) -> Self {
        StopWordFilter { words: words.into_iter().collect() }
    }

    pub fn english() -> Self {
        const WORDS: &[&str] = &[
            "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in",
            "is", "it", "its", "of", "on", "that", "the", "to", "was", "will", "with",
        ];
        StopWordFilter::new(WORDS.iter().map(|w| w.to_string()))
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }
}
