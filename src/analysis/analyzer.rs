use crate::analysis::stemmer;
use crate::analysis::stopwords::StopWordFilter;
use crate::analysis::token::Token;
use crate::analysis::tokenizer::{StandardTokenizer, Tokenizer};

/// Text pipeline: tokenize, lowercase, drop tokens under two characters,
/// drop stop words, stem. `search()` returns terms only; `search_with_positions`
/// keeps the token-position metadata for phrase-aware scoring.
pub struct Analyzer {
    tokenizer: StandardTokenizer,
    stop_words: StopWordFilter,
}

impl Default for Analyzer {
    fn default() -> Self {
        Analyzer { tokenizer: StandardTokenizer::new(), stop_words: StopWordFilter::english() }
    }
}

impl Analyzer {
    pub fn new(stop_words: StopWordFilter) -> Self {
        Analyzer { tokenizer: StandardTokenizer::new(), stop_words }
    }

    fn pipeline(&self, text: &str) -> Vec<Token> {
        self.tokenizer
            .tokenize(text)
            .into_iter()
            .map(|mut t| {
                t.text = t.text.to_lowercase();
                t
            })
            .filter(|t| t.text.chars().count() >= 2)
            .filter(|t| !self.stop_words.contains(&t.text))
            .map(|mut t| {
                t.text = stemmer::stem(&t.text);
                t
            })
            .collect()
    }

    pub fn analyze(&self, text: &str) -> Vec<String> {
        self.pipeline(text).into_iter().map(|t| t.text).collect()
    }

    pub fn analyze_with_positions(&self, text: &str) -> Vec<Token> {
        self.pipeline(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_drops_stopwords_short_tokens_and_stems() {
        let analyzer = Analyzer::default();
        let terms = analyzer.analyze("The quick brown fox is running to databases");
        assert_eq!(terms, vec!["quick", "brown", "fox", "run", "databas"]);
    }

    #[test]
    fn positions_reflect_original_token_slots_not_post_filter_order() {
        let analyzer = Analyzer::default();
        let tokens = analyzer.analyze_with_positions("a cat and a dog");
        let words: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        let positions: Vec<u32> = tokens.iter().map(|t| t.position).collect();
        assert_eq!(words, vec!["cat", "dog"]);
        assert_eq!(positions, vec![1, 4]);
    }
}
