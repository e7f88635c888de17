use unicode_segmentation::UnicodeSegmentation;

use crate::analysis::token::Token;

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<Token>;
    fn name(&self) -> &str;
}

/// Splits on Unicode word boundaries. Lowercasing happens in a separate
/// filter stage, not here, so a tokenizer-only caller sees the original case.
#[derive(Clone, Default)]
pub struct StandardTokenizer {
    pub max_token_length: usize,
}

impl StandardTokenizer {
    pub fn new() -> Self {
        StandardTokenizer { max_token_length: 255 }
    }
}

impl Tokenizer for StandardTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let max_len = if self.max_token_length == 0 { 255 } else { self.max_token_length };
        let mut tokens = Vec::new();
        let mut position = 0u32;
        let mut offset = 0;

        for word in text.unicode_words() {
            if word.len() <= max_len {
                tokens.push(Token::new(word.to_string(), position, offset));
                position += 1;
            }
            offset += word.len();
        }
        tokens
    }

    fn name(&self) -> &str {
        "standard"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_unicode_word_boundaries() {
        let tok = StandardTokenizer::new();
        let tokens = tok.tokenize("Hello, world! Ponies are quick.");
        let words: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, vec!["Hello", "world", "Ponies", "are", "quick"]);
    }
}
