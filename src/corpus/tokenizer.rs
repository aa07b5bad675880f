use std::collections::BTreeSet;

use regex::Regex;

use crate::{
    config::CorpusConfig,
    error::{PhrasecastResult, SystemError},
};

/// Sentinel the comment feed emits for rows without text.
const NULL_TEXT: &str = "<null>";

const ENTITIES: [(&str, &str); 7] = [
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#x27;", "'"),
    ("&#39;", "'"),
    ("&#x2F;", "/"),
    // Decoded last so `&amp;lt;` yields the literal text `&lt;`.
    ("&amp;", "&"),
];

/// Result of tokenizing one comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tokens {
    /// Text was absent or the `<null>` sentinel.
    Malformed,
    /// Normalized tokens, stop words and short tokens already removed.
    Words(Vec<String>),
}

/// Turns raw comment text into normalized tokens and contiguous n-grams.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    markup: Regex,
    min_token_len: usize,
    stop_words: BTreeSet<String>,
    gram_sizes: Vec<usize>,
}

impl Tokenizer {
    pub fn new(config: &CorpusConfig) -> PhrasecastResult<Self> {
        let markup = Regex::new(r"<[^>]*>")
            .map_err(|e| SystemError::InvariantViolation(format!("markup pattern: {e}")))?;
        Ok(Self {
            markup,
            min_token_len: config.min_token_len,
            stop_words: config.stop_words.clone(),
            gram_sizes: config.gram_sizes.clone(),
        })
    }

    /// Strips markup, decodes common entities, then drops every character
    /// that is neither ASCII alphanumeric nor whitespace, and lowercases.
    pub fn clean(&self, text: &str) -> String {
        let mut decoded = self.markup.replace_all(text, " ").into_owned();
        for (entity, plain) in ENTITIES {
            if decoded.contains(entity) {
                decoded = decoded.replace(entity, plain);
            }
        }
        decoded
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
            .map(|c| c.to_ascii_lowercase())
            .collect()
    }

    pub fn tokenize(&self, text: Option<&str>) -> Tokens {
        let Some(text) = text.filter(|t| t.trim() != NULL_TEXT) else {
            return Tokens::Malformed;
        };
        let words = self
            .clean(text)
            .split_whitespace()
            .filter(|w| w.len() >= self.min_token_len && !self.stop_words.contains(*w))
            .map(str::to_string)
            .collect();
        Tokens::Words(words)
    }

    /// Contiguous n-grams for every configured size, space-joined.
    ///
    /// Fewer than two tokens produce nothing.
    pub fn grams(&self, tokens: &[String]) -> Vec<String> {
        if tokens.len() < 2 {
            return Vec::new();
        }
        self.gram_sizes
            .iter()
            .filter(|n| **n > 0)
            .flat_map(|n| tokens.windows(*n).map(|w| w.join(" ")))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer() -> Tokenizer {
        Tokenizer::new(&CorpusConfig::default()).expect("tokenizer")
    }

    fn words(t: &Tokenizer, text: &str) -> Vec<String> {
        match t.tokenize(Some(text)) {
            Tokens::Words(w) => w,
            Tokens::Malformed => panic!("unexpected malformed row for {text:?}"),
        }
    }

    #[test]
    fn clean_strips_markup_entities_and_punctuation() {
        let t = tokenizer();
        assert_eq!(
            t.clean("<p>Gold &amp; Silver</p>&#x27;s <a href=\"x\">RALLY</a>!!"),
            " gold  silver s  rally "
        );
    }

    #[test]
    fn tags_between_words_split_them() {
        let t = tokenizer();
        assert_eq!(words(&t, "gold<br>price<b>rally</b>"), vec!["gold", "price", "rally"]);
    }

    #[test]
    fn stop_words_and_short_tokens_are_dropped() {
        let t = tokenizer();
        assert_eq!(words(&t, "The quick brown fox is a x"), vec!["quick", "brown", "fox"]);
    }

    #[test]
    fn null_sentinel_and_missing_text_are_malformed() {
        let t = tokenizer();
        assert_eq!(t.tokenize(None), Tokens::Malformed);
        assert_eq!(t.tokenize(Some(" <null> ")), Tokens::Malformed);
    }

    #[test]
    fn grams_cover_two_to_four_tokens() {
        let t = tokenizer();
        let grams = t.grams(&words(&t, "quick brown fox jumps"));
        assert_eq!(
            grams,
            vec![
                "quick brown",
                "brown fox",
                "fox jumps",
                "quick brown fox",
                "brown fox jumps",
                "quick brown fox jumps",
            ]
        );
    }

    #[test]
    fn single_token_yields_no_grams() {
        let t = tokenizer();
        assert!(t.grams(&words(&t, "the fox")).is_empty());
    }
}
