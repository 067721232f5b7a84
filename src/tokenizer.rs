//! Tokenize-and-stem pipeline.
//!
//! The default [`StemmingTokenizer`] is a tantivy analyzer chain: split on
//! non-alphanumeric characters, drop tokens longer than 40 bytes, lowercase,
//! drop stop words (for languages tantivy ships a list for) and reduce each
//! token with the Snowball stemmer of the configured language.

use serde::{Deserialize, Serialize};
use tantivy::tokenizer::{
    Language,
    LowerCaser,
    RemoveLongFilter,
    SimpleTokenizer,
    Stemmer,
    StopWordFilter,
    TextAnalyzer,
    TokenStream,
};

/// Converts raw text into a normalized sequence of stems.
///
/// Implementations must be deterministic and free of side effects.
pub trait Tokenizer: Send + Sync {
    fn tokenize_and_stem(&self, text: &str) -> Vec<String>;
}

/// Stemming algorithm selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemmerKind {
    Arabic,
    Danish,
    Dutch,
    #[default]
    #[serde(alias = "porter")]
    English,
    Finnish,
    French,
    German,
    Greek,
    Hungarian,
    Italian,
    Norwegian,
    Portuguese,
    Romanian,
    Russian,
    Spanish,
    Swedish,
    Tamil,
    Turkish,
}

impl StemmerKind {
    fn language(self) -> Language {
        match self {
            Self::Arabic => Language::Arabic,
            Self::Danish => Language::Danish,
            Self::Dutch => Language::Dutch,
            Self::English => Language::English,
            Self::Finnish => Language::Finnish,
            Self::French => Language::French,
            Self::German => Language::German,
            Self::Greek => Language::Greek,
            Self::Hungarian => Language::Hungarian,
            Self::Italian => Language::Italian,
            Self::Norwegian => Language::Norwegian,
            Self::Portuguese => Language::Portuguese,
            Self::Romanian => Language::Romanian,
            Self::Russian => Language::Russian,
            Self::Spanish => Language::Spanish,
            Self::Swedish => Language::Swedish,
            Self::Tamil => Language::Tamil,
            Self::Turkish => Language::Turkish,
        }
    }
}

/// Snowball-stemming tokenizer backed by tantivy's analyzers.
#[derive(Clone)]
pub struct StemmingTokenizer {
    analyzer: TextAnalyzer,
}

impl StemmingTokenizer {
    pub fn new(kind: StemmerKind) -> Self {
        let language = kind.language();
        let analyzer = match StopWordFilter::new(language) {
            Some(stop_words) => TextAnalyzer::builder(SimpleTokenizer::default())
                .filter(RemoveLongFilter::limit(40))
                .filter(LowerCaser)
                .filter(stop_words)
                .filter(Stemmer::new(language))
                .build(),
            None => TextAnalyzer::builder(SimpleTokenizer::default())
                .filter(RemoveLongFilter::limit(40))
                .filter(LowerCaser)
                .filter(Stemmer::new(language))
                .build(),
        };
        Self { analyzer }
    }
}

impl Default for StemmingTokenizer {
    fn default() -> Self {
        Self::new(StemmerKind::default())
    }
}

impl std::fmt::Debug for StemmingTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StemmingTokenizer").finish_non_exhaustive()
    }
}

impl Tokenizer for StemmingTokenizer {
    fn tokenize_and_stem(&self, text: &str) -> Vec<String> {
        // Token streams borrow the analyzer mutably.
        let mut analyzer = self.analyzer.clone();
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        while stream.advance() {
            tokens.push(stream.token().text.clone());
        }
        tokens
    }
}

/// Deduplicate tokens, keeping the first occurrence of each.
pub fn unique_tokens(tokens: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tokens
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn english() -> StemmingTokenizer {
        StemmingTokenizer::new(StemmerKind::English)
    }

    #[test]
    fn lowercases_and_stems() {
        let tokens = english().tokenize_and_stem("Running Cars");
        assert_eq!(tokens, vec!["run", "car"]);
    }

    #[test]
    fn drops_stop_words() {
        let tokens = english().tokenize_and_stem("A fast red car");
        assert_eq!(tokens, vec!["fast", "red", "car"]);
    }

    #[test]
    fn keeps_repeats_in_order() {
        let tokens = english().tokenize_and_stem("red, RED; red!");
        assert_eq!(tokens, vec!["red", "red", "red"]);
    }

    #[test]
    fn empty_and_punctuation_only() {
        assert!(english().tokenize_and_stem("").is_empty());
        assert!(english().tokenize_and_stem("...---...").is_empty());
    }

    #[test]
    fn drops_overlong_tokens() {
        let long = "x".repeat(50);
        let tokens = english().tokenize_and_stem(&format!("{long} car"));
        assert_eq!(tokens, vec!["car"]);
    }

    #[test]
    fn french_stemmer() {
        let french = StemmingTokenizer::new(StemmerKind::French);
        assert_eq!(
            french.tokenize_and_stem("voitures"),
            french.tokenize_and_stem("voiture")
        );
    }

    #[test]
    fn unique_preserves_order() {
        let tokens = unique_tokens(vec![
            "apple".into(),
            "banana".into(),
            "apple".into(),
            "cherry".into(),
        ]);
        assert_eq!(tokens, vec!["apple", "banana", "cherry"]);
    }

    #[test]
    fn stemmer_kind_accepts_porter_alias() {
        let kind: StemmerKind = serde_json::from_str("\"porter\"").unwrap();
        assert_eq!(kind, StemmerKind::English);
        let kind: StemmerKind = serde_json::from_str("\"german\"").unwrap();
        assert_eq!(kind, StemmerKind::German);
    }
}
