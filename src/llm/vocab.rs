//! Word-level vocabulary built from the corpus
//!
//! Handles:
//! - Word → index mapping ranked by corpus frequency
//! - Index → word reverse mapping
//! - Tokenization of free text, with unseen words mapped to `<UNK>`

use crate::error::{PredictError, Result};
use regex::Regex;
use rustc_hash::FxHashMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Reserved entry for words never seen in the corpus
pub const UNK_TOKEN: &str = "<UNK>";
pub const UNK_ID: u32 = 0;

fn word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\w+").expect("word pattern must compile"))
}

/// Lowercased `\w+` words of `text`, in order
pub fn words(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    word_pattern()
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Frequency-ranked word vocabulary
#[derive(Clone, Debug)]
pub struct Vocab {
    /// Word → index mapping
    word_to_id: FxHashMap<String, u32>,
    /// Index → word, position is the index
    id_to_word: Vec<String>,
}

impl Vocab {
    /// Build from corpus text: `<UNK>` first, then words by descending count.
    /// Equal counts keep their first-occurrence order.
    pub fn build(corpus: &str) -> Self {
        let mut counts: FxHashMap<String, usize> = FxHashMap::default();
        let mut first_seen: Vec<String> = Vec::new();

        for word in words(corpus) {
            let count = counts.entry(word.clone()).or_insert(0);
            if *count == 0 {
                first_seen.push(word);
            }
            *count += 1;
        }

        // stable sort keeps first-occurrence order among ties
        first_seen.sort_by(|a, b| counts[b].cmp(&counts[a]));

        let mut id_to_word = Vec::with_capacity(first_seen.len() + 1);
        id_to_word.push(UNK_TOKEN.to_string());
        id_to_word.extend(first_seen);

        let word_to_id = id_to_word
            .iter()
            .enumerate()
            .map(|(id, word)| (word.clone(), id as u32))
            .collect();

        Vocab {
            word_to_id,
            id_to_word,
        }
    }

    /// Read a UTF-8 corpus file and build the vocabulary from it
    pub fn from_corpus_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| PredictError::io(path, e))?;
        Ok(Self::build(&text))
    }

    /// Index of a word, if the corpus contained it
    pub fn id(&self, word: &str) -> Option<u32> {
        self.word_to_id.get(word).copied()
    }

    /// Word stored at an index
    pub fn word(&self, id: u32) -> Option<&str> {
        self.id_to_word.get(id as usize).map(String::as_str)
    }

    /// Encode text to indices, unseen words become `UNK_ID`
    pub fn tokenize(&self, text: &str) -> Vec<u32> {
        words(text)
            .iter()
            .map(|w| self.id(w).unwrap_or(UNK_ID))
            .collect()
    }

    /// Number of entries, `<UNK>` included
    pub fn size(&self) -> usize {
        self.id_to_word.len()
    }

    /// Most frequent corpus words, `<UNK>` excluded
    pub fn most_frequent(&self, count: usize) -> &[String] {
        let end = (count + 1).min(self.id_to_word.len());
        &self.id_to_word[1..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cat_corpus_ranking() {
        let vocab = Vocab::build("the cat sat. the cat ran.");
        assert_eq!(vocab.id("the"), Some(1));
        assert_eq!(vocab.id("cat"), Some(2));
        assert_eq!(vocab.tokenize("the dog"), vec![1, 0]);
        assert_eq!(vocab.size(), 5);
    }

    #[test]
    fn test_unknown_is_zero() {
        let vocab = Vocab::build("one two two");
        assert_eq!(vocab.word(UNK_ID), Some(UNK_TOKEN));
        assert_eq!(vocab.tokenize("three four"), vec![0, 0]);
    }

    #[test]
    fn test_empty_corpus() {
        let vocab = Vocab::build("");
        assert_eq!(vocab.size(), 1);
        assert_eq!(vocab.tokenize("anything at all"), vec![0, 0, 0]);
        assert!(vocab.most_frequent(5).is_empty());
    }

    #[test]
    fn test_tokenize_empty_text() {
        let vocab = Vocab::build("gregor samsa woke");
        assert!(vocab.tokenize("").is_empty());
        assert!(vocab.tokenize(" ,.; ").is_empty());
    }

    #[test]
    fn test_inverse_mapping() {
        let vocab = Vocab::build("As Gregor Samsa awoke one morning from uneasy dreams he found himself");
        for word in words("as gregor samsa awoke one morning from uneasy dreams he found himself") {
            let id = vocab.id(&word).unwrap();
            assert_eq!(vocab.word(id), Some(word.as_str()));
        }
    }

    #[test]
    fn test_deterministic_build() {
        let text = "b a c a b d e e e a";
        let first = Vocab::build(text);
        let second = Vocab::build(text);
        assert_eq!(first.id_to_word, second.id_to_word);
        // a:3, e:3 tie broken by first occurrence, then b:2
        assert_eq!(first.most_frequent(3), ["a", "e", "b"]);
    }

    #[test]
    fn test_lowercase_and_punctuation() {
        let vocab = Vocab::build("Gregor's sister, GRETE!");
        assert_eq!(words("Gregor's sister, GRETE!"), ["gregor", "s", "sister", "grete"]);
        assert_eq!(vocab.tokenize("grete"), vocab.tokenize("Grete"));
    }

    #[test]
    fn test_from_missing_file() {
        let err = Vocab::from_corpus_file("definitely/not/here.txt").unwrap_err();
        assert!(matches!(err, PredictError::Io { .. }));
    }
}
