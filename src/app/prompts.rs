//! Fixed text shown around predictions

use rand::seq::SliceRandom;
use rand::Rng;

/// Phrases offered as the default prediction input
pub const KAFKA_PHRASES: &[&str] = &[
    "Gregor Samsa woke up",
    "As Gregor Samsa awoke one morning",
    "One morning, when Gregor Samsa",
    "He lay on his armour-like back",
];

/// Seeds for random sentence generation
pub const SENTENCE_STARTERS: &[&str] = &["Gregor Samsa", "The metamorphosis", "One morning"];

/// Words appended to a random starter
pub const GENERATED_SENTENCE_WORDS: usize = 15;

pub const OPENING_LINE: &str = "As Gregor Samsa awoke one morning from uneasy dreams he found \
himself transformed in his bed into a gigantic insect.";

pub const ABOUT_MODEL: &str = "This model uses a Bi-LSTM (Bidirectional Long Short-Term Memory) \
network trained on the text of Franz Kafka's \"The Metamorphosis\". It learns patterns in the \
narrative to predict the most likely next word in the sequence.";

pub fn random_phrase<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    KAFKA_PHRASES.choose(rng).copied().unwrap_or(KAFKA_PHRASES[0])
}

pub fn random_starter<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    SENTENCE_STARTERS
        .choose(rng)
        .copied()
        .unwrap_or(SENTENCE_STARTERS[0])
}
