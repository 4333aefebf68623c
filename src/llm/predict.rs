//! Greedy next-word prediction and iterative generation

use super::model::Model;
use super::vocab::Vocab;
use crate::error::{PredictError, Result};
use tracing::debug;

/// Most recent words fed to the model
pub const CONTEXT_WORDS: usize = 50;

/// Fixed-width sequence classifier over vocabulary indices
pub trait SequenceModel {
    /// Number of token ids each call consumes
    fn input_len(&self) -> usize;

    /// Score per vocabulary index for a full-width sequence
    fn predict(&self, sequence: &[u32]) -> Result<Vec<f32>>;

    /// Whether `predict` returns probabilities rather than raw scores
    fn is_distribution(&self) -> bool {
        true
    }
}

impl SequenceModel for Model {
    fn input_len(&self) -> usize {
        Model::input_len(self)
    }

    fn predict(&self, sequence: &[u32]) -> Result<Vec<f32>> {
        self.forward(sequence)
    }

    fn is_distribution(&self) -> bool {
        self.ends_in_softmax()
    }
}

/// Keep the last `width` ids, left-padding with zeros when shorter
pub fn pad_pre(sequence: &[u32], width: usize) -> Vec<u32> {
    if sequence.len() >= width {
        return sequence[sequence.len() - width..].to_vec();
    }
    let mut padded = vec![0; width - sequence.len()];
    padded.extend_from_slice(sequence);
    padded
}

/// Index and value of the largest entry. Ties go to the lowest index,
/// NaN entries are skipped.
pub fn argmax(probs: &[f32]) -> Option<(usize, f32)> {
    probs
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, p)| !p.is_nan())
        .fold(None, |best, (i, p)| match best {
            Some((_, bp)) if bp >= p => best,
            _ => Some((i, p)),
        })
}

#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub word: String,
    pub index: u32,
    /// Model output at `index`
    pub score: f32,
    /// `score` is a softmax probability
    pub normalized: bool,
}

impl Prediction {
    /// `p=0.412` for probabilities, `score=3.100` otherwise
    pub fn score_label(&self) -> String {
        if self.normalized {
            format!("p={:.3}", self.score)
        } else {
            format!("score={:.3}", self.score)
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Generation {
    /// Seed text followed by every generated word
    pub text: String,
    pub words: Vec<String>,
}

/// Model and vocabulary loaded once and reused for every prediction
pub struct Predictor<M = Model> {
    model: M,
    vocab: Vocab,
    context_words: usize,
}

impl<M: SequenceModel> Predictor<M> {
    pub fn new(model: M, vocab: Vocab) -> Self {
        Predictor {
            model,
            vocab,
            context_words: CONTEXT_WORDS,
        }
    }

    pub fn with_context(mut self, context_words: usize) -> Self {
        self.context_words = context_words;
        self
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Token ids the model sees for `text`
    pub fn prepare(&self, text: &str) -> Vec<u32> {
        let tokens = self.vocab.tokenize(text);
        let start = tokens.len().saturating_sub(self.context_words);
        pad_pre(&tokens[start..], self.model.input_len())
    }

    /// Most probable next word after `text`
    pub fn predict_next(&self, text: &str) -> Result<Prediction> {
        let sequence = self.prepare(text);
        let probs = self.model.predict(&sequence)?;
        let (index, score) = argmax(&probs).ok_or(PredictError::EmptyDistribution)?;
        let word = self
            .vocab
            .word(index as u32)
            .ok_or(PredictError::UnknownIndex(index))?
            .to_string();

        let normalized = self.model.is_distribution();
        debug!(%word, index, score, normalized, "predicted next word");
        Ok(Prediction {
            word,
            index: index as u32,
            score,
            normalized,
        })
    }

    /// Predict `count` words, feeding each one back into the text
    pub fn generate(&self, seed: &str, count: usize) -> Result<Generation> {
        let mut text = seed.to_string();
        let mut words = Vec::with_capacity(count);

        for _ in 0..count {
            let next = self.predict_next(&text)?;
            text.push(' ');
            text.push_str(&next.word);
            words.push(next.word);
        }

        Ok(Generation { text, words })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::model::tests::fixed_bundle;
    use candle_core::Device;
    use std::cell::RefCell;

    /// Returns a fixed distribution and records every sequence it sees
    struct ScriptedModel {
        width: usize,
        probs: Vec<f32>,
        seen: RefCell<Vec<Vec<u32>>>,
    }

    impl ScriptedModel {
        fn new(width: usize, probs: Vec<f32>) -> Self {
            ScriptedModel {
                width,
                probs,
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl SequenceModel for ScriptedModel {
        fn input_len(&self) -> usize {
            self.width
        }

        fn predict(&self, sequence: &[u32]) -> Result<Vec<f32>> {
            assert_eq!(sequence.len(), self.width);
            self.seen.borrow_mut().push(sequence.to_vec());
            Ok(self.probs.clone())
        }
    }

    /// Predicts the word following the last input id in a cycle
    struct CycleModel {
        size: usize,
    }

    impl SequenceModel for CycleModel {
        fn input_len(&self) -> usize {
            3
        }

        fn predict(&self, sequence: &[u32]) -> Result<Vec<f32>> {
            let last = *sequence.last().unwrap() as usize;
            let mut probs = vec![0.0; self.size];
            probs[last % (self.size - 1) + 1] = 1.0;
            Ok(probs)
        }
    }

    #[test]
    fn test_pad_pre() {
        assert_eq!(pad_pre(&[5, 6], 4), vec![0, 0, 5, 6]);
        assert_eq!(pad_pre(&[1, 2, 3, 4, 5], 3), vec![3, 4, 5]);
        assert_eq!(pad_pre(&[], 2), vec![0, 0]);
        assert_eq!(pad_pre(&[7, 8], 2), vec![7, 8]);
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some((1, 0.7)));
        assert_eq!(argmax(&[0.4, 0.4, 0.2]), Some((0, 0.4)));
        assert_eq!(argmax(&[f32::NAN, 0.3]), Some((1, 0.3)));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_predict_maps_index_to_word() {
        let vocab = Vocab::build("the cat sat. the cat ran.");
        let model = ScriptedModel::new(4, vec![0.0, 0.1, 0.6, 0.1, 0.2]);
        let predictor = Predictor::new(model, vocab);

        let prediction = predictor.predict_next("the dog").unwrap();
        assert_eq!(prediction.word, "cat");
        assert_eq!(prediction.index, 2);
        assert_eq!(predictor.model().seen.borrow()[0], vec![0, 0, 1, 0]);
    }

    #[test]
    fn test_context_window_truncates() {
        let vocab = Vocab::build("a b c d e f");
        let model = ScriptedModel::new(6, vec![1.0]);
        let predictor = Predictor::new(model, vocab).with_context(2);

        predictor.predict_next("a b c d e f").unwrap();
        assert_eq!(predictor.model().seen.borrow()[0], vec![0, 0, 0, 0, 5, 6]);
    }

    #[test]
    fn test_default_window_is_fifty() {
        let corpus: Vec<String> = (0..60).map(|i| format!("w{i}")).collect();
        let vocab = Vocab::build(&corpus.join(" "));
        let model = ScriptedModel::new(55, vec![1.0]);
        let predictor = Predictor::new(model, vocab);

        predictor.predict_next(&corpus.join(" ")).unwrap();
        let seen = predictor.model().seen.borrow()[0].clone();
        assert_eq!(&seen[..5], &[0, 0, 0, 0, 0]);
        // w10 is the oldest word kept
        assert_eq!(seen[5], predictor.vocab().id("w10").unwrap());
        assert_eq!(seen[54], predictor.vocab().id("w59").unwrap());
    }

    #[test]
    fn test_empty_text_is_all_padding() {
        let vocab = Vocab::build("one two");
        let model = ScriptedModel::new(3, vec![0.0, 1.0, 0.0]);
        let predictor = Predictor::new(model, vocab);

        assert_eq!(predictor.predict_next("").unwrap().word, "one");
        assert_eq!(predictor.model().seen.borrow()[0], vec![0, 0, 0]);
    }

    #[test]
    fn test_index_outside_vocab() {
        let vocab = Vocab::build("one two");
        let model = ScriptedModel::new(2, vec![0.0, 0.0, 0.0, 1.0]);
        let predictor = Predictor::new(model, vocab);
        assert!(matches!(
            predictor.predict_next("one"),
            Err(PredictError::UnknownIndex(3))
        ));
    }

    #[test]
    fn test_empty_distribution() {
        let vocab = Vocab::build("one two");
        let predictor = Predictor::new(ScriptedModel::new(2, vec![]), vocab);
        assert!(matches!(
            predictor.predict_next("one"),
            Err(PredictError::EmptyDistribution)
        ));
    }

    #[test]
    fn test_generate_feeds_back() {
        // ids: a=1 b=2 c=3
        let vocab = Vocab::build("a b c");
        let predictor = Predictor::new(CycleModel { size: 4 }, vocab);

        let generation = predictor.generate("a", 4).unwrap();
        assert_eq!(generation.words, ["b", "c", "a", "b"]);
        assert_eq!(generation.text, "a b c a b");

        assert_eq!(predictor.generate("a", 0).unwrap().text, "a");
    }

    #[test]
    fn test_candle_model_is_deterministic() {
        let model = Model::from_bundle(fixed_bundle(6, 4, 4), &Device::Cpu).unwrap();
        let vocab = Vocab::build("gregor samsa woke gregor up");
        let predictor = Predictor::new(model, vocab);

        let first = predictor.predict_next("Gregor Samsa woke").unwrap();
        let second = predictor.predict_next("Gregor Samsa woke").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.index, 4);
        assert_eq!(first.word, "up");
    }

    #[test]
    fn test_score_label() {
        let mut prediction = Prediction {
            word: "gregor".into(),
            index: 1,
            score: 0.4123,
            normalized: true,
        };
        assert_eq!(prediction.score_label(), "p=0.412");
        prediction.normalized = false;
        prediction.score = 3.1;
        assert_eq!(prediction.score_label(), "score=3.100");
    }

    #[test]
    fn test_linear_output_is_labelled_score() {
        let mut bundle = fixed_bundle(6, 4, 4);
        let mut architecture: serde_json::Value = serde_json::from_str(&bundle.architecture).unwrap();
        let layers = architecture["config"]["layers"].as_array_mut().unwrap();
        layers.last_mut().unwrap()["config"]["activation"] = serde_json::json!("linear");
        bundle.architecture = architecture.to_string();

        let model = Model::from_bundle(bundle, &Device::Cpu).unwrap();
        let predictor = Predictor::new(model, Vocab::build("gregor samsa woke gregor up"));
        let prediction = predictor.predict_next("Gregor Samsa woke").unwrap();
        assert_eq!(prediction.index, 4);
        assert!(!prediction.normalized);
        assert_eq!(prediction.score, 3.0);
        assert!(prediction.score_label().starts_with("score="));
    }

    #[test]
    fn test_softmax_output_is_labelled_probability() {
        let model = Model::from_bundle(fixed_bundle(6, 4, 4), &Device::Cpu).unwrap();
        let predictor = Predictor::new(model, Vocab::build("gregor samsa woke gregor up"));
        let prediction = predictor.predict_next("Gregor Samsa woke").unwrap();
        assert!(prediction.normalized);
        assert!(prediction.score > 0.0 && prediction.score < 1.0);
        assert!(prediction.score_label().starts_with("p="));
    }
}
