//! Saved model architecture: legacy patching and typed layer configs
//!
//! Architectures are stored as the Keras-style JSON the exporting framework
//! produces. Older exports carry a `time_major` key on recurrent layers that
//! current layer configs no longer accept, so it is stripped from the whole
//! tree before the typed parse.

use crate::error::Result;
use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

/// Keys removed from every object in a saved architecture
pub const DEPRECATED_KEYS: &[&str] = &["time_major"];

/// Recursively drop `keys` from every object, at any depth
pub fn strip_keys(value: Value, keys: &[&str]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| !keys.contains(&k.as_str()))
                .map(|(k, v)| (k, strip_keys(v, keys)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| strip_keys(v, keys)).collect())
        }
        other => other,
    }
}

/// Count occurrences of `keys` anywhere in the tree
pub fn count_keys(value: &Value, keys: &[&str]) -> usize {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| usize::from(keys.contains(&k.as_str())) + count_keys(v, keys))
            .sum(),
        Value::Array(items) => items.iter().map(|v| count_keys(v, keys)).sum(),
        _ => 0,
    }
}

/// Strip deprecated keys from an architecture string, returning the tree
pub fn clean_architecture(json: &str) -> Result<Value> {
    let raw: Value = serde_json::from_str(json)?;
    let stale = count_keys(&raw, DEPRECATED_KEYS);
    if stale > 0 {
        info!(stale, "stripping deprecated keys from saved architecture");
    } else {
        debug!("saved architecture has no deprecated keys");
    }
    Ok(strip_keys(raw, DEPRECATED_KEYS))
}

/// Patch and parse a saved architecture
pub fn parse_architecture(json: &str) -> Result<ModelArchitecture> {
    let cleaned = clean_architecture(json)?;
    Ok(serde_json::from_value(cleaned)?)
}

#[derive(Clone, Debug, Deserialize)]
pub struct ModelArchitecture {
    pub class_name: String,
    pub config: SequentialConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SequentialConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub layers: Vec<LayerSpec>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "class_name", content = "config")]
pub enum LayerSpec {
    InputLayer(InputLayerConfig),
    Embedding(EmbeddingConfig),
    #[serde(rename = "LSTM")]
    Lstm(LstmConfig),
    Bidirectional(BidirectionalConfig),
    Dropout(DropoutConfig),
    Dense(DenseConfig),
}

impl LayerSpec {
    pub fn name(&self) -> Option<&str> {
        match self {
            LayerSpec::InputLayer(c) => c.name.as_deref(),
            LayerSpec::Embedding(c) => c.name.as_deref(),
            LayerSpec::Lstm(c) => c.name.as_deref(),
            LayerSpec::Bidirectional(c) => c.name.as_deref(),
            LayerSpec::Dropout(c) => c.name.as_deref(),
            LayerSpec::Dense(c) => c.name.as_deref(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LayerSpec::InputLayer(_) => "input_layer",
            LayerSpec::Embedding(_) => "embedding",
            LayerSpec::Lstm(_) => "lstm",
            LayerSpec::Bidirectional(_) => "bidirectional",
            LayerSpec::Dropout(_) => "dropout",
            LayerSpec::Dense(_) => "dense",
        }
    }
}

/// Second entry of a `[batch, width]` shape
fn sequence_width(shape: &Option<Vec<Option<usize>>>) -> Option<usize> {
    shape.as_ref().and_then(|s| s.get(1).copied().flatten())
}

#[derive(Clone, Debug, Deserialize)]
pub struct InputLayerConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub batch_input_shape: Option<Vec<Option<usize>>>,
    #[serde(default)]
    pub batch_shape: Option<Vec<Option<usize>>>,
}

impl InputLayerConfig {
    pub fn input_width(&self) -> Option<usize> {
        sequence_width(&self.batch_input_shape).or_else(|| sequence_width(&self.batch_shape))
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub input_dim: usize,
    pub output_dim: usize,
    #[serde(default)]
    pub input_length: Option<usize>,
    #[serde(default)]
    pub mask_zero: bool,
    #[serde(default)]
    pub batch_input_shape: Option<Vec<Option<usize>>>,
}

impl EmbeddingConfig {
    pub fn input_width(&self) -> Option<usize> {
        self.input_length
            .or_else(|| sequence_width(&self.batch_input_shape))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Linear,
    Tanh,
    Sigmoid,
    HardSigmoid,
    Relu,
    Softmax,
}

fn tanh() -> Activation {
    Activation::Tanh
}

fn sigmoid() -> Activation {
    Activation::Sigmoid
}

fn yes() -> bool {
    true
}

/// LSTM layer config. Unknown keys are rejected, which is what makes an
/// unpatched legacy export fail to load.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(dead_code)]
pub struct LstmConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub units: usize,
    #[serde(default = "tanh")]
    pub activation: Activation,
    #[serde(default = "sigmoid")]
    pub recurrent_activation: Activation,
    #[serde(default = "yes")]
    pub use_bias: bool,
    #[serde(default)]
    pub return_sequences: bool,
    #[serde(default)]
    pub return_state: bool,
    #[serde(default)]
    pub go_backwards: bool,
    #[serde(default)]
    pub stateful: bool,
    #[serde(default)]
    pub unroll: bool,

    // accepted, meaningless at inference
    #[serde(default)]
    pub trainable: Option<IgnoredAny>,
    #[serde(default)]
    pub dtype: Option<IgnoredAny>,
    #[serde(default)]
    pub kernel_initializer: Option<IgnoredAny>,
    #[serde(default)]
    pub recurrent_initializer: Option<IgnoredAny>,
    #[serde(default)]
    pub bias_initializer: Option<IgnoredAny>,
    #[serde(default)]
    pub unit_forget_bias: Option<IgnoredAny>,
    #[serde(default)]
    pub kernel_regularizer: Option<IgnoredAny>,
    #[serde(default)]
    pub recurrent_regularizer: Option<IgnoredAny>,
    #[serde(default)]
    pub bias_regularizer: Option<IgnoredAny>,
    #[serde(default)]
    pub activity_regularizer: Option<IgnoredAny>,
    #[serde(default)]
    pub kernel_constraint: Option<IgnoredAny>,
    #[serde(default)]
    pub recurrent_constraint: Option<IgnoredAny>,
    #[serde(default)]
    pub bias_constraint: Option<IgnoredAny>,
    #[serde(default)]
    pub dropout: Option<IgnoredAny>,
    #[serde(default)]
    pub recurrent_dropout: Option<IgnoredAny>,
    #[serde(default)]
    pub implementation: Option<IgnoredAny>,
    #[serde(default)]
    pub seed: Option<IgnoredAny>,
    #[serde(default)]
    pub zero_output_for_mask: Option<IgnoredAny>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "class_name", content = "config")]
pub enum RecurrentSpec {
    #[serde(rename = "LSTM")]
    Lstm(LstmConfig),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    Concat,
    Sum,
    Ave,
    Mul,
}

fn concat() -> Option<MergeMode> {
    Some(MergeMode::Concat)
}

#[derive(Clone, Debug, Deserialize)]
pub struct BidirectionalConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub layer: RecurrentSpec,
    /// `null` means separate outputs, which is not supported
    #[serde(default = "concat")]
    pub merge_mode: Option<MergeMode>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DropoutConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rate: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DenseConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub units: usize,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default = "yes")]
    pub use_bias: bool,
}
