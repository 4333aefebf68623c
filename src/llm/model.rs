//! Candle model loading and inference
//!
//! Handles:
//! - Reading the bincode model bundle (architecture JSON + named weights)
//! - Patching the legacy architecture and rebuilding the network from it
//! - Transplanting the trained weights with shape checks
//! - One forward pass from a fixed-width token sequence to a distribution

use super::config::{
    self, Activation, EmbeddingConfig, LayerSpec, LstmConfig, MergeMode, ModelArchitecture,
    RecurrentSpec,
};
use super::layers::{Bidirectional, Dense, Embedding, Lstm, Recurrent, RecurrentKind};
use crate::error::{PredictError, Result};
use candle_core::{Device, Tensor};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Pick the inference device. Metal on macOS and CUDA elsewhere when a GPU
/// is requested, CPU otherwise or when the accelerator is unavailable.
pub fn select_device(gpu: bool) -> Device {
    if !gpu {
        return Device::Cpu;
    }

    #[cfg(target_os = "macos")]
    let device = Device::new_metal(0);
    #[cfg(not(target_os = "macos"))]
    let device = Device::new_cuda(0);

    match device {
        Ok(device) => device,
        Err(e) => {
            warn!(error = %e, "GPU requested but unavailable, using CPU");
            Device::Cpu
        }
    }
}

/// Flat weight tensor as stored in a bundle
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TensorData {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// On-disk model: architecture JSON plus named weights
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelBundle {
    pub architecture: String,
    pub tensors: Vec<TensorData>,
}

impl ModelBundle {
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| PredictError::io(path, e))?;
        info!(path = %path.display(), bytes = bytes.len(), "loading model bundle");
        Ok(bincode::deserialize(&bytes)?)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = bincode::serialize(self)?;
        fs::write(path, bytes).map_err(|e| PredictError::io(path, e))?;
        Ok(())
    }

    /// Same bundle with deprecated keys already stripped from the architecture
    pub fn migrated(self) -> Result<Self> {
        let cleaned = config::clean_architecture(&self.architecture)?;
        Ok(ModelBundle {
            architecture: serde_json::to_string(&cleaned)?,
            tensors: self.tensors,
        })
    }
}

/// Named weights awaiting transplant into layers
struct WeightStore<'a> {
    tensors: FxHashMap<String, TensorData>,
    device: &'a Device,
}

impl<'a> WeightStore<'a> {
    fn new(tensors: Vec<TensorData>, device: &'a Device) -> Self {
        WeightStore {
            tensors: tensors.into_iter().map(|t| (t.name.clone(), t)).collect(),
            device,
        }
    }

    fn take(&mut self, name: &str, expected: &[usize]) -> Result<Tensor> {
        let data = self
            .tensors
            .remove(name)
            .ok_or_else(|| PredictError::MissingWeight(name.to_string()))?;

        let count: usize = expected.iter().product();
        if data.shape != expected || data.data.len() != count {
            return Err(PredictError::WeightShape {
                name: name.to_string(),
                expected: expected.to_vec(),
                actual: data.shape,
            });
        }

        Ok(Tensor::from_vec(data.data, expected, self.device)?)
    }

    fn take_lstm(&mut self, prefix: &str, input_dim: usize, cfg: &LstmConfig) -> Result<Lstm> {
        let gates = 4 * cfg.units;
        let kernel = self.take(&format!("{prefix}/kernel"), &[input_dim, gates])?;
        let recurrent_kernel =
            self.take(&format!("{prefix}/recurrent_kernel"), &[cfg.units, gates])?;
        let bias = if cfg.use_bias {
            self.take(&format!("{prefix}/bias"), &[gates])?
        } else {
            Tensor::zeros(gates, candle_core::DType::F32, self.device)?
        };

        Ok(Lstm {
            units: cfg.units,
            kernel,
            recurrent_kernel,
            bias,
            activation: cfg.activation,
            recurrent_activation: cfg.recurrent_activation,
        })
    }

    fn leftover(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tensors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

enum Layer {
    Embedding(Embedding),
    Recurrent(Recurrent),
    Dense(Dense),
    Identity,
}

/// One layer of the rebuilt network, for display
#[derive(Clone, Debug)]
pub struct LayerSummary {
    pub name: String,
    pub kind: &'static str,
    pub output_dim: usize,
}

/// Rebuilt next-word network
pub struct Model {
    layers: Vec<Layer>,
    summary: Vec<LayerSummary>,
    input_len: usize,
    input_dim: usize,
    output_dim: usize,
    parameter_count: usize,
    /// Final transform is a softmax
    normalized: bool,
    device: Device,
}

fn check_recurrent(name: &str, cfg: &LstmConfig) -> Result<()> {
    if cfg.return_state {
        return Err(PredictError::Architecture(format!(
            "layer `{name}` returns its state, which a sequential model cannot consume"
        )));
    }
    if cfg.stateful {
        debug!(layer = name, "stateful flag ignored, each prediction starts from zero state");
    }
    Ok(())
}

impl Model {
    /// Load a model bundle from disk
    pub fn load(path: impl AsRef<Path>, device: &Device) -> Result<Self> {
        let bundle = ModelBundle::read(path)?;
        Self::from_bundle(bundle, device)
    }

    /// Patch the architecture, rebuild the layers and transplant the weights
    pub fn from_bundle(bundle: ModelBundle, device: &Device) -> Result<Self> {
        let architecture = config::parse_architecture(&bundle.architecture)?;
        let mut weights = WeightStore::new(bundle.tensors, device);
        let model = Self::build(&architecture, &mut weights, device)?;

        let unused = weights.leftover();
        if !unused.is_empty() {
            warn!(?unused, "bundle contains weights no layer uses");
        }

        info!(
            input_len = model.input_len,
            output_dim = model.output_dim,
            parameters = model.parameter_count,
            "model ready"
        );
        Ok(model)
    }

    fn build(
        architecture: &ModelArchitecture,
        weights: &mut WeightStore,
        device: &Device,
    ) -> Result<Self> {
        if architecture.class_name != "Sequential" {
            return Err(PredictError::Architecture(format!(
                "expected a Sequential model, found {}",
                architecture.class_name
            )));
        }
        debug!(
            name = architecture.config.name.as_deref().unwrap_or("unnamed"),
            layers = architecture.config.layers.len(),
            "rebuilding network"
        );

        let mut layers = Vec::new();
        let mut summary = Vec::new();
        let mut input_len = None;
        let mut input_dim = 0;
        // feature width of the running activation and whether it is a sequence
        let mut width = 0;
        let mut sequence = false;
        let mut parameter_count = 0;
        let mut normalized = false;

        for (index, spec) in architecture.config.layers.iter().enumerate() {
            let name = spec
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}_{index}", spec.kind()));

            let layer = match spec {
                LayerSpec::InputLayer(cfg) => {
                    input_len = input_len.or(cfg.input_width());
                    Layer::Identity
                }
                LayerSpec::Embedding(cfg) => {
                    if !layers.iter().all(|l| matches!(l, Layer::Identity)) {
                        return Err(PredictError::Architecture(format!(
                            "embedding `{name}` must be the first layer"
                        )));
                    }
                    input_len = input_len.or(cfg.input_width());
                    let embedding = Self::embedding(&name, cfg, weights)?;
                    input_dim = cfg.input_dim;
                    width = cfg.output_dim;
                    sequence = true;
                    parameter_count += cfg.input_dim * cfg.output_dim;
                    normalized = false;
                    Layer::Embedding(embedding)
                }
                LayerSpec::Lstm(cfg) => {
                    if !sequence {
                        return Err(PredictError::Architecture(format!(
                            "LSTM `{name}` needs a sequence input"
                        )));
                    }
                    check_recurrent(&name, cfg)?;
                    let lstm = weights.take_lstm(&name, width, cfg)?;
                    parameter_count += lstm_parameters(width, cfg);
                    width = cfg.units;
                    sequence = cfg.return_sequences;
                    normalized = false;
                    Layer::Recurrent(Recurrent {
                        return_sequences: cfg.return_sequences,
                        kind: RecurrentKind::Single {
                            lstm,
                            go_backwards: cfg.go_backwards,
                        },
                    })
                }
                LayerSpec::Bidirectional(cfg) => {
                    if !sequence {
                        return Err(PredictError::Architecture(format!(
                            "bidirectional `{name}` needs a sequence input"
                        )));
                    }
                    let RecurrentSpec::Lstm(inner) = &cfg.layer;
                    check_recurrent(&name, inner)?;
                    let merge = cfg.merge_mode.ok_or_else(|| {
                        PredictError::Architecture(format!(
                            "bidirectional `{name}` has no merge mode"
                        ))
                    })?;
                    let forward = weights.take_lstm(&format!("{name}/forward"), width, inner)?;
                    let backward = weights.take_lstm(&format!("{name}/backward"), width, inner)?;
                    parameter_count += 2 * lstm_parameters(width, inner);
                    width = match merge {
                        MergeMode::Concat => 2 * inner.units,
                        _ => inner.units,
                    };
                    sequence = inner.return_sequences;
                    normalized = false;
                    Layer::Recurrent(Recurrent {
                        return_sequences: inner.return_sequences,
                        kind: RecurrentKind::Both(Bidirectional {
                            forward,
                            backward,
                            merge,
                        }),
                    })
                }
                LayerSpec::Dropout(cfg) => {
                    debug!(layer = %name, rate = cfg.rate, "dropout is inactive at inference");
                    Layer::Identity
                }
                LayerSpec::Dense(cfg) => {
                    if width == 0 {
                        return Err(PredictError::Architecture(format!(
                            "dense `{name}` has no input"
                        )));
                    }
                    let kernel = weights.take(&format!("{name}/kernel"), &[width, cfg.units])?;
                    let bias = if cfg.use_bias {
                        Some(weights.take(&format!("{name}/bias"), &[cfg.units])?)
                    } else {
                        None
                    };
                    parameter_count += width * cfg.units + if cfg.use_bias { cfg.units } else { 0 };
                    width = cfg.units;
                    normalized = cfg.activation == Activation::Softmax;
                    Layer::Dense(Dense {
                        kernel,
                        bias,
                        activation: cfg.activation,
                    })
                }
            };

            summary.push(LayerSummary {
                name,
                kind: spec.kind(),
                output_dim: width,
            });
            layers.push(layer);
        }

        if input_dim == 0 {
            return Err(PredictError::Architecture(
                "model has no embedding layer".to_string(),
            ));
        }
        if sequence {
            return Err(PredictError::Architecture(
                "model must end in a single distribution, not a sequence".to_string(),
            ));
        }
        let input_len = input_len.filter(|&n| n > 0).ok_or_else(|| {
            PredictError::Architecture("model does not declare an input width".to_string())
        })?;

        Ok(Model {
            layers,
            summary,
            input_len,
            input_dim,
            output_dim: width,
            parameter_count,
            normalized,
            device: device.clone(),
        })
    }

    fn embedding(name: &str, cfg: &EmbeddingConfig, weights: &mut WeightStore) -> Result<Embedding> {
        let table = weights.take(&format!("{name}/embeddings"), &[cfg.input_dim, cfg.output_dim])?;
        Ok(Embedding {
            weights: table,
            mask_zero: cfg.mask_zero,
        })
    }

    /// Forward pass over exactly `input_len` token ids
    pub fn forward(&self, tokens: &[u32]) -> Result<Vec<f32>> {
        if tokens.len() != self.input_len {
            return Err(PredictError::Architecture(format!(
                "expected {} input tokens, got {}",
                self.input_len,
                tokens.len()
            )));
        }
        if let Some(&index) = tokens.iter().find(|&&t| t as usize >= self.input_dim) {
            return Err(PredictError::TokenOutOfRange {
                index,
                limit: self.input_dim,
            });
        }

        let ids = Tensor::from_slice(tokens, tokens.len(), &self.device)?;
        let mut xs = ids.clone();
        let mut mask: Option<Vec<bool>> = None;

        for layer in &self.layers {
            xs = match layer {
                Layer::Embedding(embedding) => {
                    if embedding.mask_zero {
                        mask = Some(tokens.iter().map(|&t| t != 0).collect());
                    }
                    embedding.forward(&ids)?
                }
                Layer::Recurrent(recurrent) => {
                    let ys = recurrent.forward(&xs, mask.as_deref())?;
                    if !recurrent.return_sequences {
                        mask = None;
                    }
                    ys
                }
                Layer::Dense(dense) => dense.forward(&xs)?,
                Layer::Identity => xs,
            };
        }

        Ok(xs.flatten_all()?.to_vec1::<f32>()?)
    }

    /// Fixed number of tokens the model consumes
    pub fn input_len(&self) -> usize {
        self.input_len
    }

    /// Size of the predicted distribution
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Rows in the embedding table
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    /// Whether `forward` returns a probability distribution
    pub fn ends_in_softmax(&self) -> bool {
        self.normalized
    }

    pub fn summary(&self) -> &[LayerSummary] {
        &self.summary
    }
}

fn lstm_parameters(input_dim: usize, cfg: &LstmConfig) -> usize {
    let gates = 4 * cfg.units;
    input_dim * gates + cfg.units * gates + if cfg.use_bias { gates } else { 0 }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::llm::config::tests::legacy_architecture;

    fn zeros(name: &str, shape: &[usize]) -> TensorData {
        TensorData {
            name: name.to_string(),
            shape: shape.to_vec(),
            data: vec![0.0; shape.iter().product()],
        }
    }

    /// Legacy-format bundle whose dense bias makes `favourite` the argmax
    /// for every input. Embedding 2, BiLSTM 2 units, width `width`.
    pub(crate) fn fixed_bundle(vocab_size: usize, width: usize, favourite: usize) -> ModelBundle {
        let mut tensors = vec![zeros("embedding/embeddings", &[vocab_size, 2])];
        for direction in ["forward", "backward"] {
            tensors.push(zeros(&format!("bidirectional/{direction}/kernel"), &[2, 8]));
            tensors.push(zeros(&format!("bidirectional/{direction}/recurrent_kernel"), &[2, 8]));
            tensors.push(zeros(&format!("bidirectional/{direction}/bias"), &[8]));
        }
        tensors.push(zeros("dense/kernel", &[4, vocab_size]));
        let mut bias = zeros("dense/bias", &[vocab_size]);
        bias.data[favourite] = 3.0;
        tensors.push(bias);

        ModelBundle {
            architecture: legacy_architecture(vocab_size, width).to_string(),
            tensors,
        }
    }

    #[test]
    fn test_fixed_model_prediction() {
        let model = Model::from_bundle(fixed_bundle(6, 4, 3), &Device::Cpu).unwrap();
        assert_eq!(model.input_len(), 4);
        assert_eq!(model.output_dim(), 6);
        assert_eq!(model.input_dim(), 6);

        let probs = model.forward(&[0, 0, 1, 2]).unwrap();
        assert_eq!(probs.len(), 6);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        let best = probs
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |acc, (i, &p)| if p > acc.1 { (i, p) } else { acc });
        assert_eq!(best.0, 3);
        assert!(model.ends_in_softmax());
    }

    #[test]
    fn test_parameter_count_and_summary() {
        let model = Model::from_bundle(fixed_bundle(6, 4, 1), &Device::Cpu).unwrap();
        // embedding 12, two LSTMs of 2*8 + 2*8 + 8, dense 4*6 + 6
        assert_eq!(model.parameter_count(), 12 + 2 * 40 + 30);
        let kinds: Vec<&str> = model.summary().iter().map(|l| l.kind).collect();
        assert_eq!(kinds, ["input_layer", "embedding", "bidirectional", "dense"]);
        assert_eq!(model.summary()[2].output_dim, 4);
    }

    #[test]
    fn test_wrong_input_length() {
        let model = Model::from_bundle(fixed_bundle(6, 4, 1), &Device::Cpu).unwrap();
        assert!(matches!(
            model.forward(&[1, 2]),
            Err(PredictError::Architecture(_))
        ));
    }

    #[test]
    fn test_token_out_of_range() {
        let model = Model::from_bundle(fixed_bundle(6, 4, 1), &Device::Cpu).unwrap();
        assert!(matches!(
            model.forward(&[0, 0, 0, 9]),
            Err(PredictError::TokenOutOfRange { index: 9, limit: 6 })
        ));
    }

    #[test]
    fn test_missing_weight() {
        let mut bundle = fixed_bundle(6, 4, 1);
        bundle.tensors.retain(|t| t.name != "dense/kernel");
        assert!(matches!(
            Model::from_bundle(bundle, &Device::Cpu),
            Err(PredictError::MissingWeight(name)) if name == "dense/kernel"
        ));
    }

    #[test]
    fn test_weight_shape_mismatch() {
        let mut bundle = fixed_bundle(6, 4, 1);
        bundle.tensors[0] = zeros("embedding/embeddings", &[5, 2]);
        assert!(matches!(
            Model::from_bundle(bundle, &Device::Cpu),
            Err(PredictError::WeightShape { .. })
        ));
    }

    #[test]
    fn test_bundle_file_and_migration() {
        let dir = tempfile::tempdir().unwrap();
        let legacy_path = dir.path().join("legacy.bin");
        let migrated_path = dir.path().join("migrated.bin");

        fixed_bundle(6, 4, 2).write(&legacy_path).unwrap();
        let migrated = ModelBundle::read(&legacy_path).unwrap().migrated().unwrap();
        assert!(!migrated.architecture.contains("time_major"));
        migrated.write(&migrated_path).unwrap();

        let model = Model::load(&migrated_path, &Device::Cpu).unwrap();
        let probs = model.forward(&[1, 1, 1, 1]).unwrap();
        assert_eq!(probs.len(), 6);
    }

    #[test]
    fn test_missing_bundle_file() {
        assert!(matches!(
            Model::load("no/such/model.bin", &Device::Cpu),
            Err(PredictError::Io { .. })
        ));
    }

    #[test]
    fn test_cpu_device_without_gpu() {
        assert!(matches!(select_device(false), Device::Cpu));
    }
}
