//! Model import binary for next-word
//!
//! Converts an exported architecture (`model.to_json()`) plus its weights in
//! safetensors format into the bundle the predictor loads.
//! Usage: cargo run --bin import -- --architecture model.json --weights model.safetensors

use candle_core::{DType, Device, Tensor};
use clap::Parser;
use next_word::error::{PredictError, Result};
use next_word::llm::config;
use next_word::llm::model::TensorData;
use next_word::llm::ModelBundle;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "import")]
#[command(about = "Build a next-word model bundle from exported architecture JSON and safetensors weights")]
struct Args {
    /// Architecture JSON as written by `model.to_json()`
    #[arg(short, long)]
    architecture: PathBuf,

    /// Weights saved as safetensors, keyed by the framework's weight names
    #[arg(short, long)]
    weights: PathBuf,

    /// Output bundle path
    #[arg(short, long, default_value = "models/model_bilstm.bin")]
    output: PathBuf,

    /// Strip deprecated architecture keys now instead of at every load
    #[arg(long)]
    patch: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Bundle name for a framework weight name.
///
/// `bidirectional/forward_lstm/lstm_cell/kernel:0` becomes
/// `bidirectional/forward/kernel`, `dense/kernel:0` becomes `dense/kernel`.
/// The layer is the first path segment matching a named layer, so outer
/// model prefixes are skipped.
fn bundle_name(raw: &str, layers: &[String]) -> Option<String> {
    let trimmed = raw.split(':').next().unwrap_or(raw);
    let parts: Vec<&str> = trimmed.split('/').collect();
    let param = *parts.last()?;
    let at = parts[..parts.len() - 1]
        .iter()
        .position(|p| layers.iter().any(|l| l == p))?;
    let layer = parts[at];

    let direction = parts[at + 1..parts.len() - 1].iter().find_map(|p| {
        if p.starts_with("forward") {
            Some("forward")
        } else if p.starts_with("backward") {
            Some("backward")
        } else {
            None
        }
    });

    Some(match direction {
        Some(direction) => format!("{layer}/{direction}/{param}"),
        None => format!("{layer}/{param}"),
    })
}

/// Rename and flatten exported weights into a bundle
fn import(architecture: String, weights: HashMap<String, Tensor>) -> Result<ModelBundle> {
    let parsed = config::parse_architecture(&architecture)?;
    let layers: Vec<String> = parsed
        .config
        .layers
        .iter()
        .filter_map(|l| l.name().map(str::to_string))
        .collect();

    let mut raw_names: Vec<String> = weights.keys().cloned().collect();
    raw_names.sort();

    let mut tensors = Vec::with_capacity(weights.len());
    for raw in raw_names {
        let name = bundle_name(&raw, &layers).ok_or_else(|| PredictError::UnmappedWeight(raw.clone()))?;
        let tensor = &weights[&raw];
        debug!(from = %raw, to = %name, shape = ?tensor.dims(), "mapped weight");
        tensors.push(TensorData {
            name,
            shape: tensor.dims().to_vec(),
            data: tensor.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?,
        });
    }

    Ok(ModelBundle {
        architecture,
        tensors,
    })
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let fallback = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with_writer(std::io::stderr)
        .init();

    let architecture =
        fs::read_to_string(&args.architecture).map_err(|e| PredictError::io(&args.architecture, e))?;
    let weights = candle_core::safetensors::load(&args.weights, &Device::Cpu)?;
    info!(path = %args.weights.display(), tensors = weights.len(), "weights loaded");

    let mut bundle = import(architecture, weights)?;
    if args.patch {
        bundle = bundle.migrated()?;
    }

    if let Some(dir) = args.output.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| PredictError::io(dir, e))?;
    }
    bundle.write(&args.output)?;
    info!(path = %args.output.display(), tensors = bundle.tensors.len(), "bundle written");
    Ok(())
}
