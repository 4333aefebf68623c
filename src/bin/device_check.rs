//! Accelerator diagnostic for the next-word runtime
//!
//! Prints the Candle build capabilities, lists available GPU devices and
//! runs one small matrix multiplication on the first of them.
//! Usage: cargo run --bin device_check -- --ordinal 0

use candle_core::{utils, Device, Tensor};
use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "device_check")]
#[command(about = "Report GPU availability and confirm tensor acceleration works")]
struct Args {
    /// GPU ordinal to check
    #[arg(short, long, default_value = "0")]
    ordinal: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Accelerators that could be opened at `ordinal`
fn open_gpus(ordinal: usize) -> Vec<(String, Device)> {
    let mut gpus = Vec::new();

    match Device::new_cuda(ordinal) {
        Ok(device) => gpus.push((format!("/GPU:{ordinal} (cuda)"), device)),
        Err(e) => debug!(error = %e, "no CUDA device"),
    }
    match Device::new_metal(ordinal) {
        Ok(device) => gpus.push((format!("/GPU:{ordinal} (metal)"), device)),
        Err(e) => debug!(error = %e, "no Metal device"),
    }

    gpus
}

/// `[[1, 2, 3], [4, 5, 6]] x [[1, 2], [3, 4], [5, 6]]`
fn sample_matmul(device: &Device) -> candle_core::Result<Tensor> {
    let a = Tensor::new(&[[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]], device)?;
    let b = Tensor::new(&[[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0]], device)?;
    a.matmul(&b)
}

fn main() {
    let args = Args::parse();
    let fallback = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with_writer(std::io::stderr)
        .init();

    println!("next-word {} (Candle runtime)", env!("CARGO_PKG_VERSION"));
    println!(
        "CPU: {} threads | avx={} neon={} mkl={} accelerate={}",
        utils::get_num_threads(),
        utils::with_avx(),
        utils::with_neon(),
        utils::has_mkl(),
        utils::has_accelerate()
    );
    println!(
        "Compiled with: cuda={} metal={}",
        utils::cuda_is_available(),
        utils::metal_is_available()
    );

    let gpus = open_gpus(args.ordinal);
    if gpus.is_empty() {
        println!("No GPU devices found");
    } else {
        println!("Num GPUs Available: {}", gpus.len());
        for (name, device) in &gpus {
            println!("Device name: {name}");
            println!("Device details: {device:?}");
        }
        // Candle has no memory-growth switch: buffers are allocated per tensor
        for (name, _) in &gpus {
            println!("Memory growth: on-demand allocation for GPU: {name}");
        }
    }

    let (location, device) = match gpus.into_iter().next() {
        Some((name, device)) => (name, device),
        None => ("CPU".to_string(), Device::Cpu),
    };

    match sample_matmul(&device) {
        Ok(result) => {
            println!("Matrix multiplication result (on {location}):");
            println!("{result}");
        }
        Err(e) => error!(error = %e, device = %location, "matrix multiplication failed"),
    }
}
