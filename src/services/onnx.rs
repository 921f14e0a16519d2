// Shared ONNX Runtime session builder with automatic hardware acceleration detection

use anyhow::{Context, Result};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::{debug, info, warn};

#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;

#[cfg(all(target_os = "macos", feature = "coreml"))]
use ort::execution_providers::CoreMLExecutionProvider;

#[cfg(all(target_os = "windows", feature = "directml"))]
use ort::execution_providers::DirectMLExecutionProvider;

/// Calculate optimal thread count for ONNX Runtime CPU inference.
///
/// Using all CPU cores can hurt performance on Windows due to thread
/// synchronization overhead, so the count is capped there.
fn optimal_intra_op_threads() -> usize {
    let total_cores = num_cpus::get();

    #[cfg(target_os = "windows")]
    let optimal = std::cmp::min(6, total_cores).max(1);

    #[cfg(not(target_os = "windows"))]
    let optimal = total_cores.max(1);

    debug!(
        "CPU threads: {} total cores, using {} for inference",
        total_cores, optimal
    );
    optimal
}

/// Build an ONNX Runtime session from a model file with automatic hardware
/// acceleration detection.
///
/// Tries acceleration providers in this order:
/// 1. CUDA (NVIDIA GPUs, if feature enabled)
/// 2. CoreML (Apple Silicon, if feature enabled)
/// 3. DirectML (Windows GPU acceleration, if feature enabled)
/// 4. CPU (fallback)
///
/// Set `INFERENCE_BACKEND=cpu` to skip the acceleration attempts entirely.
///
/// Returns `(backend_name, Session)`.
pub fn build_session(model_path: &Path, model_name: &str) -> Result<(String, Session)> {
    if !model_path.exists() {
        anyhow::bail!(
            "{} model not found at {}. Copy the model file to this location or set the \
            corresponding *_MODEL_PATH variable.",
            model_name,
            model_path.display()
        );
    }

    let forced_cpu = std::env::var("INFERENCE_BACKEND")
        .map(|s| s.eq_ignore_ascii_case("cpu"))
        .unwrap_or(false);
    if forced_cpu {
        info!("INFERENCE_BACKEND=cpu, skipping acceleration probes for {}", model_name);
    }

    if !forced_cpu {
        // Try CUDA (if feature enabled)
        #[cfg(feature = "cuda")]
        {
            if let Ok(session) = Session::builder()
                .and_then(|b| b.with_execution_providers([CUDAExecutionProvider::default().build()]))
                .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
                .and_then(|b| b.with_intra_threads(optimal_intra_op_threads()))
                .and_then(|b| b.with_inter_threads(1))
                .and_then(|b| b.commit_from_file(model_path))
            {
                info!("✓ Using CUDA acceleration for {}", model_name);
                return Ok(("CUDA".to_string(), session));
            }
        }

        // Try CoreML (Apple Silicon, if feature enabled)
        #[cfg(all(target_os = "macos", feature = "coreml"))]
        {
            if let Ok(session) = Session::builder()
                .and_then(|b| b.with_execution_providers([CoreMLExecutionProvider::default().build()]))
                .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
                .and_then(|b| b.with_intra_threads(optimal_intra_op_threads()))
                .and_then(|b| b.with_inter_threads(1))
                .and_then(|b| b.commit_from_file(model_path))
            {
                info!("✓ Using CoreML acceleration for {}", model_name);
                return Ok(("CoreML".to_string(), session));
            }
        }

        // Try DirectML (Windows, if feature enabled)
        #[cfg(all(target_os = "windows", feature = "directml"))]
        {
            // DirectML requires sequential execution and a conservative
            // optimization level for stability
            if let Ok(session) = Session::builder()
                .and_then(|b| b.with_execution_providers([DirectMLExecutionProvider::default().build()]))
                .and_then(|b| b.with_parallel_execution(false))
                .and_then(|b| b.with_memory_pattern(false))
                .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level1))
                .and_then(|b| b.with_intra_threads(optimal_intra_op_threads()))
                .and_then(|b| b.with_inter_threads(1))
                .and_then(|b| b.commit_from_file(model_path))
            {
                info!("✓ Using DirectML acceleration for {}", model_name);
                return Ok(("DirectML".to_string(), session));
            }
        }
    }

    // Final fallback: Pure CPU (no acceleration)
    let session = Session::builder()
        .context(format!("Failed to create ONNX session builder for {model_name}"))?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .context(format!("Failed to configure CPU execution provider for {model_name}"))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context(format!("Failed to set graph optimization level for {model_name}"))?
        .with_intra_threads(optimal_intra_op_threads())
        .context(format!("Failed to configure intra-op threads for {model_name}"))?
        .with_inter_threads(1)
        .context(format!("Failed to configure inter-op threads for {model_name}"))?
        .commit_from_file(model_path)
        .context(format!(
            "Failed to load {} ONNX model from {}",
            model_name,
            model_path.display()
        ))?;

    warn!("Using CPU-only inference for {} (no GPU acceleration available)", model_name);
    Ok(("CPU".to_string(), session))
}
