//! Sentence embedders. The ONNX implementation runs a local model through
//! ONNX Runtime; when its assets are missing the deterministic hashing
//! fallback keeps the pipeline functional (capability flag recorded by the
//! caller).

mod hashing;

pub use hashing::HashingEmbedder;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ndarray::Array2;
use ort::execution_providers::{CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider};
use ort::session::Session;
use ort::value::Tensor;
use thiserror::Error;
use tokenizers::{Encoding, Tokenizer};
use tracing::{info, warn};

/// Compute device actually selected for inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cuda,
    Metal,
    Cpu,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cuda => "cuda",
            Device::Metal => "metal",
            Device::Cpu => "cpu",
        }
    }
}

/// Static metadata describing a particular embedder instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedderInfo {
    pub embedding_model_id: String,
    pub dimension: usize,
    pub device: Device,
}

#[derive(Debug, Error)]
pub enum EmbedderError {
    #[error("invalid embedder configuration: {message}")]
    InvalidConfiguration { message: String },
    #[error("input exceeds max length of {max_length} tokens (actual {actual_length})")]
    InputTooLong { max_length: usize, actual_length: usize },
    #[error("provider failure: {message}")]
    ProviderFailure { message: String },
}

/// Core interface for all embedder implementations. Vectors are
/// L2-normalized and of fixed dimension.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;
    fn info(&self) -> &EmbedderInfo;
}

/// Configuration for the local ONNX embedder.
#[derive(Debug, Clone)]
pub struct OnnxConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub dimension: usize,
    pub max_input_length: usize,
    pub embedding_model_id: String,
}

/// ONNX-based sentence embedder: tokenize, run the model, mean-pool over
/// the attention mask, normalize.
pub struct OnnxEmbedder {
    info: EmbedderInfo,
    session: Mutex<Session>,
    tokenizer: Arc<Tokenizer>,
    max_input_length: usize,
}

/// Probe execution providers in the fixed priority order CUDA, Metal, CPU.
pub fn detect_device() -> Device {
    if CUDAExecutionProvider::default().is_available().unwrap_or(false) {
        Device::Cuda
    } else if CoreMLExecutionProvider::default()
        .is_available()
        .unwrap_or(false)
    {
        Device::Metal
    } else {
        Device::Cpu
    }
}

impl OnnxEmbedder {
    pub fn new(config: OnnxConfig) -> Result<Self, EmbedderError> {
        if config.dimension == 0 {
            return Err(EmbedderError::InvalidConfiguration {
                message: "dimension must be greater than zero".into(),
            });
        }
        if config.max_input_length == 0 {
            return Err(EmbedderError::InvalidConfiguration {
                message: "max_input_length must be greater than zero".into(),
            });
        }
        let model_path = resolve_existing_path(&config.model_path, "ONNX model")?;
        let tokenizer_path = resolve_existing_path(&config.tokenizer_path, "tokenizer config")?;

        let device = detect_device();
        let session = Session::builder()
            .map_err(|e| map_ort_error("create session builder", e))?
            .with_execution_providers([
                CUDAExecutionProvider::default().build(),
                CoreMLExecutionProvider::default().build(),
            ])
            .map_err(|e| map_ort_error("register execution providers", e))?
            .commit_from_file(&model_path)
            .map_err(|e| map_ort_error("load ONNX model", e))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| map_tokenizer_error("load tokenizer", e))?;

        info!(device = device.as_str(), model = %config.embedding_model_id, "embedder ready");
        Ok(Self {
            info: EmbedderInfo {
                embedding_model_id: config.embedding_model_id,
                dimension: config.dimension,
                device,
            },
            session: Mutex::new(session),
            tokenizer: Arc::new(tokenizer),
            max_input_length: config.max_input_length,
        })
    }

    fn prepare_encodings(&self, texts: &[&str]) -> Result<Vec<Encoding>, EmbedderError> {
        let encodings = texts
            .iter()
            .map(|t| self.tokenizer.encode(*t, true))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_tokenizer_error("tokenize inputs", e))?;
        let max_len = encodings.iter().map(Encoding::len).max().unwrap_or(0);
        if max_len > self.max_input_length {
            return Err(EmbedderError::InputTooLong {
                max_length: self.max_input_length,
                actual_length: max_len,
            });
        }
        Ok(encodings)
    }

    fn run_batch(&self, encodings: &[Encoding]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let batch = encodings.len();
        let seq_len = encodings.iter().map(Encoding::len).max().unwrap_or(0);

        let mut input_ids = Array2::<i64>::zeros((batch, seq_len));
        let mut attention_mask = Array2::<i64>::zeros((batch, seq_len));
        for (row, encoding) in encodings.iter().enumerate() {
            for (col, (&id, &m)) in encoding
                .get_ids()
                .iter()
                .zip(encoding.get_attention_mask().iter())
                .enumerate()
            {
                input_ids[(row, col)] = id as i64;
                attention_mask[(row, col)] = m as i64;
            }
        }

        let ids_tensor =
            Tensor::from_array(input_ids).map_err(|e| map_ort_error("build input tensor", e))?;
        let mask_tensor = Tensor::from_array(attention_mask.clone())
            .map_err(|e| map_ort_error("build mask tensor", e))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EmbedderError::ProviderFailure {
                message: "embedder session poisoned".into(),
            })?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
            ])
            .map_err(|e| map_ort_error("run model", e))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| map_ort_error("read model output", e))?;
        let dims: Vec<usize> = shape.iter().map(|d| *d as usize).collect();
        if dims.len() != 3 || dims[0] != batch || dims[1] != seq_len {
            return Err(EmbedderError::ProviderFailure {
                message: format!("unexpected output shape {dims:?}"),
            });
        }
        let hidden = dims[2];

        let mut out = Vec::with_capacity(batch);
        for row in 0..batch {
            let mut pooled = vec![0.0f32; hidden];
            let mut count = 0.0f32;
            for col in 0..seq_len {
                if attention_mask[(row, col)] == 0 {
                    continue;
                }
                count += 1.0;
                let base = (row * seq_len + col) * hidden;
                for (h, slot) in pooled.iter_mut().enumerate() {
                    *slot += data[base + h];
                }
            }
            if count > 0.0 {
                for v in pooled.iter_mut() {
                    *v /= count;
                }
            }
            normalize(&mut pooled);
            out.push(pooled);
        }
        Ok(out)
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        Ok(self.embed_batch(&[text])?.into_iter().next().unwrap_or_default())
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let encodings = self.prepare_encodings(texts)?;
        self.run_batch(&encodings)
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}

/// Open the ONNX embedder, degrading to the hashing fallback when the model
/// cannot be loaded. The returned flag is true when the semantic model is
/// live; callers record it as a capability.
pub fn open_embedder(config: OnnxConfig) -> (Arc<dyn Embedder>, bool) {
    match OnnxEmbedder::new(config) {
        Ok(e) => (Arc::new(e), true),
        Err(e) => {
            warn!(error = %e, "semantic model unavailable, using hashing fallback embedder");
            (Arc::new(HashingEmbedder::default()), false)
        }
    }
}

/// Scale a vector to unit L2 norm in place. Zero vectors stay zero.
pub(crate) fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn resolve_existing_path(path: &Path, what: &str) -> Result<PathBuf, EmbedderError> {
    if path.exists() {
        Ok(path.to_path_buf())
    } else {
        Err(EmbedderError::InvalidConfiguration {
            message: format!("{what} not found at {}", path.display()),
        })
    }
}

fn map_ort_error(context: &str, err: ort::Error) -> EmbedderError {
    EmbedderError::ProviderFailure {
        message: format!("{context}: {err}"),
    }
}

fn map_tokenizer_error(context: &str, err: impl std::fmt::Display) -> EmbedderError {
    EmbedderError::ProviderFailure {
        message: format!("{context}: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_vectors() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }

    #[test]
    fn normalize_leaves_zero_vector_alone() {
        let mut v = vec![0.0, 0.0];
        normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn missing_model_reports_configuration_error() {
        let cfg = OnnxConfig {
            model_path: PathBuf::from("/nonexistent/model.onnx"),
            tokenizer_path: PathBuf::from("/nonexistent/tokenizer.json"),
            dimension: 8,
            max_input_length: 16,
            embedding_model_id: "test".into(),
        };
        match OnnxEmbedder::new(cfg) {
            Err(EmbedderError::InvalidConfiguration { .. }) => {}
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn open_embedder_falls_back_when_model_missing() {
        let cfg = OnnxConfig {
            model_path: PathBuf::from("/nonexistent/model.onnx"),
            tokenizer_path: PathBuf::from("/nonexistent/tokenizer.json"),
            dimension: 8,
            max_input_length: 16,
            embedding_model_id: "test".into(),
        };
        let (embedder, semantic) = open_embedder(cfg);
        assert!(!semantic);
        let v = embedder.embed("fallback still embeds").unwrap();
        assert_eq!(v.len(), embedder.info().dimension);
    }
}
