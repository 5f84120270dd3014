use std::path::PathBuf;

use crate::embedder::OnnxConfig;

/// Default settings for the local ONNX sentence embedder.
#[derive(Debug, Clone, Copy)]
pub struct OnnxDefaults {
    pub model_path: &'static str,
    pub tokenizer_path: &'static str,
    pub embedding_dimension: usize,
    pub max_input_tokens: usize,
    pub embedding_model_id: &'static str,
}

/// Shared defaults so the CLI, service, and tests stay in sync.
pub const ONNX_DEFAULTS: OnnxDefaults = OnnxDefaults {
    model_path: "models/bge-m3-onnx/model.onnx",
    tokenizer_path: "models/bge-m3-onnx/tokenizer.json",
    embedding_dimension: 1024,
    max_input_tokens: 8192,
    embedding_model_id: "bge-m3-onnx",
};

/// Build an [`OnnxConfig`] from the shared defaults. Asset paths resolve
/// relative to this crate's directory so the working directory does not
/// matter.
pub fn default_onnx_config() -> OnnxConfig {
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    OnnxConfig {
        model_path: base.join(ONNX_DEFAULTS.model_path),
        tokenizer_path: base.join(ONNX_DEFAULTS.tokenizer_path),
        dimension: ONNX_DEFAULTS.embedding_dimension,
        max_input_length: ONNX_DEFAULTS.max_input_tokens,
        embedding_model_id: ONNX_DEFAULTS.embedding_model_id.into(),
    }
}
