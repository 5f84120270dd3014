//! Query preprocessing: length cap, refusal of empty input, embedding and
//! tokenization.

use crate::error::EngineError;
use crate::EngineContext;

pub const MAX_QUERY_CHARS: usize = 512;

#[derive(Debug, Clone)]
pub struct ProcessedQuery {
    /// The query after trimming and the 512-char cap.
    pub text: String,
    pub embedding: Vec<f32>,
    pub tokens: Vec<String>,
}

pub fn process_query(ctx: &EngineContext, raw: &str) -> Result<ProcessedQuery, EngineError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Query("Please enter a search query.".into()));
    }
    let text: String = trimmed.chars().take(MAX_QUERY_CHARS).collect();

    let embedding = ctx
        .embedder
        .embed(&text)
        .map_err(|e| EngineError::Embedding(e.to_string()))?;
    let tokens = ctx.tokenizer.tokenize(&text);

    Ok(ProcessedQuery { text, embedding, tokens })
}
