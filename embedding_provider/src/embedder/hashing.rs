//! Deterministic feature-hashing embedder. Not a semantic model: it exists
//! so indexing and search keep working when the ONNX assets are absent, and
//! as the embedder under test. Same text always maps to the same unit
//! vector; token overlap still yields cosine similarity.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::{normalize, Device, Embedder, EmbedderError, EmbedderInfo};

const DEFAULT_DIMENSION: usize = 384;

pub struct HashingEmbedder {
    info: EmbedderInfo,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::with_dimension(DEFAULT_DIMENSION)
    }
}

impl HashingEmbedder {
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            info: EmbedderInfo {
                embedding_model_id: "hashing-fallback".into(),
                dimension: dimension.max(1),
                device: Device::Cpu,
            },
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let dim = self.info.dimension;
        let mut v = vec![0.0f32; dim];
        for feature in features(text) {
            let mut hasher = DefaultHasher::new();
            feature.hash(&mut hasher);
            let h = hasher.finish();
            let bucket = (h % dim as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        normalize(&mut v);
        v
    }
}

/// Lowercased alphanumeric/Hangul runs plus their character bigrams, so
/// near-identical texts land close together.
fn features(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut run = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            run.extend(ch.to_lowercase());
        } else if !run.is_empty() {
            push_run(&mut out, &run);
            run.clear();
        }
    }
    if !run.is_empty() {
        push_run(&mut out, &run);
    }
    out
}

fn push_run(out: &mut Vec<String>, run: &str) {
    out.push(run.to_string());
    let chars: Vec<char> = run.chars().collect();
    for pair in chars.windows(2) {
        out.push(pair.iter().collect());
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        Ok(self.embed_one(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_are_deterministic_and_normalized() {
        let e = HashingEmbedder::default();
        let a = e.embed("예산 조정 보고서").unwrap();
        let b = e.embed("예산 조정 보고서").unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }

    #[test]
    fn overlapping_texts_are_closer_than_disjoint_ones() {
        let e = HashingEmbedder::default();
        let a = e.embed("budget adjustment for q4").unwrap();
        let b = e.embed("q4 budget adjustment").unwrap();
        let c = e.embed("holiday photo album").unwrap();
        let cos = |x: &[f32], y: &[f32]| x.iter().zip(y).map(|(p, q)| p * q).sum::<f32>();
        assert!(cos(&a, &b) > cos(&a, &c));
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let e = HashingEmbedder::default();
        let v = e.embed("").unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
    }
}
