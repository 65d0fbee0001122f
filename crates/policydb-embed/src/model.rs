//! Local BGE-M3 (XLM-RoBERTa) embedder running on candle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use policydb_core::config::expand_path;
use policydb_core::error::{Error, Result};
use policydb_core::traits::EmbeddingService;
use policydb_core::types::{TaskType, Vector};

pub const BGE_M3_DIM: usize = 1024;
const MAX_TOKENS: usize = 256;

fn model_err(e: impl std::fmt::Display) -> Error { Error::EmbeddingService(e.to_string()) }

pub struct LocalModelEmbedder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    id: String,
}

impl LocalModelEmbedder {
    pub fn load(model_dir: Option<&str>) -> Result<Self> {
        let device = select_device();
        let model_dir = resolve_model_dir(model_dir)?;
        info!(dir = %model_dir.display(), "loading BGE-M3 model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::InvalidConfig(format!("failed to load tokenizer from {}: {e}", tokenizer_path.display())))?;
        let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(model_dir.join("config.json"))?)?;
        let weights = candle_core::pickle::read_all(model_dir.join("pytorch_model.bin")).map_err(model_err)?;
        let weights_map: HashMap<String, Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb).map_err(model_err)?;
        info!("BGE-M3 model loaded");
        Ok(Self { model, tokenizer, device, id: format!("local:bge-m3:d{BGE_M3_DIM}") })
    }

    fn forward(&self, text: &str) -> Result<Vector> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, MAX_TOKENS, &self.device)?;
        let token_type_ids = Tensor::zeros((1, MAX_TOKENS), DType::I64, &self.device).map_err(model_err)?;
        let hidden = self
            .model
            .forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)
            .map_err(model_err)?;
        let emb = masked_mean_l2(&hidden, &attention_mask)?;
        let v: Vector = emb
            .to_device(&Device::Cpu)
            .and_then(|t| t.squeeze(0))
            .and_then(|t| t.to_vec1())
            .map_err(model_err)?;
        if start.elapsed().as_millis() > 100 {
            debug!(ms = start.elapsed().as_millis() as u64, "slow embedding");
        }
        Ok(v)
    }
}

#[async_trait]
impl EmbeddingService for LocalModelEmbedder {
    fn model_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { BGE_M3_DIM }

    async fn embed_one(&self, text: &str, _task: TaskType) -> Result<Vector> { self.forward(text) }
}

pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) {
            info!("device: metal");
            return dev;
        }
        warn!("metal unavailable, falling back to cpu");
    }
    info!("device: cpu");
    Device::Cpu
}

/// Encode, truncate and pad to exactly `max_len` tokens (pad id 1).
pub fn tokenize_on_device(tokenizer: &Tokenizer, text: &str, max_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
    let enc = tokenizer.encode(text, true).map_err(|e| model_err(format!("tokenization failed: {e}")))?;
    let mut ids = enc.get_ids().to_vec();
    let mut mask = enc.get_attention_mask().to_vec();
    ids.truncate(max_len);
    mask.truncate(max_len);
    if ids.len() < max_len {
        let pad = max_len - ids.len();
        ids.extend(std::iter::repeat(1).take(pad));
        mask.extend(std::iter::repeat(0).take(pad));
    }
    let input_ids = Tensor::from_iter(ids, device).and_then(|t| t.reshape((1, max_len))).map_err(model_err)?;
    let attention_mask = Tensor::from_iter(mask, device).and_then(|t| t.reshape((1, max_len))).map_err(model_err)?;
    Ok((input_ids, attention_mask))
}

/// Mean over unmasked tokens, then L2-normalise: `[B,T,H] -> [B,H]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    pool(hidden, attention_mask).map_err(model_err)
}

fn pool(hidden: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let hidden_dim = hidden.dims3()?.2;
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let mask_3d = mask.unsqueeze(2)?;
    let mask_b = match mask_3d.broadcast_as(hidden.shape()) {
        Ok(m) => m,
        Err(_) => mask_3d.repeat((1, 1, hidden_dim))?,
    };
    let sum = (hidden * &mask_b)?.sum(1)?;
    let lengths = mask.sum(1)?.unsqueeze(1)?.to_dtype(sum.dtype())?;
    let mean = sum.broadcast_div(&lengths)?;
    let eps_val = match hidden.dtype() { DType::F16 => 1e-6f32, _ => 1e-12f32 };
    let eps = Tensor::new(&[eps_val], hidden.device())?.to_dtype(hidden.dtype())?.unsqueeze(0)?;
    let norm = mean.sqr()?.sum_keepdim(1)?.sqrt()?.broadcast_add(&eps)?;
    mean.broadcast_div(&norm)
}

fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    let candidates = configured
        .map(expand_path)
        .into_iter()
        .chain(std::env::var("APP_MODEL_DIR").ok().map(PathBuf::from))
        .chain(std::env::var("MODEL_DIR").ok().map(PathBuf::from))
        .chain([Path::new("../models/bge-m3").to_path_buf(), Path::new("models/bge-m3").to_path_buf()]);
    for p in candidates {
        if p.exists() {
            return Ok(p);
        }
    }
    Err(Error::InvalidConfig("could not locate BGE-M3 model directory".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pooling_ignores_padding_and_normalises() {
        let device = Device::Cpu;
        let hidden = Tensor::new(&[[[3f32, 4.0], [100.0, 100.0]]], &device).expect("tensor");
        let mask = Tensor::new(&[[1u32, 0]], &device).expect("mask");
        let out = masked_mean_l2(&hidden, &mask).expect("pool");
        let v: Vec<Vec<f32>> = out.to_vec2().expect("vec");
        assert!((v[0][0] - 0.6).abs() < 1e-5);
        assert!((v[0][1] - 0.8).abs() < 1e-5);
    }
}
