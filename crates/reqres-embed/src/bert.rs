use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use reqres_core::error::{Error, Result};
use reqres_core::traits::Embedder;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::{encodings_to_tensors, load_tokenizer};

const BATCH_SIZE: usize = 32;

/// Sentence embedder over a local BERT checkpoint (e.g. `all-MiniLM-L6-v2`):
/// masked mean pooling of the last hidden layer, L2-normalised.
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    id: String,
    dim: usize,
    max_len: usize,
}

#[derive(serde::Deserialize)]
struct Dims {
    hidden_size: usize,
}

impl BertEmbedder {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        info!(dir = %model_dir.display(), "loading embedding model");
        let tokenizer = load_tokenizer(model_dir, max_len)?;
        let (config, dim) = read_config(model_dir)?;
        let vb = load_weights(model_dir, &device)?;
        let model = BertModel::load(vb, &config).map_err(Error::model)?;
        let id = format!("bert:{}:d{dim}", model_name(model_dir));
        info!(%id, "embedding model ready");
        Ok(Self { model, tokenizer, device, id, dim, max_len })
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let encodings = self.tokenizer.encode_batch(inputs, true).map_err(Error::model)?;
        let batch = encodings_to_tensors(&encodings, &self.device)?;
        let hidden = self
            .model
            .forward(&batch.input_ids, &batch.token_type_ids, Some(&batch.attention_mask))
            .map_err(Error::model)?;
        let pooled = masked_mean_l2(&hidden, &batch.attention_mask)?;
        pooled.to_device(&Device::Cpu).and_then(|t| t.to_vec2::<f32>()).map_err(Error::model)
    }
}

impl Embedder for BertEmbedder {
    fn id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            out.extend(self.embed_chunk(chunk)?);
        }
        let elapsed = start.elapsed();
        debug!(texts = texts.len(), ms = elapsed.as_millis(), "embedded batch");
        if texts.len() == 1 && elapsed.as_millis() > 500 { warn!(ms = elapsed.as_millis(), "slow embedding"); }
        Ok(out)
    }
}

/// Parses `config.json` into the candle config plus the hidden size.
pub(crate) fn read_config(model_dir: &Path) -> Result<(BertConfig, usize)> {
    let path = model_dir.join("config.json");
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| Error::Model(format!("failed to read {}: {e}", path.display())))?;
    let config: BertConfig = serde_json::from_str(&raw).map_err(Error::model)?;
    let dims: Dims = serde_json::from_str(&raw).map_err(Error::model)?;
    Ok((config, dims.hidden_size))
}

/// Reads `model.safetensors`, falling back to `pytorch_model.bin`.
pub(crate) fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    let pickle = model_dir.join("pytorch_model.bin");
    let tensors: HashMap<String, Tensor> = if safetensors.exists() {
        candle_core::safetensors::load(&safetensors, device).map_err(Error::model)?
    } else if pickle.exists() {
        candle_core::pickle::read_all(&pickle).map_err(Error::model)?.into_iter().collect()
    } else {
        return Err(Error::Model(format!("no model weights found in {}", model_dir.display())));
    };
    Ok(VarBuilder::from_tensors(tensors, DType::F32, device))
}

fn model_name(model_dir: &Path) -> String {
    let canonical: PathBuf = model_dir.canonicalize().unwrap_or_else(|_| model_dir.to_path_buf());
    canonical.file_name().map_or_else(|| "local".to_string(), |n| n.to_string_lossy().to_string())
}
