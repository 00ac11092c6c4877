use std::path::Path;

use candle_core::{Device, IndexOp};
use candle_nn::{linear, Linear, Module};
use candle_transformers::models::bert::BertModel;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use reqres_core::error::{Error, Result};
use reqres_core::traits::Reranker;

use crate::bert::{load_weights, read_config};
use crate::device::select_device;
use crate::tokenize::{encodings_to_tensors, load_tokenizer};

const BATCH_SIZE: usize = 16;

/// BERT sequence-classification head over `[CLS] query [SEP] passage [SEP]`,
/// as shipped with the ms-marco cross-encoders. The single logit is the score.
pub struct CrossEncoderReranker {
    bert: BertModel,
    pooler: Linear,
    classifier: Linear,
    tokenizer: Tokenizer,
    device: Device,
    id: String,
}

impl CrossEncoderReranker {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        info!(dir = %model_dir.display(), "loading cross-encoder");
        let tokenizer = load_tokenizer(model_dir, max_len)?;
        let (config, hidden) = read_config(model_dir)?;
        let vb = load_weights(model_dir, &device)?;
        let bert = BertModel::load(vb.clone(), &config).map_err(Error::model)?;
        let pooler = linear(hidden, hidden, vb.pp("bert.pooler.dense")).map_err(Error::model)?;
        let classifier = linear(hidden, 1, vb.pp("classifier")).map_err(Error::model)?;
        let name = model_dir.file_name().map_or_else(|| "local".to_string(), |n| n.to_string_lossy().to_string());
        Ok(Self { bert, pooler, classifier, tokenizer, device, id: format!("cross-encoder:{name}") })
    }

    fn score_chunk(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let pairs: Vec<(&str, &str)> = passages.iter().map(|p| (query, *p)).collect();
        let encodings = self.tokenizer.encode_batch(pairs, true).map_err(Error::model)?;
        let batch = encodings_to_tensors(&encodings, &self.device)?;
        let logits = (|| -> candle_core::Result<Vec<f32>> {
            let hidden = self.bert.forward(&batch.input_ids, &batch.token_type_ids, Some(&batch.attention_mask))?;
            let cls = hidden.i((.., 0))?;
            let pooled = self.pooler.forward(&cls)?.tanh()?;
            self.classifier.forward(&pooled)?.squeeze(1)?.to_device(&Device::Cpu)?.to_vec1::<f32>()
        })()
        .map_err(Error::model)?;
        Ok(logits)
    }
}

impl Reranker for CrossEncoderReranker {
    fn id(&self) -> &str { &self.id }

    fn score_pairs(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(passages.len());
        for chunk in passages.chunks(BATCH_SIZE) {
            scores.extend(self.score_chunk(query, chunk)?);
        }
        debug!(pairs = passages.len(), "cross-encoder scored");
        Ok(scores)
    }
}
