use std::path::Path;

use candle_core::{Device, Tensor};
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use reqres_core::error::{Error, Result};

/// Loads `tokenizer.json` with truncation to `max_len` and padding to the longest item of a batch.
pub fn load_tokenizer(model_dir: &Path, max_len: usize) -> Result<Tokenizer> {
    let path = model_dir.join("tokenizer.json");
    let mut tokenizer = Tokenizer::from_file(&path)
        .map_err(|e| Error::Model(format!("failed to load tokenizer from {}: {e}", path.display())))?;
    tokenizer
        .with_truncation(Some(TruncationParams { max_length: max_len, ..TruncationParams::default() }))
        .map_err(Error::model)?;
    tokenizer.with_padding(Some(PaddingParams { strategy: PaddingStrategy::BatchLongest, ..PaddingParams::default() }));
    Ok(tokenizer)
}

/// Model inputs for one batch: `(input_ids, token_type_ids, attention_mask)`, each `[B, T]`.
pub struct BatchInputs {
    pub input_ids: Tensor,
    pub token_type_ids: Tensor,
    pub attention_mask: Tensor,
}

pub fn encodings_to_tensors(encodings: &[Encoding], device: &Device) -> Result<BatchInputs> {
    let batch = encodings.len();
    let width = encodings.iter().map(Encoding::len).max().unwrap_or(0);
    let mut ids = Vec::with_capacity(batch * width);
    let mut type_ids = Vec::with_capacity(batch * width);
    let mut mask = Vec::with_capacity(batch * width);
    for enc in encodings {
        let pad = width - enc.len();
        ids.extend(enc.get_ids().iter().copied().chain(std::iter::repeat(0).take(pad)));
        type_ids.extend(enc.get_type_ids().iter().copied().chain(std::iter::repeat(0).take(pad)));
        mask.extend(enc.get_attention_mask().iter().copied().chain(std::iter::repeat(0).take(pad)));
    }
    let tensor = |values: Vec<u32>| Tensor::from_vec(values, (batch, width), device).map_err(Error::model);
    Ok(BatchInputs { input_ids: tensor(ids)?, token_type_ids: tensor(type_ids)?, attention_mask: tensor(mask)? })
}
