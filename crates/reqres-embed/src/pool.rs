use candle_core::{DType, Tensor};

use reqres_core::error::{Error, Result};

/// Mean of the unmasked token states followed by L2 normalisation.
///
/// `hidden` is `[B, T, H]`, `attention_mask` is `[B, T]`; the result is `[B, H]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, _time, hidden_dim) = hidden.dims3().map_err(Error::model)?;

    let mask = attention_mask.to_device(hidden.device()).and_then(|m| m.to_dtype(hidden.dtype())).map_err(Error::model)?;
    let pooled = (|| -> candle_core::Result<Tensor> {
        let mask_3d = mask.unsqueeze(2)?.broadcast_as(hidden.shape())?;
        let sum = (hidden * &mask_3d)?.sum(1)?;
        let lengths = mask.sum(1)?.unsqueeze(1)?;
        let mean = sum.broadcast_div(&lengths)?;
        let eps = match hidden.dtype() { DType::F16 => 1e-6f64, _ => 1e-12f64 };
        let norm = (mean.sqr()?.sum_keepdim(1)?.sqrt()? + eps)?;
        mean.broadcast_div(&norm)
    })()
    .map_err(Error::model)?;

    if pooled.dims() != [batch, hidden_dim] {
        return Err(Error::Model(format!("pooled shape {:?}, expected [{batch}, {hidden_dim}]", pooled.dims())));
    }
    Ok(pooled)
}
