use reqres_core::config::ModelConfig;
use reqres_embed::{load_embedder, HashingEmbedder};
use reqres_core::traits::Embedder;

#[test]
fn hashing_embedder_shapes_and_determinism() {
    let models = ModelConfig { use_hashing_embedder: true, hashing_dim: 384, ..ModelConfig::default() };
    let embedder = load_embedder(&models).expect("embedder");
    assert_eq!(embedder.id(), "hash:xxh64:d384");

    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let (v1, v2) = (&embs[0], &embs[1]);
    assert_eq!(v1.len(), 384);

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[test]
fn empty_text_embeds_to_zero_vector() {
    let embs = HashingEmbedder::new(16).embed_batch(&[String::new()]).expect("embed");
    assert!(embs[0].iter().all(|x| *x == 0.0));
}

#[test]
fn missing_model_dir_is_a_model_error() {
    let tmp = tempfile::TempDir::new().expect("tmp");
    let models = ModelConfig { embedder_dir: tmp.path().display().to_string(), ..ModelConfig::default() };
    let err = load_embedder(&models).err().expect("should fail without tokenizer.json");
    assert!(matches!(err, reqres_core::Error::Model(_)), "{err}");
}
