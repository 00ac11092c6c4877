use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub rerank: RerankConfig,
    pub context: ContextConfig,
    pub generation: GenerationConfig,
    pub models: ModelConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub knowledge_dir: String,
    pub text_index_dir: String,
    pub vector_db_dir: String,
    pub vector_table: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            knowledge_dir: "data/raw".to_string(),
            text_index_dir: "data/index/text".to_string(),
            vector_db_dir: "data/index/vector".to_string(),
            vector_table: "chunks".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub min_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self { Self { max_chars: 800, overlap_chars: 100, min_chars: 1 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub sparse_limit: usize,
    pub dense_limit: usize,
    /// Reciprocal-rank-fusion constant; larger values flatten the weight of early ranks.
    pub rrf_k: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self { Self { sparse_limit: 10, dense_limit: 10, rrf_k: 60.0 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub top_n_in: usize,
    pub top_k_out: usize,
}

impl Default for RerankConfig {
    fn default() -> Self { Self { top_n_in: 10, top_k_out: 5 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub max_items: usize,
    pub max_total_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self { Self { max_items: 5, max_total_chars: 4000 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// OpenAI-compatible endpoint.
    pub api_base: String,
    /// Name of the environment variable that holds the API key.
    pub api_key_env: String,
    pub model: String,
    pub timeout_secs: u64,
    pub include_explanation: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            model: "gemini-2.0-flash".to_string(),
            timeout_secs: 30,
            include_explanation: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub embedder_dir: String,
    pub reranker_dir: String,
    pub max_len: usize,
    pub use_hashing_embedder: bool,
    pub hashing_dim: usize,
    pub use_term_overlap_reranker: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            embedder_dir: "models/all-MiniLM-L6-v2".to_string(),
            reranker_dir: "models/ms-marco-MiniLM-L-6-v2".to_string(),
            max_len: 256,
            use_hashing_embedder: false,
            hashing_dim: 384,
            use_term_overlap_reranker: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self { Self { concurrency: 1 } }
}

impl AppConfig {
    /// Merges `config.toml`, `config.<RUST_ENV>.toml` and `APP_*` variables
    /// (nested keys split on `__`), then resolves paths against the working directory.
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Self::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let base = env::current_dir().map_err(|e| Error::InvalidConfig(format!("working directory: {e}")))?;
        let mut config = Self::from_figment(&figment)?;
        config.resolve_paths(&base);
        Ok(config)
    }

    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Self = figment.extract().map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        fn positive(key: &str, value: usize) -> Result<()> {
            if value == 0 { return Err(Error::InvalidConfig(format!("{key} must be greater than zero"))); }
            Ok(())
        }

        positive("chunking.max_chars", self.chunking.max_chars)?;
        if self.chunking.overlap_chars >= self.chunking.max_chars {
            return Err(Error::InvalidConfig("chunking.overlap_chars must be smaller than chunking.max_chars".into()));
        }
        positive("retrieval.sparse_limit", self.retrieval.sparse_limit)?;
        positive("retrieval.dense_limit", self.retrieval.dense_limit)?;
        if !self.retrieval.rrf_k.is_finite() || self.retrieval.rrf_k <= 0.0 {
            return Err(Error::InvalidConfig("retrieval.rrf_k must be a positive finite number".into()));
        }
        positive("rerank.top_n_in", self.rerank.top_n_in)?;
        positive("rerank.top_k_out", self.rerank.top_k_out)?;
        if self.rerank.top_k_out > self.rerank.top_n_in {
            return Err(Error::InvalidConfig("rerank.top_k_out must not exceed rerank.top_n_in".into()));
        }
        positive("context.max_items", self.context.max_items)?;
        positive("context.max_total_chars", self.context.max_total_chars)?;
        if self.generation.timeout_secs == 0 {
            return Err(Error::InvalidConfig("generation.timeout_secs must be greater than zero".into()));
        }
        if self.generation.model.trim().is_empty() {
            return Err(Error::InvalidConfig("generation.model must not be empty".into()));
        }
        positive("models.max_len", self.models.max_len)?;
        positive("models.hashing_dim", self.models.hashing_dim)?;
        positive("batch.concurrency", self.batch.concurrency)?;
        if self.data.vector_table.trim().is_empty() {
            return Err(Error::InvalidConfig("data.vector_table must not be empty".into()));
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &str| resolve_with_base(base, p).to_string_lossy().into_owned();
        self.data.knowledge_dir = resolve(&self.data.knowledge_dir);
        self.data.text_index_dir = resolve(&self.data.text_index_dir);
        self.data.vector_db_dir = resolve(&self.data.vector_db_dir);
        self.models.embedder_dir = resolve(&self.models.embedder_dir);
        self.models.reranker_dir = resolve(&self.models.reranker_dir);
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
