use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Embedding dimension shared by the storage schema and query validation.
/// Providers returning any other length are rejected.
pub const EMBEDDING_DIMS: usize = 768;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub transcripts: TranscriptsConfig,
    #[serde(default)]
    pub segmenter: SegmenterConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranscriptsConfig {
    /// Root directory holding one `<episode-slug>/transcript.md` per episode.
    #[serde(default = "default_transcripts_root")]
    pub root: PathBuf,
}

impl Default for TranscriptsConfig {
    fn default() -> Self {
        Self {
            root: default_transcripts_root(),
        }
    }
}

fn default_transcripts_root() -> PathBuf {
    PathBuf::from("episodes")
}

#[derive(Debug, Deserialize, Clone)]
pub struct SegmenterConfig {
    /// Lower edge of the word-count band at which a chunk may close.
    #[serde(default = "default_target_words")]
    pub target_words: usize,
    /// Upper edge of the band, checked against `target_words` at load time.
    /// Segmentation closes chunks on `target_words` at turn boundaries, so
    /// only a single oversized turn carries a chunk past this value.
    #[serde(default = "default_max_words")]
    pub max_words: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            target_words: default_target_words(),
            max_words: default_max_words(),
        }
    }
}

fn default_target_words() -> usize {
    400
}
fn default_max_words() -> usize {
    600
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Minimum similarity a hit must strictly exceed.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default = "default_search_limit")]
    pub search_limit: i64,
    #[serde(default = "default_advice_limit")]
    pub advice_limit: i64,
    #[serde(default = "default_compare_limit")]
    pub compare_limit: i64,
    #[serde(default = "default_playbook_limit")]
    pub playbook_limit: i64,
    #[serde(default = "default_metrics_limit")]
    pub metrics_limit: i64,
    #[serde(default = "default_episodes_limit")]
    pub episodes_limit: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            limit: default_limit(),
            search_limit: default_search_limit(),
            advice_limit: default_advice_limit(),
            compare_limit: default_compare_limit(),
            playbook_limit: default_playbook_limit(),
            metrics_limit: default_metrics_limit(),
            episodes_limit: default_episodes_limit(),
        }
    }
}

fn default_threshold() -> f64 {
    0.7
}
fn default_limit() -> i64 {
    10
}
fn default_search_limit() -> i64 {
    5
}
fn default_advice_limit() -> i64 {
    8
}
fn default_compare_limit() -> i64 {
    15
}
fn default_playbook_limit() -> i64 {
    12
}
fn default_metrics_limit() -> i64 {
    10
}
fn default_episodes_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Environment variable holding the provider API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on in-flight embedding requests during ingestion.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-004".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    10
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_concurrent_requests() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct SynthesisConfig {
    #[serde(default = "default_synthesis_provider")]
    pub provider: String,
    #[serde(default = "default_synthesis_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_synthesis_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            provider: default_synthesis_provider(),
            model: default_synthesis_model(),
            api_key_env: default_api_key_env(),
            max_retries: default_max_retries(),
            timeout_secs: default_synthesis_timeout_secs(),
        }
    }
}

impl SynthesisConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_synthesis_provider() -> String {
    "disabled".to_string()
}
fn default_synthesis_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_synthesis_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8808".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate segmenter
    if config.segmenter.target_words == 0 {
        anyhow::bail!("segmenter.target_words must be > 0");
    }
    if config.segmenter.max_words < config.segmenter.target_words {
        anyhow::bail!("segmenter.max_words must be >= segmenter.target_words");
    }

    // Validate retrieval
    if !(0.0..=1.0).contains(&config.retrieval.threshold) {
        anyhow::bail!("retrieval.threshold must be in [0.0, 1.0]");
    }
    for (name, limit) in [
        ("retrieval.limit", config.retrieval.limit),
        ("retrieval.search_limit", config.retrieval.search_limit),
        ("retrieval.advice_limit", config.retrieval.advice_limit),
        ("retrieval.compare_limit", config.retrieval.compare_limit),
        ("retrieval.playbook_limit", config.retrieval.playbook_limit),
        ("retrieval.metrics_limit", config.retrieval.metrics_limit),
        ("retrieval.episodes_limit", config.retrieval.episodes_limit),
    ] {
        if limit < 1 {
            anyhow::bail!("{} must be >= 1", name);
        }
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "gemini" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, gemini, or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.model.is_empty() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
        if config.embedding.max_concurrent_requests == 0 {
            anyhow::bail!("embedding.max_concurrent_requests must be > 0");
        }
    }

    // Validate synthesis
    match config.synthesis.provider.as_str() {
        "disabled" | "gemini" => {}
        other => anyhow::bail!(
            "Unknown synthesis provider: '{}'. Must be disabled or gemini.",
            other
        ),
    }

    Ok(config)
}

/// Starter configuration written by `sage config-init`.
pub fn example_toml() -> &'static str {
    r#"# podsage configuration

[database]
path = "podsage.db"

[transcripts]
# One episode per directory: <root>/<episode-slug>/transcript.md
root = "episodes"

[segmenter]
# Chunks close at the first turn boundary past target_words; max_words is
# the validated band ceiling a single long turn may exceed.
target_words = 400
max_words = 600

[retrieval]
threshold = 0.7
limit = 10

[embedding]
# gemini | openai | disabled
provider = "gemini"
model = "text-embedding-004"
api_key_env = "GEMINI_API_KEY"
batch_size = 10
max_retries = 3
timeout_secs = 30
max_concurrent_requests = 4

[synthesis]
# gemini | disabled. When disabled, tools return structured passages
# without an LLM-written narrative.
provider = "disabled"
model = "gemini-1.5-flash"
api_key_env = "GEMINI_API_KEY"

[server]
bind = "127.0.0.1:8808"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let f = write_config("[database]\npath = \"wisdom.db\"\n");
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.segmenter.target_words, 400);
        assert_eq!(cfg.segmenter.max_words, 600);
        assert_eq!(cfg.retrieval.threshold, 0.7);
        assert_eq!(cfg.retrieval.limit, 10);
        assert_eq!(cfg.embedding.provider, "disabled");
        assert!(!cfg.embedding.is_enabled());
        assert_eq!(cfg.server.bind, "127.0.0.1:8808");
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let f = write_config(
            "[database]\npath = \"wisdom.db\"\n[retrieval]\nthreshold = 1.5\n",
        );
        let err = load_config(f.path()).unwrap_err().to_string();
        assert!(err.contains("threshold"), "unexpected error: {err}");
    }

    #[test]
    fn zero_limit_rejected() {
        let f = write_config("[database]\npath = \"wisdom.db\"\n[retrieval]\nlimit = 0\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        let f = write_config(
            "[database]\npath = \"wisdom.db\"\n[embedding]\nprovider = \"mystery\"\n",
        );
        let err = load_config(f.path()).unwrap_err().to_string();
        assert!(err.contains("Unknown embedding provider"));
    }

    #[test]
    fn band_inversion_rejected() {
        let f = write_config(
            "[database]\npath = \"wisdom.db\"\n[segmenter]\ntarget_words = 500\nmax_words = 400\n",
        );
        let err = load_config(f.path()).unwrap_err().to_string();
        assert!(err.contains("max_words"), "got: {err}");
    }

    #[test]
    fn example_config_parses_and_validates() {
        let f = write_config(example_toml());
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.embedding.provider, "gemini");
        assert_eq!(cfg.embedding.model, "text-embedding-004");
        assert_eq!(cfg.synthesis.provider, "disabled");
    }
}
